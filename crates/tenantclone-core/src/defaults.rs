//! Centralized default constants for tenantclone.
//!
//! Crates reference these constants instead of defining their own magic
//! numbers. Environment overrides are read in `EngineConfig::from_env` and the
//! CLI.

// =============================================================================
// ENGINE
// =============================================================================

/// Maximum rows of one entity type written concurrently.
pub const MAX_CONCURRENT_ROWS: usize = 8;

/// Seconds a single row write may take before it counts as failed.
pub const ROW_TIMEOUT_SECS: u64 = 30;

/// Run the verification pass after cloning.
pub const VERIFY_AFTER_CLONE: bool = true;

// =============================================================================
// UNIQUENESS
// =============================================================================

/// Hex characters of the destination identifier used as a uniqueness suffix.
pub const SUFFIX_LEN: usize = 8;

/// Upper bound on `-2`, `-3`, ... attempts before giving up on a value.
pub const MAX_SUFFIX_ATTEMPTS: u32 = 1_000;

// =============================================================================
// ORGANIZATIONS
// =============================================================================

/// Minimum characters in a new destination organization name.
pub const ORG_NAME_MIN_LEN: usize = 2;

/// Maximum characters in a new destination organization name.
pub const ORG_NAME_MAX_LEN: usize = 50;

/// Organization kinds that are never cloned.
pub const PROTECTED_ORG_KINDS: &[&str] = &["platform", "general"];

/// Organization table name.
pub const ORGANIZATIONS_TABLE: &str = "organizations";

/// Default organization-scope column on tenant tables.
pub const ORGANIZATION_COLUMN: &str = "organization_id";

/// Default primary key column on tenant tables.
pub const PRIMARY_KEY_COLUMN: &str = "id";

// =============================================================================
// DATABASE
// =============================================================================

/// Default maximum number of connections in the pool.
pub const DB_MAX_CONNECTIONS: u32 = 10;

/// Default connection timeout in seconds.
pub const DB_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default idle timeout in seconds.
pub const DB_IDLE_TIMEOUT_SECS: u64 = 600;

/// Default maximum connection lifetime in seconds.
pub const DB_MAX_LIFETIME_SECS: u64 = 1800;

/// Table holding persisted clone job results.
pub const AUDIT_TABLE: &str = "clone_job_audit";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protected_kinds() {
        assert!(PROTECTED_ORG_KINDS.contains(&"platform"));
        assert!(PROTECTED_ORG_KINDS.contains(&"general"));
        assert!(!PROTECTED_ORG_KINDS.contains(&"education"));
    }

    #[test]
    fn test_org_name_bounds() {
        assert!(ORG_NAME_MIN_LEN < ORG_NAME_MAX_LEN);
    }
}
