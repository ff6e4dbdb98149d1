//! Engine configuration.

use std::time::Duration;

use tenantclone_core::defaults::{MAX_CONCURRENT_ROWS, ROW_TIMEOUT_SECS, VERIFY_AFTER_CLONE};

/// Configuration for the clone engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum rows of one entity type written concurrently.
    pub max_concurrent_rows: usize,
    /// Time budget for a single row write.
    pub row_timeout: Duration,
    /// Run the verification pass after a clone by default.
    pub verify: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_rows: MAX_CONCURRENT_ROWS,
            row_timeout: Duration::from_secs(ROW_TIMEOUT_SECS),
            verify: VERIFY_AFTER_CLONE,
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `CLONE_MAX_CONCURRENT_ROWS` | `8` | Row workers per entity type |
    /// | `CLONE_ROW_TIMEOUT_SECS` | `30` | Timeout for one row write |
    /// | `CLONE_VERIFY` | `true` | Run the verification pass |
    pub fn from_env() -> Self {
        let max_concurrent_rows = std::env::var("CLONE_MAX_CONCURRENT_ROWS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(MAX_CONCURRENT_ROWS)
            .max(1);

        let row_timeout_secs = std::env::var("CLONE_ROW_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(ROW_TIMEOUT_SECS);

        let verify = std::env::var("CLONE_VERIFY")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(VERIFY_AFTER_CLONE);

        Self {
            max_concurrent_rows,
            row_timeout: Duration::from_secs(row_timeout_secs),
            verify,
        }
    }

    /// Set the number of concurrent row workers (minimum 1).
    pub fn with_max_concurrent_rows(mut self, max: usize) -> Self {
        self.max_concurrent_rows = max.max(1);
        self
    }

    /// Set the per-row write timeout.
    pub fn with_row_timeout(mut self, timeout: Duration) -> Self {
        self.row_timeout = timeout;
        self
    }

    /// Enable or disable verification by default.
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.max_concurrent_rows, 8);
        assert_eq!(config.row_timeout, Duration::from_secs(30));
        assert!(config.verify);
    }

    #[test]
    fn test_builder_clamps_concurrency() {
        let config = EngineConfig::default()
            .with_max_concurrent_rows(0)
            .with_row_timeout(Duration::from_millis(50))
            .with_verify(false);
        assert_eq!(config.max_concurrent_rows, 1);
        assert_eq!(config.row_timeout, Duration::from_millis(50));
        assert!(!config.verify);
    }
}
