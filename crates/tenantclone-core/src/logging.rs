//! Structured logging schema and field name constants for tenantclone.
//!
//! All crates use these names for structured `tracing` fields so that a clone
//! run can be followed end to end in a log aggregator by `job_id`.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Structural failure, the clone job is aborted |
//! | WARN  | Row failure, timeout, unresolved `fail` reference, audit write failure |
//! | INFO  | Job and phase lifecycle, final counts |
//! | DEBUG | Per-phase decisions (rows loaded, suffix chosen, singleton update) |
//! | TRACE | Per-row iteration |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "engine", "db", "cli"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "orchestrator", "cloner", "verify", "pool", "store"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "clone", "phase", "insert_row", "select_by_organization"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Clone job UUID.
pub const JOB_ID: &str = "job_id";

/// Entity type name from the clone plan.
pub const ENTITY_TYPE: &str = "entity_type";

/// Source organization UUID.
pub const SOURCE_ORG: &str = "source_org";

/// Destination organization UUID.
pub const DESTINATION_ORG: &str = "destination_org";

/// Source row primary key.
pub const SOURCE_ID: &str = "source_id";

/// Database table affected.
pub const DB_TABLE: &str = "db_table";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Rows attempted in a phase.
pub const ATTEMPTED: &str = "attempted";

/// Rows written in a phase.
pub const SUCCEEDED: &str = "succeeded";

/// Rows that failed in a phase.
pub const FAILED: &str = "failed";

/// Foreign keys nulled by the `null_out` policy.
pub const NULLED: &str = "nulled_references";

// ─── Database fields ───────────────────────────────────────────────────────

/// Number of active connections in the pool.
pub const POOL_SIZE: &str = "pool_size";

/// Number of idle connections in the pool.
pub const POOL_IDLE: &str = "pool_idle";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Final job status.
pub const STATUS: &str = "status";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
