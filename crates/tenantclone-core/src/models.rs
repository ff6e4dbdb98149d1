//! Core data models for tenant cloning.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::{Error, Result};

/// A tenant row: column name to JSON value.
///
/// Every entity type is cloned through this generic shape so one cloner
/// implementation serves all tables.
pub type Row = serde_json::Map<String, JsonValue>;

// =============================================================================
// ORGANIZATIONS
// =============================================================================

/// Tenant identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrganizationId(pub Uuid);

impl OrganizationId {
    /// Wrap a raw UUID.
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// JSON form written into organization-scope columns.
    pub fn to_json(&self) -> JsonValue {
        JsonValue::String(self.0.to_string())
    }

    /// Whether a JSON column value refers to this organization.
    pub fn matches(&self, value: &JsonValue) -> bool {
        value
            .as_str()
            .and_then(|s| Uuid::parse_str(s).ok())
            .is_some_and(|id| id == self.0)
    }
}

impl From<Uuid> for OrganizationId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for OrganizationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// An organization as stored in the `organizations` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrganizationId,
    pub name: String,
    /// Organization type ("platform", "general", "education", ...).
    pub kind: Option<String>,
    pub is_sample: bool,
    pub created_at: DateTime<Utc>,
}

impl Organization {
    /// Platform-level organizations are never cloned.
    pub fn is_protected(&self) -> bool {
        self.kind
            .as_deref()
            .is_some_and(|k| crate::defaults::PROTECTED_ORG_KINDS.contains(&k))
    }
}

/// Request for creating a destination organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOrganization {
    pub name: String,
    /// Copied from the source organization.
    pub kind: Option<String>,
    /// Email of whoever triggered the clone, if known.
    pub created_by_email: Option<String>,
}

impl NewOrganization {
    /// Validate and normalise a destination name.
    ///
    /// The name is trimmed and must be between 2 and 50 characters.
    pub fn new(name: &str, kind: Option<String>) -> Result<Self> {
        let name = name.trim();
        let len = name.chars().count();
        if name.is_empty() {
            return Err(Error::InvalidInput(
                "Organization name is required".to_string(),
            ));
        }
        if !(crate::defaults::ORG_NAME_MIN_LEN..=crate::defaults::ORG_NAME_MAX_LEN).contains(&len) {
            return Err(Error::InvalidInput(format!(
                "Organization name must be between {} and {} characters",
                crate::defaults::ORG_NAME_MIN_LEN,
                crate::defaults::ORG_NAME_MAX_LEN
            )));
        }
        Ok(Self {
            name: name.to_string(),
            kind,
            created_by_email: None,
        })
    }

    /// Record who requested the clone.
    pub fn with_created_by(mut self, email: impl Into<String>) -> Self {
        self.created_by_email = Some(email.into());
        self
    }
}

// =============================================================================
// ROW IDENTIFIERS
// =============================================================================

/// Primary key value of a tenant row.
///
/// Tenant tables use either `bigint` or `uuid` keys. The variant is kept so a
/// remapped foreign key is written back in the same JSON shape it was read in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RowId {
    Int(i64),
    Uuid(Uuid),
}

impl RowId {
    /// Parse a JSON value into a row id. Returns `None` for null.
    pub fn from_json(value: &JsonValue) -> Result<Option<Self>> {
        match value {
            JsonValue::Null => Ok(None),
            JsonValue::Number(n) => n
                .as_i64()
                .map(|v| Some(RowId::Int(v)))
                .ok_or_else(|| Error::InvalidInput(format!("Row id is not an integer: {}", n))),
            JsonValue::String(s) => {
                if let Ok(id) = Uuid::parse_str(s) {
                    Ok(Some(RowId::Uuid(id)))
                } else if let Ok(v) = s.parse::<i64>() {
                    Ok(Some(RowId::Int(v)))
                } else {
                    Err(Error::InvalidInput(format!("Unrecognised row id: {}", s)))
                }
            }
            other => Err(Error::InvalidInput(format!(
                "Unsupported row id value: {}",
                other
            ))),
        }
    }

    /// JSON form for writing into a key column.
    pub fn to_json(&self) -> JsonValue {
        match self {
            RowId::Int(v) => JsonValue::from(*v),
            RowId::Uuid(id) => JsonValue::String(id.to_string()),
        }
    }

    /// Read the id stored under `column`, failing if it is absent or null.
    pub fn require(row: &Row, column: &str) -> Result<Self> {
        let value = row.get(column).unwrap_or(&JsonValue::Null);
        Self::from_json(value)?
            .ok_or_else(|| {
                Error::InvalidInput(format!("Row has no value for key column {}", column))
            })
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowId::Int(v) => write!(f, "{}", v),
            RowId::Uuid(id) => write!(f, "{}", id),
        }
    }
}

impl From<i64> for RowId {
    fn from(v: i64) -> Self {
        RowId::Int(v)
    }
}

impl From<Uuid> for RowId {
    fn from(id: Uuid) -> Self {
        RowId::Uuid(id)
    }
}

// =============================================================================
// CLONE JOB
// =============================================================================

/// Lifecycle of a clone job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloneStatus {
    Pending,
    Running,
    Completed,
    CompletedWithErrors,
    Failed,
    Cancelled,
}

impl CloneStatus {
    /// Whether the job has reached a final state.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CloneStatus::Pending | CloneStatus::Running)
    }

    /// Only `Completed` is full success.
    pub fn is_success(&self) -> bool {
        matches!(self, CloneStatus::Completed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CloneStatus::Pending => "pending",
            CloneStatus::Running => "running",
            CloneStatus::Completed => "completed",
            CloneStatus::CompletedWithErrors => "completed_with_errors",
            CloneStatus::Failed => "failed",
            CloneStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for CloneStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where cloned rows go.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloneDestination {
    /// An organization created beforehand by the caller. It must be empty.
    Existing(OrganizationId),
    /// Create a fresh organization with this name.
    New { name: String },
}

/// A row that could not be cloned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowError {
    /// Source primary key, when the row had a readable one.
    pub source_id: Option<RowId>,
    pub message: String,
}

/// Per-entity-type outcome of one clone phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityTypeResult {
    pub entity_type: String,
    pub attempted: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Foreign keys set to null because their target was not cloned.
    pub nulled_references: u64,
    /// Destination rows of this type that existed before the phase.
    pub preexisting: u64,
    pub errors: Vec<RowError>,
}

impl EntityTypeResult {
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            ..Default::default()
        }
    }

    /// Record a failed row.
    pub fn push_error(&mut self, source_id: Option<RowId>, message: impl Into<String>) {
        self.failed += 1;
        self.errors.push(RowError {
            source_id,
            message: message.into(),
        });
    }
}

/// Kind of problem found by the verification pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationIssueKind {
    /// Destination row count differs from preexisting + succeeded.
    CountMismatch,
    /// A foreign key points at a row the destination does not own.
    DanglingReference,
    /// A foreign key still points at a source-organization row.
    CrossTenantReference,
    /// A reference to a non-cloned table survived the clone.
    UnclonedReference,
    /// An external-reference column still holds a value.
    ExternalReference,
    /// A unique column holds the same value twice.
    DuplicateValue,
}

/// One verification finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationIssue {
    pub entity_type: String,
    pub kind: VerificationIssueKind,
    pub column: Option<String>,
    pub row_id: Option<RowId>,
    pub detail: String,
}

/// Outcome of the verification pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub passed: bool,
    pub checked_types: u64,
    pub issues: Vec<VerificationIssue>,
}

/// One clone invocation and its result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloneJob {
    pub id: Uuid,
    pub source_organization_id: OrganizationId,
    /// Unset until the destination is resolved or created.
    pub destination_organization_id: Option<OrganizationId>,
    pub status: CloneStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Structural error that failed the job.
    pub error: Option<String>,
    pub per_entity_type: Vec<EntityTypeResult>,
    pub verification: Option<VerificationReport>,
}

impl CloneJob {
    /// Create a pending job.
    pub fn new(source: OrganizationId) -> Self {
        Self {
            id: Uuid::now_v7(),
            source_organization_id: source,
            destination_organization_id: None,
            status: CloneStatus::Pending,
            started_at: Utc::now(),
            finished_at: None,
            error: None,
            per_entity_type: Vec::new(),
            verification: None,
        }
    }

    /// Total rows attempted across all entity types.
    pub fn total_attempted(&self) -> u64 {
        self.per_entity_type.iter().map(|r| r.attempted).sum()
    }

    /// Total rows written across all entity types.
    pub fn total_succeeded(&self) -> u64 {
        self.per_entity_type.iter().map(|r| r.succeeded).sum()
    }

    /// Total failed rows across all entity types.
    pub fn total_failed(&self) -> u64 {
        self.per_entity_type.iter().map(|r| r.failed).sum()
    }

    /// Result for one entity type, if its phase ran.
    pub fn result_for(&self, entity_type: &str) -> Option<&EntityTypeResult> {
        self.per_entity_type
            .iter()
            .find(|r| r.entity_type == entity_type)
    }

    /// Close the job with the given terminal status.
    pub fn finish(&mut self, status: CloneStatus) {
        debug_assert!(status.is_terminal());
        self.status = status;
        self.finished_at = Some(Utc::now());
    }

    /// Close the job as failed with a structural error.
    pub fn fail(&mut self, error: &Error) {
        self.error = Some(error.to_string());
        self.finish(CloneStatus::Failed);
    }
}
