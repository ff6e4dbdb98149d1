//! Storage traits consumed by the clone engine.
//!
//! The engine never talks to a database directly. Everything it reads or
//! writes goes through [`EntityStore`], which lets the same engine run against
//! PostgreSQL in production and an in-memory store in tests.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{CloneJob, NewOrganization, Organization, OrganizationId, Row, RowId};

/// Table coordinates for a store call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableRef<'a> {
    pub table: &'a str,
    pub primary_key: &'a str,
}

impl<'a> TableRef<'a> {
    pub fn new(table: &'a str, primary_key: &'a str) -> Self {
        Self { table, primary_key }
    }
}

/// Thin read/write interface to the relational backend.
///
/// Implementations are stateless with respect to a clone run; table and column
/// names arrive pre-validated from a clone plan.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Look up an organization.
    async fn get_organization(&self, id: OrganizationId) -> Result<Option<Organization>>;

    /// Create a fresh, empty organization.
    async fn create_organization(&self, req: NewOrganization) -> Result<Organization>;

    /// All rows of `table` whose `org_column` equals `org`, ordered by primary key.
    async fn select_by_organization(
        &self,
        table: TableRef<'_>,
        org_column: &str,
        org: OrganizationId,
    ) -> Result<Vec<Row>>;

    /// All rows of `table` whose `column` holds one of `ids`, ordered by primary key.
    async fn select_by_reference(
        &self,
        table: TableRef<'_>,
        column: &str,
        ids: &[RowId],
    ) -> Result<Vec<Row>>;

    /// Number of rows of `table` owned by `org`.
    async fn count_by_organization(
        &self,
        table: &str,
        org_column: &str,
        org: OrganizationId,
    ) -> Result<u64>;

    /// Insert a row (without its primary key) and return the generated key.
    async fn insert_row(&self, table: TableRef<'_>, row: Row) -> Result<RowId>;

    /// Overwrite the given columns of an existing row.
    async fn update_row(&self, table: TableRef<'_>, id: &RowId, row: Row) -> Result<()>;
}

/// Persistence for finished clone jobs, for operator visibility.
#[async_trait]
pub trait CloneAuditRepository: Send + Sync {
    /// Store (or replace) the record of a finished job.
    async fn record(&self, job: &CloneJob) -> Result<()>;

    /// Fetch one job record.
    async fn get(&self, id: Uuid) -> Result<Option<CloneJob>>;

    /// Jobs cloned from a source organization, newest first.
    async fn list_for_source(&self, source: OrganizationId) -> Result<Vec<CloneJob>>;
}
