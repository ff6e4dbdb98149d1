//! Clone job audit repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use tenantclone_core::defaults::AUDIT_TABLE;
use tenantclone_core::{CloneAuditRepository, CloneJob, Error, OrganizationId, Result};

/// PostgreSQL implementation of CloneAuditRepository.
///
/// The finished job is stored whole as JSONB next to a few indexed columns;
/// reads deserialize the JSON back into a [`CloneJob`].
#[derive(Clone)]
pub struct PgCloneAuditRepository {
    pool: Pool<Postgres>,
}

impl PgCloneAuditRepository {
    /// Create a new PgCloneAuditRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn job_from_row(r: &sqlx::postgres::PgRow) -> Result<CloneJob> {
    let result: JsonValue = r.get("result");
    Ok(serde_json::from_value(result)?)
}

#[async_trait]
impl CloneAuditRepository for PgCloneAuditRepository {
    async fn record(&self, job: &CloneJob) -> Result<()> {
        let result = serde_json::to_value(job)?;
        let finished_at: Option<DateTime<Utc>> = job.finished_at;

        sqlx::query(&format!(
            r#"
            INSERT INTO {} (id, source_organization_id, destination_organization_id,
                            status, started_at, finished_at, result)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                destination_organization_id = EXCLUDED.destination_organization_id,
                status = EXCLUDED.status,
                finished_at = EXCLUDED.finished_at,
                result = EXCLUDED.result
            "#,
            AUDIT_TABLE
        ))
        .bind(job.id)
        .bind(job.source_organization_id.as_uuid())
        .bind(job.destination_organization_id.map(|d| d.as_uuid()))
        .bind(job.status.as_str())
        .bind(job.started_at)
        .bind(finished_at)
        .bind(result)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<CloneJob>> {
        let row = sqlx::query(&format!("SELECT result FROM {} WHERE id = $1", AUDIT_TABLE))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.as_ref().map(job_from_row).transpose()
    }

    async fn list_for_source(&self, source: OrganizationId) -> Result<Vec<CloneJob>> {
        let rows = sqlx::query(&format!(
            "SELECT result FROM {} WHERE source_organization_id = $1 ORDER BY started_at DESC",
            AUDIT_TABLE
        ))
        .bind(source.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(job_from_row).collect()
    }
}
