//! PostgreSQL implementation of [`EntityStore`].
//!
//! Rows travel as JSONB: reads use `to_jsonb(t)` and writes go through
//! `jsonb_populate_record`, so one adapter serves every tenant table without
//! per-table structs. Table and column names come from a validated clone plan
//! and are quoted on interpolation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::{Pool, Postgres, Row as _};
use tracing::trace;
use uuid::Uuid;

use tenantclone_core::defaults::ORGANIZATIONS_TABLE;
use tenantclone_core::identifiers::{quote_ident, validate_identifier};
use tenantclone_core::{
    EntityStore, Error, NewOrganization, Organization, OrganizationId, Result, Row, RowId,
    TableRef,
};

/// PostgreSQL implementation of EntityStore.
#[derive(Clone)]
pub struct PgEntityStore {
    pool: Pool<Postgres>,
}

impl PgEntityStore {
    /// Create a new PgEntityStore with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn organization_from_row(r: &sqlx::postgres::PgRow) -> Result<Organization> {
    Ok(Organization {
        id: OrganizationId::new(r.try_get::<Uuid, _>("id").map_err(Error::Database)?),
        name: r.try_get("name").map_err(Error::Database)?,
        kind: r.try_get("kind").map_err(Error::Database)?,
        is_sample: r.try_get("is_sample").map_err(Error::Database)?,
        created_at: r
            .try_get::<DateTime<Utc>, _>("created_at")
            .map_err(Error::Database)?,
    })
}

fn json_to_row(value: JsonValue) -> Result<Row> {
    match value {
        JsonValue::Object(map) => Ok(map),
        other => Err(Error::Internal(format!(
            "Expected a JSON object row, got {}",
            other
        ))),
    }
}

fn bind_row_id<'q>(
    q: Query<'q, Postgres, PgArguments>,
    id: &RowId,
) -> Query<'q, Postgres, PgArguments> {
    match id {
        RowId::Int(v) => q.bind(*v),
        RowId::Uuid(u) => q.bind(*u),
    }
}

/// Quote a list of validated column names.
fn quoted_columns<'a>(columns: impl Iterator<Item = &'a String>) -> Result<Vec<String>> {
    columns
        .map(|c| {
            validate_identifier(c)?;
            Ok(quote_ident(c))
        })
        .collect()
}

fn check_table(table: TableRef<'_>) -> Result<()> {
    validate_identifier(table.table)?;
    validate_identifier(table.primary_key)
}

#[async_trait]
impl EntityStore for PgEntityStore {
    async fn get_organization(&self, id: OrganizationId) -> Result<Option<Organization>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT id, name, type AS kind,
                   COALESCE(is_sample, false) AS is_sample,
                   COALESCE(created_at, now()) AS created_at
            FROM {}
            WHERE id = $1
            "#,
            ORGANIZATIONS_TABLE
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(organization_from_row).transpose()
    }

    async fn create_organization(&self, req: NewOrganization) -> Result<Organization> {
        // Deployment bindings are never copied; a clone starts undeployed.
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO {} (name, type, created_by_email, base_url, is_sample,
                            deployment_status, created_at)
            VALUES ($1, $2, $3, NULL, false, 'not_deployed', $4)
            RETURNING id, name, type AS kind, is_sample, created_at
            "#,
            ORGANIZATIONS_TABLE
        ))
        .bind(&req.name)
        .bind(&req.kind)
        .bind(&req.created_by_email)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        organization_from_row(&row)
    }

    async fn select_by_organization(
        &self,
        table: TableRef<'_>,
        org_column: &str,
        org: OrganizationId,
    ) -> Result<Vec<Row>> {
        check_table(table)?;
        validate_identifier(org_column)?;

        let sql = format!(
            "SELECT to_jsonb(t) AS row FROM {} t WHERE t.{} = $1 ORDER BY t.{}",
            quote_ident(table.table),
            quote_ident(org_column),
            quote_ident(table.primary_key)
        );
        let rows = sqlx::query(&sql)
            .bind(org.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        trace!(
            subsystem = "db",
            component = "store",
            op = "select_by_organization",
            db_table = table.table,
            result_count = rows.len(),
            "Selected rows"
        );

        rows.into_iter()
            .map(|r| json_to_row(r.try_get::<JsonValue, _>("row").map_err(Error::Database)?))
            .collect()
    }

    async fn select_by_reference(
        &self,
        table: TableRef<'_>,
        column: &str,
        ids: &[RowId],
    ) -> Result<Vec<Row>> {
        check_table(table)?;
        validate_identifier(column)?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT to_jsonb(t) AS row FROM {} t WHERE t.{} = ANY($1) ORDER BY t.{}",
            quote_ident(table.table),
            quote_ident(column),
            quote_ident(table.primary_key)
        );

        let query = if ids.iter().all(|id| matches!(id, RowId::Int(_))) {
            let ints: Vec<i64> = ids
                .iter()
                .filter_map(|id| match id {
                    RowId::Int(v) => Some(*v),
                    RowId::Uuid(_) => None,
                })
                .collect();
            sqlx::query(&sql).bind(ints)
        } else if ids.iter().all(|id| matches!(id, RowId::Uuid(_))) {
            let uuids: Vec<Uuid> = ids
                .iter()
                .filter_map(|id| match id {
                    RowId::Uuid(u) => Some(*u),
                    RowId::Int(_) => None,
                })
                .collect();
            sqlx::query(&sql).bind(uuids)
        } else {
            return Err(Error::InvalidInput(format!(
                "Mixed integer and UUID ids for {}.{}",
                table.table, column
            )));
        };

        let rows = query.fetch_all(&self.pool).await.map_err(Error::Database)?;

        rows.into_iter()
            .map(|r| json_to_row(r.try_get::<JsonValue, _>("row").map_err(Error::Database)?))
            .collect()
    }

    async fn count_by_organization(
        &self,
        table: &str,
        org_column: &str,
        org: OrganizationId,
    ) -> Result<u64> {
        validate_identifier(table)?;
        validate_identifier(org_column)?;

        let sql = format!(
            "SELECT COUNT(*) AS n FROM {} WHERE {} = $1",
            quote_ident(table),
            quote_ident(org_column)
        );
        let n: i64 = sqlx::query_scalar(&sql)
            .bind(org.as_uuid())
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(n.max(0) as u64)
    }

    async fn insert_row(&self, table: TableRef<'_>, row: Row) -> Result<RowId> {
        check_table(table)?;

        let sql = if row.is_empty() {
            format!(
                "INSERT INTO {} DEFAULT VALUES RETURNING to_jsonb({}) AS id",
                quote_ident(table.table),
                quote_ident(table.primary_key)
            )
        } else {
            let cols = quoted_columns(row.keys())?.join(", ");
            format!(
                "INSERT INTO {table} ({cols}) SELECT {cols} FROM jsonb_populate_record(NULL::{table}, $1) \
                 RETURNING to_jsonb({pk}) AS id",
                table = quote_ident(table.table),
                cols = cols,
                pk = quote_ident(table.primary_key)
            )
        };

        let mut query = sqlx::query(&sql);
        if !row.is_empty() {
            query = query.bind(JsonValue::Object(row));
        }

        let returned = query
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;
        let id: JsonValue = returned.try_get("id").map_err(Error::Database)?;

        RowId::from_json(&id)?.ok_or_else(|| {
            Error::Internal(format!("Insert into {} returned a null key", table.table))
        })
    }

    async fn update_row(&self, table: TableRef<'_>, id: &RowId, row: Row) -> Result<()> {
        check_table(table)?;
        if row.is_empty() {
            return Ok(());
        }

        let assignments = quoted_columns(row.keys())?
            .into_iter()
            .map(|c| format!("{c} = r.{c}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE {table} SET {assignments} FROM jsonb_populate_record(NULL::{table}, $1) AS r \
             WHERE {table}.{pk} = $2",
            table = quote_ident(table.table),
            assignments = assignments,
            pk = quote_ident(table.primary_key)
        );

        let query = sqlx::query(&sql).bind(JsonValue::Object(row));
        let result = bind_row_id(query, id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("{} {}", table.table, id)));
        }
        Ok(())
    }
}
