//! In-memory [`EntityStore`] for engine tests.
//!
//! Tables are plain vectors of JSON rows. Integer keys are allocated from a
//! shared counter, unique constraints can be declared per table, and faults
//! (failing inserts, slow inserts, unreachable tables, lost connections) can
//! be injected to exercise the engine's error paths without a database.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;
use tracing::trace;
use uuid::Uuid;

use tenantclone_core::{
    CloneAuditRepository, CloneJob, EntityStore, Error, NewOrganization, Organization,
    OrganizationId, Result, Row, RowId, TableRef,
};

/// First integer key handed out for inserted rows. Fixture rows use explicit
/// ids below this.
pub const FIRST_GENERATED_ID: i64 = 10_000;

#[derive(Debug, Clone)]
struct InsertFault {
    table: String,
    column: String,
    value: JsonValue,
    /// Fail as a lost connection instead of a rejected row.
    connection_lost: bool,
}

type InsertHook = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct State {
    organizations: HashMap<OrganizationId, Organization>,
    tables: HashMap<String, Vec<Row>>,
    unique: HashMap<String, Vec<Vec<String>>>,
    insert_faults: Vec<InsertFault>,
    insert_delays: HashMap<String, Duration>,
    insert_hooks: HashMap<String, InsertHook>,
    unavailable: HashSet<String>,
}

/// Thread-safe in-memory store.
pub struct InMemoryStore {
    state: Mutex<State>,
    next_id: AtomicI64,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            next_id: AtomicI64::new(FIRST_GENERATED_ID),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // =========================================================================
    // FIXTURES
    // =========================================================================

    /// Add an organization and return its id.
    pub fn add_organization(&self, name: &str, kind: Option<&str>) -> OrganizationId {
        let id = OrganizationId::new(Uuid::new_v4());
        self.state().organizations.insert(
            id,
            Organization {
                id,
                name: name.to_string(),
                kind: kind.map(str::to_string),
                is_sample: false,
                created_at: Utc::now(),
            },
        );
        id
    }

    /// Add a fixture row as-is. Non-object values are ignored.
    pub fn seed(&self, table: &str, row: JsonValue) {
        if let JsonValue::Object(row) = row {
            self.state()
                .tables
                .entry(table.to_string())
                .or_default()
                .push(row);
        }
    }

    /// Declare a unique constraint over `columns` of `table`.
    pub fn with_unique(self, table: &str, columns: &[&str]) -> Self {
        self.state()
            .unique
            .entry(table.to_string())
            .or_default()
            .push(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    /// Make inserts into `table` fail when `column` holds `value`.
    pub fn fail_inserts_where(&self, table: &str, column: &str, value: JsonValue) {
        self.state().insert_faults.push(InsertFault {
            table: table.to_string(),
            column: column.to_string(),
            value,
            connection_lost: false,
        });
    }

    /// Make inserts into `table` fail as if the pool closed when `column`
    /// holds `value`.
    pub fn lose_connection_on_insert_where(&self, table: &str, column: &str, value: JsonValue) {
        self.state().insert_faults.push(InsertFault {
            table: table.to_string(),
            column: column.to_string(),
            value,
            connection_lost: true,
        });
    }

    /// Run `hook` after every successful insert into `table`.
    pub fn on_insert(&self, table: &str, hook: impl Fn() + Send + Sync + 'static) {
        self.state()
            .insert_hooks
            .insert(table.to_string(), Arc::new(hook));
    }

    /// Delay every insert into `table`.
    pub fn delay_inserts(&self, table: &str, delay: Duration) {
        self.state().insert_delays.insert(table.to_string(), delay);
    }

    /// Make every read of `table` fail with a connectivity error.
    pub fn make_unavailable(&self, table: &str) {
        self.state().unavailable.insert(table.to_string());
    }

    // =========================================================================
    // INSPECTION
    // =========================================================================

    /// Snapshot of every row of `table`, in insertion order.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.state().tables.get(table).cloned().unwrap_or_default()
    }

    /// Rows of `table` whose `column` equals `org`.
    pub fn rows_for(&self, table: &str, column: &str, org: OrganizationId) -> Vec<Row> {
        self.rows(table)
            .into_iter()
            .filter(|r| r.get(column).is_some_and(|v| org.matches(v)))
            .collect()
    }

    /// Every organization known to the store.
    pub fn organizations(&self) -> Vec<Organization> {
        self.state().organizations.values().cloned().collect()
    }

    fn allocate_id(&self) -> RowId {
        RowId::Int(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn check_available(state: &State, table: &str) -> Result<()> {
        if state.unavailable.contains(table) {
            return Err(Error::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    fn check_unique(
        state: &State,
        table: &str,
        row: &Row,
        skip: Option<(&str, &RowId)>,
    ) -> Result<()> {
        let Some(constraints) = state.unique.get(table) else {
            return Ok(());
        };
        let existing = state.tables.get(table).map(Vec::as_slice).unwrap_or(&[]);
        for columns in constraints {
            let values: Vec<&JsonValue> = columns
                .iter()
                .map(|c| row.get(c).unwrap_or(&JsonValue::Null))
                .collect();
            if values.iter().any(|v| v.is_null()) {
                continue;
            }
            let clash = existing.iter().any(|other| {
                if let Some((pk, id)) = skip {
                    if other.get(pk).is_some_and(|v| *v == id.to_json()) {
                        return false;
                    }
                }
                columns
                    .iter()
                    .zip(&values)
                    .all(|(c, v)| other.get(c) == Some(*v))
            });
            if clash {
                return Err(Error::Conflict(format!(
                    "duplicate key value violates unique constraint on {}({})",
                    table,
                    columns.join(", ")
                )));
            }
        }
        Ok(())
    }
}

fn order_by_key(rows: &mut [Row], primary_key: &str) {
    rows.sort_by_key(|r| r.get(primary_key).and_then(|v| RowId::from_json(v).ok().flatten()));
}

#[async_trait]
impl EntityStore for InMemoryStore {
    async fn get_organization(&self, id: OrganizationId) -> Result<Option<Organization>> {
        Ok(self.state().organizations.get(&id).cloned())
    }

    async fn create_organization(&self, req: NewOrganization) -> Result<Organization> {
        let org = Organization {
            id: OrganizationId::new(Uuid::new_v4()),
            name: req.name,
            kind: req.kind,
            is_sample: false,
            created_at: Utc::now(),
        };
        self.state().organizations.insert(org.id, org.clone());
        Ok(org)
    }

    async fn select_by_organization(
        &self,
        table: TableRef<'_>,
        org_column: &str,
        org: OrganizationId,
    ) -> Result<Vec<Row>> {
        let state = self.state();
        Self::check_available(&state, table.table)?;
        let mut rows: Vec<Row> = state
            .tables
            .get(table.table)
            .map(|rows| {
                rows.iter()
                    .filter(|r| r.get(org_column).is_some_and(|v| org.matches(v)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        order_by_key(&mut rows, table.primary_key);
        Ok(rows)
    }

    async fn select_by_reference(
        &self,
        table: TableRef<'_>,
        column: &str,
        ids: &[RowId],
    ) -> Result<Vec<Row>> {
        let state = self.state();
        Self::check_available(&state, table.table)?;
        let wanted: HashSet<RowId> = ids.iter().copied().collect();
        let mut rows: Vec<Row> = state
            .tables
            .get(table.table)
            .map(|rows| {
                rows.iter()
                    .filter(|r| {
                        r.get(column)
                            .and_then(|v| RowId::from_json(v).ok().flatten())
                            .is_some_and(|id| wanted.contains(&id))
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        order_by_key(&mut rows, table.primary_key);
        Ok(rows)
    }

    async fn count_by_organization(
        &self,
        table: &str,
        org_column: &str,
        org: OrganizationId,
    ) -> Result<u64> {
        let state = self.state();
        Self::check_available(&state, table)?;
        Ok(state
            .tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|r| r.get(org_column).is_some_and(|v| org.matches(v)))
                    .count() as u64
            })
            .unwrap_or(0))
    }

    async fn insert_row(&self, table: TableRef<'_>, mut row: Row) -> Result<RowId> {
        let delay = self.state().insert_delays.get(table.table).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        let fault = state.insert_faults.iter().find(|f| {
            f.table == table.table && row.get(&f.column).is_some_and(|v| *v == f.value)
        });
        if let Some(fault) = fault {
            if fault.connection_lost {
                return Err(Error::Database(sqlx::Error::PoolClosed));
            }
            return Err(Error::Conflict(format!(
                "insert into {} rejected for {} = {}",
                table.table, fault.column, fault.value
            )));
        }
        Self::check_unique(&state, table.table, &row, None)?;

        let id = self.allocate_id();
        row.insert(table.primary_key.to_string(), id.to_json());
        trace!(
            subsystem = "db",
            component = "memory",
            op = "insert",
            db_table = table.table,
            row_id = %id,
            "Inserted row"
        );
        state
            .tables
            .entry(table.table.to_string())
            .or_default()
            .push(row);
        let hook = state.insert_hooks.get(table.table).cloned();
        drop(state);

        if let Some(hook) = hook {
            hook();
        }
        Ok(id)
    }

    async fn update_row(&self, table: TableRef<'_>, id: &RowId, row: Row) -> Result<()> {
        let mut state = self.state();
        Self::check_unique(&state, table.table, &row, Some((table.primary_key, id)))?;

        let key = id.to_json();
        let target = state
            .tables
            .get_mut(table.table)
            .and_then(|rows| {
                rows.iter_mut()
                    .find(|r| r.get(table.primary_key) == Some(&key))
            })
            .ok_or_else(|| Error::NotFound(format!("{} {}", table.table, id)))?;

        for (column, value) in row {
            if column != table.primary_key {
                target.insert(column, value);
            }
        }
        Ok(())
    }
}

/// In-memory [`CloneAuditRepository`].
#[derive(Default)]
pub struct InMemoryAuditRepository {
    jobs: Mutex<Vec<CloneJob>>,
    fail_writes: bool,
}

impl InMemoryAuditRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// A repository whose writes always fail.
    pub fn failing() -> Self {
        Self {
            jobs: Mutex::new(Vec::new()),
            fail_writes: true,
        }
    }

    fn jobs(&self) -> MutexGuard<'_, Vec<CloneJob>> {
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn len(&self) -> usize {
        self.jobs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CloneAuditRepository for InMemoryAuditRepository {
    async fn record(&self, job: &CloneJob) -> Result<()> {
        if self.fail_writes {
            return Err(Error::Database(sqlx::Error::PoolClosed));
        }
        let mut jobs = self.jobs();
        jobs.retain(|j| j.id != job.id);
        jobs.push(job.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<CloneJob>> {
        Ok(self.jobs().iter().find(|j| j.id == id).cloned())
    }

    async fn list_for_source(&self, source: OrganizationId) -> Result<Vec<CloneJob>> {
        let mut jobs: Vec<CloneJob> = self
            .jobs()
            .iter()
            .filter(|j| j.source_organization_id == source)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PRODUCT: TableRef<'static> = TableRef {
        table: "product",
        primary_key: "id",
    };

    #[tokio::test]
    async fn test_select_by_organization_filters_and_orders() {
        let store = InMemoryStore::new();
        let org = store.add_organization("Acme", None);
        let other = store.add_organization("Other", None);
        store.seed("product", json!({"id": 3, "organization_id": org.to_json(), "name": "c"}));
        store.seed("product", json!({"id": 1, "organization_id": org.to_json(), "name": "a"}));
        store.seed("product", json!({"id": 2, "organization_id": other.to_json(), "name": "b"}));

        let rows = store
            .select_by_organization(PRODUCT, "organization_id", org)
            .await
            .unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r["id"].clone()).collect();
        assert_eq!(ids, vec![json!(1), json!(3)]);
        assert_eq!(
            store
                .count_by_organization("product", "organization_id", other)
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_insert_allocates_ids() {
        let store = InMemoryStore::new();
        let mut row = Row::new();
        row.insert("name".into(), json!("x"));

        let a = store.insert_row(PRODUCT, row.clone()).await.unwrap();
        let b = store.insert_row(PRODUCT, row).await.unwrap();
        assert_eq!(a, RowId::Int(FIRST_GENERATED_ID));
        assert_ne!(a, b);
        assert_eq!(store.rows("product").len(), 2);
    }

    #[tokio::test]
    async fn test_unique_constraint() {
        let store = InMemoryStore::new().with_unique("product", &["organization_id", "slug"]);
        let mut row = Row::new();
        row.insert("organization_id".into(), json!("o"));
        row.insert("slug".into(), json!("s"));

        store.insert_row(PRODUCT, row.clone()).await.unwrap();
        let err = store.insert_row(PRODUCT, row).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert!(!err.is_structural());
    }

    #[tokio::test]
    async fn test_select_by_reference() {
        let store = InMemoryStore::new();
        store.seed("inventory", json!({"id": 1, "pricing_plan_id": 7}));
        store.seed("inventory", json!({"id": 2, "pricing_plan_id": 8}));
        store.seed("inventory", json!({"id": 3, "pricing_plan_id": null}));

        let rows = store
            .select_by_reference(
                TableRef::new("inventory", "id"),
                "pricing_plan_id",
                &[RowId::Int(7), RowId::Int(9)],
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], json!(1));
    }

    #[tokio::test]
    async fn test_update_row_keeps_primary_key() {
        let store = InMemoryStore::new();
        store.seed("settings", json!({"id": 5, "site": "old"}));
        let mut patch = Row::new();
        patch.insert("id".into(), json!(99));
        patch.insert("site".into(), json!("new"));

        store
            .update_row(TableRef::new("settings", "id"), &RowId::Int(5), patch)
            .await
            .unwrap();
        let rows = store.rows("settings");
        assert_eq!(rows[0]["id"], json!(5));
        assert_eq!(rows[0]["site"], json!("new"));

        let missing = store
            .update_row(TableRef::new("settings", "id"), &RowId::Int(6), Row::new())
            .await;
        assert!(matches!(missing, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_injected_faults() {
        let store = InMemoryStore::new();
        store.fail_inserts_where("product", "name", json!("bad"));
        store.lose_connection_on_insert_where("product", "name", json!("gone"));
        store.make_unavailable("feature");

        let mut row = Row::new();
        row.insert("name".into(), json!("bad"));
        assert!(!store.insert_row(PRODUCT, row).await.unwrap_err().is_structural());

        let mut row = Row::new();
        row.insert("name".into(), json!("gone"));
        assert!(store.insert_row(PRODUCT, row).await.unwrap_err().is_structural());
        assert!(store.rows("product").is_empty());

        let org = store.add_organization("Acme", None);
        let err = store
            .select_by_organization(TableRef::new("feature", "id"), "organization_id", org)
            .await
            .unwrap_err();
        assert!(err.is_structural());
    }

    #[tokio::test]
    async fn test_audit_repository() {
        let repo = InMemoryAuditRepository::new();
        let source = OrganizationId::new(Uuid::new_v4());
        let mut job = CloneJob::new(source);
        repo.record(&job).await.unwrap();
        job.finish(tenantclone_core::CloneStatus::Completed);
        repo.record(&job).await.unwrap();

        assert_eq!(repo.len(), 1);
        assert_eq!(repo.get(job.id).await.unwrap().unwrap().status, job.status);
        assert_eq!(repo.list_for_source(source).await.unwrap().len(), 1);
        assert!(InMemoryAuditRepository::failing().record(&job).await.is_err());
    }
}
