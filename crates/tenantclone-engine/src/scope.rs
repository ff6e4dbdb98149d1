//! Row ownership lookup.
//!
//! Organization-scoped rows are found by their organization column. Rows of
//! parent-scoped types have no such column; they belong to an organization
//! when any scope link points at a parent row the organization owns, which
//! may itself be parent-scoped.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use tenantclone_core::{
    CloneableEntityType, EntityStore, Error, OrganizationId, Result, Row, RowId, Scope, TableRef,
};

use crate::plan::ClonePlan;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Table coordinates of an entity type.
pub fn table_ref(entity: &CloneableEntityType) -> TableRef<'_> {
    TableRef::new(&entity.table, &entity.primary_key)
}

/// Primary keys of `rows`. Rows without a readable key are skipped.
pub fn row_ids(entity: &CloneableEntityType, rows: &[Row]) -> Vec<RowId> {
    rows.iter()
        .filter_map(|r| RowId::require(r, &entity.primary_key).ok())
        .collect()
}

/// Every row of `entity` owned by `org`, ordered by primary key.
pub fn owned_rows<'a>(
    store: &'a dyn EntityStore,
    plan: &'a ClonePlan,
    entity: &'a CloneableEntityType,
    org: OrganizationId,
) -> BoxFuture<'a, Result<Vec<Row>>> {
    Box::pin(async move {
        match &entity.scope {
            Scope::Organization { column } => {
                store
                    .select_by_organization(table_ref(entity), column, org)
                    .await
            }
            Scope::ViaParent { links } => {
                let mut rows: BTreeMap<RowId, Row> = BTreeMap::new();
                for link in links {
                    let parent = plan.get(&link.parent).ok_or_else(|| {
                        Error::Plan(format!(
                            "Entity type '{}' links to unknown parent '{}'",
                            entity.name, link.parent
                        ))
                    })?;
                    let parent_rows = owned_rows(store, plan, parent, org).await?;
                    let parent_ids = row_ids(parent, &parent_rows);
                    if parent_ids.is_empty() {
                        continue;
                    }
                    for row in store
                        .select_by_reference(table_ref(entity), &link.column, &parent_ids)
                        .await?
                    {
                        let id = RowId::require(&row, &entity.primary_key)?;
                        rows.entry(id).or_insert(row);
                    }
                }
                Ok(rows.into_values().collect())
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tenantclone_core::MissingTargetPolicy::NullOut;
    use tenantclone_db::InMemoryStore;

    fn plan() -> ClonePlan {
        ClonePlan::new(vec![
            CloneableEntityType::new("section", "section"),
            CloneableEntityType::new("metric", "metric"),
            CloneableEntityType::new("section_metric", "section_metric")
                .via_parent("section_id", "section")
                .via_parent("metric_id", "metric")
                .foreign_key("note_id", "section", NullOut),
            CloneableEntityType::new("nested", "nested")
                .via_parent("section_metric_id", "section_metric"),
        ])
        .unwrap()
    }

    #[tokio::test]
    async fn test_owned_rows_through_any_link() {
        let store = InMemoryStore::new();
        let org = store.add_organization("Acme", None);
        let other = store.add_organization("Other", None);
        store.seed("section", json!({"id": 1, "organization_id": org.to_json()}));
        store.seed("metric", json!({"id": 2, "organization_id": org.to_json()}));
        store.seed("metric", json!({"id": 3, "organization_id": other.to_json()}));
        store.seed("section_metric", json!({"id": 10, "section_id": 1, "metric_id": 2}));
        store.seed("section_metric", json!({"id": 11, "section_id": null, "metric_id": 2}));
        store.seed("section_metric", json!({"id": 12, "section_id": null, "metric_id": 3}));
        store.seed("nested", json!({"id": 20, "section_metric_id": 11}));

        let plan = plan();
        let rows = owned_rows(&store, &plan, plan.get("section_metric").unwrap(), org)
            .await
            .unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r["id"].clone()).collect();
        assert_eq!(ids, vec![json!(10), json!(11)]);

        let nested = owned_rows(&store, &plan, plan.get("nested").unwrap(), org)
            .await
            .unwrap();
        assert_eq!(nested.len(), 1);

        let foreign = owned_rows(&store, &plan, plan.get("section_metric").unwrap(), other)
            .await
            .unwrap();
        assert_eq!(foreign.len(), 1);
    }
}
