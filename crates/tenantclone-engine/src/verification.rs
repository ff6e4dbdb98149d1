//! Post-clone verification pass.
//!
//! Re-reads the destination after a clone and checks what the cloner is
//! supposed to guarantee: row counts add up, every internal reference points
//! into the destination, references to non-cloned tables and external systems
//! are gone, and unique columns hold no duplicates. Findings are reported,
//! never repaired.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use serde_json::Value as JsonValue;
use tracing::{info, warn};

use tenantclone_core::{
    CloneableEntityType, EntityStore, EntityTypeResult, ForeignKeyTarget, OrganizationId, Result,
    Row, RowId, VerificationIssue, VerificationIssueKind, VerificationReport,
};

use crate::plan::ClonePlan;
use crate::scope::{owned_rows, row_ids};

/// Primary keys of one entity type per organization, loaded on demand.
struct OwnedIds<'a> {
    store: &'a dyn EntityStore,
    plan: &'a ClonePlan,
    cache: HashMap<(String, OrganizationId), HashSet<RowId>>,
}

impl<'a> OwnedIds<'a> {
    fn new(store: &'a dyn EntityStore, plan: &'a ClonePlan) -> Self {
        Self {
            store,
            plan,
            cache: HashMap::new(),
        }
    }

    async fn get(&mut self, entity_type: &str, org: OrganizationId) -> Result<&HashSet<RowId>> {
        let key = (entity_type.to_string(), org);
        if !self.cache.contains_key(&key) {
            let ids = match self.plan.get(entity_type) {
                Some(entity) => {
                    let rows = owned_rows(self.store, self.plan, entity, org).await?;
                    row_ids(entity, &rows).into_iter().collect()
                }
                None => HashSet::new(),
            };
            self.cache.insert(key.clone(), ids);
        }
        Ok(&self.cache[&key])
    }
}

fn issue(
    entity: &CloneableEntityType,
    kind: VerificationIssueKind,
    column: Option<&str>,
    row_id: Option<RowId>,
    detail: String,
) -> VerificationIssue {
    VerificationIssue {
        entity_type: entity.name.clone(),
        kind,
        column: column.map(str::to_string),
        row_id,
        detail,
    }
}

/// Rows a destination must hold for a type after its phase.
fn expected_rows(entity: &CloneableEntityType, result: &EntityTypeResult) -> u64 {
    // A singleton with an existing destination row was updated in place.
    if entity.is_singleton() && result.preexisting > 0 {
        result.preexisting
    } else {
        result.preexisting + result.succeeded
    }
}

/// Verify every entity type that has a phase result.
pub async fn verify_clone(
    store: &dyn EntityStore,
    plan: &ClonePlan,
    source: OrganizationId,
    destination: OrganizationId,
    results: &[EntityTypeResult],
) -> Result<VerificationReport> {
    let start = Instant::now();
    let mut owned = OwnedIds::new(store, plan);
    let mut report = VerificationReport::default();

    for entity in plan.entries() {
        let Some(result) = results.iter().find(|r| r.entity_type == entity.name) else {
            continue;
        };
        report.checked_types += 1;

        let rows = owned_rows(store, plan, entity, destination).await?;
        let actual = match entity.organization_scope_column() {
            Some(column) => {
                store
                    .count_by_organization(&entity.table, column, destination)
                    .await?
            }
            None => rows.len() as u64,
        };
        let expected = expected_rows(entity, result);
        if actual != expected {
            report.issues.push(issue(
                entity,
                VerificationIssueKind::CountMismatch,
                None,
                None,
                format!("expected {} rows, found {}", expected, actual),
            ));
        }

        check_references(entity, &rows, &mut owned, source, destination, &mut report.issues)
            .await?;
        check_columns(entity, &rows, &mut report.issues);
    }

    report.passed = report.issues.is_empty();
    if report.passed {
        info!(
            subsystem = "engine",
            component = "verification",
            op = "verify",
            checked_types = report.checked_types,
            duration_ms = start.elapsed().as_millis() as u64,
            "Clone verified"
        );
    } else {
        warn!(
            subsystem = "engine",
            component = "verification",
            op = "verify",
            checked_types = report.checked_types,
            issues = report.issues.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Clone verification found issues"
        );
    }
    Ok(report)
}

async fn check_references(
    entity: &CloneableEntityType,
    rows: &[Row],
    owned: &mut OwnedIds<'_>,
    source: OrganizationId,
    destination: OrganizationId,
    issues: &mut Vec<VerificationIssue>,
) -> Result<()> {
    let mut internal: Vec<(&str, &str)> = entity
        .scope_links()
        .iter()
        .map(|l| (l.column.as_str(), l.parent.as_str()))
        .collect();
    for fk in &entity.foreign_keys {
        match &fk.target {
            ForeignKeyTarget::Entity(target) => {
                internal.push((fk.column.as_str(), target.as_str()));
            }
            ForeignKeyTarget::NotCloned(table) => {
                for row in rows {
                    if row.get(&fk.column).is_some_and(|v| !v.is_null()) {
                        issues.push(issue(
                            entity,
                            VerificationIssueKind::UnclonedReference,
                            Some(&fk.column),
                            RowId::require(row, &entity.primary_key).ok(),
                            format!("still references non-cloned table {}", table),
                        ));
                    }
                }
            }
        }
    }

    for (column, target) in internal {
        let destination_ids = owned.get(target, destination).await?.clone();
        let source_ids = owned.get(target, source).await?.clone();
        for row in rows {
            let value = row.get(column).unwrap_or(&JsonValue::Null);
            let Ok(Some(id)) = RowId::from_json(value) else {
                continue;
            };
            if destination_ids.contains(&id) {
                continue;
            }
            let (kind, detail) = if source_ids.contains(&id) {
                (
                    VerificationIssueKind::CrossTenantReference,
                    format!("points at source-organization {} {}", target, id),
                )
            } else {
                (
                    VerificationIssueKind::DanglingReference,
                    format!("points at {} {} outside the destination", target, id),
                )
            };
            issues.push(issue(
                entity,
                kind,
                Some(column),
                RowId::require(row, &entity.primary_key).ok(),
                detail,
            ));
        }
    }
    Ok(())
}

fn check_columns(entity: &CloneableEntityType, rows: &[Row], issues: &mut Vec<VerificationIssue>) {
    for column in &entity.external_references {
        for row in rows {
            if row.get(column).is_some_and(|v| !v.is_null()) {
                issues.push(issue(
                    entity,
                    VerificationIssueKind::ExternalReference,
                    Some(column),
                    RowId::require(row, &entity.primary_key).ok(),
                    "external reference was carried over".to_string(),
                ));
            }
        }
    }

    for unique in &entity.unique_columns {
        let mut seen: HashSet<String> = HashSet::new();
        for row in rows {
            let Some(value) = row.get(&unique.column).filter(|v| !v.is_null()) else {
                continue;
            };
            if !seen.insert(value.to_string()) {
                issues.push(issue(
                    entity,
                    VerificationIssueKind::DuplicateValue,
                    Some(&unique.column),
                    RowId::require(row, &entity.primary_key).ok(),
                    format!("duplicate value {}", value),
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tenantclone_core::MissingTargetPolicy::NullOut;
    use tenantclone_core::UniqueKind;
    use tenantclone_db::InMemoryStore;

    fn plan() -> ClonePlan {
        ClonePlan::new(vec![
            CloneableEntityType::new("sub_type", "sub_type").unique("slug", UniqueKind::Slug),
            CloneableEntityType::new("product", "product")
                .foreign_key("sub_type_id", "sub_type", NullOut)
                .uncloned_reference("quiz_id", "quiz", NullOut)
                .external("stripe_product_id"),
        ])
        .unwrap()
    }

    fn result(entity_type: &str, succeeded: u64) -> EntityTypeResult {
        EntityTypeResult {
            entity_type: entity_type.into(),
            attempted: succeeded,
            succeeded,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_clean_destination_passes() {
        let store = InMemoryStore::new();
        let source = store.add_organization("Source", None);
        let dest = store.add_organization("Dest", None);
        store.seed("sub_type", json!({"id": 1, "organization_id": source.to_json(), "slug": "a"}));
        store.seed("sub_type", json!({"id": 2, "organization_id": dest.to_json(), "slug": "a-x"}));
        store.seed("product", json!({"id": 3, "organization_id": dest.to_json(), "sub_type_id": 2, "quiz_id": null, "stripe_product_id": null}));

        let report = verify_clone(
            &store,
            &plan(),
            source,
            dest,
            &[result("sub_type", 1), result("product", 1)],
        )
        .await
        .unwrap();
        assert!(report.passed, "{:?}", report.issues);
        assert_eq!(report.checked_types, 2);
    }

    #[tokio::test]
    async fn test_reports_every_kind_of_problem() {
        let store = InMemoryStore::new();
        let source = store.add_organization("Source", None);
        let dest = store.add_organization("Dest", None);
        store.seed("sub_type", json!({"id": 1, "organization_id": source.to_json(), "slug": "a"}));
        store.seed("sub_type", json!({"id": 2, "organization_id": dest.to_json(), "slug": "dup"}));
        store.seed("sub_type", json!({"id": 3, "organization_id": dest.to_json(), "slug": "dup"}));
        store.seed("product", json!({"id": 4, "organization_id": dest.to_json(), "sub_type_id": 1}));
        store.seed("product", json!({"id": 5, "organization_id": dest.to_json(), "sub_type_id": 999}));
        store.seed("product", json!({"id": 6, "organization_id": dest.to_json(), "quiz_id": 8, "stripe_product_id": "prod"}));

        let report = verify_clone(
            &store,
            &plan(),
            source,
            dest,
            &[result("sub_type", 1), result("product", 3)],
        )
        .await
        .unwrap();

        let kinds: Vec<_> = report.issues.iter().map(|i| i.kind).collect();
        assert!(!report.passed);
        assert!(kinds.contains(&VerificationIssueKind::CountMismatch));
        assert!(kinds.contains(&VerificationIssueKind::DuplicateValue));
        assert!(kinds.contains(&VerificationIssueKind::CrossTenantReference));
        assert!(kinds.contains(&VerificationIssueKind::DanglingReference));
        assert!(kinds.contains(&VerificationIssueKind::UnclonedReference));
        assert!(kinds.contains(&VerificationIssueKind::ExternalReference));
    }

    #[tokio::test]
    async fn test_types_without_results_are_skipped() {
        let store = InMemoryStore::new();
        let source = store.add_organization("Source", None);
        let dest = store.add_organization("Dest", None);

        let report = verify_clone(&store, &plan(), source, dest, &[result("sub_type", 0)])
            .await
            .unwrap();
        assert!(report.passed);
        assert_eq!(report.checked_types, 1);
    }

    #[test]
    fn test_singleton_update_counts_as_preexisting() {
        let entity = CloneableEntityType::new("settings", "settings").singleton();
        let mut r = result("settings", 1);
        r.preexisting = 1;
        assert_eq!(expected_rows(&entity, &r), 1);
        r.preexisting = 0;
        assert_eq!(expected_rows(&entity, &r), 1);
    }
}
