//! Clone runs against PostgreSQL.
//!
//! Ignored by default; needs the test database described in
//! `tenantclone_db::test_fixtures`:
//!
//! ```bash
//! cargo test -p tenantclone-engine --test pg_clone_test -- --ignored
//! ```

use std::sync::Arc;

use serde_json::json;

use tenantclone_core::{
    CloneAuditRepository, CloneDestination, CloneStatus, CloneableEntityType, EntityStore,
    MissingTargetPolicy::NullOut, Row, TableRef, UniqueKind,
};
use tenantclone_db::test_fixtures::TestDatabase;
use tenantclone_engine::{CloneOptions, CloneOrchestrator, ClonePlan, EngineConfig};

/// Plan over the tables created by [`TestDatabase`].
fn test_plan() -> ClonePlan {
    ClonePlan::new(vec![
        CloneableEntityType::new("settings", "settings")
            .singleton()
            .external("domain")
            .override_destination_name("site"),
        CloneableEntityType::new("product_sub_type", "product_sub_type")
            .unique("name", UniqueKind::Name),
        CloneableEntityType::new("product", "product")
            .foreign_key("product_sub_type_id", "product_sub_type", NullOut)
            .unique("slug", UniqueKind::Slug)
            .external("stripe_product_id"),
        CloneableEntityType::new("inventory", "inventory")
            .via_parent("product_id", "product")
            .override_value("quantity", json!(100)),
    ])
    .expect("Test plan should be valid")
}

fn row(value: serde_json::Value) -> Row {
    value.as_object().cloned().expect("Fixture row must be an object")
}

#[tokio::test]
#[ignore]
async fn test_clone_into_new_organization() {
    let db = TestDatabase::new().await;
    let store = db.store.clone();
    let source = db.create_organization("Source Academy", Some("education")).await;
    let org = source.to_json();

    let sub_type = store
        .insert_row(
            TableRef::new("product_sub_type", "id"),
            row(json!({"organization_id": org, "name": "Courses"})),
        )
        .await
        .unwrap();
    let product = store
        .insert_row(
            TableRef::new("product", "id"),
            row(json!({
                "organization_id": org,
                "product_name": "Intro",
                "slug": "Intro Course",
                "price": 49.0,
                "stripe_product_id": "prod_live",
                "product_sub_type_id": sub_type.to_json()
            })),
        )
        .await
        .unwrap();
    store
        .insert_row(
            TableRef::new("inventory", "id"),
            row(json!({"product_id": product.to_json(), "quantity": 3})),
        )
        .await
        .unwrap();
    store
        .insert_row(
            TableRef::new("settings", "id"),
            row(json!({"organization_id": org, "site": "Source", "domain": "source.example.com"})),
        )
        .await
        .unwrap();

    let orchestrator =
        CloneOrchestrator::new(Arc::new(store.clone()), test_plan(), EngineConfig::default())
            .with_audit(Arc::new(db.audit.clone()));
    let job = orchestrator
        .clone_organization(
            source,
            CloneDestination::New {
                name: "Academy Copy".to_string(),
            },
            CloneOptions::default(),
        )
        .await;

    assert_eq!(job.status, CloneStatus::Completed, "{:?}", job);
    assert!(job.verification.as_ref().unwrap().passed);
    let dest = job.destination_organization_id.unwrap();

    let products = store
        .select_by_organization(TableRef::new("product", "id"), "organization_id", dest)
        .await
        .unwrap();
    assert_eq!(products.len(), 1);
    assert!(products[0]["stripe_product_id"].is_null());
    assert_ne!(products[0]["product_sub_type_id"], sub_type.to_json());
    assert!(products[0]["slug"]
        .as_str()
        .unwrap()
        .starts_with("intro-course-"));

    let settings = store
        .select_by_organization(TableRef::new("settings", "id"), "organization_id", dest)
        .await
        .unwrap();
    assert_eq!(settings[0]["site"], json!("Academy Copy"));
    assert!(settings[0]["domain"].is_null());

    let audited = db.audit.get(job.id).await.unwrap().unwrap();
    assert_eq!(audited.status, CloneStatus::Completed);

    db.cleanup().await;
}
