//! PostgreSQL integration tests for the entity store and audit repository.
//!
//! These need a running database (see `DATABASE_URL` and
//! `test_fixtures::DEFAULT_TEST_DATABASE_URL`) and are ignored by default:
//!
//! ```bash
//! cargo test -p tenantclone-db --test pg_store_test -- --ignored
//! ```
//!
//! Each test runs in its own schema created by [`TestDatabase`].

use serde_json::json;

use tenantclone_db::test_fixtures::TestDatabase;
use tenantclone_db::{
    CloneAuditRepository, CloneJob, CloneStatus, EntityStore, Error, NewOrganization, Row, RowId,
    TableRef,
};

const PRODUCT: TableRef<'static> = TableRef {
    table: "product",
    primary_key: "id",
};
const SUB_TYPE: TableRef<'static> = TableRef {
    table: "product_sub_type",
    primary_key: "id",
};
const INVENTORY: TableRef<'static> = TableRef {
    table: "inventory",
    primary_key: "id",
};

fn row(value: serde_json::Value) -> Row {
    value.as_object().cloned().expect("Fixture row must be an object")
}

#[tokio::test]
#[ignore]
async fn test_organization_create_and_get() {
    let db = TestDatabase::new().await;

    let created = db
        .store
        .create_organization(
            NewOrganization::new("Acme Copy", Some("education".into()))
                .unwrap()
                .with_created_by("ops@example.com"),
        )
        .await
        .unwrap();
    let fetched = db.store.get_organization(created.id).await.unwrap().unwrap();

    assert_eq!(fetched.name, "Acme Copy");
    assert_eq!(fetched.kind.as_deref(), Some("education"));
    assert!(!fetched.is_sample);

    db.cleanup().await;
}

#[tokio::test]
#[ignore]
async fn test_insert_and_select_by_organization() {
    let db = TestDatabase::new().await;
    let org = db.create_organization("Source", None).await;
    let other = db.create_organization("Other", None).await;

    let sub_type = db
        .store
        .insert_row(SUB_TYPE, row(json!({"organization_id": org.to_json(), "name": "Books"})))
        .await
        .unwrap();
    for (owner, name) in [(org, "second"), (org, "first"), (other, "foreign")] {
        db.store
            .insert_row(
                PRODUCT,
                row(json!({
                    "organization_id": owner.to_json(),
                    "product_name": name,
                    "slug": name,
                    "price": 12.5,
                    "product_sub_type_id": sub_type.to_json()
                })),
            )
            .await
            .unwrap();
    }

    let rows = db
        .store
        .select_by_organization(PRODUCT, "organization_id", org)
        .await
        .unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["product_name"], json!("second"));
    assert_eq!(rows[1]["product_name"], json!("first"));
    assert_eq!(rows[0]["product_sub_type_id"], sub_type.to_json());
    assert!(rows[0]["stripe_product_id"].is_null());
    assert!(matches!(RowId::require(&rows[0], "id").unwrap(), RowId::Int(_)));

    assert_eq!(
        db.store
            .count_by_organization("product", "organization_id", org)
            .await
            .unwrap(),
        2
    );

    db.cleanup().await;
}

#[tokio::test]
#[ignore]
async fn test_select_by_reference() {
    let db = TestDatabase::new().await;
    let org = db.create_organization("Source", None).await;

    let a = db
        .store
        .insert_row(PRODUCT, row(json!({"organization_id": org.to_json(), "product_name": "a"})))
        .await
        .unwrap();
    let b = db
        .store
        .insert_row(PRODUCT, row(json!({"organization_id": org.to_json(), "product_name": "b"})))
        .await
        .unwrap();
    db.store
        .insert_row(INVENTORY, row(json!({"product_id": a.to_json(), "quantity": 1})))
        .await
        .unwrap();
    db.store
        .insert_row(INVENTORY, row(json!({"product_id": b.to_json(), "quantity": 2})))
        .await
        .unwrap();

    let rows = db
        .store
        .select_by_reference(INVENTORY, "product_id", &[a])
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["quantity"], json!(1));

    let none = db
        .store
        .select_by_reference(INVENTORY, "product_id", &[])
        .await
        .unwrap();
    assert!(none.is_empty());

    db.cleanup().await;
}

#[tokio::test]
#[ignore]
async fn test_update_row() {
    let db = TestDatabase::new().await;
    let org = db.create_organization("Source", None).await;

    let id = db
        .store
        .insert_row(
            PRODUCT,
            row(json!({"organization_id": org.to_json(), "product_name": "old", "slug": "s"})),
        )
        .await
        .unwrap();
    db.store
        .update_row(PRODUCT, &id, row(json!({"product_name": "new"})))
        .await
        .unwrap();

    let rows = db
        .store
        .select_by_organization(PRODUCT, "organization_id", org)
        .await
        .unwrap();
    assert_eq!(rows[0]["product_name"], json!("new"));
    assert_eq!(rows[0]["slug"], json!("s"));

    let missing = db
        .store
        .update_row(PRODUCT, &RowId::Int(999_999), row(json!({"product_name": "x"})))
        .await;
    assert!(matches!(missing, Err(Error::NotFound(_))));

    db.cleanup().await;
}

#[tokio::test]
#[ignore]
async fn test_unique_violation_is_a_database_error() {
    let db = TestDatabase::new().await;
    let org = db.create_organization("Source", None).await;
    let product = json!({"organization_id": org.to_json(), "product_name": "p", "slug": "same"});

    db.store.insert_row(PRODUCT, row(product.clone())).await.unwrap();
    let second = db.store.insert_row(PRODUCT, row(product)).await;

    assert!(matches!(second, Err(Error::Database(_))));

    db.cleanup().await;
}

#[tokio::test]
#[ignore]
async fn test_invalid_identifier_is_rejected() {
    let db = TestDatabase::new().await;
    let org = db.create_organization("Source", None).await;

    let result = db
        .store
        .select_by_organization(
            TableRef::new("product; DROP TABLE product", "id"),
            "organization_id",
            org,
        )
        .await;

    assert!(matches!(result, Err(Error::InvalidInput(_))));

    db.cleanup().await;
}

#[tokio::test]
#[ignore]
async fn test_audit_round_trip() {
    let db = TestDatabase::new().await;
    let source = db.create_organization("Source", None).await;

    let mut job = CloneJob::new(source);
    db.audit.record(&job).await.unwrap();
    job.finish(CloneStatus::Completed);
    db.audit.record(&job).await.unwrap();

    let stored = db.audit.get(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, CloneStatus::Completed);
    assert_eq!(stored.id, job.id);

    let listed = db.audit.list_for_source(source).await.unwrap();
    assert_eq!(listed.len(), 1);

    db.cleanup().await;
}
