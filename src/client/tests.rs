use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::{json, Value};

use super::*;
use crate::backend::{MemoryBackend, Page};
use crate::models::ResourceRecord;
use crate::demo;
use crate::models::{Address, Family, Parent};

/// Fails the first continuation fetch with a transport error.
#[derive(Default)]
struct FlakyBackend {
    inner: MemoryBackend,
    failed_once: AtomicBool,
}

impl DocumentBackend for FlakyBackend {
    async fn query_databases(&self, spec: &QuerySpec) -> Result<Vec<ResourceRecord>, StoreError> {
        self.inner.query_databases(spec).await
    }

    async fn create_database(&self, id: &str) -> Result<ResourceRecord, StoreError> {
        self.inner.create_database(id).await
    }

    async fn delete_database(&self, id: &str) -> Result<(), StoreError> {
        self.inner.delete_database(id).await
    }

    async fn query_collections(
        &self,
        database_id: &str,
        spec: &QuerySpec,
    ) -> Result<Vec<ResourceRecord>, StoreError> {
        self.inner.query_collections(database_id, spec).await
    }

    async fn create_collection(
        &self,
        database_id: &str,
        id: &str,
    ) -> Result<ResourceRecord, StoreError> {
        self.inner.create_collection(database_id, id).await
    }

    async fn query_documents(
        &self,
        database_id: &str,
        collection_id: &str,
        spec: &QuerySpec,
        page: &PageRequest,
    ) -> Result<Page, StoreError> {
        if page.continuation.is_some() && !self.failed_once.swap(true, Ordering::SeqCst) {
            return Err(StoreError::Connection("connection reset".to_string()));
        }
        self.inner
            .query_documents(database_id, collection_id, spec, page)
            .await
    }

    async fn create_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document: &Value,
    ) -> Result<Value, StoreError> {
        self.inner
            .create_document(database_id, collection_id, document)
            .await
    }

    async fn replace_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
        document: &Value,
    ) -> Result<Value, StoreError> {
        self.inner
            .replace_document(database_id, collection_id, document_id, document)
            .await
    }

    async fn delete_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
    ) -> Result<(), StoreError> {
        self.inner
            .delete_document(database_id, collection_id, document_id)
            .await
    }
}

fn client() -> ProvisioningClient<MemoryBackend> {
    ProvisioningClient::new(MemoryBackend::new())
}

fn andersen(last_name: &str) -> Family {
    Family {
        id: "AndersenFamily".to_string(),
        last_name: Some(last_name.to_string()),
        parents: vec![Parent::new("Thomas")],
        children: Vec::new(),
        address: Address {
            state: "WA".to_string(),
            county: "King".to_string(),
            city: "Seattle".to_string(),
        },
        is_registered: true,
    }
}

async fn provisioned(client: &ProvisioningClient<MemoryBackend>) -> CollectionRef {
    provisioned_on(client).await
}

async fn provisioned_on<B: DocumentBackend>(client: &ProvisioningClient<B>) -> CollectionRef {
    let db = client.ensure_database("DocumentDbPoc").await.unwrap();
    client.ensure_collection(&db, "FamilyCollection").await.unwrap()
}

fn ids(documents: &[Value]) -> Vec<String> {
    documents
        .iter()
        .map(|d| d["id"].as_str().unwrap_or_default().to_string())
        .collect()
}

#[tokio::test]
async fn test_ensure_database_is_idempotent() {
    let client = client();

    let first = client.ensure_database("DocumentDbPoc").await.unwrap();
    let second = client.ensure_database("DocumentDbPoc").await.unwrap();

    assert_eq!(first, second);
    assert_eq!(client.backend().call_counts().create_database, 1);
}

#[tokio::test]
async fn test_ensure_collection_is_idempotent() {
    let client = client();
    let db = client.ensure_database("DocumentDbPoc").await.unwrap();

    let first = client.ensure_collection(&db, "FamilyCollection").await.unwrap();
    let second = client.ensure_collection(&db, "FamilyCollection").await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.path(), "dbs/DocumentDbPoc/colls/FamilyCollection");
    assert_eq!(client.backend().call_counts().create_collection, 1);
}

#[tokio::test]
async fn test_ensure_collection_on_deleted_database() {
    let client = client();
    let db = client.ensure_database("DocumentDbPoc").await.unwrap();
    client.backend().delete_database("DocumentDbPoc").await.unwrap();

    let err = client.ensure_collection(&db, "FamilyCollection").await.unwrap_err();

    assert!(matches!(err.kind(), StoreError::NotFound(_)));
    assert_eq!(err.operation, "ensure_collection");
    assert_eq!(err.path, "dbs/DocumentDbPoc/colls/FamilyCollection");
}

#[tokio::test]
async fn test_ensure_exists_only_creates_when_lookup_misses() {
    let found = ensure_exists(|| async { Ok(Some(1)) }, || async { Ok(2) })
        .await
        .unwrap();
    assert_eq!(found, Ensured::Existing(1));

    let created = ensure_exists(|| async { Ok(None) }, || async { Ok(2) })
        .await
        .unwrap();
    assert_eq!(created, Ensured::Created(2));

    let failed: Result<Ensured<i32>, _> = ensure_exists(
        || async { Err(StoreError::Authorization("denied".to_string())) },
        || async { Ok(99) },
    )
    .await;
    assert!(matches!(failed, Err(StoreError::Authorization(_))));
}

#[tokio::test]
async fn test_query_styles_are_equivalent() {
    let client = client();
    let coll = provisioned(&client).await;
    for family in demo::sample_families() {
        client.upsert_document(&coll, &family).await.unwrap();
    }

    let raw: Vec<Value> = client
        .query(
            &coll,
            Query::sql("SELECT * FROM Families f WHERE f.id = \"AndersenFamily\""),
        )
        .try_collect()
        .await
        .unwrap();
    let declarative: Vec<Value> = client
        .query(&coll, Query::filter(Predicate::eq("id", "AndersenFamily")))
        .try_collect()
        .await
        .unwrap();
    let functional: Vec<Value> = client
        .query(&coll, Query::matching(|f| f.field("id").eq("AndersenFamily")))
        .try_collect()
        .await
        .unwrap();

    assert_eq!(ids(&raw), vec!["AndersenFamily"]);
    assert_eq!(raw, declarative);
    assert_eq!(raw, functional);
}

#[tokio::test]
async fn test_upsert_skip_keeps_first_write() {
    let client = client();
    let coll = provisioned(&client).await;

    let first = client.upsert_document(&coll, &andersen("Andersen")).await.unwrap();
    let second = client.upsert_document(&coll, &andersen("Changed")).await.unwrap();

    assert_eq!(first.outcome, WriteOutcome::Created);
    assert_eq!(second.outcome, WriteOutcome::Skipped);

    let stored: Vec<Family> = client
        .query_by_field(&coll, "id", "AndersenFamily")
        .try_collect()
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].last_name.as_deref(), Some("Andersen"));
    assert_eq!(client.backend().call_counts().create_document, 1);
}

#[tokio::test]
async fn test_upsert_overwrite_replaces() {
    let client = client().with_on_conflict(OnConflict::Overwrite);
    let coll = provisioned(&client).await;

    client.upsert_document(&coll, &andersen("Andersen")).await.unwrap();
    let second = client.upsert_document(&coll, &andersen("Changed")).await.unwrap();

    assert_eq!(second.outcome, WriteOutcome::Replaced);
    let stored: Vec<Family> = client
        .query_by_field(&coll, "id", "AndersenFamily")
        .try_collect()
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].last_name.as_deref(), Some("Changed"));
}

#[tokio::test]
async fn test_upsert_error_policy_reports_conflict() {
    let client = client().with_on_conflict(OnConflict::Error);
    let coll = provisioned(&client).await;

    client.upsert_document(&coll, &andersen("Andersen")).await.unwrap();
    let err = client
        .upsert_document(&coll, &andersen("Changed"))
        .await
        .unwrap_err();

    assert!(matches!(err.kind(), StoreError::Conflict(_)));
    assert_eq!(
        err.path,
        "dbs/DocumentDbPoc/colls/FamilyCollection/docs/AndersenFamily"
    );
}

#[tokio::test]
async fn test_delete_missing_document_is_ok() {
    let client = client();
    let coll = provisioned(&client).await;

    client.delete_document(&coll, "NoSuchFamily").await.unwrap();

    client.upsert_document(&coll, &andersen("Andersen")).await.unwrap();
    client.delete_document(&coll, "AndersenFamily").await.unwrap();
    let remaining: Vec<Value> = client
        .query_by_field(&coll, "id", "AndersenFamily")
        .try_collect()
        .await
        .unwrap();
    assert!(remaining.is_empty());
}

#[tokio::test]
async fn test_delete_through_stale_collection_fails() {
    let client = client();
    let coll = provisioned(&client).await;
    client.upsert_document(&coll, &andersen("Andersen")).await.unwrap();
    client.backend().delete_database("DocumentDbPoc").await.unwrap();

    let err = client
        .delete_document(&coll, "AndersenFamily")
        .await
        .unwrap_err();

    assert!(matches!(err.kind(), StoreError::NotFound(_)));
    assert_eq!(err.operation, "delete_document");
    assert_eq!(
        err.path,
        "dbs/DocumentDbPoc/colls/FamilyCollection/docs/AndersenFamily"
    );
}

#[tokio::test]
async fn test_end_to_end_scenario() {
    let client = client();
    let coll = provisioned(&client).await;

    client.upsert_document(&coll, &andersen("Andersen")).await.unwrap();

    let found: Vec<Family> = client
        .query_by_field(&coll, "id", "AndersenFamily")
        .try_collect()
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].last_name.as_deref(), Some("Andersen"));
    assert_eq!(found[0].parents[0].first_name, "Thomas");
}

#[tokio::test]
async fn test_rerun_creates_no_duplicates() {
    let client = client();

    for _ in 0..2 {
        let coll = provisioned(&client).await;
        client.upsert_document(&coll, &andersen("Andersen")).await.unwrap();
    }

    let backend = client.backend();
    let databases = backend.query_databases(&Query::All.to_spec()).await.unwrap();
    let collections = backend
        .query_collections("DocumentDbPoc", &Query::All.to_spec())
        .await
        .unwrap();
    assert_eq!(databases.len(), 1);
    assert_eq!(collections.len(), 1);

    let coll = provisioned(&client).await;
    let families: Vec<Value> = client
        .query_by_field(&coll, "id", "AndersenFamily")
        .try_collect()
        .await
        .unwrap();
    assert_eq!(families.len(), 1);
}

#[tokio::test]
async fn test_cursor_pages_lazily_and_restarts() {
    let client = client().with_page_size(3);
    let coll = provisioned(&client).await;
    for i in 0..7 {
        client
            .upsert_document(&coll, &json!({"id": format!("doc{}", i), "kind": "bulk"}))
            .await
            .unwrap();
    }

    let mut cursor = client.query_by_field::<Value>(&coll, "kind", "bulk");
    let mut first_pass = Vec::new();
    while let Some(doc) = cursor.try_next().await.unwrap() {
        first_pass.push(doc);
    }
    assert_eq!(first_pass.len(), 7);
    assert!(cursor.try_next().await.unwrap().is_none());

    cursor.restart();
    let second_pass = cursor.try_collect().await.unwrap();
    assert_eq!(ids(&second_pass), ids(&first_pass));
}

#[tokio::test]
async fn test_cursor_resumes_after_failed_page() {
    let client = ProvisioningClient::new(FlakyBackend::default()).with_page_size(2);
    let coll = provisioned_on(&client).await;
    for i in 0..4 {
        client
            .upsert_document(&coll, &json!({"id": format!("d{}", i), "kind": "bulk"}))
            .await
            .unwrap();
    }

    let mut cursor = client.query_by_field::<Value>(&coll, "kind", "bulk");
    let mut seen = Vec::new();
    let mut failures = 0;
    loop {
        match cursor.try_next().await {
            Ok(Some(doc)) => seen.push(doc),
            Ok(None) => break,
            Err(err) => {
                assert!(matches!(err.kind(), StoreError::Connection(_)));
                failures += 1;
            }
        }
    }

    assert_eq!(failures, 1);
    assert_eq!(ids(&seen), vec!["d0", "d1", "d2", "d3"]);
}

#[tokio::test]
async fn test_cursor_reports_bad_query() {
    let client = client();
    let coll = provisioned(&client).await;

    let err = client
        .query::<Value>(&coll, Query::sql("DELETE FROM c"))
        .try_collect()
        .await
        .unwrap_err();
    assert!(matches!(err.kind(), StoreError::BadRequest(_)));
    assert_eq!(err.operation, "query_documents");
}

#[tokio::test]
async fn test_teardown_removes_database() {
    let backend = MemoryBackend::new();
    let client = ProvisioningClient::new(&backend);
    let db = client.ensure_database("DocumentDbPoc").await.unwrap();
    let coll = client.ensure_collection(&db, "FamilyCollection").await.unwrap();
    client.upsert_document(&coll, &andersen("Andersen")).await.unwrap();

    client.teardown_database(db).await.unwrap();

    assert!(backend
        .query_databases(&Query::All.to_spec())
        .await
        .unwrap()
        .is_empty());
}
