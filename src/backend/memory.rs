//! In-memory document store.
//!
//! Backs the emulator and the unit tests. Enforces id uniqueness at every
//! level and keeps documents in insertion order.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{DocumentBackend, Page, PageRequest};
use crate::errors::StoreError;
use crate::models::{collection_path, database_path, document_path, ResourceRecord};
use crate::query::{sql, QuerySpec};

/// Number of create/replace calls the store has accepted or rejected.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CallCounts {
    pub create_database: usize,
    pub create_collection: usize,
    pub create_document: usize,
    pub replace_document: usize,
}

#[derive(Default)]
struct Counters {
    create_database: AtomicUsize,
    create_collection: AtomicUsize,
    create_document: AtomicUsize,
    replace_document: AtomicUsize,
}

struct CollectionState {
    record: ResourceRecord,
    /// Insertion sequence -> document
    documents: BTreeMap<u64, Value>,
    ids: HashMap<String, u64>,
    next_seq: u64,
}

struct DatabaseState {
    record: ResourceRecord,
    collections: Vec<CollectionState>,
}

impl DatabaseState {
    fn collection(&self, id: &str) -> Result<&CollectionState, StoreError> {
        self.collections
            .iter()
            .find(|c| c.record.id == id)
            .ok_or_else(|| {
                StoreError::NotFound(format!(
                    "Collection {} not found",
                    collection_path(&self.record.id, id)
                ))
            })
    }

    fn collection_mut(&mut self, id: &str) -> Result<&mut CollectionState, StoreError> {
        let database_id = self.record.id.clone();
        self.collections
            .iter_mut()
            .find(|c| c.record.id == id)
            .ok_or_else(|| {
                StoreError::NotFound(format!(
                    "Collection {} not found",
                    collection_path(&database_id, id)
                ))
            })
    }
}

#[derive(Default)]
struct StoreState {
    databases: Vec<DatabaseState>,
}

impl StoreState {
    fn database(&self, id: &str) -> Result<&DatabaseState, StoreError> {
        self.databases
            .iter()
            .find(|d| d.record.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("Database {} not found", id)))
    }

    fn database_mut(&mut self, id: &str) -> Result<&mut DatabaseState, StoreError> {
        self.databases
            .iter_mut()
            .find(|d| d.record.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("Database {} not found", id)))
    }
}

/// Document store held entirely in memory.
#[derive(Default)]
pub struct MemoryBackend {
    state: RwLock<StoreState>,
    counters: Counters,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn call_counts(&self) -> CallCounts {
        CallCounts {
            create_database: self.counters.create_database.load(Ordering::Relaxed),
            create_collection: self.counters.create_collection.load(Ordering::Relaxed),
            create_document: self.counters.create_document.load(Ordering::Relaxed),
            replace_document: self.counters.replace_document.load(Ordering::Relaxed),
        }
    }

    pub async fn query_databases(&self, spec: &QuerySpec) -> Result<Vec<ResourceRecord>, StoreError> {
        let parsed = sql::parse(spec)?;
        let state = self.state.read().await;
        filter_records(state.databases.iter().map(|d| &d.record), &parsed)
    }

    pub async fn create_database(&self, id: &str) -> Result<ResourceRecord, StoreError> {
        self.counters.create_database.fetch_add(1, Ordering::Relaxed);
        validate_id(id)?;

        let mut state = self.state.write().await;
        if state.databases.iter().any(|d| d.record.id == id) {
            return Err(StoreError::Conflict(format!("Database {} already exists", id)));
        }

        let record = new_record(id, database_path(id));
        state.databases.push(DatabaseState {
            record: record.clone(),
            collections: Vec::new(),
        });
        tracing::debug!("Created database {}", id);
        Ok(record)
    }

    pub async fn delete_database(&self, id: &str) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let before = state.databases.len();
        state.databases.retain(|d| d.record.id != id);

        if state.databases.len() == before {
            return Err(StoreError::NotFound(format!("Database {} not found", id)));
        }
        tracing::debug!("Deleted database {}", id);
        Ok(())
    }

    pub async fn query_collections(
        &self,
        database_id: &str,
        spec: &QuerySpec,
    ) -> Result<Vec<ResourceRecord>, StoreError> {
        let parsed = sql::parse(spec)?;
        let state = self.state.read().await;
        let database = state.database(database_id)?;
        filter_records(database.collections.iter().map(|c| &c.record), &parsed)
    }

    pub async fn create_collection(
        &self,
        database_id: &str,
        id: &str,
    ) -> Result<ResourceRecord, StoreError> {
        self.counters.create_collection.fetch_add(1, Ordering::Relaxed);
        validate_id(id)?;

        let mut state = self.state.write().await;
        let database = state.database_mut(database_id)?;
        if database.collections.iter().any(|c| c.record.id == id) {
            return Err(StoreError::Conflict(format!(
                "Collection {} already exists",
                collection_path(database_id, id)
            )));
        }

        let record = new_record(id, collection_path(database_id, id));
        database.collections.push(CollectionState {
            record: record.clone(),
            documents: BTreeMap::new(),
            ids: HashMap::new(),
            next_seq: 0,
        });
        tracing::debug!("Created collection {}", record.self_link);
        Ok(record)
    }

    pub async fn query_documents(
        &self,
        database_id: &str,
        collection_id: &str,
        spec: &QuerySpec,
        page: &PageRequest,
    ) -> Result<Page, StoreError> {
        let parsed = sql::parse(spec)?;
        let start = match &page.continuation {
            None => 0,
            Some(token) => token
                .parse::<u64>()
                .ok()
                .and_then(|last| last.checked_add(1))
                .ok_or_else(|| StoreError::BadRequest(format!("Invalid continuation '{}'", token)))?,
        };
        let max_items = page.max_items.max(1);

        let state = self.state.read().await;
        let collection = state.database(database_id)?.collection(collection_id)?;

        let mut matched: Vec<(u64, &Value)> = collection
            .documents
            .range(start..)
            .filter(|(_, doc)| parsed.matches(doc))
            .take(max_items + 1)
            .map(|(seq, doc)| (*seq, doc))
            .collect();

        let continuation = if matched.len() > max_items {
            matched.truncate(max_items);
            matched.last().map(|(seq, _)| seq.to_string())
        } else {
            None
        };

        Ok(Page {
            documents: matched.into_iter().map(|(_, doc)| doc.clone()).collect(),
            continuation,
        })
    }

    pub async fn create_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document: &Value,
    ) -> Result<Value, StoreError> {
        self.counters.create_document.fetch_add(1, Ordering::Relaxed);
        let id = extract_id(document)?;

        let mut state = self.state.write().await;
        let collection = state.database_mut(database_id)?.collection_mut(collection_id)?;
        if collection.ids.contains_key(&id) {
            return Err(StoreError::Conflict(format!(
                "Document {} already exists",
                document_path(database_id, collection_id, &id)
            )));
        }

        let stored = stamp(document, document_path(database_id, collection_id, &id), None)?;
        let seq = collection.next_seq;
        collection.next_seq += 1;
        collection.ids.insert(id, seq);
        collection.documents.insert(seq, stored.clone());
        Ok(stored)
    }

    pub async fn replace_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
        document: &Value,
    ) -> Result<Value, StoreError> {
        self.counters.replace_document.fetch_add(1, Ordering::Relaxed);
        let id = extract_id(document)?;
        if id != document_id {
            return Err(StoreError::BadRequest(format!(
                "Document id '{}' does not match '{}'",
                id, document_id
            )));
        }

        let mut state = self.state.write().await;
        let collection = state.database_mut(database_id)?.collection_mut(collection_id)?;
        let path = document_path(database_id, collection_id, document_id);
        let seq = *collection
            .ids
            .get(document_id)
            .ok_or_else(|| StoreError::DocumentNotFound(format!("Document {} not found", path)))?;

        let rid = collection
            .documents
            .get(&seq)
            .and_then(|d| d.get("_rid"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let stored = stamp(document, path, rid)?;
        collection.documents.insert(seq, stored.clone());
        Ok(stored)
    }

    pub async fn delete_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let collection = state.database_mut(database_id)?.collection_mut(collection_id)?;

        match collection.ids.remove(document_id) {
            Some(seq) => {
                collection.documents.remove(&seq);
                Ok(())
            }
            None => Err(StoreError::DocumentNotFound(format!(
                "Document {} not found",
                document_path(database_id, collection_id, document_id)
            ))),
        }
    }
}

impl DocumentBackend for MemoryBackend {
    async fn query_databases(&self, spec: &QuerySpec) -> Result<Vec<ResourceRecord>, StoreError> {
        MemoryBackend::query_databases(self, spec).await
    }

    async fn create_database(&self, id: &str) -> Result<ResourceRecord, StoreError> {
        MemoryBackend::create_database(self, id).await
    }

    async fn delete_database(&self, id: &str) -> Result<(), StoreError> {
        MemoryBackend::delete_database(self, id).await
    }

    async fn query_collections(
        &self,
        database_id: &str,
        spec: &QuerySpec,
    ) -> Result<Vec<ResourceRecord>, StoreError> {
        MemoryBackend::query_collections(self, database_id, spec).await
    }

    async fn create_collection(
        &self,
        database_id: &str,
        id: &str,
    ) -> Result<ResourceRecord, StoreError> {
        MemoryBackend::create_collection(self, database_id, id).await
    }

    async fn query_documents(
        &self,
        database_id: &str,
        collection_id: &str,
        spec: &QuerySpec,
        page: &PageRequest,
    ) -> Result<Page, StoreError> {
        MemoryBackend::query_documents(self, database_id, collection_id, spec, page).await
    }

    async fn create_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document: &Value,
    ) -> Result<Value, StoreError> {
        MemoryBackend::create_document(self, database_id, collection_id, document).await
    }

    async fn replace_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
        document: &Value,
    ) -> Result<Value, StoreError> {
        MemoryBackend::replace_document(self, database_id, collection_id, document_id, document)
            .await
    }

    async fn delete_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
    ) -> Result<(), StoreError> {
        MemoryBackend::delete_document(self, database_id, collection_id, document_id).await
    }
}

fn validate_id(id: &str) -> Result<(), StoreError> {
    if id.trim().is_empty() {
        return Err(StoreError::BadRequest("Resource id is required".to_string()));
    }
    if id.contains('/') {
        return Err(StoreError::BadRequest(format!(
            "Resource id '{}' must not contain '/'",
            id
        )));
    }
    Ok(())
}

fn extract_id(document: &Value) -> Result<String, StoreError> {
    let id = document
        .as_object()
        .ok_or_else(|| StoreError::BadRequest("Document must be a JSON object".to_string()))?
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| StoreError::BadRequest("Document requires a string 'id'".to_string()))?;
    validate_id(id)?;
    Ok(id.to_string())
}

fn new_record(id: &str, self_link: String) -> ResourceRecord {
    ResourceRecord {
        id: id.to_string(),
        rid: uuid::Uuid::new_v4().to_string(),
        self_link,
        etag: uuid::Uuid::new_v4().to_string(),
        ts: Utc::now().timestamp(),
    }
}

/// Copy `document` and attach system metadata, keeping `rid` when given.
fn stamp(document: &Value, self_link: String, rid: Option<String>) -> Result<Value, StoreError> {
    let mut stored = document.clone();
    let object = stored
        .as_object_mut()
        .ok_or_else(|| StoreError::BadRequest("Document must be a JSON object".to_string()))?;

    object.insert(
        "_rid".to_string(),
        Value::String(rid.unwrap_or_else(|| uuid::Uuid::new_v4().to_string())),
    );
    object.insert("_self".to_string(), Value::String(self_link));
    object.insert(
        "_etag".to_string(),
        Value::String(uuid::Uuid::new_v4().to_string()),
    );
    object.insert("_ts".to_string(), Value::from(Utc::now().timestamp()));
    Ok(stored)
}

fn filter_records<'a>(
    records: impl Iterator<Item = &'a ResourceRecord>,
    parsed: &sql::ParsedQuery,
) -> Result<Vec<ResourceRecord>, StoreError> {
    let mut matched = Vec::new();
    for record in records {
        if parsed.matches(&serde_json::to_value(record)?) {
            matched.push(record.clone());
        }
    }
    Ok(matched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Predicate, Query};
    use serde_json::json;

    async fn with_collection() -> MemoryBackend {
        let backend = MemoryBackend::new();
        backend.create_database("db").await.unwrap();
        backend.create_collection("db", "coll").await.unwrap();
        backend
    }

    #[tokio::test]
    async fn test_create_database_conflict() {
        let backend = MemoryBackend::new();
        let record = backend.create_database("db").await.unwrap();
        assert_eq!(record.self_link, "dbs/db");

        let err = backend.create_database("db").await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(backend.call_counts().create_database, 2);
    }

    #[tokio::test]
    async fn test_query_databases_by_id() {
        let backend = MemoryBackend::new();
        backend.create_database("a").await.unwrap();
        backend.create_database("b").await.unwrap();

        let found = backend.query_databases(&QuerySpec::by_id("b")).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "b");

        let all = backend.query_databases(&Query::All.to_spec()).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_collection_requires_database() {
        let backend = MemoryBackend::new();
        let err = backend.create_collection("missing", "coll").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));

        let err = backend
            .query_collections("missing", &QuerySpec::by_id("coll"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_document_lifecycle() {
        let backend = with_collection().await;

        let stored = backend
            .create_document("db", "coll", &json!({"id": "x", "v": 1}))
            .await
            .unwrap();
        assert_eq!(stored["_self"], "dbs/db/colls/coll/docs/x");
        assert!(stored["_rid"].is_string());

        let err = backend
            .create_document("db", "coll", &json!({"id": "x", "v": 2}))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let replaced = backend
            .replace_document("db", "coll", "x", &json!({"id": "x", "v": 3}))
            .await
            .unwrap();
        assert_eq!(replaced["v"], 3);
        assert_eq!(replaced["_rid"], stored["_rid"]);

        backend.delete_document("db", "coll", "x").await.unwrap();
        let err = backend.delete_document("db", "coll", "x").await.unwrap_err();
        assert!(matches!(err, StoreError::DocumentNotFound(_)));

        let err = backend.delete_document("db", "gone", "x").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_rejects_documents_without_id() {
        let backend = with_collection().await;

        for doc in [json!({"name": "no id"}), json!({"id": 5}), json!([1, 2])] {
            let err = backend.create_document("db", "coll", &doc).await.unwrap_err();
            assert!(matches!(err, StoreError::BadRequest(_)));
        }
    }

    #[tokio::test]
    async fn test_query_pages_in_insertion_order() {
        let backend = with_collection().await;
        for i in 0..5 {
            backend
                .create_document("db", "coll", &json!({"id": format!("d{}", i), "even": i % 2 == 0}))
                .await
                .unwrap();
        }
        backend.delete_document("db", "coll", "d2").await.unwrap();

        let spec = Query::filter(Predicate::eq("even", true)).to_spec();
        let mut page = PageRequest {
            max_items: 1,
            continuation: None,
        };
        let mut ids = Vec::new();
        loop {
            let result = backend.query_documents("db", "coll", &spec, &page).await.unwrap();
            ids.extend(result.documents.iter().map(|d| d["id"].as_str().unwrap().to_string()));
            match result.continuation {
                Some(token) => page.continuation = Some(token),
                None => break,
            }
        }
        assert_eq!(ids, vec!["d0", "d4"]);
    }

    #[tokio::test]
    async fn test_rejects_out_of_range_continuation() {
        let backend = with_collection().await;
        backend
            .create_document("db", "coll", &json!({"id": "x"}))
            .await
            .unwrap();

        for token in [u64::MAX.to_string(), "-1".to_string(), "abc".to_string()] {
            let page = PageRequest {
                max_items: 1,
                continuation: Some(token),
            };
            let err = backend
                .query_documents("db", "coll", &Query::All.to_spec(), &page)
                .await
                .unwrap_err();
            assert!(matches!(err, StoreError::BadRequest(_)));
        }
    }

    #[tokio::test]
    async fn test_delete_database_drops_contents() {
        let backend = with_collection().await;
        backend
            .create_document("db", "coll", &json!({"id": "x"}))
            .await
            .unwrap();

        backend.delete_database("db").await.unwrap();
        assert!(backend.query_databases(&Query::All.to_spec()).await.unwrap().is_empty());
        let err = backend
            .query_documents("db", "coll", &Query::All.to_spec(), &PageRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
