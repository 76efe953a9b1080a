//! Document store backends.
//!
//! `DocumentBackend` is the capability set the provisioning client needs; each
//! method is one round-trip to the store. `MemoryBackend` keeps everything in
//! process, `RestBackend` talks HTTP to a remote service (or the emulator).

mod memory;
mod rest;

pub use memory::*;
pub use rest::*;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::StoreError;
use crate::models::ResourceRecord;
use crate::query::QuerySpec;

/// Default number of documents fetched per query page.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Paging options for a document query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub max_items: usize,
    pub continuation: Option<String>,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            max_items: DEFAULT_PAGE_SIZE,
            continuation: None,
        }
    }
}

/// One page of query results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub documents: Vec<Value>,
    /// Token for the next page; `None` once the result set is exhausted.
    pub continuation: Option<String>,
}

/// Operations a document store must support.
#[allow(async_fn_in_trait)]
pub trait DocumentBackend {
    async fn query_databases(&self, spec: &QuerySpec) -> Result<Vec<ResourceRecord>, StoreError>;

    /// Fails with `Conflict` when the id is taken.
    async fn create_database(&self, id: &str) -> Result<ResourceRecord, StoreError>;

    /// Removes the database with every collection and document in it.
    async fn delete_database(&self, id: &str) -> Result<(), StoreError>;

    async fn query_collections(
        &self,
        database_id: &str,
        spec: &QuerySpec,
    ) -> Result<Vec<ResourceRecord>, StoreError>;

    async fn create_collection(
        &self,
        database_id: &str,
        id: &str,
    ) -> Result<ResourceRecord, StoreError>;

    async fn query_documents(
        &self,
        database_id: &str,
        collection_id: &str,
        spec: &QuerySpec,
        page: &PageRequest,
    ) -> Result<Page, StoreError>;

    /// Fails with `Conflict` when a document with the same id exists.
    async fn create_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document: &Value,
    ) -> Result<Value, StoreError>;

    async fn replace_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
        document: &Value,
    ) -> Result<Value, StoreError>;

    /// Fails with `DocumentNotFound` when the collection exists but the document
    /// does not, and with `NotFound` when the collection itself is missing.
    async fn delete_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
    ) -> Result<(), StoreError>;
}

/// Lets a client borrow a backend that the caller keeps using afterwards.
impl<B: DocumentBackend> DocumentBackend for &B {
    async fn query_databases(&self, spec: &QuerySpec) -> Result<Vec<ResourceRecord>, StoreError> {
        (**self).query_databases(spec).await
    }

    async fn create_database(&self, id: &str) -> Result<ResourceRecord, StoreError> {
        (**self).create_database(id).await
    }

    async fn delete_database(&self, id: &str) -> Result<(), StoreError> {
        (**self).delete_database(id).await
    }

    async fn query_collections(
        &self,
        database_id: &str,
        spec: &QuerySpec,
    ) -> Result<Vec<ResourceRecord>, StoreError> {
        (**self).query_collections(database_id, spec).await
    }

    async fn create_collection(
        &self,
        database_id: &str,
        id: &str,
    ) -> Result<ResourceRecord, StoreError> {
        (**self).create_collection(database_id, id).await
    }

    async fn query_documents(
        &self,
        database_id: &str,
        collection_id: &str,
        spec: &QuerySpec,
        page: &PageRequest,
    ) -> Result<Page, StoreError> {
        (**self)
            .query_documents(database_id, collection_id, spec, page)
            .await
    }

    async fn create_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document: &Value,
    ) -> Result<Value, StoreError> {
        (**self)
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
        (**self)
            .replace_document(database_id, collection_id, document_id, document)
            .await
    }

    async fn delete_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
    ) -> Result<(), StoreError> {
        (**self)
            .delete_document(database_id, collection_id, document_id)
            .await
    }
}
