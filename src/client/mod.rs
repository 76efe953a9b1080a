//! Provisioning client.
//!
//! Idempotent "ensure it exists" operations for databases and collections,
//! upsert-style document writes, equality queries and best-effort deletes, on
//! top of any `DocumentBackend`.
//!
//! Lookup-then-create is not atomic. Two callers ensuring the same id at the
//! same time can both miss the lookup; the store's uniqueness check then
//! surfaces a `Conflict` to the slower one.

mod cursor;

pub use cursor::*;

use std::future::Future;

use serde_json::Value;

use crate::backend::{DocumentBackend, PageRequest, DEFAULT_PAGE_SIZE};
use crate::config::OnConflict;
use crate::errors::{ClientError, ResultExt, StoreError};
use crate::models::{
    collection_path, database_path, CollectionRef, DatabaseRef, Document, DocumentRef,
    WriteOutcome,
};
use crate::query::{Predicate, Query, QuerySpec};

/// Result of `ensure_exists`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ensured<T> {
    Existing(T),
    Created(T),
}

impl<T> Ensured<T> {
    pub fn was_created(&self) -> bool {
        matches!(self, Ensured::Created(_))
    }

    pub fn into_inner(self) -> T {
        match self {
            Ensured::Existing(value) | Ensured::Created(value) => value,
        }
    }
}

/// Run `lookup`; only when it finds nothing, run `create`.
pub async fn ensure_exists<T, L, LF, C, CF>(lookup: L, create: C) -> Result<Ensured<T>, StoreError>
where
    L: FnOnce() -> LF,
    LF: Future<Output = Result<Option<T>, StoreError>>,
    C: FnOnce() -> CF,
    CF: Future<Output = Result<T, StoreError>>,
{
    match lookup().await? {
        Some(existing) => Ok(Ensured::Existing(existing)),
        None => create().await.map(Ensured::Created),
    }
}

/// Client facade over a document store.
pub struct ProvisioningClient<B> {
    backend: B,
    on_conflict: OnConflict,
    page_size: usize,
}

impl<B: DocumentBackend> ProvisioningClient<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            on_conflict: OnConflict::default(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_on_conflict(mut self, on_conflict: OnConflict) -> Self {
        self.on_conflict = on_conflict;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn on_conflict(&self) -> OnConflict {
        self.on_conflict
    }

    /// Return the database with `id`, creating it if absent.
    pub async fn ensure_database(&self, id: &str) -> Result<DatabaseRef, ClientError> {
        let path = database_path(id);
        let spec = QuerySpec::by_id(id);

        let ensured = ensure_exists(
            || async {
                let found = self.backend.query_databases(&spec).await?;
                Ok::<_, StoreError>(found.into_iter().next())
            },
            || self.backend.create_database(id),
        )
        .await
        .context("ensure_database", &path)?;

        if ensured.was_created() {
            tracing::info!("Created database {}", path);
        } else {
            tracing::debug!("Database {} already exists", path);
        }
        Ok(ensured.into_inner().into())
    }

    /// Return the collection with `id` under `database`, creating it if absent.
    pub async fn ensure_collection(
        &self,
        database: &DatabaseRef,
        id: &str,
    ) -> Result<CollectionRef, ClientError> {
        let path = collection_path(&database.id, id);
        let spec = QuerySpec::by_id(id);

        let ensured = ensure_exists(
            || async {
                let found = self.backend.query_collections(&database.id, &spec).await?;
                Ok::<_, StoreError>(found.into_iter().next())
            },
            || self.backend.create_collection(&database.id, id),
        )
        .await
        .context("ensure_collection", &path)?;

        if ensured.was_created() {
            tracing::info!("Created collection {}", path);
        } else {
            tracing::debug!("Collection {} already exists", path);
        }
        Ok(CollectionRef::from_record(database, ensured.into_inner()))
    }

    /// Write `document` unless one with the same id exists, in which case the
    /// configured `OnConflict` policy decides.
    pub async fn upsert_document<T: Document>(
        &self,
        collection: &CollectionRef,
        document: &T,
    ) -> Result<DocumentRef, ClientError> {
        let id = document.id().to_string();
        let path = collection.document_path(&id);
        let body = serde_json::to_value(document)
            .map_err(StoreError::from)
            .context("upsert_document", &path)?;

        let ensured = ensure_exists(
            || self.find_by_id(collection, &id),
            || self
                .backend
                .create_document(&collection.database_id, &collection.id, &body),
        )
        .await
        .context("upsert_document", &path)?;

        let outcome = match ensured {
            Ensured::Created(_) => WriteOutcome::Created,
            Ensured::Existing(_) => match self.on_conflict {
                OnConflict::Skip => {
                    tracing::debug!("Document {} already present, left untouched", path);
                    WriteOutcome::Skipped
                }
                OnConflict::Overwrite => {
                    self.backend
                        .replace_document(&collection.database_id, &collection.id, &id, &body)
                        .await
                        .context("upsert_document", &path)?;
                    WriteOutcome::Replaced
                }
                OnConflict::Error => {
                    return Err(ClientError::new(
                        "upsert_document",
                        &path,
                        StoreError::Conflict(format!("Document {} already exists", id)),
                    ));
                }
            },
        };

        Ok(DocumentRef { id, path, outcome })
    }

    /// Lazily query documents whose top-level `field` equals `value`.
    pub fn query_by_field<T: Document>(
        &self,
        collection: &CollectionRef,
        field: &str,
        value: impl Into<Value>,
    ) -> DocumentCursor<'_, B, T> {
        self.query(
            collection,
            Query::filter(Predicate::Eq {
                path: vec![field.to_string()],
                value: value.into(),
            }),
        )
    }

    /// Lazily run a query in any of the accepted styles.
    pub fn query<T: Document>(
        &self,
        collection: &CollectionRef,
        query: Query,
    ) -> DocumentCursor<'_, B, T> {
        DocumentCursor::new(&self.backend, collection, query.to_spec(), self.page_size)
    }

    /// Delete a document; a missing document is not an error, a missing
    /// database or collection is.
    pub async fn delete_document(
        &self,
        collection: &CollectionRef,
        document_id: &str,
    ) -> Result<(), ClientError> {
        let path = collection.document_path(document_id);
        match self
            .backend
            .delete_document(&collection.database_id, &collection.id, document_id)
            .await
        {
            Ok(()) => {
                tracing::info!("Deleted document {}", path);
                Ok(())
            }
            Err(StoreError::DocumentNotFound(_)) => {
                tracing::debug!("Document {} already absent", path);
                Ok(())
            }
            Err(e) => Err(ClientError::new("delete_document", path, e)),
        }
    }

    /// Delete `database` with everything in it, then release the client.
    pub async fn teardown_database(self, database: DatabaseRef) -> Result<(), ClientError> {
        let path = database.path();
        let result = self
            .backend
            .delete_database(&database.id)
            .await
            .context("teardown_database", &path);

        drop(self);
        tracing::info!("Client released after teardown of {}", path);
        result
    }

    async fn find_by_id(
        &self,
        collection: &CollectionRef,
        id: &str,
    ) -> Result<Option<Value>, StoreError> {
        let page = self
            .backend
            .query_documents(
                &collection.database_id,
                &collection.id,
                &QuerySpec::by_id(id),
                &PageRequest {
                    max_items: 1,
                    continuation: None,
                },
            )
            .await?;
        Ok(page.documents.into_iter().next())
    }
}

#[cfg(test)]
mod tests;
