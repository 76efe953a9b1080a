//! Lazy, restartable query cursor.

use std::collections::VecDeque;
use std::marker::PhantomData;

use serde_json::Value;

use crate::backend::{DocumentBackend, PageRequest};
use crate::errors::{ClientError, ResultExt, StoreError};
use crate::models::{CollectionRef, Document};
use crate::query::QuerySpec;

/// Fetches matching documents one page at a time.
///
/// Nothing is sent until the first `try_next`. `restart` rewinds to the first
/// page; ordering follows the store and is not guaranteed across runs.
pub struct DocumentCursor<'a, B, T> {
    backend: &'a B,
    collection: CollectionRef,
    spec: QuerySpec,
    page_size: usize,
    buffer: VecDeque<Value>,
    continuation: Option<String>,
    exhausted: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<'a, B: DocumentBackend, T: Document> DocumentCursor<'a, B, T> {
    pub(crate) fn new(
        backend: &'a B,
        collection: &CollectionRef,
        spec: QuerySpec,
        page_size: usize,
    ) -> Self {
        Self {
            backend,
            collection: collection.clone(),
            spec,
            page_size,
            buffer: VecDeque::new(),
            continuation: None,
            exhausted: false,
            _marker: PhantomData,
        }
    }

    /// The query sent to the store.
    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    pub async fn try_next(&mut self) -> Result<Option<T>, ClientError> {
        loop {
            if let Some(raw) = self.buffer.pop_front() {
                let document = serde_json::from_value(raw)
                    .map_err(StoreError::from)
                    .context("query_documents", &self.collection.path())?;
                return Ok(Some(document));
            }
            if self.exhausted {
                return Ok(None);
            }
            self.fetch_page().await?;
        }
    }

    /// Drain the remaining results.
    pub async fn try_collect(mut self) -> Result<Vec<T>, ClientError> {
        let mut documents = Vec::new();
        while let Some(document) = self.try_next().await? {
            documents.push(document);
        }
        Ok(documents)
    }

    pub fn restart(&mut self) {
        self.buffer.clear();
        self.continuation = None;
        self.exhausted = false;
    }

    async fn fetch_page(&mut self) -> Result<(), ClientError> {
        // The token is only replaced once a page arrives, so a failed fetch
        // can be retried from the same position.
        let request = PageRequest {
            max_items: self.page_size,
            continuation: self.continuation.clone(),
        };
        let page = self
            .backend
            .query_documents(
                &self.collection.database_id,
                &self.collection.id,
                &self.spec,
                &request,
            )
            .await
            .context("query_documents", &self.collection.path())?;

        tracing::trace!(
            "Fetched {} documents from {}",
            page.documents.len(),
            self.collection.path()
        );
        self.buffer.extend(page.documents);
        self.continuation = page.continuation;
        self.exhausted = self.continuation.is_none();
        Ok(())
    }
}
