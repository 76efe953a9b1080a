//! HTTP adapter for a remote document store.

use reqwest::{Method, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use super::{DocumentBackend, Page, PageRequest};
use crate::config::Config;
use crate::errors::{ErrorResponse, StoreError};
use crate::models::ResourceRecord;
use crate::query::QuerySpec;

/// Request header carrying the authorization key.
pub const API_KEY_HEADER: &str = "x-api-key";
/// Request header marking a POST to a feed as a query rather than a create.
pub const IS_QUERY_HEADER: &str = "x-docdb-is-query";
/// Request header carrying the page size of a document query.
pub const MAX_ITEM_COUNT_HEADER: &str = "x-max-item-count";
/// Request header carrying the continuation token of a document query.
pub const CONTINUATION_HEADER: &str = "x-continuation";

/// Document store reached over HTTP.
#[derive(Debug, Clone)]
pub struct RestBackend {
    http: reqwest::Client,
    endpoint: Url,
    auth_key: String,
}

impl RestBackend {
    pub fn new(endpoint: Url, auth_key: impl Into<String>) -> Result<Self, StoreError> {
        if endpoint.cannot_be_a_base() {
            return Err(StoreError::BadRequest(format!(
                "Endpoint {} cannot carry resource paths",
                endpoint
            )));
        }

        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| StoreError::Connection(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint,
            auth_key: auth_key.into(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, StoreError> {
        Self::new(config.endpoint.clone(), config.auth_key.clone())
    }

    fn url(&self, segments: &[&str]) -> Result<Url, StoreError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::BadRequest(format!("Invalid endpoint {}", self.endpoint)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder, StoreError> {
        let url = self.url(segments)?;
        tracing::debug!("{} {}", method, url);
        Ok(self
            .http
            .request(method, url)
            .header(API_KEY_HEADER, &self.auth_key))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, StoreError> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(error_from(status, response).await);
        }
        Ok(response.json::<T>().await?)
    }

    async fn send_empty(&self, request: RequestBuilder) -> Result<(), StoreError> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(error_from(status, response).await);
        }
        Ok(())
    }
}

async fn error_from(status: StatusCode, response: reqwest::Response) -> StoreError {
    let body = response.json::<ErrorResponse>().await.ok();
    let err = StoreError::from_response(status, body);
    tracing::warn!("Request failed with {}: {}", status, err);
    err
}

impl DocumentBackend for RestBackend {
    async fn query_databases(&self, spec: &QuerySpec) -> Result<Vec<ResourceRecord>, StoreError> {
        let request = self
            .request(Method::POST, &["dbs"])?
            .header(IS_QUERY_HEADER, "true")
            .json(spec);
        self.send(request).await
    }

    async fn create_database(&self, id: &str) -> Result<ResourceRecord, StoreError> {
        let request = self.request(Method::POST, &["dbs"])?.json(&json!({ "id": id }));
        self.send(request).await
    }

    async fn delete_database(&self, id: &str) -> Result<(), StoreError> {
        let request = self.request(Method::DELETE, &["dbs", id])?;
        self.send_empty(request).await
    }

    async fn query_collections(
        &self,
        database_id: &str,
        spec: &QuerySpec,
    ) -> Result<Vec<ResourceRecord>, StoreError> {
        let request = self
            .request(Method::POST, &["dbs", database_id, "colls"])?
            .header(IS_QUERY_HEADER, "true")
            .json(spec);
        self.send(request).await
    }

    async fn create_collection(
        &self,
        database_id: &str,
        id: &str,
    ) -> Result<ResourceRecord, StoreError> {
        let request = self
            .request(Method::POST, &["dbs", database_id, "colls"])?
            .json(&json!({ "id": id }));
        self.send(request).await
    }

    async fn query_documents(
        &self,
        database_id: &str,
        collection_id: &str,
        spec: &QuerySpec,
        page: &PageRequest,
    ) -> Result<Page, StoreError> {
        let mut request = self
            .request(
                Method::POST,
                &["dbs", database_id, "colls", collection_id, "docs"],
            )?
            .header(IS_QUERY_HEADER, "true")
            .header(MAX_ITEM_COUNT_HEADER, page.max_items.to_string())
            .json(spec);
        if let Some(token) = &page.continuation {
            request = request.header(CONTINUATION_HEADER, token);
        }
        self.send(request).await
    }

    async fn create_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document: &Value,
    ) -> Result<Value, StoreError> {
        let request = self
            .request(
                Method::POST,
                &["dbs", database_id, "colls", collection_id, "docs"],
            )?
            .json(document);
        self.send(request).await
    }

    async fn replace_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
        document: &Value,
    ) -> Result<Value, StoreError> {
        let request = self
            .request(
                Method::PUT,
                &["dbs", database_id, "colls", collection_id, "docs", document_id],
            )?
            .json(document);
        self.send(request).await
    }

    async fn delete_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
    ) -> Result<(), StoreError> {
        let request = self.request(
            Method::DELETE,
            &["dbs", database_id, "colls", collection_id, "docs", document_id],
        )?;
        self.send_empty(request).await
    }
}
