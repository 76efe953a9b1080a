//! REST handlers serving the in-memory store.
//!
//! A POST to a feed (`/dbs`, `/dbs/{db}/colls`, `/dbs/{db}/colls/{coll}/docs`)
//! is a query when it carries `x-docdb-is-query: true`, otherwise a create.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::Value;

use super::AppState;
use crate::backend::{
    PageRequest, CONTINUATION_HEADER, DEFAULT_PAGE_SIZE, IS_QUERY_HEADER, MAX_ITEM_COUNT_HEADER,
};
use crate::errors::StoreError;
use crate::query::QuerySpec;

/// Request body for creating a database or collection.
#[derive(Debug, Deserialize)]
pub struct CreateResourceRequest {
    pub id: String,
}

fn is_query(headers: &HeaderMap) -> bool {
    headers
        .get(IS_QUERY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn page_request(headers: &HeaderMap) -> Result<PageRequest, StoreError> {
    let max_items = match headers.get(MAX_ITEM_COUNT_HEADER) {
        None => DEFAULT_PAGE_SIZE,
        Some(raw) => raw
            .to_str()
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .filter(|n| *n > 0)
            .ok_or_else(|| StoreError::BadRequest(format!("Invalid {}", MAX_ITEM_COUNT_HEADER)))?,
    };

    let continuation = headers
        .get(CONTINUATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    Ok(PageRequest {
        max_items,
        continuation,
    })
}

/// POST /dbs - Query or create databases.
pub async fn post_databases(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Response, StoreError> {
    if is_query(&headers) {
        let spec: QuerySpec = serde_json::from_value(body)?;
        let records = state.store.query_databases(&spec).await?;
        return Ok(Json(records).into_response());
    }

    let request: CreateResourceRequest = serde_json::from_value(body)?;
    let record = state.store.create_database(&request.id).await?;
    Ok((StatusCode::CREATED, Json(record)).into_response())
}

/// DELETE /dbs/{db} - Delete a database and everything in it.
pub async fn delete_database(
    State(state): State<AppState>,
    Path(database_id): Path<String>,
) -> Result<StatusCode, StoreError> {
    state.store.delete_database(&database_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /dbs/{db}/colls - Query or create collections.
pub async fn post_collections(
    State(state): State<AppState>,
    Path(database_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Response, StoreError> {
    if is_query(&headers) {
        let spec: QuerySpec = serde_json::from_value(body)?;
        let records = state.store.query_collections(&database_id, &spec).await?;
        return Ok(Json(records).into_response());
    }

    let request: CreateResourceRequest = serde_json::from_value(body)?;
    let record = state
        .store
        .create_collection(&database_id, &request.id)
        .await?;
    Ok((StatusCode::CREATED, Json(record)).into_response())
}

/// POST /dbs/{db}/colls/{coll}/docs - Query or create documents.
pub async fn post_documents(
    State(state): State<AppState>,
    Path((database_id, collection_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Response, StoreError> {
    if is_query(&headers) {
        let spec: QuerySpec = serde_json::from_value(body)?;
        let page = page_request(&headers)?;
        let result = state
            .store
            .query_documents(&database_id, &collection_id, &spec, &page)
            .await?;
        return Ok(Json(result).into_response());
    }

    let stored = state
        .store
        .create_document(&database_id, &collection_id, &body)
        .await?;
    Ok((StatusCode::CREATED, Json(stored)).into_response())
}

/// PUT /dbs/{db}/colls/{coll}/docs/{id} - Replace a document.
pub async fn replace_document(
    State(state): State<AppState>,
    Path((database_id, collection_id, document_id)): Path<(String, String, String)>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StoreError> {
    let stored = state
        .store
        .replace_document(&database_id, &collection_id, &document_id, &body)
        .await?;
    Ok(Json(stored))
}

/// DELETE /dbs/{db}/colls/{coll}/docs/{id} - Delete a document.
pub async fn delete_document(
    State(state): State<AppState>,
    Path((database_id, collection_id, document_id)): Path<(String, String, String)>,
) -> Result<StatusCode, StoreError> {
    state
        .store
        .delete_document(&database_id, &collection_id, &document_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
