//! Resource references and paths.

use serde::{Deserialize, Serialize};

/// Path of a database: `dbs/{db}`.
pub fn database_path(database_id: &str) -> String {
    format!("dbs/{}", database_id)
}

/// Path of a collection: `dbs/{db}/colls/{coll}`.
pub fn collection_path(database_id: &str, collection_id: &str) -> String {
    format!("dbs/{}/colls/{}", database_id, collection_id)
}

/// Path of a document: `dbs/{db}/colls/{coll}/docs/{id}`.
pub fn document_path(database_id: &str, collection_id: &str, document_id: &str) -> String {
    format!(
        "dbs/{}/colls/{}/docs/{}",
        database_id, collection_id, document_id
    )
}

/// A database or collection as reported by the store, with system metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub id: String,
    #[serde(rename = "_rid")]
    pub rid: String,
    #[serde(rename = "_self")]
    pub self_link: String,
    #[serde(rename = "_etag")]
    pub etag: String,
    #[serde(rename = "_ts")]
    pub ts: i64,
}

/// Handle to a provisioned database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseRef {
    pub id: String,
    pub rid: String,
}

impl DatabaseRef {
    pub fn path(&self) -> String {
        database_path(&self.id)
    }
}

impl From<ResourceRecord> for DatabaseRef {
    fn from(record: ResourceRecord) -> Self {
        Self {
            id: record.id,
            rid: record.rid,
        }
    }
}

/// Handle to a provisioned collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionRef {
    pub database_id: String,
    pub id: String,
    pub rid: String,
}

impl CollectionRef {
    pub fn from_record(database: &DatabaseRef, record: ResourceRecord) -> Self {
        Self {
            database_id: database.id.clone(),
            id: record.id,
            rid: record.rid,
        }
    }

    pub fn path(&self) -> String {
        collection_path(&self.database_id, &self.id)
    }

    pub fn document_path(&self, document_id: &str) -> String {
        document_path(&self.database_id, &self.id, document_id)
    }
}

/// What a document write actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Created,
    /// A document with the same id already existed and was left untouched.
    Skipped,
    Replaced,
}

/// Result of `upsert_document`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRef {
    pub id: String,
    pub path: String,
    pub outcome: WriteOutcome,
}
