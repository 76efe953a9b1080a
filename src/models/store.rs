//! Store document with its product list.

use serde::{Deserialize, Serialize};

use super::Document;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub struct Store {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub products: Vec<Product>,
}

impl Store {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            products: Vec::new(),
        }
    }
}

impl Document for Store {
    fn id(&self) -> &str {
        &self.id
    }
}

/// A product owned by a store; its id is only meaningful inside that store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub struct Product {
    pub id: String,
}
