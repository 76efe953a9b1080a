//! Data models: resource references and the sample document shapes.
//!
//! Document ids are always serialized under the literal key `"id"`; all other
//! fields are camelCase.

mod family;
mod resource;
mod store;

pub use family::*;
pub use resource::*;
pub use store::*;

use serde::{de::DeserializeOwned, Serialize};

/// A record that can be written to a collection.
pub trait Document: Serialize + DeserializeOwned {
    /// Identifier unique within the containing collection.
    fn id(&self) -> &str;
}

impl Document for serde_json::Value {
    fn id(&self) -> &str {
        self.get("id").and_then(|v| v.as_str()).unwrap_or_default()
    }
}
