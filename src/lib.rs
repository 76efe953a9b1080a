//! DocDB Provisioner
//!
//! Idempotent provisioning of databases and collections, upsert-style document
//! writes and equality queries against a remote document store, plus a local
//! emulator that serves the same REST surface from memory.

pub mod backend;
pub mod client;
pub mod config;
pub mod demo;
pub mod emulator;
pub mod errors;
pub mod models;
pub mod query;

pub use backend::{DocumentBackend, MemoryBackend, RestBackend};
pub use client::{ensure_exists, DocumentCursor, Ensured, ProvisioningClient};
pub use config::{Config, ConfigError, EmulatorConfig, OnConflict};
pub use errors::{ClientError, StoreError};
pub use models::{CollectionRef, DatabaseRef, Document, DocumentRef, WriteOutcome};
pub use query::{Predicate, Query, QuerySpec};
