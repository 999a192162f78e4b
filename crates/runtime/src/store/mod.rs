//! Durable storage: the state-graph (epoch-CAS) and the object store
//! (artifact blobs referenced by claims and finality certificates).

pub mod object_store;
pub mod state_graph;

pub use object_store::{FilesystemObjectStore, ObjectStore};
pub use state_graph::{SqliteStateGraphStore, StateGraphStore};

use thiserror::Error;

use crate::types::{Epoch, ScopeId};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("scope not found: {0}")]
    ScopeNotFound(ScopeId),
    #[error("epoch conflict on scope {scope_id}: expected {expected:?}, store is at a different epoch")]
    EpochConflict { scope_id: ScopeId, expected: Epoch },
    #[error("object not found: {0}")]
    ObjectNotFound(String),
}
