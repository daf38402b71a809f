//! Error types for graph serialization.

use stasis_store::StoreError;
use stasis_types::RefId;

/// Errors that can occur while dehydrating or hydrating a graph.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GraphError {
    /// The table is internally inconsistent (dangling id, malformed entry,
    /// self-containing value). Reconstruction of the affected subtree is
    /// abandoned.
    #[error("corrupt graph at entry {id}: {reason}")]
    CorruptGraph { id: RefId, reason: String },

    /// A value with no serialized form was reachable from a host attribute.
    #[error("unserializable {type_name} value at {path}")]
    UnserializableValue { path: String, type_name: String },

    /// The table would exceed the configured entry limit.
    #[error("table has {count} entries, limit is {limit}")]
    TooLarge { count: usize, limit: usize },

    /// The envelope was written by an unknown format version.
    #[error("unsupported state format version: {0}")]
    UnsupportedVersion(u32),

    /// The envelope's digest does not match its body.
    #[error("state digest mismatch: expected {expected}, computed {computed}")]
    DigestMismatch { expected: String, computed: String },

    /// JSON encoding or decoding failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A store rejected a write during reconstruction.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl GraphError {
    pub(crate) fn corrupt(id: RefId, reason: impl Into<String>) -> Self {
        Self::CorruptGraph {
            id,
            reason: reason.into(),
        }
    }
}

/// Convenience alias for graph results.
pub type GraphResult<T> = Result<T, GraphError>;
