use stasis_types::StoreId;

/// Errors from store operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    /// The store's owning host node was removed; writes are rejected.
    #[error("store {0} is detached from its host")]
    Detached(StoreId),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Failure reported by a resolved symbol when it is called.
#[derive(Clone, Debug, thiserror::Error, PartialEq, Eq)]
#[error("{message}")]
pub struct InvokeError {
    pub message: String,
}

impl InvokeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
