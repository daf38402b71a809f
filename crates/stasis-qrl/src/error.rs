use stasis_store::InvokeError;

/// Errors from loading and invoking lazy symbols.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum QrlError {
    /// The platform has no chunk under this locator.
    #[error("chunk not found: {0}")]
    ChunkNotFound(String),

    /// The platform failed to load the chunk. Retrying is allowed.
    #[error("failed to load chunk {chunk}: {reason}")]
    LoadFailed { chunk: String, reason: String },

    /// The chunk loaded but does not export the symbol.
    #[error("symbol {symbol} not exported by chunk {chunk}")]
    SymbolNotFound { chunk: String, symbol: String },

    /// The symbol ran and reported a failure.
    #[error("invocation of {qrl} failed: {source}")]
    Invocation {
        qrl: String,
        #[source]
        source: InvokeError,
    },
}

impl QrlError {
    /// Whether a later attempt could succeed without changing the QRL.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LoadFailed { .. })
    }
}

/// Result alias for QRL operations.
pub type QrlResult<T> = Result<T, QrlError>;
