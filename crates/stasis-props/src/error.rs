use stasis_graph::GraphError;
use stasis_types::HostId;

/// Errors from Props operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PropsError {
    /// Materializing a deferred attribute failed. The placeholder is kept.
    #[error("failed to materialize {key} on {host}: {source}")]
    Materialize {
        host: HostId,
        key: String,
        #[source]
        source: GraphError,
    },

    /// A deferred attribute exists but no hydration session is bound.
    #[error("{host} has deferred attributes but no hydration session")]
    NoSession { host: HostId },
}

/// Result alias for Props operations.
pub type PropsResult<T> = Result<T, PropsError>;
