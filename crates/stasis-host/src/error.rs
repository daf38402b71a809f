use stasis_types::HostId;

/// Errors from host tree operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HostError {
    /// The referenced node does not exist in this tree.
    #[error("host node not found: {0}")]
    NodeNotFound(HostId),

    /// The child already has a parent.
    #[error("{child} is already attached under {parent}")]
    AlreadyAttached { child: HostId, parent: HostId },

    /// Appending would make a node its own ancestor.
    #[error("appending {child} under {parent} would create a cycle")]
    CycleDetected { parent: HostId, child: HostId },

    /// The document node cannot be moved or removed.
    #[error("the document node cannot be moved or removed")]
    DocumentNode,

    /// A loaded tree breaks a structural invariant.
    #[error("invalid host tree at {node}: {reason}")]
    InvalidTree { node: HostId, reason: String },
}

/// Result alias for host tree operations.
pub type HostResult<T> = Result<T, HostError>;
