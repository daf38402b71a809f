//! Host node tree.
//!
//! The host tree is the structure a UI runtime renders into: a document node
//! with ordered children beneath it. stasis only needs two things from it,
//! stable node identity ([`HostId`](stasis_types::HostId)) and a deterministic
//! traversal order, so [`HostTree`] models exactly that and nothing else.
//! Per-node data (Props, serialized state) lives in side tables keyed by
//! `HostId`, never on the nodes themselves.

pub mod error;
pub mod tree;

pub use error::{HostError, HostResult};
pub use tree::{HostNode, HostTree};
