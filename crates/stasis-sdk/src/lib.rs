//! Document-level API for stasis.
//!
//! [`Document`] ties a host tree to its Props containers and to the serialized
//! state attached to dehydrated roots. It is the entry point for applications
//! that suspend a page and resume it later, possibly in another process.

pub mod config;
pub mod context;
pub mod document;
pub mod error;

pub use config::RuntimeConfig;
pub use context::InvokeContext;
pub use document::Document;
pub use error::{SdkError, SdkResult};

// Re-export key types
pub use stasis_graph::{SerializedState, StateCodec};
pub use stasis_host::HostTree;
pub use stasis_props::{PropValue, Props};
pub use stasis_qrl::{InMemoryPlatform, Module, Platform, QrlResolver};
pub use stasis_store::{NativeValue, Qrl, Store, Symbol, Value};
pub use stasis_types::{HostId, RefId};
