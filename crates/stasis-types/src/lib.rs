//! Foundation types for stasis.
//!
//! This crate provides the identifier and wire-level types shared by every
//! other stasis crate. It has no knowledge of live stores or host trees.
//!
//! # Key Types
//!
//! - [`RefId`] -- Index of an entry in a serialized table
//! - [`HostId`] -- Stable identity of a host node
//! - [`StoreId`] -- Process-unique identity of a live reactive store
//! - [`Scalar`] -- Primitive leaf value (null, bool, number, text)
//! - [`QrlDescriptor`] -- Chunk, symbol, and capture ids of a serialized QRL

pub mod error;
pub mod id;
pub mod qrl;
pub mod scalar;

pub use error::TypeError;
pub use id::{HostId, RefId, StoreId};
pub use qrl::QrlDescriptor;
pub use scalar::Scalar;
