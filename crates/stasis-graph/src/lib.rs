//! Graph serialization for stasis.
//!
//! Turns the live store graph reachable from host-node attributes into a flat,
//! reference-preserving table ("dehydrate"), and rebuilds live stores from
//! that table one entry at a time ("hydrate").
//!
//! # Architecture
//!
//! - [`IdentityMap`] -- store identity → table id, per dehydrate pass
//! - [`Dehydrator`] -- depth-first walk that emits a [`SerializedState`]
//! - [`Reconstructor`] -- register-then-populate materialization of table ids
//! - [`HydrationSession`] -- a table plus the reconstruction map that belongs
//!   to one resumed subtree
//! - [`StateCodec`] -- versioned JSON envelope with a BLAKE3 digest
//!
//! # Invariants
//!
//! - A store reachable along several paths is written once; every other
//!   occurrence is a reference to its id.
//! - Materializing an id that is already reconstructed returns the same store,
//!   so shared references and cycles come back with their topology intact.
//! - A failed materialization leaves no partially populated store behind.

pub mod codec;
pub mod dehydrate;
pub mod error;
pub mod hydrate;
pub mod identity;
pub mod table;

pub use codec::{Envelope, StateCodec, FORMAT_VERSION};
pub use dehydrate::Dehydrator;
pub use error::{GraphError, GraphResult};
pub use hydrate::{HydrationSession, ReconstructionMap, Reconstructor};
pub use identity::IdentityMap;
pub use table::{Entry, SerializedState};
