//! Reactive stores and the live value model for stasis.
//!
//! A [`Store`] wraps a string-keyed mapping. Reads are plain passthroughs;
//! writes go through [`Store::set`] and are reported synchronously to every
//! registered [`ChangeListener`]. Store handles are cheap to clone and share a
//! single identity, so the same store can sit under several containers (or
//! under itself) without being copied.
//!
//! # Value Model
//!
//! - [`Value`] -- scalars, stores, QRLs, lists of values, and opaque native data
//! - [`Qrl`] -- lazy reference to an exported symbol plus its captured values,
//!   with a single-flight memo for the resolved [`Symbol`]
//!
//! # Design Rules
//!
//! 1. Reads never trigger side effects.
//! 2. A write is applied before listeners run, and listeners run after the
//!    store's lock is released, so a listener may read the store it observes.
//! 3. Equality of stores and QRLs is identity, never structural.
//! 4. Writes to a detached store fail with [`StoreError::Detached`].
//!
//! Store handles are reference counted. A cycle of stores keeps itself alive
//! until one of its edges is overwritten or removed.

pub mod error;
pub mod listener;
pub mod qrl;
pub mod store;
pub mod value;

pub use error::{InvokeError, StoreError, StoreResult};
pub use listener::{ChangeListener, ListenerId, StoreChange};
pub use qrl::{Qrl, Symbol};
pub use store::Store;
pub use value::{identical, NativeValue, Value};
