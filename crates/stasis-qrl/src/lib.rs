//! Lazy symbol resolution.
//!
//! A [`Qrl`](stasis_store::Qrl) stands in for a function that lives in a code
//! chunk not yet loaded. [`QrlResolver`] turns it into a callable on first
//! use by asking the [`Platform`] to load the chunk, then memoizes the symbol
//! on the QRL so later calls never load again.
//!
//! # Resolution Rules
//!
//! 1. At most one load per QRL instance succeeds; overlapping resolutions of
//!    the same QRL share that single load.
//! 2. A failed or abandoned load leaves the memo empty. The next resolution
//!    retries.
//! 3. `invoke` passes the QRL's captured values to the symbol ahead of the
//!    call arguments.

pub mod error;
pub mod memory;
pub mod platform;
pub mod resolver;

pub use error::{QrlError, QrlResult};
pub use memory::InMemoryPlatform;
pub use platform::{Module, Platform};
pub use resolver::QrlResolver;
