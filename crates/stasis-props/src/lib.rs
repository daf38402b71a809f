//! Property containers for stasis host nodes.
//!
//! Each host node has one [`Props`] container mapping attribute names to
//! values. After a resume, attributes start out as deferred placeholders
//! pointing into the suspended table; the first [`Props::read`] of a key
//! materializes it through the node's hydration session and replaces the
//! placeholder in place, so later reads return the same store.
//!
//! [`PropsTable`] is the side table from host id to container.

pub mod error;
pub mod props;
pub mod table;

pub use error::{PropsError, PropsResult};
pub use props::{PropValue, Props};
pub use table::PropsTable;
