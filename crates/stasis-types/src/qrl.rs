//! Wire form of a lazy symbol reference.
//!
//! A QRL is stored as its three parts: the chunk locator, the exported symbol
//! name, and the table ids of its captured values. The parts are kept as
//! separate fields so any chunk or symbol text survives a round trip.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::RefId;

/// Chunk, symbol, and capture ids of a serialized QRL.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QrlDescriptor {
    pub chunk: String,
    pub symbol: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub captures: Vec<RefId>,
}

impl QrlDescriptor {
    pub fn new(chunk: impl Into<String>, symbol: impl Into<String>, captures: Vec<RefId>) -> Self {
        Self {
            chunk: chunk.into(),
            symbol: symbol.into(),
            captures,
        }
    }
}

/// `chunk#symbol[c0 c1]`, for logs and error messages only.
impl fmt::Display for QrlDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.chunk, self.symbol)?;
        if !self.captures.is_empty() {
            write!(f, "[")?;
            for (i, id) in self.captures.iter().enumerate() {
                if i > 0 {
                    write!(f, " ")?;
                }
                write!(f, "{id}")?;
            }
            write!(f, "]")?;
        }
        Ok(())
    }
}
