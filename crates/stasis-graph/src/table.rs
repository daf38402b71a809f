//! The serialized table: flat entries addressed by [`RefId`], plus the
//! per-host attribute pointers into them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use stasis_types::{HostId, QrlDescriptor, RefId, Scalar};

use crate::error::{GraphError, GraphResult};

/// One encoded value.
///
/// `Record` entries are stores and are the only identity-bearing entries:
/// a store appears once no matter how many fields point at it. The other
/// kinds are plain values and get a fresh entry per occurrence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entry {
    Scalar { value: Scalar },
    Qrl(QrlDescriptor),
    Record { fields: BTreeMap<String, RefId> },
    List { items: Vec<RefId> },
}

impl Entry {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Scalar { .. } => "scalar",
            Self::Qrl(_) => "qrl",
            Self::Record { .. } => "record",
            Self::List { .. } => "list",
        }
    }

    /// Ids this entry points at.
    pub fn references(&self) -> Vec<RefId> {
        match self {
            Self::Scalar { .. } => Vec::new(),
            Self::Record { fields } => fields.values().copied().collect(),
            Self::List { items } => items.clone(),
            Self::Qrl(descriptor) => descriptor.captures.clone(),
        }
    }
}

/// A dehydrated graph.
///
/// `roots` maps each host node to its attribute pointers; `entries` is the
/// flat table those pointers (and the entries themselves) index into.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SerializedState {
    pub roots: BTreeMap<HostId, BTreeMap<String, RefId>>,
    pub entries: Vec<Entry>,
}

impl SerializedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, id: RefId) -> Option<&Entry> {
        self.entries.get(id.as_usize())
    }

    /// Attribute pointers recorded for `host`.
    pub fn root(&self, host: HostId) -> Option<&BTreeMap<String, RefId>> {
        self.roots.get(&host)
    }

    /// Hosts with at least one recorded attribute, in id order.
    pub fn hosts(&self) -> impl Iterator<Item = HostId> + '_ {
        self.roots.keys().copied()
    }

    /// Number of record (store) entries.
    pub fn record_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, Entry::Record { .. }))
            .count()
    }

    /// Check every pointer resolves inside the table.
    ///
    /// This is the eager form of the checks hydration performs lazily.
    pub fn validate(&self) -> GraphResult<()> {
        let len = self.entries.len();
        for (index, entry) in self.entries.iter().enumerate() {
            let own = table_id(index)?;
            for target in entry.references() {
                if target.as_usize() >= len {
                    return Err(GraphError::corrupt(
                        own,
                        format!("dangling reference to entry {target} (table has {len} entries)"),
                    ));
                }
            }
        }
        for (host, attrs) in &self.roots {
            for (name, target) in attrs {
                if target.as_usize() >= len {
                    return Err(GraphError::corrupt(
                        *target,
                        format!("attribute {name} of {host} points past the end of the table"),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// The [`RefId`] for table position `index`.
///
/// Ids are `u32`; a table that outgrows them is [`GraphError::TooLarge`].
pub(crate) fn table_id(index: usize) -> GraphResult<RefId> {
    u32::try_from(index)
        .map(RefId::new)
        .map_err(|_| GraphError::TooLarge {
            count: index.saturating_add(1),
            limit: u32::MAX as usize,
        })
}
