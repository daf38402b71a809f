use std::collections::HashMap;

use stasis_types::{RefId, StoreId};

/// Store identity → table id, for one dehydrate pass.
///
/// Seeing the same store twice during a walk yields the same id, which is
/// what turns shared references and cycles into back-references instead of
/// copies. A map is never reused across passes.
#[derive(Debug, Default)]
pub struct IdentityMap {
    ids: HashMap<StoreId, RefId>,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, store: StoreId) -> Option<RefId> {
        self.ids.get(&store).copied()
    }

    /// Record `id` for `store`. The first assignment wins; later calls for
    /// the same store return the existing id.
    pub fn assign(&mut self, store: StoreId, id: RefId) -> RefId {
        *self.ids.entry(store).or_insert(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
