use std::fmt;

use stasis_types::StoreId;

use crate::value::Value;

/// Identifies a registered listener so it can be removed later.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub(crate) u64);

/// A single applied write.
#[derive(Clone, Debug)]
pub struct StoreChange {
    pub store: StoreId,
    pub key: String,
    /// Value before the write, `None` if the key was absent.
    pub old: Option<Value>,
    /// Value after the write, `None` if the key was removed.
    pub new: Option<Value>,
}

/// Receives write notifications from a store.
///
/// Called synchronously from the writing thread, after the write is applied.
/// The rendering layer uses this hook to schedule work; the store itself
/// never schedules anything.
pub trait ChangeListener: Send + Sync {
    fn on_change(&self, change: &StoreChange);
}

impl<F> ChangeListener for F
where
    F: Fn(&StoreChange) + Send + Sync,
{
    fn on_change(&self, change: &StoreChange) {
        self(change)
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener:{}", self.0)
    }
}
