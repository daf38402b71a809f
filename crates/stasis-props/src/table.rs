use std::collections::BTreeMap;
use std::sync::Arc;

use stasis_graph::HydrationSession;
use stasis_types::HostId;

use crate::props::Props;

/// Side table from host node to its [`Props`] container.
///
/// Holds at most one container per host. Removing a host from the table does
/// not touch the host tree; callers remove both together.
#[derive(Debug, Default)]
pub struct PropsTable {
    props: BTreeMap<HostId, Props>,
}

impl PropsTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The container for `host`, creating an empty one if absent.
    pub fn get_or_create(&mut self, host: HostId) -> Props {
        self.props
            .entry(host)
            .or_insert_with(|| Props::new(host))
            .clone()
    }

    /// The container for `host`, creating a deferred one from `session` if
    /// absent.
    pub fn get_or_hydrate(&mut self, host: HostId, session: &Arc<HydrationSession>) -> Props {
        self.props
            .entry(host)
            .or_insert_with(|| Props::deferred(host, Arc::clone(session)))
            .clone()
    }

    pub fn get(&self, host: HostId) -> Option<Props> {
        self.props.get(&host).cloned()
    }

    pub fn remove(&mut self, host: HostId) -> Option<Props> {
        self.props.remove(&host)
    }

    /// Drop every container whose host is not in `keep`.
    pub fn retain(&mut self, mut keep: impl FnMut(HostId) -> bool) {
        self.props.retain(|host, _| keep(*host));
    }

    pub fn contains(&self, host: HostId) -> bool {
        self.props.contains_key(&host)
    }

    /// Hosts with a container, in id order.
    pub fn hosts(&self) -> Vec<HostId> {
        self.props.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (HostId, &Props)> + '_ {
        self.props.iter().map(|(host, props)| (*host, props))
    }

    pub fn len(&self) -> usize {
        self.props.len()
    }

    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }
}
