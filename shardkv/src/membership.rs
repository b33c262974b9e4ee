use std::{
    collections::HashSet,
    sync::{Arc, PoisonError, RwLock},
};

/// Read-only view of which servers are currently running.
///
/// Servers consult it on every request and never change it.
pub trait Membership: Send + Sync + 'static {
    /// Whether server `id` should serve requests.
    fn is_running(&self, id: usize) -> bool;
}

/// Set of running server ids, owned and mutated by whoever manages the cluster.
#[derive(Debug, Clone, Default)]
pub struct RunningSet {
    inner: Arc<RwLock<HashSet<usize>>>,
}

impl RunningSet {
    /// A set in which no server is running.
    pub fn new() -> Self {
        Self::default()
    }

    /// A set in which servers `0..n` are running.
    pub fn all(n: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new((0..n).collect())),
        }
    }

    /// Mark server `id` running.
    pub fn start(&self, id: usize) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id);
    }

    /// Mark server `id` stopped.
    pub fn stop(&self, id: usize) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }

    /// Running ids in ascending order.
    pub fn running(&self) -> Vec<usize> {
        let mut ids: Vec<_> = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .copied()
            .collect();
        ids.sort_unstable();
        ids
    }
}

impl Membership for RunningSet {
    fn is_running(&self, id: usize) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&id)
    }
}
