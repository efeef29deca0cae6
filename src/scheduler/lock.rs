//! Per-cluster single-flight locks

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

/// One async mutex per cluster id, created on first use
#[derive(Clone, Default)]
pub struct ClusterLocks {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl ClusterLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, cluster_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(cluster_id.to_string())
            .or_default()
            .value()
            .clone()
    }

    /// Run `f` while holding the cluster's lock
    ///
    /// Calls for the same cluster run one at a time; other clusters are not
    /// blocked.
    pub async fn run_exclusive<F, Fut, T>(&self, cluster_id: &str, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let lock = self.lock_for(cluster_id);
        let _guard = lock.lock().await;
        f().await
    }

    pub fn is_locked(&self, cluster_id: &str) -> bool {
        self.locks
            .get(cluster_id)
            .is_some_and(|lock| lock.try_lock().is_err())
    }
}
