//! In-memory cluster store
//!
//! Holds the current node assignment of every cluster. The scheduler reads a
//! cluster before planning and writes back the node set and status after.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;

use super::node::{Cluster, ClusterStatus, Node};

/// Errors returned by the cluster store
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Cluster '{0}' not found")]
    ClusterNotFound(String),

    #[error("Cluster '{0}' already exists")]
    ClusterExists(String),
}

/// Clusters indexed by id
#[derive(Clone, Default)]
pub struct ClusterStore {
    clusters: Arc<DashMap<String, Cluster>>,
}

impl ClusterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new cluster
    pub fn insert(&self, cluster: Cluster) -> Result<(), StoreError> {
        match self.clusters.entry(cluster.id.clone()) {
            Entry::Occupied(_) => Err(StoreError::ClusterExists(cluster.id)),
            Entry::Vacant(slot) => {
                slot.insert(cluster);
                Ok(())
            }
        }
    }

    /// Insert or overwrite a cluster
    pub fn put(&self, cluster: Cluster) {
        self.clusters.insert(cluster.id.clone(), cluster);
    }

    pub fn get(&self, id: &str) -> Option<Cluster> {
        self.clusters.get(id).map(|r| r.clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.clusters.contains_key(id)
    }

    /// List all clusters, ordered by id
    pub fn list(&self) -> Vec<Cluster> {
        let mut clusters: Vec<Cluster> = self.clusters.iter().map(|r| r.clone()).collect();
        clusters.sort_by(|a, b| a.id.cmp(&b.id));
        clusters
    }

    pub fn set_status(&self, id: &str, status: ClusterStatus) -> Result<(), StoreError> {
        let mut cluster = self
            .clusters
            .get_mut(id)
            .ok_or_else(|| StoreError::ClusterNotFound(id.to_string()))?;
        cluster.status = status;
        Ok(())
    }

    /// Replace the node assignment of a cluster
    pub fn set_nodes(&self, id: &str, nodes: Vec<Node>) -> Result<(), StoreError> {
        let mut cluster = self
            .clusters
            .get_mut(id)
            .ok_or_else(|| StoreError::ClusterNotFound(id.to_string()))?;
        cluster.nodes = nodes;
        Ok(())
    }

    pub fn remove(&self, id: &str) -> Result<Cluster, StoreError> {
        self.clusters
            .remove(id)
            .map(|(_, c)| c)
            .ok_or_else(|| StoreError::ClusterNotFound(id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let store = ClusterStore::new();
        store.insert(Cluster::new("c1", "one", "t")).unwrap();

        assert!(store.contains("c1"));
        assert_eq!(store.get("c1").unwrap().name, "one");
        assert_eq!(
            store.insert(Cluster::new("c1", "again", "t")),
            Err(StoreError::ClusterExists("c1".to_string()))
        );
    }

    #[test]
    fn test_status_and_nodes_updates() {
        let store = ClusterStore::new();
        store.insert(Cluster::new("c1", "one", "t")).unwrap();

        store.set_status("c1", ClusterStatus::Active).unwrap();
        store
            .set_nodes("c1", vec![Node::new("n1", "small", "centos")])
            .unwrap();

        let cluster = store.get("c1").unwrap();
        assert_eq!(cluster.status, ClusterStatus::Active);
        assert_eq!(cluster.nodes.len(), 1);
        assert!(store.set_status("missing", ClusterStatus::Active).is_err());
    }

    #[test]
    fn test_list_is_sorted() {
        let store = ClusterStore::new();
        store.put(Cluster::new("b", "b", "t"));
        store.put(Cluster::new("a", "a", "t"));

        let ids: Vec<String> = store.list().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(store.remove("a").unwrap().id, "a");
        assert_eq!(store.len(), 1);
    }
}
