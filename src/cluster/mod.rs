//! Clusters and their nodes
//!
//! The record types the solver produces and the planner consumes, plus an
//! in-memory store keyed by cluster id.

pub mod node;
pub mod store;

pub use node::{Cluster, ClusterStatus, Node, NodeProperties};
pub use store::{ClusterStore, StoreError};
