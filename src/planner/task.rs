//! Task vertices
//!
//! A task is one provisioning action on one node, optionally for one
//! service. Node-level actions (CREATE, CONFIRM, BOOTSTRAP, DELETE) carry an
//! empty service name.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::catalog::ProvisionerAction;

/// (node, action, service) triple identifying a task
///
/// Ordered by node first so stages list each node's work together.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskNode {
    pub node_id: String,
    pub action: ProvisionerAction,
    #[serde(default)]
    pub service: String,
}

impl TaskNode {
    /// A node-level task
    pub fn node(node_id: impl Into<String>, action: ProvisionerAction) -> Self {
        Self {
            node_id: node_id.into(),
            action,
            service: String::new(),
        }
    }

    /// A service task
    pub fn service(node_id: impl Into<String>, action: ProvisionerAction, service: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            action,
            service: service.into(),
        }
    }

    pub fn is_node_task(&self) -> bool {
        self.service.is_empty()
    }
}

impl fmt::Display for TaskNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_node_task() {
            write!(f, "{}@{}", self.action, self.node_id)
        } else {
            write!(f, "{} {}@{}", self.action, self.service, self.node_id)
        }
    }
}
