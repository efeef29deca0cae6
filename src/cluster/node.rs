//! Cluster and node records
//!
//! A Node is one machine of a cluster with the services placed on it. The
//! solver produces nodes, the planner reads them, and the store keeps the
//! current assignment between requests.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Provider-specific details resolved for a node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeProperties {
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    /// Provider flavor for the node's hardware type
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flavor: Option<String>,

    /// Provider image id for the node's image type
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// A machine in a cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,

    pub hardware_type: String,

    pub image_type: String,

    #[serde(default)]
    pub services: BTreeSet<String>,

    #[serde(default)]
    pub properties: NodeProperties,
}

impl Node {
    pub fn new(
        id: impl Into<String>,
        hardware_type: impl Into<String>,
        image_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            hardware_type: hardware_type.into(),
            image_type: image_type.into(),
            services: BTreeSet::new(),
            properties: NodeProperties::default(),
        }
    }

    /// Add services (builder style)
    pub fn with_services<I, S>(mut self, services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.services.extend(services.into_iter().map(Into::into));
        self
    }

    pub fn has_service(&self, service: &str) -> bool {
        self.services.contains(service)
    }
}

/// Lifecycle of a cluster as seen by the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClusterStatus {
    /// Accepted, waiting for a planning pass
    #[default]
    Pending,
    /// A job is running against the cluster
    Planning,
    Active,
    /// No layout satisfies the constraints
    Infeasible,
    /// The request referenced something unknown or incompatible
    Invalid,
    Failed,
    Deleted,
}

impl ClusterStatus {
    /// Whether the cluster can accept another action
    pub fn accepts_actions(&self) -> bool {
        matches!(self, ClusterStatus::Active | ClusterStatus::Failed)
    }
}

/// A cluster and its current node assignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: String,

    pub name: String,

    /// Template the cluster was created from
    pub template: String,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    #[serde(default)]
    pub nodes: Vec<Node>,

    #[serde(default)]
    pub status: ClusterStatus,

    /// Configuration handed to every task of the cluster
    #[serde(default)]
    pub config: serde_json::Value,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Cluster {
    pub fn new(id: impl Into<String>, name: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            template: template.into(),
            provider: None,
            nodes: Vec::new(),
            status: ClusterStatus::Pending,
            config: serde_json::Value::Null,
            created_at: Some(Utc::now()),
        }
    }

    pub fn with_nodes(mut self, nodes: Vec<Node>) -> Self {
        self.nodes = nodes;
        self
    }

    /// Every service placed on at least one node
    pub fn services(&self) -> BTreeSet<String> {
        self.nodes
            .iter()
            .flat_map(|n| n.services.iter().cloned())
            .collect()
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn nodes_with_service<'a>(&'a self, service: &'a str) -> impl Iterator<Item = &'a Node> {
        self.nodes.iter().filter(move |n| n.has_service(service))
    }
}
