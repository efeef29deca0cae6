//! Cluster templates
//!
//! A template fixes what a cluster of its kind may contain (compatibility),
//! what it contains when the request does not say (defaults), and how
//! services must be laid out (constraints).

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::constraints::Constraints;

/// Entities a template allows
///
/// An empty set means the template places no restriction on that entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Compatibility {
    #[serde(default)]
    pub services: BTreeSet<String>,

    #[serde(default)]
    pub hardware_types: BTreeSet<String>,

    #[serde(default)]
    pub image_types: BTreeSet<String>,
}

impl Compatibility {
    pub fn allows_service(&self, name: &str) -> bool {
        self.services.is_empty() || self.services.contains(name)
    }

    pub fn allows_hardware(&self, name: &str) -> bool {
        self.hardware_types.is_empty() || self.hardware_types.contains(name)
    }

    pub fn allows_image(&self, name: &str) -> bool {
        self.image_types.is_empty() || self.image_types.contains(name)
    }
}

/// Values used when a create request leaves them out
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateDefaults {
    #[serde(default)]
    pub services: BTreeSet<String>,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hardware_type: Option<String>,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_type: Option<String>,

    /// Cluster configuration handed to every task
    #[serde(default)]
    pub config: serde_json::Value,
}

/// A blueprint for creating clusters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterTemplate {
    pub name: String,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub compatibility: Compatibility,

    #[serde(default)]
    pub defaults: TemplateDefaults,

    #[serde(default)]
    pub constraints: Constraints,
}

impl ClusterTemplate {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            compatibility: Compatibility::default(),
            defaults: TemplateDefaults::default(),
            constraints: Constraints::default(),
        }
    }

    pub fn with_default_services<I, S>(mut self, services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.defaults.services = services.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_constraints(mut self, constraints: Constraints) -> Self {
        self.constraints = constraints;
        self
    }
}
