//! Node layouts
//!
//! A NodeLayout is the shape of a node: its hardware type, image type and the
//! services it runs. Two nodes with the same shape are interchangeable for
//! the solver, so clusters are described as counts of layouts.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cluster::Node;

/// Immutable node shape, ordered by (hardware, image, services)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeLayout {
    hardware_type: String,
    image_type: String,
    services: BTreeSet<String>,
}

impl NodeLayout {
    pub fn new<I, S>(hardware_type: impl Into<String>, image_type: impl Into<String>, services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            hardware_type: hardware_type.into(),
            image_type: image_type.into(),
            services: services.into_iter().map(Into::into).collect(),
        }
    }

    /// Shape of an existing node
    pub fn of_node(node: &Node) -> Self {
        Self {
            hardware_type: node.hardware_type.clone(),
            image_type: node.image_type.clone(),
            services: node.services.clone(),
        }
    }

    pub fn hardware_type(&self) -> &str {
        &self.hardware_type
    }

    pub fn image_type(&self) -> &str {
        &self.image_type
    }

    pub fn services(&self) -> &BTreeSet<String> {
        &self.services
    }

    pub fn contains(&self, service: &str) -> bool {
        self.services.contains(service)
    }

    /// The same shape with one more service
    pub fn with_service(&self, service: &str) -> Self {
        let mut services = self.services.clone();
        services.insert(service.to_string());
        Self {
            hardware_type: self.hardware_type.clone(),
            image_type: self.image_type.clone(),
            services,
        }
    }

    /// Whether a node currently has this shape
    pub fn matches(&self, node: &Node) -> bool {
        node.hardware_type == self.hardware_type
            && node.image_type == self.image_type
            && node.services == self.services
    }
}

impl fmt::Display for NodeLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let services: Vec<&str> = self.services.iter().map(String::as_str).collect();
        write!(
            f,
            "{}/{} [{}]",
            self.hardware_type,
            self.image_type,
            services.join(", ")
        )
    }
}
