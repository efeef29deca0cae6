//! Hardware and image types
//!
//! Both map provider names to provider-specific identifiers (a flavor for
//! hardware, an image id for images). A type is only usable on a provider it
//! has a mapping for.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A machine size offered by one or more providers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardwareType {
    pub name: String,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Provider name -> flavor
    #[serde(default)]
    pub providers: BTreeMap<String, String>,

    /// Most nodes of this type a single cluster may use (default: unlimited)
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_nodes: Option<usize>,
}

impl HardwareType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            providers: BTreeMap::new(),
            max_nodes: None,
        }
    }

    /// Register a provider flavor (builder style)
    pub fn on_provider(mut self, provider: impl Into<String>, flavor: impl Into<String>) -> Self {
        self.providers.insert(provider.into(), flavor.into());
        self
    }

    pub fn with_max_nodes(mut self, max: usize) -> Self {
        self.max_nodes = Some(max);
        self
    }

    pub fn flavor(&self, provider: &str) -> Option<&str> {
        self.providers.get(provider).map(String::as_str)
    }
}

/// An operating system image offered by one or more providers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageType {
    pub name: String,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Provider name -> image id
    #[serde(default)]
    pub providers: BTreeMap<String, String>,
}

impl ImageType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            providers: BTreeMap::new(),
        }
    }

    /// Register a provider image id (builder style)
    pub fn on_provider(mut self, provider: impl Into<String>, image: impl Into<String>) -> Self {
        self.providers.insert(provider.into(), image.into());
        self
    }

    pub fn image(&self, provider: &str) -> Option<&str> {
        self.providers.get(provider).map(String::as_str)
    }
}
