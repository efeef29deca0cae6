//! Service definitions
//!
//! A service is the unit that gets placed on nodes. The planner only cares
//! about which provisioning actions a service defines and what it depends
//! on; the action bodies are handed to workers untouched.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::action::ProvisionerAction;

/// How a worker performs one provisioning action for a service
///
/// Opaque to the planner; only its presence in a service's action map
/// matters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionDefinition {
    /// Automator type (e.g. "shell", "chef-solo")
    #[serde(rename = "type", default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub automator: Option<String>,

    /// Automator-specific fields passed through to workers
    #[serde(default)]
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl ActionDefinition {
    pub fn new(automator: impl Into<String>) -> Self {
        Self {
            automator: Some(automator.into()),
            fields: serde_json::Map::new(),
        }
    }
}

/// Install-time ordering refinements
///
/// `requires` must be on the cluster and installed first; `uses` is only
/// ordered against when the other service happens to be present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDependencies {
    #[serde(default)]
    pub requires: BTreeSet<String>,

    #[serde(default)]
    pub uses: BTreeSet<String>,
}

impl StageDependencies {
    pub fn is_empty(&self) -> bool {
        self.requires.is_empty() && self.uses.is_empty()
    }

    /// All services this stage orders against, required or optional
    pub fn all(&self) -> impl Iterator<Item = &String> {
        self.requires.iter().chain(self.uses.iter())
    }
}

/// A service that can be placed on cluster nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub name: String,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Services that must be running before this one starts
    #[serde(default)]
    pub depends_on: BTreeSet<String>,

    /// Provisioning actions this service implements
    #[serde(default)]
    pub actions: BTreeMap<ProvisionerAction, ActionDefinition>,

    /// Install-stage ordering, independent of `depends_on`
    #[serde(default)]
    #[serde(skip_serializing_if = "StageDependencies::is_empty")]
    pub install: StageDependencies,
}

impl Service {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            depends_on: BTreeSet::new(),
            actions: BTreeMap::new(),
            install: StageDependencies::default(),
        }
    }

    /// Add a runtime dependency (builder style)
    pub fn depends_on(mut self, service: impl Into<String>) -> Self {
        self.depends_on.insert(service.into());
        self
    }

    /// Define a provisioning action (builder style)
    pub fn with_action(mut self, action: ProvisionerAction) -> Self {
        self.actions
            .insert(action, ActionDefinition::new("shell"));
        self
    }

    /// Define several provisioning actions at once (builder style)
    pub fn with_actions(self, actions: &[ProvisionerAction]) -> Self {
        actions.iter().fold(self, |s, a| s.with_action(*a))
    }

    /// Add an install-time hard requirement (builder style)
    pub fn install_requires(mut self, service: impl Into<String>) -> Self {
        self.install.requires.insert(service.into());
        self
    }

    /// Add an install-time optional ordering (builder style)
    pub fn install_uses(mut self, service: impl Into<String>) -> Self {
        self.install.uses.insert(service.into());
        self
    }

    pub fn defines(&self, action: ProvisionerAction) -> bool {
        self.actions.contains_key(&action)
    }

    pub fn action(&self, action: ProvisionerAction) -> Option<&ActionDefinition> {
        self.actions.get(&action)
    }
}
