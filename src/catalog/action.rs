//! Action kinds shared by the catalog, the solver and the planner
//!
//! `ProvisionerAction` is a single step a worker runs on one node.
//! `ClusterAction` is what a user asks of a whole cluster; the job planner
//! expands it into provisioner actions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A provisioning step executed on a single node
///
/// The declaration order doubles as the intra-service order used when
/// building task chains (INSTALL before CONFIGURE before INITIALIZE before
/// START), so do not reorder variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProvisionerAction {
    Create,
    Confirm,
    Bootstrap,
    Install,
    Configure,
    Initialize,
    Start,
    Stop,
    Delete,
}

impl ProvisionerAction {
    /// Service actions run during a fresh install, in execution order
    pub const INSTALL_CHAIN: [ProvisionerAction; 4] = [
        ProvisionerAction::Install,
        ProvisionerAction::Configure,
        ProvisionerAction::Initialize,
        ProvisionerAction::Start,
    ];

    /// Node-level actions are not tied to any service
    pub fn is_node_action(&self) -> bool {
        matches!(
            self,
            ProvisionerAction::Create
                | ProvisionerAction::Confirm
                | ProvisionerAction::Bootstrap
                | ProvisionerAction::Delete
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisionerAction::Create => "CREATE",
            ProvisionerAction::Confirm => "CONFIRM",
            ProvisionerAction::Bootstrap => "BOOTSTRAP",
            ProvisionerAction::Install => "INSTALL",
            ProvisionerAction::Configure => "CONFIGURE",
            ProvisionerAction::Initialize => "INITIALIZE",
            ProvisionerAction::Start => "START",
            ProvisionerAction::Stop => "STOP",
            ProvisionerAction::Delete => "DELETE",
        }
    }
}

impl fmt::Display for ProvisionerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An operation requested against a whole cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClusterAction {
    ClusterCreate,
    ClusterConfigure,
    ClusterConfigureWithRestart,
    AddServices,
    StartServices,
    StopServices,
    RestartServices,
    ClusterDelete,
}

impl ClusterAction {
    pub const ALL: [ClusterAction; 8] = [
        ClusterAction::ClusterCreate,
        ClusterAction::ClusterConfigure,
        ClusterAction::ClusterConfigureWithRestart,
        ClusterAction::AddServices,
        ClusterAction::StartServices,
        ClusterAction::StopServices,
        ClusterAction::RestartServices,
        ClusterAction::ClusterDelete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterAction::ClusterCreate => "CLUSTER_CREATE",
            ClusterAction::ClusterConfigure => "CLUSTER_CONFIGURE",
            ClusterAction::ClusterConfigureWithRestart => "CLUSTER_CONFIGURE_WITH_RESTART",
            ClusterAction::AddServices => "ADD_SERVICES",
            ClusterAction::StartServices => "START_SERVICES",
            ClusterAction::StopServices => "STOP_SERVICES",
            ClusterAction::RestartServices => "RESTART_SERVICES",
            ClusterAction::ClusterDelete => "CLUSTER_DELETE",
        }
    }

    /// Whether the action needs an explicit list of services to act on
    pub fn requires_services(&self) -> bool {
        matches!(
            self,
            ClusterAction::AddServices
                | ClusterAction::StartServices
                | ClusterAction::StopServices
                | ClusterAction::RestartServices
        )
    }
}

impl fmt::Display for ClusterAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClusterAction {
    type Err = String;

    /// Accepts the canonical name (`CLUSTER_CREATE`) as well as lowercase and
    /// dashed forms, without the `cluster-` prefix or `-services` suffix
    /// (`create`, `configure-with-restart`, `restart`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase().replace('-', "_");
        ClusterAction::ALL
            .iter()
            .find(|a| {
                let name = a.as_str();
                name == normalized
                    || name.strip_prefix("CLUSTER_") == Some(normalized.as_str())
                    || name.strip_suffix("_SERVICES") == Some(normalized.as_str())
            })
            .copied()
            .ok_or_else(|| format!("unknown cluster action '{}'", s))
    }
}
