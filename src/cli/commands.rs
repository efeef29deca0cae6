//! Command implementations for the CLI
//!
//! SBIO pattern: Commands return Results, I/O is handled by caller

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use thiserror::Error;

use crate::catalog::{Catalog, ClusterAction};
use crate::cluster::{Cluster, Node};
use crate::config::ConfigError;
use crate::layout::{ClusterCreateRequest, Solver, SolverError};
use crate::planner::{ClusterActionRequest, JobPlanner, PlanError, Stage};
use crate::settings::{PlannerSettings, SettingsError};

/// Errors that can occur during command execution
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Invalid request: {0}")]
    Solver(#[from] SolverError),

    #[error("Planning failed: {0}")]
    Plan(#[from] PlanError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No valid layout: {0}")]
    Infeasible(String),
}

/// Result type for commands
pub type CommandResult<T> = Result<T, CommandError>;

// ============================================================================
// Validate
// ============================================================================

/// Entity names found in a catalog
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogSummary {
    pub services: Vec<String>,
    pub hardware_types: Vec<String>,
    pub image_types: Vec<String>,
    pub templates: Vec<String>,
}

pub fn summarize_catalog(catalog: &Catalog) -> CatalogSummary {
    CatalogSummary {
        services: catalog.services.keys().cloned().collect(),
        hardware_types: catalog.hardware_types.keys().cloned().collect(),
        image_types: catalog.image_types.keys().cloned().collect(),
        templates: catalog.templates.keys().cloned().collect(),
    }
}

// ============================================================================
// Layout
// ============================================================================

/// One node layout and how many machines use it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayoutRow {
    pub hardware_type: String,
    pub image_type: String,
    pub services: Vec<String>,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayoutReport {
    pub cluster: String,
    pub template: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    pub total_nodes: usize,
    pub rows: Vec<LayoutRow>,
    pub service_counts: BTreeMap<String, usize>,
}

/// Solve a create request into a layout summary
pub fn solve_layout(
    catalog: &Catalog,
    settings: &PlannerSettings,
    request: &ClusterCreateRequest,
) -> CommandResult<LayoutReport> {
    let solver_settings = settings.solver();
    let solved = Solver::new(catalog, &solver_settings)
        .solve_layout(request)?
        .ok_or_else(|| infeasible(request))?;

    let rows = solved
        .entries()
        .into_iter()
        .map(|(layout, count)| LayoutRow {
            hardware_type: layout.hardware_type().to_string(),
            image_type: layout.image_type().to_string(),
            services: layout.services().iter().cloned().collect(),
            count,
        })
        .collect();

    Ok(LayoutReport {
        cluster: request.name.clone(),
        template: request.template.clone(),
        provider: solved.provider.clone(),
        total_nodes: solved.layout.total_nodes(),
        rows,
        service_counts: solved.layout.service_counts(),
    })
}

/// Solve a create request into concrete nodes
pub fn solve_nodes(
    catalog: &Catalog,
    settings: &PlannerSettings,
    request: &ClusterCreateRequest,
) -> CommandResult<Vec<Node>> {
    let solver_settings = settings.solver();
    Solver::new(catalog, &solver_settings)
        .solve_cluster_nodes(request)?
        .ok_or_else(|| infeasible(request))
}

fn infeasible(request: &ClusterCreateRequest) -> CommandError {
    CommandError::Infeasible(format!(
        "{} nodes of template '{}' cannot satisfy the constraints",
        request.num_machines, request.template
    ))
}

// ============================================================================
// Plan
// ============================================================================

/// Build an action request; empty lists mean "not given"
pub fn action_request(action: ClusterAction, services: &[String], nodes: &[String]) -> ClusterActionRequest {
    let mut request = ClusterActionRequest::new(action);
    if !services.is_empty() {
        request = request.with_services(services.iter().cloned());
    }
    if !nodes.is_empty() {
        request = request.with_nodes(nodes.iter().cloned());
    }
    request
}

/// Plan an action on a cluster
pub fn plan_stages(
    catalog: &Catalog,
    cluster: &Cluster,
    request: ClusterActionRequest,
    raw: bool,
) -> CommandResult<Vec<Stage>> {
    let planner = JobPlanner::new(&cluster.nodes, &catalog.services, request)?;
    let stages = if raw { planner.linearize()? } else { planner.plan()? };
    Ok(stages)
}

// ============================================================================
// Add services
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddServicesReport {
    pub cluster: Cluster,
    /// Nodes that gained each service
    pub added: BTreeMap<String, usize>,
}

/// Place services on an existing cluster
pub fn add_services(
    catalog: &Catalog,
    settings: &PlannerSettings,
    cluster: &Cluster,
    services: &[String],
) -> CommandResult<AddServicesReport> {
    let requested: BTreeSet<String> = services.iter().cloned().collect();
    let solver_settings = settings.solver();
    let nodes = Solver::new(catalog, &solver_settings)
        .add_services(cluster, &requested)?
        .ok_or_else(|| {
            CommandError::Infeasible(format!(
                "services {} do not fit on cluster '{}'",
                services.join(", "),
                cluster.id
            ))
        })?;

    let before: BTreeMap<&str, &Node> = cluster.nodes.iter().map(|n| (n.id.as_str(), n)).collect();
    let mut added = BTreeMap::new();
    for node in &nodes {
        let old = before.get(node.id.as_str());
        for service in &node.services {
            if old.map_or(true, |n| !n.has_service(service)) {
                *added.entry(service.clone()).or_insert(0) += 1;
            }
        }
    }

    let mut updated = cluster.clone();
    updated.nodes = nodes;
    Ok(AddServicesReport { cluster: updated, added })
}
