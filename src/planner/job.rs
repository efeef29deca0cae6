//! Job planning
//!
//! Expands a cluster action into a task graph over the cluster's nodes and
//! turns it into ordered stages. Each action has its own shape:
//!
//! | Action                  | Per node                        | Cross-service order |
//! |-------------------------|---------------------------------|---------------------|
//! | CREATE                  | CREATE, CONFIRM, BOOTSTRAP, install chain | install, start |
//! | CONFIGURE               | BOOTSTRAP, CONFIGURE            | none                |
//! | CONFIGURE_WITH_RESTART  | BOOTSTRAP, STOP, CONFIGURE, START | stop, start       |
//! | ADD_SERVICES            | BOOTSTRAP, install chain of new services | install, start |
//! | START / STOP / RESTART  | START and/or STOP               | start and/or stop   |
//! | DELETE                  | DELETE                          | none                |
//!
//! An edge whose prerequisite task is not part of the plan (a node outside
//! the requested subset, or a service that is not being touched) counts as
//! already satisfied.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::{ClusterAction, ProvisionerAction, Service};
use crate::cluster::Node;

use super::dag::{deduplicate, Stage, TaskDag};
use super::dependency::{ActionEdge, ServiceAction, ServiceDependencyResolver, START_RULES, STOP_RULES};
use super::task::TaskNode;
use super::PlanError;

/// What to do to a cluster, and optionally where
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterActionRequest {
    pub action: ClusterAction,

    /// Services to act on (required for add/start/stop/restart)
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub services: Option<BTreeSet<String>>,

    /// Restrict the plan to these node ids
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nodes: Option<BTreeSet<String>>,
}

impl ClusterActionRequest {
    pub fn new(action: ClusterAction) -> Self {
        Self {
            action,
            services: None,
            nodes: None,
        }
    }

    pub fn with_services<I, S>(mut self, services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.services = Some(services.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_nodes<I, S>(mut self, nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.nodes = Some(nodes.into_iter().map(Into::into).collect());
        self
    }
}

/// Plans one cluster action
pub struct JobPlanner<'a> {
    nodes: Vec<&'a Node>,
    services: &'a BTreeMap<String, Service>,
    resolver: ServiceDependencyResolver<'a>,
    request: ClusterActionRequest,
}

impl<'a> JobPlanner<'a> {
    /// Validate the request against the cluster and the service catalog
    pub fn new(
        cluster_nodes: &'a [Node],
        services: &'a BTreeMap<String, Service>,
        request: ClusterActionRequest,
    ) -> Result<Self, PlanError> {
        let present: BTreeSet<String> = cluster_nodes
            .iter()
            .flat_map(|n| n.services.iter().cloned())
            .collect();

        if let Some(unknown) = present.iter().find(|s| !services.contains_key(*s)) {
            return Err(PlanError::UnknownService(unknown.clone()));
        }

        if let Some(node_ids) = &request.nodes {
            for id in node_ids {
                if !cluster_nodes.iter().any(|n| &n.id == id) {
                    return Err(PlanError::UnknownNode(id.clone()));
                }
            }
        }

        let requested = request.services.as_ref().filter(|s| !s.is_empty());
        if request.action.requires_services() && requested.is_none() {
            return Err(PlanError::MissingServices(request.action));
        }
        for service in requested.into_iter().flatten() {
            if !services.contains_key(service) {
                return Err(PlanError::UnknownService(service.clone()));
            }
            if !present.contains(service) {
                return Err(PlanError::ServiceNotOnCluster(service.clone()));
            }
        }

        let nodes = cluster_nodes
            .iter()
            .filter(|n| request.nodes.as_ref().map_or(true, |ids| ids.contains(&n.id)))
            .collect();

        Ok(Self {
            nodes,
            services,
            resolver: ServiceDependencyResolver::new(services, present),
            request,
        })
    }

    pub fn request(&self) -> &ClusterActionRequest {
        &self.request
    }

    fn defines(&self, service: &str, action: ProvisionerAction) -> bool {
        self.services
            .get(service)
            .is_some_and(|s| s.defines(action))
    }

    /// Requested services, or everything when none were named
    fn selected(&self, service: &str) -> bool {
        self.request
            .services
            .as_ref()
            .filter(|s| !s.is_empty())
            .map_or(true, |s| s.contains(service))
    }

    fn requested_services(&self) -> BTreeSet<String> {
        self.request.services.clone().unwrap_or_default()
    }

    // =========================================================================
    // Graph construction
    // =========================================================================

    /// Build the task graph for the request
    pub fn build_dag(&self) -> TaskDag {
        let mut dag = TaskDag::new();

        match self.request.action {
            ClusterAction::ClusterCreate => {
                for node in &self.nodes {
                    let bootstrap = self.add_node_chain(&mut dag, node);
                    for service in &node.services {
                        self.add_chain(&mut dag, node, Some(&bootstrap), service, &ProvisionerAction::INSTALL_CHAIN);
                    }
                }
                let mut edges = self.resolver.install_edges();
                edges.extend(self.resolver.runtime_edges(&START_RULES));
                add_cross_edges(&mut dag, &edges);
            }

            ClusterAction::ClusterConfigure => {
                for node in &self.nodes {
                    let bootstrap = TaskNode::node(node.id.as_str(), ProvisionerAction::Bootstrap);
                    dag.add_task(bootstrap.clone());
                    for service in node.services.iter().filter(|s| self.selected(s)) {
                        self.add_chain(&mut dag, node, Some(&bootstrap), service, &[ProvisionerAction::Configure]);
                    }
                }
            }

            ClusterAction::ClusterConfigureWithRestart => {
                let chain = [
                    ProvisionerAction::Stop,
                    ProvisionerAction::Configure,
                    ProvisionerAction::Start,
                ];
                for node in &self.nodes {
                    let bootstrap = TaskNode::node(node.id.as_str(), ProvisionerAction::Bootstrap);
                    dag.add_task(bootstrap.clone());
                    for service in node.services.iter().filter(|s| self.selected(s)) {
                        self.add_chain(&mut dag, node, Some(&bootstrap), service, &chain);
                    }
                }
                let mut edges = self.resolver.runtime_edges(&STOP_RULES);
                edges.extend(self.resolver.runtime_edges(&START_RULES));
                add_cross_edges(&mut dag, &edges);
            }

            ClusterAction::AddServices => {
                let added = self.requested_services();
                for node in &self.nodes {
                    let new_here: Vec<&String> = node.services.iter().filter(|s| added.contains(*s)).collect();
                    if new_here.is_empty() {
                        continue;
                    }
                    let bootstrap = TaskNode::node(node.id.as_str(), ProvisionerAction::Bootstrap);
                    dag.add_task(bootstrap.clone());
                    for service in new_here {
                        self.add_chain(&mut dag, node, Some(&bootstrap), service, &ProvisionerAction::INSTALL_CHAIN);
                    }
                }
                let mut edges = self.resolver.install_edges();
                edges.extend(self.resolver.runtime_edges(&START_RULES));
                add_cross_edges(&mut dag, &edges);
            }

            ClusterAction::StartServices => {
                let start = self.resolver.dependencies_closure(&self.requested_services());
                self.add_service_tasks(&mut dag, &BTreeSet::new(), &start);
                add_cross_edges(&mut dag, &self.resolver.runtime_edges(&START_RULES));
            }

            ClusterAction::StopServices => {
                let stop = self.resolver.dependents_closure(&self.requested_services());
                self.add_service_tasks(&mut dag, &stop, &BTreeSet::new());
                add_cross_edges(&mut dag, &self.resolver.runtime_edges(&STOP_RULES));
            }

            ClusterAction::RestartServices => {
                let requested = self.requested_services();
                let stop = self.resolver.dependents_closure(&requested);
                let mut start = self.resolver.dependencies_closure(&requested);
                start.extend(stop.iter().cloned());

                self.add_service_tasks(&mut dag, &stop, &start);
                let mut edges = self.resolver.runtime_edges(&STOP_RULES);
                edges.extend(self.resolver.runtime_edges(&START_RULES));
                add_cross_edges(&mut dag, &edges);
            }

            ClusterAction::ClusterDelete => {
                for node in &self.nodes {
                    dag.add_task(TaskNode::node(node.id.as_str(), ProvisionerAction::Delete));
                }
            }
        }

        debug!(
            "Built {} task graph with {} tasks over {} nodes",
            self.request.action,
            dag.len(),
            self.nodes.len()
        );
        dag
    }

    /// CREATE -> CONFIRM -> BOOTSTRAP; returns the BOOTSTRAP task
    fn add_node_chain(&self, dag: &mut TaskDag, node: &Node) -> TaskNode {
        let create = TaskNode::node(node.id.as_str(), ProvisionerAction::Create);
        let confirm = TaskNode::node(node.id.as_str(), ProvisionerAction::Confirm);
        let bootstrap = TaskNode::node(node.id.as_str(), ProvisionerAction::Bootstrap);
        dag.add_dependency(create, confirm.clone());
        dag.add_dependency(confirm, bootstrap.clone());
        bootstrap
    }

    /// Chain the actions a service defines, in the given order
    fn add_chain(
        &self,
        dag: &mut TaskDag,
        node: &Node,
        root: Option<&TaskNode>,
        service: &str,
        actions: &[ProvisionerAction],
    ) {
        let mut previous = root.cloned();
        for action in actions {
            if !self.defines(service, *action) {
                continue;
            }
            let task = TaskNode::service(node.id.as_str(), *action, service);
            match previous {
                Some(before) => dag.add_dependency(before, task.clone()),
                None => dag.add_task(task.clone()),
            }
            previous = Some(task);
        }
    }

    /// STOP for services in `stop`, START for services in `start`, STOP
    /// before START on the same node
    fn add_service_tasks(&self, dag: &mut TaskDag, stop: &BTreeSet<String>, start: &BTreeSet<String>) {
        for node in &self.nodes {
            for service in &node.services {
                let mut actions = Vec::with_capacity(2);
                if stop.contains(service) {
                    actions.push(ProvisionerAction::Stop);
                }
                if start.contains(service) {
                    actions.push(ProvisionerAction::Start);
                }
                self.add_chain(dag, node, None, service, &actions);
            }
        }
    }

    // =========================================================================
    // Stages
    // =========================================================================

    /// Stages straight from the task graph
    pub fn linearize(&self) -> Result<Vec<Stage>, PlanError> {
        self.build_dag().linearize()
    }

    /// Stages with at most one task per node in each
    pub fn plan(&self) -> Result<Vec<Stage>, PlanError> {
        let dag = self.build_dag();
        let stages = dag.linearize()?;
        let deduped = deduplicate(&stages, &dag);
        debug!(
            "Planned {} in {} stages ({} before spreading per node)",
            self.request.action,
            deduped.len(),
            stages.len()
        );
        Ok(deduped)
    }
}

/// Expand service-level edges into task edges across every node
fn add_cross_edges(dag: &mut TaskDag, edges: &BTreeSet<ActionEdge>) {
    let mut by_action: BTreeMap<ServiceAction, Vec<TaskNode>> = BTreeMap::new();
    for task in dag.tasks().filter(|t| !t.is_node_task()) {
        by_action
            .entry(ServiceAction::new(task.service.as_str(), task.action))
            .or_default()
            .push(task.clone());
    }

    for edge in edges {
        let (Some(befores), Some(afters)) = (by_action.get(&edge.before), by_action.get(&edge.after)) else {
            continue;
        };
        for before in befores {
            for after in afters {
                dag.add_dependency(before.clone(), after.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ProvisionerAction::*;

    fn services() -> BTreeMap<String, Service> {
        [
            Service::new("db").with_actions(&[Install, Configure, Start, Stop]),
            Service::new("app")
                .depends_on("db")
                .with_actions(&[Install, Configure, Start, Stop]),
            Service::new("cache").with_actions(&[Install, Start, Stop]),
        ]
        .into_iter()
        .map(|s| (s.name.clone(), s))
        .collect()
    }

    fn nodes() -> Vec<Node> {
        vec![
            Node::new("n1", "small", "centos").with_services(["db"]),
            Node::new("n2", "small", "centos").with_services(["app", "cache"]),
        ]
    }

    fn stage_of(stages: &[Stage], task: &TaskNode) -> usize {
        stages.iter().position(|s| s.contains(task)).unwrap()
    }

    #[test]
    fn test_request_validation() {
        let services = services();
        let nodes = nodes();

        let missing = ClusterActionRequest::new(ClusterAction::StartServices);
        assert!(matches!(
            JobPlanner::new(&nodes, &services, missing),
            Err(PlanError::MissingServices(ClusterAction::StartServices))
        ));

        let bad_node = ClusterActionRequest::new(ClusterAction::ClusterDelete).with_nodes(["n9"]);
        assert!(matches!(
            JobPlanner::new(&nodes, &services, bad_node),
            Err(PlanError::UnknownNode(_))
        ));

        let unknown = ClusterActionRequest::new(ClusterAction::StopServices).with_services(["ghost"]);
        assert!(matches!(
            JobPlanner::new(&nodes, &services, unknown),
            Err(PlanError::UnknownService(_))
        ));

        let mut extra = services.clone();
        extra.insert("idle".to_string(), Service::new("idle"));
        let absent = ClusterActionRequest::new(ClusterAction::StopServices).with_services(["idle"]);
        assert!(matches!(
            JobPlanner::new(&nodes, &extra, absent),
            Err(PlanError::ServiceNotOnCluster(_))
        ));
    }

    #[test]
    fn test_delete_single_stage() {
        let services = services();
        let nodes = nodes();
        let planner = JobPlanner::new(&nodes, &services, ClusterActionRequest::new(ClusterAction::ClusterDelete)).unwrap();

        let stages = planner.plan().unwrap();
        assert_eq!(stages.len(), 1);
        assert_eq!(
            stages[0],
            Stage::from([TaskNode::node("n1", Delete), TaskNode::node("n2", Delete)])
        );
    }

    #[test]
    fn test_create_orders_across_nodes() {
        let services = services();
        let nodes = nodes();
        let planner = JobPlanner::new(&nodes, &services, ClusterActionRequest::new(ClusterAction::ClusterCreate)).unwrap();

        let stages = planner.linearize().unwrap();
        let db_start = TaskNode::service("n1", Start, "db");
        let app_start = TaskNode::service("n2", Start, "app");
        let cache_start = TaskNode::service("n2", Start, "cache");
        assert!(stage_of(&stages, &db_start) < stage_of(&stages, &app_start));
        // cache has no dependencies and starts right after its install
        assert_eq!(stage_of(&stages, &cache_start), 4);
        assert_eq!(stages[0].len(), 2);
    }

    #[test]
    fn test_configure_has_no_cross_edges() {
        let services = services();
        let nodes = nodes();
        let planner = JobPlanner::new(&nodes, &services, ClusterActionRequest::new(ClusterAction::ClusterConfigure)).unwrap();

        let stages = planner.linearize().unwrap();
        assert_eq!(stages.len(), 2);
        assert!(stages[1].contains(&TaskNode::service("n1", Configure, "db")));
        assert!(stages[1].contains(&TaskNode::service("n2", Configure, "app")));
        // cache defines no CONFIGURE
        assert_eq!(stages[1].len(), 2);
    }

    #[test]
    fn test_stop_expands_to_dependents_in_reverse() {
        let services = services();
        let nodes = nodes();
        let request = ClusterActionRequest::new(ClusterAction::StopServices).with_services(["db"]);
        let planner = JobPlanner::new(&nodes, &services, request).unwrap();

        let stages = planner.plan().unwrap();
        assert_eq!(
            stages,
            vec![
                Stage::from([TaskNode::service("n2", Stop, "app")]),
                Stage::from([TaskNode::service("n1", Stop, "db")]),
            ]
        );
    }

    #[test]
    fn test_start_expands_to_dependencies() {
        let services = services();
        let nodes = nodes();
        let request = ClusterActionRequest::new(ClusterAction::StartServices).with_services(["app"]);
        let planner = JobPlanner::new(&nodes, &services, request).unwrap();

        let stages = planner.plan().unwrap();
        assert_eq!(
            stages,
            vec![
                Stage::from([TaskNode::service("n1", Start, "db")]),
                Stage::from([TaskNode::service("n2", Start, "app")]),
            ]
        );
    }

    #[test]
    fn test_restart_stops_then_starts() {
        let services = services();
        let nodes = nodes();
        let request = ClusterActionRequest::new(ClusterAction::RestartServices).with_services(["db"]);
        let planner = JobPlanner::new(&nodes, &services, request).unwrap();

        let stages = planner.plan().unwrap();
        let order: Vec<TaskNode> = stages.iter().flatten().cloned().collect();
        assert_eq!(
            order,
            vec![
                TaskNode::service("n2", Stop, "app"),
                TaskNode::service("n1", Stop, "db"),
                TaskNode::service("n1", Start, "db"),
                TaskNode::service("n2", Start, "app"),
            ]
        );
    }

    #[test]
    fn test_node_subset_treats_outside_as_done() {
        let services = services();
        let nodes = nodes();
        let request = ClusterActionRequest::new(ClusterAction::ClusterCreate).with_nodes(["n2"]);
        let planner = JobPlanner::new(&nodes, &services, request).unwrap();

        let dag = planner.build_dag();
        assert!(dag.tasks().all(|t| t.node_id == "n2"));
        assert!(!dag.contains(&TaskNode::service("n1", Start, "db")));
        assert!(planner.plan().is_ok());
    }

    #[test]
    fn test_add_services_only_touches_new_services() {
        let services = services();
        let nodes = nodes();
        let request = ClusterActionRequest::new(ClusterAction::AddServices).with_services(["cache"]);
        let planner = JobPlanner::new(&nodes, &services, request).unwrap();

        let dag = planner.build_dag();
        assert!(dag.tasks().all(|t| t.node_id == "n2"));
        assert!(dag.tasks().all(|t| t.is_node_task() || t.service == "cache"));
        assert!(dag.contains(&TaskNode::node("n2", Bootstrap)));
        assert!(!dag.contains(&TaskNode::node("n2", Create)));
    }
}
