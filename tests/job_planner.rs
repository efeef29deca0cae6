//! Integration tests for job planning

use std::collections::{BTreeMap, BTreeSet};

use clusterforge::catalog::{ClusterAction, ProvisionerAction, Service};
use clusterforge::cluster::Node;
use clusterforge::planner::{ClusterActionRequest, JobPlanner, PlanError, Stage, TaskNode};

use ProvisionerAction::*;

fn catalog_services() -> BTreeMap<String, Service> {
    [
        Service::new("s1").with_actions(&[Configure, Start]),
        Service::new("s2").depends_on("s1").with_actions(&[Install, Configure]),
        Service::new("s3")
            .depends_on("s1")
            .depends_on("s2")
            .with_actions(&[Install, Configure, Initialize, Start]),
    ]
    .into_iter()
    .map(|s| (s.name.clone(), s))
    .collect()
}

fn cluster_nodes() -> Vec<Node> {
    vec![
        Node::new("n1", "small", "centos").with_services(["s1"]),
        Node::new("n2", "small", "centos").with_services(["s1", "s2", "s3"]),
    ]
}

fn node(id: &str, action: ProvisionerAction) -> TaskNode {
    TaskNode::node(id, action)
}

fn svc(id: &str, action: ProvisionerAction, service: &str) -> TaskNode {
    TaskNode::service(id, action, service)
}

#[test]
fn test_create_stages() {
    let services = catalog_services();
    let nodes = cluster_nodes();
    let planner =
        JobPlanner::new(&nodes, &services, ClusterActionRequest::new(ClusterAction::ClusterCreate)).unwrap();

    let stages = planner.linearize().unwrap();
    assert_eq!(
        stages,
        vec![
            Stage::from([node("n1", Create), node("n2", Create)]),
            Stage::from([node("n1", Confirm), node("n2", Confirm)]),
            Stage::from([node("n1", Bootstrap), node("n2", Bootstrap)]),
            Stage::from([
                svc("n1", Configure, "s1"),
                svc("n2", Configure, "s1"),
                svc("n2", Install, "s2"),
                svc("n2", Install, "s3"),
            ]),
            Stage::from([
                svc("n1", Start, "s1"),
                svc("n2", Start, "s1"),
                svc("n2", Configure, "s2"),
                svc("n2", Configure, "s3"),
            ]),
            Stage::from([svc("n2", Initialize, "s3")]),
            Stage::from([svc("n2", Start, "s3")]),
        ]
    );
}

#[test]
fn test_plan_runs_one_task_per_node_per_stage() {
    let services = catalog_services();
    let nodes = cluster_nodes();
    let planner =
        JobPlanner::new(&nodes, &services, ClusterActionRequest::new(ClusterAction::ClusterCreate)).unwrap();

    let dag = planner.build_dag();
    let stages = planner.plan().unwrap();

    let total: usize = stages.iter().map(BTreeSet::len).sum();
    assert_eq!(total, dag.len());
    for stage in &stages {
        let ids: BTreeSet<&str> = stage.iter().map(|t| t.node_id.as_str()).collect();
        assert_eq!(ids.len(), stage.len());
    }

    let position = |task: &TaskNode| stages.iter().position(|s| s.contains(task)).unwrap();
    for (before, after) in dag.edges() {
        assert!(position(before) < position(after), "{} should run before {}", before, after);
    }
}

#[test]
fn test_delete_single_stage() {
    let services = catalog_services();
    let nodes = cluster_nodes();
    let planner =
        JobPlanner::new(&nodes, &services, ClusterActionRequest::new(ClusterAction::ClusterDelete)).unwrap();

    assert_eq!(
        planner.plan().unwrap(),
        vec![Stage::from([node("n1", Delete), node("n2", Delete)])]
    );
}

#[test]
fn test_configure_with_restart_orders_stop_and_start() {
    let services: BTreeMap<String, Service> = [
        Service::new("db").with_actions(&[Configure, Start, Stop]),
        Service::new("app").depends_on("db").with_actions(&[Configure, Start, Stop]),
    ]
    .into_iter()
    .map(|s| (s.name.clone(), s))
    .collect();
    let nodes = vec![
        Node::new("n1", "small", "centos").with_services(["db"]),
        Node::new("n2", "small", "centos").with_services(["app"]),
    ];

    let request = ClusterActionRequest::new(ClusterAction::ClusterConfigureWithRestart);
    let stages = JobPlanner::new(&nodes, &services, request).unwrap().plan().unwrap();
    let position = |task: &TaskNode| stages.iter().position(|s| s.contains(task)).unwrap();

    assert!(position(&svc("n2", Stop, "app")) < position(&svc("n1", Stop, "db")));
    assert!(position(&svc("n1", Stop, "db")) < position(&svc("n1", Configure, "db")));
    assert!(position(&svc("n1", Start, "db")) < position(&svc("n2", Start, "app")));
}

#[test]
fn test_restart_on_node_subset() {
    let services = catalog_services();
    let nodes = cluster_nodes();
    let request = ClusterActionRequest::new(ClusterAction::RestartServices)
        .with_services(["s1"])
        .with_nodes(["n1"]);

    let stages = JobPlanner::new(&nodes, &services, request).unwrap().plan().unwrap();
    let tasks: Vec<TaskNode> = stages.into_iter().flatten().collect();
    // s1 defines no STOP, so only its START runs
    assert_eq!(tasks, vec![svc("n1", Start, "s1")]);
}

#[test]
fn test_request_errors() {
    let services = catalog_services();
    let nodes = cluster_nodes();

    let err = JobPlanner::new(
        &nodes,
        &services,
        ClusterActionRequest::new(ClusterAction::AddServices).with_services(Vec::<String>::new()),
    )
    .err()
    .unwrap();
    assert_eq!(err, PlanError::MissingServices(ClusterAction::AddServices));

    let err = JobPlanner::new(
        &nodes,
        &services,
        ClusterActionRequest::new(ClusterAction::ClusterConfigure).with_nodes(["n7"]),
    )
    .err()
    .unwrap();
    assert_eq!(err, PlanError::UnknownNode("n7".to_string()));
}

#[test]
fn test_request_document_shape() {
    let json = r#"{"action": "RESTART_SERVICES", "services": ["s1"]}"#;
    let request: ClusterActionRequest = serde_json::from_str(json).unwrap();
    assert_eq!(request.action, ClusterAction::RestartServices);
    assert!(request.nodes.is_none());
}
