//! Integration tests for the scheduling loop
//!
//! Simulates a worker pool by draining the task queue and reporting results.

use std::collections::BTreeSet;
use std::sync::Arc;

use clusterforge::catalog::{Catalog, ClusterAction};
use clusterforge::cluster::ClusterStatus;
use clusterforge::layout::ClusterCreateRequest;
use clusterforge::planner::ClusterActionRequest;
use clusterforge::scheduler::{
    ClusterScheduler, InMemoryTaskQueue, JobProgress, JobStatus, SchedulerConfig, SchedulerError, SchedulerRequest,
    TaskQueue,
};
use clusterforge::settings::PlannerSettings;

const CATALOG_JSON: &str = r#"{
    "services": [
        {"name": "db", "actions": {"INSTALL": {}, "START": {}, "STOP": {}}},
        {"name": "app", "depends_on": ["db"], "actions": {"INSTALL": {}, "START": {}, "STOP": {}}},
        {"name": "cache", "actions": {"INSTALL": {}, "START": {}}}
    ],
    "hardware_types": [{"name": "small"}],
    "image_types": [{"name": "centos"}],
    "templates": [{
        "name": "web",
        "defaults": {"services": ["db", "app"], "config": {"port": 8080}},
        "constraints": {"services": {"db": {"min": 1, "max": 1}}}
    }]
}"#;

fn scheduler() -> ClusterScheduler {
    let settings = PlannerSettings::default();
    ClusterScheduler::new(Catalog::from_json(CATALOG_JSON).unwrap(), settings.solver(), settings.scheduler)
}

/// Take and succeed every queued task; returns the actions that ran, in order
async fn drain(scheduler: &ClusterScheduler) -> Vec<String> {
    let queue = scheduler.queue();
    let mut ran = Vec::new();
    while let Some(task) = queue.take("worker-1").await {
        ran.push(format!("{} {}", task.action, task.service.clone().unwrap_or_default()));
        scheduler.report_task_result(&task.task_id, true).await.unwrap();
    }
    ran
}

async fn create(scheduler: &ClusterScheduler, id: &str, nodes: usize) {
    scheduler
        .submit(SchedulerRequest::Create {
            cluster_id: id.to_string(),
            request: ClusterCreateRequest::new(id, "web", nodes),
        })
        .await;
    scheduler.tick().await;
    drain(scheduler).await;
}

async fn act(scheduler: &ClusterScheduler, id: &str, request: ClusterActionRequest) -> Result<Option<String>, SchedulerError> {
    scheduler
        .submit(SchedulerRequest::Action {
            cluster_id: id.to_string(),
            request,
        })
        .await;
    scheduler.tick().await.remove(0)
}

#[tokio::test]
async fn test_cluster_lifecycle() {
    let scheduler = scheduler();
    create(&scheduler, "c1", 3).await;

    let cluster = scheduler.clusters().get("c1").unwrap();
    assert_eq!(cluster.status, ClusterStatus::Active);
    assert_eq!(cluster.nodes.len(), 3);
    assert_eq!(cluster.config["port"], 8080);

    // add a service and run its install
    let job_id = act(
        &scheduler,
        "c1",
        ClusterActionRequest::new(ClusterAction::AddServices).with_services(["cache"]),
    )
    .await
    .unwrap()
    .unwrap();
    let ran = drain(&scheduler).await;
    assert!(ran.iter().all(|r| r.starts_with("BOOTSTRAP") || r.ends_with("cache")));
    assert_eq!(scheduler.job(&job_id).unwrap().status, JobStatus::Complete);
    assert!(scheduler.clusters().get("c1").unwrap().services().contains("cache"));

    // stopping db stops app first
    act(
        &scheduler,
        "c1",
        ClusterActionRequest::new(ClusterAction::StopServices).with_services(["db"]),
    )
    .await
    .unwrap();
    let ran = drain(&scheduler).await;
    let last_app = ran.iter().rposition(|r| r == "STOP app").unwrap();
    let first_db = ran.iter().position(|r| r == "STOP db").unwrap();
    assert!(last_app < first_db);

    act(&scheduler, "c1", ClusterActionRequest::new(ClusterAction::ClusterDelete))
        .await
        .unwrap();
    drain(&scheduler).await;
    assert_eq!(scheduler.clusters().get("c1").unwrap().status, ClusterStatus::Deleted);
    assert_eq!(scheduler.jobs_for("c1").len(), 4);
}

#[tokio::test]
async fn test_clusters_planned_in_one_tick() {
    let scheduler = scheduler();
    for id in ["a", "b", "c"] {
        scheduler
            .submit(SchedulerRequest::Create {
                cluster_id: id.to_string(),
                request: ClusterCreateRequest::new(id, "web", 2),
            })
            .await;
    }

    let results = scheduler.tick().await;
    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|r| matches!(r, Ok(Some(_)))));
    assert_eq!(scheduler.pending_requests().await, 0);
    // every cluster's CREATE stage is queued
    assert_eq!(scheduler.queue().pending().await, 6);
}

#[tokio::test]
async fn test_duplicate_create_rejected() {
    let scheduler = scheduler();
    create(&scheduler, "c1", 2).await;

    scheduler
        .submit(SchedulerRequest::Create {
            cluster_id: "c1".to_string(),
            request: ClusterCreateRequest::new("c1", "web", 2),
        })
        .await;
    let results = scheduler.tick().await;
    assert!(matches!(results[0], Err(SchedulerError::Store(_))));
}

#[tokio::test]
async fn test_retry_then_success() {
    let queue = Arc::new(InMemoryTaskQueue::new());
    let settings = PlannerSettings::default();
    let scheduler = ClusterScheduler::new(
        Catalog::from_json(CATALOG_JSON).unwrap(),
        settings.solver(),
        SchedulerConfig {
            tick_interval_secs: 1,
            max_task_attempts: 2,
        },
    )
    .with_queue(queue.clone());

    scheduler
        .submit(SchedulerRequest::Create {
            cluster_id: "c1".to_string(),
            request: ClusterCreateRequest::new("c1", "web", 2),
        })
        .await;
    scheduler.tick().await;

    let task = queue.take("worker-1").await.unwrap();
    let progress = scheduler.report_task_result(&task.task_id, false).await.unwrap();
    assert!(matches!(progress, JobProgress::Retry(_)));

    // the retried task is queued again behind the rest of the stage
    let mut seen = BTreeSet::new();
    while let Some(next) = queue.take("worker-2").await {
        seen.insert(next.task_id.clone());
        scheduler.report_task_result(&next.task_id, true).await.unwrap();
    }
    assert!(seen.contains(&task.task_id));
    assert_eq!(scheduler.clusters().get("c1").unwrap().status, ClusterStatus::Active);
}

#[tokio::test]
async fn test_unknown_task_result() {
    let scheduler = scheduler();
    assert!(matches!(
        scheduler.report_task_result("missing", true).await,
        Err(SchedulerError::UnknownTask(_))
    ));
}
