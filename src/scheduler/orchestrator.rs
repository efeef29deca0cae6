//! Cluster scheduler - plans queued requests and drives jobs
//!
//! The scheduler runs as a background task and on every tick:
//! - Drains the queued create and action requests
//! - Plans them concurrently, one planning pass per cluster at a time
//! - Submits the first stage of each new job to the task queue
//!
//! Workers report task results back; the scheduler then opens the next
//! stage, retries the task, or settles the cluster status.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use super::job::{ClusterJob, JobProgress, TaskDescriptor};
use super::lock::ClusterLocks;
use super::queue::{InMemoryTaskQueue, TaskQueue};
use super::{SchedulerConfig, SchedulerError};
use crate::catalog::{Catalog, ClusterAction};
use crate::cluster::{Cluster, ClusterStatus, ClusterStore, StoreError};
use crate::layout::{ClusterCreateRequest, Solver, SolverSettings};
use crate::planner::{ClusterActionRequest, JobPlanner, PlanError};

/// Work waiting for the next scheduling pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SchedulerRequest {
    Create {
        cluster_id: String,
        request: ClusterCreateRequest,
    },
    Action {
        cluster_id: String,
        request: ClusterActionRequest,
    },
}

impl SchedulerRequest {
    pub fn cluster_id(&self) -> &str {
        match self {
            SchedulerRequest::Create { cluster_id, .. } => cluster_id,
            SchedulerRequest::Action { cluster_id, .. } => cluster_id,
        }
    }
}

/// Plans cluster requests and tracks the resulting jobs
pub struct ClusterScheduler {
    catalog: Arc<Catalog>,
    solver: SolverSettings,
    config: SchedulerConfig,
    clusters: ClusterStore,
    jobs: DashMap<String, ClusterJob>,
    requests: Mutex<VecDeque<SchedulerRequest>>,
    locks: ClusterLocks,
    queue: Arc<dyn TaskQueue>,
}

impl ClusterScheduler {
    pub fn new(catalog: Catalog, solver: SolverSettings, config: SchedulerConfig) -> Self {
        Self {
            catalog: Arc::new(catalog),
            solver,
            config,
            clusters: ClusterStore::new(),
            jobs: DashMap::new(),
            requests: Mutex::new(VecDeque::new()),
            locks: ClusterLocks::new(),
            queue: Arc::new(InMemoryTaskQueue::new()),
        }
    }

    /// Hand tasks to a different queue
    pub fn with_queue(mut self, queue: Arc<dyn TaskQueue>) -> Self {
        self.queue = queue;
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn clusters(&self) -> &ClusterStore {
        &self.clusters
    }

    pub fn queue(&self) -> Arc<dyn TaskQueue> {
        Arc::clone(&self.queue)
    }

    pub fn job(&self, job_id: &str) -> Option<ClusterJob> {
        self.jobs.get(job_id).map(|j| j.clone())
    }

    /// Jobs of a cluster, oldest first
    pub fn jobs_for(&self, cluster_id: &str) -> Vec<ClusterJob> {
        let mut jobs: Vec<ClusterJob> = self
            .jobs
            .iter()
            .filter(|j| j.cluster_id == cluster_id)
            .map(|j| j.clone())
            .collect();
        jobs.sort_by_key(|j| j.created_at);
        jobs
    }

    /// Queue a request for the next tick
    pub async fn submit(&self, request: SchedulerRequest) {
        debug!("Queued request for cluster {}", request.cluster_id());
        self.requests.lock().await.push_back(request);
    }

    pub async fn pending_requests(&self) -> usize {
        self.requests.lock().await.len()
    }

    // =========================================================================
    // Planning
    // =========================================================================

    /// Plan every queued request; returns the started job id per request
    pub async fn tick(&self) -> Vec<Result<Option<String>, SchedulerError>> {
        let pending: Vec<SchedulerRequest> = self.requests.lock().await.drain(..).collect();
        if pending.is_empty() {
            return Vec::new();
        }

        debug!("Planning {} queued requests", pending.len());
        let results = join_all(pending.into_iter().map(|request| self.process(request))).await;

        for result in &results {
            if let Err(e) = result {
                warn!("Request rejected: {}", e);
            }
        }
        results
    }

    async fn process(&self, request: SchedulerRequest) -> Result<Option<String>, SchedulerError> {
        let cluster_id = request.cluster_id().to_string();
        self.locks
            .run_exclusive(&cluster_id, || async move {
                match request {
                    SchedulerRequest::Create { cluster_id, request } => self.create(cluster_id, request).await,
                    SchedulerRequest::Action { cluster_id, request } => self.act(cluster_id, request).await,
                }
            })
            .await
    }

    async fn create(&self, cluster_id: String, request: ClusterCreateRequest) -> Result<Option<String>, SchedulerError> {
        let mut cluster = Cluster::new(cluster_id, request.name.as_str(), request.template.as_str());
        cluster.provider = request.provider.clone();
        cluster.status = ClusterStatus::Planning;
        if let Some(template) = self.catalog.template(&request.template) {
            cluster.config = template.defaults.config.clone();
        }
        self.clusters.insert(cluster.clone())?;

        let solved = Solver::new(&self.catalog, &self.solver).solve_cluster_nodes(&request);
        cluster.nodes = match solved {
            Ok(Some(nodes)) => nodes,
            Ok(None) => {
                warn!("No layout for cluster {} with {} nodes", cluster.id, request.num_machines);
                self.clusters.set_status(&cluster.id, ClusterStatus::Infeasible)?;
                return Ok(None);
            }
            Err(e) => {
                self.clusters.set_status(&cluster.id, ClusterStatus::Invalid)?;
                return Err(e.into());
            }
        };

        let job = match self.plan_job(&cluster, ClusterActionRequest::new(ClusterAction::ClusterCreate)) {
            Ok(job) => job,
            Err(e) => {
                self.clusters.set_status(&cluster.id, failure_status(&e, ClusterStatus::Invalid))?;
                return Err(e.into());
            }
        };

        self.clusters.set_nodes(&cluster.id, cluster.nodes.clone())?;
        self.launch(job).await.map(Some)
    }

    /// Act on an existing cluster
    ///
    /// A rejected request leaves the cluster as it was, unless the catalog
    /// itself turned out to be unplannable.
    async fn act(&self, cluster_id: String, request: ClusterActionRequest) -> Result<Option<String>, SchedulerError> {
        let mut cluster = self
            .clusters
            .get(&cluster_id)
            .ok_or_else(|| StoreError::ClusterNotFound(cluster_id.clone()))?;
        if !cluster.status.accepts_actions() {
            return Err(SchedulerError::ClusterBusy(cluster_id, cluster.status));
        }

        if request.action == ClusterAction::AddServices {
            let services = request.services.clone().unwrap_or_default();
            if services.is_empty() {
                return Err(PlanError::MissingServices(request.action).into());
            }
            match Solver::new(&self.catalog, &self.solver).add_services(&cluster, &services)? {
                Some(nodes) => cluster.nodes = nodes,
                None => {
                    warn!("Services {:?} do not fit on cluster {}", services, cluster.id);
                    return Ok(None);
                }
            }
        }

        let job = match self.plan_job(&cluster, request) {
            Ok(job) => job,
            Err(e) => {
                self.clusters.set_status(&cluster.id, failure_status(&e, cluster.status))?;
                return Err(e.into());
            }
        };

        self.clusters.set_nodes(&cluster.id, cluster.nodes)?;
        self.launch(job).await.map(Some)
    }

    fn plan_job(&self, cluster: &Cluster, request: ClusterActionRequest) -> Result<ClusterJob, PlanError> {
        let action = request.action;
        let stages = JobPlanner::new(&cluster.nodes, &self.catalog.services, request)?.plan()?;
        Ok(ClusterJob::new(cluster, action, &stages, self.config.max_task_attempts))
    }

    async fn launch(&self, job: ClusterJob) -> Result<String, SchedulerError> {
        let job_id = job.id.clone();
        let cluster_id = job.cluster_id.clone();
        let action = job.action;
        let first: Vec<TaskDescriptor> = job.current_stage().map(<[_]>::to_vec).unwrap_or_default();
        let finished = job.is_finished();

        info!(
            "Job {} for cluster {}: {} in {} stages, {} tasks",
            job_id,
            cluster_id,
            action,
            job.stages.len(),
            job.task_count()
        );
        self.jobs.insert(job_id.clone(), job);

        if finished {
            self.settle(&cluster_id, action, true)?;
        } else {
            self.clusters.set_status(&cluster_id, ClusterStatus::Planning)?;
            for task in first {
                self.queue.submit(task).await;
            }
        }
        Ok(job_id)
    }

    fn settle(&self, cluster_id: &str, action: ClusterAction, success: bool) -> Result<(), SchedulerError> {
        let status = match (success, action) {
            (false, _) => ClusterStatus::Failed,
            (true, ClusterAction::ClusterDelete) => ClusterStatus::Deleted,
            (true, _) => ClusterStatus::Active,
        };
        info!("Cluster {} is now {:?}", cluster_id, status);
        self.clusters.set_status(cluster_id, status)?;
        Ok(())
    }

    // =========================================================================
    // Task results
    // =========================================================================

    /// Record a worker's result for a leased task
    pub async fn report_task_result(&self, task_id: &str, success: bool) -> Result<JobProgress, SchedulerError> {
        let task = self
            .queue
            .complete(task_id)
            .await
            .ok_or_else(|| SchedulerError::UnknownTask(task_id.to_string()))?;

        let cluster_id = task.cluster_id.clone();
        self.locks
            .run_exclusive(&cluster_id, || self.apply_result(task, success))
            .await
    }

    async fn apply_result(&self, task: TaskDescriptor, success: bool) -> Result<JobProgress, SchedulerError> {
        let (progress, next, action) = {
            let mut job = self
                .jobs
                .get_mut(&task.job_id)
                .ok_or_else(|| SchedulerError::UnknownJob(task.job_id.clone()))?;
            if job.is_finished() {
                debug!("Job {} already finished, dropping result of task {}", task.job_id, task.task_id);
                return Ok(JobProgress::Discarded);
            }
            let progress = job.record_result(&task.task_id, success)?;
            let next: Vec<TaskDescriptor> = match &progress {
                JobProgress::StageAdvanced(_) => job.current_stage().map(<[_]>::to_vec).unwrap_or_default(),
                JobProgress::Retry(retry) => vec![retry.clone()],
                _ => Vec::new(),
            };
            (progress, next, job.action)
        };

        match &progress {
            JobProgress::Retry(_) => warn!("Task {} failed, retrying", task.task_id),
            JobProgress::StageAdvanced(stage) => debug!("Job {} opened stage {}", task.job_id, stage),
            JobProgress::Completed => self.settle(&task.cluster_id, action, true)?,
            JobProgress::Failed => {
                error!("Task {} ran out of attempts, job {} failed", task.task_id, task.job_id);
                self.queue.cancel_job(&task.job_id).await;
                self.settle(&task.cluster_id, action, false)?;
            }
            JobProgress::Waiting | JobProgress::Discarded => {}
        }

        for t in next {
            self.queue.submit(t).await;
        }
        Ok(progress)
    }
}

fn failure_status(error: &PlanError, otherwise: ClusterStatus) -> ClusterStatus {
    match error {
        PlanError::CyclicTaskGraph(_) => ClusterStatus::Failed,
        _ => otherwise,
    }
}

/// Spawn the scheduling loop as a background task
pub fn spawn_scheduler(scheduler: Arc<ClusterScheduler>) -> watch::Sender<()> {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(());

    tokio::spawn(async move {
        let secs = scheduler.config().tick_interval_secs.max(1);
        let mut ticker = interval(Duration::from_secs(secs));

        info!("Scheduler started, planning every {}s", secs);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    scheduler.tick().await;
                }
                _ = shutdown_rx.changed() => {
                    info!("Scheduler shutting down");
                    break;
                }
            }
        }
    });

    shutdown_tx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ClusterTemplate, Constraints, HardwareType, ImageType, ProvisionerAction, Service, ServiceConstraint};

    fn catalog() -> Catalog {
        let actions = [ProvisionerAction::Install, ProvisionerAction::Start, ProvisionerAction::Stop];
        let constraints = Constraints::new().with_service("db", ServiceConstraint::count(1, 1));
        Catalog::new()
            .with_service(Service::new("db").with_actions(&actions))
            .with_service(Service::new("app").depends_on("db").with_actions(&actions))
            .with_hardware_type(HardwareType::new("small"))
            .with_image_type(ImageType::new("centos"))
            .with_template(
                ClusterTemplate::new("web")
                    .with_default_services(["db", "app"])
                    .with_constraints(constraints),
            )
    }

    fn scheduler() -> ClusterScheduler {
        ClusterScheduler::new(catalog(), SolverSettings::default(), SchedulerConfig::default())
    }

    async fn run_to_completion(scheduler: &ClusterScheduler) {
        let queue = scheduler.queue();
        while let Some(task) = queue.take("w1").await {
            scheduler.report_task_result(&task.task_id, true).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_create_runs_to_active() {
        let scheduler = scheduler();
        scheduler
            .submit(SchedulerRequest::Create {
                cluster_id: "c1".to_string(),
                request: ClusterCreateRequest::new("one", "web", 2),
            })
            .await;

        let results = scheduler.tick().await;
        let job_id = results[0].clone().unwrap().unwrap();
        assert_eq!(scheduler.clusters().get("c1").unwrap().status, ClusterStatus::Planning);
        assert_eq!(scheduler.queue().pending().await, 2);

        run_to_completion(&scheduler).await;
        let cluster = scheduler.clusters().get("c1").unwrap();
        assert_eq!(cluster.status, ClusterStatus::Active);
        assert_eq!(cluster.nodes.len(), 2);
        assert!(scheduler.job(&job_id).unwrap().is_finished());
    }

    #[tokio::test]
    async fn test_infeasible_and_invalid_statuses() {
        let scheduler = scheduler();
        // db is capped at one node, so a single-service cluster cannot grow
        scheduler
            .submit(SchedulerRequest::Create {
                cluster_id: "tight".to_string(),
                request: ClusterCreateRequest::new("tight", "web", 3).with_services(["db"]),
            })
            .await;
        scheduler
            .submit(SchedulerRequest::Create {
                cluster_id: "bad".to_string(),
                request: ClusterCreateRequest::new("bad", "missing", 2),
            })
            .await;

        let results = scheduler.tick().await;
        assert!(matches!(results[0], Ok(None)));
        assert!(matches!(results[1], Err(SchedulerError::Solver(_))));
        assert_eq!(scheduler.clusters().get("tight").unwrap().status, ClusterStatus::Infeasible);
        assert_eq!(scheduler.clusters().get("bad").unwrap().status, ClusterStatus::Invalid);
    }

    #[tokio::test]
    async fn test_busy_cluster_rejects_actions() {
        let scheduler = scheduler();
        scheduler
            .submit(SchedulerRequest::Create {
                cluster_id: "c1".to_string(),
                request: ClusterCreateRequest::new("one", "web", 2),
            })
            .await;
        scheduler.tick().await;

        scheduler
            .submit(SchedulerRequest::Action {
                cluster_id: "c1".to_string(),
                request: ClusterActionRequest::new(ClusterAction::ClusterDelete),
            })
            .await;
        let results = scheduler.tick().await;
        assert!(matches!(
            results[0],
            Err(SchedulerError::ClusterBusy(_, ClusterStatus::Planning))
        ));
    }

    #[tokio::test]
    async fn test_failed_task_fails_cluster() {
        let config = SchedulerConfig {
            tick_interval_secs: 1,
            max_task_attempts: 1,
        };
        let scheduler = ClusterScheduler::new(catalog(), SolverSettings::default(), config);
        scheduler
            .submit(SchedulerRequest::Create {
                cluster_id: "c1".to_string(),
                request: ClusterCreateRequest::new("one", "web", 2),
            })
            .await;
        scheduler.tick().await;

        let task = scheduler.queue().take("w1").await.unwrap();
        let progress = scheduler.report_task_result(&task.task_id, false).await.unwrap();
        assert_eq!(progress, JobProgress::Failed);
        assert_eq!(scheduler.clusters().get("c1").unwrap().status, ClusterStatus::Failed);

        // the other CREATE of the stage is never handed out
        assert_eq!(scheduler.queue().pending().await, 0);
        assert!(scheduler.queue().take("w2").await.is_none());
    }

    #[tokio::test]
    async fn test_leased_task_of_failed_job_is_discarded() {
        let config = SchedulerConfig {
            tick_interval_secs: 1,
            max_task_attempts: 1,
        };
        let scheduler = ClusterScheduler::new(catalog(), SolverSettings::default(), config);
        scheduler
            .submit(SchedulerRequest::Create {
                cluster_id: "c1".to_string(),
                request: ClusterCreateRequest::new("one", "web", 3),
            })
            .await;
        scheduler.tick().await;

        let queue = scheduler.queue();
        let failing = queue.take("w1").await.unwrap();
        let running = queue.take("w2").await.unwrap();
        assert_eq!(queue.pending().await, 1);

        let progress = scheduler.report_task_result(&failing.task_id, false).await.unwrap();
        assert_eq!(progress, JobProgress::Failed);
        assert_eq!(queue.pending().await, 0);

        let late = scheduler.report_task_result(&running.task_id, true).await.unwrap();
        assert_eq!(late, JobProgress::Discarded);
        assert_eq!(scheduler.clusters().get("c1").unwrap().status, ClusterStatus::Failed);
        assert!(matches!(
            scheduler.report_task_result(&running.task_id, true).await,
            Err(SchedulerError::UnknownTask(_))
        ));
    }

    #[tokio::test]
    async fn test_spawned_loop_stops_on_shutdown() {
        let scheduler = Arc::new(scheduler());
        scheduler
            .submit(SchedulerRequest::Create {
                cluster_id: "c1".to_string(),
                request: ClusterCreateRequest::new("one", "web", 2),
            })
            .await;
        let shutdown = spawn_scheduler(Arc::clone(&scheduler));

        // the first interval tick fires immediately
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(scheduler.clusters().contains("c1"));
        assert!(shutdown.send(()).is_ok());
    }
}
