//! Scheduling
//!
//! Runs solver and planner passes for queued cluster requests, one pass per
//! cluster at a time, and feeds the resulting stages to a task queue.

pub mod job;
pub mod lock;
pub mod orchestrator;
pub mod queue;

pub use job::{ClusterJob, JobProgress, JobStatus, TaskDescriptor};
pub use lock::ClusterLocks;
pub use orchestrator::{spawn_scheduler, ClusterScheduler, SchedulerRequest};
pub use queue::{InMemoryTaskQueue, TaskQueue};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cluster::{ClusterStatus, StoreError};
use crate::layout::SolverError;
use crate::planner::PlanError;

/// Errors raised by the scheduler
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchedulerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Solver(#[from] SolverError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error("Cluster '{0}' cannot take actions while {1:?}")]
    ClusterBusy(String, ClusterStatus),

    #[error("Task '{0}' is not part of a running stage")]
    UnknownTask(String),

    #[error("Job '{0}' not found")]
    UnknownJob(String),
}

/// Timing and retry settings for the scheduling loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub tick_interval_secs: u64,
    pub max_task_attempts: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 5,
            max_task_attempts: 3,
        }
    }
}
