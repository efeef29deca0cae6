//! Running jobs
//!
//! A job walks the planned stages of one cluster action. Tasks of the
//! current stage are handed out together; the next stage opens once every
//! one of them succeeded. A task that keeps failing past its attempt budget
//! fails the whole job.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::{ClusterAction, ProvisionerAction};
use crate::cluster::Cluster;
use crate::planner::Stage;

use super::SchedulerError;

/// Work item handed to a provisioning worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub task_id: String,
    pub job_id: String,
    pub cluster_id: String,
    pub node_id: String,
    pub action: ProvisionerAction,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,

    /// Cluster configuration at planning time
    #[serde(default)]
    pub config: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    InProgress,
    Complete,
    Failed,
}

/// What happened after a task result was recorded
#[derive(Debug, Clone, PartialEq)]
pub enum JobProgress {
    /// Other tasks of the stage are still outstanding
    Waiting,
    /// The task failed but has attempts left; run it again
    Retry(TaskDescriptor),
    /// The stage at this index is now open
    StageAdvanced(usize),
    Completed,
    Failed,
    /// The job had already finished; the result was dropped
    Discarded,
}

/// One cluster action being executed stage by stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterJob {
    pub id: String,
    pub cluster_id: String,
    pub action: ClusterAction,
    pub stages: Vec<Vec<TaskDescriptor>>,
    pub current: usize,
    pub status: JobStatus,
    pub max_task_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    attempts: BTreeMap<String, u32>,
    #[serde(default)]
    succeeded: BTreeSet<String>,
}

impl ClusterJob {
    pub fn new(cluster: &Cluster, action: ClusterAction, stages: &[Stage], max_task_attempts: u32) -> Self {
        let id = Uuid::new_v4().to_string();
        let stages: Vec<Vec<TaskDescriptor>> = stages
            .iter()
            .map(|stage| {
                stage
                    .iter()
                    .map(|task| TaskDescriptor {
                        task_id: Uuid::new_v4().to_string(),
                        job_id: id.clone(),
                        cluster_id: cluster.id.clone(),
                        node_id: task.node_id.clone(),
                        action: task.action,
                        service: (!task.is_node_task()).then(|| task.service.clone()),
                        config: cluster.config.clone(),
                    })
                    .collect()
            })
            .collect();

        let now = Utc::now();
        let status = if stages.is_empty() {
            JobStatus::Complete
        } else {
            JobStatus::InProgress
        };

        Self {
            id,
            cluster_id: cluster.id.clone(),
            action,
            stages,
            current: 0,
            status,
            max_task_attempts: max_task_attempts.max(1),
            created_at: now,
            updated_at: now,
            attempts: BTreeMap::new(),
            succeeded: BTreeSet::new(),
        }
    }

    /// Tasks of the open stage, if the job is still running
    pub fn current_stage(&self) -> Option<&[TaskDescriptor]> {
        if self.status != JobStatus::InProgress {
            return None;
        }
        self.stages.get(self.current).map(Vec::as_slice)
    }

    pub fn is_finished(&self) -> bool {
        self.status != JobStatus::InProgress
    }

    pub fn attempts(&self, task_id: &str) -> u32 {
        self.attempts.get(task_id).copied().unwrap_or(0)
    }

    pub fn task_count(&self) -> usize {
        self.stages.iter().map(Vec::len).sum()
    }

    /// Record the outcome of one run of a task in the open stage
    pub fn record_result(&mut self, task_id: &str, success: bool) -> Result<JobProgress, SchedulerError> {
        let task = self
            .current_stage()
            .and_then(|stage| stage.iter().find(|t| t.task_id == task_id))
            .cloned()
            .ok_or_else(|| SchedulerError::UnknownTask(task_id.to_string()))?;

        self.updated_at = Utc::now();
        let attempts = self.attempts.entry(task.task_id.clone()).or_insert(0);
        *attempts += 1;

        if !success {
            if *attempts >= self.max_task_attempts {
                self.status = JobStatus::Failed;
                return Ok(JobProgress::Failed);
            }
            return Ok(JobProgress::Retry(task));
        }

        self.succeeded.insert(task.task_id);
        let stage_done = self.stages[self.current]
            .iter()
            .all(|t| self.succeeded.contains(&t.task_id));
        if !stage_done {
            return Ok(JobProgress::Waiting);
        }

        self.current += 1;
        if self.current == self.stages.len() {
            self.status = JobStatus::Complete;
            Ok(JobProgress::Completed)
        } else {
            Ok(JobProgress::StageAdvanced(self.current))
        }
    }
}
