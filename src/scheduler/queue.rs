//! Task queue
//!
//! Workers take tasks one at a time and report back; a taken task stays
//! leased to its worker until completed. Cancelling a job only drops its
//! waiting tasks, leases run out through `complete`.

use std::collections::VecDeque;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::debug;

use super::job::TaskDescriptor;

#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Make a task available to workers
    async fn submit(&self, task: TaskDescriptor);

    /// Lease the oldest waiting task to a worker
    async fn take(&self, worker_id: &str) -> Option<TaskDescriptor>;

    /// Release a leased task, returning it
    async fn complete(&self, task_id: &str) -> Option<TaskDescriptor>;

    /// Drop every waiting task of a job, returning how many were dropped
    async fn cancel_job(&self, job_id: &str) -> usize;

    /// Tasks waiting to be taken
    async fn pending(&self) -> usize;
}

/// FIFO queue kept in process memory
#[derive(Default)]
pub struct InMemoryTaskQueue {
    waiting: Mutex<VecDeque<TaskDescriptor>>,
    leased: DashMap<String, (String, TaskDescriptor)>,
}

impl InMemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Worker currently holding a task
    pub fn holder(&self, task_id: &str) -> Option<String> {
        self.leased.get(task_id).map(|entry| entry.0.clone())
    }

    pub fn leased(&self) -> usize {
        self.leased.len()
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn submit(&self, task: TaskDescriptor) {
        debug!("Queued task {} ({} on {})", task.task_id, task.action, task.node_id);
        self.waiting.lock().await.push_back(task);
    }

    async fn take(&self, worker_id: &str) -> Option<TaskDescriptor> {
        let task = self.waiting.lock().await.pop_front()?;
        debug!("Worker {} took task {}", worker_id, task.task_id);
        self.leased
            .insert(task.task_id.clone(), (worker_id.to_string(), task.clone()));
        Some(task)
    }

    async fn complete(&self, task_id: &str) -> Option<TaskDescriptor> {
        self.leased.remove(task_id).map(|(_, (_, task))| task)
    }

    async fn cancel_job(&self, job_id: &str) -> usize {
        let mut waiting = self.waiting.lock().await;
        let before = waiting.len();
        waiting.retain(|task| task.job_id != job_id);
        let dropped = before - waiting.len();
        if dropped > 0 {
            debug!("Dropped {} waiting tasks of job {}", dropped, job_id);
        }
        dropped
    }

    async fn pending(&self) -> usize {
        self.waiting.lock().await.len()
    }
}
