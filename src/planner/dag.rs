//! Task graph and linearization
//!
//! A TaskDag holds the tasks of one job and the "runs after" edges between
//! them. Linearization peels off every task with no pending predecessor as
//! one stage, repeatedly, until the graph is empty. Deduplication then
//! spreads each stage so that no node runs two tasks at once.

use std::collections::{BTreeMap, BTreeSet};

use super::task::TaskNode;
use super::PlanError;

/// Tasks that may run concurrently
pub type Stage = BTreeSet<TaskNode>;

/// Directed acyclic graph of tasks
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskDag {
    tasks: BTreeSet<TaskNode>,
    successors: BTreeMap<TaskNode, BTreeSet<TaskNode>>,
    predecessors: BTreeMap<TaskNode, BTreeSet<TaskNode>>,
}

impl TaskDag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_task(&mut self, task: TaskNode) {
        self.tasks.insert(task);
    }

    /// `after` runs once `before` is done; adds both tasks if needed
    pub fn add_dependency(&mut self, before: TaskNode, after: TaskNode) {
        self.tasks.insert(before.clone());
        self.tasks.insert(after.clone());
        self.successors
            .entry(before.clone())
            .or_default()
            .insert(after.clone());
        self.predecessors.entry(after).or_default().insert(before);
    }

    pub fn contains(&self, task: &TaskNode) -> bool {
        self.tasks.contains(task)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &TaskNode> {
        self.tasks.iter()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn predecessors(&self, task: &TaskNode) -> impl Iterator<Item = &TaskNode> {
        self.predecessors.get(task).into_iter().flatten()
    }

    pub fn successors(&self, task: &TaskNode) -> impl Iterator<Item = &TaskNode> {
        self.successors.get(task).into_iter().flatten()
    }

    /// All edges as (before, after)
    pub fn edges(&self) -> impl Iterator<Item = (&TaskNode, &TaskNode)> {
        self.successors
            .iter()
            .flat_map(|(before, afters)| afters.iter().map(move |after| (before, after)))
    }

    /// Split the graph into stages by repeatedly removing sources
    ///
    /// Fails if the remaining tasks all wait on each other.
    pub fn linearize(&self) -> Result<Vec<Stage>, PlanError> {
        let mut pending: BTreeMap<&TaskNode, usize> = self
            .tasks
            .iter()
            .map(|t| (t, self.predecessors.get(t).map_or(0, BTreeSet::len)))
            .collect();

        let mut stages = Vec::new();
        while !pending.is_empty() {
            let ready: Vec<&TaskNode> = pending
                .iter()
                .filter(|(_, count)| **count == 0)
                .map(|(task, _)| *task)
                .collect();

            if ready.is_empty() {
                return Err(PlanError::CyclicTaskGraph(pending.len()));
            }

            for task in &ready {
                pending.remove(*task);
                for next in self.successors(task) {
                    if let Some(count) = pending.get_mut(next) {
                        *count -= 1;
                    }
                }
            }
            stages.push(ready.into_iter().cloned().collect());
        }

        Ok(stages)
    }
}

/// Spread stages so no node has two tasks in one stage
///
/// Tasks are visited in stage order and placed in the earliest stage after
/// all of their predecessors where their node is still free.
pub fn deduplicate(stages: &[Stage], dag: &TaskDag) -> Vec<Stage> {
    let mut placed: BTreeMap<&TaskNode, usize> = BTreeMap::new();
    let mut result: Vec<Stage> = Vec::new();
    let mut busy: Vec<BTreeSet<&str>> = Vec::new();

    for task in stages.iter().flatten() {
        let mut index = dag
            .predecessors(task)
            .filter_map(|p| placed.get(p))
            .map(|i| i + 1)
            .max()
            .unwrap_or(0);

        while index < busy.len() && busy[index].contains(task.node_id.as_str()) {
            index += 1;
        }
        if index == result.len() {
            result.push(Stage::new());
            busy.push(BTreeSet::new());
        }

        result[index].insert(task.clone());
        busy[index].insert(task.node_id.as_str());
        placed.insert(task, index);
    }

    result
}
