//! Job planner
//!
//! Builds the task graph for a cluster action and orders it into stages a
//! worker pool can run: every task of a stage may run concurrently, and a
//! stage starts only once the previous one finished.

pub mod dag;
pub mod dependency;
pub mod job;
pub mod task;

pub use dag::{deduplicate, Stage, TaskDag};
pub use dependency::{
    ActionDependencyRule, ActionEdge, RuleDirection, ServiceAction, ServiceDependencyResolver,
    INSTALL_RULES, START_RULES, STOP_RULES,
};
pub use job::{ClusterActionRequest, JobPlanner};
pub use task::TaskNode;

use thiserror::Error;

use crate::catalog::ClusterAction;

/// Errors raised while planning a job
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlanError {
    #[error("Task graph has a cycle: {0} tasks could not be scheduled")]
    CyclicTaskGraph(usize),

    #[error("Node '{0}' is not part of the cluster")]
    UnknownNode(String),

    #[error("Service '{0}' not found")]
    UnknownService(String),

    #[error("Service '{0}' is not on the cluster")]
    ServiceNotOnCluster(String),

    #[error("{0} requires a list of services")]
    MissingServices(ClusterAction),
}
