//! clusterforge - cluster layout solving and provisioning job planning
//!
//! - `catalog`: services, hardware/image types and templates
//! - `layout`: node layout generation, cluster layout search, service addition
//! - `planner`: service dependency resolution and task stage planning
//! - `scheduler`: per-cluster single-flight planning loop and task queue

pub mod catalog;
pub mod cli;
pub mod cluster;
pub mod config;
pub mod layout;
pub mod planner;
pub mod scheduler;
pub mod settings;
