//! CLI module for clusterforge
//!
//! Subcommands:
//! - `clusterforge validate` - Load and check a catalog
//! - `clusterforge layout` - Solve the node layout of a new cluster
//! - `clusterforge plan` - Plan the task stages of a cluster action
//! - `clusterforge add-services` - Place new services on an existing cluster

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::catalog::ClusterAction;

mod commands;
mod display;

pub use commands::*;
pub use display::*;

#[derive(Parser, Debug)]
#[command(name = "clusterforge")]
#[command(about = "Lay out clusters and plan their provisioning tasks")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging output (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to settings file (default: ~/.clusterforge/config.yaml)
    #[arg(long, global = true, env = "CLUSTERFORGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Path to a .env file to load before running
    #[arg(long, value_name = "FILE", global = true)]
    pub env_file: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table, global = true)]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate a catalog file
    Validate(ValidateArgs),

    /// Solve the layout for a cluster create request
    Layout(LayoutArgs),

    /// Plan the stages of an action on an existing cluster
    Plan(PlanArgs),

    /// Add services to an existing cluster
    #[command(name = "add-services")]
    AddServices(AddServicesArgs),
}

#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Catalog file (JSON or YAML)
    pub catalog: PathBuf,
}

#[derive(Parser, Debug)]
pub struct LayoutArgs {
    /// Catalog file (JSON or YAML)
    pub catalog: PathBuf,

    /// Cluster create request (JSON or YAML)
    pub request: PathBuf,

    /// Print the generated nodes instead of the layout summary
    #[arg(long)]
    pub nodes: bool,
}

#[derive(Parser, Debug)]
pub struct PlanArgs {
    /// Catalog file (JSON or YAML)
    pub catalog: PathBuf,

    /// Cluster file with the current node assignment
    pub cluster: PathBuf,

    /// Action to plan (e.g. create, start, CLUSTER_DELETE)
    #[arg(short, long, default_value = "CLUSTER_CREATE")]
    pub action: ClusterAction,

    /// Services to act on, comma separated
    #[arg(short, long, value_delimiter = ',')]
    pub services: Vec<String>,

    /// Restrict the plan to these node ids, comma separated
    #[arg(short, long, value_delimiter = ',')]
    pub nodes: Vec<String>,

    /// Print the stages before per-node spreading
    #[arg(long)]
    pub raw: bool,
}

#[derive(Parser, Debug)]
pub struct AddServicesArgs {
    /// Catalog file (JSON or YAML)
    pub catalog: PathBuf,

    /// Cluster file with the current node assignment
    pub cluster: PathBuf,

    /// Services to add, comma separated
    #[arg(short, long, value_delimiter = ',', required = true)]
    pub services: Vec<String>,
}
