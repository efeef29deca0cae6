//! Layout engine
//!
//! Decides which services run on which kind of machine:
//!
//! - `generator`: candidate node shapes that respect co-location rules
//! - `finder`: how many nodes of each shape a new cluster gets
//! - `updater`/`tracker`: placing extra services on an existing cluster
//! - `solver`: request validation and the glue that produces nodes
//!
//! Infeasibility is a normal outcome (`None`), never an error.

pub mod cluster_layout;
pub mod composition;
pub mod finder;
pub mod generator;
pub mod node_layout;
pub mod solver;
pub mod tracker;
pub mod updater;

pub use cluster_layout::ClusterLayout;
pub use composition::{Composition, Compositions};
pub use finder::ClusterLayoutFinder;
pub use generator::{LayoutPreferences, NodeLayoutGenerator};
pub use node_layout::NodeLayout;
pub use solver::{
    ClusterCreateRequest, SolvedLayout, Solver, SolverError, SolverSettings,
    DEFAULT_MAX_CLUSTER_SIZE,
};
pub use tracker::{ClusterLayoutTracker, LayoutChange};
pub use updater::{added_service_counts, order_by_tightness, ClusterLayoutUpdater, ServiceExpansions};
