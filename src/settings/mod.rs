//! Planner settings
//!
//! Read from `~/.clusterforge/config.yaml` unless a path is given. A missing
//! default file means defaults; a missing explicit file is an error.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::layout::{LayoutPreferences, SolverSettings, DEFAULT_MAX_CLUSTER_SIZE};
use crate::scheduler::SchedulerConfig;

/// Default settings file location: ~/.clusterforge/config.yaml
pub fn default_settings_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".clusterforge")
        .join("config.yaml")
}

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Settings file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to parse settings: {0}")]
    ParseError(String),

    #[error("Invalid setting {0}: {1}")]
    Invalid(&'static str, String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerSettings {
    /// Hardware and image types, most preferred first
    pub preferences: LayoutPreferences,

    pub max_cluster_size: usize,

    pub scheduler: SchedulerConfig,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            preferences: LayoutPreferences::default(),
            max_cluster_size: DEFAULT_MAX_CLUSTER_SIZE,
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl PlannerSettings {
    pub fn solver(&self) -> SolverSettings {
        SolverSettings {
            preferences: self.preferences.clone(),
            max_cluster_size: self.max_cluster_size,
        }
    }
}

/// Parse settings from YAML
pub fn parse_settings(content: &str) -> Result<PlannerSettings, SettingsError> {
    if content.trim().is_empty() {
        return Ok(PlannerSettings::default());
    }
    let settings: PlannerSettings =
        serde_yaml::from_str(content).map_err(|e| SettingsError::ParseError(e.to_string()))?;

    if settings.max_cluster_size == 0 {
        return Err(SettingsError::Invalid("max_cluster_size", "must be at least 1".to_string()));
    }
    if settings.scheduler.max_task_attempts == 0 {
        return Err(SettingsError::Invalid(
            "scheduler.max_task_attempts",
            "must be at least 1".to_string(),
        ));
    }
    Ok(settings)
}

/// Load settings from `path`, or from the default location
pub fn load_settings(path: Option<&Path>) -> Result<PlannerSettings, SettingsError> {
    match path {
        Some(p) => {
            let expanded = PathBuf::from(shellexpand::tilde(&p.to_string_lossy()).as_ref());
            if !expanded.exists() {
                return Err(SettingsError::NotFound(expanded));
            }
            parse_settings(&std::fs::read_to_string(&expanded)?)
        }
        None => {
            let default = default_settings_path();
            if !default.exists() {
                return Ok(PlannerSettings::default());
            }
            parse_settings(&std::fs::read_to_string(&default)?)
        }
    }
}
