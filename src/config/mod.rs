//! Document loading
//!
//! Catalogs, clusters and requests live in JSON or YAML files; the format is
//! picked from the file extension. Parsing stays in the typed modules, this
//! is only the file boundary.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use crate::catalog::{Catalog, CatalogDocument, CatalogError};

/// Errors for file I/O and document parsing
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Unsupported file type: {0} (expected .json, .yaml or .yml)")]
    UnsupportedFormat(PathBuf),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Yaml,
}

impl DocumentFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Some(DocumentFormat::Json),
            Some("yaml") | Some("yml") => Some(DocumentFormat::Yaml),
            _ => None,
        }
    }
}

/// Parse a document in the given format
pub fn parse_document<T: DeserializeOwned>(content: &str, format: DocumentFormat) -> Result<T, ConfigError> {
    Ok(match format {
        DocumentFormat::Json => serde_json::from_str(content)?,
        DocumentFormat::Yaml => serde_yaml::from_str(content)?,
    })
}

// ============================================================================
// SBIO: I/O wrappers
// ============================================================================

/// Read and parse a JSON or YAML document
pub fn load_document<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let format =
        DocumentFormat::from_path(path).ok_or_else(|| ConfigError::UnsupportedFormat(path.to_path_buf()))?;
    let content = std::fs::read_to_string(path)?;
    debug!("Loaded {} ({:?})", path.display(), format);
    parse_document(&content, format)
}

/// Read, index and validate a catalog file
pub fn load_catalog_file(path: &Path) -> Result<Catalog, ConfigError> {
    let document: CatalogDocument = load_document(path)?;
    Ok(Catalog::from_document(document)?)
}
