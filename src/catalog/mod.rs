//! Entity catalog
//!
//! Everything the planner reads but never writes: services, hardware types,
//! image types and cluster templates. A catalog is loaded once per planning
//! request and validated before any search begins.

pub mod action;
pub mod constraints;
pub mod machine;
pub mod service;
pub mod template;
pub mod validation;

pub use action::{ClusterAction, ProvisionerAction};
pub use constraints::{Constraints, LayoutConstraint, RatioConstraint, ServiceConstraint};
pub use machine::{HardwareType, ImageType};
pub use service::{ActionDefinition, Service, StageDependencies};
pub use template::{ClusterTemplate, Compatibility, TemplateDefaults};
pub use validation::{check_dependency_cycles, validate_catalog, validate_name};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors found while building or validating a catalog
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CatalogError {
    #[error("Failed to parse catalog: {0}")]
    ParseError(String),

    #[error("Duplicate {0} name: '{1}'")]
    DuplicateName(&'static str, String),

    #[error("Invalid {0} name: '{1}'")]
    InvalidName(&'static str, String),

    #[error("Service '{0}' referenced by '{1}' is not defined")]
    UndefinedService(String, String),

    #[error("Hardware type '{0}' referenced by template '{1}' is not defined")]
    UndefinedHardwareType(String, String),

    #[error("Image type '{0}' referenced by template '{1}' is not defined")]
    UndefinedImageType(String, String),

    #[error("Default service '{0}' is not compatible with template '{1}'")]
    IncompatibleDefault(String, String),

    #[error("Cyclic service dependency: {}", .0.join(" -> "))]
    CyclicDependency(Vec<String>),
}

/// On-disk shape of a catalog: plain lists of entities
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogDocument {
    #[serde(default)]
    pub services: Vec<Service>,

    #[serde(default)]
    pub hardware_types: Vec<HardwareType>,

    #[serde(default)]
    pub image_types: Vec<ImageType>,

    #[serde(default)]
    pub templates: Vec<ClusterTemplate>,
}

/// Validated entity catalog indexed by name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    pub services: BTreeMap<String, Service>,
    pub hardware_types: BTreeMap<String, HardwareType>,
    pub image_types: BTreeMap<String, ImageType>,
    pub templates: BTreeMap<String, ClusterTemplate>,
}

fn index_by_name<T>(
    kind: &'static str,
    items: Vec<T>,
    name: impl Fn(&T) -> &str,
) -> Result<BTreeMap<String, T>, CatalogError> {
    let mut indexed = BTreeMap::new();
    for item in items {
        let key = name(&item).to_string();
        if indexed.contains_key(&key) {
            return Err(CatalogError::DuplicateName(kind, key));
        }
        indexed.insert(key, item);
    }
    Ok(indexed)
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index and validate a parsed document
    pub fn from_document(document: CatalogDocument) -> Result<Self, CatalogError> {
        let catalog = Self {
            services: index_by_name("service", document.services, |s| s.name.as_str())?,
            hardware_types: index_by_name("hardware type", document.hardware_types, |h| h.name.as_str())?,
            image_types: index_by_name("image type", document.image_types, |i| i.name.as_str())?,
            templates: index_by_name("template", document.templates, |t| t.name.as_str())?,
        };
        validate_catalog(&catalog)?;
        Ok(catalog)
    }

    /// Parse and validate a JSON catalog
    pub fn from_json(content: &str) -> Result<Self, CatalogError> {
        let document: CatalogDocument =
            serde_json::from_str(content).map_err(|e| CatalogError::ParseError(e.to_string()))?;
        Self::from_document(document)
    }

    /// Parse and validate a YAML catalog
    pub fn from_yaml(content: &str) -> Result<Self, CatalogError> {
        let document: CatalogDocument =
            serde_yaml::from_str(content).map_err(|e| CatalogError::ParseError(e.to_string()))?;
        Self::from_document(document)
    }

    /// Flatten back into the on-disk shape
    pub fn to_document(&self) -> CatalogDocument {
        CatalogDocument {
            services: self.services.values().cloned().collect(),
            hardware_types: self.hardware_types.values().cloned().collect(),
            image_types: self.image_types.values().cloned().collect(),
            templates: self.templates.values().cloned().collect(),
        }
    }

    pub fn validate(&self) -> Result<(), CatalogError> {
        validate_catalog(self)
    }

    // Builders, mostly for tests and programmatic catalogs. They do not
    // validate; call `validate()` once the catalog is complete.

    pub fn with_service(mut self, service: Service) -> Self {
        self.services.insert(service.name.clone(), service);
        self
    }

    pub fn with_hardware_type(mut self, hardware_type: HardwareType) -> Self {
        self.hardware_types
            .insert(hardware_type.name.clone(), hardware_type);
        self
    }

    pub fn with_image_type(mut self, image_type: ImageType) -> Self {
        self.image_types.insert(image_type.name.clone(), image_type);
        self
    }

    pub fn with_template(mut self, template: ClusterTemplate) -> Self {
        self.templates.insert(template.name.clone(), template);
        self
    }

    pub fn service(&self, name: &str) -> Option<&Service> {
        self.services.get(name)
    }

    pub fn template(&self, name: &str) -> Option<&ClusterTemplate> {
        self.templates.get(name)
    }
}
