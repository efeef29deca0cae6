//! Cluster solver
//!
//! Front door of the layout engine. Validates a request against the catalog
//! and its template, picks the usable hardware and image types, then runs
//! the generator and finder (for a new cluster) or the updater (for services
//! added to an existing one) and turns the result into concrete nodes.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::catalog::{Catalog, ClusterTemplate, Constraints};
use crate::cluster::{Cluster, Node, NodeProperties};

use super::cluster_layout::ClusterLayout;
use super::finder::ClusterLayoutFinder;
use super::generator::{LayoutPreferences, NodeLayoutGenerator};
use super::node_layout::NodeLayout;
use super::updater::ClusterLayoutUpdater;

/// Default upper bound on machines per cluster
pub const DEFAULT_MAX_CLUSTER_SIZE: usize = 10_000;

/// Errors in a solve request, raised before any search runs
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    #[error("Template '{0}' not found")]
    TemplateNotFound(String),

    #[error("Service '{0}' not found")]
    ServiceNotFound(String),

    #[error("Hardware type '{0}' not found")]
    HardwareTypeNotFound(String),

    #[error("Image type '{0}' not found")]
    ImageTypeNotFound(String),

    #[error("Service '{0}' is not compatible with template '{1}'")]
    IncompatibleService(String, String),

    #[error("Hardware type '{0}' is not compatible with template '{1}'")]
    IncompatibleHardwareType(String, String),

    #[error("Image type '{0}' is not compatible with template '{1}'")]
    IncompatibleImageType(String, String),

    #[error("Service '{0}' depends on '{1}', which is not on the cluster")]
    MissingDependency(String, String),

    #[error("Invalid number of machines: {0} (must be between 1 and {1})")]
    InvalidMachineCount(usize, usize),

    #[error("Cluster would have no services")]
    NoServices,

    #[error("No usable hardware types{}", provider_suffix(.0))]
    NoHardwareTypes(Option<String>),

    #[error("No usable image types{}", provider_suffix(.0))]
    NoImageTypes(Option<String>),
}

fn provider_suffix(provider: &Option<String>) -> String {
    provider
        .as_ref()
        .map(|p| format!(" for provider '{}'", p))
        .unwrap_or_default()
}

/// A request to lay out a new cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterCreateRequest {
    pub name: String,

    pub template: String,

    pub num_machines: usize,

    /// Services to place (default: the template's default services)
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub services: Option<BTreeSet<String>>,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hardware_type: Option<String>,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_type: Option<String>,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

impl ClusterCreateRequest {
    pub fn new(name: impl Into<String>, template: impl Into<String>, num_machines: usize) -> Self {
        Self {
            name: name.into(),
            template: template.into(),
            num_machines,
            services: None,
            hardware_type: None,
            image_type: None,
            provider: None,
        }
    }

    pub fn with_services<I, S>(mut self, services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.services = Some(services.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }
}

/// Settings the solver reads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverSettings {
    #[serde(default)]
    pub preferences: LayoutPreferences,

    #[serde(default = "default_max_cluster_size")]
    pub max_cluster_size: usize,
}

fn default_max_cluster_size() -> usize {
    DEFAULT_MAX_CLUSTER_SIZE
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            preferences: LayoutPreferences::default(),
            max_cluster_size: DEFAULT_MAX_CLUSTER_SIZE,
        }
    }
}

/// A solved layout with the context needed to build nodes from it
#[derive(Debug, Clone)]
pub struct SolvedLayout {
    pub layout: ClusterLayout,
    /// Layouts in preference order, as the finder saw them
    pub ordered: Vec<NodeLayout>,
    pub provider: Option<String>,
}

impl SolvedLayout {
    /// Layouts with non-zero counts, most preferred first
    pub fn entries(&self) -> Vec<(&NodeLayout, usize)> {
        self.ordered
            .iter()
            .map(|l| (l, self.layout.count(l)))
            .filter(|(_, count)| *count > 0)
            .collect()
    }
}

/// Validates requests and drives the layout engine
pub struct Solver<'a> {
    catalog: &'a Catalog,
    settings: &'a SolverSettings,
}

impl<'a> Solver<'a> {
    pub fn new(catalog: &'a Catalog, settings: &'a SolverSettings) -> Self {
        Self { catalog, settings }
    }

    fn template(&self, name: &str) -> Result<&'a ClusterTemplate, SolverError> {
        self.catalog
            .template(name)
            .ok_or_else(|| SolverError::TemplateNotFound(name.to_string()))
    }

    // =========================================================================
    // Request validation
    // =========================================================================

    fn check_services(
        &self,
        template: &ClusterTemplate,
        services: &BTreeSet<String>,
    ) -> Result<(), SolverError> {
        for name in services {
            if self.catalog.service(name).is_none() {
                return Err(SolverError::ServiceNotFound(name.clone()));
            }
            if !template.compatibility.allows_service(name) {
                return Err(SolverError::IncompatibleService(
                    name.clone(),
                    template.name.clone(),
                ));
            }
        }
        Ok(())
    }

    /// Runtime and required install dependencies must all be placed
    fn check_dependencies(&self, services: &BTreeSet<String>) -> Result<(), SolverError> {
        for name in services {
            let Some(service) = self.catalog.service(name) else {
                continue;
            };
            for dep in service.depends_on.iter().chain(service.install.requires.iter()) {
                if !services.contains(dep) {
                    return Err(SolverError::MissingDependency(name.clone(), dep.clone()));
                }
            }
        }
        Ok(())
    }

    /// Candidate hardware types: the explicit choice, else the template
    /// default, else everything compatible; filtered by provider
    fn hardware_types(
        &self,
        template: &ClusterTemplate,
        requested: Option<&String>,
        provider: Option<&String>,
    ) -> Result<Vec<String>, SolverError> {
        let chosen = requested.or(template.defaults.hardware_type.as_ref());
        let candidates: Vec<String> = match chosen {
            Some(name) => {
                if !self.catalog.hardware_types.contains_key(name) {
                    return Err(SolverError::HardwareTypeNotFound(name.clone()));
                }
                if !template.compatibility.allows_hardware(name) {
                    return Err(SolverError::IncompatibleHardwareType(
                        name.clone(),
                        template.name.clone(),
                    ));
                }
                vec![name.clone()]
            }
            None => self
                .catalog
                .hardware_types
                .keys()
                .filter(|name| template.compatibility.allows_hardware(name))
                .cloned()
                .collect(),
        };

        let usable: Vec<String> = candidates
            .into_iter()
            .filter(|name| match provider {
                Some(p) => self
                    .catalog
                    .hardware_types
                    .get(name)
                    .is_some_and(|hw| hw.flavor(p).is_some()),
                None => true,
            })
            .collect();

        if usable.is_empty() {
            return Err(SolverError::NoHardwareTypes(provider.cloned()));
        }
        Ok(usable)
    }

    fn image_types(
        &self,
        template: &ClusterTemplate,
        requested: Option<&String>,
        provider: Option<&String>,
    ) -> Result<Vec<String>, SolverError> {
        let chosen = requested.or(template.defaults.image_type.as_ref());
        let candidates: Vec<String> = match chosen {
            Some(name) => {
                if !self.catalog.image_types.contains_key(name) {
                    return Err(SolverError::ImageTypeNotFound(name.clone()));
                }
                if !template.compatibility.allows_image(name) {
                    return Err(SolverError::IncompatibleImageType(
                        name.clone(),
                        template.name.clone(),
                    ));
                }
                vec![name.clone()]
            }
            None => self
                .catalog
                .image_types
                .keys()
                .filter(|name| template.compatibility.allows_image(name))
                .cloned()
                .collect(),
        };

        let usable: Vec<String> = candidates
            .into_iter()
            .filter(|name| match provider {
                Some(p) => self
                    .catalog
                    .image_types
                    .get(name)
                    .is_some_and(|img| img.image(p).is_some()),
                None => true,
            })
            .collect();

        if usable.is_empty() {
            return Err(SolverError::NoImageTypes(provider.cloned()));
        }
        Ok(usable)
    }

    /// Availability caps of the candidate hardware types that have one
    fn hardware_caps(&self, hardware_types: &[String]) -> BTreeMap<String, usize> {
        hardware_types
            .iter()
            .filter_map(|name| {
                let cap = self.catalog.hardware_types.get(name)?.max_nodes?;
                Some((name.clone(), cap))
            })
            .collect()
    }

    // =========================================================================
    // New clusters
    // =========================================================================

    /// Solve the layout of a new cluster
    ///
    /// `Ok(None)` means the request is valid but no layout satisfies the
    /// constraints.
    pub fn solve_layout(&self, request: &ClusterCreateRequest) -> Result<Option<SolvedLayout>, SolverError> {
        let template = self.template(&request.template)?;

        let services = request
            .services
            .clone()
            .unwrap_or_else(|| template.defaults.services.clone());
        if services.is_empty() {
            return Err(SolverError::NoServices);
        }
        self.check_services(template, &services)?;
        self.check_dependencies(&services)?;

        let max = self.settings.max_cluster_size;
        if request.num_machines == 0 || request.num_machines > max {
            return Err(SolverError::InvalidMachineCount(request.num_machines, max));
        }

        let provider = request
            .provider
            .clone()
            .or_else(|| template.defaults.provider.clone());
        let hardware_types = self.hardware_types(template, request.hardware_type.as_ref(), provider.as_ref())?;
        let image_types = self.image_types(template, request.image_type.as_ref(), provider.as_ref())?;

        debug!(
            "Solving '{}': {} services, {} hardware types, {} image types, {} machines",
            request.name,
            services.len(),
            hardware_types.len(),
            image_types.len(),
            request.num_machines
        );

        let hardware_caps = self.hardware_caps(&hardware_types);

        let constraints: Constraints = template.constraints.restricted_to(&services);
        let generator = NodeLayoutGenerator::new(
            services,
            hardware_types,
            image_types,
            &constraints,
            &self.settings.preferences,
        );
        let layouts = if !hardware_caps.is_empty() {
            generator.generate_with_alternatives()
        } else {
            generator.generate()
        };

        if layouts.is_empty() {
            warn!("No node layout satisfies the constraints of '{}'", request.name);
            return Ok(None);
        }

        let finder = ClusterLayoutFinder::new(&layouts, &constraints, request.num_machines)
            .with_hardware_caps(hardware_caps);

        let Some(counts) = finder.find() else {
            return Ok(None);
        };

        info!(
            "Solved layout for '{}' with {} node shapes",
            request.name,
            counts.iter().filter(|c| **c > 0).count()
        );

        Ok(Some(SolvedLayout {
            layout: ClusterLayout::from_counts(&layouts, &counts, constraints),
            ordered: layouts,
            provider,
        }))
    }

    /// Solve a new cluster and build its nodes
    pub fn solve_cluster_nodes(&self, request: &ClusterCreateRequest) -> Result<Option<Vec<Node>>, SolverError> {
        let Some(solved) = self.solve_layout(request)? else {
            return Ok(None);
        };

        let mut nodes = Vec::with_capacity(request.num_machines);
        for (layout, count) in solved.entries() {
            for _ in 0..count {
                nodes.push(self.build_node(layout, solved.provider.as_deref()));
            }
        }
        Ok(Some(nodes))
    }

    fn build_node(&self, layout: &NodeLayout, provider: Option<&str>) -> Node {
        let mut node = Node::new(
            Uuid::new_v4().to_string(),
            layout.hardware_type(),
            layout.image_type(),
        )
        .with_services(layout.services().iter().cloned());

        if let Some(p) = provider {
            node.properties = NodeProperties {
                provider: Some(p.to_string()),
                flavor: self
                    .catalog
                    .hardware_types
                    .get(layout.hardware_type())
                    .and_then(|hw| hw.flavor(p))
                    .map(String::from),
                image: self
                    .catalog
                    .image_types
                    .get(layout.image_type())
                    .and_then(|img| img.image(p))
                    .map(String::from),
            };
        }
        node
    }

    // =========================================================================
    // Existing clusters
    // =========================================================================

    /// Place additional services on an existing cluster's nodes
    ///
    /// Returns the full updated node list, or `Ok(None)` when the services
    /// cannot be placed. No nodes are added or removed.
    pub fn add_services(
        &self,
        cluster: &Cluster,
        services: &BTreeSet<String>,
    ) -> Result<Option<Vec<Node>>, SolverError> {
        let template = self.template(&cluster.template)?;
        if services.is_empty() {
            return Err(SolverError::NoServices);
        }
        self.check_services(template, services)?;

        let mut all_services = cluster.services();
        all_services.extend(services.iter().cloned());
        self.check_dependencies(&all_services)?;

        let constraints = template.constraints.restricted_to(&all_services);
        let layout = ClusterLayout::from_nodes(&cluster.nodes, constraints);

        let Some(tracker) = ClusterLayoutUpdater::new(layout).add_services(services) else {
            return Ok(None);
        };

        let mut nodes = cluster.nodes.clone();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        for change in tracker.changes() {
            for (from, count) in &change.expansions {
                let targets = nodes.iter_mut().filter(|n| from.matches(n)).take(*count);
                for node in targets {
                    node.services.insert(change.service.clone());
                }
            }
        }
        Ok(Some(nodes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{HardwareType, ImageType, Service, ServiceConstraint};

    fn catalog() -> Catalog {
        let constraints = Constraints::new()
            .with_service(
                "master",
                ServiceConstraint::count(1, 1).with_hardware_types(["large"]),
            )
            .with_service("worker", ServiceConstraint::default())
            .cant_coexist(["master", "worker"]);

        let mut template = ClusterTemplate::new("hadoop")
            .with_default_services(["base", "master", "worker"])
            .with_constraints(constraints);
        template.defaults.provider = Some("openstack".to_string());

        Catalog::new()
            .with_service(Service::new("base"))
            .with_service(Service::new("master").depends_on("base"))
            .with_service(Service::new("worker").depends_on("master"))
            .with_service(Service::new("web"))
            .with_hardware_type(HardwareType::new("small").on_provider("openstack", "m1.small"))
            .with_hardware_type(HardwareType::new("large").on_provider("openstack", "m1.large"))
            .with_hardware_type(HardwareType::new("gpu").on_provider("aws", "p3"))
            .with_image_type(ImageType::new("centos").on_provider("openstack", "img-1"))
            .with_template(template)
    }

    #[test]
    fn test_solve_default_services() {
        let catalog = catalog();
        let settings = SolverSettings::default();
        let solver = Solver::new(&catalog, &settings);

        let nodes = solver
            .solve_cluster_nodes(&ClusterCreateRequest::new("c", "hadoop", 4))
            .unwrap()
            .unwrap();

        assert_eq!(nodes.len(), 4);
        let masters: Vec<&Node> = nodes.iter().filter(|n| n.has_service("master")).collect();
        assert_eq!(masters.len(), 1);
        assert_eq!(masters[0].hardware_type, "large");
        assert_eq!(masters[0].properties.flavor.as_deref(), Some("m1.large"));
        assert!(nodes.iter().all(|n| n.has_service("base")));
        assert_eq!(nodes.iter().filter(|n| n.has_service("worker")).count(), 3);
        assert!(nodes
            .iter()
            .all(|n| !(n.has_service("master") && n.has_service("worker"))));
    }

    #[test]
    fn test_unknown_references() {
        let catalog = catalog();
        let settings = SolverSettings::default();
        let solver = Solver::new(&catalog, &settings);

        let missing_template = ClusterCreateRequest::new("c", "nope", 1);
        assert_eq!(
            solver.solve_layout(&missing_template).unwrap_err(),
            SolverError::TemplateNotFound("nope".to_string())
        );

        let missing_service = ClusterCreateRequest::new("c", "hadoop", 1).with_services(["base", "ghost"]);
        assert_eq!(
            solver.solve_layout(&missing_service).unwrap_err(),
            SolverError::ServiceNotFound("ghost".to_string())
        );

        let mut missing_hw = ClusterCreateRequest::new("c", "hadoop", 2);
        missing_hw.hardware_type = Some("huge".to_string());
        assert_eq!(
            solver.solve_layout(&missing_hw).unwrap_err(),
            SolverError::HardwareTypeNotFound("huge".to_string())
        );
    }

    #[test]
    fn test_missing_dependency() {
        let catalog = catalog();
        let settings = SolverSettings::default();
        let solver = Solver::new(&catalog, &settings);

        let request = ClusterCreateRequest::new("c", "hadoop", 2).with_services(["base", "worker"]);
        assert_eq!(
            solver.solve_layout(&request).unwrap_err(),
            SolverError::MissingDependency("worker".to_string(), "master".to_string())
        );
    }

    #[test]
    fn test_machine_count_bounds() {
        let catalog = catalog();
        let settings = SolverSettings {
            max_cluster_size: 10,
            ..SolverSettings::default()
        };
        let solver = Solver::new(&catalog, &settings);

        assert!(matches!(
            solver.solve_layout(&ClusterCreateRequest::new("c", "hadoop", 0)),
            Err(SolverError::InvalidMachineCount(0, 10))
        ));
        assert!(matches!(
            solver.solve_layout(&ClusterCreateRequest::new("c", "hadoop", 11)),
            Err(SolverError::InvalidMachineCount(11, 10))
        ));
    }

    #[test]
    fn test_provider_filters_types() {
        let catalog = catalog();
        let settings = SolverSettings::default();
        let solver = Solver::new(&catalog, &settings);

        let request = ClusterCreateRequest::new("c", "hadoop", 2).with_provider("aws");
        assert_eq!(
            solver.solve_layout(&request).unwrap_err(),
            SolverError::NoImageTypes(Some("aws".to_string()))
        );
    }

    #[test]
    fn test_infeasible_is_none() {
        let catalog = catalog();
        let settings = SolverSettings::default();
        let solver = Solver::new(&catalog, &settings);

        // master only runs on large hardware
        let mut request = ClusterCreateRequest::new("c", "hadoop", 3).with_services(["base", "master"]);
        request.hardware_type = Some("small".to_string());
        assert!(solver.solve_layout(&request).unwrap().is_none());
    }

    #[test]
    fn test_hardware_cap_spreads_layouts() {
        let catalog = catalog()
            .with_hardware_type(HardwareType::new("small").on_provider("openstack", "m1.small").with_max_nodes(1));
        let settings = SolverSettings {
            preferences: LayoutPreferences::new(["small", "large"], ["centos"]),
            ..SolverSettings::default()
        };
        let solver = Solver::new(&catalog, &settings);

        let request = ClusterCreateRequest::new("c", "hadoop", 3).with_services(["base", "web"]);
        let nodes = solver.solve_cluster_nodes(&request).unwrap().unwrap();
        assert_eq!(nodes.iter().filter(|n| n.hardware_type == "small").count(), 1);
        assert_eq!(nodes.len(), 3);
    }

    #[test]
    fn test_hardware_cap_shared_by_service_sets() {
        let constraints = Constraints::new()
            .with_service("a", ServiceConstraint::default())
            .with_service("b", ServiceConstraint::default())
            .cant_coexist(["a", "b"]);
        let catalog = Catalog::new()
            .with_service(Service::new("a"))
            .with_service(Service::new("b"))
            .with_hardware_type(HardwareType::new("small").with_max_nodes(1))
            .with_hardware_type(HardwareType::new("large"))
            .with_image_type(ImageType::new("centos"))
            .with_template(
                ClusterTemplate::new("split")
                    .with_default_services(["a", "b"])
                    .with_constraints(constraints),
            );
        let settings = SolverSettings {
            preferences: LayoutPreferences::new(["small", "large"], ["centos"]),
            ..SolverSettings::default()
        };

        let nodes = Solver::new(&catalog, &settings)
            .solve_cluster_nodes(&ClusterCreateRequest::new("c", "split", 3))
            .unwrap()
            .unwrap();
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes.iter().filter(|n| n.hardware_type == "small").count(), 1);
        assert!(nodes.iter().any(|n| n.has_service("b")));
    }

    #[test]
    fn test_add_services_to_cluster() {
        let catalog = catalog();
        let settings = SolverSettings::default();
        let solver = Solver::new(&catalog, &settings);

        let cluster = Cluster::new("c1", "c", "hadoop").with_nodes(vec![
            Node::new("n1", "large", "centos").with_services(["base", "master"]),
            Node::new("n2", "small", "centos").with_services(["base", "worker"]),
        ]);

        let nodes = solver
            .add_services(&cluster, &["web".to_string()].into_iter().collect())
            .unwrap()
            .unwrap();
        assert_eq!(nodes.len(), 2);
        assert!(nodes.iter().all(|n| n.has_service("web")));
        assert!(nodes[0].has_service("master"));
    }
}
