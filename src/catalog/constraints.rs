//! Placement constraints
//!
//! Two kinds of rules decide what a valid cluster looks like:
//! - service constraints: where a service may run and on how many nodes
//! - layout constraints: which services must or must not share a node
//!
//! The node-level checks here are shared by the layout generator (which
//! prunes candidate node shapes) and the cluster layout (which validates a
//! whole cluster after incremental changes).

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Ratio bounds relative to cluster size
///
/// Parsed and carried along with the constraint but not enforced by the
/// solver; min/max counts are the only enforced quantity rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RatioConstraint {
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

/// Per-service placement rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConstraint {
    /// Hardware types the service may run on (empty = any)
    #[serde(default)]
    pub hardware_types: BTreeSet<String>,

    /// Image types the service may run on (empty = any)
    #[serde(default)]
    pub image_types: BTreeSet<String>,

    /// Minimum number of nodes running the service (default: 1)
    #[serde(default = "default_min")]
    pub min: usize,

    /// Maximum number of nodes running the service (default: unbounded)
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<usize>,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ratio: Option<RatioConstraint>,
}

fn default_min() -> usize {
    1
}

impl Default for ServiceConstraint {
    fn default() -> Self {
        Self {
            hardware_types: BTreeSet::new(),
            image_types: BTreeSet::new(),
            min: default_min(),
            max: None,
            ratio: None,
        }
    }
}

impl ServiceConstraint {
    /// Constraint with count bounds only
    pub fn count(min: usize, max: usize) -> Self {
        Self {
            min,
            max: Some(max),
            ..Self::default()
        }
    }

    pub fn with_hardware_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hardware_types = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_image_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.image_types = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn min_count(&self) -> usize {
        self.min
    }

    pub fn max_count(&self) -> usize {
        self.max.unwrap_or(usize::MAX)
    }

    pub fn allows_hardware(&self, hardware_type: &str) -> bool {
        self.hardware_types.is_empty() || self.hardware_types.contains(hardware_type)
    }

    pub fn allows_image(&self, image_type: &str) -> bool {
        self.image_types.is_empty() || self.image_types.contains(image_type)
    }

    /// Whether `count` nodes running the service satisfies this constraint
    pub fn allows_count(&self, count: usize) -> bool {
        count >= self.min && count <= self.max_count()
    }
}

/// Co-location rules between services
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutConstraint {
    /// Each set must be placed together: a node with one of them has all
    #[serde(default)]
    pub must_coexist: Vec<BTreeSet<String>>,

    /// Each set may never be placed on one node in full
    #[serde(default)]
    pub cant_coexist: Vec<BTreeSet<String>>,
}

/// All placement rules of a template
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Constraints {
    #[serde(default)]
    pub services: BTreeMap<String, ServiceConstraint>,

    #[serde(default)]
    pub layout: LayoutConstraint,
}

impl Constraints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a service constraint (builder style)
    pub fn with_service(mut self, service: impl Into<String>, constraint: ServiceConstraint) -> Self {
        self.services.insert(service.into(), constraint);
        self
    }

    /// Add a must-coexist set (builder style)
    pub fn must_coexist<I, S>(mut self, services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.layout
            .must_coexist
            .push(services.into_iter().map(Into::into).collect());
        self
    }

    /// Add a must-not-coexist set (builder style)
    pub fn cant_coexist<I, S>(mut self, services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.layout
            .cant_coexist
            .push(services.into_iter().map(Into::into).collect());
        self
    }

    pub fn service(&self, name: &str) -> Option<&ServiceConstraint> {
        self.services.get(name)
    }

    /// A service is unconstrained when nothing limits where or how often it
    /// runs, so it can be added to every node shape.
    pub fn is_unconstrained(&self, service: &str) -> bool {
        !self.services.contains_key(service)
            && !self
                .layout
                .must_coexist
                .iter()
                .chain(self.layout.cant_coexist.iter())
                .any(|set| set.contains(service))
    }

    /// Narrow the constraints to the services actually on a cluster
    ///
    /// Service constraints for absent services are dropped, must-coexist sets
    /// are intersected with the cluster services, and must-not-coexist sets
    /// that can no longer be completed are dropped.
    pub fn restricted_to(&self, cluster_services: &BTreeSet<String>) -> Constraints {
        let services = self
            .services
            .iter()
            .filter(|(name, _)| cluster_services.contains(*name))
            .map(|(name, c)| (name.clone(), c.clone()))
            .collect();

        let must_coexist = self
            .layout
            .must_coexist
            .iter()
            .map(|set| {
                set.intersection(cluster_services)
                    .cloned()
                    .collect::<BTreeSet<_>>()
            })
            .filter(|set| set.len() > 1)
            .collect();

        let cant_coexist = self
            .layout
            .cant_coexist
            .iter()
            .filter(|set| set.is_subset(cluster_services))
            .cloned()
            .collect();

        Constraints {
            services,
            layout: LayoutConstraint {
                must_coexist,
                cant_coexist,
            },
        }
    }

    // ========================================================================
    // Node-level checks
    // ========================================================================

    /// True if the node would hold every member of some must-not-coexist set
    pub fn violates_cant_coexist(&self, node_services: &BTreeSet<String>) -> bool {
        self.layout
            .cant_coexist
            .iter()
            .any(|set| !set.is_empty() && set.is_subset(node_services))
    }

    /// True if the node holds part, but not all, of a must-coexist set
    ///
    /// Only the members of each set that are on the cluster count; a set
    /// member that is not deployed at all cannot be required on the node.
    pub fn violates_must_coexist(
        &self,
        node_services: &BTreeSet<String>,
        cluster_services: &BTreeSet<String>,
    ) -> bool {
        self.layout.must_coexist.iter().any(|set| {
            let present: Vec<&String> = set
                .iter()
                .filter(|s| cluster_services.contains(*s))
                .collect();
            let on_node = present
                .iter()
                .filter(|s| node_services.contains(**s))
                .count();
            on_node > 0 && on_node < present.len()
        })
    }

    /// True if every service on the node accepts the hardware and image type
    pub fn allows_types(
        &self,
        hardware_type: &str,
        image_type: &str,
        node_services: &BTreeSet<String>,
    ) -> bool {
        node_services.iter().all(|service| match self.services.get(service) {
            Some(c) => c.allows_hardware(hardware_type) && c.allows_image(image_type),
            None => true,
        })
    }

    /// Full node-level check used for both generation and validation
    pub fn is_valid_node(
        &self,
        hardware_type: &str,
        image_type: &str,
        node_services: &BTreeSet<String>,
        cluster_services: &BTreeSet<String>,
    ) -> bool {
        !self.violates_cant_coexist(node_services)
            && !self.violates_must_coexist(node_services, cluster_services)
            && self.allows_types(hardware_type, image_type, node_services)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_default_service_constraint() {
        let c = ServiceConstraint::default();
        assert_eq!(c.min_count(), 1);
        assert_eq!(c.max_count(), usize::MAX);
        assert!(c.allows_hardware("anything"));
        assert!(!c.allows_count(0));
        assert!(c.allows_count(1000));
    }

    #[test]
    fn test_parse_constraints() {
        let json = r#"{
            "services": {
                "namenode": {"hardware_types": ["large"], "min": 1, "max": 1},
                "datanode": {"min": 1, "ratio": {"min": 0.5}}
            },
            "layout": {
                "must_coexist": [["datanode", "nodemanager"]],
                "cant_coexist": [["namenode", "datanode"]]
            }
        }"#;

        let constraints: Constraints = serde_json::from_str(json).unwrap();
        let namenode = constraints.service("namenode").unwrap();
        assert_eq!(namenode.max_count(), 1);
        assert!(!namenode.allows_hardware("small"));
        let datanode = constraints.service("datanode").unwrap();
        assert_eq!(datanode.max, None);
        assert_eq!(datanode.ratio.as_ref().unwrap().min, Some(0.5));
        assert_eq!(constraints.layout.cant_coexist.len(), 1);
    }

    #[test]
    fn test_unconstrained_detection() {
        let constraints = Constraints::new()
            .with_service("a", ServiceConstraint::count(1, 1))
            .must_coexist(["b", "c"])
            .cant_coexist(["d", "e"]);

        assert!(!constraints.is_unconstrained("a"));
        assert!(!constraints.is_unconstrained("b"));
        assert!(!constraints.is_unconstrained("e"));
        assert!(constraints.is_unconstrained("f"));
    }

    #[test]
    fn test_cant_coexist() {
        let constraints = Constraints::new().cant_coexist(["a", "b"]);
        assert!(constraints.violates_cant_coexist(&set(&["a", "b", "c"])));
        assert!(!constraints.violates_cant_coexist(&set(&["a", "c"])));
    }

    #[test]
    fn test_must_coexist_restricted_to_cluster() {
        let constraints = Constraints::new().must_coexist(["a", "b", "c"]);
        let cluster = set(&["a", "b", "x"]);

        assert!(!constraints.violates_must_coexist(&set(&["a", "b"]), &cluster));
        assert!(constraints.violates_must_coexist(&set(&["a", "x"]), &cluster));
        assert!(!constraints.violates_must_coexist(&set(&["x"]), &cluster));
    }

    #[test]
    fn test_allows_types() {
        let constraints = Constraints::new().with_service(
            "a",
            ServiceConstraint::default()
                .with_hardware_types(["large"])
                .with_image_types(["centos"]),
        );

        assert!(constraints.allows_types("large", "centos", &set(&["a", "b"])));
        assert!(!constraints.allows_types("small", "centos", &set(&["a"])));
        assert!(!constraints.allows_types("large", "ubuntu", &set(&["a"])));
        assert!(constraints.allows_types("small", "ubuntu", &set(&["b"])));
    }

    #[test]
    fn test_restricted_to() {
        let constraints = Constraints::new()
            .with_service("a", ServiceConstraint::count(1, 1))
            .with_service("z", ServiceConstraint::count(1, 1))
            .must_coexist(["a", "b", "z"])
            .must_coexist(["a", "y"])
            .cant_coexist(["a", "b"])
            .cant_coexist(["a", "z"]);

        let restricted = constraints.restricted_to(&set(&["a", "b"]));
        assert!(restricted.service("a").is_some());
        assert!(restricted.service("z").is_none());
        assert_eq!(restricted.layout.must_coexist, vec![set(&["a", "b"])]);
        assert_eq!(restricted.layout.cant_coexist, vec![set(&["a", "b"])]);
    }
}
