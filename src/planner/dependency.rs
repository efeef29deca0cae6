//! Service dependency resolution
//!
//! Turns the catalog's service dependencies into ordering edges between
//! service actions. The service graph is transitively reduced first, then
//! each rule ("if A depends on B, A's X waits for B's Y") is applied over
//! the reduced edges. When B does not define Y, or is not on the cluster,
//! the walk continues to B's own dependencies, so ordering is never lost
//! through a service that has nothing to do for the action. Action edges
//! implied by a longer chain of action edges are dropped at the end.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::catalog::{ProvisionerAction, Service};

/// Which side of a dependency waits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleDirection {
    /// The dependent's action waits for the dependency's action
    Forward,
    /// The dependency's action waits for the dependent's action
    Reverse,
}

/// Ordering rule between actions of dependent services
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDependencyRule {
    /// Action on the service that declares the dependency
    pub dependent: ProvisionerAction,
    /// Action on the service being depended on
    pub dependency: ProvisionerAction,
    pub direction: RuleDirection,
}

impl ActionDependencyRule {
    pub const fn forward(dependent: ProvisionerAction, dependency: ProvisionerAction) -> Self {
        Self {
            dependent,
            dependency,
            direction: RuleDirection::Forward,
        }
    }

    pub const fn reverse(dependent: ProvisionerAction, dependency: ProvisionerAction) -> Self {
        Self {
            dependent,
            dependency,
            direction: RuleDirection::Reverse,
        }
    }
}

/// A service is installed only after the services it installs against
pub const INSTALL_RULES: [ActionDependencyRule; 1] = [ActionDependencyRule::forward(
    ProvisionerAction::Install,
    ProvisionerAction::Install,
)];

/// A service initializes and starts only once its dependencies run
pub const START_RULES: [ActionDependencyRule; 2] = [
    ActionDependencyRule::forward(ProvisionerAction::Initialize, ProvisionerAction::Start),
    ActionDependencyRule::forward(ProvisionerAction::Start, ProvisionerAction::Start),
];

/// A dependency stops only after everything depending on it stopped
pub const STOP_RULES: [ActionDependencyRule; 1] = [ActionDependencyRule::reverse(
    ProvisionerAction::Stop,
    ProvisionerAction::Stop,
)];

/// One action of one service
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ServiceAction {
    pub service: String,
    pub action: ProvisionerAction,
}

impl ServiceAction {
    pub fn new(service: impl Into<String>, action: ProvisionerAction) -> Self {
        Self {
            service: service.into(),
            action,
        }
    }
}

/// `after` may only run once `before` has completed
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActionEdge {
    pub before: ServiceAction,
    pub after: ServiceAction,
}

type Graph = BTreeMap<String, BTreeSet<String>>;

fn reachable(graph: &Graph, from: &str) -> BTreeSet<String> {
    let mut seen = BTreeSet::new();
    let mut stack: Vec<&String> = graph.get(from).into_iter().flatten().collect();
    while let Some(next) = stack.pop() {
        if seen.insert(next.clone()) {
            stack.extend(graph.get(next.as_str()).into_iter().flatten());
        }
    }
    seen
}

/// Drop A -> B whenever B is reachable through another dependency of A
pub fn transitive_reduction(graph: &Graph) -> Graph {
    let reach: BTreeMap<&str, BTreeSet<String>> = graph
        .keys()
        .map(|name| (name.as_str(), reachable(graph, name)))
        .collect();

    graph
        .iter()
        .map(|(name, deps)| {
            let kept = deps
                .iter()
                .filter(|dep| {
                    !deps.iter().any(|other| {
                        other != *dep
                            && reach
                                .get(other.as_str())
                                .is_some_and(|r| r.contains(dep.as_str()))
                    })
                })
                .cloned()
                .collect();
            (name.clone(), kept)
        })
        .collect()
}

/// Drop action edges implied by a longer path of action edges
pub fn reduce_action_edges(edges: BTreeSet<ActionEdge>) -> BTreeSet<ActionEdge> {
    let mut successors: BTreeMap<&ServiceAction, BTreeSet<&ServiceAction>> = BTreeMap::new();
    for edge in &edges {
        successors.entry(&edge.before).or_default().insert(&edge.after);
    }

    let implied = |edge: &ActionEdge| -> bool {
        let mut seen: BTreeSet<&ServiceAction> = BTreeSet::new();
        let mut stack: Vec<&ServiceAction> = successors
            .get(&edge.before)
            .into_iter()
            .flatten()
            .copied()
            .filter(|s| **s != edge.after)
            .collect();
        while let Some(current) = stack.pop() {
            if *current == edge.after {
                return true;
            }
            if seen.insert(current) {
                stack.extend(successors.get(current).into_iter().flatten().copied());
            }
        }
        false
    };

    edges.iter().filter(|e| !implied(*e)).cloned().collect()
}

fn known_deps<'s>(
    deps: impl Iterator<Item = &'s String>,
    services: &BTreeMap<String, Service>,
) -> BTreeSet<String> {
    deps.filter(|d| services.contains_key(*d)).cloned().collect()
}

/// Resolves ordering edges for the services of one cluster
#[derive(Debug, Clone)]
pub struct ServiceDependencyResolver<'a> {
    services: &'a BTreeMap<String, Service>,
    present: BTreeSet<String>,
    runtime: Graph,
    install: Graph,
}

impl<'a> ServiceDependencyResolver<'a> {
    /// `present` is the set of services placed on the cluster
    pub fn new(services: &'a BTreeMap<String, Service>, present: BTreeSet<String>) -> Self {
        let runtime: Graph = services
            .values()
            .map(|s| (s.name.clone(), known_deps(s.depends_on.iter(), services)))
            .collect();
        let install: Graph = services
            .values()
            .map(|s| (s.name.clone(), known_deps(s.install.all(), services)))
            .collect();

        Self {
            services,
            present,
            runtime: transitive_reduction(&runtime),
            install: transitive_reduction(&install),
        }
    }

    pub fn present(&self) -> &BTreeSet<String> {
        &self.present
    }

    fn defines(&self, service: &str, action: ProvisionerAction) -> bool {
        self.present.contains(service)
            && self
                .services
                .get(service)
                .is_some_and(|s| s.defines(action))
    }

    /// Reduced runtime dependencies of a service
    pub fn direct_dependencies(&self, service: &str) -> BTreeSet<String> {
        self.runtime.get(service).cloned().unwrap_or_default()
    }

    /// Requested services plus everything they transitively depend on,
    /// limited to the cluster
    pub fn dependencies_closure(&self, services: &BTreeSet<String>) -> BTreeSet<String> {
        let mut closure: BTreeSet<String> = services.clone();
        for service in services {
            closure.extend(reachable(&self.runtime, service));
        }
        closure.retain(|s| self.present.contains(s));
        closure
    }

    /// Requested services plus everything that transitively depends on them,
    /// limited to the cluster
    pub fn dependents_closure(&self, services: &BTreeSet<String>) -> BTreeSet<String> {
        let mut reversed: Graph = BTreeMap::new();
        for (name, deps) in &self.runtime {
            for dep in deps {
                reversed.entry(dep.clone()).or_default().insert(name.clone());
            }
        }

        let mut closure: BTreeSet<String> = services.clone();
        for service in services {
            closure.extend(reachable(&reversed, service));
        }
        closure.retain(|s| self.present.contains(s));
        closure
    }

    /// Edges from runtime (`depends_on`) dependencies
    pub fn runtime_edges(&self, rules: &[ActionDependencyRule]) -> BTreeSet<ActionEdge> {
        self.edges(&self.runtime, rules)
    }

    /// INSTALL ordering from install-stage dependencies
    pub fn install_edges(&self) -> BTreeSet<ActionEdge> {
        self.edges(&self.install, &INSTALL_RULES)
    }

    fn edges(&self, graph: &Graph, rules: &[ActionDependencyRule]) -> BTreeSet<ActionEdge> {
        let mut edges = BTreeSet::new();

        for rule in rules {
            for service in &self.present {
                if !self.defines(service, rule.dependent) {
                    continue;
                }

                let mut seen: BTreeSet<&str> = BTreeSet::new();
                let mut stack: Vec<&String> = graph.get(service).into_iter().flatten().collect();
                while let Some(dep) = stack.pop() {
                    if !seen.insert(dep.as_str()) {
                        continue;
                    }
                    if self.defines(dep, rule.dependency) {
                        let dependent = ServiceAction::new(service.as_str(), rule.dependent);
                        let dependency = ServiceAction::new(dep.as_str(), rule.dependency);
                        let edge = match rule.direction {
                            RuleDirection::Forward => ActionEdge {
                                before: dependency,
                                after: dependent,
                            },
                            RuleDirection::Reverse => ActionEdge {
                                before: dependent,
                                after: dependency,
                            },
                        };
                        edges.insert(edge);
                    } else {
                        // nothing to wait for here, look further down
                        stack.extend(graph.get(dep.as_str()).into_iter().flatten());
                    }
                }
            }
        }

        reduce_action_edges(edges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ProvisionerAction::*;

    fn catalog(services: Vec<Service>) -> BTreeMap<String, Service> {
        services.into_iter().map(|s| (s.name.clone(), s)).collect()
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn edge(before: (&str, ProvisionerAction), after: (&str, ProvisionerAction)) -> ActionEdge {
        ActionEdge {
            before: ServiceAction::new(before.0, before.1),
            after: ServiceAction::new(after.0, after.1),
        }
    }

    #[test]
    fn test_transitive_reduction() {
        let graph: Graph = [
            ("a".to_string(), set(&[])),
            ("b".to_string(), set(&["a"])),
            ("c".to_string(), set(&["a", "b"])),
        ]
        .into_iter()
        .collect();

        let reduced = transitive_reduction(&graph);
        assert_eq!(reduced["c"], set(&["b"]));
        assert_eq!(reduced["b"], set(&["a"]));
    }

    #[test]
    fn test_start_edges_follow_dependencies() {
        let services = catalog(vec![
            Service::new("s1").with_actions(&[Configure, Start]),
            Service::new("s2").depends_on("s1").with_actions(&[Install, Configure]),
            Service::new("s3")
                .depends_on("s1")
                .depends_on("s2")
                .with_actions(&[Install, Configure, Initialize, Start]),
        ]);
        let resolver = ServiceDependencyResolver::new(&services, set(&["s1", "s2", "s3"]));

        let edges = resolver.runtime_edges(&START_RULES);
        // s3 -> s2 is the only reduced edge; s2 has no START so the walk hops to s1
        assert_eq!(
            edges,
            BTreeSet::from([
                edge(("s1", Start), ("s3", Initialize)),
                edge(("s1", Start), ("s3", Start)),
            ])
        );
    }

    #[test]
    fn test_stop_edges_are_reversed() {
        let services = catalog(vec![
            Service::new("db").with_actions(&[Start, Stop]),
            Service::new("app").depends_on("db").with_actions(&[Start, Stop]),
        ]);
        let resolver = ServiceDependencyResolver::new(&services, set(&["db", "app"]));

        let edges = resolver.runtime_edges(&STOP_RULES);
        assert_eq!(edges, BTreeSet::from([edge(("app", Stop), ("db", Stop))]));
    }

    #[test]
    fn test_absent_dependency_is_hopped() {
        let services = catalog(vec![
            Service::new("base").with_action(Start),
            Service::new("middle").depends_on("base").with_action(Start),
            Service::new("top").depends_on("middle").with_action(Start),
        ]);
        let resolver = ServiceDependencyResolver::new(&services, set(&["base", "top"]));

        let edges = resolver.runtime_edges(&START_RULES);
        assert_eq!(edges, BTreeSet::from([edge(("base", Start), ("top", Start))]));
    }

    #[test]
    fn test_implied_action_edges_dropped() {
        let edges = BTreeSet::from([
            edge(("a", Start), ("b", Start)),
            edge(("b", Start), ("c", Start)),
            edge(("a", Start), ("c", Start)),
        ]);

        let reduced = reduce_action_edges(edges);
        assert_eq!(reduced.len(), 2);
        assert!(!reduced.contains(&edge(("a", Start), ("c", Start))));
    }

    #[test]
    fn test_install_edges_use_install_graph() {
        let services = catalog(vec![
            Service::new("java").with_action(Install),
            Service::new("hadoop").install_requires("java").with_action(Install),
            Service::new("hive").install_uses("hadoop").with_action(Install),
        ]);
        let resolver = ServiceDependencyResolver::new(&services, set(&["java", "hadoop", "hive"]));

        let edges = resolver.install_edges();
        assert_eq!(
            edges,
            BTreeSet::from([
                edge(("java", Install), ("hadoop", Install)),
                edge(("hadoop", Install), ("hive", Install)),
            ])
        );
        assert!(resolver.runtime_edges(&START_RULES).is_empty());
    }

    #[test]
    fn test_closures() {
        let services = catalog(vec![
            Service::new("zk"),
            Service::new("hdfs").depends_on("zk"),
            Service::new("hbase").depends_on("hdfs"),
            Service::new("web"),
        ]);
        let resolver = ServiceDependencyResolver::new(&services, set(&["zk", "hdfs", "hbase", "web"]));

        assert_eq!(
            resolver.dependencies_closure(&set(&["hbase"])),
            set(&["hbase", "hdfs", "zk"])
        );
        assert_eq!(
            resolver.dependents_closure(&set(&["zk"])),
            set(&["hbase", "hdfs", "zk"])
        );
        assert_eq!(resolver.dependents_closure(&set(&["web"])), set(&["web"]));
        assert_eq!(resolver.direct_dependencies("hbase"), set(&["hdfs"]));
    }
}
