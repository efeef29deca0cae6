//! Cluster layouts
//!
//! A ClusterLayout is a multiset of node layouts together with the
//! constraints it must satisfy. It is what the finder produces for a new
//! cluster and what the updater mutates when services are added.

use std::collections::{BTreeMap, BTreeSet};

use crate::catalog::Constraints;
use crate::cluster::Node;

use super::node_layout::NodeLayout;

/// Node layouts with their counts
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterLayout {
    constraints: Constraints,
    counts: BTreeMap<NodeLayout, usize>,
}

impl ClusterLayout {
    pub fn new(constraints: Constraints) -> Self {
        Self {
            constraints,
            counts: BTreeMap::new(),
        }
    }

    /// Pair up layouts with counts, skipping zero counts
    pub fn from_counts(layouts: &[NodeLayout], counts: &[usize], constraints: Constraints) -> Self {
        let mut layout = Self::new(constraints);
        for (node_layout, count) in layouts.iter().zip(counts) {
            layout.add(node_layout, *count);
        }
        layout
    }

    /// Describe existing nodes
    pub fn from_nodes(nodes: &[Node], constraints: Constraints) -> Self {
        let mut layout = Self::new(constraints);
        for node in nodes {
            layout.add(&NodeLayout::of_node(node), 1);
        }
        layout
    }

    pub fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    /// Layouts with a non-zero count, in layout order
    pub fn layouts(&self) -> impl Iterator<Item = (&NodeLayout, usize)> {
        self.counts.iter().map(|(layout, count)| (layout, *count))
    }

    pub fn count(&self, layout: &NodeLayout) -> usize {
        self.counts.get(layout).copied().unwrap_or(0)
    }

    pub fn total_nodes(&self) -> usize {
        self.counts.values().sum()
    }

    /// Number of nodes running each service
    pub fn service_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for (layout, count) in &self.counts {
            for service in layout.services() {
                *counts.entry(service.clone()).or_insert(0) += count;
            }
        }
        counts
    }

    pub fn services(&self) -> BTreeSet<String> {
        self.counts
            .keys()
            .flat_map(|layout| layout.services().iter().cloned())
            .collect()
    }

    pub(crate) fn add(&mut self, layout: &NodeLayout, count: usize) {
        if count > 0 {
            *self.counts.entry(layout.clone()).or_insert(0) += count;
        }
    }

    /// Take `count` nodes away from a layout; false if it has fewer
    pub(crate) fn remove(&mut self, layout: &NodeLayout, count: usize) -> bool {
        let Some(current) = self.counts.get_mut(layout) else {
            return count == 0;
        };
        if *current < count {
            return false;
        }
        *current -= count;
        if *current == 0 {
            self.counts.remove(layout);
        }
        true
    }

    /// Check every node shape and every service count
    ///
    /// Only services present on the cluster are counted; a constrained
    /// service that has not been placed yet is not a violation.
    pub fn is_valid(&self) -> bool {
        let cluster_services = self.services();

        let nodes_valid = self.counts.keys().all(|layout| {
            self.constraints.is_valid_node(
                layout.hardware_type(),
                layout.image_type(),
                layout.services(),
                &cluster_services,
            )
        });
        if !nodes_valid {
            return false;
        }

        self.service_counts().iter().all(|(service, count)| {
            self.constraints
                .service(service)
                .map_or(true, |c| c.allows_count(*count))
        })
    }
}
