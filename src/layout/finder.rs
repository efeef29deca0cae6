//! Cluster layout search
//!
//! Given candidate node layouts in preference order and a machine count N,
//! find how many nodes of each layout to use. The search starts from a
//! greedy assignment that fills the most preferred layouts first without
//! exceeding any service maximum, then walks the remaining compositions of
//! N in reverse lexicographic order until one satisfies every service
//! count.
//!
//! A hardware type may cap how many nodes of that type the cluster uses. The
//! cap is one budget shared by every layout on the type.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::catalog::Constraints;

use super::composition::Composition;
use super::node_layout::NodeLayout;

/// Searches for node counts per layout
#[derive(Debug, Clone)]
pub struct ClusterLayoutFinder<'a> {
    layouts: &'a [NodeLayout],
    constraints: &'a Constraints,
    num_machines: usize,
    hardware_caps: BTreeMap<String, usize>,
}

impl<'a> ClusterLayoutFinder<'a> {
    /// `constraints` should already be narrowed to the cluster services
    pub fn new(layouts: &'a [NodeLayout], constraints: &'a Constraints, num_machines: usize) -> Self {
        Self {
            layouts,
            constraints,
            num_machines,
            hardware_caps: BTreeMap::new(),
        }
    }

    /// Limit the nodes of each hardware type across all layouts
    pub fn with_hardware_caps(mut self, caps: BTreeMap<String, usize>) -> Self {
        self.hardware_caps = caps;
        self
    }

    fn hardware_cap(&self, hardware_type: &str) -> usize {
        self.hardware_caps
            .get(hardware_type)
            .copied()
            .unwrap_or(usize::MAX)
    }

    /// Per-layout bound for the composition walk
    ///
    /// A layout can never hold more than its hardware type's whole budget;
    /// the shared part of the budget is checked in `is_valid`.
    fn slot_caps(&self) -> Option<Vec<usize>> {
        if self.hardware_caps.is_empty() {
            return None;
        }
        Some(
            self.layouts
                .iter()
                .map(|l| self.hardware_cap(l.hardware_type()))
                .collect(),
        )
    }

    /// Node count per layout, or `None` when no assignment is valid
    pub fn find(&self) -> Option<Vec<usize>> {
        if self.layouts.is_empty() {
            warn!("No node layouts to choose from");
            return None;
        }

        let Some(start) = self.greedy_start() else {
            warn!(
                "Layouts cannot hold {} machines within service maximums",
                self.num_machines
            );
            return None;
        };

        let mut composition = Composition::from_counts(start, self.slot_caps());
        let mut tried = 0usize;
        loop {
            tried += 1;
            if self.is_valid(composition.counts()) {
                debug!("Found cluster layout after {} candidates", tried);
                return Some(composition.into_counts());
            }
            if !composition.advance() {
                break;
            }
        }

        warn!(
            "No valid layout for {} machines after {} candidates",
            self.num_machines, tried
        );
        None
    }

    /// Fill layouts in order, each up to the tightest remaining service max
    /// and what is left of its hardware budget
    fn greedy_start(&self) -> Option<Vec<usize>> {
        let mut used: BTreeMap<&str, usize> = BTreeMap::new();
        let mut hardware_used: BTreeMap<&str, usize> = BTreeMap::new();
        let mut assigned = 0usize;
        let mut counts = Vec::with_capacity(self.layouts.len());

        for layout in self.layouts {
            let hardware = layout.hardware_type();
            let hardware_left = self
                .hardware_cap(hardware)
                .saturating_sub(hardware_used.get(hardware).copied().unwrap_or(0));
            let mut allowed = (self.num_machines - assigned).min(hardware_left);
            for service in layout.services() {
                if let Some(constraint) = self.constraints.service(service) {
                    let so_far = used.get(service.as_str()).copied().unwrap_or(0);
                    allowed = allowed.min(constraint.max_count().saturating_sub(so_far));
                }
            }

            for service in layout.services() {
                *used.entry(service.as_str()).or_insert(0) += allowed;
            }
            *hardware_used.entry(hardware).or_insert(0) += allowed;
            assigned += allowed;
            counts.push(allowed);
        }

        (assigned == self.num_machines).then_some(counts)
    }

    /// Every constrained service lands within [min, max] and at most N, and
    /// no hardware type goes over its cap
    fn is_valid(&self, counts: &[usize]) -> bool {
        let mut service_counts: BTreeMap<&str, usize> = BTreeMap::new();
        let mut hardware_counts: BTreeMap<&str, usize> = BTreeMap::new();
        for (layout, count) in self.layouts.iter().zip(counts) {
            for service in layout.services() {
                *service_counts.entry(service.as_str()).or_insert(0) += count;
            }
            *hardware_counts.entry(layout.hardware_type()).or_insert(0) += count;
        }

        let within_caps = hardware_counts
            .iter()
            .all(|(hardware, count)| *count <= self.hardware_cap(hardware));
        if !within_caps {
            return false;
        }

        self.constraints.services.iter().all(|(service, constraint)| {
            let count = service_counts.get(service.as_str()).copied().unwrap_or(0);
            constraint.allows_count(count) && count <= self.num_machines
        })
    }
}
