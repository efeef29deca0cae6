//! Incremental service addition
//!
//! Adds services to an existing cluster without touching the services
//! already placed. Services are handled tightest first (smallest max, then
//! largest min, then name). For each one the candidate changes are tried
//! lazily, widest spread first; a change that leaves the layout invalid, or
//! from which the remaining services cannot be placed, is undone before the
//! next candidate is tried.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, warn};

use super::cluster_layout::ClusterLayout;
use super::composition::Compositions;
use super::node_layout::NodeLayout;
use super::tracker::{ClusterLayoutTracker, LayoutChange};

/// Order services by how constrained they are
pub fn order_by_tightness(layout: &ClusterLayout, services: &BTreeSet<String>) -> Vec<String> {
    let constraints = layout.constraints();
    let mut ordered: Vec<String> = services.iter().cloned().collect();
    ordered.sort_by_key(|service| {
        let (min, max) = constraints
            .service(service)
            .map(|c| (c.min_count(), c.max_count()))
            .unwrap_or((1, usize::MAX));
        (max, Reverse(min), service.clone())
    });
    ordered
}

/// Lazily enumerates the ways to add one service to a layout
///
/// Totals run from the widest allowed spread down to the minimum; for each
/// total, distributions over the expandable layouts follow the capped
/// composition order with the current layout counts as caps.
pub struct ServiceExpansions {
    service: String,
    expandable: Vec<NodeLayout>,
    caps: Vec<usize>,
    total: usize,
    min_total: usize,
    current: Option<Compositions>,
}

impl ServiceExpansions {
    pub fn new(layout: &ClusterLayout, service: &str) -> Self {
        let constraints = layout.constraints();
        let mut cluster_services = layout.services();
        cluster_services.insert(service.to_string());

        let mut expandable = Vec::new();
        let mut caps = Vec::new();
        for (node_layout, count) in layout.layouts() {
            if node_layout.contains(service) {
                continue;
            }
            let expanded = node_layout.with_service(service);
            if constraints.is_valid_node(
                expanded.hardware_type(),
                expanded.image_type(),
                expanded.services(),
                &cluster_services,
            ) {
                expandable.push(node_layout.clone());
                caps.push(count);
            }
        }

        let eligible: usize = caps.iter().sum();
        let (min, max) = constraints
            .service(service)
            .map(|c| (c.min_count(), c.max_count()))
            .unwrap_or((1, usize::MAX));

        Self {
            service: service.to_string(),
            expandable,
            caps,
            total: max.min(eligible),
            min_total: min.max(1),
            current: None,
        }
    }

    /// Number of nodes that could take the service
    pub fn eligible_nodes(&self) -> usize {
        self.caps.iter().sum()
    }
}

impl Iterator for ServiceExpansions {
    type Item = LayoutChange;

    fn next(&mut self) -> Option<LayoutChange> {
        loop {
            if self.total < self.min_total {
                return None;
            }

            let compositions = self
                .current
                .get_or_insert_with(|| Compositions::capped(self.total, self.caps.clone()));

            if let Some(counts) = compositions.next() {
                let change = self
                    .expandable
                    .iter()
                    .zip(counts)
                    .fold(LayoutChange::new(self.service.as_str()), |change, (layout, count)| {
                        change.expand(layout.clone(), count)
                    });
                return Some(change);
            }

            self.current = None;
            self.total -= 1;
        }
    }
}

/// Adds services to an existing cluster layout
#[derive(Debug, Clone)]
pub struct ClusterLayoutUpdater {
    layout: ClusterLayout,
}

impl ClusterLayoutUpdater {
    /// The layout's constraints must cover the services being added
    pub fn new(layout: ClusterLayout) -> Self {
        Self { layout }
    }

    /// Find changes placing every new service, or `None` if impossible
    ///
    /// Services already on the cluster are skipped.
    pub fn add_services(self, services: &BTreeSet<String>) -> Option<ClusterLayoutTracker> {
        let present = self.layout.services();
        let new_services: BTreeSet<String> = services
            .iter()
            .filter(|s| {
                let fresh = !present.contains(*s);
                if !fresh {
                    debug!("Service '{}' already on the cluster, skipping", s);
                }
                fresh
            })
            .cloned()
            .collect();

        let order = order_by_tightness(&self.layout, &new_services);
        let mut tracker = ClusterLayoutTracker::new(self.layout);

        if search(&mut tracker, &order) {
            info!(
                "Placed {} services with {} layout changes",
                order.len(),
                tracker.changes().len()
            );
            Some(tracker)
        } else {
            warn!("No valid placement for services {:?}", order);
            None
        }
    }
}

fn search(tracker: &mut ClusterLayoutTracker, remaining: &[String]) -> bool {
    let Some((service, rest)) = remaining.split_first() else {
        return true;
    };

    let expansions = ServiceExpansions::new(tracker.current(), service);
    debug!(
        "Placing '{}' on up to {} eligible nodes",
        service,
        expansions.eligible_nodes()
    );

    for change in expansions {
        if !tracker.try_apply(change) {
            continue;
        }
        if search(tracker, rest) {
            return true;
        }
        tracker.undo();
    }
    false
}

/// Nodes per service after applying changes, for reporting
pub fn added_service_counts(changes: &[LayoutChange]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for change in changes {
        *counts.entry(change.service.clone()).or_insert(0) += change.node_count();
    }
    counts
}
