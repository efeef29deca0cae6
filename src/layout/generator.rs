//! Node layout generation
//!
//! Produces every node shape worth considering for a cluster:
//!
//! 1. Split the cluster services into constrained and unconstrained ones.
//! 2. Search subsets of the constrained services breadth first from the full
//!    set, keeping those that break no co-location rule.
//! 3. Add the unconstrained services to every kept subset; the unconstrained
//!    set alone is a candidate too.
//! 4. Cross each service set with every allowed hardware and image type.
//! 5. Keep one layout per service set, the one whose types rank best.
//! 6. Sort: more services first, then by type preference, then by names.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::Constraints;

use super::node_layout::NodeLayout;

/// Preferred hardware and image types, most preferred first
///
/// Types not listed rank after every listed type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutPreferences {
    #[serde(default)]
    pub hardware_types: Vec<String>,

    #[serde(default)]
    pub image_types: Vec<String>,
}

impl LayoutPreferences {
    pub fn new<H, I, S>(hardware_types: H, image_types: I) -> Self
    where
        H: IntoIterator<Item = S>,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            hardware_types: hardware_types.into_iter().map(Into::into).collect(),
            image_types: image_types.into_iter().map(Into::into).collect(),
        }
    }

    fn rank(list: &[String], name: &str) -> usize {
        list.iter().position(|n| n == name).unwrap_or(usize::MAX)
    }

    pub fn hardware_rank(&self, name: &str) -> usize {
        Self::rank(&self.hardware_types, name)
    }

    pub fn image_rank(&self, name: &str) -> usize {
        Self::rank(&self.image_types, name)
    }

    /// Order two layouts by their types alone
    pub fn compare_types(&self, a: &NodeLayout, b: &NodeLayout) -> Ordering {
        self.hardware_rank(a.hardware_type())
            .cmp(&self.hardware_rank(b.hardware_type()))
            .then_with(|| self.image_rank(a.image_type()).cmp(&self.image_rank(b.image_type())))
            .then_with(|| a.hardware_type().cmp(b.hardware_type()))
            .then_with(|| a.image_type().cmp(b.image_type()))
    }

    /// Final layout order handed to the finder
    pub fn compare_layouts(&self, a: &NodeLayout, b: &NodeLayout) -> Ordering {
        b.services()
            .len()
            .cmp(&a.services().len())
            .then_with(|| self.compare_types(a, b))
            .then_with(|| a.services().cmp(b.services()))
    }
}

/// Generates candidate node layouts for one cluster
#[derive(Debug, Clone)]
pub struct NodeLayoutGenerator<'a> {
    services: BTreeSet<String>,
    hardware_types: Vec<String>,
    image_types: Vec<String>,
    constraints: Constraints,
    preferences: &'a LayoutPreferences,
}

impl<'a> NodeLayoutGenerator<'a> {
    /// Constraints are narrowed to `services` before use
    pub fn new(
        services: BTreeSet<String>,
        hardware_types: Vec<String>,
        image_types: Vec<String>,
        constraints: &Constraints,
        preferences: &'a LayoutPreferences,
    ) -> Self {
        let constraints = constraints.restricted_to(&services);
        Self {
            services,
            hardware_types,
            image_types,
            constraints,
            preferences,
        }
    }

    /// Candidate layouts in preference order
    pub fn generate(&self) -> Vec<NodeLayout> {
        let service_sets = self.valid_service_sets();
        let candidates = self.with_types(&service_sets);
        let mut layouts = self.narrow(candidates);
        layouts.sort_by(|a, b| self.preferences.compare_layouts(a, b));

        debug!(
            "Generated {} node layouts from {} service sets",
            layouts.len(),
            service_sets.len()
        );
        layouts
    }

    /// Every type combination per service set, best first
    ///
    /// Used when hardware availability is capped: a service set that no
    /// longer fits on its preferred type can still land on the next one.
    pub fn generate_with_alternatives(&self) -> Vec<NodeLayout> {
        let mut layouts = self.with_types(&self.valid_service_sets());
        layouts.sort_by(|a, b| self.preferences.compare_layouts(a, b));
        layouts
    }

    /// Service sets that break no co-location rule
    pub fn valid_service_sets(&self) -> BTreeSet<BTreeSet<String>> {
        let (unconstrained, constrained): (BTreeSet<String>, BTreeSet<String>) = self
            .services
            .iter()
            .cloned()
            .partition(|s| self.constraints.is_unconstrained(s));

        let mut valid = BTreeSet::new();
        if !constrained.is_empty() {
            let mut queue = VecDeque::from([constrained.clone()]);
            let mut seen = BTreeSet::from([constrained]);

            while let Some(set) = queue.pop_front() {
                if self.is_valid_service_set(&set) {
                    valid.insert(set.clone());
                }
                if set.len() > 1 {
                    for service in &set {
                        let mut smaller = set.clone();
                        smaller.remove(service);
                        if seen.insert(smaller.clone()) {
                            queue.push_back(smaller);
                        }
                    }
                }
            }
        }

        let mut sets: BTreeSet<BTreeSet<String>> = valid
            .into_iter()
            .map(|mut set| {
                set.extend(unconstrained.iter().cloned());
                set
            })
            .collect();
        if !unconstrained.is_empty() {
            sets.insert(unconstrained);
        }
        sets
    }

    fn is_valid_service_set(&self, set: &BTreeSet<String>) -> bool {
        !self.constraints.violates_cant_coexist(set)
            && !self.constraints.violates_must_coexist(set, &self.services)
    }

    fn with_types(&self, service_sets: &BTreeSet<BTreeSet<String>>) -> Vec<NodeLayout> {
        let mut layouts = Vec::new();
        for set in service_sets {
            for hardware in &self.hardware_types {
                for image in &self.image_types {
                    if self.constraints.allows_types(hardware, image, set) {
                        layouts.push(NodeLayout::new(
                            hardware.as_str(),
                            image.as_str(),
                            set.iter().cloned(),
                        ));
                    }
                }
            }
        }
        layouts
    }

    /// Keep the best-ranked layout for each service set
    fn narrow(&self, candidates: Vec<NodeLayout>) -> Vec<NodeLayout> {
        let mut best: BTreeMap<BTreeSet<String>, NodeLayout> = BTreeMap::new();
        for layout in candidates {
            let better = best.get(layout.services()).map_or(true, |current| {
                self.preferences.compare_types(&layout, current) == Ordering::Less
            });
            if better {
                best.insert(layout.services().clone(), layout);
            }
        }
        best.into_values().collect()
    }
}
