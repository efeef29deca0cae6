//! Layout change tracking
//!
//! Incremental service addition mutates one ClusterLayout in place. Every
//! applied change is pushed on an undo log so the search can back out of a
//! dead end without copying the layout.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::cluster_layout::ClusterLayout;
use super::node_layout::NodeLayout;

/// Add `service` to some nodes of one or more layouts
///
/// Each entry moves `count` nodes of a layout to the same layout plus the
/// service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutChange {
    pub service: String,
    pub expansions: BTreeMap<NodeLayout, usize>,
}

impl LayoutChange {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            expansions: BTreeMap::new(),
        }
    }

    pub fn expand(mut self, layout: NodeLayout, count: usize) -> Self {
        if count > 0 {
            *self.expansions.entry(layout).or_insert(0) += count;
        }
        self
    }

    /// Total nodes receiving the service
    pub fn node_count(&self) -> usize {
        self.expansions.values().sum()
    }

    fn apply_to(&self, layout: &mut ClusterLayout) -> bool {
        for (from, count) in &self.expansions {
            if layout.count(from) < *count {
                return false;
            }
        }
        for (from, count) in &self.expansions {
            layout.remove(from, *count);
            layout.add(&from.with_service(&self.service), *count);
        }
        true
    }

    fn revert_from(&self, layout: &mut ClusterLayout) {
        for (from, count) in &self.expansions {
            layout.remove(&from.with_service(&self.service), *count);
            layout.add(from, *count);
        }
    }
}

/// A cluster layout plus the changes applied to it so far
#[derive(Debug, Clone)]
pub struct ClusterLayoutTracker {
    current: ClusterLayout,
    changes: Vec<LayoutChange>,
}

impl ClusterLayoutTracker {
    pub fn new(layout: ClusterLayout) -> Self {
        Self {
            current: layout,
            changes: Vec::new(),
        }
    }

    pub fn current(&self) -> &ClusterLayout {
        &self.current
    }

    /// Applied changes, oldest first
    pub fn changes(&self) -> &[LayoutChange] {
        &self.changes
    }

    /// Apply a change; false (and nothing applied) if a layout lacks nodes
    pub fn apply(&mut self, change: LayoutChange) -> bool {
        if !change.apply_to(&mut self.current) {
            return false;
        }
        self.changes.push(change);
        true
    }

    /// Apply a change and keep it only if the result is valid
    pub fn try_apply(&mut self, change: LayoutChange) -> bool {
        if !self.apply(change) {
            return false;
        }
        if self.current.is_valid() {
            return true;
        }
        self.undo();
        false
    }

    /// Revert the most recent change
    pub fn undo(&mut self) -> Option<LayoutChange> {
        let change = self.changes.pop()?;
        change.revert_from(&mut self.current);
        Some(change)
    }

    pub fn into_parts(self) -> (ClusterLayout, Vec<LayoutChange>) {
        (self.current, self.changes)
    }
}
