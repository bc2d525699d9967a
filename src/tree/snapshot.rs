//! Immutable, published tree versions.

use super::node::{Composite, Metric, StateNode};
use crate::error::{NamespaceError, Result};
use crate::path::PathAddress;
use crate::types::{MetricValue, Timestamp};
use crate::visitor::{StateVisitor, TreeStats, Visit};
use std::sync::Arc;

/// One committed version of the tree.
///
/// Holding a snapshot keeps that version alive; later commits never change
/// what it shows.
#[derive(Clone, Debug)]
pub struct TreeSnapshot {
    version: u64,
    committed_at: Timestamp,
    root: Arc<Composite>,
}

impl TreeSnapshot {
    pub(crate) fn empty(now: Timestamp) -> Self {
        Self {
            version: 0,
            committed_at: now,
            root: Arc::new(Composite::new(now)),
        }
    }

    pub(crate) fn new(version: u64, committed_at: Timestamp, root: Arc<Composite>) -> Self {
        Self {
            version,
            committed_at,
            root,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn committed_at(&self) -> Timestamp {
        self.committed_at
    }

    pub fn root(&self) -> &Composite {
        &self.root
    }

    pub(crate) fn root_arc(&self) -> &Arc<Composite> {
        &self.root
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    pub fn get(&self, path: &PathAddress) -> Option<&StateNode> {
        self.root.get(path).map(|node| node.as_ref())
    }

    pub fn contains(&self, path: &PathAddress) -> bool {
        self.root.get(path).is_some()
    }

    pub fn metric(&self, path: &PathAddress) -> Option<&Metric> {
        self.get(path).and_then(StateNode::as_metric)
    }

    pub fn value(&self, path: &PathAddress) -> Option<&MetricValue> {
        self.metric(path).map(Metric::value)
    }

    /// Names of the children of the composite at `path`.
    pub fn child_names(&self, path: &PathAddress) -> Result<Vec<String>> {
        let composite = self
            .get(path)
            .and_then(StateNode::as_composite)
            .ok_or_else(|| NamespaceError::PathNotFound(path.clone()))?;
        Ok(composite.children().map(|(name, _)| name.to_string()).collect())
    }

    /// Pre-order walk of the whole tree (the root itself is not yielded).
    pub fn visit(&self) -> Visit {
        Visit::over(&self.root)
    }

    /// Pre-order walk of the subtree at `path`, starting with that node.
    pub fn visit_from(&self, path: &PathAddress) -> Result<Visit> {
        let node = self
            .root
            .get(path)
            .ok_or_else(|| NamespaceError::PathNotFound(path.clone()))?;
        Ok(Visit::starting_at(path.clone(), Arc::clone(node)))
    }

    /// Drive a callback-style visitor over the whole tree.
    pub fn accept<V: StateVisitor + ?Sized>(&self, visitor: &mut V) {
        crate::visitor::walk(&self.root, None, visitor);
    }

    pub fn stats(&self) -> TreeStats {
        let mut stats = TreeStats::default();
        self.accept(&mut stats);
        stats
    }
}
