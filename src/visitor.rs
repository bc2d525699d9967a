//! Read-side traversal of a tree snapshot.
//!
//! Two styles are offered:
//! - [`Visit`], a lazy pre-order iterator of `(PathAddress, Arc<StateNode>)`
//!   pairs. It owns `Arc`s into one committed version, so it never sees a
//!   later commit and can be cloned to restart from the same position.
//! - [`StateVisitor`], a callback trait with pre/post hooks around
//!   composites, for building nested reports.

use crate::path::PathAddress;
use crate::tree::{Composite, Metric, StateNode};
use std::sync::Arc;

/// Lazy pre-order traversal over a committed tree version.
#[derive(Clone)]
pub struct Visit {
    stack: Vec<(PathAddress, Arc<StateNode>)>,
}

impl Visit {
    /// All nodes beneath `root`, excluding `root` itself.
    pub(crate) fn over(root: &Composite) -> Self {
        let stack = root
            .children()
            .rev()
            .map(|(name, node)| (PathAddress::new(name), Arc::clone(node)))
            .collect();
        Self { stack }
    }

    /// `node` and everything beneath it.
    pub(crate) fn starting_at(path: PathAddress, node: Arc<StateNode>) -> Self {
        Self {
            stack: vec![(path, node)],
        }
    }

    /// Keep only metric nodes.
    pub fn metrics(self) -> impl Iterator<Item = (PathAddress, Metric)> {
        self.filter_map(|(path, node)| node.as_metric().cloned().map(|m| (path, m)))
    }
}

impl Iterator for Visit {
    type Item = (PathAddress, Arc<StateNode>);

    fn next(&mut self) -> Option<Self::Item> {
        let (path, node) = self.stack.pop()?;
        if let StateNode::Composite(composite) = node.as_ref() {
            for (name, child) in composite.children().rev() {
                self.stack.push((path.child(name), Arc::clone(child)));
            }
        }
        Some((path, node))
    }
}

/// Callback-style visitor. Composite hooks default to doing nothing.
pub trait StateVisitor {
    fn visit_composite_pre(&mut self, _path: &PathAddress, _composite: &Composite) {}

    fn visit_composite_post(&mut self, _path: &PathAddress, _composite: &Composite) {}

    fn visit_metric(&mut self, path: &PathAddress, metric: &Metric);
}

pub(crate) fn walk<V: StateVisitor + ?Sized>(
    composite: &Composite,
    prefix: Option<&PathAddress>,
    visitor: &mut V,
) {
    for (name, child) in composite.children() {
        let path = match prefix {
            Some(prefix) => prefix.child(name),
            None => PathAddress::new(name),
        };
        match child.as_ref() {
            StateNode::Metric(metric) => visitor.visit_metric(&path, metric),
            StateNode::Composite(inner) => {
                visitor.visit_composite_pre(&path, inner);
                walk(inner, Some(&path), visitor);
                visitor.visit_composite_post(&path, inner);
            }
        }
    }
}

/// Shape summary of a tree version.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TreeStats {
    pub composites: usize,
    pub metrics: usize,
    /// Metrics carrying a TTL.
    pub ephemeral_metrics: usize,
    pub max_depth: usize,
}

impl StateVisitor for TreeStats {
    fn visit_composite_pre(&mut self, path: &PathAddress, _composite: &Composite) {
        self.composites += 1;
        self.max_depth = self.max_depth.max(path.len());
    }

    fn visit_metric(&mut self, path: &PathAddress, metric: &Metric) {
        self.metrics += 1;
        if metric.ttl().is_some() {
            self.ephemeral_metrics += 1;
        }
        self.max_depth = self.max_depth.max(path.len());
    }
}
