//! Operation application against a working copy of the tree.
//!
//! Every function here mutates a private working root. On error the caller
//! throws the working root away, so a failed transition leaves the published
//! tree untouched no matter how far application got.

use super::node::{Composite, Metric, StateNode};
use crate::error::{NamespaceError, Result};
use crate::path::PathAddress;
use crate::transition::Operation;
use crate::types::{ChangeKind, MetricValue, StateChange, Timestamp};
use std::sync::Arc;
use std::time::Duration;

/// Per-commit bookkeeping shared by all operations of one transition.
pub(crate) struct ApplyContext {
    pub(crate) now: Timestamp,
    pub(crate) changes: Vec<StateChange>,
    pub(crate) missed_removes: usize,
    /// Expire operations that removed their target.
    pub(crate) expired: usize,
}

impl ApplyContext {
    pub(crate) fn new(now: Timestamp) -> Self {
        Self {
            now,
            changes: Vec::new(),
            missed_removes: 0,
            expired: 0,
        }
    }

    fn record(&mut self, path: PathAddress, kind: ChangeKind, value: Option<MetricValue>) {
        self.changes.push(StateChange { path, kind, value });
    }
}

/// Apply one operation to the working root.
pub(crate) fn apply_operation(
    root: &mut Composite,
    operation: &Operation,
    ctx: &mut ApplyContext,
) -> Result<()> {
    match operation {
        Operation::Put { path, value, ttl } => put(root, path, 0, value, *ttl, None, ctx),

        Operation::Remove(path) => {
            // Missing targets are a no-op; check first so nothing gets copied.
            if root.get(path).is_none() {
                ctx.missed_removes += 1;
                return Ok(());
            }
            remove_existing(root, path, 0, ctx);
            Ok(())
        }

        Operation::Expire(path) => {
            let expired = root.get(path).is_some_and(|node| match node.as_ref() {
                StateNode::Metric(metric) => metric.is_expired(ctx.now),
                StateNode::Composite(composite) => composite.is_expired(ctx.now),
            });
            if expired {
                remove_existing(root, path, 0, ctx);
                ctx.expired += 1;
            }
            Ok(())
        }

        Operation::Branch { path, ttl } => branch(root, path, 0, *ttl, ctx.now),
    }
}

fn put(
    node: &mut Composite,
    path: &PathAddress,
    depth: usize,
    value: &MetricValue,
    explicit_ttl: Option<Duration>,
    inherited_ttl: Option<Duration>,
    ctx: &mut ApplyContext,
) -> Result<()> {
    let inherited_ttl = node.ttl.or(inherited_ttl);
    let segment = &path.segments()[depth];

    if depth + 1 == path.len() {
        let metric = Metric::new(value.clone(), ctx.now, explicit_ttl.or(inherited_ttl));
        let kind = match node.children.get_mut(segment) {
            Some(existing) => match Arc::make_mut(existing) {
                StateNode::Composite(_) => {
                    return Err(NamespaceError::conflict(
                        path,
                        "cannot replace a composite with a metric",
                    ));
                }
                StateNode::Metric(current) => {
                    *current = metric;
                    ChangeKind::Updated
                }
            },
            None => {
                node.children
                    .insert(segment.clone(), Arc::new(StateNode::Metric(metric)));
                ChangeKind::Added
            }
        };
        ctx.record(path.clone(), kind, Some(value.clone()));
    } else {
        let now = ctx.now;
        let child = node
            .children
            .entry(segment.clone())
            .or_insert_with(|| Arc::new(StateNode::Composite(Composite::new(now))));
        match Arc::make_mut(child) {
            StateNode::Composite(composite) => put(
                composite,
                path,
                depth + 1,
                value,
                explicit_ttl,
                inherited_ttl,
                ctx,
            )?,
            StateNode::Metric(_) => {
                return Err(NamespaceError::conflict(path, "path passes through a metric"));
            }
        }
    }

    node.refresh_expiry();
    Ok(())
}

/// Remove a node known to exist, collapsing ancestors left childless.
/// The node this is first called on (the root) is never removed.
fn remove_existing(node: &mut Composite, path: &PathAddress, depth: usize, ctx: &mut ApplyContext) {
    let segment = &path.segments()[depth];

    if depth + 1 == path.len() {
        if let Some(removed) = node.children.remove(segment) {
            record_removed(path.clone(), &removed, ctx);
        }
    } else if let Some(child) = node.children.get_mut(segment) {
        let now_empty = match Arc::make_mut(child) {
            StateNode::Composite(composite) => {
                remove_existing(composite, path, depth + 1, ctx);
                composite.is_empty()
            }
            StateNode::Metric(_) => false,
        };
        if now_empty {
            node.children.remove(segment);
        }
    }

    node.refresh_expiry();
}

fn record_removed(path: PathAddress, node: &StateNode, ctx: &mut ApplyContext) {
    match node {
        StateNode::Metric(_) => ctx.record(path, ChangeKind::Removed, None),
        StateNode::Composite(composite) => {
            for (name, child) in composite.children() {
                record_removed(path.child(name), child, ctx);
            }
        }
    }
}

fn branch(
    node: &mut Composite,
    path: &PathAddress,
    depth: usize,
    ttl: Option<Duration>,
    now: Timestamp,
) -> Result<()> {
    let terminal = depth + 1 == path.len();
    let child = node
        .children
        .entry(path.segments()[depth].clone())
        .or_insert_with(|| Arc::new(StateNode::Composite(Composite::new(now))));

    match Arc::make_mut(child) {
        StateNode::Composite(composite) if terminal => {
            composite.ttl = ttl;
            composite.branched = now;
            composite.refresh_expiry();
        }
        StateNode::Composite(composite) => branch(composite, path, depth + 1, ttl, now)?,
        StateNode::Metric(_) if terminal => {
            return Err(NamespaceError::conflict(path, "a metric occupies this path"));
        }
        StateNode::Metric(_) => {
            return Err(NamespaceError::conflict(path, "path passes through a metric"));
        }
    }
    node.refresh_expiry();
    Ok(())
}
