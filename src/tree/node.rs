//! Tree node types.

use crate::path::PathAddress;
use crate::types::{MetricValue, Timestamp};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// A node in the state tree.
#[derive(Clone, Debug)]
pub enum StateNode {
    Composite(Composite),
    Metric(Metric),
}

impl StateNode {
    pub fn as_composite(&self) -> Option<&Composite> {
        match self {
            StateNode::Composite(c) => Some(c),
            StateNode::Metric(_) => None,
        }
    }

    pub fn as_metric(&self) -> Option<&Metric> {
        match self {
            StateNode::Metric(m) => Some(m),
            StateNode::Composite(_) => None,
        }
    }

    pub fn is_metric(&self) -> bool {
        matches!(self, StateNode::Metric(_))
    }

    /// Earliest moment anything in this subtree expires.
    pub fn earliest_expiry(&self) -> Option<Timestamp> {
        match self {
            StateNode::Composite(c) => c.earliest_expiry,
            StateNode::Metric(m) => m.expires_at(),
        }
    }
}

/// Leaf node holding a typed value.
#[derive(Clone, Debug, PartialEq)]
pub struct Metric {
    value: MetricValue,
    updated: Timestamp,
    ttl: Option<Duration>,
}

impl Metric {
    pub fn new(value: MetricValue, updated: Timestamp, ttl: Option<Duration>) -> Self {
        Self {
            value,
            updated,
            ttl,
        }
    }

    pub fn value(&self) -> &MetricValue {
        &self.value
    }

    pub fn updated(&self) -> Timestamp {
        self.updated
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// `None` for durable metrics.
    pub fn expires_at(&self) -> Option<Timestamp> {
        self.ttl.map(|ttl| self.updated.saturating_add(ttl))
    }

    /// Expired once `updated + ttl` is at or before `now`.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at().is_some_and(|deadline| deadline <= now)
    }
}

/// Interior node with named children.
#[derive(Clone, Debug)]
pub struct Composite {
    pub(crate) children: BTreeMap<String, Arc<StateNode>>,
    pub(crate) ttl: Option<Duration>,
    created: Timestamp,
    /// Last `Branch` onto this node; an empty ephemeral node expires `ttl` after it.
    pub(crate) branched: Timestamp,
    earliest_expiry: Option<Timestamp>,
}

impl Composite {
    pub fn new(created: Timestamp) -> Self {
        Self {
            children: BTreeMap::new(),
            ttl: None,
            created,
            branched: created,
            earliest_expiry: None,
        }
    }

    pub fn created(&self) -> Timestamp {
        self.created
    }

    /// TTL handed down to metrics written beneath this node without one.
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    pub fn is_ephemeral(&self) -> bool {
        self.ttl.is_some()
    }

    pub fn earliest_expiry(&self) -> Option<Timestamp> {
        self.earliest_expiry
    }

    /// Deadline of an ephemeral node nothing was ever written beneath.
    /// `None` once it has children or if it is durable.
    pub fn expires_at(&self) -> Option<Timestamp> {
        if !self.children.is_empty() {
            return None;
        }
        self.ttl.map(|ttl| self.branched.saturating_add(ttl))
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at().is_some_and(|deadline| deadline <= now)
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn child(&self, name: &str) -> Option<&Arc<StateNode>> {
        self.children.get(name)
    }

    /// Children in segment order.
    pub fn children(&self) -> impl DoubleEndedIterator<Item = (&str, &Arc<StateNode>)> + '_ {
        self.children.iter().map(|(name, node)| (name.as_str(), node))
    }

    /// Navigate to the node at `path`, relative to this composite.
    pub fn get(&self, path: &PathAddress) -> Option<&Arc<StateNode>> {
        let (last, parents) = path.segments().split_last()?;
        let mut node = self;
        for segment in parents {
            node = node.children.get(segment)?.as_composite()?;
        }
        node.children.get(last)
    }

    pub(crate) fn refresh_expiry(&mut self) {
        self.earliest_expiry = self
            .children
            .values()
            .filter_map(|child| child.earliest_expiry())
            .chain(self.expires_at())
            .min();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_expiry_boundary() {
        let metric = Metric::new(
            MetricValue::from(1i64),
            Timestamp::from_secs(0),
            Some(Duration::from_secs(5)),
        );
        assert!(!metric.is_expired(Timestamp::from_secs(4)));
        assert!(metric.is_expired(Timestamp::from_secs(5)));
        assert!(metric.is_expired(Timestamp::from_secs(6)));
    }

    #[test]
    fn test_durable_metric_never_expires() {
        let metric = Metric::new(MetricValue::from("up"), Timestamp::from_secs(0), None);
        assert_eq!(metric.expires_at(), None);
        assert!(!metric.is_expired(Timestamp(i64::MAX)));
    }

    #[test]
    fn test_refresh_expiry_takes_minimum() {
        let mut composite = Composite::new(Timestamp(0));
        for (name, ttl) in [("a", Some(10)), ("b", Some(3)), ("c", None)] {
            let metric = Metric::new(
                MetricValue::from(true),
                Timestamp::from_secs(0),
                ttl.map(Duration::from_secs),
            );
            composite
                .children
                .insert(name.to_string(), Arc::new(StateNode::Metric(metric)));
        }
        composite.refresh_expiry();
        assert_eq!(composite.earliest_expiry(), Some(Timestamp::from_secs(3)));
    }

    #[test]
    fn test_empty_ephemeral_composite_expires() {
        let mut composite = Composite::new(Timestamp::from_secs(0));
        composite.ttl = Some(Duration::from_secs(5));
        composite.branched = Timestamp::from_secs(2);
        composite.refresh_expiry();

        assert_eq!(composite.expires_at(), Some(Timestamp::from_secs(7)));
        assert_eq!(composite.earliest_expiry(), Some(Timestamp::from_secs(7)));
        assert!(!composite.is_expired(Timestamp::from_secs(6)));
        assert!(composite.is_expired(Timestamp::from_secs(7)));

        // Children take over the deadline
        let metric = Metric::new(MetricValue::from(1i64), Timestamp::from_secs(2), None);
        composite
            .children
            .insert("m".to_string(), Arc::new(StateNode::Metric(metric)));
        composite.refresh_expiry();
        assert_eq!(composite.expires_at(), None);
        assert_eq!(composite.earliest_expiry(), None);
    }
}
