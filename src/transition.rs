//! Transitions: ordered batches of tree mutations.
//!
//! A [`Transition`] is plain data. Nothing happens until it is handed to
//! [`StateNamespace::commit`](crate::StateNamespace::commit), where it is
//! applied all-or-nothing. Operations apply in list order, so a later
//! operation at the same path wins.

use crate::error::Result;
use crate::path::PathAddress;
use crate::types::MetricValue;
use std::time::Duration;

/// A single mutation inside a transition.
#[derive(Clone, Debug, PartialEq)]
pub enum Operation {
    /// Create or replace the metric at `path`, creating missing composites.
    Put {
        path: PathAddress,
        value: MetricValue,
        /// `None` means durable, unless an ephemeral ancestor supplies one.
        ttl: Option<Duration>,
    },

    /// Delete the node at `path` (a metric or a whole subtree).
    Remove(PathAddress),

    /// Delete the metric at `path` only if it is expired when applied.
    /// Also removes an ephemeral composite that expired while still empty.
    Expire(PathAddress),

    /// Ensure a composite exists at `path`, marking it ephemeral when `ttl`
    /// is set. Metrics later put beneath it without a TTL inherit this one.
    /// An ephemeral composite that stays empty expires `ttl` after the most
    /// recent branch onto it.
    Branch {
        path: PathAddress,
        ttl: Option<Duration>,
    },
}

impl Operation {
    pub fn path(&self) -> &PathAddress {
        match self {
            Operation::Put { path, .. } => path,
            Operation::Remove(path) => path,
            Operation::Expire(path) => path,
            Operation::Branch { path, .. } => path,
        }
    }
}

/// An ordered, atomic batch of operations.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Transition {
    operations: Vec<Operation>,
}

impl Transition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a transition of durable or TTL-bound puts from producer updates.
    pub fn from_updates<I>(updates: I) -> Self
    where
        I: IntoIterator<Item = (PathAddress, MetricValue, Option<Duration>)>,
    {
        let operations = updates
            .into_iter()
            .map(|(path, value, ttl)| Operation::Put { path, value, ttl })
            .collect();
        Self { operations }
    }

    /// Build a transition removing each of `paths`.
    pub fn removing<I>(paths: I) -> Self
    where
        I: IntoIterator<Item = PathAddress>,
    {
        Self {
            operations: paths.into_iter().map(Operation::Remove).collect(),
        }
    }

    pub fn put(mut self, path: PathAddress, value: impl Into<MetricValue>) -> Self {
        self.push(Operation::Put {
            path,
            value: value.into(),
            ttl: None,
        });
        self
    }

    pub fn put_with_ttl(
        mut self,
        path: PathAddress,
        value: impl Into<MetricValue>,
        ttl: Duration,
    ) -> Self {
        self.push(Operation::Put {
            path,
            value: value.into(),
            ttl: Some(ttl),
        });
        self
    }

    /// Like [`put`](Self::put) but parses the path text first.
    pub fn put_text(self, path: &str, value: impl Into<MetricValue>) -> Result<Self> {
        Ok(self.put(PathAddress::parse(path)?, value))
    }

    pub fn remove(mut self, path: PathAddress) -> Self {
        self.push(Operation::Remove(path));
        self
    }

    /// Like [`remove`](Self::remove) but parses the path text first.
    pub fn remove_text(self, path: &str) -> Result<Self> {
        Ok(self.remove(PathAddress::parse(path)?))
    }

    pub fn expire(mut self, path: PathAddress) -> Self {
        self.push(Operation::Expire(path));
        self
    }

    pub fn branch(mut self, path: PathAddress, ttl: Option<Duration>) -> Self {
        self.push(Operation::Branch { path, ttl });
        self
    }

    pub fn push(&mut self, operation: Operation) {
        self.operations.push(operation);
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

impl Extend<Operation> for Transition {
    fn extend<T: IntoIterator<Item = Operation>>(&mut self, iter: T) {
        self.operations.extend(iter);
    }
}

impl FromIterator<Operation> for Transition {
    fn from_iter<T: IntoIterator<Item = Operation>>(iter: T) -> Self {
        Self {
            operations: iter.into_iter().collect(),
        }
    }
}
