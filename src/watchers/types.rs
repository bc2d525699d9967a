//! Watcher types for change notification.

use crate::path::PathAddress;
use crate::types::{ChangeKind, MetricValue, StateChange};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default max buffered events before a subscriber is dropped.
pub const DEFAULT_BUFFER_SIZE: usize = 1000;

/// How a subscription pattern is compared with a changed path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchMode {
    /// Only the pattern path itself.
    Exact,
    /// The pattern path and everything beneath it.
    Subtree,
    /// Direct children of the pattern path.
    Children,
}

impl WatchMode {
    pub fn matches(self, pattern: &PathAddress, path: &PathAddress) -> bool {
        match self {
            WatchMode::Exact => pattern == path,
            WatchMode::Subtree => pattern.equals_or_has_child(path),
            WatchMode::Children => pattern.is_parent_of(path),
        }
    }
}

/// Configuration for a subscription.
#[derive(Clone, Debug)]
pub struct SubscriptionConfig {
    pub pattern: PathAddress,

    pub mode: WatchMode,

    /// Max buffered events before dropping the subscriber.
    /// `None` uses the namespace default.
    pub buffer_size: Option<usize>,

    /// Send the matching metrics that already exist as `Added` events,
    /// followed by `CaughtUp`, before any live change.
    pub replay_existing: bool,
}

impl SubscriptionConfig {
    pub fn new(pattern: PathAddress, mode: WatchMode) -> Self {
        Self {
            pattern,
            mode,
            buffer_size: None,
            replay_existing: false,
        }
    }

    pub fn exact(pattern: PathAddress) -> Self {
        Self::new(pattern, WatchMode::Exact)
    }

    pub fn subtree(pattern: PathAddress) -> Self {
        Self::new(pattern, WatchMode::Subtree)
    }

    pub fn children(pattern: PathAddress) -> Self {
        Self::new(pattern, WatchMode::Children)
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = Some(buffer_size);
        self
    }

    pub fn with_replay(mut self) -> Self {
        self.replay_existing = true;
        self
    }

    pub fn matches(&self, path: &PathAddress) -> bool {
        self.mode.matches(&self.pattern, path)
    }
}

/// Events delivered to a subscriber.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WatchEvent {
    /// A metric matching the pattern changed.
    Change {
        /// Version of the commit that made the change.
        version: u64,
        path: PathAddress,
        kind: ChangeKind,
        value: Option<MetricValue>,
    },

    /// Finished replaying existing metrics, now streaming live.
    CaughtUp { version: u64 },

    /// Subscription was dropped; no further events follow.
    Dropped { reason: DropReason },
}

impl WatchEvent {
    pub(crate) fn change(version: u64, change: &StateChange) -> Self {
        WatchEvent::Change {
            version,
            path: change.path.clone(),
            kind: change.kind,
            value: change.value.clone(),
        }
    }
}

/// Why a subscription was dropped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Send buffer overflowed (slow consumer).
    BufferOverflow,
    /// Explicitly unsubscribed.
    Unsubscribed,
    /// The namespace shut down.
    Shutdown,
}

/// Unique identifier for a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle to receive a subscription's events.
pub struct WatchHandle {
    pub id: SubscriptionId,
    /// Channel to receive events.
    pub receiver: crossbeam_channel::Receiver<WatchEvent>,
}

impl WatchHandle {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<WatchEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<WatchEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<WatchEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Blocking iterator that ends when the subscription is gone.
    pub fn iter(&self) -> crossbeam_channel::Iter<'_, WatchEvent> {
        self.receiver.iter()
    }
}
