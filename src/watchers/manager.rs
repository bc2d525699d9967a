//! Watcher registry and the dispatch thread feeding it.

use crate::error::{NamespaceError, Result};
use crate::types::ChangeSet;
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

use super::types::{
    DropReason, SubscriptionConfig, SubscriptionId, WatchEvent, WatchHandle, DEFAULT_BUFFER_SIZE,
};

/// Messages from committing writers to the dispatch thread.
pub(crate) enum DispatchMessage {
    Commit(ChangeSet),
    Shutdown,
}

/// Internal subscription state.
struct Subscription {
    config: SubscriptionConfig,
    sender: Sender<WatchEvent>,
    /// Commits at or below this version were already visible when the
    /// subscription was created and are not delivered.
    start_version: u64,
}

impl Subscription {
    /// Try to send an event. Returns false if the buffer is full or the
    /// receiver is gone (subscriber will be dropped).
    fn try_send(&self, event: WatchEvent) -> bool {
        self.sender.try_send(event).is_ok()
    }
}

/// Manages subscriptions and fans committed changes out to them.
pub struct WatcherRegistry {
    /// Active subscriptions by ID.
    subscriptions: RwLock<HashMap<SubscriptionId, Subscription>>,
    /// Counter for generating subscription IDs.
    next_id: AtomicU64,
    /// Buffer size for configs that do not set one.
    default_buffer_size: usize,
}

impl WatcherRegistry {
    pub fn new() -> Self {
        Self::with_buffer_size(DEFAULT_BUFFER_SIZE)
    }

    pub fn with_buffer_size(default_buffer_size: usize) -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            default_buffer_size,
        }
    }

    /// Register a subscription that receives commits newer than `start_version`.
    pub fn subscribe(&self, config: SubscriptionConfig, start_version: u64) -> WatchHandle {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let buffer_size = config.buffer_size.unwrap_or(self.default_buffer_size);
        let (sender, receiver) = bounded(buffer_size);

        debug!(
            subscription = %id,
            pattern = %config.pattern,
            mode = ?config.mode,
            "watcher subscribed"
        );

        self.subscriptions.write().insert(
            id,
            Subscription {
                config,
                sender,
                start_version,
            },
        );

        WatchHandle { id, receiver }
    }

    /// Unsubscribe and clean up.
    pub fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        let sub = self
            .subscriptions
            .write()
            .remove(&id)
            .ok_or(NamespaceError::SubscriptionNotFound(id))?;

        // Best effort
        let _ = sub.sender.try_send(WatchEvent::Dropped {
            reason: DropReason::Unsubscribed,
        });
        debug!(subscription = %id, "watcher unsubscribed");
        Ok(())
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    pub fn contains(&self, id: SubscriptionId) -> bool {
        self.subscriptions.read().contains_key(&id)
    }

    /// Send an event directly to one subscription (for replay).
    /// Returns false if the subscription is gone or its buffer is full;
    /// in the latter case it is dropped.
    pub fn send_to(&self, id: SubscriptionId, event: WatchEvent) -> bool {
        let delivered = match self.subscriptions.read().get(&id) {
            Some(sub) => sub.try_send(event),
            None => return false,
        };
        if !delivered {
            self.drop_subscriptions(vec![id], DropReason::BufferOverflow);
        }
        delivered
    }

    /// Deliver one committed change set to every matching subscription.
    ///
    /// Changes are offered in order; a subscriber that cannot keep up is
    /// dropped rather than allowed to hold up the others.
    pub fn dispatch(&self, change_set: &ChangeSet) {
        let mut to_remove = Vec::new();

        {
            let subs = self.subscriptions.read();
            for (id, sub) in subs.iter() {
                if change_set.version <= sub.start_version {
                    continue;
                }
                for change in &change_set.changes {
                    if sub.config.matches(&change.path)
                        && !sub.try_send(WatchEvent::change(change_set.version, change))
                    {
                        to_remove.push(*id);
                        break;
                    }
                }
            }
        }

        if !to_remove.is_empty() {
            self.drop_subscriptions(to_remove, DropReason::BufferOverflow);
        }
    }

    /// Drop every subscription, telling each why.
    pub fn drop_all(&self, reason: DropReason) {
        let ids: Vec<SubscriptionId> = self.subscriptions.read().keys().copied().collect();
        self.drop_subscriptions(ids, reason);
    }

    fn drop_subscriptions(&self, ids: Vec<SubscriptionId>, reason: DropReason) {
        let mut subs = self.subscriptions.write();
        for id in ids {
            if let Some(sub) = subs.remove(&id) {
                if reason == DropReason::BufferOverflow {
                    warn!(subscription = %id, pattern = %sub.config.pattern, "dropping slow watcher");
                }
                // Might fail if the buffer is still full, that's ok
                let _ = sub.sender.try_send(WatchEvent::Dropped {
                    reason: reason.clone(),
                });
            }
        }
    }
}

impl Default for WatcherRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Start the thread that hands committed change sets to the registry in
/// commit order.
pub(crate) fn spawn_dispatcher(
    registry: Arc<WatcherRegistry>,
    commits: Receiver<DispatchMessage>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("state-watch-dispatch".to_string())
        .spawn(move || {
            info!("watch dispatcher started");
            for message in commits.iter() {
                match message {
                    DispatchMessage::Commit(change_set) => registry.dispatch(&change_set),
                    DispatchMessage::Shutdown => break,
                }
            }
            registry.drop_all(DropReason::Shutdown);
            info!("watch dispatcher stopped");
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::PathAddress;
    use crate::types::{ChangeKind, MetricValue, StateChange};
    use std::time::Duration;

    fn p(text: &str) -> PathAddress {
        PathAddress::parse(text).unwrap()
    }

    fn change_set(version: u64, paths: &[&str]) -> ChangeSet {
        ChangeSet {
            version,
            changes: paths
                .iter()
                .map(|path| StateChange {
                    path: p(path),
                    kind: ChangeKind::Added,
                    value: Some(MetricValue::from(1i64)),
                })
                .collect(),
        }
    }

    #[test]
    fn test_subscribe_unsubscribe() {
        let registry = WatcherRegistry::new();

        let handle = registry.subscribe(SubscriptionConfig::subtree(p("a")), 0);
        assert_eq!(registry.subscription_count(), 1);

        registry.unsubscribe(handle.id).unwrap();
        assert_eq!(registry.subscription_count(), 0);
        assert!(matches!(
            handle.try_recv(),
            Ok(WatchEvent::Dropped {
                reason: DropReason::Unsubscribed
            })
        ));
    }

    #[test]
    fn test_unsubscribe_unknown() {
        let registry = WatcherRegistry::new();
        let result = registry.unsubscribe(SubscriptionId(42));
        assert!(matches!(
            result,
            Err(NamespaceError::SubscriptionNotFound(SubscriptionId(42)))
        ));
    }

    #[test]
    fn test_dispatch_to_matching() {
        let registry = WatcherRegistry::new();
        let handle = registry.subscribe(SubscriptionConfig::subtree(p("foo.bar")), 0);

        registry.dispatch(&change_set(1, &["foo.bar.baz", "foo.qux", "foo.bar"]));

        let paths: Vec<PathAddress> = handle
            .receiver
            .try_iter()
            .map(|event| match event {
                WatchEvent::Change { path, version, .. } => {
                    assert_eq!(version, 1);
                    path
                }
                other => panic!("Expected Change event, got {:?}", other),
            })
            .collect();
        assert_eq!(paths, vec![p("foo.bar.baz"), p("foo.bar")]);
    }

    #[test]
    fn test_dispatch_skips_versions_already_seen() {
        let registry = WatcherRegistry::new();
        let handle = registry.subscribe(SubscriptionConfig::exact(p("a")), 5);

        registry.dispatch(&change_set(5, &["a"]));
        assert!(handle.recv_timeout(Duration::from_millis(20)).is_err());

        registry.dispatch(&change_set(6, &["a"]));
        assert!(matches!(
            handle.recv_timeout(Duration::from_millis(100)),
            Ok(WatchEvent::Change { version: 6, .. })
        ));
    }

    #[test]
    fn test_drop_slow_subscriber() {
        let registry = WatcherRegistry::new();
        let slow = registry.subscribe(SubscriptionConfig::subtree(p("a")).with_buffer_size(2), 0);
        let fast = registry.subscribe(SubscriptionConfig::subtree(p("a")), 0);

        for version in 1..=10 {
            registry.dispatch(&change_set(version, &["a.b"]));
        }

        assert!(!registry.contains(slow.id));
        assert!(registry.contains(fast.id));
        assert_eq!(fast.receiver.try_iter().count(), 10);
        assert_eq!(slow.receiver.try_iter().count(), 2);
    }

    #[test]
    fn test_dispatcher_thread_preserves_order_and_shuts_down() {
        let registry = Arc::new(WatcherRegistry::new());
        let handle = registry.subscribe(SubscriptionConfig::subtree(p("a")), 0);
        let (tx, rx) = crossbeam_channel::unbounded();
        let dispatcher = spawn_dispatcher(Arc::clone(&registry), rx).unwrap();

        for version in 1..=3 {
            tx.send(DispatchMessage::Commit(change_set(version, &["a.x", "a.y"])))
                .unwrap();
        }
        tx.send(DispatchMessage::Shutdown).unwrap();
        dispatcher.join().unwrap();

        let events: Vec<WatchEvent> = handle.receiver.try_iter().collect();
        assert_eq!(events.len(), 7);
        let versions: Vec<u64> = events
            .iter()
            .filter_map(|event| match event {
                WatchEvent::Change { version, .. } => Some(*version),
                _ => None,
            })
            .collect();
        assert_eq!(versions, vec![1, 1, 2, 2, 3, 3]);
        assert!(matches!(
            events.last(),
            Some(WatchEvent::Dropped {
                reason: DropReason::Shutdown
            })
        ));
        assert_eq!(registry.subscription_count(), 0);
    }
}
