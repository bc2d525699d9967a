//! Main StateNamespace struct tying all components together.

use crate::error::{NamespaceError, Result};
use crate::path::PathAddress;
use crate::sweeper::{collect_expired, ExpirySweeper, SweepReport};
use crate::transition::{Operation, Transition};
use crate::tree::{apply_operation, ApplyContext, Metric, StateNode, TreeSnapshot};
use crate::types::{ChangeKind, ChangeSet, Clock, MetricValue, SystemClock};
use crate::visitor::TreeStats;
use crate::watchers::{
    spawn_dispatcher, DispatchMessage, SubscriptionConfig, SubscriptionId, WatchEvent,
    WatchHandle, WatcherRegistry, DEFAULT_BUFFER_SIZE,
};
use arc_swap::ArcSwap;
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Namespace configuration.
#[derive(Clone, Debug)]
pub struct NamespaceConfig {
    /// How often the expiry sweeper runs. `None` disables the background
    /// thread; call [`StateNamespace::sweep_expired`] by hand instead.
    pub sweep_interval: Option<Duration>,

    /// Subscriber buffer size when a subscription does not set one.
    pub default_buffer_size: usize,

    /// Largest transition accepted by [`StateNamespace::commit`].
    pub max_transition_ops: usize,
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Some(Duration::from_secs(1)),
            default_buffer_size: DEFAULT_BUFFER_SIZE,
            max_transition_ops: 10_000,
        }
    }
}

impl NamespaceConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sweep_interval == Some(Duration::ZERO) {
            return Err(NamespaceError::InvalidConfig(
                "sweep_interval must be non-zero".to_string(),
            ));
        }
        if self.default_buffer_size == 0 {
            return Err(NamespaceError::InvalidConfig(
                "default_buffer_size must be non-zero".to_string(),
            ));
        }
        if self.max_transition_ops == 0 {
            return Err(NamespaceError::InvalidConfig(
                "max_transition_ops must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Outcome of a successful commit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommitReport {
    /// Tree version the transition produced.
    pub version: u64,
    /// Metric-level changes produced (and dispatched to watchers).
    pub changes: usize,
    /// Remove operations whose target did not exist.
    pub missed_removes: usize,
    /// Expire operations that removed their target.
    pub expired: usize,
}

/// Shared state reachable from the namespace and its background threads.
pub(crate) struct NamespaceCore {
    config: NamespaceConfig,
    clock: Arc<dyn Clock>,
    /// Latest published version. Readers load it without locking.
    tree: ArcSwap<TreeSnapshot>,
    /// Serializes writers; held for the whole of one transition.
    write_lock: Mutex<()>,
    watchers: Arc<WatcherRegistry>,
    dispatch: Sender<DispatchMessage>,
}

impl NamespaceCore {
    pub(crate) fn snapshot(&self) -> Arc<TreeSnapshot> {
        self.tree.load_full()
    }

    pub(crate) fn commit(&self, transition: Transition) -> Result<CommitReport> {
        if transition.len() > self.config.max_transition_ops {
            return Err(NamespaceError::TransitionTooLarge {
                operations: transition.len(),
                max: self.config.max_transition_ops,
            });
        }

        let _lock = self.write_lock.lock();

        let current = self.tree.load_full();
        if transition.is_empty() {
            return Ok(CommitReport {
                version: current.version(),
                changes: 0,
                missed_removes: 0,
                expired: 0,
            });
        }

        let now = self.clock.now();
        let version = current.version() + 1;
        let mut root = Arc::clone(current.root_arc());
        let mut ctx = ApplyContext::new(now);

        {
            let working = Arc::make_mut(&mut root);
            for operation in transition.operations() {
                if let Err(e) = apply_operation(working, operation, &mut ctx) {
                    debug!(error = %e, operations = transition.len(), "transition rejected");
                    return Err(e);
                }
            }
        }

        self.tree
            .store(Arc::new(TreeSnapshot::new(version, now, root)));

        let report = CommitReport {
            version,
            changes: ctx.changes.len(),
            missed_removes: ctx.missed_removes,
            expired: ctx.expired,
        };
        debug!(
            version,
            operations = transition.len(),
            changes = report.changes,
            missed_removes = report.missed_removes,
            "transition committed"
        );

        // Enqueued under the write lock so delivery order is commit order.
        if !ctx.changes.is_empty() {
            let change_set = ChangeSet {
                version,
                changes: ctx.changes,
            };
            if self.dispatch.send(DispatchMessage::Commit(change_set)).is_err() {
                warn!(version, "watch dispatcher is gone, changes not delivered");
            }
        }

        Ok(report)
    }

    pub(crate) fn sweep_expired(&self) -> Result<SweepReport> {
        let snapshot = self.snapshot();
        let candidates = collect_expired(snapshot.root(), self.clock.now());

        let mut report = SweepReport {
            candidates: candidates.len(),
            removed: 0,
            version: snapshot.version(),
        };

        for chunk in candidates.chunks(self.config.max_transition_ops) {
            let transition: Transition = chunk.iter().cloned().map(Operation::Expire).collect();
            let commit = self.commit(transition)?;
            report.removed += commit.expired;
            report.version = commit.version;
        }

        Ok(report)
    }

    fn subscribe(&self, config: SubscriptionConfig) -> Result<WatchHandle> {
        // No commit may slip between reading the version and registering.
        let _lock = self.write_lock.lock();
        let snapshot = self.tree.load_full();
        let handle = self.watchers.subscribe(config.clone(), snapshot.version());

        if config.replay_existing {
            // A pattern with nothing beneath it yet has nothing to replay.
            let existing = snapshot.visit_from(&config.pattern).ok();
            for (path, node) in existing.into_iter().flatten() {
                let StateNode::Metric(metric) = node.as_ref() else {
                    continue;
                };
                if !config.matches(&path) {
                    continue;
                }
                let event = WatchEvent::Change {
                    version: snapshot.version(),
                    path,
                    kind: ChangeKind::Added,
                    value: Some(metric.value().clone()),
                };
                if !self.watchers.send_to(handle.id, event) {
                    return Err(NamespaceError::SubscriptionDropped);
                }
            }
            let caught_up = WatchEvent::CaughtUp {
                version: snapshot.version(),
            };
            if !self.watchers.send_to(handle.id, caught_up) {
                return Err(NamespaceError::SubscriptionDropped);
            }
        }

        Ok(handle)
    }
}

/// A concurrent, path-addressed state tree.
///
/// Provides a unified interface for:
/// - Committing transitions atomically
/// - Point queries and consistent snapshots
/// - Watching subtrees for changes
/// - Expiring TTL-bound metrics in the background
///
/// Share it between producer threads behind an `Arc`.
pub struct StateNamespace {
    core: Arc<NamespaceCore>,
    sweeper: Option<ExpirySweeper>,
    dispatcher: Option<JoinHandle<()>>,
}

impl StateNamespace {
    /// Create an empty namespace using wall-clock time.
    pub fn new(config: NamespaceConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create an empty namespace reading time from `clock`.
    pub fn with_clock(config: NamespaceConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;

        let watchers = Arc::new(WatcherRegistry::with_buffer_size(config.default_buffer_size));
        let (dispatch, commits) = crossbeam_channel::unbounded();
        let dispatcher = spawn_dispatcher(Arc::clone(&watchers), commits)?;

        let core = Arc::new(NamespaceCore {
            tree: ArcSwap::from_pointee(TreeSnapshot::empty(clock.now())),
            config,
            clock,
            write_lock: Mutex::new(()),
            watchers,
            dispatch,
        });

        let sweeper = match core.config.sweep_interval {
            Some(interval) => Some(ExpirySweeper::spawn(Arc::clone(&core), interval)?),
            None => None,
        };

        Ok(Self {
            core,
            sweeper,
            dispatcher: Some(dispatcher),
        })
    }

    pub fn config(&self) -> &NamespaceConfig {
        &self.core.config
    }

    // --- Mutation ---

    /// Apply a transition atomically. On error nothing is applied.
    pub fn commit(&self, transition: Transition) -> Result<CommitReport> {
        self.core.commit(transition)
    }

    /// Put a single durable metric.
    pub fn put(&self, path: PathAddress, value: impl Into<MetricValue>) -> Result<CommitReport> {
        self.commit(Transition::new().put(path, value))
    }

    /// Put a single metric that expires after `ttl` unless refreshed.
    pub fn put_with_ttl(
        &self,
        path: PathAddress,
        value: impl Into<MetricValue>,
        ttl: Duration,
    ) -> Result<CommitReport> {
        self.commit(Transition::new().put_with_ttl(path, value, ttl))
    }

    /// Remove a single node. A missing path is not an error.
    pub fn remove(&self, path: PathAddress) -> Result<CommitReport> {
        self.commit(Transition::new().remove(path))
    }

    /// Run one expiry cycle now.
    pub fn sweep_expired(&self) -> Result<SweepReport> {
        self.core.sweep_expired()
    }

    // --- Queries ---

    /// The latest committed version, stable for as long as it is held.
    pub fn snapshot(&self) -> Arc<TreeSnapshot> {
        self.core.snapshot()
    }

    pub fn version(&self) -> u64 {
        self.core.tree.load().version()
    }

    pub fn get(&self, path: &PathAddress) -> Option<StateNode> {
        self.core.tree.load().get(path).cloned()
    }

    pub fn contains(&self, path: &PathAddress) -> bool {
        self.core.tree.load().contains(path)
    }

    pub fn metric(&self, path: &PathAddress) -> Option<Metric> {
        self.core.tree.load().metric(path).cloned()
    }

    pub fn value(&self, path: &PathAddress) -> Option<MetricValue> {
        self.core.tree.load().value(path).cloned()
    }

    pub fn child_names(&self, path: &PathAddress) -> Result<Vec<String>> {
        self.core.tree.load().child_names(path)
    }

    pub fn stats(&self) -> TreeStats {
        self.core.tree.load().stats()
    }

    // --- Watchers ---

    /// Subscribe to changes matching `config`.
    pub fn subscribe(&self, config: SubscriptionConfig) -> Result<WatchHandle> {
        self.core.subscribe(config)
    }

    /// Subscribe with a callback run on its own thread for every event.
    ///
    /// The thread ends after the subscription is dropped or unsubscribed.
    pub fn watch_with<F>(&self, config: SubscriptionConfig, mut callback: F) -> Result<SubscriptionId>
    where
        F: FnMut(&WatchEvent) + Send + 'static,
    {
        let handle = self.core.subscribe(config)?;
        let id = handle.id;

        let spawned = thread::Builder::new()
            .name(format!("state-watch-{}", id))
            .spawn(move || {
                for event in handle.iter() {
                    callback(&event);
                    if matches!(event, WatchEvent::Dropped { .. }) {
                        break;
                    }
                }
            });

        if let Err(e) = spawned {
            let _ = self.core.watchers.unsubscribe(id);
            return Err(e.into());
        }
        Ok(id)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        self.core.watchers.unsubscribe(id)
    }

    pub fn subscription_count(&self) -> usize {
        self.core.watchers.subscription_count()
    }
}

impl Drop for StateNamespace {
    fn drop(&mut self) {
        if let Some(mut sweeper) = self.sweeper.take() {
            sweeper.stop();
        }
        let _ = self.core.dispatch.send(DispatchMessage::Shutdown);
        if let Some(dispatcher) = self.dispatcher.take() {
            if dispatcher.join().is_err() {
                warn!("watch dispatcher panicked");
            }
        }
    }
}
