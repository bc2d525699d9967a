//! Periodic removal of expired metrics.
//!
//! The sweeper is an ordinary producer: it scans a snapshot for metrics
//! whose deadline has passed and commits [`Operation::Expire`] transitions
//! through the normal write path. `Expire` re-checks the deadline against
//! the clock at apply time, so a metric refreshed between scan and commit
//! survives.
//!
//! [`Operation::Expire`]: crate::transition::Operation::Expire

use crate::namespace::NamespaceCore;
use crate::path::PathAddress;
use crate::tree::{Composite, StateNode};
use crate::types::Timestamp;
use crossbeam_channel::{select, tick, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Outcome of one sweep cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Nodes found expired during the scan.
    pub candidates: usize,
    /// Nodes actually removed (the rest were refreshed in between).
    pub removed: usize,
    /// Tree version after the sweep.
    pub version: u64,
}

/// Paths of all metrics beneath `root` expired at `now`, in pre-order,
/// along with ephemeral composites that expired while still empty.
///
/// Subtrees whose cached earliest deadline lies in the future are skipped.
pub fn collect_expired(root: &Composite, now: Timestamp) -> Vec<PathAddress> {
    let mut expired = Vec::new();
    collect_into(root, None, now, &mut expired);
    expired
}

fn collect_into(
    composite: &Composite,
    prefix: Option<&PathAddress>,
    now: Timestamp,
    out: &mut Vec<PathAddress>,
) {
    for (name, child) in composite.children() {
        if !child.earliest_expiry().is_some_and(|deadline| deadline <= now) {
            continue;
        }
        let path = match prefix {
            Some(prefix) => prefix.child(name),
            None => PathAddress::new(name),
        };
        match child.as_ref() {
            StateNode::Metric(_) => out.push(path),
            StateNode::Composite(inner) if inner.is_expired(now) => out.push(path),
            StateNode::Composite(inner) => collect_into(inner, Some(&path), now, out),
        }
    }
}

/// Background thread running a sweep every `interval`.
pub(crate) struct ExpirySweeper {
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ExpirySweeper {
    pub(crate) fn spawn(core: Arc<NamespaceCore>, interval: Duration) -> std::io::Result<Self> {
        let (shutdown, shutdown_rx) = crossbeam_channel::bounded::<()>(1);

        let handle = thread::Builder::new()
            .name("state-expiry-sweeper".to_string())
            .spawn(move || {
                info!(interval_ms = interval.as_millis() as u64, "expiry sweeper started");
                let ticker = tick(interval);
                loop {
                    select! {
                        recv(shutdown_rx) -> _ => break,
                        recv(ticker) -> _ => match core.sweep_expired() {
                            Ok(report) if report.candidates > 0 => debug!(
                                candidates = report.candidates,
                                removed = report.removed,
                                version = report.version,
                                "expiry sweep"
                            ),
                            Ok(_) => trace!("expiry sweep found nothing"),
                            Err(e) => warn!(error = %e, "expiry sweep failed"),
                        },
                    }
                }
                info!("expiry sweeper stopped");
            })?;

        Ok(Self {
            shutdown: Some(shutdown),
            handle: Some(handle),
        })
    }

    pub(crate) fn stop(&mut self) {
        // Dropping the sender wakes the thread.
        self.shutdown.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("expiry sweeper panicked");
            }
        }
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
    }
}
