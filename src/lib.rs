//! # State Namespace
//!
//! A hierarchical, path-addressed state tree that aggregates status reported
//! by many concurrent producers into one consistent, queryable view.
//!
//! ## Core Concepts
//!
//! - **Paths**: Immutable dot-separated addresses with prefix algebra
//! - **Nodes**: Composites (named children) and metrics (typed values, optional TTL)
//! - **Transitions**: Ordered batches of puts and removes, applied all-or-nothing
//! - **Watchers**: Ordered change notification, decoupled from writers
//! - **Expiry**: A background sweeper removing metrics whose TTL has passed
//! - **Snapshots**: Immutable tree versions that readers traverse without locking
//!
//! ## Example
//!
//! ```ignore
//! use state_namespace::{NamespaceConfig, PathAddress, StateNamespace, SubscriptionConfig, Transition};
//! use std::time::Duration;
//!
//! let namespace = StateNamespace::new(NamespaceConfig::default())?;
//!
//! // Watch everything under "pools"
//! let pools = PathAddress::parse("pools")?;
//! let handle = namespace.subscribe(SubscriptionConfig::subtree(pools.clone()))?;
//!
//! // Report two values atomically; they vanish unless refreshed within 30s
//! let ttl = Duration::from_secs(30);
//! namespace.commit(
//!     Transition::new()
//!         .put_with_ttl(pools.child("pool1").child("free"), 1024i64, ttl)
//!         .put_with_ttl(pools.child("pool1").child("enabled"), true, ttl),
//! )?;
//!
//! // Export a consistent view
//! for (path, node) in namespace.snapshot().visit() {
//!     println!("{} {:?}", path, node);
//! }
//! ```

pub mod error;
pub mod namespace;
pub mod path;
pub mod sweeper;
pub mod transition;
pub mod tree;
pub mod types;
pub mod visitor;
pub mod watchers;

// Re-exports
pub use error::{NamespaceError, Result};
pub use namespace::{CommitReport, NamespaceConfig, StateNamespace};
pub use path::PathAddress;
pub use sweeper::{collect_expired, SweepReport};
pub use transition::{Operation, Transition};
pub use tree::{Composite, Metric, StateNode, TreeSnapshot};
pub use types::*;
pub use visitor::{StateVisitor, TreeStats, Visit};
pub use watchers::{
    DropReason, SubscriptionConfig, SubscriptionId, WatchEvent, WatchHandle, WatchMode,
    WatcherRegistry,
};
