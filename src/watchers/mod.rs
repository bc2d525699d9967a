//! Watchers: change notification for tree subscribers.
//!
//! Subscribers register a path pattern and a [`WatchMode`] and receive a
//! [`WatchEvent`] for every matching metric change, in commit order and,
//! within one commit, in operation order.
//!
//! Delivery never runs on the committing thread. Writers enqueue each
//! committed change set to a dispatch thread, which offers events to
//! bounded per-subscriber buffers. A subscriber that falls behind is
//! dropped with [`DropReason::BufferOverflow`].
//!
//! # Example
//!
//! ```ignore
//! let handle = namespace.subscribe(SubscriptionConfig::subtree(PathAddress::parse("pools")?))?;
//!
//! for event in handle.iter() {
//!     match event {
//!         WatchEvent::Change { path, kind, value, .. } => println!("{} {:?} {:?}", path, kind, value),
//!         WatchEvent::CaughtUp { .. } => {}
//!         WatchEvent::Dropped { .. } => break,
//!     }
//! }
//! ```

mod manager;
mod types;

pub(crate) use manager::{spawn_dispatcher, DispatchMessage};
pub use manager::WatcherRegistry;
pub use types::{
    DropReason, SubscriptionConfig, SubscriptionId, WatchEvent, WatchHandle, WatchMode,
    DEFAULT_BUFFER_SIZE,
};
