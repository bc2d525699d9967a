//! The state tree.
//!
//! Nodes are immutable once published. A commit copies only the nodes on
//! the paths it touches (`Arc::make_mut`) and shares everything else with
//! the previous version, which readers may still be holding.

mod apply;
mod node;
mod snapshot;

pub(crate) use apply::{apply_operation, ApplyContext};
pub use node::{Composite, Metric, StateNode};
pub use snapshot::TreeSnapshot;
