//! Error types for the state namespace.

use crate::path::PathAddress;
use crate::watchers::SubscriptionId;
use thiserror::Error;

/// Main error type for namespace operations.
#[derive(Debug, Error)]
pub enum NamespaceError {
    #[error("Invalid path: {0:?}")]
    InvalidPath(String),

    #[error("Type conflict at {path}: {reason}")]
    TypeConflict {
        path: PathAddress,
        reason: &'static str,
    },

    #[error("Path not found: {0}")]
    PathNotFound(PathAddress),

    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(SubscriptionId),

    #[error("Subscription was dropped")]
    SubscriptionDropped,

    #[error("Transition too large: {operations} operations (max {max})")]
    TransitionTooLarge { operations: usize, max: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl NamespaceError {
    pub(crate) fn conflict(path: &PathAddress, reason: &'static str) -> Self {
        NamespaceError::TypeConflict {
            path: path.clone(),
            reason,
        }
    }
}

/// Result type for namespace operations.
pub type Result<T> = std::result::Result<T, NamespaceError>;
