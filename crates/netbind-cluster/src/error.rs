//! Error types for lifecycle operations.

use netbind_placement::PlacementError;
use netbind_state::StateError;
use thiserror::Error;

pub type LifecycleResult<T> = Result<T, LifecycleError>;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Placement(#[from] PlacementError),

    #[error("transaction error: {0}")]
    Transaction(#[from] StateError),

    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("cluster not found: {0}")]
    ClusterNotFound(String),

    #[error("node already registered: {0}")]
    DuplicateNode(String),

    #[error("cluster already exists: {0}")]
    DuplicateCluster(String),

    #[error("invalid identifier '{0}'")]
    InvalidId(String),
}

/// Coarse classification surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input, rejected before any state changed.
    Validation,
    /// Cluster configuration cannot be placed; prior state untouched.
    Configuration,
    /// Persistence failed; the whole operation rolled back.
    Transaction,
}

impl LifecycleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LifecycleError::Placement(err) if err.is_validation() => ErrorKind::Validation,
            LifecycleError::Placement(_) => ErrorKind::Configuration,
            LifecycleError::Transaction(_) => ErrorKind::Transaction,
            LifecycleError::DuplicateCluster(_) => ErrorKind::Configuration,
            LifecycleError::NodeNotFound(_)
            | LifecycleError::ClusterNotFound(_)
            | LifecycleError::DuplicateNode(_)
            | LifecycleError::InvalidId(_) => ErrorKind::Validation,
        }
    }
}
