//! Errors surfaced by the lifecycle adapter.

use std::fmt;

use thiserror::Error;

use crate::object::MetadataError;
use crate::store::StoreError;

/// Handler method that produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Initialize,
    Finalize,
    Updated,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Initialize => "initialize",
            Phase::Finalize => "finalize",
            Phase::Updated => "updated",
        };
        f.write_str(s)
    }
}

/// Errors returned from a reconcile call.
///
/// None of them are retried internally; the caller re-drives reconciliation.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The object is malformed; nothing was mutated.
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    /// The handler failed; nothing was persisted.
    #[error("{phase} handler failed for {name}: {source:#}")]
    Handler {
        phase: Phase,
        name: String,
        #[source]
        source: anyhow::Error,
    },

    /// Persisting the edited object failed.
    #[error("update of {name} failed: {source}")]
    Store {
        name: String,
        #[source]
        source: StoreError,
    },
}

impl LifecycleError {
    /// The object vanished from the store; callers can stop retrying.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            LifecycleError::Store {
                source: StoreError::NotFound(_),
                ..
            }
        )
    }

    /// A stale write was rejected; a fresh snapshot will be reconciled.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            LifecycleError::Store {
                source: StoreError::Conflict(_) | StoreError::VersionMismatch { .. },
                ..
            }
        )
    }

    /// Handler phase that failed, if the error came from the handler.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            LifecycleError::Handler { phase, .. } => Some(*phase),
            _ => None,
        }
    }
}

/// Result type for lifecycle operations.
pub type Result<T> = std::result::Result<T, LifecycleError>;
