//! Reconcile error types.

use kforge_api::{ApiError, ObjectKey};
use thiserror::Error;

use crate::expander::ExpandError;
use crate::store::StoreError;
use crate::workloads::WorkloadError;

/// Errors aborting a single reconcile tick.
///
/// A tick that fails leaves the entity exactly as it was read.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("trait expansion failed: {0}")]
    Expand(#[from] ExpandError),

    #[error("workload operation failed: {0}")]
    Workload(#[from] WorkloadError),

    #[error(transparent)]
    Api(#[from] ApiError),

    /// The integration references a kit that does not exist.
    #[error("integration {integration} references missing kit {kit}")]
    MissingKit {
        integration: ObjectKey,
        kit: ObjectKey,
    },

    /// The integration reached deployment without anything to deploy.
    #[error("integration {0} has neither a kit nor an image to deploy")]
    NothingToDeploy(ObjectKey),
}

impl ReconcileError {
    /// Whether the error is an optimistic concurrency rejection.
    ///
    /// Conflicts are re-queued from a fresh read, never surfaced.
    pub fn is_conflict(&self) -> bool {
        matches!(self, ReconcileError::Store(StoreError::Conflict { .. }))
    }
}

/// Errors raised while building a phase table.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// Two actions claim the same phase.
    #[error("phase {phase} routed to both '{first}' and '{second}'")]
    Overlap {
        phase: String,
        first: &'static str,
        second: &'static str,
    },

    /// A phase has no action.
    #[error("phase {0} has no action")]
    Unrouted(String),
}
