//! # Remote Collaborator Seams
//!
//! Capability traits for the services the reconciler talks to. Hosts
//! implement them against their real backends; tests substitute doubles.
//! The reconciler never knows which it has.

use async_trait::async_trait;

use tally_core::{Product, Transaction, TransactionId};

use crate::error::SyncResult;
use crate::reconcile::SyncStatus;

// =============================================================================
// Catalog Source
// =============================================================================

/// Authoritative source of product reference data.
///
/// Remote wins for reference data: whatever this returns during a
/// reconciliation replaces the local catalog snapshot wholesale.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Fetches the current full catalog.
    async fn fetch_catalog(&self) -> SyncResult<Vec<Product>>;
}

// =============================================================================
// Accounting Sink
// =============================================================================

/// Per-batch outcome from the accounting collaborator.
///
/// Every transaction in a pushed batch lands in exactly one list. Rejected
/// entries stay queued locally and are retried on a later pass - completed
/// transactions are never discarded because a remote disliked them.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    /// Ids accepted by the remote.
    pub accepted: Vec<TransactionId>,

    /// Ids rejected, with the remote's reason.
    pub rejected: Vec<(TransactionId, String)>,
}

impl BatchOutcome {
    /// Outcome accepting the whole batch.
    pub fn all_accepted(batch: &[Transaction]) -> Self {
        BatchOutcome {
            accepted: batch.iter().map(|t| t.id.clone()).collect(),
            rejected: Vec::new(),
        }
    }
}

/// Accounting/ERP collaborator that receives finalized transactions.
#[async_trait]
pub trait AccountingSink: Send + Sync {
    /// Pushes a batch of locally completed transactions.
    async fn push_transactions(&self, batch: &[Transaction]) -> SyncResult<BatchOutcome>;
}

// =============================================================================
// Event Sink
// =============================================================================

/// Observability seam for the host shell.
///
/// Sync failures surface HERE, not as checkout errors: the register keeps
/// ringing sales while the shell shows a "pending sync" badge.
pub trait SyncEventSink: Send + Sync {
    /// A reconciliation status change (started, finished, counts moved).
    fn status_changed(&self, status: &SyncStatus);

    /// A reconciliation error. `retryable` follows
    /// [`crate::error::SyncError::is_retryable`].
    fn reconcile_error(&self, message: &str, retryable: bool);
}

/// No-op event sink for tests and headless use.
pub struct NoOpEvents;

impl SyncEventSink for NoOpEvents {
    fn status_changed(&self, _status: &SyncStatus) {}
    fn reconcile_error(&self, _message: &str, _retryable: bool) {}
}
