//! # Sync Error Types
//!
//! Error types for persistence and reconciliation.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │    Storage      │  │     Remote      │  │      Internal           │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  PersistFailed  │  │  CatalogFetch   │  │  Internal               │ │
//! │  │  LoadFailed     │  │  AccountingPush │  │  EntryNotFound          │ │
//! │  │  Serialization  │  │  Timeout        │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  Remote errors are retryable BY DESIGN: they are logged, reported to   │
//! │  the event sink, and retried on the next online transition. They are   │
//! │  never surfaced as a user-facing failure for a transaction that        │
//! │  already completed locally.                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering persistence and reconciliation failures.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Storage Errors
    // =========================================================================
    /// Failed to write the local snapshot.
    #[error("Failed to persist local snapshot: {0}")]
    PersistFailed(String),

    /// Failed to read the local snapshot.
    #[error("Failed to load local snapshot: {0}")]
    LoadFailed(String),

    /// Snapshot (de)serialization failed.
    #[error("Snapshot serialization failed: {0}")]
    SerializationFailed(String),

    // =========================================================================
    // Remote Errors
    // =========================================================================
    /// Catalog collaborator unreachable or failing.
    #[error("Catalog fetch failed: {0}")]
    CatalogFetchFailed(String),

    /// Accounting collaborator unreachable or failing.
    #[error("Accounting push failed: {0}")]
    AccountingPushFailed(String),

    /// Remote call exceeded its bounded timeout.
    #[error("Remote call timed out after {0} seconds")]
    Timeout(u64),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Outbox entry referenced by id does not exist.
    #[error("Outbox entry not found for transaction: {0}")]
    EntryNotFound(String),

    /// Internal reconciler error.
    #[error("Internal sync error: {0}")]
    Internal(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::PersistFailed(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::SerializationFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl SyncError {
    /// Returns true if the operation can be retried on a later
    /// reconciliation pass.
    ///
    /// ## Retryable
    /// - Remote failures (network, collaborator outages)
    /// - Timeouts
    ///
    /// ## Non-Retryable
    /// - Serialization failures (retrying reproduces them)
    /// - Missing outbox entries (programming error)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::CatalogFetchFailed(_)
                | SyncError::AccountingPushFailed(_)
                | SyncError::Timeout(_)
        )
    }
}
