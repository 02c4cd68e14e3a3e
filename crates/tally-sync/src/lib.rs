//! # tally-sync: Offline Durability & Reconciliation
//!
//! Implements the offline-first contract of the checkout engine:
//!
//! - **While offline**, every cart and ledger mutation lands in a durable
//!   local JSON snapshot; completed transactions queue in an outbox. No
//!   checkout operation blocks or fails because the network is down.
//! - **On the offline→online edge**, exactly one reconciliation runs:
//!   reference data is re-fetched (remote wins), queued transactions are
//!   replayed to accounting (local wins - never discarded, never
//!   rewritten, only marked synced).
//!
//! ## Module Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          tally-sync                                     │
//! │                                                                         │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────────────────┐    │
//! │  │    store     │   │  reconcile   │   │      collaborators       │    │
//! │  │ OfflineStore │◄──│  Reconciler  │──►│ CatalogSource            │    │
//! │  │ snapshot +   │   │ single-flight│   │ AccountingSink           │    │
//! │  │ outbox       │   │ + supersede  │   │ SyncEventSink            │    │
//! │  └──────────────┘   └──────────────┘   └──────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod collaborators;
pub mod error;
pub mod reconcile;
pub mod store;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use collaborators::{AccountingSink, BatchOutcome, CatalogSource, NoOpEvents, SyncEventSink};
pub use error::{SyncError, SyncResult};
pub use reconcile::{ReconcileSummary, Reconciler, SyncStatus};
pub use store::{OfflineStore, OutboxEntry, StoreSnapshot, MAX_REPLAY_ATTEMPTS};
