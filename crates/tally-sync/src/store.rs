//! # Offline Store
//!
//! Durable local persistence of session state: cart lines, completed
//! transactions, the catalog snapshot, and the replay outbox.
//!
//! ## Snapshot Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    session.json (atomic writes)                         │
//! │                                                                         │
//! │  {                                                                      │
//! │    "cart":             [CartLine, ...],     in-flight register state    │
//! │    "transactions":     [Transaction, ...],  the local ledger            │
//! │    "catalog_snapshot": [Product, ...],      reference data (remote wins)│
//! │    "outbox":           [OutboxEntry, ...],  replay queue (local wins)   │
//! │    "last_sync":        timestamp | null                                 │
//! │  }                                                                      │
//! │                                                                         │
//! │  WRITE DISCIPLINE: serialize → write session.json.tmp → rename.         │
//! │  A crash mid-write leaves the previous snapshot intact; the rename      │
//! │  is the commit point.                                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Persisted after every mutating cart/transaction operation, so an
//! abnormal process exit loses nothing that mattered.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info, warn};

use tally_core::{CartLine, Product, Transaction, TransactionId};

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Constants
// =============================================================================

/// Maximum replay attempts before an outbox entry is skipped (still kept,
/// still visible, just no longer retried automatically).
pub const MAX_REPLAY_ATTEMPTS: i64 = 10;

// =============================================================================
// Snapshot Types
// =============================================================================

/// An entry in the replay outbox.
///
/// Completed transactions queue here until the accounting collaborator
/// acknowledges them. Entries are marked, never deleted: the outbox is an
/// audit trail of what was replayed when.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEntry {
    /// The transaction awaiting replay.
    pub transaction_id: TransactionId,

    /// Number of replay attempts so far.
    pub attempts: i64,

    /// Last error message if a replay failed.
    pub last_error: Option<String>,

    /// When the entry was queued.
    pub queued_at: DateTime<Utc>,

    /// When successfully replayed. `None` means pending.
    pub synced_at: Option<DateTime<Utc>>,
}

impl OutboxEntry {
    /// Pending means unsynced and under the attempt cap.
    pub fn is_pending(&self) -> bool {
        self.synced_at.is_none() && self.attempts < MAX_REPLAY_ATTEMPTS
    }
}

/// The full durable snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// In-flight cart lines.
    #[serde(default)]
    pub cart: Vec<CartLine>,

    /// Locally completed (and possibly reversed) transactions.
    #[serde(default)]
    pub transactions: Vec<Transaction>,

    /// Local copy of the product catalog for offline operation.
    #[serde(default)]
    pub catalog_snapshot: Vec<Product>,

    /// Replay queue.
    #[serde(default)]
    pub outbox: Vec<OutboxEntry>,

    /// Last successful reconciliation.
    #[serde(default)]
    pub last_sync: Option<DateTime<Utc>>,
}

// =============================================================================
// Offline Store
// =============================================================================

/// Durable local store backing the offline-first contract.
#[derive(Debug)]
pub struct OfflineStore {
    path: PathBuf,
    snapshot: StoreSnapshot,
}

impl OfflineStore {
    /// Opens the store at `path`, loading the last snapshot or starting
    /// empty when none exists.
    pub async fn open(path: PathBuf) -> SyncResult<Self> {
        let snapshot = match fs::read(&path).await {
            Ok(bytes) => {
                let snapshot: StoreSnapshot = serde_json::from_slice(&bytes)?;
                info!(
                    ?path,
                    transactions = snapshot.transactions.len(),
                    pending = snapshot.outbox.iter().filter(|e| e.is_pending()).count(),
                    "Loaded offline snapshot"
                );
                snapshot
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(?path, "No snapshot on disk, starting empty");
                StoreSnapshot::default()
            }
            Err(e) => return Err(SyncError::LoadFailed(e.to_string())),
        };

        Ok(OfflineStore { path, snapshot })
    }

    /// Default snapshot location under the platform data directory.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "tally", "pos")
            .map(|dirs| dirs.data_dir().join("session.json"))
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn snapshot(&self) -> &StoreSnapshot {
        &self.snapshot
    }

    pub fn cart(&self) -> &[CartLine] {
        &self.snapshot.cart
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.snapshot.transactions
    }

    pub fn catalog(&self) -> &[Product] {
        &self.snapshot.catalog_snapshot
    }

    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        self.snapshot.last_sync
    }

    /// Transactions whose outbox entries are still pending, oldest first,
    /// up to `limit`.
    pub fn pending(&self, limit: usize) -> Vec<Transaction> {
        self.snapshot
            .outbox
            .iter()
            .filter(|e| e.is_pending())
            .take(limit)
            .filter_map(|e| {
                self.snapshot
                    .transactions
                    .iter()
                    .find(|t| t.id == e.transaction_id)
                    .cloned()
            })
            .collect()
    }

    /// Number of pending outbox entries.
    pub fn pending_count(&self) -> usize {
        self.snapshot.outbox.iter().filter(|e| e.is_pending()).count()
    }

    // =========================================================================
    // Mutations (callers persist)
    // =========================================================================

    /// Replaces the stored cart lines.
    pub fn set_cart(&mut self, lines: Vec<CartLine>) {
        self.snapshot.cart = lines;
    }

    /// Upserts a transaction and ensures it has a pending outbox entry.
    ///
    /// A reversal re-queues the (already synced) transaction so the
    /// accounting collaborator hears about the status change too. The
    /// stored record is replaced wholesale - by the immutability contract
    /// only status/reversal fields can have changed.
    pub fn record_transaction(&mut self, transaction: &Transaction) {
        match self
            .snapshot
            .transactions
            .iter_mut()
            .find(|t| t.id == transaction.id)
        {
            Some(existing) => *existing = transaction.clone(),
            None => self.snapshot.transactions.push(transaction.clone()),
        }

        match self
            .snapshot
            .outbox
            .iter_mut()
            .find(|e| e.transaction_id == transaction.id)
        {
            Some(entry) if entry.synced_at.is_some() => {
                // Re-queue after a reversal
                entry.synced_at = None;
                entry.attempts = 0;
                entry.last_error = None;
                entry.queued_at = Utc::now();
            }
            Some(_) => {} // already pending
            None => self.snapshot.outbox.push(OutboxEntry {
                transaction_id: transaction.id.clone(),
                attempts: 0,
                last_error: None,
                queued_at: Utc::now(),
                synced_at: None,
            }),
        }
    }

    /// Marks an outbox entry as successfully replayed.
    pub fn mark_synced(&mut self, id: &TransactionId) -> SyncResult<()> {
        let entry = self
            .snapshot
            .outbox
            .iter_mut()
            .find(|e| &e.transaction_id == id)
            .ok_or_else(|| SyncError::EntryNotFound(id.to_string()))?;

        entry.synced_at = Some(Utc::now());
        entry.last_error = None;
        Ok(())
    }

    /// Records a failed replay attempt.
    pub fn mark_failed(&mut self, id: &TransactionId, error: &str) -> SyncResult<()> {
        let entry = self
            .snapshot
            .outbox
            .iter_mut()
            .find(|e| &e.transaction_id == id)
            .ok_or_else(|| SyncError::EntryNotFound(id.to_string()))?;

        entry.attempts += 1;
        entry.last_error = Some(error.to_string());

        if entry.attempts >= MAX_REPLAY_ATTEMPTS {
            warn!(
                id = %id,
                attempts = entry.attempts,
                "Outbox entry exceeded max replay attempts, skipping"
            );
        }
        Ok(())
    }

    /// Replaces the catalog snapshot (remote wins for reference data).
    pub fn replace_catalog(&mut self, products: Vec<Product>) {
        self.snapshot.catalog_snapshot = products;
    }

    /// Stamps a successful reconciliation.
    pub fn set_last_sync(&mut self, at: DateTime<Utc>) {
        self.snapshot.last_sync = Some(at);
    }

    // =========================================================================
    // Durability
    // =========================================================================

    /// Writes the snapshot durably: temp file, then rename.
    ///
    /// The rename is the commit point; a crash anywhere before it leaves
    /// the previous snapshot readable.
    pub async fn persist(&self) -> SyncResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let bytes = serde_json::to_vec_pretty(&self.snapshot)?;
        let tmp = self.path.with_extension("json.tmp");

        fs::write(&tmp, &bytes).await?;
        fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| SyncError::PersistFailed(e.to_string()))?;

        debug!(path = ?self.path, bytes = bytes.len(), "Persisted offline snapshot");
        Ok(())
    }

    /// Convenience: replace the cart and persist immediately.
    pub async fn save_cart(&mut self, lines: Vec<CartLine>) -> SyncResult<()> {
        self.set_cart(lines);
        self.persist().await
    }

    /// Convenience: record a transaction and persist immediately.
    ///
    /// This is the call sitting directly behind `complete()`: by the time
    /// checkout returns, the transaction is on disk.
    pub async fn save_transaction(&mut self, transaction: &Transaction) -> SyncResult<()> {
        self.record_transaction(transaction);
        self.persist().await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
