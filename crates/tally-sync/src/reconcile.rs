//! # Reconciler
//!
//! Runs the reconciliation protocol when connectivity returns: refresh
//! reference data (remote wins), replay queued transactions (local wins).
//!
//! ## Reconciliation Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Reconciliation Run                                  │
//! │                                                                         │
//! │  offline ──► online transition                                          │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │ 0. Supersede: abort any still-running reconciliation            │   │
//! │  │ 1. Fetch catalog (bounded exponential backoff)                  │   │
//! │  │    → replace local snapshot wholesale (REMOTE WINS)             │   │
//! │  │ 2. Replay outbox in batches to the accounting sink              │   │
//! │  │    → accepted: mark synced                                      │   │
//! │  │    → rejected: attempts += 1, retried next run (LOCAL WINS -    │   │
//! │  │      a completed transaction is never discarded or rewritten)   │   │
//! │  │ 3. Stamp last_sync, persist                                     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  AT MOST ONE run is in flight. Failures are logged and reported to      │
//! │  the event sink; the register never notices.                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use backoff::ExponentialBackoff;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use tally_core::Product;

use crate::collaborators::{AccountingSink, CatalogSource, NoOpEvents, SyncEventSink};
use crate::error::SyncResult;
use crate::store::OfflineStore;

// =============================================================================
// Constants
// =============================================================================

/// Default outbox entries replayed per accounting batch.
const DEFAULT_BATCH_SIZE: usize = 100;

/// Upper bound on catalog-fetch retries within a single run.
const CATALOG_RETRY_BUDGET: Duration = Duration::from_secs(30);

// =============================================================================
// Status & Summary
// =============================================================================

/// Point-in-time sync status for host shells.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    /// Whether the host last reported connectivity.
    pub online: bool,

    /// Whether a reconciliation run is in flight.
    pub reconciling: bool,

    /// Pending outbox entries awaiting replay.
    pub pending_count: usize,

    /// Last successful reconciliation.
    pub last_sync: Option<DateTime<Utc>>,

    /// Last reconciliation error, if any.
    pub last_error: Option<String>,
}

/// What a reconciliation run accomplished.
#[derive(Debug, Clone, Default)]
pub struct ReconcileSummary {
    /// Catalog records fetched and applied.
    pub catalog_items: usize,

    /// Outbox entries acknowledged by accounting.
    pub accepted: usize,

    /// Outbox entries rejected (kept for retry).
    pub rejected: usize,
}

// =============================================================================
// Reconciler
// =============================================================================

/// Single-flight reconciliation driver.
///
/// The host reports connectivity transitions via [`set_connectivity`];
/// each offline→online transition starts exactly one run, superseding any
/// run still in flight from a previous transition.
///
/// [`set_connectivity`]: Reconciler::set_connectivity
pub struct Reconciler {
    store: Arc<Mutex<OfflineStore>>,
    catalog: Arc<dyn CatalogSource>,
    accounting: Arc<dyn AccountingSink>,
    events: Arc<dyn SyncEventSink>,
    batch_size: usize,

    online: AtomicBool,
    last_error: StdMutex<Option<String>>,
    current: StdMutex<Option<JoinHandle<()>>>,
}

impl Reconciler {
    pub fn new(
        store: Arc<Mutex<OfflineStore>>,
        catalog: Arc<dyn CatalogSource>,
        accounting: Arc<dyn AccountingSink>,
    ) -> Self {
        Reconciler {
            store,
            catalog,
            accounting,
            events: Arc::new(NoOpEvents),
            batch_size: DEFAULT_BATCH_SIZE,
            online: AtomicBool::new(false),
            last_error: StdMutex::new(None),
            current: StdMutex::new(None),
        }
    }

    /// Installs an event sink for host observability.
    pub fn with_events(mut self, events: Arc<dyn SyncEventSink>) -> Self {
        self.events = events;
        self
    }

    /// Overrides the replay batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    // =========================================================================
    // Connectivity
    // =========================================================================

    /// Reports a connectivity change.
    ///
    /// Only the offline→online EDGE starts a reconciliation; repeated
    /// "still online" reports do nothing. A new edge while a run is in
    /// flight aborts the stale run and starts a fresh one - never two
    /// concurrently.
    pub fn set_connectivity(self: &Arc<Self>, online: bool) {
        let was_online = self.online.swap(online, Ordering::SeqCst);

        if online && !was_online {
            info!("Connectivity regained, starting reconciliation");
            self.spawn_run();
        } else if !online && was_online {
            debug!("Connectivity lost");
        }
    }

    /// True while a reconciliation run is in flight.
    pub fn is_reconciling(&self) -> bool {
        self.current
            .lock()
            .map(|guard| guard.as_ref().map(|h| !h.is_finished()).unwrap_or(false))
            .unwrap_or(false)
    }

    /// Current sync status.
    pub async fn status(&self) -> SyncStatus {
        let (pending_count, last_sync) = {
            let store = self.store.lock().await;
            (store.pending_count(), store.last_sync())
        };

        SyncStatus {
            online: self.online.load(Ordering::SeqCst),
            reconciling: self.is_reconciling(),
            pending_count,
            last_sync,
            last_error: self.last_error.lock().ok().and_then(|g| g.clone()),
        }
    }

    /// Waits for the in-flight run (if any) to finish or be aborted.
    pub async fn wait_idle(&self) {
        let handle = self.current.lock().ok().and_then(|mut g| g.take());
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    fn spawn_run(self: &Arc<Self>) {
        let mut current = match self.current.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        // Supersede: the newer transition wins
        if let Some(stale) = current.take() {
            if !stale.is_finished() {
                debug!("Superseding in-flight reconciliation");
                stale.abort();
            }
        }

        let this = Arc::clone(self);
        *current = Some(tokio::spawn(async move {
            match this.run_once().await {
                Ok(summary) => {
                    info!(
                        catalog_items = summary.catalog_items,
                        accepted = summary.accepted,
                        rejected = summary.rejected,
                        "Reconciliation finished"
                    );
                    if let Ok(mut last_error) = this.last_error.lock() {
                        *last_error = None;
                    }
                }
                Err(e) => {
                    error!(error = %e, retryable = e.is_retryable(), "Reconciliation failed");
                    this.events.reconcile_error(&e.to_string(), e.is_retryable());
                    if let Ok(mut last_error) = this.last_error.lock() {
                        *last_error = Some(e.to_string());
                    }
                }
            }

            this.events.status_changed(&this.status().await);
        }));
    }

    // =========================================================================
    // The Run
    // =========================================================================

    /// Executes one reconciliation pass.
    ///
    /// Public so hosts and tests can drive it directly without going
    /// through a connectivity edge.
    pub async fn run_once(&self) -> SyncResult<ReconcileSummary> {
        let mut summary = ReconcileSummary::default();

        // ---- Phase 1: reference data, remote wins -------------------------
        let catalog = self.fetch_catalog_with_backoff().await?;
        summary.catalog_items = catalog.len();

        {
            let mut store = self.store.lock().await;
            store.replace_catalog(catalog);
            store.persist().await?;
        }

        // ---- Phase 2: transactional facts, local wins ---------------------
        // Snapshot the pending set once: each entry is replayed at most once
        // per run; rejected entries wait for the NEXT run
        let pending = {
            let store = self.store.lock().await;
            store.pending(usize::MAX)
        };

        for batch in pending.chunks(self.batch_size) {
            debug!(count = batch.len(), "Replaying outbox batch");
            let outcome = self.accounting.push_transactions(batch).await?;

            let mut store = self.store.lock().await;
            for id in &outcome.accepted {
                store.mark_synced(id)?;
            }
            for (id, reason) in &outcome.rejected {
                store.mark_failed(id, reason)?;
            }
            store.persist().await?;

            summary.accepted += outcome.accepted.len();
            summary.rejected += outcome.rejected.len();
        }

        // ---- Phase 3: stamp and persist -----------------------------------
        {
            let mut store = self.store.lock().await;
            store.set_last_sync(Utc::now());
            store.persist().await?;
        }

        Ok(summary)
    }

    /// Catalog fetch under a bounded exponential backoff. Non-retryable
    /// errors abort immediately; retryable ones retry within the budget.
    async fn fetch_catalog_with_backoff(&self) -> SyncResult<Vec<Product>> {
        let policy = ExponentialBackoff {
            max_elapsed_time: Some(CATALOG_RETRY_BUDGET),
            ..ExponentialBackoff::default()
        };

        backoff::future::retry(policy, || async {
            self.catalog.fetch_catalog().await.map_err(|e| {
                if e.is_retryable() {
                    debug!(error = %e, "Catalog fetch failed, will retry");
                    backoff::Error::transient(e)
                } else {
                    backoff::Error::permanent(e)
                }
            })
        })
        .await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::BatchOutcome;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::AtomicUsize;
    use tally_core::{
        PaymentMethod, Transaction, TransactionId, TransactionLine, TransactionStatus,
    };

    fn transaction(seq: u64) -> Transaction {
        Transaction {
            id: TransactionId {
                seq,
                token: format!("token-{}", seq),
            },
            lines: vec![TransactionLine {
                product_id: "p-1".into(),
                name: "Widget".into(),
                unit_price_minor: 1000,
                quantity: 1,
                line_discount_minor: 0,
            }],
            subtotal_minor: 1000,
            total_discount_minor: 0,
            total_tax_minor: 75,
            delivery_cost_minor: 0,
            total_minor: 1075,
            payment_method: PaymentMethod::Cash,
            payment_reference: None,
            customer_id: None,
            cashier_id: "cashier-1".into(),
            completed_at: Utc::now(),
            status: TransactionStatus::Completed,
            reversal: None,
        }
    }

    fn catalog_product(id: &str) -> Product {
        Product {
            id: id.to_string(),
            sku: format!("SKU-{}", id),
            name: format!("Product {}", id),
            unit_price_minor: 1000,
            unit_cost_minor: None,
            current_stock: Some(5),
            is_active: true,
        }
    }

    struct FixedCatalog(Vec<Product>);

    #[async_trait]
    impl CatalogSource for FixedCatalog {
        async fn fetch_catalog(&self) -> SyncResult<Vec<Product>> {
            Ok(self.0.clone())
        }
    }

    /// Accepts everything, counting how many times each id was pushed.
    struct CountingSink {
        pushes: StdMutex<Vec<TransactionId>>,
    }

    impl CountingSink {
        fn new() -> Self {
            CountingSink {
                pushes: StdMutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl AccountingSink for CountingSink {
        async fn push_transactions(&self, batch: &[Transaction]) -> SyncResult<BatchOutcome> {
            self.pushes
                .lock()
                .unwrap()
                .extend(batch.iter().map(|t| t.id.clone()));
            Ok(BatchOutcome::all_accepted(batch))
        }
    }

    /// Rejects everything for the first `failures` pushes of each id.
    struct FlakySink {
        failures: usize,
        seen: AtomicUsize,
    }

    #[async_trait]
    impl AccountingSink for FlakySink {
        async fn push_transactions(&self, batch: &[Transaction]) -> SyncResult<BatchOutcome> {
            let round = self.seen.fetch_add(1, Ordering::SeqCst);
            if round < self.failures {
                Ok(BatchOutcome {
                    accepted: vec![],
                    rejected: batch
                        .iter()
                        .map(|t| (t.id.clone(), "ledger closed".to_string()))
                        .collect(),
                })
            } else {
                Ok(BatchOutcome::all_accepted(batch))
            }
        }
    }

    async fn seeded_store(transactions: &[Transaction]) -> Arc<Mutex<OfflineStore>> {
        let dir = tempfile::tempdir().unwrap();
        // Leak the tempdir so the path outlives the test body
        let path = dir.keep().join("session.json");
        let mut store = OfflineStore::open(path).await.unwrap();
        for txn in transactions {
            store.record_transaction(txn);
        }
        store.persist().await.unwrap();
        Arc::new(Mutex::new(store))
    }

    #[tokio::test]
    async fn test_run_once_replays_and_stamps() {
        let store = seeded_store(&[transaction(1), transaction(2)]).await;
        let sink = Arc::new(CountingSink::new());
        let reconciler = Reconciler::new(
            store.clone(),
            Arc::new(FixedCatalog(vec![catalog_product("p-1")])),
            sink.clone(),
        );

        let summary = reconciler.run_once().await.unwrap();
        assert_eq!(summary.catalog_items, 1);
        assert_eq!(summary.accepted, 2);
        assert_eq!(summary.rejected, 0);

        let store = store.lock().await;
        assert_eq!(store.pending_count(), 0);
        assert!(store.last_sync().is_some());
        assert_eq!(store.catalog().len(), 1);

        // Each transaction was pushed exactly once - no duplicates
        let pushes = sink.pushes.lock().unwrap();
        assert_eq!(pushes.len(), 2);
    }

    #[tokio::test]
    async fn test_second_run_does_not_duplicate() {
        let store = seeded_store(&[transaction(1)]).await;
        let sink = Arc::new(CountingSink::new());
        let reconciler = Reconciler::new(
            store.clone(),
            Arc::new(FixedCatalog(vec![])),
            sink.clone(),
        );

        reconciler.run_once().await.unwrap();
        reconciler.run_once().await.unwrap();

        // Synced on the first run; the second had nothing to replay
        assert_eq!(sink.pushes.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_entries_retry_next_run() {
        let store = seeded_store(&[transaction(1)]).await;
        let sink = Arc::new(FlakySink {
            failures: 1,
            seen: AtomicUsize::new(0),
        });
        let reconciler =
            Reconciler::new(store.clone(), Arc::new(FixedCatalog(vec![])), sink);

        let first = reconciler.run_once().await.unwrap();
        assert_eq!(first.accepted, 0);
        assert_eq!(first.rejected, 1);
        {
            let store = store.lock().await;
            assert_eq!(store.pending_count(), 1);
            assert_eq!(store.snapshot().outbox[0].attempts, 1);
        }

        let second = reconciler.run_once().await.unwrap();
        assert_eq!(second.accepted, 1);
        assert_eq!(store.lock().await.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_online_edge_triggers_single_run() {
        let store = seeded_store(&[transaction(1)]).await;
        let sink = Arc::new(CountingSink::new());
        let reconciler = Arc::new(Reconciler::new(
            store.clone(),
            Arc::new(FixedCatalog(vec![])),
            sink.clone(),
        ));

        reconciler.set_connectivity(true);
        // Repeated "still online" reports are not edges
        reconciler.set_connectivity(true);
        reconciler.set_connectivity(true);
        reconciler.wait_idle().await;

        assert_eq!(sink.pushes.lock().unwrap().len(), 1);
        assert_eq!(store.lock().await.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_offline_report_does_not_reconcile() {
        let store = seeded_store(&[transaction(1)]).await;
        let sink = Arc::new(CountingSink::new());
        let reconciler = Arc::new(Reconciler::new(
            store.clone(),
            Arc::new(FixedCatalog(vec![])),
            sink.clone(),
        ));

        reconciler.set_connectivity(false);
        reconciler.wait_idle().await;
        assert!(sink.pushes.lock().unwrap().is_empty());
        assert_eq!(store.lock().await.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_newer_edge_supersedes_hung_run() {
        /// Hangs forever on the first fetch, succeeds afterwards.
        struct StickyCatalog {
            calls: AtomicUsize,
        }

        #[async_trait]
        impl CatalogSource for StickyCatalog {
            async fn fetch_catalog(&self) -> SyncResult<Vec<Product>> {
                if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    std::future::pending::<()>().await;
                }
                Ok(vec![])
            }
        }

        let store = seeded_store(&[transaction(1)]).await;
        let sink = Arc::new(CountingSink::new());
        let reconciler = Arc::new(Reconciler::new(
            store.clone(),
            Arc::new(StickyCatalog {
                calls: AtomicUsize::new(0),
            }),
            sink.clone(),
        ));

        // First edge: run hangs in the catalog fetch
        reconciler.set_connectivity(true);
        tokio::task::yield_now().await;
        assert!(reconciler.is_reconciling());

        // Drop offline, come back: the stale run is aborted, a fresh one runs
        reconciler.set_connectivity(false);
        reconciler.set_connectivity(true);
        reconciler.wait_idle().await;

        // The transaction was replayed exactly once despite two edges
        assert_eq!(sink.pushes.lock().unwrap().len(), 1);
        assert_eq!(store.lock().await.pending_count(), 0);
    }
}
