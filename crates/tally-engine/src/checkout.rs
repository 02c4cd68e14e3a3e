//! # Checkout Flow
//!
//! Composes the payment device with the ledger: payment first, completion
//! second, with the device released on every exit path.
//!
//! ## Atomicity
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Checkout Outcomes                                 │
//! │                                                                         │
//! │  payment approved      → transaction exists, fully formed, Completed    │
//! │  payment declined      → no transaction, cart intact                    │
//! │  device error          → no transaction, cart intact, device released   │
//! │  timeout               → payment cancelled on-device, no transaction    │
//! │  operator cancellation → payment cancelled on-device, no transaction    │
//! │                                                                         │
//! │  There is no observable in-between: the Transaction either exists       │
//! │  fully formed as Completed, or it does not exist at all.                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::time::Duration;

use tokio::time::timeout;
use tracing::{info, warn};

use tally_core::{Money, PaymentMethod, Transaction};

use crate::cart::CartAggregator;
use crate::error::{EngineError, EngineResult};
use crate::ledger::TransactionLedger;
use crate::payment::{CancelHandle, PaymentDevice, PaymentOutcome};

// =============================================================================
// Checkout Request
// =============================================================================

/// Parameters for one checkout attempt.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    /// Tender the customer chose.
    pub payment_method: PaymentMethod,

    /// Optional customer identity for attribution.
    pub customer_id: Option<String>,

    /// Cashier ringing the sale.
    pub cashier_id: String,

    /// Upper bound on how long the device may take. The flow never waits
    /// on the terminal unboundedly.
    pub device_timeout: Duration,
}

impl CheckoutRequest {
    pub fn new(payment_method: PaymentMethod, cashier_id: impl Into<String>) -> Self {
        CheckoutRequest {
            payment_method,
            customer_id: None,
            cashier_id: cashier_id.into(),
            device_timeout: Duration::from_secs(60),
        }
    }

    pub fn with_customer(mut self, customer_id: impl Into<String>) -> Self {
        self.customer_id = Some(customer_id.into());
        self
    }

    pub fn with_device_timeout(mut self, device_timeout: Duration) -> Self {
        self.device_timeout = device_timeout;
        self
    }
}

// =============================================================================
// Checkout
// =============================================================================

/// Runs a full checkout: payment on the device, then completion in the
/// ledger.
///
/// The cart is validated before the device is touched, and the device is
/// disconnected before the result is returned - success or failure. On any
/// failure the cart and the ledger are exactly as they were.
pub async fn checkout(
    cart: &mut CartAggregator,
    ledger: &mut TransactionLedger,
    device: &dyn PaymentDevice,
    request: &CheckoutRequest,
    cancel: &CancelHandle,
) -> EngineResult<Transaction> {
    if cart.is_empty() {
        return Err(EngineError::EmptyCart);
    }

    let totals = cart.compute_totals();
    info!(
        total = %totals.total,
        method = %request.payment_method,
        "Starting checkout"
    );

    device.connect().await?;

    let payment = drive_device(device, totals.total, request, cancel).await;

    // Release the device on every path before anything else happens
    if let Err(e) = device.disconnect().await {
        warn!(error = %e, "Payment device disconnect failed");
    }

    let outcome = payment?;
    if !outcome.approved {
        let message = outcome
            .message
            .unwrap_or_else(|| "Payment declined".to_string());
        info!(%message, "Payment not approved");
        return Err(EngineError::Device { message });
    }

    ledger.complete(
        cart,
        request.payment_method,
        outcome.reference,
        request.customer_id.clone(),
        request.cashier_id.clone(),
    )
}

/// Runs the payment itself, racing the bounded timeout and the operator's
/// cancel handle. Loser paths abort the payment on-device before
/// returning; the caller owns the disconnect.
async fn drive_device(
    device: &dyn PaymentDevice,
    amount: Money,
    request: &CheckoutRequest,
    cancel: &CancelHandle,
) -> EngineResult<PaymentOutcome> {
    // Biased: a payment that has already settled beats a simultaneous
    // cancel request.
    tokio::select! {
        biased;

        result = timeout(
            request.device_timeout,
            device.process_payment(amount, request.payment_method),
        ) => match result {
            Ok(outcome) => outcome,
            Err(_elapsed) => {
                warn!(timeout = ?request.device_timeout, "Payment timed out");
                abort_payment(device).await;
                Err(EngineError::device("Payment timed out"))
            }
        },

        _ = cancel.cancelled() => {
            info!("Payment cancelled by operator");
            abort_payment(device).await;
            Err(EngineError::Cancelled)
        }
    }
}

/// Best-effort on-device abort; failures are logged, never propagated over
/// the original error.
async fn abort_payment(device: &dyn PaymentDevice) {
    if let Err(e) = device.cancel_payment().await {
        warn!(error = %e, "Payment device cancel failed");
    }
}
