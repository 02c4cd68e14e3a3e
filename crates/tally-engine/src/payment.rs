//! # Payment Device Seam
//!
//! The payment terminal is an exclusive, stateful resource. This module
//! defines the capability trait a host implements and the cancellation
//! handle the checkout flow listens on.
//!
//! ## Acquisition Discipline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  Device Acquisition Discipline                          │
//! │                                                                         │
//! │  connect()                                                              │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  process_payment(amount, method) ──┬── approved ──┐                     │
//! │     │                              │              │                     │
//! │     ├── declined ──────────────────┤              │                     │
//! │     ├── device error ──────────────┤              │                     │
//! │     ├── timeout  ──► cancel_payment()             │                     │
//! │     └── operator cancel ──► cancel_payment()      │                     │
//! │                                    │              │                     │
//! │                                    ▼              ▼                     │
//! │                              disconnect()   disconnect()                │
//! │                                                                         │
//! │  EVERY exit path releases the device. It is never left connected        │
//! │  with no owner.                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Notify;

use tally_core::{Money, PaymentMethod};

use crate::error::EngineResult;

// =============================================================================
// Payment Outcome
// =============================================================================

/// Result of a payment attempt on the device.
#[derive(Debug, Clone)]
pub struct PaymentOutcome {
    /// Whether the payment was approved.
    pub approved: bool,

    /// Device/processor reference for the receipt, if any.
    pub reference: Option<String>,

    /// Human-readable message (decline reason, processor note).
    pub message: Option<String>,
}

impl PaymentOutcome {
    /// An approved outcome carrying a reference.
    pub fn approved(reference: impl Into<String>) -> Self {
        PaymentOutcome {
            approved: true,
            reference: Some(reference.into()),
            message: None,
        }
    }

    /// A declined outcome carrying a reason.
    pub fn declined(message: impl Into<String>) -> Self {
        PaymentOutcome {
            approved: false,
            reference: None,
            message: Some(message.into()),
        }
    }
}

// =============================================================================
// Payment Device Trait
// =============================================================================

/// Capability interface over the payment terminal.
///
/// Hosts implement this against their real device driver or simulator.
/// Implementations must tolerate `cancel_payment` / `disconnect` being
/// called when no payment is in flight - the checkout flow calls them
/// unconditionally on abnormal exits.
#[async_trait]
pub trait PaymentDevice: Send + Sync {
    /// Establishes the device session.
    async fn connect(&self) -> EngineResult<()>;

    /// Releases the device session.
    async fn disconnect(&self) -> EngineResult<()>;

    /// Runs a payment for the given amount.
    async fn process_payment(
        &self,
        amount: Money,
        method: PaymentMethod,
    ) -> EngineResult<PaymentOutcome>;

    /// Aborts the in-flight payment, if any.
    async fn cancel_payment(&self) -> EngineResult<()>;
}

// =============================================================================
// Cancellation Handle
// =============================================================================

/// Operator-facing cancellation handle for an in-progress payment.
///
/// Clone it, hand one half to the UI, and call [`CancelHandle::cancel`]
/// when the operator backs out. A cancel issued before the checkout flow
/// starts waiting is not lost: the underlying permit is stored.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    notify: Arc<Notify>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation of the in-progress payment.
    pub fn cancel(&self) {
        self.notify.notify_one();
    }

    /// Resolves when cancellation has been requested.
    pub async fn cancelled(&self) {
        self.notify.notified().await;
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
