//! # Transaction Ledger
//!
//! Turns a cart into an immutable completed transaction and governs the
//! terminal transitions behind the approval gate.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Transaction Lifecycle                                │
//! │                                                                         │
//! │   cart ──complete()──► ┌───────────┐                                    │
//! │                        │ Completed │                                    │
//! │                        └─────┬─────┘                                    │
//! │              void()          │          return_()                       │
//! │        ┌─────────────────────┴─────────────────────┐                    │
//! │        ▼                                           ▼                    │
//! │   ┌──────────┐                               ┌──────────┐               │
//! │   │  Voided  │  (terminal)                   │ Returned │  (terminal)   │
//! │   └──────────┘                               └──────────┘               │
//! │                                                                         │
//! │  Both transitions demand a non-empty reason and an approver whose       │
//! │  credential verifies against the directory. Totals and line items       │
//! │  never change after completion - a reversal records WHO and WHY,        │
//! │  never a different WHAT.                                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Id Assignment
//! The ledger owns a monotonic sequence. `complete()` takes `&mut self`, so
//! id assignment is atomic by construction: two back-to-back completions can
//! never share a sequence number or sort out of completion order.

use std::collections::BTreeMap;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use tally_core::pricing;
use tally_core::{
    PaymentMethod, Reversal, Transaction, TransactionId, TransactionLine, TransactionStatus,
};

use crate::approval::{ApprovalGate, ApprovalRequest, ApproverDirectory};
use crate::cart::CartAggregator;
use crate::error::{EngineError, EngineResult};

// =============================================================================
// Ledger
// =============================================================================

/// In-session transaction register.
///
/// Holds every transaction completed in this session (plus any restored
/// from the offline store) ordered by completion.
#[derive(Debug)]
pub struct TransactionLedger {
    transactions: BTreeMap<TransactionId, Transaction>,
    next_seq: u64,
    gate: ApprovalGate,
}

impl Default for TransactionLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionLedger {
    /// Creates an empty ledger starting at sequence 1.
    pub fn new() -> Self {
        TransactionLedger {
            transactions: BTreeMap::new(),
            next_seq: 1,
            gate: ApprovalGate::mandatory(),
        }
    }

    /// Restores a ledger from persisted transactions.
    ///
    /// The sequence resumes past the highest restored id so replayed and
    /// new transactions can never collide.
    pub fn with_transactions(transactions: Vec<Transaction>) -> Self {
        let next_seq = transactions
            .iter()
            .map(|t| t.id.seq)
            .max()
            .map(|max| max + 1)
            .unwrap_or(1);

        TransactionLedger {
            transactions: transactions.into_iter().map(|t| (t.id.clone(), t)).collect(),
            next_seq,
            gate: ApprovalGate::mandatory(),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Looks up a transaction by id.
    pub fn get(&self, id: &TransactionId) -> Option<&Transaction> {
        self.transactions.get(id)
    }

    /// All transactions in completion order.
    pub fn transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.transactions.values()
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    // =========================================================================
    // Completion
    // =========================================================================

    /// Completes the cart into a new transaction.
    ///
    /// Snapshots the cart's lines and totals BY VALUE - later cart mutation
    /// can never reach back into the record. On success the cart is cleared;
    /// on failure it is left untouched.
    ///
    /// This is the only way a Transaction comes into existence.
    pub fn complete(
        &mut self,
        cart: &mut CartAggregator,
        payment_method: PaymentMethod,
        payment_reference: Option<String>,
        customer_id: Option<String>,
        cashier_id: impl Into<String>,
    ) -> EngineResult<Transaction> {
        if cart.is_empty() {
            return Err(EngineError::EmptyCart);
        }

        let totals = cart.compute_totals();
        let lines: Vec<TransactionLine> = cart
            .lines()
            .iter()
            .map(|line| TransactionLine {
                product_id: line.product_id.clone(),
                name: line.name.clone(),
                unit_price_minor: line.unit_price_minor,
                quantity: line.quantity,
                line_discount_minor: pricing::line_discount(line).minor(),
            })
            .collect();

        let id = TransactionId {
            seq: self.next_seq,
            token: Uuid::new_v4().to_string(),
        };
        self.next_seq += 1;

        let transaction = Transaction {
            id: id.clone(),
            lines,
            subtotal_minor: totals.subtotal.minor(),
            total_discount_minor: totals.total_discount.minor(),
            total_tax_minor: totals.total_tax.minor(),
            delivery_cost_minor: totals.delivery_cost.minor(),
            total_minor: totals.total.minor(),
            payment_method,
            payment_reference,
            customer_id,
            cashier_id: cashier_id.into(),
            completed_at: Utc::now(),
            status: TransactionStatus::Completed,
            reversal: None,
        };

        info!(
            id = %transaction.id,
            total = %transaction.total(),
            lines = transaction.lines.len(),
            method = %payment_method,
            "Transaction completed"
        );

        self.transactions.insert(id.clone(), transaction);
        cart.clear();

        // The clone the caller receives is a snapshot too
        Ok(self.transactions[&id].clone())
    }

    // =========================================================================
    // Reversals
    // =========================================================================

    /// Voids a completed transaction (cancellation before fulfillment).
    pub fn void(
        &mut self,
        id: &TransactionId,
        request: &ApprovalRequest,
        directory: &dyn ApproverDirectory,
    ) -> EngineResult<Transaction> {
        self.reverse(id, TransactionStatus::Voided, request, directory)
    }

    /// Returns a completed transaction (reversal after fulfillment).
    pub fn return_(
        &mut self,
        id: &TransactionId,
        request: &ApprovalRequest,
        directory: &dyn ApproverDirectory,
    ) -> EngineResult<Transaction> {
        self.reverse(id, TransactionStatus::Returned, request, directory)
    }

    /// Shared reversal path.
    ///
    /// Check order: existence, state, then the approval gate. Every check
    /// runs before the first write, so a failing call leaves the
    /// transaction byte-for-byte unchanged.
    fn reverse(
        &mut self,
        id: &TransactionId,
        target: TransactionStatus,
        request: &ApprovalRequest,
        directory: &dyn ApproverDirectory,
    ) -> EngineResult<Transaction> {
        let transaction = self
            .transactions
            .get_mut(id)
            .ok_or_else(|| EngineError::not_found("Transaction", id.to_string()))?;

        if transaction.status != TransactionStatus::Completed {
            return Err(EngineError::InvalidState {
                id: id.to_string(),
                status: format!("{:?}", transaction.status),
            });
        }

        // Reversals gate on the transaction's own magnitude
        self.gate
            .authorize(transaction.total(), request, directory)?;

        transaction.status = target;
        transaction.reversal = Some(Reversal {
            reason: request.reason.clone(),
            approver: request.approver.clone(),
            approved_at: Utc::now(),
        });

        info!(
            id = %transaction.id,
            status = ?target,
            approver = %request.approver,
            "Transaction reversed"
        );

        Ok(transaction.clone())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
