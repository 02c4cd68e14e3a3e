//! # Domain Types
//!
//! Core domain types used throughout the Tally checkout engine.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │    CartLine     │   │   Transaction   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id             │   │  product_id     │   │  id (seq+uuid)  │       │
//! │  │  sku, name      │   │  frozen price   │   │  frozen lines   │       │
//! │  │  unit_price     │   │  quantity ≥ 1   │   │  frozen totals  │       │
//! │  │  current_stock  │   │  discount?      │   │  status         │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    TaxRule      │   │    Discount     │   │ PaymentMethod   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  rate (bps)     │   │  Percentage     │   │  Cash           │       │
//! │  │  750 = 7.5%     │   │  FixedAmount    │   │  Card           │       │
//! │  └─────────────────┘   └─────────────────┘   │  BankTransfer   │       │
//! │                                              └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Snapshot Pattern
//! A `CartLine` freezes the product's sku, name, and unit price at the
//! moment it enters the cart; a `Transaction` freezes the cart lines and
//! totals at the moment of completion. Catalog updates after either point
//! never reach back into existing lines or completed transactions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate represented in basis points (bps).
///
/// ## Why Basis Points?
/// 1 basis point = 0.01% = 1/10000
/// 750 bps = 7.5%
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxRate(u32);

impl TaxRate {
    /// Creates a tax rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    /// Creates a tax rate from a percentage (for convenience).
    pub fn from_percentage(pct: f64) -> Self {
        TaxRate((pct * 100.0).round() as u32)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Zero tax rate.
    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate::zero()
    }
}

// =============================================================================
// Product
// =============================================================================

/// A product as published by the catalog collaborator.
///
/// Read-only inside this engine: the catalog service owns these records,
/// the engine only snapshots them into cart lines and keeps a local copy
/// of the catalog for offline operation.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Product {
    /// Unique identifier.
    pub id: String,

    /// Stock Keeping Unit - business identifier.
    pub sku: String,

    /// Display name shown to cashier and on receipt.
    pub name: String,

    /// Selling price in minor units.
    pub unit_price_minor: i64,

    /// Unit cost in minor units (for margin reporting).
    pub unit_cost_minor: Option<i64>,

    /// Current stock level, if tracked.
    pub current_stock: Option<i64>,

    /// Whether product is active (soft delete).
    pub is_active: bool,
}

impl Product {
    /// Returns the selling price as a Money type.
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_minor(self.unit_price_minor)
    }
}

// =============================================================================
// Discount
// =============================================================================

/// A discount attached to a cart line.
///
/// A closed set of kinds, both fully implemented by the pricing math.
/// Absence of a discount is `Option::<Discount>::None` on the line, never a
/// zero-valued discount instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Discount {
    /// Percentage off the line total, in basis points (1000 = 10%).
    Percentage {
        bps: u32,
        /// Reason shown on the receipt ("Manager special", ...).
        description: String,
    },

    /// Fixed amount off the line, applied once per line and clamped at the
    /// line total so a line can never price below zero.
    FixedAmount {
        amount: Money,
        /// Reason shown on the receipt.
        description: String,
    },
}

impl Discount {
    /// Percentage discount constructor.
    pub fn percentage(bps: u32, description: impl Into<String>) -> Self {
        Discount::Percentage {
            bps,
            description: description.into(),
        }
    }

    /// Fixed-amount discount constructor.
    pub fn fixed(amount: Money, description: impl Into<String>) -> Self {
        Discount::FixedAmount {
            amount,
            description: description.into(),
        }
    }

    /// The receipt-facing description.
    pub fn description(&self) -> &str {
        match self {
            Discount::Percentage { description, .. } => description,
            Discount::FixedAmount { description, .. } => description,
        }
    }
}

// =============================================================================
// Tax Rule
// =============================================================================

/// One entry in the tax schedule.
///
/// The schedule is an ordered list; every rule applies to the same canonical
/// base (see the pricing module for the base definition).
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxRule {
    /// Short name ("VAT", "City levy").
    pub name: String,

    /// Rate in basis points.
    pub rate: TaxRate,

    /// Longer description for configuration screens.
    #[serde(default)]
    pub description: String,
}

// =============================================================================
// Cart Line
// =============================================================================

/// One product entry in the active cart.
///
/// ## Invariants
/// - `quantity >= 1` at all times the line exists (a zero-quantity line is
///   removed, never kept)
/// - sku, name, and unit price are frozen at creation time
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CartLine {
    /// Product ID (reference back into the catalog).
    pub product_id: String,

    /// SKU at time of adding (frozen).
    pub sku: String,

    /// Product name at time of adding (frozen).
    pub name: String,

    /// Price in minor units at time of adding (frozen).
    pub unit_price_minor: i64,

    /// Quantity in cart. Always >= 1.
    pub quantity: i64,

    /// Optional discount on this line.
    pub discount: Option<Discount>,

    /// When this line was created.
    #[ts(as = "String")]
    pub added_at: DateTime<Utc>,
}

impl CartLine {
    /// Creates a new cart line from a product, freezing its identity and
    /// price.
    pub fn from_product(product: &Product, quantity: i64, added_at: DateTime<Utc>) -> Self {
        CartLine {
            product_id: product.id.clone(),
            sku: product.sku.clone(),
            name: product.name.clone(),
            unit_price_minor: product.unit_price_minor,
            quantity,
            discount: None,
            added_at,
        }
    }

    /// Returns the frozen unit price as Money.
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_minor(self.unit_price_minor)
    }

    /// Line total before discount and tax (unit price × quantity).
    #[inline]
    pub fn line_total(&self) -> Money {
        self.unit_price().multiply_quantity(self.quantity)
    }
}

// =============================================================================
// Payment Method
// =============================================================================

/// How a transaction was paid.
///
/// A closed set: there is no raw-integer encoding anywhere, so an invalid
/// method cannot be represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Physical cash payment.
    Cash,
    /// Card payment on the terminal.
    Card,
    /// Bank transfer captured at the counter.
    BankTransfer,
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentMethod::Cash => write!(f, "cash"),
            PaymentMethod::Card => write!(f, "card"),
            PaymentMethod::BankTransfer => write!(f, "bank_transfer"),
        }
    }
}

// =============================================================================
// Transaction Status
// =============================================================================

/// The status of a completed transaction.
///
/// ## Legal Transitions
/// ```text
/// Completed ──► Voided    (terminal)
/// Completed ──► Returned  (terminal)
/// ```
/// Nothing else. A transaction is born Completed; Voided and Returned can
/// never transition again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Paid and finalized.
    Completed,
    /// Cancelled before fulfillment.
    Voided,
    /// Reversed after fulfillment.
    Returned,
}

// =============================================================================
// Transaction Id
// =============================================================================

/// Transaction identifier: a monotonic sequence number plus a random token.
///
/// ## Why Not a Timestamp?
/// Two checkouts in the same millisecond would collide or sort arbitrarily.
/// The sequence number makes ids unique and totally ordered by completion;
/// the token makes them globally unique across devices that each run their
/// own sequence.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[ts(export)]
pub struct TransactionId {
    /// Position in the completion order. Field order matters: the derived
    /// `Ord` compares `seq` first.
    pub seq: u64,

    /// Random UUID v4 token assigned by the ledger.
    pub token: String,
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TXN-{:010}-{}", self.seq, self.token)
    }
}

// =============================================================================
// Transaction
// =============================================================================

/// A line item frozen into a transaction.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TransactionLine {
    pub product_id: String,

    /// Product name at time of sale (frozen).
    pub name: String,

    /// Unit price in minor units at time of sale (frozen).
    pub unit_price_minor: i64,

    /// Quantity sold.
    pub quantity: i64,

    /// Discount amount applied to this line, in minor units.
    pub line_discount_minor: i64,
}

impl TransactionLine {
    /// Returns the frozen unit price as Money.
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_minor(self.unit_price_minor)
    }

    /// Returns the line discount as Money.
    #[inline]
    pub fn line_discount(&self) -> Money {
        Money::from_minor(self.line_discount_minor)
    }
}

/// Reversal details, present exactly when status is Voided or Returned.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Reversal {
    /// Why the transaction was reversed. Never empty.
    pub reason: String,

    /// Identity of the approver who authorized the reversal. Never empty.
    pub approver: String,

    /// When the reversal was approved.
    #[ts(as = "String")]
    pub approved_at: DateTime<Utc>,
}

/// A completed (and possibly later reversed) transaction.
///
/// ## Immutability Contract
/// Created once, at checkout. Afterwards only `status` and `reversal` may
/// change, and only through the ledger's approval-gated operations. Line
/// items and every monetary total are frozen forever - reversing a
/// transaction records WHO and WHY, it never rewrites WHAT was sold.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Transaction {
    pub id: TransactionId,

    /// Cart lines at completion time (values, not references).
    pub lines: Vec<TransactionLine>,

    /// Sum of line totals before discounts, minor units.
    pub subtotal_minor: i64,

    /// Total discount across all lines, minor units.
    pub total_discount_minor: i64,

    /// Total tax, minor units.
    pub total_tax_minor: i64,

    /// Delivery cost, minor units. Zero when no delivery was selected.
    pub delivery_cost_minor: i64,

    /// Grand total, minor units.
    pub total_minor: i64,

    /// How the customer paid.
    pub payment_method: PaymentMethod,

    /// Reference returned by the payment device, if any.
    pub payment_reference: Option<String>,

    /// Optional customer identity for attribution.
    pub customer_id: Option<String>,

    /// Cashier who rang the sale.
    pub cashier_id: String,

    /// When the transaction completed.
    #[ts(as = "String")]
    pub completed_at: DateTime<Utc>,

    /// Lifecycle status.
    pub status: TransactionStatus,

    /// Populated exactly when status != Completed.
    pub reversal: Option<Reversal>,
}

impl Transaction {
    /// Returns the grand total as Money.
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_minor(self.total_minor)
    }

    /// True while the transaction is in its original Completed state.
    #[inline]
    pub fn is_completed(&self) -> bool {
        self.status == TransactionStatus::Completed
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
