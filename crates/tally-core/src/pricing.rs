//! # Pricing Calculator
//!
//! Pure functions that turn cart lines, discounts, a tax schedule, and a
//! delivery cost into the money figures shown at checkout.
//!
//! ## The Arithmetic
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Pricing Pipeline                                  │
//! │                                                                         │
//! │  subtotal        = Σ unit_price × quantity                              │
//! │  total_discount  = Σ line_discount(line)                                │
//! │                                                                         │
//! │  tax_base        = subtotal − total_discount      ◄── canonical base    │
//! │  total_tax       = Σ tax_base × rule.rate                               │
//! │                                                                         │
//! │  total = subtotal − total_discount + total_tax + delivery_cost          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Canonical Tax Base
//! Tax is charged on what the customer actually pays for the goods:
//! `subtotal − total_discount`. Every rule in the schedule applies to that
//! same base. This is THE tax formula - there is no second "display"
//! variant anywhere in the engine, so a receipt can never disagree with the
//! charged amount.
//!
//! ## Rounding
//! Each tax term and each percentage discount rounds independently through
//! [`Money::portion_bps`] (half-up, integer minor units). Recomputation is
//! drift-free: the same lines always produce the same figures.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;
use crate::types::{CartLine, Discount, TaxRule};

// =============================================================================
// Cart Totals
// =============================================================================

/// The computed money figures for a cart.
///
/// Satisfies `total = subtotal − total_discount + total_tax + delivery_cost`
/// exactly, in integer minor units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CartTotals {
    pub subtotal: Money,
    pub total_discount: Money,
    pub total_tax: Money,
    pub delivery_cost: Money,
    pub total: Money,
}

impl CartTotals {
    /// Totals of an empty cart.
    pub fn empty() -> Self {
        CartTotals {
            subtotal: Money::zero(),
            total_discount: Money::zero(),
            total_tax: Money::zero(),
            delivery_cost: Money::zero(),
            total: Money::zero(),
        }
    }
}

// =============================================================================
// Line Discount
// =============================================================================

/// Discount amount for a single line.
///
/// - Percentage: `line_total × bps / 10000`, rounded half-up.
/// - Fixed amount: applied once per line, clamped at the line total so the
///   discounted line can never go negative.
/// - No discount: zero.
pub fn line_discount(line: &CartLine) -> Money {
    match &line.discount {
        None => Money::zero(),
        Some(Discount::Percentage { bps, .. }) => line.line_total().portion_bps(*bps),
        Some(Discount::FixedAmount { amount, .. }) => (*amount).min(line.line_total()),
    }
}

// =============================================================================
// Totals Computation
// =============================================================================

/// Total tax for a given base across the whole schedule.
///
/// Each rule's term rounds independently; the terms are then summed.
pub fn tax_total(base: Money, schedule: &[TaxRule]) -> Money {
    schedule
        .iter()
        .map(|rule| base.portion_bps(rule.rate.bps()))
        .sum()
}

/// Computes the full totals for a set of cart lines.
///
/// Pure: no side effects, no I/O, no clock. Callers validate lines before
/// invoking (a quantity below 1 never reaches this function).
///
/// ```rust
/// use tally_core::money::Money;
/// use tally_core::pricing::compute_totals;
/// use tally_core::types::{CartLine, Product, TaxRate, TaxRule};
///
/// let product = Product {
///     id: "p-1".into(),
///     sku: "SKU-1".into(),
///     name: "Widget".into(),
///     unit_price_minor: 1000,
///     unit_cost_minor: None,
///     current_stock: None,
///     is_active: true,
/// };
/// let lines = vec![CartLine::from_product(&product, 2, chrono::Utc::now())];
/// let schedule = vec![TaxRule {
///     name: "Sales tax".into(),
///     rate: TaxRate::from_bps(750),
///     description: String::new(),
/// }];
///
/// let totals = compute_totals(&lines, &schedule, Money::zero());
/// assert_eq!(totals.subtotal.minor(), 2000);
/// assert_eq!(totals.total_tax.minor(), 150);
/// assert_eq!(totals.total.minor(), 2150);
/// ```
pub fn compute_totals(lines: &[CartLine], schedule: &[TaxRule], delivery_cost: Money) -> CartTotals {
    let subtotal: Money = lines.iter().map(CartLine::line_total).sum();
    let total_discount: Money = lines.iter().map(line_discount).sum();

    let tax_base = subtotal - total_discount;
    let total_tax = tax_total(tax_base, schedule);

    CartTotals {
        subtotal,
        total_discount,
        total_tax,
        delivery_cost,
        total: subtotal - total_discount + total_tax + delivery_cost,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Discount, Product, TaxRate};
    use chrono::Utc;

    fn product(id: &str, price_minor: i64) -> Product {
        Product {
            id: id.to_string(),
            sku: format!("SKU-{}", id),
            name: format!("Product {}", id),
            unit_price_minor: price_minor,
            unit_cost_minor: None,
            current_stock: None,
            is_active: true,
        }
    }

    fn line(id: &str, price_minor: i64, qty: i64) -> CartLine {
        CartLine::from_product(&product(id, price_minor), qty, Utc::now())
    }

    fn schedule(bps: u32) -> Vec<TaxRule> {
        vec![TaxRule {
            name: "Sales tax".into(),
            rate: TaxRate::from_bps(bps),
            description: String::new(),
        }]
    }

    #[test]
    fn test_checkout_example_no_discount_no_delivery() {
        // 2 × 1000 + 1 × 500 at 7.5% tax
        let lines = vec![line("a", 1000, 2), line("b", 500, 1)];
        let totals = compute_totals(&lines, &schedule(750), Money::zero());

        assert_eq!(totals.subtotal.minor(), 2500);
        assert_eq!(totals.total_discount.minor(), 0);
        // 2500 × 7.5% = 187.5 → 188 (half rounds up)
        assert_eq!(totals.total_tax.minor(), 188);
        assert_eq!(totals.total.minor(), 2688);
    }

    #[test]
    fn test_percentage_discount_reduces_tax_base() {
        let mut l = line("a", 1000, 2);
        l.discount = Some(Discount::percentage(1000, "Loyalty")); // 10%
        let totals = compute_totals(&[l], &schedule(1000), Money::zero());

        assert_eq!(totals.subtotal.minor(), 2000);
        assert_eq!(totals.total_discount.minor(), 200);
        // Tax on 1800, not 2000
        assert_eq!(totals.total_tax.minor(), 180);
        assert_eq!(totals.total.minor(), 1980);
    }

    #[test]
    fn test_fixed_discount_applies_once_per_line() {
        let mut l = line("a", 1000, 3);
        l.discount = Some(Discount::fixed(Money::from_minor(500), "Coupon"));
        let totals = compute_totals(&[l], &[], Money::zero());

        assert_eq!(totals.subtotal.minor(), 3000);
        assert_eq!(totals.total_discount.minor(), 500);
        assert_eq!(totals.total.minor(), 2500);
    }

    #[test]
    fn test_fixed_discount_clamped_at_line_total() {
        let mut l = line("a", 300, 1);
        l.discount = Some(Discount::fixed(Money::from_minor(1000), "Oversized coupon"));
        let totals = compute_totals(&[l], &[], Money::zero());

        // Clamped: the line discounts to zero, never negative
        assert_eq!(totals.total_discount.minor(), 300);
        assert_eq!(totals.total.minor(), 0);
    }

    #[test]
    fn test_multiple_tax_rules_share_one_base() {
        let mut l = line("a", 10_000, 1);
        l.discount = Some(Discount::percentage(2000, "Clearance")); // 20%
        let rules = vec![
            TaxRule {
                name: "State".into(),
                rate: TaxRate::from_bps(500),
                description: String::new(),
            },
            TaxRule {
                name: "City".into(),
                rate: TaxRate::from_bps(250),
                description: String::new(),
            },
        ];
        let totals = compute_totals(&[l], &rules, Money::zero());

        // Base is 8000 for both rules: 400 + 200
        assert_eq!(totals.total_tax.minor(), 600);
    }

    #[test]
    fn test_delivery_cost_enters_total_not_tax() {
        let lines = vec![line("a", 1000, 1)];
        let totals = compute_totals(&lines, &schedule(1000), Money::from_minor(700));

        assert_eq!(totals.total_tax.minor(), 100);
        assert_eq!(totals.delivery_cost.minor(), 700);
        assert_eq!(totals.total.minor(), 1800);
    }

    #[test]
    fn test_totals_identity_holds() {
        let mut a = line("a", 1399, 3);
        a.discount = Some(Discount::percentage(1500, "Promo"));
        let mut b = line("b", 89, 7);
        b.discount = Some(Discount::fixed(Money::from_minor(120), "Coupon"));
        let lines = vec![a, b, line("c", 2750, 1)];

        let totals = compute_totals(&lines, &schedule(825), Money::from_minor(450));
        assert_eq!(
            totals.total,
            totals.subtotal - totals.total_discount + totals.total_tax + totals.delivery_cost
        );
    }

    #[test]
    fn test_recomputation_is_drift_free() {
        let lines = vec![line("a", 999, 3), line("b", 1234, 2)];
        let first = compute_totals(&lines, &schedule(750), Money::zero());
        for _ in 0..1000 {
            assert_eq!(compute_totals(&lines, &schedule(750), Money::zero()), first);
        }
    }

    #[test]
    fn test_empty_cart() {
        let totals = compute_totals(&[], &schedule(750), Money::zero());
        assert_eq!(totals, CartTotals::empty());
    }
}
