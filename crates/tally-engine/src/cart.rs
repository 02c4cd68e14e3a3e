//! # Cart Aggregator
//!
//! The mutable checkout session: cart lines plus the current delivery
//! selection, re-priced and re-ranked on every mutation.
//!
//! ## Mutation Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Cart Aggregator Operations                           │
//! │                                                                         │
//! │  Shell Action              Aggregator Call         State Change         │
//! │  ────────────              ───────────────         ────────────         │
//! │  Tap product ────────────► add_item() ───────────► merge or push line   │
//! │  Change quantity ────────► update_quantity() ────► line.quantity = n    │
//! │  Apply promo ────────────► apply_discount() ─────► line.discount = d    │
//! │  Pick courier ───────────► set_delivery_quote() ─► manual selection     │
//! │  Remove line ────────────► remove_item() ────────► line dropped         │
//! │                                                                         │
//! │  EVERY mutation ends in rescore(): the delivery ranking and the         │
//! │  selected quote are recomputed synchronously, because cart weight       │
//! │  drives both the quoted cost and the score.                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quantity Policy
//! A quantity below 1 is rejected with a validation error - everywhere.
//! There is no code path that silently coerces bad input to 1.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use tally_core::pricing;
use tally_core::validation::{validate_amount_minor, validate_cart_size, validate_quantity, validate_rate_bps};
use tally_core::{
    CartLine, CartTotals, CoreError, DeliveryProvider, DeliveryQuote, DeliveryScorer, Discount,
    Money, Product, TaxRule, MAX_LINE_QUANTITY,
};

use crate::error::{EngineError, EngineResult};

// =============================================================================
// Delivery Selection
// =============================================================================

/// How the cart's delivery quote is being chosen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DeliverySelection {
    /// Smart selection: the top-ranked quote wins (when enabled).
    Auto,

    /// The operator picked a specific provider. The quote is still
    /// re-priced against the current cart on every mutation.
    Manual { provider_id: String },

    /// The operator explicitly declined delivery.
    Suppressed,
}

// =============================================================================
// Cart Aggregator
// =============================================================================

/// Session-scoped cart state.
///
/// ## Invariants
/// - Lines are unique by `product_id` (adding the same product merges
///   quantities)
/// - `quantity >= 1` on every line
/// - The cached ranking and selected quote are always consistent with the
///   current lines (rescored on every mutation)
#[derive(Debug)]
pub struct CartAggregator {
    lines: Vec<CartLine>,

    tax_schedule: Vec<TaxRule>,
    providers: Vec<DeliveryProvider>,
    scorer: DeliveryScorer,

    /// When true, Auto mode selects the top-ranked quote.
    smart_selection: bool,

    selection: DeliverySelection,
    ranking: Vec<DeliveryQuote>,
    selected: Option<DeliveryQuote>,
}

impl CartAggregator {
    /// Creates an empty cart bound to a tax schedule, provider list, and
    /// scorer.
    pub fn new(
        tax_schedule: Vec<TaxRule>,
        providers: Vec<DeliveryProvider>,
        scorer: DeliveryScorer,
        smart_selection: bool,
    ) -> Self {
        CartAggregator {
            lines: Vec::new(),
            tax_schedule,
            providers,
            scorer,
            smart_selection,
            selection: DeliverySelection::Auto,
            ranking: Vec::new(),
            selected: None,
        }
    }

    /// Restores a cart from previously persisted lines.
    pub fn with_lines(mut self, lines: Vec<CartLine>) -> Self {
        self.lines = lines;
        self.rescore();
        self
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Number of distinct lines.
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Total quantity across all lines.
    pub fn total_quantity(&self) -> i64 {
        self.lines.iter().map(|l| l.quantity).sum()
    }

    /// Current delivery ranking, best first.
    pub fn ranking(&self) -> &[DeliveryQuote] {
        &self.ranking
    }

    /// The quote feeding the delivery cost, if any.
    pub fn selected_quote(&self) -> Option<&DeliveryQuote> {
        self.selected.as_ref()
    }

    /// Current selection mode.
    pub fn delivery_selection(&self) -> &DeliverySelection {
        &self.selection
    }

    // =========================================================================
    // Line Mutations
    // =========================================================================

    /// Adds a product to the cart or merges into the existing line.
    ///
    /// The product's sku, name, and price are frozen into the line at this
    /// moment.
    pub fn add_item(&mut self, product: &Product, quantity: i64) -> EngineResult<()> {
        validate_quantity(quantity)?;

        if let Some(line) = self.lines.iter_mut().find(|l| l.product_id == product.id) {
            let new_qty = line.quantity + quantity;
            if new_qty > MAX_LINE_QUANTITY {
                return Err(CoreError::QuantityTooLarge {
                    requested: new_qty,
                    max: MAX_LINE_QUANTITY,
                }
                .into());
            }
            line.quantity = new_qty;
            debug!(product_id = %product.id, quantity = new_qty, "Merged cart line");
        } else {
            validate_cart_size(self.lines.len())?;
            self.lines
                .push(CartLine::from_product(product, quantity, Utc::now()));
            debug!(product_id = %product.id, quantity, "Added cart line");
        }

        self.rescore();
        Ok(())
    }

    /// Removes a line by product id. Absent lines are a no-op, not an error.
    pub fn remove_item(&mut self, product_id: &str) {
        let before = self.lines.len();
        self.lines.retain(|l| l.product_id != product_id);
        if self.lines.len() != before {
            debug!(product_id, "Removed cart line");
            self.rescore();
        }
    }

    /// Sets the quantity of an existing line.
    ///
    /// Rejects quantities below 1. Dropping a line is `remove_item`, not a
    /// zero quantity.
    pub fn update_quantity(&mut self, product_id: &str, quantity: i64) -> EngineResult<()> {
        validate_quantity(quantity)?;

        let line = self
            .lines
            .iter_mut()
            .find(|l| l.product_id == product_id)
            .ok_or_else(|| CoreError::LineNotFound(product_id.to_string()))
            .map_err(EngineError::from)?;

        line.quantity = quantity;
        self.rescore();
        Ok(())
    }

    /// Attaches a discount to an existing line, replacing any previous one.
    pub fn apply_discount(&mut self, product_id: &str, discount: Discount) -> EngineResult<()> {
        match &discount {
            Discount::Percentage { bps, .. } => validate_rate_bps(*bps)?,
            Discount::FixedAmount { amount, .. } => validate_amount_minor(amount.minor())?,
        }

        let line = self
            .lines
            .iter_mut()
            .find(|l| l.product_id == product_id)
            .ok_or_else(|| CoreError::LineNotFound(product_id.to_string()))
            .map_err(EngineError::from)?;

        debug!(product_id, description = %discount.description(), "Applied line discount");
        line.discount = Some(discount);
        self.rescore();
        Ok(())
    }

    /// Clears the discount on an existing line.
    pub fn remove_discount(&mut self, product_id: &str) -> EngineResult<()> {
        let line = self
            .lines
            .iter_mut()
            .find(|l| l.product_id == product_id)
            .ok_or_else(|| CoreError::LineNotFound(product_id.to_string()))
            .map_err(EngineError::from)?;

        line.discount = None;
        self.rescore();
        Ok(())
    }

    // =========================================================================
    // Delivery Selection
    // =========================================================================

    /// Overrides the scorer's automatic selection.
    ///
    /// - `Some(quote)` pins the quote's provider; the cost is still
    ///   re-quoted against the current cart on later mutations.
    /// - `None` suppresses delivery entirely (delivery cost 0).
    pub fn set_delivery_quote(&mut self, quote: Option<DeliveryQuote>) -> EngineResult<()> {
        match quote {
            Some(quote) => {
                if !self.ranking.iter().any(|q| q.provider_id == quote.provider_id) {
                    return Err(EngineError::not_found("Delivery provider", quote.provider_id));
                }
                self.selection = DeliverySelection::Manual {
                    provider_id: quote.provider_id,
                };
            }
            None => {
                self.selection = DeliverySelection::Suppressed;
            }
        }
        self.rescore();
        Ok(())
    }

    /// Returns delivery selection to automatic mode.
    pub fn reset_delivery_selection(&mut self) {
        self.selection = DeliverySelection::Auto;
        self.rescore();
    }

    // =========================================================================
    // Totals & Lifecycle
    // =========================================================================

    /// Computes the current totals. Side-effect free.
    pub fn compute_totals(&self) -> CartTotals {
        let delivery_cost = self
            .selected
            .as_ref()
            .map(|q| q.estimated_cost)
            .unwrap_or_else(Money::zero);

        pricing::compute_totals(&self.lines, &self.tax_schedule, delivery_cost)
    }

    /// Empties the cart and resets the delivery selection.
    ///
    /// Called by the ledger after a successful completion; also available
    /// to the shell for an explicit "clear cart" action.
    pub fn clear(&mut self) {
        self.lines.clear();
        self.selection = DeliverySelection::Auto;
        self.rescore();
    }

    /// Recomputes the delivery ranking and the selected quote.
    ///
    /// An empty cart has nothing to deliver: ranking and selection are
    /// emptied rather than quoting a zero-weight shipment.
    fn rescore(&mut self) {
        if self.lines.is_empty() {
            self.ranking = Vec::new();
            self.selected = None;
            return;
        }

        self.ranking = self.scorer.rank(&self.providers, &self.lines);

        self.selected = match &self.selection {
            DeliverySelection::Suppressed => None,
            DeliverySelection::Manual { provider_id } => self
                .ranking
                .iter()
                .find(|q| &q.provider_id == provider_id)
                .cloned(),
            DeliverySelection::Auto => {
                if self.smart_selection {
                    self.ranking.first().cloned()
                } else {
                    None
                }
            }
        };
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::{DeliveryKind, ScorerConfig, TaxRate};

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

    fn provider(id: &str, kind: DeliveryKind, base_rate: i64) -> DeliveryProvider {
        DeliveryProvider {
            id: id.to_string(),
            name: format!("Provider {}", id),
            kind,
            base_rate: Money::from_minor(base_rate),
            enabled: true,
            service_areas: vec![],
        }
    }

    fn schedule(bps: u32) -> Vec<TaxRule> {
        vec![TaxRule {
            name: "Sales tax".into(),
            rate: TaxRate::from_bps(bps),
            description: String::new(),
        }]
    }

    fn cart_with_providers(smart: bool) -> CartAggregator {
        CartAggregator::new(
            schedule(750),
            vec![
                provider("local-1", DeliveryKind::Local, 1500),
                provider("intl-1", DeliveryKind::International, 8500),
            ],
            DeliveryScorer::new(ScorerConfig::default()),
            smart,
        )
    }

    fn bare_cart() -> CartAggregator {
        CartAggregator::new(schedule(750), vec![], DeliveryScorer::default(), false)
    }

    #[test]
    fn test_add_same_product_merges_quantities() {
        let mut cart = bare_cart();
        let p = product("p-1", 1000);

        cart.add_item(&p, 2).unwrap();
        cart.add_item(&p, 3).unwrap();

        assert_eq!(cart.line_count(), 1);
        assert_eq!(cart.lines()[0].quantity, 5);
    }

    #[test]
    fn test_add_rejects_non_positive_quantity() {
        let mut cart = bare_cart();
        assert!(cart.add_item(&product("p-1", 1000), 0).is_err());
        assert!(cart.add_item(&product("p-1", 1000), -2).is_err());
        assert!(cart.is_empty());
    }

    #[test]
    fn test_update_quantity_rejects_below_one() {
        let mut cart = bare_cart();
        cart.add_item(&product("p-1", 1000), 2).unwrap();

        let err = cart.update_quantity("p-1", 0).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        // Rejected, not clamped: the line is untouched
        assert_eq!(cart.lines()[0].quantity, 2);
    }

    #[test]
    fn test_update_quantity_unknown_line() {
        let mut cart = bare_cart();
        let err = cart.update_quantity("ghost", 3).unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }

    #[test]
    fn test_remove_absent_line_is_noop() {
        let mut cart = bare_cart();
        cart.add_item(&product("p-1", 1000), 1).unwrap();
        cart.remove_item("ghost");
        assert_eq!(cart.line_count(), 1);
    }

    #[test]
    fn test_discount_on_unknown_line() {
        let mut cart = bare_cart();
        let err = cart
            .apply_discount("ghost", Discount::percentage(1000, "Promo"))
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }

    #[test]
    fn test_remove_discount_restores_full_price() {
        let mut cart = bare_cart();
        cart.add_item(&product("p-1", 1000), 1).unwrap();
        cart.apply_discount("p-1", Discount::percentage(1000, "Promo"))
            .unwrap();
        assert_eq!(cart.compute_totals().total_discount.minor(), 100);

        cart.remove_discount("p-1").unwrap();
        assert_eq!(cart.compute_totals().total_discount.minor(), 0);
    }

    #[test]
    fn test_checkout_example_totals() {
        // 2 × 1000 + 1 × 500 at 7.5%, no discount, no delivery
        let mut cart = bare_cart();
        cart.add_item(&product("a", 1000), 2).unwrap();
        cart.add_item(&product("b", 500), 1).unwrap();

        let totals = cart.compute_totals();
        assert_eq!(totals.subtotal.minor(), 2500);
        assert_eq!(totals.total_tax.minor(), 188);
        assert_eq!(totals.total.minor(), 2688);
    }

    #[test]
    fn test_smart_selection_picks_top_quote() {
        let mut cart = cart_with_providers(true);
        cart.add_item(&product("p-1", 1000), 2).unwrap();

        let selected = cart.selected_quote().expect("auto-selected quote");
        assert_eq!(selected.provider_id, "local-1");

        // Delivery cost flows into the totals
        let totals = cart.compute_totals();
        assert_eq!(totals.delivery_cost, selected.estimated_cost);
    }

    #[test]
    fn test_smart_selection_disabled_honors_manual_choice() {
        let mut cart = cart_with_providers(false);
        cart.add_item(&product("p-1", 1000), 2).unwrap();
        assert!(cart.selected_quote().is_none());

        let intl = cart
            .ranking()
            .iter()
            .find(|q| q.provider_id == "intl-1")
            .cloned()
            .unwrap();
        cart.set_delivery_quote(Some(intl)).unwrap();
        assert_eq!(cart.selected_quote().unwrap().provider_id, "intl-1");
    }

    #[test]
    fn test_manual_selection_requoted_on_cart_change() {
        let mut cart = cart_with_providers(false);
        cart.add_item(&product("p-1", 1000), 2).unwrap();
        let intl = cart.ranking()[1].clone();
        cart.set_delivery_quote(Some(intl)).unwrap();
        let cost_before = cart.selected_quote().unwrap().estimated_cost;

        // Doubling the quantity doubles the weight surcharge
        cart.update_quantity("p-1", 4).unwrap();
        let cost_after = cart.selected_quote().unwrap().estimated_cost;
        assert!(cost_after > cost_before);
        assert_eq!(cart.selected_quote().unwrap().provider_id, "intl-1");
    }

    #[test]
    fn test_suppressed_delivery_costs_nothing() {
        let mut cart = cart_with_providers(true);
        cart.add_item(&product("p-1", 1000), 2).unwrap();
        assert!(cart.selected_quote().is_some());

        cart.set_delivery_quote(None).unwrap();
        assert!(cart.selected_quote().is_none());
        assert_eq!(cart.compute_totals().delivery_cost.minor(), 0);

        // And back to automatic
        cart.reset_delivery_selection();
        assert!(cart.selected_quote().is_some());
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let mut cart = cart_with_providers(true);
        cart.add_item(&product("p-1", 1000), 1).unwrap();

        let mut ghost = cart.ranking()[0].clone();
        ghost.provider_id = "ghost".into();
        assert!(matches!(
            cart.set_delivery_quote(Some(ghost)).unwrap_err(),
            EngineError::NotFound { .. }
        ));
    }

    #[test]
    fn test_no_providers_means_no_ranking_no_cost() {
        let mut cart = bare_cart();
        cart.add_item(&product("p-1", 1000), 1).unwrap();
        assert!(cart.ranking().is_empty());
        assert!(cart.selected_quote().is_none());
        assert_eq!(cart.compute_totals().delivery_cost.minor(), 0);
    }

    #[test]
    fn test_with_lines_restores_and_rescores() {
        let mut original = cart_with_providers(true);
        original.add_item(&product("p-1", 1000), 3).unwrap();
        let persisted = original.lines().to_vec();

        // A fresh session restored from the persisted lines prices and
        // ranks exactly like the one that wrote them
        let restored = cart_with_providers(true).with_lines(persisted);
        assert_eq!(restored.line_count(), 1);
        assert_eq!(restored.compute_totals(), original.compute_totals());
        assert_eq!(
            restored.selected_quote().unwrap().provider_id,
            original.selected_quote().unwrap().provider_id
        );
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut cart = cart_with_providers(true);
        cart.add_item(&product("p-1", 1000), 2).unwrap();
        cart.set_delivery_quote(None).unwrap();

        cart.clear();
        assert!(cart.is_empty());
        assert!(cart.selected_quote().is_none());
        assert_eq!(*cart.delivery_selection(), DeliverySelection::Auto);
    }
}
