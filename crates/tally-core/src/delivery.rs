//! # Delivery Scoring
//!
//! Ranks delivery providers against the current cart and produces
//! selectable quotes.
//!
//! ## Scoring Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Delivery Scoring                                   │
//! │                                                                         │
//! │  estimated_weight = Σ quantity × per_item_weight                        │
//! │                                                                         │
//! │  For each enabled provider:                                             │
//! │    estimated_cost  = base_rate + weight × surcharge                     │
//! │    normalized_cost = 1 − base_rate / cost_divisor    (cheaper → ~1)     │
//! │    score           = normalized_cost × cost_weight                      │
//! │                      + speed_factor(kind) × speed_weight                │
//! │                                                                         │
//! │  Sort descending by score, ties broken by provider id.                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Scores are comparison keys, not money: f64 is fine here because nothing
//! monetary is derived from a score. Costs stay in integer [`Money`].
//!
//! Ranking is deterministic and idempotent: identical providers + identical
//! cart lines always produce the same ordered ranking.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;
use crate::types::CartLine;

// =============================================================================
// Provider Types
// =============================================================================

/// The class of a delivery provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryKind {
    /// Same-city courier.
    Local,
    /// Cross-border carrier.
    International,
    /// Store-specific arrangement (own van, partner pickup, ...).
    Custom,
}

/// A delivery provider as configured for the store.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DeliveryProvider {
    /// Unique identifier. Also the deterministic tie-breaker in rankings.
    pub id: String,

    /// Display name.
    pub name: String,

    /// Provider class, keys the speed factor and time label.
    pub kind: DeliveryKind,

    /// Flat rate before weight surcharges, minor units.
    pub base_rate: Money,

    /// Disabled providers are excluded from every ranking.
    pub enabled: bool,

    /// Areas this provider serves (informational).
    #[serde(default)]
    pub service_areas: Vec<String>,
}

/// A provider-specific cost/time estimate for the current cart.
///
/// Derived, never persisted: quotes are recomputed whenever the cart
/// changes, because cost and score depend on cart weight.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryQuote {
    pub provider_id: String,
    pub provider_name: String,
    pub kind: DeliveryKind,

    /// Estimated cost for this cart, minor units.
    pub estimated_cost: Money,

    /// Human-readable time estimate ("1-3 days").
    pub estimated_time: String,

    /// Composite desirability score. Higher is better.
    pub score: f64,
}

// =============================================================================
// Scorer Configuration
// =============================================================================

/// Tunable constants for the scorer.
///
/// All fields have store-agnostic defaults; a store overrides them in its
/// engine configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorerConfig {
    /// Weight-units contributed by one unit of quantity.
    #[serde(default = "default_per_item_weight")]
    pub per_item_weight: f64,

    /// Surcharge per weight-unit, minor units.
    #[serde(default = "default_weight_surcharge")]
    pub weight_surcharge: Money,

    /// Divisor normalizing base rates into [0, 1] territory.
    #[serde(default = "default_cost_divisor")]
    pub cost_divisor: i64,

    /// Weight of the cost component in the composite score.
    #[serde(default = "default_cost_weight")]
    pub cost_weight: f64,

    /// Weight of the speed component in the composite score.
    #[serde(default = "default_speed_weight")]
    pub speed_weight: f64,

    /// Speed factor per provider kind (1.0 = fastest class).
    #[serde(default)]
    pub speed_factors: SpeedFactors,

    /// Time label per provider kind.
    #[serde(default)]
    pub time_labels: TimeLabels,
}

/// Speed factors keyed by provider kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeedFactors {
    #[serde(default = "default_local_speed")]
    pub local: f64,
    #[serde(default = "default_international_speed")]
    pub international: f64,
    #[serde(default = "default_custom_speed")]
    pub custom: f64,
}

/// Time labels keyed by provider kind. Configuration data, not computed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeLabels {
    #[serde(default = "default_local_label")]
    pub local: String,
    #[serde(default = "default_international_label")]
    pub international: String,
    #[serde(default = "default_custom_label")]
    pub custom: String,
}

fn default_per_item_weight() -> f64 {
    0.5
}
fn default_weight_surcharge() -> Money {
    Money::from_minor(200)
}
fn default_cost_divisor() -> i64 {
    10_000
}
fn default_cost_weight() -> f64 {
    0.6
}
fn default_speed_weight() -> f64 {
    0.4
}
fn default_local_speed() -> f64 {
    1.0
}
fn default_international_speed() -> f64 {
    0.7
}
fn default_custom_speed() -> f64 {
    0.85
}
fn default_local_label() -> String {
    "1-3 days".to_string()
}
fn default_international_label() -> String {
    "5-7 days".to_string()
}
fn default_custom_label() -> String {
    "3-5 days".to_string()
}

impl Default for SpeedFactors {
    fn default() -> Self {
        SpeedFactors {
            local: default_local_speed(),
            international: default_international_speed(),
            custom: default_custom_speed(),
        }
    }
}

impl Default for TimeLabels {
    fn default() -> Self {
        TimeLabels {
            local: default_local_label(),
            international: default_international_label(),
            custom: default_custom_label(),
        }
    }
}

impl Default for ScorerConfig {
    fn default() -> Self {
        ScorerConfig {
            per_item_weight: default_per_item_weight(),
            weight_surcharge: default_weight_surcharge(),
            cost_divisor: default_cost_divisor(),
            cost_weight: default_cost_weight(),
            speed_weight: default_speed_weight(),
            speed_factors: SpeedFactors::default(),
            time_labels: TimeLabels::default(),
        }
    }
}

impl ScorerConfig {
    fn speed_factor(&self, kind: DeliveryKind) -> f64 {
        match kind {
            DeliveryKind::Local => self.speed_factors.local,
            DeliveryKind::International => self.speed_factors.international,
            DeliveryKind::Custom => self.speed_factors.custom,
        }
    }

    fn time_label(&self, kind: DeliveryKind) -> &str {
        match kind {
            DeliveryKind::Local => &self.time_labels.local,
            DeliveryKind::International => &self.time_labels.international,
            DeliveryKind::Custom => &self.time_labels.custom,
        }
    }
}

// =============================================================================
// Scorer
// =============================================================================

/// Ranks delivery providers for a given cart.
#[derive(Debug, Clone, Default)]
pub struct DeliveryScorer {
    config: ScorerConfig,
}

impl DeliveryScorer {
    /// Creates a scorer with the given configuration.
    pub fn new(config: ScorerConfig) -> Self {
        DeliveryScorer { config }
    }

    /// Returns the scorer's configuration.
    pub fn config(&self) -> &ScorerConfig {
        &self.config
    }

    /// Estimated cart weight in weight-units.
    pub fn estimated_weight(&self, lines: &[CartLine]) -> f64 {
        let total_quantity: i64 = lines.iter().map(|l| l.quantity).sum();
        total_quantity as f64 * self.config.per_item_weight
    }

    /// Quote for a single provider at a given cart weight.
    pub fn quote(&self, provider: &DeliveryProvider, weight: f64) -> DeliveryQuote {
        let surcharge =
            Money::from_minor((weight * self.config.weight_surcharge.minor() as f64).round() as i64);
        let estimated_cost = provider.base_rate + surcharge;

        let normalized_cost =
            1.0 - provider.base_rate.minor() as f64 / self.config.cost_divisor as f64;
        let score = normalized_cost * self.config.cost_weight
            + self.config.speed_factor(provider.kind) * self.config.speed_weight;

        DeliveryQuote {
            provider_id: provider.id.clone(),
            provider_name: provider.name.clone(),
            kind: provider.kind,
            estimated_cost,
            estimated_time: self.config.time_label(provider.kind).to_string(),
            score,
        }
    }

    /// Ranks all enabled providers against the cart, best first.
    ///
    /// Disabled providers are excluded. Ties on score break ascending by
    /// provider id so the ranking is total and reproducible. An empty
    /// provider list yields an empty ranking; that is not an error.
    pub fn rank(&self, providers: &[DeliveryProvider], lines: &[CartLine]) -> Vec<DeliveryQuote> {
        let weight = self.estimated_weight(lines);

        let mut quotes: Vec<DeliveryQuote> = providers
            .iter()
            .filter(|p| p.enabled)
            .map(|p| self.quote(p, weight))
            .collect();

        quotes.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.provider_id.cmp(&b.provider_id))
        });

        quotes
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
