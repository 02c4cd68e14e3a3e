//! # Engine Configuration
//!
//! Configuration for the checkout engine: tax schedule, discount catalog,
//! delivery providers, scorer constants, and the approval threshold.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                            │
//! │     TALLY_STORE_ID=store-001                                            │
//! │     TALLY_SMART_SELECTION=false                                         │
//! │                                                                         │
//! │  2. TOML Config File                                                    │
//! │     ~/.config/tally-pos/engine.toml (Linux)                             │
//! │     ~/Library/Application Support/com.tally.pos/engine.toml (macOS)     │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                    │
//! │     empty schedule, no providers, smart selection on                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # engine.toml
//! [store]
//! id = "store-001"
//! name = "Downtown Branch"
//! address_lines = ["1 Main St", "Springfield"]
//!
//! [[tax_schedule]]
//! name = "Sales tax"
//! rate = 750            # basis points, 7.5%
//!
//! [[providers]]
//! id = "local-1"
//! name = "City Courier"
//! kind = "local"
//! base_rate = 1500
//! enabled = true
//!
//! [scorer]
//! cost_weight = 0.6
//! speed_weight = 0.4
//!
//! [checkout]
//! smart_selection = true
//! approval_threshold_minor = 10000
//! device_timeout_secs = 60
//!
//! [[approvers]]
//! id = "jane"
//! credential = "1234"
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use tally_core::validation::validate_rate_bps;
use tally_core::{DeliveryProvider, DeliveryScorer, Discount, Money, ScorerConfig, TaxRule};

use crate::approval::InMemoryDirectory;
use crate::cart::CartAggregator;
use crate::error::{EngineError, EngineResult};

// =============================================================================
// Store Identity
// =============================================================================

/// The store this engine instance runs in. Printed on every receipt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Unique store identifier.
    #[serde(default = "default_store_id")]
    pub id: String,

    /// Human-readable store name.
    #[serde(default = "default_store_name")]
    pub name: String,

    /// Address lines for the receipt header.
    #[serde(default)]
    pub address_lines: Vec<String>,
}

fn default_store_id() -> String {
    "default-store".to_string()
}

fn default_store_name() -> String {
    "Tally Store".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            id: default_store_id(),
            name: default_store_name(),
            address_lines: Vec::new(),
        }
    }
}

// =============================================================================
// Checkout Settings
// =============================================================================

/// Behavior knobs for the checkout flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSettings {
    /// When true, the top-ranked delivery quote is auto-selected.
    #[serde(default = "default_true")]
    pub smart_selection: bool,

    /// Magnitude above which stock/refund-style adjustments demand a
    /// verified approver. Reversals are always gated regardless.
    #[serde(default = "default_approval_threshold")]
    pub approval_threshold_minor: i64,

    /// Upper bound on a single payment-device interaction, in seconds.
    #[serde(default = "default_device_timeout")]
    pub device_timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_approval_threshold() -> i64 {
    10_000
}

fn default_device_timeout() -> u64 {
    60
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        CheckoutSettings {
            smart_selection: default_true(),
            approval_threshold_minor: default_approval_threshold(),
            device_timeout_secs: default_device_timeout(),
        }
    }
}

// =============================================================================
// Discount Catalog & Approvers
// =============================================================================

/// A named, preconfigured discount cashiers can apply by code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscountPreset {
    /// Short code keyed in at the register.
    pub code: String,

    /// The discount applied when the code is used.
    #[serde(flatten)]
    pub discount: Discount,
}

/// An approver identity seeded into the in-memory directory.
///
/// Production deployments back the directory with their authorization
/// service instead; this section exists for single-store setups and tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApproverEntry {
    pub id: String,
    pub credential: String,
}

// =============================================================================
// Engine Configuration
// =============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Store identity.
    #[serde(default)]
    pub store: StoreConfig,

    /// Ordered tax schedule; every rule taxes the same base.
    #[serde(default)]
    pub tax_schedule: Vec<TaxRule>,

    /// Named discounts available at the register.
    #[serde(default)]
    pub discount_catalog: Vec<DiscountPreset>,

    /// Delivery providers available to this store.
    #[serde(default)]
    pub providers: Vec<DeliveryProvider>,

    /// Delivery scorer constants.
    #[serde(default)]
    pub scorer: ScorerConfig,

    /// Checkout behavior.
    #[serde(default)]
    pub checkout: CheckoutSettings,

    /// Seed approvers for the in-memory directory.
    #[serde(default)]
    pub approvers: Vec<ApproverEntry>,
}

impl EngineConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (engine.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> EngineResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading engine config from file");
                let contents = std::fs::read_to_string(&path).map_err(|e| {
                    EngineError::Validation(tally_core::ValidationError::InvalidFormat {
                        field: "config".to_string(),
                        reason: e.to_string(),
                    })
                })?;
                config = toml::from_str(&contents).map_err(|e| {
                    EngineError::Validation(tally_core::ValidationError::InvalidFormat {
                        field: "config".to_string(),
                        reason: e.to_string(),
                    })
                })?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load engine config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Validates the configuration.
    pub fn validate(&self) -> EngineResult<()> {
        for rule in &self.tax_schedule {
            validate_rate_bps(rule.rate.bps())
                .map_err(EngineError::Validation)?;
        }

        for provider in &self.providers {
            if provider.id.trim().is_empty() {
                return Err(EngineError::Validation(
                    tally_core::ValidationError::Required {
                        field: "provider id".to_string(),
                    },
                ));
            }
            if provider.base_rate.is_negative() {
                return Err(EngineError::Validation(
                    tally_core::ValidationError::OutOfRange {
                        field: format!("provider {} base_rate", provider.id),
                        min: 0,
                        max: i64::MAX,
                    },
                ));
            }
        }

        let mut ids: Vec<&str> = self.providers.iter().map(|p| p.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        if ids.len() != self.providers.len() {
            return Err(EngineError::Validation(
                tally_core::ValidationError::InvalidFormat {
                    field: "providers".to_string(),
                    reason: "provider ids must be unique".to_string(),
                },
            ));
        }

        if self.scorer.cost_divisor <= 0 {
            return Err(EngineError::Validation(
                tally_core::ValidationError::MustBePositive {
                    field: "scorer.cost_divisor".to_string(),
                },
            ));
        }

        if self.checkout.device_timeout_secs == 0 {
            return Err(EngineError::Validation(
                tally_core::ValidationError::MustBePositive {
                    field: "checkout.device_timeout_secs".to_string(),
                },
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(id) = std::env::var("TALLY_STORE_ID") {
            debug!(store_id = %id, "Overriding store id from environment");
            self.store.id = id;
        }

        if let Ok(name) = std::env::var("TALLY_STORE_NAME") {
            self.store.name = name;
        }

        if let Ok(smart) = std::env::var("TALLY_SMART_SELECTION") {
            match smart.to_lowercase().as_str() {
                "true" | "1" | "on" => self.checkout.smart_selection = true,
                "false" | "0" | "off" => self.checkout.smart_selection = false,
                other => warn!(value = %other, "Unknown TALLY_SMART_SELECTION value"),
            }
        }

        if let Ok(threshold) = std::env::var("TALLY_APPROVAL_THRESHOLD_MINOR") {
            if let Ok(minor) = threshold.parse::<i64>() {
                self.checkout.approval_threshold_minor = minor;
            }
        }

        if let Ok(secs) = std::env::var("TALLY_DEVICE_TIMEOUT_SECS") {
            if let Ok(s) = secs.parse::<u64>() {
                self.checkout.device_timeout_secs = s;
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "tally", "pos")
            .map(|dirs| dirs.config_dir().join("engine.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Threshold for the magnitude-gated approval pattern.
    pub fn approval_threshold(&self) -> Money {
        Money::from_minor(self.checkout.approval_threshold_minor)
    }

    /// Upper bound on a single payment-device interaction.
    pub fn device_timeout(&self) -> Duration {
        Duration::from_secs(self.checkout.device_timeout_secs)
    }

    /// Builds an empty cart wired to this configuration's tax schedule,
    /// provider list, scorer constants, and smart-selection flag.
    pub fn new_cart(&self) -> CartAggregator {
        CartAggregator::new(
            self.tax_schedule.clone(),
            self.providers.clone(),
            DeliveryScorer::new(self.scorer.clone()),
            self.checkout.smart_selection,
        )
    }

    /// Builds the seeded approver directory.
    pub fn approver_directory(&self) -> InMemoryDirectory {
        InMemoryDirectory::from_entries(
            self.approvers
                .iter()
                .map(|a| (a.id.clone(), a.credential.clone())),
        )
    }

    /// Looks up a discount preset by code.
    pub fn discount_by_code(&self, code: &str) -> Option<&Discount> {
        self.discount_catalog
            .iter()
            .find(|p| p.code == code)
            .map(|p| &p.discount)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
