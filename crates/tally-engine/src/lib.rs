//! # tally-engine: Checkout Session Layer
//!
//! Owns the mutable state of a checkout session: the cart with its delivery
//! selection, the transaction ledger with its approval gate, and the
//! payment-device orchestration.
//!
//! ## Module Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         tally-engine                                    │
//! │                                                                         │
//! │  ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────────────┐    │
//! │  │   cart    │  │  ledger   │  │ approval  │  │ payment/checkout  │    │
//! │  │ lines +   │  │ complete  │  │ gate +    │  │ device trait +    │    │
//! │  │ delivery  │  │ void      │  │ directory │  │ cancel handle +   │    │
//! │  │ selection │  │ return    │  │           │  │ orchestration     │    │
//! │  └───────────┘  └───────────┘  └───────────┘  └───────────────────┘    │
//! │                                                                         │
//! │  ┌───────────┐  ┌───────────┐                                           │
//! │  │  config   │  │  receipt  │                                           │
//! │  │ TOML+env  │  │ print DTO │                                           │
//! │  └───────────┘  └───────────┘                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Collaborators (payment device, approver directory) enter through traits,
//! constructed by the host and passed in - there are no ambient singletons
//! anywhere in this crate.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod approval;
pub mod cart;
pub mod checkout;
pub mod config;
pub mod error;
pub mod ledger;
pub mod payment;
pub mod receipt;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use approval::{ApprovalGate, ApprovalRequest, ApproverDirectory, InMemoryDirectory};
pub use cart::{CartAggregator, DeliverySelection};
pub use checkout::{checkout, CheckoutRequest};
pub use config::{CheckoutSettings, DiscountPreset, EngineConfig, StoreConfig};
pub use error::{EngineError, EngineResult, ErrorCode};
pub use ledger::TransactionLedger;
pub use payment::{CancelHandle, PaymentDevice, PaymentOutcome};
pub use receipt::{Receipt, ReceiptLine};
