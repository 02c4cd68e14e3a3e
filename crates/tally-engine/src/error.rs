//! # Engine Error Type
//!
//! Unified error type for session-layer operations.
//!
//! ## Error Handling Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in the Engine                             │
//! │                                                                         │
//! │  Every mutating call returns Result<_, EngineError>. A returned Err     │
//! │  GUARANTEES no state was mutated: validation, lookup, state, and        │
//! │  credential checks all run before the first write.                      │
//! │                                                                         │
//! │  Category          Sync?   State touched?   Caller reaction             │
//! │  ────────────      ─────   ──────────────   ───────────────             │
//! │  Validation        yes     never            fix input, retry            │
//! │  NotFound          yes     never            refresh view                │
//! │  InvalidState      yes     never            refresh view                │
//! │  Authorization     yes     never            escalate to approver        │
//! │  Device            async   device released  retry / other tender        │
//! │  Cancelled         async   device released  back to cart                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Money-affecting failures are never silent: hosts are expected to handle
//! every returned error explicitly.

use serde::Serialize;
use thiserror::Error;

use tally_core::{CoreError, ValidationError};

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

// =============================================================================
// Engine Error
// =============================================================================

/// Session-layer error covering cart, ledger, and payment failures.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// The transaction is not in a state that allows the operation.
    ///
    /// Voided and Returned are terminal: nothing transitions out of them.
    #[error("Transaction {id} is {status}, cannot perform operation")]
    InvalidState { id: String, status: String },

    /// Caller input failed validation.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Operation requires a non-empty cart.
    #[error("Cart is empty")]
    EmptyCart,

    /// The approver directory rejected the supplied credential, or a
    /// gated action was attempted without a satisfied gate.
    #[error("Authorization failed for approver: {approver}")]
    Authorization { approver: String },

    /// The payment device failed, declined, or was unreachable.
    #[error("Payment device error: {message}")]
    Device { message: String },

    /// An in-progress payment was cancelled by the operator.
    #[error("Payment cancelled")]
    Cancelled,
}

impl EngineError {
    /// Convenience constructor for not-found errors.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        EngineError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Convenience constructor for device errors.
    pub fn device(message: impl Into<String>) -> Self {
        EngineError::Device {
            message: message.into(),
        }
    }

    /// Machine-readable code for host shells.
    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::NotFound { .. } => ErrorCode::NotFound,
            EngineError::InvalidState { .. } => ErrorCode::InvalidState,
            EngineError::Validation(_) | EngineError::EmptyCart => ErrorCode::ValidationError,
            EngineError::Authorization { .. } => ErrorCode::AuthorizationError,
            EngineError::Device { .. } => ErrorCode::DeviceError,
            EngineError::Cancelled => ErrorCode::Cancelled,
        }
    }
}

/// Error codes for host-facing responses.
///
/// Serialized SCREAMING_SNAKE_CASE so a TypeScript shell can switch on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NotFound,
    InvalidState,
    ValidationError,
    AuthorizationError,
    DeviceError,
    Cancelled,
}

// =============================================================================
// Conversions
// =============================================================================

/// Converts core business-rule errors into engine errors.
impl From<CoreError> for EngineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::LineNotFound(id) => EngineError::not_found("Cart line", id),
            CoreError::EmptyCart => EngineError::EmptyCart,
            CoreError::CartTooLarge { max } => EngineError::Validation(ValidationError::OutOfRange {
                field: "cart lines".to_string(),
                min: 0,
                max: max as i64,
            }),
            CoreError::QuantityTooLarge { max, .. } => {
                EngineError::Validation(ValidationError::OutOfRange {
                    field: "quantity".to_string(),
                    min: 1,
                    max,
                })
            }
            CoreError::Validation(e) => EngineError::Validation(e),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            EngineError::not_found("Transaction", "TXN-1").code(),
            ErrorCode::NotFound
        );
        assert_eq!(EngineError::EmptyCart.code(), ErrorCode::ValidationError);
        assert_eq!(
            EngineError::Authorization {
                approver: "jane".into()
            }
            .code(),
            ErrorCode::AuthorizationError
        );
        assert_eq!(EngineError::Cancelled.code(), ErrorCode::Cancelled);
    }

    #[test]
    fn test_core_error_conversion() {
        let err: EngineError = CoreError::LineNotFound("p-1".into()).into();
        assert!(matches!(err, EngineError::NotFound { .. }));

        let err: EngineError = CoreError::EmptyCart.into();
        assert!(matches!(err, EngineError::EmptyCart));
    }

    #[test]
    fn test_code_serialization() {
        let json = serde_json::to_string(&ErrorCode::AuthorizationError).unwrap();
        assert_eq!(json, "\"AUTHORIZATION_ERROR\"");
    }
}
