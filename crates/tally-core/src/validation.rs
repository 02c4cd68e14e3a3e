//! # Validation Module
//!
//! Input validation utilities for the checkout engine.
//!
//! Every mutating operation validates its input here BEFORE touching any
//! state, so a rejected call leaves the cart and the ledger exactly as they
//! were. One policy applies everywhere: out-of-range input is rejected,
//! never silently clamped or coerced.

use crate::error::ValidationError;
use crate::{MAX_CART_LINES, MAX_LINE_QUANTITY};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity.
///
/// ## Rules
/// - Must be positive (>= 1). A zero or negative quantity is REJECTED, not
///   coerced to 1 - the caller hears about bad input every time.
/// - Must not exceed MAX_LINE_QUANTITY (999)
///
/// ```rust
/// use tally_core::validation::validate_quantity;
///
/// assert!(validate_quantity(1).is_ok());
/// assert!(validate_quantity(0).is_err());
/// assert!(validate_quantity(-3).is_err());
/// assert!(validate_quantity(1000).is_err());
/// ```
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_LINE_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_LINE_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a price or discount amount in minor units.
///
/// Zero is allowed (free items); negative amounts are not.
pub fn validate_amount_minor(minor: i64) -> ValidationResult<()> {
    if minor < 0 {
        return Err(ValidationError::OutOfRange {
            field: "amount".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

/// Validates a rate in basis points (0% to 100%).
pub fn validate_rate_bps(bps: u32) -> ValidationResult<()> {
    if bps > 10_000 {
        return Err(ValidationError::OutOfRange {
            field: "rate".to_string(),
            min: 0,
            max: 10_000,
        });
    }

    Ok(())
}

// =============================================================================
// Approval Field Validators
// =============================================================================

/// Validates a reversal/adjustment reason.
///
/// A reason is mandatory for every approval-gated action and appears on the
/// audit record, so it must carry actual content.
pub fn validate_reason(reason: &str) -> ValidationResult<()> {
    let reason = reason.trim();

    if reason.is_empty() {
        return Err(ValidationError::Required {
            field: "reason".to_string(),
        });
    }

    if reason.len() > 500 {
        return Err(ValidationError::TooLong {
            field: "reason".to_string(),
            max: 500,
        });
    }

    Ok(())
}

/// Validates an approver identity.
pub fn validate_approver(approver: &str) -> ValidationResult<()> {
    let approver = approver.trim();

    if approver.is_empty() {
        return Err(ValidationError::Required {
            field: "approver".to_string(),
        });
    }

    if approver.len() > 100 {
        return Err(ValidationError::TooLong {
            field: "approver".to_string(),
            max: 100,
        });
    }

    Ok(())
}

// =============================================================================
// Collection Validators
// =============================================================================

/// Validates cart size (number of distinct lines) before adding a new line.
pub fn validate_cart_size(current_lines: usize) -> ValidationResult<()> {
    if current_lines >= MAX_CART_LINES {
        return Err(ValidationError::OutOfRange {
            field: "cart lines".to_string(),
            min: 0,
            max: MAX_CART_LINES as i64,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(100).is_ok());
        assert!(validate_quantity(999).is_ok());

        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(1000).is_err());
    }

    #[test]
    fn test_validate_amount_minor() {
        assert!(validate_amount_minor(0).is_ok());
        assert!(validate_amount_minor(1099).is_ok());
        assert!(validate_amount_minor(-100).is_err());
    }

    #[test]
    fn test_validate_rate_bps() {
        assert!(validate_rate_bps(0).is_ok());
        assert!(validate_rate_bps(750).is_ok());
        assert!(validate_rate_bps(10_000).is_ok());
        assert!(validate_rate_bps(10_001).is_err());
    }

    #[test]
    fn test_validate_reason() {
        assert!(validate_reason("Customer changed mind").is_ok());
        assert!(validate_reason("").is_err());
        assert!(validate_reason("   ").is_err());
        assert!(validate_reason(&"x".repeat(600)).is_err());
    }

    #[test]
    fn test_validate_approver() {
        assert!(validate_approver("jane.doe").is_ok());
        assert!(validate_approver("").is_err());
        assert!(validate_approver("  ").is_err());
    }

    #[test]
    fn test_validate_cart_size() {
        assert!(validate_cart_size(0).is_ok());
        assert!(validate_cart_size(99).is_ok());
        assert!(validate_cart_size(100).is_err());
    }
}
