//! # Approval Gate
//!
//! The policy object guarding sensitive mutations: transaction reversals,
//! large refunds, large stock adjustments.
//!
//! ## Gate Decision
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Approval Gate Decision                              │
//! │                                                                         │
//! │  action magnitude                                                       │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  ┌───────────────────────┐     below      ┌──────────────────────────┐ │
//! │  │ magnitude > threshold?│ ──────────────►│ reason required,         │ │
//! │  └──────────┬────────────┘                │ no approver needed       │ │
//! │             │ above (or gate is mandatory)└──────────────────────────┘ │
//! │             ▼                                                           │
//! │  ┌───────────────────────────────────────────────────────────────────┐ │
//! │  │ 1. reason non-empty        → ValidationError otherwise            │ │
//! │  │ 2. approver non-empty      → ValidationError otherwise            │ │
//! │  │ 3. directory.verify(...)   → AuthorizationError otherwise         │ │
//! │  └───────────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Credentials are verified against an [`ApproverDirectory`] - an identity
//! directory the host provides. There is no shared secret anywhere in the
//! engine to compare against.

use std::collections::HashMap;

use tally_core::validation::{validate_approver, validate_reason};
use tally_core::Money;
use tracing::warn;

use crate::error::{EngineError, EngineResult};

// =============================================================================
// Approval Request
// =============================================================================

/// The (reason, approver, credential) triple supplied with a gated action.
#[derive(Debug, Clone)]
pub struct ApprovalRequest {
    /// Why the action is happening. Recorded on the audit trail.
    pub reason: String,

    /// Identity of the approving manager/supervisor.
    pub approver: String,

    /// Credential (PIN, one-time code, badge token) verified against the
    /// directory. Never logged.
    pub credential: String,
}

impl ApprovalRequest {
    pub fn new(
        reason: impl Into<String>,
        approver: impl Into<String>,
        credential: impl Into<String>,
    ) -> Self {
        ApprovalRequest {
            reason: reason.into(),
            approver: approver.into(),
            credential: credential.into(),
        }
    }
}

// =============================================================================
// Approver Directory
// =============================================================================

/// Identity directory that can verify an approver's credential.
///
/// Hosts back this with their real authorization service; tests use
/// [`InMemoryDirectory`]. Verification is synchronous by contract: gated
/// operations fail fast without touching state, so implementations backed
/// by a remote service should cache or pre-fetch.
pub trait ApproverDirectory: Send + Sync {
    /// Returns true when `credential` verifies for `approver`.
    fn verify(&self, approver: &str, credential: &str) -> bool;
}

/// Directory seeded from configuration. Suitable for single-store
/// deployments and tests.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    credentials: HashMap<String, String>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an approver with their credential.
    pub fn register(&mut self, approver: impl Into<String>, credential: impl Into<String>) {
        self.credentials.insert(approver.into(), credential.into());
    }

    /// Builds a directory from (approver, credential) pairs.
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, S)>,
        S: Into<String>,
    {
        let mut dir = Self::new();
        for (approver, credential) in entries {
            dir.register(approver, credential);
        }
        dir
    }
}

impl ApproverDirectory for InMemoryDirectory {
    fn verify(&self, approver: &str, credential: &str) -> bool {
        match self.credentials.get(approver) {
            Some(expected) => expected == credential,
            None => false,
        }
    }
}

// =============================================================================
// Approval Gate
// =============================================================================

/// Magnitude-gated approval policy.
///
/// Two shapes:
/// - [`ApprovalGate::mandatory`] - every action needs the full verified
///   triple. Used by void/return.
/// - [`ApprovalGate::above`] - actions at or below the threshold proceed
///   with just a reason; above it the full triple is required. Used by
///   refund- and stock-adjustment-style operations.
#[derive(Debug, Clone)]
pub struct ApprovalGate {
    threshold: Option<Money>,
}

impl ApprovalGate {
    /// Gate that applies to every action regardless of magnitude.
    pub fn mandatory() -> Self {
        ApprovalGate { threshold: None }
    }

    /// Gate that applies only above the given magnitude.
    pub fn above(threshold: Money) -> Self {
        ApprovalGate {
            threshold: Some(threshold),
        }
    }

    /// Checks whether the gate demands a verified approver for `magnitude`.
    pub fn requires_approver(&self, magnitude: Money) -> bool {
        match self.threshold {
            None => true,
            Some(threshold) => magnitude.abs() > threshold,
        }
    }

    /// Authorizes an action of the given magnitude.
    ///
    /// Validation and verification only - no state is touched here, so a
    /// failed gate leaves the world exactly as it was.
    pub fn authorize(
        &self,
        magnitude: Money,
        request: &ApprovalRequest,
        directory: &dyn ApproverDirectory,
    ) -> EngineResult<()> {
        validate_reason(&request.reason)?;

        if !self.requires_approver(magnitude) {
            return Ok(());
        }

        validate_approver(&request.approver)?;

        if !directory.verify(&request.approver, &request.credential) {
            warn!(approver = %request.approver, "Approval credential rejected");
            return Err(EngineError::Authorization {
                approver: request.approver.clone(),
            });
        }

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
