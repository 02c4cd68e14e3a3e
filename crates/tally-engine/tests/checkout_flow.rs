//! End-to-end checkout flow tests: cart → payment device → ledger.
//!
//! The device double records every call so the tests can assert the
//! scoped-acquisition discipline (connect/disconnect pairing, cancel on
//! abnormal exits), not just the happy-path result.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use tally_core::{
    DeliveryKind, DeliveryProvider, DeliveryScorer, Money, PaymentMethod, Product, ScorerConfig,
    TaxRate, TaxRule, TransactionStatus,
};
use tally_engine::{
    checkout, ApprovalRequest, CancelHandle, CartAggregator, CheckoutRequest, EngineError,
    EngineResult, InMemoryDirectory, PaymentDevice, PaymentOutcome, Receipt, TransactionLedger,
};

// =============================================================================
// Device Double
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
enum DeviceBehavior {
    Approve,
    Decline,
    FailConnect,
    /// Never resolves; exercises timeout and cancellation paths.
    Hang,
}

struct ScriptedDevice {
    behavior: DeviceBehavior,
    calls: Mutex<Vec<&'static str>>,
}

impl ScriptedDevice {
    fn new(behavior: DeviceBehavior) -> Self {
        ScriptedDevice {
            behavior,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }

    fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentDevice for ScriptedDevice {
    async fn connect(&self) -> EngineResult<()> {
        self.record("connect");
        if self.behavior == DeviceBehavior::FailConnect {
            return Err(EngineError::device("Terminal unreachable"));
        }
        Ok(())
    }

    async fn disconnect(&self) -> EngineResult<()> {
        self.record("disconnect");
        Ok(())
    }

    async fn process_payment(
        &self,
        _amount: Money,
        _method: PaymentMethod,
    ) -> EngineResult<PaymentOutcome> {
        self.record("process_payment");
        match self.behavior {
            DeviceBehavior::Approve => Ok(PaymentOutcome::approved("auth-001")),
            DeviceBehavior::Decline => Ok(PaymentOutcome::declined("Insufficient funds")),
            DeviceBehavior::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
            DeviceBehavior::FailConnect => unreachable!("connect already failed"),
        }
    }

    async fn cancel_payment(&self) -> EngineResult<()> {
        self.record("cancel_payment");
        Ok(())
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// Run with `RUST_LOG=tally_engine=debug` to watch the flow.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

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

fn cart() -> CartAggregator {
    init_tracing();
    let schedule = vec![TaxRule {
        name: "Sales tax".into(),
        rate: TaxRate::from_bps(750),
        description: String::new(),
    }];
    let providers = vec![
        DeliveryProvider {
            id: "local-1".into(),
            name: "City Courier".into(),
            kind: DeliveryKind::Local,
            base_rate: Money::from_minor(1500),
            enabled: true,
            service_areas: vec![],
        },
        DeliveryProvider {
            id: "intl-1".into(),
            name: "WorldShip".into(),
            kind: DeliveryKind::International,
            base_rate: Money::from_minor(8500),
            enabled: true,
            service_areas: vec![],
        },
    ];
    CartAggregator::new(
        schedule,
        providers,
        DeliveryScorer::new(ScorerConfig::default()),
        true,
    )
}

fn request() -> CheckoutRequest {
    CheckoutRequest::new(PaymentMethod::Card, "cashier-1")
        .with_device_timeout(Duration::from_millis(200))
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn approved_payment_completes_and_clears_cart() {
    let mut cart = cart();
    cart.add_item(&product("a", 1000), 2).unwrap();
    cart.add_item(&product("b", 500), 1).unwrap();
    // Smart selection picked the local courier; decline delivery for a
    // figure-stable assertion
    cart.set_delivery_quote(None).unwrap();

    let mut ledger = TransactionLedger::new();
    let device = ScriptedDevice::new(DeviceBehavior::Approve);

    let txn = checkout(&mut cart, &mut ledger, &device, &request(), &CancelHandle::new())
        .await
        .unwrap();

    assert_eq!(txn.status, TransactionStatus::Completed);
    assert_eq!(txn.total_minor, 2688);
    assert_eq!(txn.payment_reference.as_deref(), Some("auth-001"));
    assert!(cart.is_empty());
    assert_eq!(ledger.len(), 1);
    assert_eq!(device.calls(), vec!["connect", "process_payment", "disconnect"]);
}

#[tokio::test]
async fn smart_selected_delivery_lands_in_transaction() {
    let mut cart = cart();
    cart.add_item(&product("a", 1000), 2).unwrap();
    let expected_cost = cart.selected_quote().unwrap().estimated_cost;
    assert_eq!(cart.selected_quote().unwrap().provider_id, "local-1");

    let mut ledger = TransactionLedger::new();
    let device = ScriptedDevice::new(DeviceBehavior::Approve);

    let txn = checkout(&mut cart, &mut ledger, &device, &request(), &CancelHandle::new())
        .await
        .unwrap();

    assert_eq!(txn.delivery_cost_minor, expected_cost.minor());
}

#[tokio::test]
async fn declined_payment_records_nothing() {
    let mut cart = cart();
    cart.add_item(&product("a", 1000), 1).unwrap();

    let mut ledger = TransactionLedger::new();
    let device = ScriptedDevice::new(DeviceBehavior::Decline);

    let err = checkout(&mut cart, &mut ledger, &device, &request(), &CancelHandle::new())
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Device { .. }));
    assert!(ledger.is_empty());
    // Cart survives a failed payment untouched
    assert_eq!(cart.line_count(), 1);
    // Device still released
    assert_eq!(device.calls(), vec!["connect", "process_payment", "disconnect"]);
}

#[tokio::test]
async fn connect_failure_aborts_before_payment() {
    let mut cart = cart();
    cart.add_item(&product("a", 1000), 1).unwrap();

    let mut ledger = TransactionLedger::new();
    let device = ScriptedDevice::new(DeviceBehavior::FailConnect);

    let err = checkout(&mut cart, &mut ledger, &device, &request(), &CancelHandle::new())
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Device { .. }));
    assert!(ledger.is_empty());
    assert_eq!(device.calls(), vec!["connect"]);
}

#[tokio::test]
async fn hanging_device_times_out_and_is_released() {
    let mut cart = cart();
    cart.add_item(&product("a", 1000), 1).unwrap();

    let mut ledger = TransactionLedger::new();
    let device = ScriptedDevice::new(DeviceBehavior::Hang);

    let err = checkout(&mut cart, &mut ledger, &device, &request(), &CancelHandle::new())
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Device { .. }));
    assert!(ledger.is_empty());
    assert_eq!(
        device.calls(),
        vec!["connect", "process_payment", "cancel_payment", "disconnect"]
    );
}

#[tokio::test]
async fn operator_cancel_aborts_payment_and_releases_device() {
    let mut cart = cart();
    cart.add_item(&product("a", 1000), 1).unwrap();

    let mut ledger = TransactionLedger::new();
    let device = ScriptedDevice::new(DeviceBehavior::Hang);
    let cancel = CancelHandle::new();

    // Cancel fires while the device hangs mid-payment
    cancel.cancel();

    let err = checkout(
        &mut cart,
        &mut ledger,
        &device,
        &CheckoutRequest::new(PaymentMethod::Card, "cashier-1")
            .with_device_timeout(Duration::from_secs(30)),
        &cancel,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, EngineError::Cancelled));
    assert!(ledger.is_empty());
    assert_eq!(cart.line_count(), 1);
    assert_eq!(
        device.calls(),
        vec!["connect", "process_payment", "cancel_payment", "disconnect"]
    );
}

#[tokio::test]
async fn empty_cart_never_touches_device() {
    let mut cart = cart();
    let mut ledger = TransactionLedger::new();
    let device = ScriptedDevice::new(DeviceBehavior::Approve);

    let err = checkout(&mut cart, &mut ledger, &device, &request(), &CancelHandle::new())
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::EmptyCart));
    assert!(device.calls().is_empty());
}

#[tokio::test]
async fn void_after_checkout_with_approval() {
    let mut cart = cart();
    cart.add_item(&product("a", 1000), 2).unwrap();

    let mut ledger = TransactionLedger::new();
    let device = ScriptedDevice::new(DeviceBehavior::Approve);
    let directory = InMemoryDirectory::from_entries([("jane", "1234")]);

    let txn = checkout(&mut cart, &mut ledger, &device, &request(), &CancelHandle::new())
        .await
        .unwrap();

    // Empty reason is rejected and the transaction stays Completed
    let err = ledger
        .void(
            &txn.id,
            &ApprovalRequest::new("", "jane", "1234"),
            &directory,
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
    assert_eq!(
        ledger.get(&txn.id).unwrap().status,
        TransactionStatus::Completed
    );

    // Verified triple goes through
    let voided = ledger
        .void(
            &txn.id,
            &ApprovalRequest::new("Customer cancelled", "jane", "1234"),
            &directory,
        )
        .unwrap();
    assert_eq!(voided.status, TransactionStatus::Voided);

    // The receipt for a voided transaction carries the audit fields
    let receipt = Receipt::for_transaction(&voided, "Corner Store", vec![]);
    assert_eq!(receipt.reversal_approver.as_deref(), Some("jane"));
    assert_eq!(receipt.reversal_reason.as_deref(), Some("Customer cancelled"));
}
