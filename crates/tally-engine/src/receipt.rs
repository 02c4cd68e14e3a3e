//! # Receipt Data Contract
//!
//! The DTO handed to the print collaborator. Rendering (paper width, fonts,
//! localization) is entirely the printer's concern - this module only fixes
//! the field set so printed receipts can never disagree with the ledger.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use tally_core::{Transaction, TransactionStatus};

/// A printable line item.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptLine {
    pub name: String,
    pub quantity: i64,
    pub unit_price_minor: i64,
    pub line_total_minor: i64,
    pub line_discount_minor: i64,
}

/// The finalized record a printer or accounting export consumes.
///
/// Field set is stable: collaborators depend on it.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    /// Sortable transaction id string.
    pub transaction_id: String,

    pub store_name: String,
    pub store_address: Vec<String>,

    /// RFC 3339 completion timestamp.
    pub timestamp: String,

    pub lines: Vec<ReceiptLine>,

    pub subtotal_minor: i64,
    pub total_discount_minor: i64,
    pub total_tax_minor: i64,
    pub delivery_cost_minor: i64,
    pub total_minor: i64,

    pub payment_method: String,
    pub payment_reference: Option<String>,
    pub customer_id: Option<String>,
    pub cashier_id: String,

    pub status: TransactionStatus,

    /// Reversal audit fields, present when status != Completed.
    pub reversal_reason: Option<String>,
    pub reversal_approver: Option<String>,
    pub reversal_timestamp: Option<String>,
}

impl Receipt {
    /// Builds the receipt for a transaction under the given store header.
    pub fn for_transaction(
        transaction: &Transaction,
        store_name: impl Into<String>,
        store_address: Vec<String>,
    ) -> Self {
        let reversal = transaction.reversal.as_ref();

        Receipt {
            transaction_id: transaction.id.to_string(),
            store_name: store_name.into(),
            store_address,
            timestamp: transaction.completed_at.to_rfc3339(),
            lines: transaction
                .lines
                .iter()
                .map(|l| ReceiptLine {
                    name: l.name.clone(),
                    quantity: l.quantity,
                    unit_price_minor: l.unit_price_minor,
                    line_total_minor: l.unit_price_minor * l.quantity,
                    line_discount_minor: l.line_discount_minor,
                })
                .collect(),
            subtotal_minor: transaction.subtotal_minor,
            total_discount_minor: transaction.total_discount_minor,
            total_tax_minor: transaction.total_tax_minor,
            delivery_cost_minor: transaction.delivery_cost_minor,
            total_minor: transaction.total_minor,
            payment_method: transaction.payment_method.to_string(),
            payment_reference: transaction.payment_reference.clone(),
            customer_id: transaction.customer_id.clone(),
            cashier_id: transaction.cashier_id.clone(),
            status: transaction.status,
            reversal_reason: reversal.map(|r| r.reason.clone()),
            reversal_approver: reversal.map(|r| r.approver.clone()),
            reversal_timestamp: reversal.map(|r| r.approved_at.to_rfc3339()),
        }
    }
}
