//! Payment entry models.
//!
//! A payment entry is the output of a processed check run: one payment to
//! one party with one mode of payment, settling one or more payables.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::source_document::{PartyType, SourceDocType};

/// A payable settled by a payment entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentReference {
    pub doctype: SourceDocType,
    pub name: String,
    pub installment: Option<i32>,

    /// Signed; returns are allocated as negative amounts
    pub allocated_cents: i64,
}

/// Represents a payment entry record from the database.
///
/// # Database Table
///
/// Maps to the `payment_entries` table; `references` is stored as JSONB.
///
/// # Invariant
///
/// `paid_amount_cents` equals the sum of `references[].allocated_cents`.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentEntry {
    pub id: Uuid,
    pub check_run_id: Uuid,
    pub company: String,
    pub party_type: PartyType,
    pub party: String,
    pub mode_of_payment: String,

    /// Bank account paid from
    pub bank_account: String,

    /// Payable account paid to
    pub payable_account: String,
    pub posting_date: NaiveDate,
    pub paid_amount_cents: i64,

    /// Set when the mode of payment issues checks
    pub check_number: Option<i64>,
    pub reference_no: String,
    pub references: Vec<PaymentReference>,
    pub created_at: DateTime<Utc>,
}

impl PaymentEntry {
    /// Amount left unallocated; must be zero for the entry to be valid.
    pub fn difference_amount(&self) -> i64 {
        let allocated: i64 = self.references.iter().map(|r| r.allocated_cents).sum();
        allocated - self.paid_amount_cents
    }
}
