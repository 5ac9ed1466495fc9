//! Payable source documents.
//!
//! A check run pays three kinds of documents:
//! - `PurchaseInvoice`: supplier bills, optionally split into installments
//! - `JournalEntry`: manual payables booked against a party
//! - `ExpenseClaim`: employee reimbursements
//!
//! Each carries its current outstanding amount in cents. Negative outstanding
//! means the document is a return / debit note owed back to us.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// The document type a transaction row points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SourceDocType {
    #[serde(rename = "Purchase Invoice")]
    PurchaseInvoice,
    #[serde(rename = "Journal Entry")]
    JournalEntry,
    #[serde(rename = "Expense Claim")]
    ExpenseClaim,
}

impl SourceDocType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceDocType::PurchaseInvoice => "Purchase Invoice",
            SourceDocType::JournalEntry => "Journal Entry",
            SourceDocType::ExpenseClaim => "Expense Claim",
        }
    }
}

impl std::fmt::Display for SourceDocType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who a payment goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PartyType {
    Supplier,
    Employee,
}

impl PartyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartyType::Supplier => "Supplier",
            PartyType::Employee => "Employee",
        }
    }
}

impl TryFrom<&str> for PartyType {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "Supplier" => Ok(PartyType::Supplier),
            "Employee" => Ok(PartyType::Employee),
            other => Err(format!("unknown party type: {other}")),
        }
    }
}

/// One installment of a purchase invoice's payment schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentScheduleLine {
    /// Position in the schedule, starting at 1
    pub idx: i32,
    pub due_date: NaiveDate,
    pub outstanding_cents: i64,
}

/// A submitted supplier invoice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseInvoice {
    pub name: String,
    pub company: String,
    pub supplier: String,

    /// Supplier's own invoice number
    pub bill_no: Option<String>,

    /// Payable account the invoice is booked against
    pub credit_to: String,
    pub posting_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub outstanding_cents: i64,

    /// Blocks payment until released
    pub on_hold: bool,
    pub release_date: Option<NaiveDate>,

    /// Debit note; `return_against` names the original invoice when linked
    pub is_return: bool,
    pub return_against: Option<String>,

    /// Supplier's preferred mode of payment
    pub default_mode_of_payment: Option<String>,

    /// Installments; empty when the invoice is due in full on `due_date`
    pub payment_schedule: Vec<PaymentScheduleLine>,
}

/// A submitted journal entry line crediting a party on a payable account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub name: String,
    pub company: String,
    pub party_type: PartyType,
    pub party: String,
    pub account: String,
    pub cheque_no: Option<String>,
    pub posting_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub outstanding_cents: i64,
    pub default_mode_of_payment: Option<String>,
}

/// A submitted employee expense claim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpenseClaim {
    pub name: String,
    pub company: String,

    /// Employee id; this is the payment party
    pub employee: String,
    pub employee_name: String,
    pub payable_account: String,
    pub posting_date: NaiveDate,
    pub outstanding_cents: i64,
    pub default_mode_of_payment: Option<String>,
}

/// All outstanding source documents for one company and payable account.
///
/// Loaded by the store in one go and filtered by the entry selector.
#[derive(Debug, Clone, Default)]
pub struct OutstandingDocuments {
    pub purchase_invoices: Vec<PurchaseInvoice>,
    pub journal_entries: Vec<JournalEntry>,
    pub expense_claims: Vec<ExpenseClaim>,
}

/// Reference to one payable a check run row settles.
///
/// Installment rows of the same invoice share `doctype` and `name` and differ
/// by `installment`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceRef {
    pub doctype: SourceDocType,
    pub name: String,
    pub installment: Option<i32>,
}

/// Current state of a source document, re-read right before processing.
#[derive(Debug, Clone)]
pub struct SourceSnapshot {
    /// Party the document is payable to
    pub party_type: PartyType,
    pub party: String,
    pub outstanding_cents: i64,
    /// Only ever set for purchase invoices
    pub on_hold: bool,
}

/// Amount to take off a source document's outstanding balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutstandingUpdate {
    pub source: SourceRef,
    pub amount_cents: i64,
}
