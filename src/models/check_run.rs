//! Check run data models and API request/response types.
//!
//! This module defines:
//! - `CheckRun`: a batch of payables selected for payment in one cycle
//! - `TransactionRow`: one candidate payable inside a check run
//! - Request types for creating drafts and saving edits
//! - `EntriesResponse`: the result of selecting outstanding entries

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::source_document::{PartyType, SourceDocType, SourceRef};

/// Lifecycle state of a check run.
///
/// A run is created as `Draft`, edited and saved any number of times, and
/// moves to `Processed` exactly once when its payments are created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckRunStatus {
    Draft,
    Processed,
}

impl CheckRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckRunStatus::Draft => "Draft",
            CheckRunStatus::Processed => "Processed",
        }
    }
}

impl TryFrom<&str> for CheckRunStatus {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "Draft" => Ok(CheckRunStatus::Draft),
            "Processed" => Ok(CheckRunStatus::Processed),
            other => Err(format!("unknown check run status: {other}")),
        }
    }
}

/// One payable offered for payment.
///
/// Rows are owned by their check run and stored with it as JSON.
///
/// # JSON Example
///
/// ```json
/// {
///   "doctype": "Purchase Invoice",
///   "name": "ACC-PINV-2025-00001",
///   "party_type": "Supplier",
///   "party": "Exceptional Grid",
///   "ref_number": "EG-1001",
///   "posting_date": "2025-01-15",
///   "due_date": "2025-02-15",
///   "installment": 1,
///   "amount_cents": 50000,
///   "pay": false,
///   "mode_of_payment": "Check"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRow {
    pub doctype: SourceDocType,
    pub name: String,
    pub party_type: PartyType,
    pub party: String,

    /// Supplier bill number or journal entry cheque number
    #[serde(default)]
    pub ref_number: Option<String>,
    pub posting_date: NaiveDate,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,

    /// Payment schedule position for installment rows
    #[serde(default)]
    pub installment: Option<i32>,

    /// Signed amount in cents; negative for returns / debit notes
    pub amount_cents: i64,

    /// Whether the user selected this row for payment
    #[serde(default)]
    pub pay: bool,

    #[serde(default)]
    pub mode_of_payment: Option<String>,

    /// Set once the run is processed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_entry: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_number: Option<i64>,
}

impl TransactionRow {
    pub fn source_ref(&self) -> SourceRef {
        SourceRef {
            doctype: self.doctype,
            name: self.name.clone(),
            installment: self.installment,
        }
    }

    /// Date used for ordering rows; falls back to the posting date.
    pub fn sort_date(&self) -> NaiveDate {
        self.due_date.unwrap_or(self.posting_date)
    }
}

/// Represents a check run record from the database.
///
/// # Database Table
///
/// Maps to the `check_runs` table. `transactions` is stored as JSONB.
#[derive(Debug, Clone, Serialize)]
pub struct CheckRun {
    pub id: Uuid,
    pub company: String,
    pub bank_account: String,

    /// Payable account whose documents this run pays; may be empty on a
    /// fresh draft until `set_default_payable_account` fills it
    pub payable_account: String,
    pub posting_date: NaiveDate,

    /// Only documents posted on or before this date are selected
    pub end_date: NaiveDate,
    pub last_check_number: i64,
    pub status: CheckRunStatus,
    pub transactions: Vec<TransactionRow>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CheckRun {
    /// Build a fresh draft for a company / bank / payable account triple.
    pub fn new_draft(
        company: &str,
        bank_account: &str,
        payable_account: &str,
        today: NaiveDate,
        last_check_number: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            company: company.to_string(),
            bank_account: bank_account.to_string(),
            payable_account: payable_account.to_string(),
            posting_date: today,
            end_date: today,
            last_check_number,
            status: CheckRunStatus::Draft,
            transactions: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_draft(&self) -> bool {
        self.status == CheckRunStatus::Draft
    }

    /// Rows the user selected for payment.
    pub fn rows_to_pay(&self) -> impl Iterator<Item = &TransactionRow> {
        self.transactions.iter().filter(|row| row.pay)
    }
}

/// Request body for finding or creating the draft check run.
///
/// # JSON Example
///
/// ```json
/// {
///   "company": "Chelsea Fruit Co",
///   "bank_account": "Primary Checking - Local Bank",
///   "payable_account": "2110 - Accounts Payable - CFC"
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct DraftCheckRunRequest {
    pub company: String,
    pub bank_account: String,
    #[serde(default)]
    pub payable_account: String,
}

/// Request body for saving edits to a draft; omitted fields are unchanged.
#[derive(Debug, Default, Deserialize)]
pub struct SaveCheckRunRequest {
    pub posting_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub last_check_number: Option<i64>,
    pub payable_account: Option<String>,
    pub transactions: Option<Vec<TransactionRow>>,
}

/// Response of the entry selector.
///
/// # JSON Example
///
/// ```json
/// { "transactions": [ { "doctype": "Journal Entry", "...": "..." } ] }
/// ```
#[derive(Debug, Serialize)]
pub struct EntriesResponse {
    pub transactions: Vec<TransactionRow>,
}

/// Response for the draft lookup endpoint.
#[derive(Debug, Serialize)]
pub struct DraftCheckRunResponse {
    pub id: Uuid,
}
