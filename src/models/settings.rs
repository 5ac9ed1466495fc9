//! Check Run Settings model.
//!
//! Settings are keyed by company, bank account and payable account, so the
//! same company can pay different payable accounts under different policies.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Policy flags applied when selecting and paying entries.
///
/// # Database Table
///
/// Maps to the `check_run_settings` table, unique per
/// (company, bank_account, payable_account).
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct CheckRunSettings {
    pub id: Uuid,
    pub company: String,
    pub bank_account: String,
    pub payable_account: String,

    pub include_purchase_invoices: bool,
    pub include_journal_entries: bool,
    pub include_expense_claims: bool,

    /// Show and pay debit notes that are not linked to an unpaid invoice
    pub allow_stand_alone_debit_notes: bool,

    /// Clear the hold on flagged invoices instead of rejecting the run
    pub automatically_release_on_hold_invoices: bool,

    /// Reject check numbers already used on the same bank account
    pub validate_unique_check_number: bool,

    /// Parties never offered for payment
    pub excluded_parties: Vec<String>,
}

impl CheckRunSettings {
    /// Default policy for a new bank/payable account pairing.
    pub fn new(company: &str, bank_account: &str, payable_account: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            company: company.to_string(),
            bank_account: bank_account.to_string(),
            payable_account: payable_account.to_string(),
            include_purchase_invoices: true,
            include_journal_entries: true,
            include_expense_claims: true,
            allow_stand_alone_debit_notes: false,
            automatically_release_on_hold_invoices: false,
            validate_unique_check_number: true,
            excluded_parties: Vec::new(),
        }
    }

    pub fn is_excluded(&self, party: &str) -> bool {
        self.excluded_parties.iter().any(|p| p == party)
    }

    /// Apply a partial update from an API client.
    pub fn apply(&mut self, update: UpdateSettingsRequest) {
        if let Some(v) = update.include_purchase_invoices {
            self.include_purchase_invoices = v;
        }
        if let Some(v) = update.include_journal_entries {
            self.include_journal_entries = v;
        }
        if let Some(v) = update.include_expense_claims {
            self.include_expense_claims = v;
        }
        if let Some(v) = update.allow_stand_alone_debit_notes {
            self.allow_stand_alone_debit_notes = v;
        }
        if let Some(v) = update.automatically_release_on_hold_invoices {
            self.automatically_release_on_hold_invoices = v;
        }
        if let Some(v) = update.validate_unique_check_number {
            self.validate_unique_check_number = v;
        }
        if let Some(v) = update.excluded_parties {
            self.excluded_parties = v;
        }
    }
}

/// Request body for changing settings; omitted fields are left unchanged.
///
/// # JSON Example
///
/// ```json
/// {
///   "allow_stand_alone_debit_notes": true,
///   "excluded_parties": ["Tax Authority"]
/// }
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct UpdateSettingsRequest {
    pub include_purchase_invoices: Option<bool>,
    pub include_journal_entries: Option<bool>,
    pub include_expense_claims: Option<bool>,
    pub allow_stand_alone_debit_notes: Option<bool>,
    pub automatically_release_on_hold_invoices: Option<bool>,
    pub validate_unique_check_number: Option<bool>,
    pub excluded_parties: Option<Vec<String>>,
}
