//! Payment processor - turns a reviewed check run into payment entries.
//!
//! This module is pure: it reads a check run, its settings and a fresh
//! snapshot of the source documents, and either rejects the run or returns a
//! [`PaymentPlan`] describing every write. Nothing is persisted here, so a
//! rejected run leaves no trace; the store applies an accepted plan in a
//! single database transaction.
//!
//! # Rules
//!
//! 1. Every row flagged `pay` needs a known mode of payment
//! 2. Every flagged source must still be outstanding for at least the
//!    flagged amount, belong to the row's party, and be flagged only once
//! 3. On-hold invoices are rejected unless the settings auto-release them
//! 4. Flagged rows are grouped by party and mode of payment and netted
//! 5. A negative group is a stand-alone debit note; it is rejected unless
//!    allowed, and even then cannot be paid out, so the payment's difference
//!    amount is nonzero and the run fails
//! 6. A positive group becomes one payment entry for exactly its net amount
//! 7. Check modes consume consecutive check numbers

use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        check_run::{CheckRun, CheckRunStatus, TransactionRow},
        company::ModeOfPayment,
        payment_entry::{PaymentEntry, PaymentReference},
        settings::CheckRunSettings,
        source_document::{
            OutstandingUpdate, PartyType, SourceDocType, SourceRef, SourceSnapshot,
        },
    },
};

/// Every write needed to process a check run.
#[derive(Debug, Clone)]
pub struct PaymentPlan {
    /// The run as it should be stored: processed, rows annotated with their
    /// payment entry and check number
    pub check_run: CheckRun,
    pub payment_entries: Vec<PaymentEntry>,

    /// Purchase invoices whose hold is cleared
    pub released_holds: Vec<String>,
    pub outstanding_updates: Vec<OutstandingUpdate>,

    /// New last check number for the bank account, when checks were issued
    pub bank_last_check_number: Option<i64>,

    /// Re-check the printed numbers against the bank account on commit
    pub unique_check_numbers: bool,
}

impl PaymentPlan {
    /// Inclusive range of check numbers this plan prints.
    pub fn check_number_range(&self) -> Option<(i64, i64)> {
        let mut numbers = self.payment_entries.iter().filter_map(|e| e.check_number);
        let first = numbers.next()?;
        let last = numbers.fold(first, |_, n| n);
        Some((first, last))
    }
}

/// Rows of one party paid with one mode of payment.
type GroupKey = (PartyType, String, String);

/// Whether an outstanding balance still covers `amount`: same sign, and no
/// larger in magnitude.
pub fn covers(outstanding_cents: i64, amount_cents: i64) -> bool {
    if amount_cents >= 0 {
        outstanding_cents >= amount_cents
    } else {
        outstanding_cents <= amount_cents
    }
}

/// Format signed cents as a decimal amount, e.g. `-1000.00`.
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

/// Validate a check run and plan its payments.
///
/// # Arguments
///
/// * `run` - Draft check run with the user's pay flags
/// * `settings` - Check run settings for the run's accounts
/// * `modes` - Known modes of payment
/// * `sources` - Current state of every source flagged for payment
///
/// # Errors
///
/// `Validation` with the user-facing reason when any rule is broken.
pub fn build_payment_plan(
    run: &CheckRun,
    settings: &CheckRunSettings,
    modes: &[ModeOfPayment],
    sources: &HashMap<SourceRef, SourceSnapshot>,
) -> Result<PaymentPlan, AppError> {
    if !run.is_draft() {
        return Err(AppError::validation(format!(
            "Check Run {} has already been processed",
            run.id
        )));
    }

    let flagged: Vec<&TransactionRow> = run.rows_to_pay().collect();
    if flagged.is_empty() {
        return Err(AppError::validation("No transactions selected for payment"));
    }

    let modes: HashMap<&str, &ModeOfPayment> =
        modes.iter().map(|m| (m.name.as_str(), m)).collect();

    for row in &flagged {
        let mode = row.mode_of_payment.as_deref().ok_or_else(|| {
            AppError::validation(format!(
                "Mode of Payment is required for {} {}",
                row.doctype, row.name
            ))
        })?;
        if !modes.contains_key(mode) {
            return Err(AppError::validation(format!(
                "Mode of Payment {mode} does not exist"
            )));
        }
    }

    let released_holds = revalidate_sources(&flagged, settings, sources)?;

    let mut groups: BTreeMap<GroupKey, Vec<&TransactionRow>> = BTreeMap::new();
    for row in &flagged {
        // Presence checked above
        let mode = row.mode_of_payment.clone().unwrap_or_default();
        groups
            .entry((row.party_type, row.party.clone(), mode))
            .or_default()
            .push(*row);
    }

    let now = Utc::now();
    let mut check_number = run.last_check_number;
    let mut payment_entries = Vec::new();
    let mut paid_groups: HashMap<GroupKey, (Uuid, Option<i64>)> = HashMap::new();

    for (key, rows) in &groups {
        let (party_type, party, mode_name) = key;
        let net = rows
            .iter()
            .try_fold(0i64, |acc, r| acc.checked_add(r.amount_cents))
            .ok_or_else(|| {
                AppError::validation(format!("Payment to {party} is out of range"))
            })?;

        if net < 0 && !settings.allow_stand_alone_debit_notes {
            return Err(AppError::validation(format!(
                "Stand-alone debit notes are not allowed: payment to {party} nets to {}",
                format_cents(net)
            )));
        }

        // Offsetting rows settle each other without a payment
        if net == 0 {
            continue;
        }

        let issues_check = modes
            .get(mode_name.as_str())
            .is_some_and(|mode| mode.issues_checks());
        let entry_check_number = if issues_check && net > 0 {
            check_number += 1;
            Some(check_number)
        } else {
            None
        };

        let entry = PaymentEntry {
            id: Uuid::new_v4(),
            check_run_id: run.id,
            company: run.company.clone(),
            party_type: *party_type,
            party: party.clone(),
            mode_of_payment: mode_name.clone(),
            bank_account: run.bank_account.clone(),
            payable_account: run.payable_account.clone(),
            posting_date: run.posting_date,
            // A payment cannot carry a negative amount
            paid_amount_cents: net.max(0),
            check_number: entry_check_number,
            reference_no: entry_check_number
                .map(|n| n.to_string())
                .unwrap_or_else(|| run.id.to_string()),
            references: rows
                .iter()
                .map(|r| PaymentReference {
                    doctype: r.doctype,
                    name: r.name.clone(),
                    installment: r.installment,
                    allocated_cents: r.amount_cents,
                })
                .collect(),
            created_at: now,
        };

        if entry.difference_amount() != 0 {
            return Err(AppError::validation("Difference Amount must be zero"));
        }

        paid_groups.insert(key.clone(), (entry.id, entry.check_number));
        payment_entries.push(entry);
    }

    let outstanding_updates = flagged
        .iter()
        .map(|row| OutstandingUpdate {
            source: row.source_ref(),
            amount_cents: row.amount_cents,
        })
        .collect();

    let mut processed = run.clone();
    for row in processed.transactions.iter_mut().filter(|r| r.pay) {
        let key = (
            row.party_type,
            row.party.clone(),
            row.mode_of_payment.clone().unwrap_or_default(),
        );
        if let Some(&(entry_id, number)) = paid_groups.get(&key) {
            row.payment_entry = Some(entry_id);
            row.check_number = number;
        }
    }
    processed.status = CheckRunStatus::Processed;
    processed.last_check_number = check_number;
    processed.updated_at = now;

    let bank_last_check_number = (check_number > run.last_check_number).then_some(check_number);

    Ok(PaymentPlan {
        check_run: processed,
        payment_entries,
        released_holds,
        outstanding_updates,
        bank_last_check_number,
        unique_check_numbers: settings.validate_unique_check_number,
    })
}

/// Re-check flagged rows against the current source documents.
///
/// Returns the invoices whose hold the settings release.
fn revalidate_sources(
    flagged: &[&TransactionRow],
    settings: &CheckRunSettings,
    sources: &HashMap<SourceRef, SourceSnapshot>,
) -> Result<Vec<String>, AppError> {
    reject_overlapping_rows(flagged)?;

    let mut released = Vec::new();

    for row in flagged {
        let snapshot = sources.get(&row.source_ref()).ok_or_else(|| {
            AppError::validation(format!("{} {} is no longer outstanding", row.doctype, row.name))
        })?;

        if snapshot.party_type != row.party_type || snapshot.party != row.party {
            return Err(AppError::validation(format!(
                "{} {} is payable to {}, not {}",
                row.doctype, row.name, snapshot.party, row.party
            )));
        }

        if snapshot.on_hold {
            if !settings.automatically_release_on_hold_invoices {
                return Err(on_hold(&row.source_ref()));
            }
            if !released.contains(&row.name) {
                tracing::warn!("Releasing hold on Purchase Invoice {}", row.name);
                released.push(row.name.clone());
            }
        }

        if !covers(snapshot.outstanding_cents, row.amount_cents) {
            return Err(stale_amount(&row.source_ref(), snapshot.outstanding_cents));
        }
    }

    Ok(released)
}

/// The source's outstanding amount moved since the entries were loaded.
pub fn stale_amount(source: &SourceRef, outstanding_cents: i64) -> AppError {
    AppError::validation(format!(
        "{} {} has an outstanding amount of {}; refresh the check run entries",
        source.doctype,
        source.name,
        format_cents(outstanding_cents)
    ))
}

pub fn on_hold(source: &SourceRef) -> AppError {
    AppError::validation(format!("{} {} is on hold", source.doctype, source.name))
}

/// A source may be flagged once. A whole-invoice row covers every installment
/// of that invoice.
fn reject_overlapping_rows(flagged: &[&TransactionRow]) -> Result<(), AppError> {
    let mut flagged_installments: HashMap<(SourceDocType, &str), Vec<Option<i32>>> =
        HashMap::new();

    for row in flagged {
        let seen = flagged_installments
            .entry((row.doctype, row.name.as_str()))
            .or_default();
        let overlaps = !seen.is_empty()
            && (row.installment.is_none()
                || seen.contains(&None)
                || seen.contains(&row.installment));
        if overlaps {
            return Err(AppError::validation(format!(
                "{} {} is selected for payment more than once",
                row.doctype, row.name
            )));
        }
        seen.push(row.installment);
    }

    Ok(())
}

/// Reject check numbers that were already printed from the same account.
pub fn validate_check_numbers(plan: &PaymentPlan, used: &[i64]) -> Result<(), AppError> {
    for entry in &plan.payment_entries {
        if let Some(number) = entry.check_number {
            if used.contains(&number) {
                return Err(AppError::validation(format!(
                    "Check Number {number} has already been used on {}",
                    entry.bank_account
                )));
            }
        }
    }
    Ok(())
}
