//! Check run service - lifecycle of a check run document.
//!
//! This service handles:
//! - Finding or creating the draft check run for an account pairing
//! - Loading (and lazily creating) check run settings
//! - Selecting outstanding entries
//! - Filling defaults (last check number, payable account)
//! - Saving user edits to a draft
//! - Processing a draft into payment entries
//!
//! # Lifecycle
//!
//! `Draft` → `Processed`. Saving never creates payments; processing is the
//! only path that does, and it is applied atomically by the store.

use chrono::Local;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        check_run::{CheckRun, EntriesResponse, SaveCheckRunRequest},
        payment_entry::PaymentEntry,
        settings::{CheckRunSettings, UpdateSettingsRequest},
        source_document::SourceRef,
    },
    services::{entry_selector, payment_processor},
    store::{CheckRunStore, already_processed},
};

/// Get a check run by id.
///
/// # Errors
///
/// - `NotFound`: No check run with this id
pub async fn get_check_run(store: &dyn CheckRunStore, id: Uuid) -> Result<CheckRun, AppError> {
    store
        .get_check_run(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Check Run {id}")))
}

/// Return the draft check run for a company / bank account / payable account,
/// creating it when none exists.
///
/// # Process
///
/// 1. Verify the company exists and owns the bank account
/// 2. Fall back to the company's default payable account when none is given
/// 3. Return the oldest open draft for the triple, if any
/// 4. Otherwise insert a new draft dated today, starting from the bank
///    account's last check number
///
/// # Errors
///
/// - `NotFound`: Company or bank account doesn't exist
/// - `Validation`: Bank account belongs to another company
pub async fn check_for_draft_check_run(
    store: &dyn CheckRunStore,
    company: &str,
    bank_account: &str,
    payable_account: &str,
) -> Result<Uuid, AppError> {
    let company_doc = store
        .get_company(company)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Company {company}")))?;

    let bank = store
        .get_bank_account(bank_account)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Bank Account {bank_account}")))?;

    if bank.company != company {
        return Err(AppError::validation(format!(
            "Bank Account {bank_account} does not belong to {company}"
        )));
    }

    let payable_account = match payable_account {
        "" => company_doc.default_payable_account.as_deref().unwrap_or_default(),
        account => account,
    };

    if let Some(draft) = store
        .find_draft_check_run(company, bank_account, payable_account)
        .await?
    {
        return Ok(draft.id);
    }

    let run = CheckRun::new_draft(
        company,
        bank_account,
        payable_account,
        Local::now().date_naive(),
        bank.last_check_number,
    );
    let run = store.insert_check_run(&run).await?;
    tracing::info!(
        "Created draft Check Run {} for {} / {}",
        run.id,
        company,
        bank_account
    );

    Ok(run.id)
}

/// Get the settings for a check run's accounts, creating defaults when none
/// exist yet.
pub async fn get_check_run_settings(
    store: &dyn CheckRunStore,
    run: &CheckRun,
) -> Result<CheckRunSettings, AppError> {
    if let Some(settings) = store
        .find_settings(&run.company, &run.bank_account, &run.payable_account)
        .await?
    {
        return Ok(settings);
    }

    if run.payable_account.is_empty() {
        return Err(AppError::validation(
            "Payable Account is required before Check Run Settings can be created",
        ));
    }

    let settings = CheckRunSettings::new(&run.company, &run.bank_account, &run.payable_account);
    let settings = store.upsert_settings(&settings).await?;
    tracing::info!(
        "Created Check Run Settings for {} / {}",
        run.bank_account,
        run.payable_account
    );

    Ok(settings)
}

/// Change the settings for a check run's accounts.
pub async fn update_check_run_settings(
    store: &dyn CheckRunStore,
    run: &CheckRun,
    update: UpdateSettingsRequest,
) -> Result<CheckRunSettings, AppError> {
    let mut settings = get_check_run_settings(store, run).await?;
    settings.apply(update);
    store.upsert_settings(&settings).await
}

/// Settings that must already exist; never created on the fly.
async fn require_settings(
    store: &dyn CheckRunStore,
    run: &CheckRun,
) -> Result<CheckRunSettings, AppError> {
    store
        .find_settings(&run.company, &run.bank_account, &run.payable_account)
        .await?
        .ok_or_else(|| {
            AppError::validation(format!(
                "Check Run Settings not found for {} and {}",
                run.bank_account, run.payable_account
            ))
        })
}

/// Select the outstanding payables a check run can pay.
///
/// # Errors
///
/// - `Validation`: No Check Run Settings exist for the run's accounts
pub async fn get_entries(
    store: &dyn CheckRunStore,
    run: &CheckRun,
) -> Result<EntriesResponse, AppError> {
    let settings = require_settings(store, run).await?;

    let documents = store
        .outstanding_documents(&run.company, &run.payable_account, run.end_date)
        .await?;
    let transactions = entry_selector::select_entries(&settings, documents, run.end_date);

    tracing::info!(
        "Selected {} entries for Check Run {} through {}",
        transactions.len(),
        run.id,
        run.end_date
    );

    Ok(EntriesResponse { transactions })
}

/// Copy the bank account's last check number onto the run.
pub async fn set_last_check_number(
    store: &dyn CheckRunStore,
    run: &mut CheckRun,
) -> Result<(), AppError> {
    let bank = store
        .get_bank_account(&run.bank_account)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Bank Account {}", run.bank_account)))?;

    run.last_check_number = bank.last_check_number;
    Ok(())
}

/// Fill the payable account from the company default when the run has none.
///
/// # Errors
///
/// - `Validation`: The company has no default payable account
pub async fn set_default_payable_account(
    store: &dyn CheckRunStore,
    run: &mut CheckRun,
) -> Result<(), AppError> {
    if !run.payable_account.is_empty() {
        return Ok(());
    }

    let company = store
        .get_company(&run.company)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Company {}", run.company)))?;

    run.payable_account = company.default_payable_account.ok_or_else(|| {
        AppError::validation(format!(
            "Company {} has no default payable account",
            run.company
        ))
    })?;
    Ok(())
}

/// Apply a client's edits to an in-memory run.
pub fn apply_save_request(run: &mut CheckRun, request: SaveCheckRunRequest) {
    if let Some(posting_date) = request.posting_date {
        run.posting_date = posting_date;
    }
    if let Some(end_date) = request.end_date {
        run.end_date = end_date;
    }
    if let Some(last_check_number) = request.last_check_number {
        run.last_check_number = last_check_number;
    }
    if let Some(payable_account) = request.payable_account {
        run.payable_account = payable_account;
    }
    if let Some(transactions) = request.transactions {
        run.transactions = transactions;
    }
}

/// Persist a draft.
///
/// Only validates and stores; never creates payments.
///
/// # Errors
///
/// - `Validation`: Run already processed, end date after posting date, or a
///   negative last check number
pub async fn save_check_run(
    store: &dyn CheckRunStore,
    run: &CheckRun,
) -> Result<CheckRun, AppError> {
    if !run.is_draft() {
        return Err(already_processed(run.id));
    }
    if run.end_date > run.posting_date {
        return Err(AppError::validation(format!(
            "End Date {} cannot be after Posting Date {}",
            run.end_date, run.posting_date
        )));
    }
    if run.last_check_number < 0 {
        return Err(AppError::validation("Last Check Number cannot be negative"));
    }

    store.update_draft_check_run(run).await
}

/// Process a draft check run into payment entries.
///
/// # Process
///
/// 1. Load the run, its settings and the known modes of payment
/// 2. Re-read every flagged source document
/// 3. Build the payment plan (all business validation happens here)
/// 4. Commit the plan in one store transaction, which re-checks the sources
///    and check numbers under lock
///
/// # Errors
///
/// - `NotFound`: No check run with this id
/// - `Validation`: Settings missing or any payment rule broken; nothing is
///   written
pub async fn process_check_run(store: &dyn CheckRunStore, id: Uuid) -> Result<CheckRun, AppError> {
    let run = get_check_run(store, id).await?;
    if !run.is_draft() {
        return Err(already_processed(run.id));
    }

    let settings = require_settings(store, &run).await?;
    let modes = store.list_modes_of_payment().await?;
    let refs: Vec<SourceRef> = run.rows_to_pay().map(|row| row.source_ref()).collect();
    let sources = store.source_snapshots(&refs).await?;

    let plan = payment_processor::build_payment_plan(&run, &settings, &modes, &sources)
        .inspect_err(|e| tracing::warn!("Check Run {} rejected: {}", run.id, e))?;

    let processed = store
        .commit_payment_plan(&plan)
        .await
        .inspect_err(|e| tracing::warn!("Check Run {} rejected: {}", run.id, e))?;
    tracing::info!(
        "Processed Check Run {}: {} payment entries, last check number {}",
        processed.id,
        plan.payment_entries.len(),
        processed.last_check_number
    );

    Ok(processed)
}

/// Payment entries created by a check run.
pub async fn list_payment_entries(
    store: &dyn CheckRunStore,
    id: Uuid,
) -> Result<Vec<PaymentEntry>, AppError> {
    get_check_run(store, id).await?;
    store.payment_entries_for_check_run(id).await
}
