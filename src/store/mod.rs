//! Persistence for check runs and the documents they pay.
//!
//! Services talk to storage only through [`CheckRunStore`]. Production uses
//! [`postgres::PgStore`]; tests use the in-memory store.
//!
//! # Atomicity
//!
//! Every method is a single unit of work. `commit_payment_plan` in particular
//! must apply all of a plan's writes or none of them.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        check_run::CheckRun,
        company::{BankAccount, Company, ModeOfPayment},
        payment_entry::PaymentEntry,
        settings::CheckRunSettings,
        source_document::{OutstandingDocuments, SourceRef, SourceSnapshot},
    },
    services::payment_processor::PaymentPlan,
};

#[cfg(test)]
pub mod memory;
pub mod postgres;

#[async_trait]
pub trait CheckRunStore: Send + Sync {
    /// Verify the backing storage is reachable.
    async fn ping(&self) -> Result<(), AppError>;

    async fn get_company(&self, name: &str) -> Result<Option<Company>, AppError>;

    async fn get_bank_account(&self, name: &str) -> Result<Option<BankAccount>, AppError>;

    async fn list_modes_of_payment(&self) -> Result<Vec<ModeOfPayment>, AppError>;

    async fn find_settings(
        &self,
        company: &str,
        bank_account: &str,
        payable_account: &str,
    ) -> Result<Option<CheckRunSettings>, AppError>;

    /// Insert settings, or replace the flags of the existing record for the
    /// same company / bank account / payable account.
    async fn upsert_settings(
        &self,
        settings: &CheckRunSettings,
    ) -> Result<CheckRunSettings, AppError>;

    async fn find_draft_check_run(
        &self,
        company: &str,
        bank_account: &str,
        payable_account: &str,
    ) -> Result<Option<CheckRun>, AppError>;

    async fn insert_check_run(&self, run: &CheckRun) -> Result<CheckRun, AppError>;

    async fn get_check_run(&self, id: Uuid) -> Result<Option<CheckRun>, AppError>;

    /// Persist edits to a draft.
    ///
    /// Fails with a validation error if the run is no longer a draft.
    async fn update_draft_check_run(&self, run: &CheckRun) -> Result<CheckRun, AppError>;

    /// Submitted payables of a company booked against `payable_account`,
    /// posted on or before `end_date`, with nonzero outstanding.
    async fn outstanding_documents(
        &self,
        company: &str,
        payable_account: &str,
        end_date: NaiveDate,
    ) -> Result<OutstandingDocuments, AppError>;

    /// Current party, outstanding and hold state of the given sources.
    ///
    /// Sources that no longer exist are absent from the map.
    async fn source_snapshots(
        &self,
        refs: &[SourceRef],
    ) -> Result<HashMap<SourceRef, SourceSnapshot>, AppError>;

    /// Apply a processed check run atomically and return the stored run.
    ///
    /// Re-checks under lock what the plan was built from: each source must
    /// still cover its amount and not be on hold, and when
    /// `plan.unique_check_numbers` is set no check number in the plan may
    /// already be printed from the bank account. Any failure leaves storage
    /// untouched.
    async fn commit_payment_plan(&self, plan: &PaymentPlan) -> Result<CheckRun, AppError>;

    async fn payment_entries_for_check_run(
        &self,
        check_run_id: Uuid,
    ) -> Result<Vec<PaymentEntry>, AppError>;
}

/// Error returned when a draft was processed concurrently.
pub(crate) fn already_processed(id: Uuid) -> AppError {
    AppError::validation(format!(
        "Check Run {id} has already been processed and cannot be changed"
    ))
}
