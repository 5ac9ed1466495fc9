//! Check run HTTP handlers.
//!
//! This module implements the check run document endpoints:
//! - POST /api/v1/check-runs/draft - Find or create the draft for an account pairing
//! - GET /api/v1/check-runs/:id - Get a check run
//! - PUT /api/v1/check-runs/:id - Save edits to a draft
//! - POST /api/v1/check-runs/:id/last-check-number - Reload the bank's last check number
//! - POST /api/v1/check-runs/:id/default-payable-account - Fill the company default
//! - GET /api/v1/check-runs/:id/entries - Select outstanding payables
//! - POST /api/v1/check-runs/:id/process - Create payment entries
//! - GET /api/v1/check-runs/:id/payment-entries - Payments created by a run

use crate::{
    error::AppError,
    handlers::AppState,
    models::{
        check_run::{
            CheckRun, DraftCheckRunRequest, DraftCheckRunResponse, EntriesResponse,
            SaveCheckRunRequest,
        },
        payment_entry::PaymentEntry,
    },
    services::check_run_service,
};
use axum::{
    Json,
    extract::{Path, State},
};
use uuid::Uuid;

/// Find or create the draft check run.
///
/// # Request Body
///
/// ```json
/// {
///   "company": "Chelsea Fruit Co",
///   "bank_account": "Primary Checking - Local Bank",
///   "payable_account": "2110 - Accounts Payable - CFC"
/// }
/// ```
///
/// # Response (200)
///
/// ```json
/// { "id": "550e8400-e29b-41d4-a716-446655440000" }
/// ```
///
/// Calling this again for the same accounts returns the same id until the
/// draft is processed.
pub async fn find_or_create_draft(
    State(state): State<AppState>,
    Json(request): Json<DraftCheckRunRequest>,
) -> Result<Json<DraftCheckRunResponse>, AppError> {
    if request.company.trim().is_empty() || request.bank_account.trim().is_empty() {
        return Err(AppError::InvalidRequest(
            "company and bank_account are required".to_string(),
        ));
    }

    let id = check_run_service::check_for_draft_check_run(
        state.store.as_ref(),
        &request.company,
        &request.bank_account,
        &request.payable_account,
    )
    .await?;

    Ok(Json(DraftCheckRunResponse { id }))
}

pub async fn get_check_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CheckRun>, AppError> {
    let run = check_run_service::get_check_run(state.store.as_ref(), id).await?;
    Ok(Json(run))
}

/// Save edits to a draft.
///
/// # Request Body
///
/// Every field is optional; omitted fields keep their stored value.
///
/// ```json
/// {
///   "posting_date": "2025-12-31",
///   "end_date": "2025-12-31",
///   "transactions": [ { "doctype": "Purchase Invoice", "pay": true, "...": "..." } ]
/// }
/// ```
///
/// # Response
///
/// - **Success (200 OK)**: The stored draft
/// - **Error (422)**: Already processed or invalid dates
///
/// Saving never creates payments.
pub async fn save_check_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<SaveCheckRunRequest>,
) -> Result<Json<CheckRun>, AppError> {
    let store = state.store.as_ref();
    let mut run = check_run_service::get_check_run(store, id).await?;
    check_run_service::apply_save_request(&mut run, request);

    let run = check_run_service::save_check_run(store, &run).await?;
    Ok(Json(run))
}

/// Reload the last check number from the bank account and save the draft.
pub async fn set_last_check_number(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CheckRun>, AppError> {
    let store = state.store.as_ref();
    let mut run = check_run_service::get_check_run(store, id).await?;
    check_run_service::set_last_check_number(store, &mut run).await?;

    let run = check_run_service::save_check_run(store, &run).await?;
    Ok(Json(run))
}

/// Fill the payable account from the company default and save the draft.
///
/// # Response
///
/// - **Success (200 OK)**: The stored draft
/// - **Error (422)**: The company has no default payable account
pub async fn set_default_payable_account(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CheckRun>, AppError> {
    let store = state.store.as_ref();
    let mut run = check_run_service::get_check_run(store, id).await?;
    check_run_service::set_default_payable_account(store, &mut run).await?;

    let run = check_run_service::save_check_run(store, &run).await?;
    Ok(Json(run))
}

/// Select the outstanding payables for a check run.
///
/// The rows are returned, not stored; the client sends them back with
/// `PUT /api/v1/check-runs/:id` after flagging the ones to pay.
///
/// # Response (200)
///
/// ```json
/// {
///   "transactions": [
///     {
///       "doctype": "Purchase Invoice",
///       "name": "ACC-PINV-2025-00001",
///       "party_type": "Supplier",
///       "party": "Exceptional Grid",
///       "posting_date": "2025-01-15",
///       "due_date": "2025-03-31",
///       "installment": 1,
///       "amount_cents": 50000,
///       "pay": false,
///       "mode_of_payment": "Check"
///     }
///   ]
/// }
/// ```
pub async fn get_entries(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<EntriesResponse>, AppError> {
    let store = state.store.as_ref();
    let run = check_run_service::get_check_run(store, id).await?;

    let entries = check_run_service::get_entries(store, &run).await?;
    Ok(Json(entries))
}

/// Process a draft into payment entries.
///
/// # Response
///
/// - **Success (200 OK)**: The processed check run, rows annotated with
///   their payment entry and check number
/// - **Error (422)**: Any payment rule broken; nothing is written
///
/// ```json
/// {
///   "error": {
///     "code": "validation_error",
///     "message": "Purchase Invoice ACC-PINV-2025-00020 is on hold"
///   }
/// }
/// ```
pub async fn process_check_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CheckRun>, AppError> {
    let run = check_run_service::process_check_run(state.store.as_ref(), id).await?;
    Ok(Json(run))
}

pub async fn list_payment_entries(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<PaymentEntry>>, AppError> {
    let entries = check_run_service::list_payment_entries(state.store.as_ref(), id).await?;
    Ok(Json(entries))
}
