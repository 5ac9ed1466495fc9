//! Check run settings HTTP handlers.
//!
//! Settings belong to a company / bank account / payable account triple and
//! are addressed through any check run using those accounts:
//! - GET /api/v1/check-runs/:id/settings - Get settings, creating defaults
//! - PUT /api/v1/check-runs/:id/settings - Change settings

use crate::{
    error::AppError,
    handlers::AppState,
    models::settings::{CheckRunSettings, UpdateSettingsRequest},
    services::check_run_service,
};
use axum::{
    Json,
    extract::{Path, State},
};
use uuid::Uuid;

/// Get the settings for a check run's accounts.
///
/// # Response (200)
///
/// ```json
/// {
///   "id": "770e8400-...",
///   "company": "Chelsea Fruit Co",
///   "bank_account": "Primary Checking - Local Bank",
///   "payable_account": "2110 - Accounts Payable - CFC",
///   "include_purchase_invoices": true,
///   "include_journal_entries": true,
///   "include_expense_claims": true,
///   "allow_stand_alone_debit_notes": false,
///   "automatically_release_on_hold_invoices": false,
///   "validate_unique_check_number": true,
///   "excluded_parties": []
/// }
/// ```
pub async fn get_settings(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CheckRunSettings>, AppError> {
    let store = state.store.as_ref();
    let run = check_run_service::get_check_run(store, id).await?;

    let settings = check_run_service::get_check_run_settings(store, &run).await?;
    Ok(Json(settings))
}

/// Change the settings for a check run's accounts.
///
/// Omitted fields keep their current value.
///
/// ```json
/// { "automatically_release_on_hold_invoices": true }
/// ```
pub async fn update_settings(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateSettingsRequest>,
) -> Result<Json<CheckRunSettings>, AppError> {
    let store = state.store.as_ref();
    let run = check_run_service::get_check_run(store, id).await?;

    let settings = check_run_service::update_check_run_settings(store, &run, request).await?;
    Ok(Json(settings))
}
