//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Receives HTTP request data (JSON body, URL params, etc.)
//! 2. Calls into `services::check_run_service`
//! 3. Returns HTTP response (JSON, status code)

use std::sync::Arc;

use crate::store::CheckRunStore;

/// Check run document endpoints
pub mod check_runs;
pub mod health;
/// Check run settings endpoints
pub mod settings;

/// State shared with every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CheckRunStore>,
}
