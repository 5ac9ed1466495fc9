//! Business logic services.
//!
//! Services contain core business logic separated from HTTP handlers.
//! Selection and payment planning are pure; `check_run_service` ties them to
//! the store.

pub mod check_run_service;
pub mod entry_selector;
pub mod payment_processor;
