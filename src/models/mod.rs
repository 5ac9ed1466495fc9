//! Data models representing database entities.
//!
//! This module contains the documents the service reads and writes, plus the
//! request and response types exchanged with API clients.

/// Check run document and its transaction rows
pub mod check_run;
/// Companies, bank accounts and modes of payment
pub mod company;
/// Payment entries created by processing a check run
pub mod payment_entry;
/// Per bank/payable account check run policy
pub mod settings;
/// Payable source documents (invoices, journal entries, expense claims)
pub mod source_document;
