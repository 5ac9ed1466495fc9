//! Entry selector - turns outstanding payables into check run rows.
//!
//! The store returns every submitted document with a nonzero outstanding
//! amount; this module applies the check run settings on top:
//! - source types switched off in the settings are skipped
//! - excluded parties are dropped
//! - a debit note returned against an invoice that is still open is always
//!   kept; other negative rows are dropped unless stand-alone debit notes are
//!   allowed
//! - invoices with a payment schedule yield one row per open installment

use std::collections::HashSet;

use chrono::NaiveDate;

use crate::models::{
    check_run::TransactionRow,
    settings::CheckRunSettings,
    source_document::{
        ExpenseClaim, JournalEntry, OutstandingDocuments, PartyType, PurchaseInvoice,
        SourceDocType,
    },
};

/// Build the candidate rows for a check run ending on `end_date`.
///
/// Rows come back with `pay = false` and the party's default mode of
/// payment, ordered by party, due date, document name and installment.
pub fn select_entries(
    settings: &CheckRunSettings,
    documents: OutstandingDocuments,
    end_date: NaiveDate,
) -> Vec<TransactionRow> {
    let mut rows = Vec::new();

    let open_invoices: HashSet<&str> = documents
        .purchase_invoices
        .iter()
        .filter(|pi| !pi.is_return && pi.outstanding_cents > 0 && pi.posting_date <= end_date)
        .map(|pi| pi.name.as_str())
        .collect();
    let linked_debit_notes: HashSet<String> = documents
        .purchase_invoices
        .iter()
        .filter(|pi| {
            pi.is_return
                && pi
                    .return_against
                    .as_deref()
                    .is_some_and(|original| open_invoices.contains(original))
        })
        .map(|pi| pi.name.clone())
        .collect();

    if settings.include_purchase_invoices {
        for invoice in documents.purchase_invoices {
            if invoice.posting_date <= end_date {
                rows.extend(invoice_rows(invoice));
            }
        }
    }

    if settings.include_journal_entries {
        rows.extend(
            documents
                .journal_entries
                .into_iter()
                .filter(|je| je.posting_date <= end_date)
                .map(journal_entry_row),
        );
    }

    if settings.include_expense_claims {
        rows.extend(
            documents
                .expense_claims
                .into_iter()
                .filter(|ec| ec.posting_date <= end_date)
                .map(expense_claim_row),
        );
    }

    rows.retain(|row| {
        row.amount_cents != 0
            && !settings.is_excluded(&row.party)
            && (row.amount_cents > 0
                || settings.allow_stand_alone_debit_notes
                || linked_debit_notes.contains(&row.name))
    });

    rows.sort_by(|a, b| {
        a.party
            .cmp(&b.party)
            .then_with(|| a.sort_date().cmp(&b.sort_date()))
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.installment.cmp(&b.installment))
    });

    rows
}

/// One row per open installment, or a single row for unscheduled invoices.
fn invoice_rows(invoice: PurchaseInvoice) -> Vec<TransactionRow> {
    let base = TransactionRow {
        doctype: SourceDocType::PurchaseInvoice,
        name: invoice.name,
        party_type: PartyType::Supplier,
        party: invoice.supplier,
        ref_number: invoice.bill_no,
        posting_date: invoice.posting_date,
        due_date: invoice.due_date,
        installment: None,
        amount_cents: invoice.outstanding_cents,
        pay: false,
        mode_of_payment: invoice.default_mode_of_payment,
        payment_entry: None,
        check_number: None,
    };

    // Returns never carry a schedule worth splitting
    if invoice.payment_schedule.is_empty() || invoice.is_return {
        return vec![base];
    }

    invoice
        .payment_schedule
        .into_iter()
        .filter(|line| line.outstanding_cents != 0)
        .map(|line| TransactionRow {
            due_date: Some(line.due_date),
            installment: Some(line.idx),
            amount_cents: line.outstanding_cents,
            ..base.clone()
        })
        .collect()
}

fn journal_entry_row(je: JournalEntry) -> TransactionRow {
    TransactionRow {
        doctype: SourceDocType::JournalEntry,
        name: je.name,
        party_type: je.party_type,
        party: je.party,
        ref_number: je.cheque_no,
        posting_date: je.posting_date,
        due_date: je.due_date,
        installment: None,
        amount_cents: je.outstanding_cents,
        pay: false,
        mode_of_payment: je.default_mode_of_payment,
        payment_entry: None,
        check_number: None,
    }
}

fn expense_claim_row(ec: ExpenseClaim) -> TransactionRow {
    TransactionRow {
        doctype: SourceDocType::ExpenseClaim,
        name: ec.name,
        party_type: PartyType::Employee,
        party: ec.employee,
        ref_number: None,
        posting_date: ec.posting_date,
        due_date: None,
        installment: None,
        amount_cents: ec.outstanding_cents,
        pay: false,
        mode_of_payment: ec.default_mode_of_payment,
        payment_entry: None,
        check_number: None,
    }
}
