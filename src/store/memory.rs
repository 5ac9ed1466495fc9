//! In-memory [`CheckRunStore`] for tests.
//!
//! All state sits behind one mutex. `commit_payment_plan` applies a plan to a
//! copy of the data and swaps it in only when every re-check passed.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        check_run::{CheckRun, CheckRunStatus},
        company::{BankAccount, Company, ModeOfPayment, ModeOfPaymentKind},
        payment_entry::PaymentEntry,
        settings::CheckRunSettings,
        source_document::{
            ExpenseClaim, JournalEntry, OutstandingDocuments, OutstandingUpdate, PartyType,
            PaymentScheduleLine, PurchaseInvoice, SourceDocType, SourceRef, SourceSnapshot,
        },
    },
    services::payment_processor::{self, PaymentPlan},
    store::{CheckRunStore, already_processed},
};

#[derive(Default, Clone)]
pub struct MemoryData {
    pub companies: HashMap<String, Company>,
    pub bank_accounts: HashMap<String, BankAccount>,
    pub modes_of_payment: Vec<ModeOfPayment>,
    pub settings: Vec<CheckRunSettings>,
    pub check_runs: HashMap<Uuid, CheckRun>,
    pub purchase_invoices: BTreeMap<String, PurchaseInvoice>,
    pub journal_entries: BTreeMap<String, JournalEntry>,
    pub expense_claims: BTreeMap<String, ExpenseClaim>,
    pub payment_entries: Vec<PaymentEntry>,
}

#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<MemoryData>,
}

impl MemoryStore {
    /// Direct access to the stored documents, for test setup and assertions.
    pub fn data(&self) -> MutexGuard<'_, MemoryData> {
        self.data.lock().unwrap()
    }
}

#[async_trait]
impl CheckRunStore for MemoryStore {
    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn get_company(&self, name: &str) -> Result<Option<Company>, AppError> {
        Ok(self.data().companies.get(name).cloned())
    }

    async fn get_bank_account(&self, name: &str) -> Result<Option<BankAccount>, AppError> {
        Ok(self.data().bank_accounts.get(name).cloned())
    }

    async fn list_modes_of_payment(&self) -> Result<Vec<ModeOfPayment>, AppError> {
        Ok(self.data().modes_of_payment.clone())
    }

    async fn find_settings(
        &self,
        company: &str,
        bank_account: &str,
        payable_account: &str,
    ) -> Result<Option<CheckRunSettings>, AppError> {
        Ok(self
            .data()
            .settings
            .iter()
            .find(|s| {
                s.company == company
                    && s.bank_account == bank_account
                    && s.payable_account == payable_account
            })
            .cloned())
    }

    async fn upsert_settings(
        &self,
        settings: &CheckRunSettings,
    ) -> Result<CheckRunSettings, AppError> {
        let mut data = self.data();
        let existing = data.settings.iter().position(|s| {
            s.company == settings.company
                && s.bank_account == settings.bank_account
                && s.payable_account == settings.payable_account
        });

        match existing {
            Some(i) => {
                let id = data.settings[i].id;
                data.settings[i] = CheckRunSettings {
                    id,
                    ..settings.clone()
                };
                Ok(data.settings[i].clone())
            }
            None => {
                data.settings.push(settings.clone());
                Ok(settings.clone())
            }
        }
    }

    async fn find_draft_check_run(
        &self,
        company: &str,
        bank_account: &str,
        payable_account: &str,
    ) -> Result<Option<CheckRun>, AppError> {
        Ok(self
            .data()
            .check_runs
            .values()
            .filter(|r| {
                r.is_draft()
                    && r.company == company
                    && r.bank_account == bank_account
                    && r.payable_account == payable_account
            })
            .min_by_key(|r| r.created_at)
            .cloned())
    }

    async fn insert_check_run(&self, run: &CheckRun) -> Result<CheckRun, AppError> {
        self.data().check_runs.insert(run.id, run.clone());
        Ok(run.clone())
    }

    async fn get_check_run(&self, id: Uuid) -> Result<Option<CheckRun>, AppError> {
        Ok(self.data().check_runs.get(&id).cloned())
    }

    async fn update_draft_check_run(&self, run: &CheckRun) -> Result<CheckRun, AppError> {
        let mut data = self.data();
        match data.check_runs.get_mut(&run.id) {
            Some(stored) if stored.is_draft() => {
                stored.payable_account = run.payable_account.clone();
                stored.posting_date = run.posting_date;
                stored.end_date = run.end_date;
                stored.last_check_number = run.last_check_number;
                stored.transactions = run.transactions.clone();
                stored.updated_at = chrono::Utc::now();
                Ok(stored.clone())
            }
            _ => Err(already_processed(run.id)),
        }
    }

    async fn outstanding_documents(
        &self,
        company: &str,
        payable_account: &str,
        end_date: NaiveDate,
    ) -> Result<OutstandingDocuments, AppError> {
        let data = self.data();
        Ok(OutstandingDocuments {
            purchase_invoices: data
                .purchase_invoices
                .values()
                .filter(|pi| {
                    pi.company == company
                        && pi.credit_to == payable_account
                        && pi.posting_date <= end_date
                        && pi.outstanding_cents != 0
                })
                .cloned()
                .collect(),
            journal_entries: data
                .journal_entries
                .values()
                .filter(|je| {
                    je.company == company
                        && je.account == payable_account
                        && je.posting_date <= end_date
                        && je.outstanding_cents != 0
                })
                .cloned()
                .collect(),
            expense_claims: data
                .expense_claims
                .values()
                .filter(|ec| {
                    ec.company == company
                        && ec.payable_account == payable_account
                        && ec.posting_date <= end_date
                        && ec.outstanding_cents != 0
                })
                .cloned()
                .collect(),
        })
    }

    async fn source_snapshots(
        &self,
        refs: &[SourceRef],
    ) -> Result<HashMap<SourceRef, SourceSnapshot>, AppError> {
        let data = self.data();
        let mut snapshots = HashMap::new();

        for source in refs {
            let snapshot = match source.doctype {
                SourceDocType::PurchaseInvoice => {
                    data.purchase_invoices.get(&source.name).and_then(|pi| {
                        let outstanding_cents = match source.installment {
                            Some(idx) => {
                                pi.payment_schedule
                                    .iter()
                                    .find(|line| line.idx == idx)?
                                    .outstanding_cents
                            }
                            None => pi.outstanding_cents,
                        };
                        Some(SourceSnapshot {
                            party_type: PartyType::Supplier,
                            party: pi.supplier.clone(),
                            outstanding_cents,
                            on_hold: pi.on_hold,
                        })
                    })
                }
                SourceDocType::JournalEntry => {
                    data.journal_entries
                        .get(&source.name)
                        .map(|je| SourceSnapshot {
                            party_type: je.party_type,
                            party: je.party.clone(),
                            outstanding_cents: je.outstanding_cents,
                            on_hold: false,
                        })
                }
                SourceDocType::ExpenseClaim => {
                    data.expense_claims
                        .get(&source.name)
                        .map(|ec| SourceSnapshot {
                            party_type: PartyType::Employee,
                            party: ec.employee.clone(),
                            outstanding_cents: ec.outstanding_cents,
                            on_hold: false,
                        })
                }
            };

            if let Some(snapshot) = snapshot {
                snapshots.insert(source.clone(), snapshot);
            }
        }

        Ok(snapshots)
    }

    async fn commit_payment_plan(&self, plan: &PaymentPlan) -> Result<CheckRun, AppError> {
        let mut data = self.data();
        let run = &plan.check_run;

        if !data.check_runs.get(&run.id).is_some_and(|r| r.is_draft()) {
            return Err(already_processed(run.id));
        }

        let mut next = MemoryData::clone(&data);

        if plan.unique_check_numbers {
            if let Some((first, last)) = plan.check_number_range() {
                let used: Vec<i64> = next
                    .payment_entries
                    .iter()
                    .filter(|e| e.bank_account == run.bank_account)
                    .filter_map(|e| e.check_number)
                    .filter(|n| (first..=last).contains(n))
                    .collect();
                payment_processor::validate_check_numbers(plan, &used)?;
            }
        }

        for name in &plan.released_holds {
            if let Some(pi) = next.purchase_invoices.get_mut(name) {
                pi.on_hold = false;
                pi.release_date = Some(run.posting_date);
            }
        }

        for update in &plan.outstanding_updates {
            settle_source(&mut next, update)?;
        }

        next.payment_entries
            .extend(plan.payment_entries.iter().cloned());

        if let Some(last) = plan.bank_last_check_number {
            if let Some(bank) = next.bank_accounts.get_mut(&run.bank_account) {
                bank.last_check_number = bank.last_check_number.max(last);
            }
        }

        next.check_runs.insert(run.id, run.clone());
        *data = next;

        Ok(run.clone())
    }

    async fn payment_entries_for_check_run(
        &self,
        check_run_id: Uuid,
    ) -> Result<Vec<PaymentEntry>, AppError> {
        Ok(self
            .data()
            .payment_entries
            .iter()
            .filter(|e| e.check_run_id == check_run_id)
            .cloned()
            .collect())
    }
}

/// Check the source still covers the amount, then reduce it.
fn settle_source(data: &mut MemoryData, update: &OutstandingUpdate) -> Result<(), AppError> {
    let source = &update.source;
    let amount = update.amount_cents;
    let settle = |outstanding: &mut i64| {
        if !payment_processor::covers(*outstanding, amount) {
            return Err(payment_processor::stale_amount(source, *outstanding));
        }
        *outstanding -= amount;
        Ok(())
    };

    match source.doctype {
        SourceDocType::PurchaseInvoice => {
            let pi = data
                .purchase_invoices
                .get_mut(&source.name)
                .ok_or_else(|| payment_processor::stale_amount(source, 0))?;
            if pi.on_hold {
                return Err(payment_processor::on_hold(source));
            }
            if let Some(idx) = source.installment {
                let line = pi
                    .payment_schedule
                    .iter_mut()
                    .find(|line| line.idx == idx)
                    .ok_or_else(|| payment_processor::stale_amount(source, 0))?;
                settle(&mut line.outstanding_cents)?;
            }
            settle(&mut pi.outstanding_cents)
        }
        SourceDocType::JournalEntry => {
            let je = data
                .journal_entries
                .get_mut(&source.name)
                .ok_or_else(|| payment_processor::stale_amount(source, 0))?;
            settle(&mut je.outstanding_cents)
        }
        SourceDocType::ExpenseClaim => {
            let ec = data
                .expense_claims
                .get_mut(&source.name)
                .ok_or_else(|| payment_processor::stale_amount(source, 0))?;
            settle(&mut ec.outstanding_cents)
        }
    }
}

pub const COMPANY: &str = "Chelsea Fruit Co";
pub const BANK_ACCOUNT: &str = "Primary Checking - Local Bank";
pub const PAYABLE_ACCOUNT: &str = "2110 - Accounts Payable - CFC";
pub const YEAR: i32 = 2025;
pub const TIRELESS: &str = "Tireless Equipment Rental, Inc";

pub fn date(month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(YEAR, month, day).unwrap()
}

fn supplier_invoice(
    name: &str,
    supplier: &str,
    posting_date: NaiveDate,
    outstanding_cents: i64,
    mode: &str,
) -> PurchaseInvoice {
    PurchaseInvoice {
        name: name.to_string(),
        company: COMPANY.to_string(),
        supplier: supplier.to_string(),
        bill_no: None,
        credit_to: PAYABLE_ACCOUNT.to_string(),
        posting_date,
        due_date: posting_date.checked_add_days(chrono::Days::new(30)),
        outstanding_cents,
        on_hold: false,
        release_date: None,
        is_return: false,
        return_against: None,
        default_mode_of_payment: Some(mode.to_string()),
        payment_schedule: Vec::new(),
    }
}

/// A store holding the "Chelsea Fruit Co" demo company.
///
/// - `ACC-PINV-2025-00001`: Exceptional Grid, three open installments
/// - `ACC-PINV-2025-00020`: Liu & Loewen Accountants LLP, on hold
/// - `ACC-PINV-2025-00010` / `00011`: Cooperative Ag Finance, 9000.00 in
///   total; `00011` is posted on Dec 31
/// - `ACC-PINV-2025-00012`: Cooperative Ag Finance stand-alone debit note
/// - `ACC-PINV-2025-00040` / `00041`: Tireless Equipment Rental, Inc invoice
///   of 3000.00 and a 1000.00 debit note returned against it
/// - `ACC-JV-2025-00001`: journal entry for Mare Tranquillitatis
/// - `HR-EXP-2025-00001`: expense claim for employee HR-EMP-00001
/// - `ACC-PINV-2025-00030`: booked against another payable account
pub fn seeded() -> MemoryStore {
    let store = MemoryStore::default();
    {
        let mut data = store.data();

        data.companies.insert(
            COMPANY.to_string(),
            Company {
                name: COMPANY.to_string(),
                default_payable_account: Some(PAYABLE_ACCOUNT.to_string()),
            },
        );
        data.bank_accounts.insert(
            BANK_ACCOUNT.to_string(),
            BankAccount {
                name: BANK_ACCOUNT.to_string(),
                company: COMPANY.to_string(),
                last_check_number: 1000,
            },
        );
        data.modes_of_payment = vec![
            ModeOfPayment {
                name: "Check".to_string(),
                kind: ModeOfPaymentKind::Check,
            },
            ModeOfPayment {
                name: "ACH/EFT".to_string(),
                kind: ModeOfPaymentKind::Electronic,
            },
            ModeOfPayment {
                name: "Credit Card".to_string(),
                kind: ModeOfPaymentKind::Electronic,
            },
            ModeOfPayment {
                name: "Cash".to_string(),
                kind: ModeOfPaymentKind::Cash,
            },
        ];

        let mut installments = supplier_invoice(
            "ACC-PINV-2025-00001",
            "Exceptional Grid",
            date(1, 15),
            150000,
            "Check",
        );
        installments.payment_schedule = [(1, date(3, 31)), (2, date(6, 30)), (3, date(9, 30))]
            .into_iter()
            .map(|(idx, due_date)| PaymentScheduleLine {
                idx,
                due_date,
                outstanding_cents: 50000,
            })
            .collect();

        let mut on_hold = supplier_invoice(
            "ACC-PINV-2025-00020",
            "Liu & Loewen Accountants LLP",
            date(6, 1),
            250000,
            "Check",
        );
        on_hold.on_hold = true;

        let mut debit_note = supplier_invoice(
            "ACC-PINV-2025-00012",
            "Cooperative Ag Finance",
            date(7, 1),
            -100000,
            "Check",
        );
        debit_note.is_return = true;

        let mut linked_return = supplier_invoice(
            "ACC-PINV-2025-00041",
            TIRELESS,
            date(9, 15),
            -100000,
            "Check",
        );
        linked_return.is_return = true;
        linked_return.return_against = Some("ACC-PINV-2025-00040".to_string());

        let mut other_account = supplier_invoice(
            "ACC-PINV-2025-00030",
            "Exceptional Grid",
            date(2, 1),
            75000,
            "Check",
        );
        other_account.credit_to = "2120 - Payroll Payable - CFC".to_string();

        for invoice in [
            installments,
            on_hold,
            supplier_invoice(
                "ACC-PINV-2025-00010",
                "Cooperative Ag Finance",
                date(5, 1),
                500000,
                "Check",
            ),
            supplier_invoice(
                "ACC-PINV-2025-00011",
                "Cooperative Ag Finance",
                date(12, 31),
                400000,
                "Check",
            ),
            debit_note,
            supplier_invoice("ACC-PINV-2025-00040", TIRELESS, date(9, 1), 300000, "Check"),
            linked_return,
            other_account,
        ] {
            data.purchase_invoices.insert(invoice.name.clone(), invoice);
        }

        data.journal_entries.insert(
            "ACC-JV-2025-00001".to_string(),
            JournalEntry {
                name: "ACC-JV-2025-00001".to_string(),
                company: COMPANY.to_string(),
                party_type: PartyType::Supplier,
                party: "Mare Tranquillitatis".to_string(),
                account: PAYABLE_ACCOUNT.to_string(),
                cheque_no: Some("MT-42".to_string()),
                posting_date: date(4, 10),
                due_date: None,
                outstanding_cents: 120000,
                default_mode_of_payment: Some("ACH/EFT".to_string()),
            },
        );

        data.expense_claims.insert(
            "HR-EXP-2025-00001".to_string(),
            ExpenseClaim {
                name: "HR-EXP-2025-00001".to_string(),
                company: COMPANY.to_string(),
                employee: "HR-EMP-00001".to_string(),
                employee_name: "Deepshi Garg".to_string(),
                payable_account: PAYABLE_ACCOUNT.to_string(),
                posting_date: date(8, 20),
                outstanding_cents: 35000,
                default_mode_of_payment: Some("Check".to_string()),
            },
        );
    }
    store
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn commit_refuses_a_run_that_is_not_a_draft() {
        let store = seeded();
        let mut run = CheckRun::new_draft(COMPANY, BANK_ACCOUNT, PAYABLE_ACCOUNT, date(12, 31), 0);
        run.status = CheckRunStatus::Processed;
        store.insert_check_run(&run).await.unwrap();

        let plan = PaymentPlan {
            check_run: run.clone(),
            payment_entries: Vec::new(),
            released_holds: Vec::new(),
            outstanding_updates: Vec::new(),
            bank_last_check_number: None,
            unique_check_numbers: false,
        };

        assert!(store.commit_payment_plan(&plan).await.is_err());
    }

    #[tokio::test]
    async fn commit_rejects_a_source_paid_since_planning() {
        let store = seeded();
        let run = CheckRun::new_draft(COMPANY, BANK_ACCOUNT, PAYABLE_ACCOUNT, date(12, 31), 1000);
        store.insert_check_run(&run).await.unwrap();

        let claim = SourceRef {
            doctype: SourceDocType::ExpenseClaim,
            name: "HR-EXP-2025-00001".to_string(),
            installment: None,
        };
        let journal_entry = SourceRef {
            doctype: SourceDocType::JournalEntry,
            name: "ACC-JV-2025-00001".to_string(),
            installment: None,
        };
        let mut processed = run.clone();
        processed.status = CheckRunStatus::Processed;
        let plan = PaymentPlan {
            check_run: processed,
            payment_entries: Vec::new(),
            released_holds: Vec::new(),
            outstanding_updates: vec![
                OutstandingUpdate {
                    source: journal_entry,
                    amount_cents: 120000,
                },
                OutstandingUpdate {
                    source: claim,
                    amount_cents: 35000,
                },
            ],
            bank_last_check_number: None,
            unique_check_numbers: false,
        };

        // Another run settled part of the claim in the meantime
        store
            .data()
            .expense_claims
            .get_mut("HR-EXP-2025-00001")
            .unwrap()
            .outstanding_cents = 10000;

        let err = store.commit_payment_plan(&plan).await.unwrap_err();
        assert!(err.to_string().contains("refresh the check run entries"));

        let data = store.data();
        assert_eq!(data.journal_entries["ACC-JV-2025-00001"].outstanding_cents, 120000);
        assert!(data.check_runs[&run.id].is_draft());
    }

    #[tokio::test]
    async fn installment_snapshot_reads_the_schedule_line() {
        let store = seeded();
        let refs = vec![SourceRef {
            doctype: SourceDocType::PurchaseInvoice,
            name: "ACC-PINV-2025-00001".to_string(),
            installment: Some(2),
        }];

        let snapshots = store.source_snapshots(&refs).await.unwrap();

        assert_eq!(snapshots[&refs[0]].outstanding_cents, 50000);
    }
}
