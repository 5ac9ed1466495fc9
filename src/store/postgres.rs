//! PostgreSQL implementation of [`CheckRunStore`].
//!
//! # Atomicity Guarantees
//!
//! `commit_payment_plan` runs inside one PostgreSQL transaction. The check run
//! row is flipped to `Processed` first with a `status = 'Draft'` guard, so a
//! concurrent second commit finds no draft and rolls back before touching any
//! payable.
//!
//! The plan's inputs are then re-read with `SELECT ... FOR UPDATE`: the bank
//! account row before check numbers are compared, and every source in
//! `SourceRef` order before its outstanding amount is reduced. A source that
//! no longer covers its amount rolls the whole transaction back.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{Postgres, Transaction, types::Json};
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        check_run::{CheckRun, CheckRunStatus, TransactionRow},
        company::{BankAccount, Company, ModeOfPayment, ModeOfPaymentKind},
        payment_entry::{PaymentEntry, PaymentReference},
        settings::CheckRunSettings,
        source_document::{
            ExpenseClaim, JournalEntry, OutstandingDocuments, OutstandingUpdate, PartyType,
            PaymentScheduleLine, PurchaseInvoice, SourceDocType, SourceRef, SourceSnapshot,
        },
    },
    services::payment_processor::{self, PaymentPlan},
    store::{CheckRunStore, already_processed},
};

/// Store backed by a PostgreSQL connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Stored text did not match any known enum value.
fn decode_error(message: String) -> AppError {
    AppError::Database(sqlx::Error::Decode(message.into()))
}

#[derive(sqlx::FromRow)]
struct CheckRunRow {
    id: Uuid,
    company: String,
    bank_account: String,
    payable_account: String,
    posting_date: NaiveDate,
    end_date: NaiveDate,
    last_check_number: i64,
    status: String,
    transactions: Json<Vec<TransactionRow>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CheckRunRow> for CheckRun {
    type Error = AppError;

    fn try_from(row: CheckRunRow) -> Result<Self, Self::Error> {
        Ok(CheckRun {
            id: row.id,
            company: row.company,
            bank_account: row.bank_account,
            payable_account: row.payable_account,
            posting_date: row.posting_date,
            end_date: row.end_date,
            last_check_number: row.last_check_number,
            status: CheckRunStatus::try_from(row.status.as_str()).map_err(decode_error)?,
            transactions: row.transactions.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ModeOfPaymentRow {
    name: String,
    kind: String,
}

#[derive(sqlx::FromRow)]
struct PurchaseInvoiceRow {
    name: String,
    company: String,
    supplier: String,
    bill_no: Option<String>,
    credit_to: String,
    posting_date: NaiveDate,
    due_date: Option<NaiveDate>,
    outstanding_cents: i64,
    on_hold: bool,
    release_date: Option<NaiveDate>,
    is_return: bool,
    return_against: Option<String>,
    default_mode_of_payment: Option<String>,
}

#[derive(sqlx::FromRow)]
struct ScheduleRow {
    invoice: String,
    idx: i32,
    due_date: NaiveDate,
    outstanding_cents: i64,
}

#[derive(sqlx::FromRow)]
struct JournalEntryRow {
    name: String,
    company: String,
    party_type: String,
    party: String,
    account: String,
    cheque_no: Option<String>,
    posting_date: NaiveDate,
    due_date: Option<NaiveDate>,
    outstanding_cents: i64,
    default_mode_of_payment: Option<String>,
}

#[derive(sqlx::FromRow)]
struct ExpenseClaimRow {
    name: String,
    company: String,
    employee: String,
    employee_name: String,
    payable_account: String,
    posting_date: NaiveDate,
    outstanding_cents: i64,
    default_mode_of_payment: Option<String>,
}

impl From<ExpenseClaimRow> for ExpenseClaim {
    fn from(row: ExpenseClaimRow) -> Self {
        ExpenseClaim {
            name: row.name,
            company: row.company,
            employee: row.employee,
            employee_name: row.employee_name,
            payable_account: row.payable_account,
            posting_date: row.posting_date,
            outstanding_cents: row.outstanding_cents,
            default_mode_of_payment: row.default_mode_of_payment,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PaymentEntryRow {
    id: Uuid,
    check_run_id: Uuid,
    company: String,
    party_type: String,
    party: String,
    mode_of_payment: String,
    bank_account: String,
    payable_account: String,
    posting_date: NaiveDate,
    paid_amount_cents: i64,
    check_number: Option<i64>,
    reference_no: String,
    payment_references: Json<Vec<PaymentReference>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<PaymentEntryRow> for PaymentEntry {
    type Error = AppError;

    fn try_from(row: PaymentEntryRow) -> Result<Self, Self::Error> {
        Ok(PaymentEntry {
            id: row.id,
            check_run_id: row.check_run_id,
            company: row.company,
            party_type: PartyType::try_from(row.party_type.as_str()).map_err(decode_error)?,
            party: row.party,
            mode_of_payment: row.mode_of_payment,
            bank_account: row.bank_account,
            payable_account: row.payable_account,
            posting_date: row.posting_date,
            paid_amount_cents: row.paid_amount_cents,
            check_number: row.check_number,
            reference_no: row.reference_no,
            references: row.payment_references.0,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl CheckRunStore for PgStore {
    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn get_company(&self, name: &str) -> Result<Option<Company>, AppError> {
        let company = sqlx::query_as::<_, Company>(
            "SELECT name, default_payable_account FROM companies WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(company)
    }

    async fn get_bank_account(&self, name: &str) -> Result<Option<BankAccount>, AppError> {
        let account = sqlx::query_as::<_, BankAccount>(
            "SELECT name, company, last_check_number FROM bank_accounts WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    async fn list_modes_of_payment(&self) -> Result<Vec<ModeOfPayment>, AppError> {
        let rows = sqlx::query_as::<_, ModeOfPaymentRow>(
            "SELECT name, kind FROM modes_of_payment ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(ModeOfPayment {
                    kind: ModeOfPaymentKind::try_from(row.kind.as_str()).map_err(decode_error)?,
                    name: row.name,
                })
            })
            .collect()
    }

    async fn find_settings(
        &self,
        company: &str,
        bank_account: &str,
        payable_account: &str,
    ) -> Result<Option<CheckRunSettings>, AppError> {
        let settings = sqlx::query_as::<_, CheckRunSettings>(
            r#"
            SELECT * FROM check_run_settings
            WHERE company = $1 AND bank_account = $2 AND payable_account = $3
            "#,
        )
        .bind(company)
        .bind(bank_account)
        .bind(payable_account)
        .fetch_optional(&self.pool)
        .await?;

        Ok(settings)
    }

    async fn upsert_settings(
        &self,
        settings: &CheckRunSettings,
    ) -> Result<CheckRunSettings, AppError> {
        // The id of an existing record wins over the one passed in
        let stored = sqlx::query_as::<_, CheckRunSettings>(
            r#"
            INSERT INTO check_run_settings (
                id,
                company,
                bank_account,
                payable_account,
                include_purchase_invoices,
                include_journal_entries,
                include_expense_claims,
                allow_stand_alone_debit_notes,
                automatically_release_on_hold_invoices,
                validate_unique_check_number,
                excluded_parties
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (company, bank_account, payable_account) DO UPDATE SET
                include_purchase_invoices = EXCLUDED.include_purchase_invoices,
                include_journal_entries = EXCLUDED.include_journal_entries,
                include_expense_claims = EXCLUDED.include_expense_claims,
                allow_stand_alone_debit_notes = EXCLUDED.allow_stand_alone_debit_notes,
                automatically_release_on_hold_invoices = EXCLUDED.automatically_release_on_hold_invoices,
                validate_unique_check_number = EXCLUDED.validate_unique_check_number,
                excluded_parties = EXCLUDED.excluded_parties
            RETURNING *
            "#,
        )
        .bind(settings.id)
        .bind(&settings.company)
        .bind(&settings.bank_account)
        .bind(&settings.payable_account)
        .bind(settings.include_purchase_invoices)
        .bind(settings.include_journal_entries)
        .bind(settings.include_expense_claims)
        .bind(settings.allow_stand_alone_debit_notes)
        .bind(settings.automatically_release_on_hold_invoices)
        .bind(settings.validate_unique_check_number)
        .bind(&settings.excluded_parties)
        .fetch_one(&self.pool)
        .await?;

        Ok(stored)
    }

    async fn find_draft_check_run(
        &self,
        company: &str,
        bank_account: &str,
        payable_account: &str,
    ) -> Result<Option<CheckRun>, AppError> {
        sqlx::query_as::<_, CheckRunRow>(
            r#"
            SELECT * FROM check_runs
            WHERE company = $1 AND bank_account = $2 AND payable_account = $3
              AND status = 'Draft'
            ORDER BY created_at
            LIMIT 1
            "#,
        )
        .bind(company)
        .bind(bank_account)
        .bind(payable_account)
        .fetch_optional(&self.pool)
        .await?
        .map(CheckRun::try_from)
        .transpose()
    }

    async fn insert_check_run(&self, run: &CheckRun) -> Result<CheckRun, AppError> {
        sqlx::query_as::<_, CheckRunRow>(
            r#"
            INSERT INTO check_runs (
                id,
                company,
                bank_account,
                payable_account,
                posting_date,
                end_date,
                last_check_number,
                status,
                transactions
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(run.id)
        .bind(&run.company)
        .bind(&run.bank_account)
        .bind(&run.payable_account)
        .bind(run.posting_date)
        .bind(run.end_date)
        .bind(run.last_check_number)
        .bind(run.status.as_str())
        .bind(Json(&run.transactions))
        .fetch_one(&self.pool)
        .await?
        .try_into()
    }

    async fn get_check_run(&self, id: Uuid) -> Result<Option<CheckRun>, AppError> {
        sqlx::query_as::<_, CheckRunRow>("SELECT * FROM check_runs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(CheckRun::try_from)
            .transpose()
    }

    async fn update_draft_check_run(&self, run: &CheckRun) -> Result<CheckRun, AppError> {
        sqlx::query_as::<_, CheckRunRow>(
            r#"
            UPDATE check_runs
            SET payable_account = $2,
                posting_date = $3,
                end_date = $4,
                last_check_number = $5,
                transactions = $6,
                updated_at = NOW()
            WHERE id = $1 AND status = 'Draft'
            RETURNING *
            "#,
        )
        .bind(run.id)
        .bind(&run.payable_account)
        .bind(run.posting_date)
        .bind(run.end_date)
        .bind(run.last_check_number)
        .bind(Json(&run.transactions))
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| already_processed(run.id))?
        .try_into()
    }

    async fn outstanding_documents(
        &self,
        company: &str,
        payable_account: &str,
        end_date: NaiveDate,
    ) -> Result<OutstandingDocuments, AppError> {
        let invoice_rows = sqlx::query_as::<_, PurchaseInvoiceRow>(
            r#"
            SELECT pi.name, pi.company, pi.supplier, pi.bill_no, pi.credit_to,
                   pi.posting_date, pi.due_date, pi.outstanding_cents, pi.on_hold,
                   pi.release_date, pi.is_return, pi.return_against,
                   s.default_mode_of_payment
            FROM purchase_invoices pi
            JOIN suppliers s ON s.name = pi.supplier
            WHERE pi.company = $1
              AND pi.credit_to = $2
              AND pi.posting_date <= $3
              AND pi.outstanding_cents <> 0
            ORDER BY pi.supplier, pi.due_date, pi.name
            "#,
        )
        .bind(company)
        .bind(payable_account)
        .bind(end_date)
        .fetch_all(&self.pool)
        .await?;

        let invoice_names: Vec<String> = invoice_rows.iter().map(|r| r.name.clone()).collect();
        let schedule_rows = sqlx::query_as::<_, ScheduleRow>(
            r#"
            SELECT invoice, idx, due_date, outstanding_cents
            FROM payment_schedules
            WHERE invoice = ANY($1)
            ORDER BY invoice, idx
            "#,
        )
        .bind(&invoice_names)
        .fetch_all(&self.pool)
        .await?;

        let mut schedules: HashMap<String, Vec<PaymentScheduleLine>> = HashMap::new();
        for line in schedule_rows {
            schedules
                .entry(line.invoice)
                .or_default()
                .push(PaymentScheduleLine {
                    idx: line.idx,
                    due_date: line.due_date,
                    outstanding_cents: line.outstanding_cents,
                });
        }

        let purchase_invoices = invoice_rows
            .into_iter()
            .map(|row| PurchaseInvoice {
                payment_schedule: schedules.remove(&row.name).unwrap_or_default(),
                name: row.name,
                company: row.company,
                supplier: row.supplier,
                bill_no: row.bill_no,
                credit_to: row.credit_to,
                posting_date: row.posting_date,
                due_date: row.due_date,
                outstanding_cents: row.outstanding_cents,
                on_hold: row.on_hold,
                release_date: row.release_date,
                is_return: row.is_return,
                return_against: row.return_against,
                default_mode_of_payment: row.default_mode_of_payment,
            })
            .collect();

        let journal_entries = sqlx::query_as::<_, JournalEntryRow>(
            r#"
            SELECT je.name, je.company, je.party_type, je.party, je.account, je.cheque_no,
                   je.posting_date, je.due_date, je.outstanding_cents,
                   COALESCE(s.default_mode_of_payment, e.default_mode_of_payment)
                       AS default_mode_of_payment
            FROM journal_entries je
            LEFT JOIN suppliers s ON je.party_type = 'Supplier' AND s.name = je.party
            LEFT JOIN employees e ON je.party_type = 'Employee' AND e.name = je.party
            WHERE je.company = $1
              AND je.account = $2
              AND je.posting_date <= $3
              AND je.outstanding_cents <> 0
            ORDER BY je.party, je.posting_date, je.name
            "#,
        )
        .bind(company)
        .bind(payable_account)
        .bind(end_date)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|row| {
            Ok(JournalEntry {
                party_type: PartyType::try_from(row.party_type.as_str()).map_err(decode_error)?,
                name: row.name,
                company: row.company,
                party: row.party,
                account: row.account,
                cheque_no: row.cheque_no,
                posting_date: row.posting_date,
                due_date: row.due_date,
                outstanding_cents: row.outstanding_cents,
                default_mode_of_payment: row.default_mode_of_payment,
            })
        })
        .collect::<Result<Vec<_>, AppError>>()?;

        let expense_claims = sqlx::query_as::<_, ExpenseClaimRow>(
            r#"
            SELECT ec.name, ec.company, ec.employee, e.employee_name, ec.payable_account,
                   ec.posting_date, ec.outstanding_cents, e.default_mode_of_payment
            FROM expense_claims ec
            JOIN employees e ON e.name = ec.employee
            WHERE ec.company = $1
              AND ec.payable_account = $2
              AND ec.posting_date <= $3
              AND ec.outstanding_cents <> 0
            ORDER BY ec.employee, ec.posting_date, ec.name
            "#,
        )
        .bind(company)
        .bind(payable_account)
        .bind(end_date)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(ExpenseClaim::from)
        .collect();

        Ok(OutstandingDocuments {
            purchase_invoices,
            journal_entries,
            expense_claims,
        })
    }

    async fn source_snapshots(
        &self,
        refs: &[SourceRef],
    ) -> Result<HashMap<SourceRef, SourceSnapshot>, AppError> {
        let names_of = |doctype: SourceDocType| -> Vec<String> {
            refs.iter()
                .filter(|r| r.doctype == doctype)
                .map(|r| r.name.clone())
                .collect()
        };

        let invoice_names = names_of(SourceDocType::PurchaseInvoice);
        let invoices: HashMap<String, (String, i64, bool)> =
            sqlx::query_as::<_, (String, String, i64, bool)>(
                r#"
                SELECT name, supplier, outstanding_cents, on_hold
                FROM purchase_invoices
                WHERE name = ANY($1)
                "#,
            )
            .bind(&invoice_names)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|(name, supplier, outstanding, on_hold)| (name, (supplier, outstanding, on_hold)))
            .collect();

        let installments: HashMap<(String, i32), i64> = sqlx::query_as::<_, (String, i32, i64)>(
            "SELECT invoice, idx, outstanding_cents FROM payment_schedules WHERE invoice = ANY($1)",
        )
        .bind(&invoice_names)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|(invoice, idx, outstanding)| ((invoice, idx), outstanding))
        .collect();

        let journal_entries = sqlx::query_as::<_, (String, String, String, i64)>(
            r#"
            SELECT name, party_type, party, outstanding_cents
            FROM journal_entries
            WHERE name = ANY($1)
            "#,
        )
        .bind(names_of(SourceDocType::JournalEntry))
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|(name, party_type, party, outstanding)| {
            let party_type = PartyType::try_from(party_type.as_str()).map_err(decode_error)?;
            Ok((name, (party_type, party, outstanding)))
        })
        .collect::<Result<HashMap<String, (PartyType, String, i64)>, AppError>>()?;

        let expense_claims: HashMap<String, (String, i64)> =
            sqlx::query_as::<_, (String, String, i64)>(
                "SELECT name, employee, outstanding_cents FROM expense_claims WHERE name = ANY($1)",
            )
            .bind(names_of(SourceDocType::ExpenseClaim))
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|(name, employee, outstanding)| (name, (employee, outstanding)))
            .collect();

        let mut snapshots = HashMap::new();
        for source in refs {
            let snapshot = match source.doctype {
                SourceDocType::PurchaseInvoice => {
                    invoices
                        .get(&source.name)
                        .and_then(|(supplier, outstanding, on_hold)| {
                            let outstanding_cents = match source.installment {
                                Some(idx) => *installments.get(&(source.name.clone(), idx))?,
                                None => *outstanding,
                            };
                            Some(SourceSnapshot {
                                party_type: PartyType::Supplier,
                                party: supplier.clone(),
                                outstanding_cents,
                                on_hold: *on_hold,
                            })
                        })
                }
                SourceDocType::JournalEntry => journal_entries.get(&source.name).map(
                    |(party_type, party, outstanding_cents)| SourceSnapshot {
                        party_type: *party_type,
                        party: party.clone(),
                        outstanding_cents: *outstanding_cents,
                        on_hold: false,
                    },
                ),
                SourceDocType::ExpenseClaim => {
                    expense_claims
                        .get(&source.name)
                        .map(|(employee, outstanding_cents)| SourceSnapshot {
                            party_type: PartyType::Employee,
                            party: employee.clone(),
                            outstanding_cents: *outstanding_cents,
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
        let run = &plan.check_run;

        let mut tx = self.pool.begin().await?;

        // Claim the draft first; a concurrent commit finds nothing to update
        let stored = sqlx::query_as::<_, CheckRunRow>(
            r#"
            UPDATE check_runs
            SET status = $2,
                last_check_number = $3,
                transactions = $4,
                updated_at = NOW()
            WHERE id = $1 AND status = 'Draft'
            RETURNING *
            "#,
        )
        .bind(run.id)
        .bind(run.status.as_str())
        .bind(run.last_check_number)
        .bind(Json(&run.transactions))
        .fetch_optional(&mut *tx)
        .await?;

        let Some(stored) = stored else {
            tx.rollback().await?;
            return Err(already_processed(run.id));
        };

        if let Err(e) = apply_plan(&mut tx, plan).await {
            tx.rollback().await?;
            return Err(e);
        }

        // Commit all changes atomically
        tx.commit().await?;

        stored.try_into()
    }

    async fn payment_entries_for_check_run(
        &self,
        check_run_id: Uuid,
    ) -> Result<Vec<PaymentEntry>, AppError> {
        sqlx::query_as::<_, PaymentEntryRow>(
            "SELECT * FROM payment_entries WHERE check_run_id = $1 ORDER BY party, mode_of_payment",
        )
        .bind(check_run_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(PaymentEntry::try_from)
        .collect()
    }
}

/// Every write of a claimed plan, in lock order: bank account, then sources
/// sorted by reference.
async fn apply_plan(
    tx: &mut Transaction<'_, Postgres>,
    plan: &PaymentPlan,
) -> Result<(), AppError> {
    let run = &plan.check_run;

    if let Some((first, last)) = plan.check_number_range() {
        // Serializes check numbering per bank account
        sqlx::query("SELECT 1 FROM bank_accounts WHERE name = $1 FOR UPDATE")
            .bind(&run.bank_account)
            .execute(&mut **tx)
            .await?;

        if plan.unique_check_numbers {
            let used = sqlx::query_scalar::<_, i64>(
                r#"
                SELECT check_number FROM payment_entries
                WHERE bank_account = $1
                  AND check_number BETWEEN $2 AND $3
                "#,
            )
            .bind(&run.bank_account)
            .bind(first)
            .bind(last)
            .fetch_all(&mut **tx)
            .await?;
            payment_processor::validate_check_numbers(plan, &used)?;
        }
    }

    for invoice in &plan.released_holds {
        sqlx::query("UPDATE purchase_invoices SET on_hold = false, release_date = $2 WHERE name = $1")
            .bind(invoice)
            .bind(run.posting_date)
            .execute(&mut **tx)
            .await?;
    }

    let mut updates: Vec<&OutstandingUpdate> = plan.outstanding_updates.iter().collect();
    updates.sort_by(|a, b| a.source.cmp(&b.source));
    for update in updates {
        settle_source(tx, update).await?;
    }

    for entry in &plan.payment_entries {
        sqlx::query(
            r#"
            INSERT INTO payment_entries (
                id,
                check_run_id,
                company,
                party_type,
                party,
                mode_of_payment,
                bank_account,
                payable_account,
                posting_date,
                paid_amount_cents,
                check_number,
                reference_no,
                payment_references
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(entry.id)
        .bind(entry.check_run_id)
        .bind(&entry.company)
        .bind(entry.party_type.as_str())
        .bind(&entry.party)
        .bind(&entry.mode_of_payment)
        .bind(&entry.bank_account)
        .bind(&entry.payable_account)
        .bind(entry.posting_date)
        .bind(entry.paid_amount_cents)
        .bind(entry.check_number)
        .bind(&entry.reference_no)
        .bind(Json(&entry.references))
        .execute(&mut **tx)
        .await?;
    }

    if let Some(last_check_number) = plan.bank_last_check_number {
        sqlx::query(
            r#"
            UPDATE bank_accounts
            SET last_check_number = GREATEST(last_check_number, $2)
            WHERE name = $1
            "#,
        )
        .bind(&run.bank_account)
        .bind(last_check_number)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

/// Lock one source, check it still covers the amount, and reduce it.
async fn settle_source(
    tx: &mut Transaction<'_, Postgres>,
    update: &OutstandingUpdate,
) -> Result<(), AppError> {
    let source = &update.source;
    let amount = update.amount_cents;

    match source.doctype {
        SourceDocType::PurchaseInvoice => {
            let (outstanding, on_hold) = sqlx::query_as::<_, (i64, bool)>(
                "SELECT outstanding_cents, on_hold FROM purchase_invoices WHERE name = $1 FOR UPDATE",
            )
            .bind(&source.name)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| payment_processor::stale_amount(source, 0))?;

            if on_hold {
                return Err(payment_processor::on_hold(source));
            }
            if !payment_processor::covers(outstanding, amount) {
                return Err(payment_processor::stale_amount(source, outstanding));
            }

            if let Some(idx) = source.installment {
                let line = sqlx::query_scalar::<_, i64>(
                    r#"
                    SELECT outstanding_cents FROM payment_schedules
                    WHERE invoice = $1 AND idx = $2
                    FOR UPDATE
                    "#,
                )
                .bind(&source.name)
                .bind(idx)
                .fetch_optional(&mut **tx)
                .await?
                .ok_or_else(|| payment_processor::stale_amount(source, 0))?;

                if !payment_processor::covers(line, amount) {
                    return Err(payment_processor::stale_amount(source, line));
                }

                sqlx::query(
                    r#"
                    UPDATE payment_schedules
                    SET outstanding_cents = outstanding_cents - $3
                    WHERE invoice = $1 AND idx = $2
                    "#,
                )
                .bind(&source.name)
                .bind(idx)
                .bind(amount)
                .execute(&mut **tx)
                .await?;
            }

            sqlx::query(
                "UPDATE purchase_invoices SET outstanding_cents = outstanding_cents - $2 WHERE name = $1",
            )
            .bind(&source.name)
            .bind(amount)
            .execute(&mut **tx)
            .await?;
        }
        SourceDocType::JournalEntry | SourceDocType::ExpenseClaim => {
            let table = match source.doctype {
                SourceDocType::JournalEntry => "journal_entries",
                _ => "expense_claims",
            };

            let outstanding = sqlx::query_scalar::<_, i64>(&format!(
                "SELECT outstanding_cents FROM {table} WHERE name = $1 FOR UPDATE"
            ))
            .bind(&source.name)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| payment_processor::stale_amount(source, 0))?;

            if !payment_processor::covers(outstanding, amount) {
                return Err(payment_processor::stale_amount(source, outstanding));
            }

            sqlx::query(&format!(
                "UPDATE {table} SET outstanding_cents = outstanding_cents - $2 WHERE name = $1"
            ))
            .bind(&source.name)
            .bind(amount)
            .execute(&mut **tx)
            .await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, month, day).unwrap()
    }

    #[test]
    fn expense_claim_row_maps_every_column() {
        let claim = ExpenseClaim::from(ExpenseClaimRow {
            name: "HR-EXP-2025-00001".to_string(),
            company: "Chelsea Fruit Co".to_string(),
            employee: "HR-EMP-00001".to_string(),
            employee_name: "Deepshi Garg".to_string(),
            payable_account: "2110 - Accounts Payable - CFC".to_string(),
            posting_date: date(8, 20),
            outstanding_cents: 35000,
            default_mode_of_payment: Some("Check".to_string()),
        });

        assert_eq!(claim.employee, "HR-EMP-00001");
        assert_eq!(claim.employee_name, "Deepshi Garg");
        assert_eq!(claim.posting_date, date(8, 20));
        assert_eq!(claim.outstanding_cents, 35000);
        assert_eq!(claim.default_mode_of_payment.as_deref(), Some("Check"));
    }

    #[test]
    fn unknown_stored_status_is_a_database_error() {
        let now = Utc::now();
        let row = CheckRunRow {
            id: Uuid::new_v4(),
            company: "Chelsea Fruit Co".to_string(),
            bank_account: "Primary Checking - Local Bank".to_string(),
            payable_account: "2110 - Accounts Payable - CFC".to_string(),
            posting_date: date(12, 31),
            end_date: date(12, 31),
            last_check_number: 1000,
            status: "Cancelled".to_string(),
            transactions: Json(Vec::new()),
            created_at: now,
            updated_at: now,
        };

        let err = CheckRun::try_from(row).unwrap_err();
        assert!(matches!(err, AppError::Database(_)));
    }
}
