//! Company, bank account and mode of payment models.
//!
//! These are reference documents: the service reads them to fill defaults and
//! only ever writes `bank_accounts.last_check_number`.

use serde::{Deserialize, Serialize};

/// A company that owns payables and bank accounts.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Company {
    pub name: String,

    /// Account that payables are booked against when a check run does not
    /// name one explicitly.
    pub default_payable_account: Option<String>,
}

/// A bank account that check runs pay from.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct BankAccount {
    pub name: String,

    /// Company that owns this account
    pub company: String,

    /// Last check number printed from this account
    ///
    /// Advanced by every processed check run that issues checks.
    pub last_check_number: i64,
}

/// How a mode of payment settles a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModeOfPaymentKind {
    /// Paper check; consumes a check number
    Check,
    /// ACH, wire, card and similar
    Electronic,
    Cash,
}

impl TryFrom<&str> for ModeOfPaymentKind {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "Check" => Ok(ModeOfPaymentKind::Check),
            "Electronic" => Ok(ModeOfPaymentKind::Electronic),
            "Cash" => Ok(ModeOfPaymentKind::Cash),
            other => Err(format!("unknown mode of payment kind: {other}")),
        }
    }
}

/// A named mode of payment, e.g. "Check", "ACH/EFT", "Credit Card".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeOfPayment {
    pub name: String,
    pub kind: ModeOfPaymentKind,
}

impl ModeOfPayment {
    /// Whether payments made with this mode are numbered checks.
    pub fn issues_checks(&self) -> bool {
        self.kind == ModeOfPaymentKind::Check
    }
}
