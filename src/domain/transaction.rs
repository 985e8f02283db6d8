use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccountId, Cents};

pub type TransactionId = Uuid;

/// Default cap on simultaneously approved, unpaid loans per account.
pub const DEFAULT_LOAN_LIMIT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
    Loan,
    LoanPaid,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "deposit",
            TransactionType::Withdrawal => "withdrawal",
            TransactionType::Loan => "loan",
            TransactionType::LoanPaid => "loan_paid",
        }
    }

    pub fn is_loan(&self) -> bool {
        matches!(self, TransactionType::Loan | TransactionType::LoanPaid)
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(TransactionType::Deposit),
            "withdrawal" => Ok(TransactionType::Withdrawal),
            "loan" => Ok(TransactionType::Loan),
            "loan_paid" => Ok(TransactionType::LoanPaid),
            other => Err(format!("unknown transaction type '{}'", other)),
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a loan record sits in its Requested -> Approved -> Paid lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Requested,
    Approved,
    Paid,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Requested => "requested",
            LoanStatus::Approved => "approved",
            LoanStatus::Paid => "paid",
        }
    }
}

impl std::fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One balance-affecting event on a single account.
/// Amount, timestamp and sequence never change once recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: TransactionId,
    pub account_id: AccountId,
    /// Per-account, strictly increasing. Assigned by the transaction log.
    pub sequence: i64,
    /// Signed: positive for deposits and loans, negative for withdrawals
    pub amount_cents: Cents,
    /// Account balance right after this record was applied
    pub balance_after_cents: Cents,
    pub transaction_type: TransactionType,
    pub timestamp: DateTime<Utc>,
    /// Only meaningful for loans
    pub approved: bool,
}

impl TransactionRecord {
    /// Create a new record. Sequence number must be assigned by the transaction log.
    pub fn new(
        account_id: AccountId,
        transaction_type: TransactionType,
        amount_cents: Cents,
        balance_after_cents: Cents,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            sequence: 0,
            amount_cents,
            balance_after_cents,
            transaction_type,
            timestamp,
            approved: false,
        }
    }

    pub fn loan_status(&self) -> Option<LoanStatus> {
        match (self.transaction_type, self.approved) {
            (TransactionType::Loan, false) => Some(LoanStatus::Requested),
            (TransactionType::Loan, true) => Some(LoanStatus::Approved),
            (TransactionType::LoanPaid, _) => Some(LoanStatus::Paid),
            _ => None,
        }
    }

    /// Approved loans that have not been paid off count against the loan limit.
    pub fn is_outstanding_loan(&self) -> bool {
        self.loan_status() == Some(LoanStatus::Approved)
    }
}

/// Sum of signed amounts over a set of records.
pub fn sum_amounts(records: &[TransactionRecord]) -> Cents {
    records.iter().map(|r| r.amount_cents).sum()
}
