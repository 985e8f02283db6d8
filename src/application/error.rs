use thiserror::Error;

use crate::domain::{AccountId, BalanceError, Cents, DateRangeError, TransactionId, TransferId};
use crate::storage::StoreError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Loan not found: {0}")]
    LoanNotFound(TransactionId),

    #[error("Transfer not found: {0}")]
    TransferNotFound(TransferId),

    #[error("Insufficient funds in account {account_id}: balance {balance}, required {required}")]
    InsufficientFunds {
        account_id: AccountId,
        balance: Cents,
        required: Cents,
    },

    #[error("Loan limit reached for account {account_id}: {limit} approved loans outstanding")]
    LoanLimitExceeded { account_id: AccountId, limit: usize },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Cannot transfer money from account {0} to itself")]
    SelfTransfer(AccountId),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Loan {0} has not been approved")]
    LoanNotApproved(TransactionId),

    #[error("Loan {0} is already approved")]
    LoanAlreadyApproved(TransactionId),

    #[error("Loan {0} is already paid")]
    LoanAlreadyPaid(TransactionId),

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AccountNotFound(id) => AppError::AccountNotFound(id.to_string()),
            StoreError::Balance {
                account_id,
                source: BalanceError::InsufficientFunds { balance, required },
            } => AppError::InsufficientFunds {
                account_id,
                balance,
                required,
            },
            StoreError::Balance {
                source: BalanceError::Overflow,
                ..
            } => AppError::InvalidAmount("resulting balance is out of range".to_string()),
            StoreError::Database(e) => AppError::Database(e),
        }
    }
}

impl From<DateRangeError> for AppError {
    fn from(err: DateRangeError) -> Self {
        AppError::Validation(err.to_string())
    }
}
