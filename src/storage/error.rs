use thiserror::Error;

use crate::domain::{AccountId, BalanceError};

/// Failures of a balance mutation. Anything other than a rule violation is
/// reported as `Database`.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("Account {account_id}: {source}")]
    Balance {
        account_id: AccountId,
        #[source]
        source: BalanceError,
    },

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}
