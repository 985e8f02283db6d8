use std::time::Duration;

use crate::domain::DEFAULT_LOAN_LIMIT;

/// Tunables for the ledger engine.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Maximum number of approved, unpaid loans per account
    pub loan_limit: usize,
    /// How long a writer waits for the database lock before giving up
    pub busy_timeout: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            loan_limit: DEFAULT_LOAN_LIMIT,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

impl LedgerConfig {
    pub fn with_loan_limit(mut self, loan_limit: usize) -> Self {
        self.loan_limit = loan_limit;
        self
    }

    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }
}
