use anyhow::Context;
use sqlx::SqliteConnection;
use tracing::{info, warn};

use crate::domain::{
    Account, AccountId, Cents, LoanStatus, TransactionId, TransactionRecord, TransactionType,
    format_cents,
};
use crate::storage::{AccountStore, TransactionLog};

use super::service::validate_amount;
use super::{AppError, LedgerService, NotificationKind};

impl LedgerService {
    /// Record a loan request. The balance is untouched; the request stays
    /// pending until an administrator approves it.
    pub async fn request_loan(
        &self,
        account_id: AccountId,
        amount_cents: Cents,
    ) -> Result<TransactionRecord, AppError> {
        validate_amount(amount_cents)?;

        let mut tx = self.db.begin().await?;
        let account = lock_account(&mut tx, account_id).await?;
        self.check_loan_limit(&mut tx, account_id).await?;

        let mut record = TransactionRecord::new(
            account_id,
            TransactionType::Loan,
            amount_cents,
            account.balance_cents,
            self.clock.now(),
        );
        TransactionLog::append(&mut tx, &mut record).await?;
        tx.commit().await.context("Failed to commit loan request")?;

        info!(
            account = %account_id,
            loan = %record.id,
            amount = %format_cents(amount_cents),
            "loan requested"
        );
        self.notify(&account, NotificationKind::LoanRequested, amount_cents, None);
        Ok(record)
    }

    /// Approve a pending loan request. Administrative operation.
    pub async fn approve_loan(&self, loan_id: TransactionId) -> Result<TransactionRecord, AppError> {
        let account_id = self.loan_account(loan_id).await?;

        let mut tx = self.db.begin().await?;
        let account = lock_account(&mut tx, account_id).await?;
        let mut loan = load_loan(&mut tx, loan_id).await?;

        match loan.loan_status() {
            Some(LoanStatus::Requested) => {}
            Some(LoanStatus::Approved) => return Err(AppError::LoanAlreadyApproved(loan_id)),
            Some(LoanStatus::Paid) => return Err(AppError::LoanAlreadyPaid(loan_id)),
            None => return Err(AppError::LoanNotFound(loan_id)),
        }
        self.check_loan_limit(&mut tx, account_id).await?;

        TransactionLog::set_approved(&mut tx, loan_id).await?;
        tx.commit().await.context("Failed to commit loan approval")?;
        loan.approved = true;

        info!(account = %account_id, loan = %loan_id, "loan approved");
        self.notify(&account, NotificationKind::LoanApproved, loan.amount_cents, None);
        Ok(loan)
    }

    /// Pay off an approved loan from the account balance.
    pub async fn pay_loan(&self, loan_id: TransactionId) -> Result<TransactionRecord, AppError> {
        let account_id = self.loan_account(loan_id).await?;

        let mut tx = self.db.begin().await?;
        let account = lock_account(&mut tx, account_id).await?;
        let mut loan = load_loan(&mut tx, loan_id).await?;

        match loan.loan_status() {
            Some(LoanStatus::Approved) => {}
            Some(LoanStatus::Requested) => return Err(AppError::LoanNotApproved(loan_id)),
            Some(LoanStatus::Paid) => return Err(AppError::LoanAlreadyPaid(loan_id)),
            None => return Err(AppError::LoanNotFound(loan_id)),
        }

        if loan.amount_cents > account.balance_cents {
            warn!(
                account = %account_id,
                loan = %loan_id,
                balance = %format_cents(account.balance_cents),
                "loan payoff rejected"
            );
            return Err(AppError::InsufficientFunds {
                account_id,
                balance: account.balance_cents,
                required: loan.amount_cents,
            });
        }

        let account = AccountStore::apply_delta(&mut tx, account_id, -loan.amount_cents).await?;
        TransactionLog::mark_loan_paid(&mut tx, loan_id, account.balance_cents).await?;
        tx.commit().await.context("Failed to commit loan payoff")?;

        loan.transaction_type = TransactionType::LoanPaid;
        loan.balance_after_cents = account.balance_cents;

        info!(
            account = %account_id,
            loan = %loan_id,
            balance = %format_cents(account.balance_cents),
            "loan paid"
        );
        self.notify(&account, NotificationKind::LoanPaid, loan.amount_cents, None);
        Ok(loan)
    }

    /// List every loan of an account: pending, approved and paid.
    pub async fn list_loans(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<TransactionRecord>, AppError> {
        let mut tx = self.db.begin().await?;
        if AccountStore::get(&mut tx, account_id).await?.is_none() {
            return Err(AppError::AccountNotFound(account_id.to_string()));
        }
        let loans = TransactionLog::list_loans(&mut tx, account_id).await?;
        tx.commit().await.context("Failed to finish loan listing")?;
        Ok(loans)
    }

    /// Resolve which account a loan belongs to. The owning account never
    /// changes, so this can be read before the locking transaction starts.
    async fn loan_account(&self, loan_id: TransactionId) -> Result<AccountId, AppError> {
        let mut conn = self.db.acquire().await?;
        let loan = load_loan(&mut conn, loan_id).await?;
        Ok(loan.account_id)
    }

    async fn check_loan_limit(
        &self,
        conn: &mut SqliteConnection,
        account_id: AccountId,
    ) -> Result<(), AppError> {
        let approved = TransactionLog::count_approved_loans(conn, account_id).await?;
        let limit = self.config.loan_limit;
        if usize::try_from(approved).unwrap_or(usize::MAX) >= limit {
            warn!(account = %account_id, approved, limit, "loan limit reached");
            return Err(AppError::LoanLimitExceeded { account_id, limit });
        }
        Ok(())
    }
}

async fn lock_account(conn: &mut SqliteConnection, account_id: AccountId) -> Result<Account, AppError> {
    AccountStore::lock(conn, account_id)
        .await?
        .ok_or_else(|| AppError::AccountNotFound(account_id.to_string()))
}

/// Fetch a record and make sure it is a loan.
async fn load_loan(
    conn: &mut SqliteConnection,
    loan_id: TransactionId,
) -> Result<TransactionRecord, AppError> {
    TransactionLog::get(conn, loan_id)
        .await?
        .filter(|record| record.transaction_type.is_loan())
        .ok_or(AppError::LoanNotFound(loan_id))
}
