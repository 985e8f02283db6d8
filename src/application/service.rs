use std::sync::Arc;

use anyhow::Context;
use tracing::{debug, info, warn};

use crate::domain::{
    Account, AccountId, AccountNumber, AccountType, Cents, MAX_AMOUNT_CENTS, TransactionRecord,
    TransactionType, format_cents,
};
use crate::storage::{AccountStore, Database, TransactionLog};

use super::{
    AppError, Clock, LedgerConfig, Notification, NotificationKind, Outbox, SystemClock,
};

/// Application service providing the ledger operations.
/// This is the primary interface for any client (CLI, API, etc.).
///
/// Every mutating operation runs in a single database transaction whose
/// first statement takes the write lock on an account row. Notifications are
/// published only after that transaction commits.
pub struct LedgerService {
    pub(super) db: Database,
    pub(super) config: LedgerConfig,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) outbox: Outbox,
}

impl LedgerService {
    /// Create a new ledger service over an open database.
    pub fn new(db: Database, config: LedgerConfig) -> Self {
        Self {
            db,
            config,
            clock: Arc::new(SystemClock),
            outbox: Outbox::disabled(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_outbox(mut self, outbox: Outbox) -> Self {
        self.outbox = outbox;
        self
    }

    /// Initialize a new database at the given path.
    pub async fn init(database_path: &str, config: LedgerConfig) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}", database_path);
        let db = Database::init(&db_url, config.busy_timeout).await?;
        Ok(Self::new(db, config))
    }

    /// Connect to an existing database.
    pub async fn connect(database_path: &str, config: LedgerConfig) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}", database_path);
        let db = Database::connect(&db_url, false, config.busy_timeout).await?;
        Ok(Self::new(db, config))
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    // ========================
    // Account operations
    // ========================

    /// Open a new, empty account. Stands in for the external registration flow.
    pub async fn open_account(
        &self,
        owner: String,
        account_type: AccountType,
    ) -> Result<Account, AppError> {
        let owner = owner.trim().to_string();
        if owner.is_empty() {
            return Err(AppError::Validation("Owner must not be empty".to_string()));
        }

        let mut account = Account::new(owner, account_type, self.clock.now());

        let mut tx = self.db.begin().await?;
        AccountStore::create(&mut tx, &mut account).await?;
        tx.commit().await.context("Failed to commit new account")?;

        info!(account = %account.id, account_no = account.account_no, "account opened");
        Ok(account)
    }

    /// Get an account by ID.
    pub async fn get_account(&self, id: AccountId) -> Result<Account, AppError> {
        let mut conn = self.db.acquire().await?;
        AccountStore::get(&mut conn, id)
            .await?
            .ok_or_else(|| AppError::AccountNotFound(id.to_string()))
    }

    /// Get an account by its account number.
    pub async fn get_account_by_number(
        &self,
        account_no: AccountNumber,
    ) -> Result<Account, AppError> {
        let mut conn = self.db.acquire().await?;
        AccountStore::get_by_number(&mut conn, account_no)
            .await?
            .ok_or_else(|| AppError::AccountNotFound(account_no.to_string()))
    }

    /// List all accounts.
    pub async fn list_accounts(&self) -> Result<Vec<Account>, AppError> {
        let mut conn = self.db.acquire().await?;
        Ok(AccountStore::list(&mut conn).await?)
    }

    // ========================
    // Cash operations
    // ========================

    /// Credit an account and record the deposit.
    pub async fn deposit(
        &self,
        account_id: AccountId,
        amount_cents: Cents,
    ) -> Result<TransactionRecord, AppError> {
        validate_amount(amount_cents)?;

        let mut tx = self.db.begin().await?;
        let account = AccountStore::apply_delta(&mut tx, account_id, amount_cents).await?;
        let mut record = TransactionRecord::new(
            account_id,
            TransactionType::Deposit,
            amount_cents,
            account.balance_cents,
            self.clock.now(),
        );
        TransactionLog::append(&mut tx, &mut record).await?;
        tx.commit().await.context("Failed to commit deposit")?;

        info!(
            account = %account_id,
            amount = %format_cents(amount_cents),
            balance = %format_cents(account.balance_cents),
            "deposit committed"
        );
        self.notify(&account, NotificationKind::Deposit, amount_cents, None);
        Ok(record)
    }

    /// Debit an account and record the withdrawal.
    /// Fails with `InsufficientFunds`, leaving no trace, if the balance does not cover it.
    pub async fn withdraw(
        &self,
        account_id: AccountId,
        amount_cents: Cents,
    ) -> Result<TransactionRecord, AppError> {
        validate_amount(amount_cents)?;

        let mut tx = self.db.begin().await?;
        let account = match AccountStore::apply_delta(&mut tx, account_id, -amount_cents).await {
            Ok(account) => account,
            Err(err) => {
                warn!(account = %account_id, error = %err, "withdrawal rejected");
                return Err(err.into());
            }
        };
        let mut record = TransactionRecord::new(
            account_id,
            TransactionType::Withdrawal,
            -amount_cents,
            account.balance_cents,
            self.clock.now(),
        );
        TransactionLog::append(&mut tx, &mut record).await?;
        tx.commit().await.context("Failed to commit withdrawal")?;

        info!(
            account = %account_id,
            amount = %format_cents(amount_cents),
            balance = %format_cents(account.balance_cents),
            "withdrawal committed"
        );
        self.notify(&account, NotificationKind::Withdrawal, amount_cents, None);
        Ok(record)
    }

    /// Queue a notification for the account owner. Call only after commit.
    pub(super) fn notify(
        &self,
        account: &Account,
        kind: NotificationKind,
        amount_cents: Cents,
        counterparty: Option<AccountNumber>,
    ) {
        debug!(account = %account.id, %kind, "publishing notification");
        self.outbox.publish(Notification {
            kind,
            owner: account.owner.clone(),
            account_no: account.account_no,
            amount_cents,
            counterparty,
        });
    }
}

/// Amounts must be positive and fit the ledger's 12-digit money columns.
pub(super) fn validate_amount(amount_cents: Cents) -> Result<(), AppError> {
    if amount_cents <= 0 {
        return Err(AppError::InvalidAmount(
            "Amount must be positive".to_string(),
        ));
    }
    if amount_cents > MAX_AMOUNT_CENTS {
        return Err(AppError::InvalidAmount(format!(
            "Amount must not exceed {}",
            format_cents(MAX_AMOUNT_CENTS)
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_amount() {
        assert!(validate_amount(1).is_ok());
        assert!(validate_amount(MAX_AMOUNT_CENTS).is_ok());
        assert!(matches!(validate_amount(0), Err(AppError::InvalidAmount(_))));
        assert!(matches!(validate_amount(-500), Err(AppError::InvalidAmount(_))));
        assert!(matches!(
            validate_amount(MAX_AMOUNT_CENTS + 1),
            Err(AppError::InvalidAmount(_))
        ));
    }
}
