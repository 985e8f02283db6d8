use anyhow::{Context, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use crate::domain::{Account, AccountId, AccountNumber, Cents};

use super::{StoreError, decode_timestamp, encode_timestamp, next_counter};

const ACCOUNT_COLUMNS: &str = "id, account_no, owner, account_type, balance_cents, created_at";

/// Persistence for accounts. The only place that writes `balance_cents`.
pub struct AccountStore;

impl AccountStore {
    /// Save a new account, assigning the next account number.
    pub async fn create(conn: &mut SqliteConnection, account: &mut Account) -> Result<()> {
        account.account_no = next_counter(conn, "account_number").await?;

        sqlx::query(
            r#"
            INSERT INTO accounts (id, account_no, owner, account_type, balance_cents, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(account.id.to_string())
        .bind(account.account_no)
        .bind(&account.owner)
        .bind(account.account_type.as_str())
        .bind(account.balance_cents)
        .bind(encode_timestamp(account.created_at))
        .execute(&mut *conn)
        .await
        .context("Failed to save account")?;
        Ok(())
    }

    /// Get an account by ID.
    pub async fn get(conn: &mut SqliteConnection, id: AccountId) -> Result<Option<Account>> {
        let row = sqlx::query(&format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&mut *conn)
            .await
            .context("Failed to fetch account")?;

        row.as_ref().map(Self::row_to_account).transpose()
    }

    /// Get an account by its human-facing number.
    pub async fn get_by_number(
        conn: &mut SqliteConnection,
        account_no: AccountNumber,
    ) -> Result<Option<Account>> {
        let row = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE account_no = ?"
        ))
        .bind(account_no)
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to fetch account by number")?;

        row.as_ref().map(Self::row_to_account).transpose()
    }

    /// List all accounts, ordered by account number.
    pub async fn list(conn: &mut SqliteConnection) -> Result<Vec<Account>> {
        let rows = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY account_no"
        ))
        .fetch_all(&mut *conn)
        .await
        .context("Failed to list accounts")?;

        rows.iter().map(Self::row_to_account).collect()
    }

    /// Take the write lock on an account row for the rest of the transaction
    /// and return its current state.
    ///
    /// SQLite has no `SELECT ... FOR UPDATE`; a no-op update acquires the
    /// database write lock instead, so the read below cannot go stale.
    pub async fn lock(conn: &mut SqliteConnection, id: AccountId) -> Result<Option<Account>> {
        let row = sqlx::query(&format!(
            "UPDATE accounts SET balance_cents = balance_cents WHERE id = ? RETURNING {ACCOUNT_COLUMNS}"
        ))
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to lock account")?;

        row.as_ref().map(Self::row_to_account).transpose()
    }

    /// Apply a signed delta to an account's balance as one read-modify-write.
    /// Returns the account with its new balance; on error nothing is written.
    pub async fn apply_delta(
        conn: &mut SqliteConnection,
        id: AccountId,
        delta: Cents,
    ) -> Result<Account, StoreError> {
        let mut account = Self::lock(conn, id)
            .await?
            .ok_or(StoreError::AccountNotFound(id))?;

        let new_balance = account
            .balance_after(delta)
            .map_err(|source| StoreError::Balance {
                account_id: id,
                source,
            })?;

        sqlx::query("UPDATE accounts SET balance_cents = ? WHERE id = ?")
            .bind(new_balance)
            .bind(id.to_string())
            .execute(&mut *conn)
            .await
            .context("Failed to update balance")?;

        account.balance_cents = new_balance;
        Ok(account)
    }

    fn row_to_account(row: &SqliteRow) -> Result<Account> {
        let id_str: String = row.get("id");
        let account_type_str: String = row.get("account_type");
        let created_at_str: String = row.get("created_at");

        Ok(Account {
            id: Uuid::parse_str(&id_str).context("Invalid account ID")?,
            account_no: row.get("account_no"),
            owner: row.get("owner"),
            account_type: account_type_str
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))?,
            balance_cents: row.get("balance_cents"),
            created_at: decode_timestamp(&created_at_str, "created_at")?,
        })
    }
}
