use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use crate::domain::{AccountId, Cents, TransactionId, TransactionRecord};

use super::{decode_timestamp, encode_timestamp};

const TRANSACTION_COLUMNS: &str = "id, account_id, sequence, amount_cents, balance_after_cents, transaction_type, timestamp, approved";

/// Append-only log of deposits, withdrawals and loans.
pub struct TransactionLog;

impl TransactionLog {
    /// Append a record, assigning the account's next sequence number.
    pub async fn append(conn: &mut SqliteConnection, record: &mut TransactionRecord) -> Result<()> {
        record.sequence = Self::next_sequence(conn, record.account_id).await?;

        sqlx::query(
            r#"
            INSERT INTO transactions (id, account_id, sequence, amount_cents, balance_after_cents, transaction_type, timestamp, approved)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id.to_string())
        .bind(record.account_id.to_string())
        .bind(record.sequence)
        .bind(record.amount_cents)
        .bind(record.balance_after_cents)
        .bind(record.transaction_type.as_str())
        .bind(encode_timestamp(record.timestamp))
        .bind(record.approved)
        .execute(&mut *conn)
        .await
        .context("Failed to save transaction")?;

        Ok(())
    }

    /// Advance the per-account sequence held on the account row.
    async fn next_sequence(conn: &mut SqliteConnection, account_id: AccountId) -> Result<i64> {
        let sequence: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE accounts
            SET last_sequence = last_sequence + 1
            WHERE id = ?
            RETURNING last_sequence
            "#,
        )
        .bind(account_id.to_string())
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to get next sequence number")?;

        sequence.ok_or_else(|| anyhow::anyhow!("Account {} does not exist", account_id))
    }

    /// Get a record by ID.
    pub async fn get(
        conn: &mut SqliteConnection,
        id: TransactionId,
    ) -> Result<Option<TransactionRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to fetch transaction")?;

        row.as_ref().map(Self::row_to_record).transpose()
    }

    /// List an account's records, ordered by sequence number.
    pub async fn list_for_account(
        conn: &mut SqliteConnection,
        account_id: AccountId,
    ) -> Result<Vec<TransactionRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE account_id = ? ORDER BY sequence"
        ))
        .bind(account_id.to_string())
        .fetch_all(&mut *conn)
        .await
        .context("Failed to list transactions for account")?;

        rows.iter().map(Self::row_to_record).collect()
    }

    /// List an account's records with `from <= timestamp < to`, ordered by sequence number.
    pub async fn list_for_account_between(
        conn: &mut SqliteConnection,
        account_id: AccountId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<TransactionRecord>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {TRANSACTION_COLUMNS}
            FROM transactions
            WHERE account_id = ? AND timestamp >= ? AND timestamp < ?
            ORDER BY sequence
            "#
        ))
        .bind(account_id.to_string())
        .bind(encode_timestamp(from))
        .bind(encode_timestamp(to))
        .fetch_all(&mut *conn)
        .await
        .context("Failed to list transactions in range")?;

        rows.iter().map(Self::row_to_record).collect()
    }

    /// Count approved loans that have not been paid off.
    pub async fn count_approved_loans(
        conn: &mut SqliteConnection,
        account_id: AccountId,
    ) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM transactions
            WHERE account_id = ? AND transaction_type = 'loan' AND approved = 1
            "#,
        )
        .bind(account_id.to_string())
        .fetch_one(&mut *conn)
        .await
        .context("Failed to count approved loans")?;

        Ok(count)
    }

    /// List every loan of an account, paid or not, ordered by sequence number.
    pub async fn list_loans(
        conn: &mut SqliteConnection,
        account_id: AccountId,
    ) -> Result<Vec<TransactionRecord>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {TRANSACTION_COLUMNS}
            FROM transactions
            WHERE account_id = ? AND transaction_type IN ('loan', 'loan_paid')
            ORDER BY sequence
            "#
        ))
        .bind(account_id.to_string())
        .fetch_all(&mut *conn)
        .await
        .context("Failed to list loans")?;

        rows.iter().map(Self::row_to_record).collect()
    }

    /// Flag a requested loan as approved.
    pub async fn set_approved(conn: &mut SqliteConnection, id: TransactionId) -> Result<()> {
        let result = sqlx::query(
            "UPDATE transactions SET approved = 1 WHERE id = ? AND transaction_type = 'loan' AND approved = 0",
        )
        .bind(id.to_string())
        .execute(&mut *conn)
        .await
        .context("Failed to approve loan")?;

        if result.rows_affected() != 1 {
            anyhow::bail!("Loan {} is not awaiting approval", id);
        }
        Ok(())
    }

    /// Close an approved loan, recording the balance left after the payoff.
    pub async fn mark_loan_paid(
        conn: &mut SqliteConnection,
        id: TransactionId,
        balance_after: Cents,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET transaction_type = 'loan_paid', balance_after_cents = ?
            WHERE id = ? AND transaction_type = 'loan' AND approved = 1
            "#,
        )
        .bind(balance_after)
        .bind(id.to_string())
        .execute(&mut *conn)
        .await
        .context("Failed to mark loan as paid")?;

        if result.rows_affected() != 1 {
            anyhow::bail!("Loan {} is not an approved, unpaid loan", id);
        }
        Ok(())
    }

    fn row_to_record(row: &SqliteRow) -> Result<TransactionRecord> {
        let id_str: String = row.get("id");
        let account_id_str: String = row.get("account_id");
        let type_str: String = row.get("transaction_type");
        let timestamp_str: String = row.get("timestamp");

        Ok(TransactionRecord {
            id: Uuid::parse_str(&id_str).context("Invalid transaction ID")?,
            account_id: Uuid::parse_str(&account_id_str).context("Invalid account ID")?,
            sequence: row.get("sequence"),
            amount_cents: row.get("amount_cents"),
            balance_after_cents: row.get("balance_after_cents"),
            transaction_type: type_str.parse().map_err(|e: String| anyhow::anyhow!(e))?,
            timestamp: decode_timestamp(&timestamp_str, "transaction")?,
            approved: row.get::<i32, _>("approved") != 0,
        })
    }
}
