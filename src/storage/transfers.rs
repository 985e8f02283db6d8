use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use crate::domain::{AccountId, TransferId, TransferRecord};

use super::{decode_timestamp, encode_timestamp, next_counter};

const TRANSFER_COLUMNS: &str = "id, sequence, sender_id, recipient_id, amount_cents, timestamp";

/// Append-only log of account-to-account transfers.
pub struct TransferLog;

impl TransferLog {
    /// Save a new transfer, assigning the next global sequence number.
    pub async fn append(conn: &mut SqliteConnection, transfer: &mut TransferRecord) -> Result<()> {
        transfer.sequence = next_counter(conn, "transfer_sequence").await?;

        sqlx::query(
            r#"
            INSERT INTO transfers (id, sequence, sender_id, recipient_id, amount_cents, timestamp)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(transfer.id.to_string())
        .bind(transfer.sequence)
        .bind(transfer.sender.to_string())
        .bind(transfer.recipient.to_string())
        .bind(transfer.amount_cents)
        .bind(encode_timestamp(transfer.timestamp))
        .execute(&mut *conn)
        .await
        .context("Failed to save transfer")?;

        Ok(())
    }

    /// Get a transfer by ID.
    pub async fn get(conn: &mut SqliteConnection, id: TransferId) -> Result<Option<TransferRecord>> {
        let row = sqlx::query(&format!("SELECT {TRANSFER_COLUMNS} FROM transfers WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&mut *conn)
            .await
            .context("Failed to fetch transfer")?;

        row.as_ref().map(Self::row_to_transfer).transpose()
    }

    /// List transfers for an account (as sender or recipient), ordered by sequence number.
    pub async fn list_for_account(
        conn: &mut SqliteConnection,
        account_id: AccountId,
    ) -> Result<Vec<TransferRecord>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {TRANSFER_COLUMNS}
            FROM transfers
            WHERE sender_id = ? OR recipient_id = ?
            ORDER BY sequence
            "#
        ))
        .bind(account_id.to_string())
        .bind(account_id.to_string())
        .fetch_all(&mut *conn)
        .await
        .context("Failed to list transfers for account")?;

        rows.iter().map(Self::row_to_transfer).collect()
    }

    /// List transfers for an account with `from <= timestamp < to`.
    pub async fn list_for_account_between(
        conn: &mut SqliteConnection,
        account_id: AccountId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<TransferRecord>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {TRANSFER_COLUMNS}
            FROM transfers
            WHERE (sender_id = ? OR recipient_id = ?) AND timestamp >= ? AND timestamp < ?
            ORDER BY sequence
            "#
        ))
        .bind(account_id.to_string())
        .bind(account_id.to_string())
        .bind(encode_timestamp(from))
        .bind(encode_timestamp(to))
        .fetch_all(&mut *conn)
        .await
        .context("Failed to list transfers in range")?;

        rows.iter().map(Self::row_to_transfer).collect()
    }

    fn row_to_transfer(row: &SqliteRow) -> Result<TransferRecord> {
        let id_str: String = row.get("id");
        let sender_str: String = row.get("sender_id");
        let recipient_str: String = row.get("recipient_id");
        let timestamp_str: String = row.get("timestamp");

        Ok(TransferRecord {
            id: Uuid::parse_str(&id_str).context("Invalid transfer ID")?,
            sequence: row.get("sequence"),
            sender: Uuid::parse_str(&sender_str).context("Invalid sender ID")?,
            recipient: Uuid::parse_str(&recipient_str).context("Invalid recipient ID")?,
            amount_cents: row.get("amount_cents"),
            timestamp: decode_timestamp(&timestamp_str, "transfer")?,
        })
    }
}
