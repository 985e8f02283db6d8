use anyhow::Context;
use tracing::{info, warn};

use crate::domain::{Account, AccountId, Cents, TransferId, TransferRecord, format_cents};
use crate::storage::{AccountStore, TransferLog};

use super::service::validate_amount;
use super::{AppError, LedgerService, NotificationKind};

/// Result of a committed transfer
#[derive(Debug, Clone)]
pub struct TransferResult {
    pub transfer: TransferRecord,
    /// Sender state after the debit
    pub sender: Account,
    /// Recipient state after the credit
    pub recipient: Account,
}

impl LedgerService {
    /// Move money between two accounts.
    ///
    /// Debit, credit and the transfer record commit together or not at all.
    /// Both account rows are locked in ascending id order so that opposing
    /// transfers cannot wait on each other.
    pub async fn transfer(
        &self,
        sender_id: AccountId,
        recipient_id: AccountId,
        amount_cents: Cents,
    ) -> Result<TransferResult, AppError> {
        if sender_id == recipient_id {
            return Err(AppError::SelfTransfer(sender_id));
        }
        validate_amount(amount_cents)?;

        let mut tx = self.db.begin().await?;

        let (first, second) = if sender_id < recipient_id {
            (sender_id, recipient_id)
        } else {
            (recipient_id, sender_id)
        };
        let mut sender_balance = 0;
        for id in [first, second] {
            let account = AccountStore::lock(&mut tx, id)
                .await?
                .ok_or_else(|| AppError::AccountNotFound(id.to_string()))?;
            if id == sender_id {
                sender_balance = account.balance_cents;
            }
        }

        if amount_cents > sender_balance {
            warn!(
                sender = %sender_id,
                recipient = %recipient_id,
                amount = %format_cents(amount_cents),
                balance = %format_cents(sender_balance),
                "transfer rejected"
            );
            return Err(AppError::InsufficientFunds {
                account_id: sender_id,
                balance: sender_balance,
                required: amount_cents,
            });
        }

        // Any error from here on drops `tx`, rolling back whatever was written.
        let sender = AccountStore::apply_delta(&mut tx, sender_id, -amount_cents).await?;
        let recipient = AccountStore::apply_delta(&mut tx, recipient_id, amount_cents).await?;
        let mut transfer =
            TransferRecord::new(sender_id, recipient_id, amount_cents, self.clock.now());
        TransferLog::append(&mut tx, &mut transfer).await?;
        tx.commit().await.context("Failed to commit transfer")?;

        info!(
            transfer = %transfer.id,
            sender = %sender_id,
            recipient = %recipient_id,
            amount = %format_cents(amount_cents),
            "transfer committed"
        );
        self.notify(
            &sender,
            NotificationKind::TransferSent,
            amount_cents,
            Some(recipient.account_no),
        );
        self.notify(
            &recipient,
            NotificationKind::TransferReceived,
            amount_cents,
            Some(sender.account_no),
        );

        Ok(TransferResult {
            transfer,
            sender,
            recipient,
        })
    }

    /// Get a transfer by ID.
    pub async fn get_transfer(&self, id: TransferId) -> Result<TransferRecord, AppError> {
        let mut conn = self.db.acquire().await?;
        TransferLog::get(&mut conn, id)
            .await?
            .ok_or(AppError::TransferNotFound(id))
    }

    /// List transfers sent or received by an account, oldest first.
    pub async fn list_transfers(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<TransferRecord>, AppError> {
        let mut tx = self.db.begin().await?;
        if AccountStore::get(&mut tx, account_id).await?.is_none() {
            return Err(AppError::AccountNotFound(account_id.to_string()));
        }
        let transfers = TransferLog::list_for_account(&mut tx, account_id).await?;
        tx.commit().await.context("Failed to finish transfer listing")?;
        Ok(transfers)
    }
}
