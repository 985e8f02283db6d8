use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::domain::{
    Account, AccountId, Cents, DateRange, TransactionRecord, TransferRecord, net_transfer_flow,
    sum_amounts,
};
use crate::storage::{AccountStore, TransactionLog, TransferLog};

use super::{AppError, LedgerService};

/// Transactions of one account, optionally limited to a date range.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionReport {
    pub account_id: AccountId,
    pub range: Option<DateRange>,
    pub records: Vec<TransactionRecord>,
    /// Sum of `records` amounts when a range is given, otherwise the current balance
    pub total: Cents,
}

/// Everything an account statement shows: header, transactions and transfers.
#[derive(Debug, Clone, Serialize)]
pub struct Statement {
    pub account: Account,
    pub generated_at: DateTime<Utc>,
    pub range: Option<DateRange>,
    pub transactions: Vec<TransactionRecord>,
    pub transaction_total: Cents,
    pub transfers: Vec<TransferRecord>,
    /// Incoming minus outgoing transfers over `transfers`
    pub transfer_net: Cents,
}

/// Build a report range from optional `YYYY-MM-DD` bounds.
/// Both bounds or neither must be given.
pub fn parse_report_range(
    start: Option<&str>,
    end: Option<&str>,
) -> Result<Option<DateRange>, AppError> {
    match (start, end) {
        (Some(start), Some(end)) => Ok(Some(DateRange::parse(start, end)?)),
        (None, None) => Ok(None),
        _ => Err(AppError::Validation(
            "Both a start and an end date are required".to_string(),
        )),
    }
}

impl LedgerService {
    /// List an account's transactions in ledger order.
    ///
    /// With a range, `total` is the sum over exactly the returned records.
    /// Without one, `total` is the account's current balance.
    pub async fn list_transactions(
        &self,
        account_id: AccountId,
        range: Option<DateRange>,
    ) -> Result<TransactionReport, AppError> {
        let mut tx = self.db.begin().await?;
        let account = AccountStore::get(&mut tx, account_id)
            .await?
            .ok_or_else(|| AppError::AccountNotFound(account_id.to_string()))?;

        let (records, total) = match range {
            Some(range) => {
                let (from, to) = range.bounds();
                let records =
                    TransactionLog::list_for_account_between(&mut tx, account_id, from, to)
                        .await?;
                let total = sum_amounts(&records);
                (records, total)
            }
            None => {
                let records = TransactionLog::list_for_account(&mut tx, account_id).await?;
                (records, account.balance_cents)
            }
        };
        tx.commit().await.context("Failed to finish transaction report")?;

        debug!(account = %account_id, records = records.len(), ?range, "transaction report");
        Ok(TransactionReport {
            account_id,
            range,
            records,
            total,
        })
    }

    /// Build a full statement for an account from one consistent snapshot.
    pub async fn statement(
        &self,
        account_id: AccountId,
        range: Option<DateRange>,
    ) -> Result<Statement, AppError> {
        let mut tx = self.db.begin().await?;
        let account = AccountStore::get(&mut tx, account_id)
            .await?
            .ok_or_else(|| AppError::AccountNotFound(account_id.to_string()))?;

        let (transactions, transfers) = match range {
            Some(range) => {
                let (from, to) = range.bounds();
                (
                    TransactionLog::list_for_account_between(&mut tx, account_id, from, to)
                        .await?,
                    TransferLog::list_for_account_between(&mut tx, account_id, from, to).await?,
                )
            }
            None => (
                TransactionLog::list_for_account(&mut tx, account_id).await?,
                TransferLog::list_for_account(&mut tx, account_id).await?,
            ),
        };
        tx.commit().await.context("Failed to finish statement")?;

        let transaction_total = match range {
            Some(_) => sum_amounts(&transactions),
            None => account.balance_cents,
        };
        let transfer_net = net_transfer_flow(account_id, &transfers);

        Ok(Statement {
            account,
            generated_at: self.clock.now(),
            range,
            transactions,
            transaction_total,
            transfers,
            transfer_net,
        })
    }
}
