use anyhow::Result;
use std::io::Write;

use crate::application::{LedgerService, Statement};
use crate::domain::{AccountId, DateRange, format_cents};

/// Exporter for writing ledger data out as CSV or JSON
pub struct Exporter<'a> {
    service: &'a LedgerService,
}

impl<'a> Exporter<'a> {
    pub fn new(service: &'a LedgerService) -> Self {
        Self { service }
    }

    /// Export an account's transactions to CSV format
    pub async fn export_transactions_csv<W: Write>(
        &self,
        account_id: AccountId,
        range: Option<DateRange>,
        writer: W,
    ) -> Result<usize> {
        let report = self.service.list_transactions(account_id, range).await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "id",
            "sequence",
            "timestamp",
            "type",
            "amount",
            "balance_after",
            "loan_status",
        ])?;

        for record in &report.records {
            csv_writer.write_record([
                record.id.to_string(),
                record.sequence.to_string(),
                record.timestamp.to_rfc3339(),
                record.transaction_type.as_str().to_string(),
                format_cents(record.amount_cents),
                format_cents(record.balance_after_cents),
                record
                    .loan_status()
                    .map(|status| status.as_str().to_string())
                    .unwrap_or_default(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(report.records.len())
    }

    /// Export an account's transfers to CSV format, using account numbers for both sides
    pub async fn export_transfers_csv<W: Write>(
        &self,
        account_id: AccountId,
        range: Option<DateRange>,
        writer: W,
    ) -> Result<usize> {
        let statement = self.service.statement(account_id, range).await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "id",
            "sequence",
            "timestamp",
            "sender",
            "recipient",
            "amount",
            "effect",
        ])?;

        for transfer in &statement.transfers {
            let sender = self.service.get_account(transfer.sender).await?;
            let recipient = self.service.get_account(transfer.recipient).await?;

            csv_writer.write_record([
                transfer.id.to_string(),
                transfer.sequence.to_string(),
                transfer.timestamp.to_rfc3339(),
                sender.account_no.to_string(),
                recipient.account_no.to_string(),
                format_cents(transfer.amount_cents),
                format_cents(transfer.effect_on(account_id)),
            ])?;
        }

        csv_writer.flush()?;
        Ok(statement.transfers.len())
    }

    /// Export every account with its balance to CSV format
    pub async fn export_accounts_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let accounts = self.service.list_accounts().await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record(["account_no", "owner", "type", "balance", "opened"])?;

        for account in &accounts {
            csv_writer.write_record([
                account.account_no.to_string(),
                account.owner.clone(),
                account.account_type.as_str().to_string(),
                format_cents(account.balance_cents),
                account.created_at.to_rfc3339(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(accounts.len())
    }

    /// Export a full account statement as JSON
    pub async fn export_statement_json<W: Write>(
        &self,
        account_id: AccountId,
        range: Option<DateRange>,
        mut writer: W,
    ) -> Result<Statement> {
        let statement = self.service.statement(account_id, range).await?;

        let json = serde_json::to_string_pretty(&statement)?;
        writer.write_all(json.as_bytes())?;
        writer.flush()?;

        Ok(statement)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    use super::*;
    use crate::application::{LedgerConfig, ManualClock};
    use crate::domain::AccountType;

    async fn service(dir: &TempDir) -> LedgerService {
        let path = dir.path().join("export.db");
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap());
        LedgerService::init(path.to_str().unwrap(), LedgerConfig::default())
            .await
            .unwrap()
            .with_clock(Arc::new(clock))
    }

    #[tokio::test]
    async fn test_export_transactions_csv() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir).await;
        let account = service
            .open_account("ada@example.com".to_string(), AccountType::Savings)
            .await
            .unwrap();
        service.deposit(account.id, 10_000).await.unwrap();
        service.withdraw(account.id, 2_550).await.unwrap();

        let mut out = Vec::new();
        let count = Exporter::new(&service)
            .export_transactions_csv(account.id, None, &mut out)
            .await
            .unwrap();
        assert_eq!(count, 2);

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("id,sequence,timestamp,type"));
        assert!(lines[1].contains(",deposit,100.00,100.00,"));
        assert!(lines[2].contains(",withdrawal,-25.50,74.50,"));
    }

    #[tokio::test]
    async fn test_export_statement_json() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir).await;
        let alice = service
            .open_account("alice@example.com".to_string(), AccountType::Current)
            .await
            .unwrap();
        let bob = service
            .open_account("bob@example.com".to_string(), AccountType::Current)
            .await
            .unwrap();
        service.deposit(alice.id, 5_000).await.unwrap();
        service.transfer(alice.id, bob.id, 1_200).await.unwrap();

        let mut out = Vec::new();
        let statement = Exporter::new(&service)
            .export_statement_json(alice.id, None, &mut out)
            .await
            .unwrap();
        assert_eq!(statement.transfer_net, -1_200);
        assert_eq!(statement.transaction_total, 3_800);

        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["account"]["account_no"], alice.account_no);
        assert_eq!(value["transactions"].as_array().unwrap().len(), 1);
        assert_eq!(value["transfers"].as_array().unwrap().len(), 1);
    }
}
