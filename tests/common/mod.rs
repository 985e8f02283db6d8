// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use arca::application::{
    DeliveryError, LedgerConfig, LedgerService, Mailer, ManualClock, NotificationKind,
};
use arca::domain::{Account, AccountType, Cents};
use chrono::{DateTime, NaiveDate, Utc};
use tempfile::TempDir;

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(LedgerService, TempDir)> {
    test_service_with_config(LedgerConfig::default()).await
}

/// Helper to create a test service with custom tunables
pub async fn test_service_with_config(config: LedgerConfig) -> Result<(LedgerService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let service = LedgerService::init(db_path.to_str().unwrap(), config).await?;
    Ok((service, temp_dir))
}

/// Helper to create a test service whose clock only moves when told to
pub async fn test_service_at(
    start: DateTime<Utc>,
) -> Result<(LedgerService, Arc<ManualClock>, TempDir)> {
    let (service, temp_dir) = test_service().await?;
    let clock = Arc::new(ManualClock::new(start));
    let service = service.with_clock(clock.clone());
    Ok((service, clock, temp_dir))
}

/// Helper to parse a date string into DateTime<Utc>
pub fn parse_date(date_str: &str) -> DateTime<Utc> {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        .and_utc()
}

/// Test fixture: open an account and fund it with a deposit
pub async fn open_funded(
    service: &LedgerService,
    owner: &str,
    balance: Cents,
) -> Result<Account> {
    let account = service
        .open_account(owner.to_string(), AccountType::Savings)
        .await?;
    if balance > 0 {
        service.deposit(account.id, balance).await?;
    }
    Ok(service.get_account(account.id).await?)
}

/// Mailer that keeps every message it is asked to send
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<(String, NotificationKind, BTreeMap<String, String>)>>,
}

impl RecordingMailer {
    pub fn kinds_for(&self, recipient: &str) -> Vec<NotificationKind> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(to, _, _)| to == recipient)
            .map(|(_, kind, _)| *kind)
            .collect()
    }
}

impl Mailer for RecordingMailer {
    fn send(
        &self,
        recipient: &str,
        kind: NotificationKind,
        variables: &BTreeMap<String, String>,
    ) -> Result<(), DeliveryError> {
        self.sent
            .lock()
            .unwrap()
            .push((recipient.to_string(), kind, variables.clone()));
        Ok(())
    }
}

/// Mailer whose every delivery fails
pub struct FailingMailer;

impl Mailer for FailingMailer {
    fn send(
        &self,
        recipient: &str,
        _kind: NotificationKind,
        _variables: &BTreeMap<String, String>,
    ) -> Result<(), DeliveryError> {
        Err(DeliveryError {
            recipient: recipient.to_string(),
            reason: "smtp connection refused".to_string(),
        })
    }
}
