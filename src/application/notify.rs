// Post-commit notifications.
// Ledger operations publish a `Notification` to an `Outbox` once their
// database transaction has committed. A background task drains the outbox
// and hands each message to a `Mailer`. Delivery is best-effort: failures
// are logged and counted, never reported back to the operation.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::domain::{AccountNumber, Cents, format_cents};

/// Which message template a notification uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Deposit,
    Withdrawal,
    LoanRequested,
    LoanApproved,
    LoanPaid,
    TransferSent,
    TransferReceived,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Deposit => "deposit",
            NotificationKind::Withdrawal => "withdrawal",
            NotificationKind::LoanRequested => "loan_requested",
            NotificationKind::LoanApproved => "loan_approved",
            NotificationKind::LoanPaid => "loan_paid",
            NotificationKind::TransferSent => "transfer_sent",
            NotificationKind::TransferReceived => "transfer_received",
        }
    }

    pub fn subject(&self) -> &'static str {
        match self {
            NotificationKind::Deposit => "Deposit Message",
            NotificationKind::Withdrawal => "Withdrawal Message",
            NotificationKind::LoanRequested => "Loan Request Message",
            NotificationKind::LoanApproved => "Loan Approval Message",
            NotificationKind::LoanPaid => "Loan Payment Message",
            NotificationKind::TransferSent | NotificationKind::TransferReceived => "Transfer Money",
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of a committed ledger operation, addressed to one account owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub owner: String,
    pub account_no: AccountNumber,
    pub amount_cents: Cents,
    /// The other side of a transfer
    pub counterparty: Option<AccountNumber>,
}

impl Notification {
    pub fn variables(&self) -> BTreeMap<String, String> {
        let mut vars = BTreeMap::new();
        vars.insert("subject".to_string(), self.kind.subject().to_string());
        vars.insert("account_no".to_string(), self.account_no.to_string());
        vars.insert("amount".to_string(), format_cents(self.amount_cents));
        if let Some(other) = self.counterparty {
            vars.insert("counterparty".to_string(), other.to_string());
        }
        vars
    }
}

#[derive(Error, Debug)]
#[error("Delivery to {recipient} failed: {reason}")]
pub struct DeliveryError {
    pub recipient: String,
    pub reason: String,
}

/// Sends a rendered notification to a mail address.
///
/// Called from the notifier task; implementations that block should hand
/// their work to `tokio::task::spawn_blocking` themselves.
pub trait Mailer: Send + Sync {
    fn send(
        &self,
        recipient: &str,
        kind: NotificationKind,
        variables: &BTreeMap<String, String>,
    ) -> Result<(), DeliveryError>;
}

/// Resolves an account owner reference to a mail address.
pub trait AccountDirectory: Send + Sync {
    fn address_of(&self, owner: &str) -> Option<String>;
}

/// Treats owner references that look like mail addresses as the address itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct OwnerAddressDirectory;

impl AccountDirectory for OwnerAddressDirectory {
    fn address_of(&self, owner: &str) -> Option<String> {
        let (local, domain) = owner.split_once('@')?;
        if local.is_empty() || domain.is_empty() {
            return None;
        }
        Some(owner.to_string())
    }
}

/// Writes notifications to the log instead of sending them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(
        &self,
        recipient: &str,
        kind: NotificationKind,
        variables: &BTreeMap<String, String>,
    ) -> Result<(), DeliveryError> {
        tracing::info!(%recipient, %kind, ?variables, "notification");
        Ok(())
    }
}

/// Sending half of the notification channel. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct Outbox {
    tx: Option<mpsc::UnboundedSender<Notification>>,
}

impl Outbox {
    /// An outbox that discards everything.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Queue a notification. Never blocks and never fails the caller.
    pub fn publish(&self, notification: Notification) {
        let Some(tx) = &self.tx else {
            return;
        };
        if let Err(err) = tx.send(notification) {
            warn!(kind = %err.0.kind, "notifier has stopped, dropping notification");
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryStats {
    pub delivered: usize,
    pub failed: usize,
    /// Owner had no resolvable address
    pub skipped: usize,
}

/// Handle on the running notifier task.
pub struct NotifierHandle {
    task: JoinHandle<DeliveryStats>,
}

impl NotifierHandle {
    /// Wait for the notifier to drain. It finishes once every `Outbox` clone is dropped.
    pub async fn join(self) -> DeliveryStats {
        match self.task.await {
            Ok(stats) => stats,
            Err(err) => {
                warn!(error = %err, "notifier task ended abnormally");
                DeliveryStats::default()
            }
        }
    }
}

/// Start the notifier task on the current tokio runtime.
pub fn spawn_notifier(
    mailer: Arc<dyn Mailer>,
    directory: Arc<dyn AccountDirectory>,
) -> (Outbox, NotifierHandle) {
    let (tx, mut rx) = mpsc::unbounded_channel::<Notification>();

    let task = tokio::spawn(async move {
        let mut stats = DeliveryStats::default();
        while let Some(notification) = rx.recv().await {
            deliver(mailer.as_ref(), directory.as_ref(), &notification, &mut stats);
        }
        debug!(?stats, "notifier drained");
        stats
    });

    (Outbox { tx: Some(tx) }, NotifierHandle { task })
}

fn deliver(
    mailer: &dyn Mailer,
    directory: &dyn AccountDirectory,
    notification: &Notification,
    stats: &mut DeliveryStats,
) {
    let Some(address) = directory.address_of(&notification.owner) else {
        debug!(owner = %notification.owner, kind = %notification.kind, "no address for owner");
        stats.skipped += 1;
        return;
    };

    match mailer.send(&address, notification.kind, &notification.variables()) {
        Ok(()) => stats.delivered += 1,
        Err(err) => {
            warn!(error = %err, kind = %notification.kind, "notification delivery failed");
            stats.failed += 1;
        }
    }
}
