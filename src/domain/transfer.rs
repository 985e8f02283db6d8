use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccountId, Cents};

pub type TransferId = Uuid;

/// A transfer represents one atomic movement of money from one account to another.
/// Transfers are immutable once recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRecord {
    pub id: TransferId,
    /// Monotonically increasing sequence number for ordering
    pub sequence: i64,
    /// Account being debited
    pub sender: AccountId,
    /// Account being credited
    pub recipient: AccountId,
    /// Amount in cents (always positive)
    pub amount_cents: Cents,
    pub timestamp: DateTime<Utc>,
}

impl TransferRecord {
    /// Create a new transfer. Sequence number must be assigned by the transfer log.
    pub fn new(
        sender: AccountId,
        recipient: AccountId,
        amount_cents: Cents,
        timestamp: DateTime<Utc>,
    ) -> Self {
        assert!(amount_cents > 0, "Transfer amount must be positive");
        assert!(sender != recipient, "Transfer sender and recipient must differ");
        Self {
            id: Uuid::new_v4(),
            sequence: 0,
            sender,
            recipient,
            amount_cents,
            timestamp,
        }
    }

    /// Signed effect of this transfer on the given account's balance.
    pub fn effect_on(&self, account: AccountId) -> Cents {
        if account == self.recipient {
            self.amount_cents
        } else if account == self.sender {
            -self.amount_cents
        } else {
            0
        }
    }
}
