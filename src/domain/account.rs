use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Cents, format_cents};

pub type AccountId = Uuid;

/// Human-facing account number, handed out sequentially from 1000001.
pub type AccountNumber = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Savings,
    Current,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Savings => "savings",
            AccountType::Current => "current",
        }
    }
}

impl FromStr for AccountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "savings" => Ok(AccountType::Savings),
            "current" => Ok(AccountType::Current),
            other => Err(format!("unknown account type '{}'", other)),
        }
    }
}

impl std::fmt::Display for AccountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A balance-holding account. Balance is only ever changed by the account store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    /// Assigned by the store on creation
    pub account_no: AccountNumber,
    /// Opaque owner reference resolved by the account directory
    pub owner: String,
    pub account_type: AccountType,
    pub balance_cents: Cents,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Create a new, empty account. The account number must be assigned by the store.
    pub fn new(owner: impl Into<String>, account_type: AccountType, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_no: 0,
            owner: owner.into(),
            account_type,
            balance_cents: 0,
            created_at,
        }
    }

    /// Compute the balance that applying `delta` would produce.
    /// Fails without side effects when the result would be negative.
    pub fn balance_after(&self, delta: Cents) -> Result<Cents, BalanceError> {
        match self.balance_cents.checked_add(delta) {
            Some(next) if next >= 0 => Ok(next),
            Some(_) => Err(BalanceError::InsufficientFunds {
                balance: self.balance_cents,
                required: -delta,
            }),
            None => Err(BalanceError::Overflow),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BalanceError {
    InsufficientFunds { balance: Cents, required: Cents },
    Overflow,
}

impl std::fmt::Display for BalanceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BalanceError::InsufficientFunds { balance, required } => write!(
                f,
                "balance {} does not cover {}",
                format_cents(*balance),
                format_cents(*required)
            ),
            BalanceError::Overflow => write!(f, "balance would overflow"),
        }
    }
}

impl std::error::Error for BalanceError {}
