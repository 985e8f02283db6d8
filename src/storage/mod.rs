mod accounts;
mod error;
mod transactions;
mod transfers;

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Sqlite, SqliteConnection, SqlitePool};

pub use accounts::*;
pub use error::*;
pub use transactions::*;
pub use transfers::*;

/// SQL migration for the initial schema
pub const MIGRATION_001_INITIAL: &str = include_str!("migrations/001_initial.sql");

/// SQL migration guarding append-only tables
pub const MIGRATION_002_APPEND_ONLY: &str = include_str!("migrations/002_append_only.sql");

/// A database transaction. Dropping it without `commit` rolls every write back.
pub type Tx = sqlx::Transaction<'static, Sqlite>;

/// Handle on the ledger database. The stores operate on connections
/// borrowed from it so that several of them can share one transaction.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database handle with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database.
    ///
    /// Writers queue on the database lock for up to `busy_timeout` before failing.
    pub async fn connect(
        database_url: &str,
        create_if_missing: bool,
        busy_timeout: Duration,
    ) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("Invalid database URL: {}", database_url))?
            .create_if_missing(create_if_missing)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(busy_timeout);

        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;

        sqlx::query(MIGRATION_002_APPEND_ONLY)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 002")?;

        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(database_url: &str, busy_timeout: Duration) -> Result<Self> {
        let db = Self::connect(database_url, true, busy_timeout).await?;
        db.migrate().await?;
        Ok(db)
    }

    /// Start a transaction.
    pub async fn begin(&self) -> Result<Tx> {
        self.pool
            .begin()
            .await
            .context("Failed to start database transaction")
    }

    /// Borrow a pooled connection for work that needs no transaction.
    pub async fn acquire(&self) -> Result<PoolConnection<Sqlite>> {
        self.pool
            .acquire()
            .await
            .context("Failed to acquire database connection")
    }
}

/// Get the next value of a named counter and increment it.
pub(crate) async fn next_counter(conn: &mut SqliteConnection, name: &str) -> Result<i64> {
    let value: i64 = sqlx::query_scalar(
        r#"
        UPDATE sequence_counter
        SET value = value + 1
        WHERE name = ?
        RETURNING value
        "#,
    )
    .bind(name)
    .fetch_one(&mut *conn)
    .await
    .with_context(|| format!("Failed to advance counter '{}'", name))?;

    Ok(value)
}

/// Timestamps are stored as fixed-width UTC RFC 3339 text so that string
/// order in SQL matches chronological order.
pub(crate) fn encode_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_timestamp(s: &str, column: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("Invalid {} timestamp", column))?
        .with_timezone(&Utc))
}
