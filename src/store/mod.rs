//! Persistence layer: SQLite pool plus the per-request unit of work.

pub mod uow;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::info;

use crate::types::Result;

/// Schema, applied at startup. Statements are idempotent.
///
/// Two constraints back up the engine's check-then-act paths: the UNIQUE
/// on `transactions.unique_id` (at-most-once credits) and the UNIQUE on
/// `(game_id, user_twitch_id)` (one wager per user per game).
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_twitch_id TEXT NOT NULL UNIQUE,
    login_name TEXT NOT NULL,
    display_name TEXT NOT NULL,
    balance INTEGER NOT NULL DEFAULT 0,
    last_updated TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS transactions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users (id),
    date TEXT NOT NULL,
    amount INTEGER NOT NULL,
    balance INTEGER NOT NULL,
    reason TEXT NOT NULL,
    unique_id TEXT UNIQUE,
    grouping_id TEXT
);

CREATE INDEX IF NOT EXISTS idx_transactions_user ON transactions (user_id);

CREATE TABLE IF NOT EXISTS games (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    objective TEXT NOT NULL,
    maximum_bet INTEGER,
    status TEXT NOT NULL,
    winning_option INTEGER
);

CREATE TABLE IF NOT EXISTS game_options (
    game_id INTEGER NOT NULL REFERENCES games (id),
    option_id INTEGER NOT NULL,
    description TEXT NOT NULL,
    odds TEXT,
    PRIMARY KEY (game_id, option_id)
);

CREATE TABLE IF NOT EXISTS wagers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    game_id INTEGER NOT NULL REFERENCES games (id),
    user_twitch_id TEXT NOT NULL,
    option_id INTEGER NOT NULL,
    amount INTEGER NOT NULL,
    awarded INTEGER NOT NULL DEFAULT 0,
    UNIQUE (game_id, user_twitch_id)
)
"#;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if missing) the database at `url`.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// In-memory database for tests. A single connection keeps every query
    /// on the same memory instance.
    pub async fn connect_in_memory() -> Result<Self> {
        let db = Self::connect("sqlite::memory:", 1).await?;
        db.migrate().await?;
        Ok(db)
    }

    /// Apply the schema.
    pub async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!("Database schema ready");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Check that the database answers a trivial query.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
