//! Shared types for the scales backend.
//!
//! These types form the data model used across the ledger, the betting
//! engine, and the HTTP layer. Row shapes are decoded once at the
//! data-access boundary via `sqlx::FromRow` and used as-is everywhere else.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Betting round
// ---------------------------------------------------------------------------

/// Lifecycle status of a betting round.
///
/// Transitions are one-directional except Done → Closed, which undoes a
/// payout. Stored as TEXT using the variant name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
pub enum BettingStatus {
    Open,
    Closed,
    Done,
    Canceled,
}

impl fmt::Display for BettingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BettingStatus::Open => write!(f, "Open"),
            BettingStatus::Closed => write!(f, "Closed"),
            BettingStatus::Done => write!(f, "Done"),
            BettingStatus::Canceled => write!(f, "Canceled"),
        }
    }
}

/// One option of a betting round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BettingOption {
    pub id: i64,
    pub description: String,
    /// Fixed odds `"[N:D]"`; absent means parimutuel.
    pub odds: Option<String>,
    /// Sum wagered on this option. `None` while the round is Open so live
    /// odds pressure is not revealed.
    pub total: Option<i64>,
}

/// A betting round with its options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BettingGame {
    pub id: i64,
    pub objective: String,
    pub maximum_bet: Option<i64>,
    pub status: BettingStatus,
    /// Set only while the round is Done.
    pub winning_option: Option<i64>,
    pub options: Vec<BettingOption>,
}

impl fmt::Display for BettingGame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "game #{} [{}] {} ({} options)",
            self.id,
            self.status,
            self.objective,
            self.options.len(),
        )
    }
}

/// Moderator input for one option when opening a round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBettingOption {
    pub description: String,
    #[serde(default)]
    pub odds: Option<String>,
}

/// A user's wager on a betting round. At most one per (game, user).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Wager {
    pub game_id: i64,
    pub user_twitch_id: String,
    pub option_id: i64,
    pub amount: i64,
    /// Payout amount; non-zero only on winning wagers of a settled round.
    pub awarded: i64,
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// One row of the append-only currency transaction log.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Transaction {
    pub id: i64,
    pub user_id: i64,
    pub date: DateTime<Utc>,
    /// Signed delta applied to the balance.
    pub amount: i64,
    /// Balance snapshot after the delta.
    pub balance: i64,
    pub reason: String,
    /// Idempotency token; at most one committed transaction per value.
    pub unique_id: Option<String>,
    /// Correlation tag, e.g. `Bet-<gameId>` for a betting round.
    pub grouping_id: Option<String>,
}

/// Result of an applied credit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CreditReceipt {
    pub transaction_id: i64,
    pub balance: i64,
}

/// A user row as read back over the API.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserProfile {
    pub user_twitch_id: String,
    pub login_name: String,
    pub display_name: String,
    pub balance: i64,
    pub last_updated: DateTime<Utc>,
}

/// One leaderboard row, ranked by balance descending.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LeaderboardEntry {
    pub rank: i64,
    pub display_name: String,
    pub user_twitch_id: String,
    pub balance: i64,
}

// ---------------------------------------------------------------------------
// Error taxonomy
// ---------------------------------------------------------------------------

/// Domain errors. The persistence variant aborts the whole unit of work;
/// nothing here is ever swallowed on the way up.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Rejected user input; no state change.
    #[error("{field}: {message}")]
    Validation { field: &'static str, message: String },

    /// Illegal state transition. Carries the game's current state so the
    /// caller can reconcile.
    #[error("game {} is {} and does not allow that transition", .game.id, .game.status)]
    Conflict { game: BettingGame },

    #[error("{0} not found")]
    NotFound(String),

    #[error("persistence failure: {0}")]
    Persistence(#[from] sqlx::Error),
}

impl Error {
    /// Shorthand for a field-scoped validation rejection.
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Error::Validation {
            field,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
