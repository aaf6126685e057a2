//! The currency ledger: single source of truth for user balances.
//!
//! Every balance change flows through [`Ledger::credit`]. The transaction
//! log is append-only; for any user, replaying it in id order reconstructs
//! the current balance exactly. Credits carrying a `unique_id` are applied
//! at most once, which makes redelivered external events (channel-point
//! redemptions) safe to retry.

use chrono::Utc;
use serde::Deserialize;
use tracing::debug;

use crate::hub::Notification;
use crate::store::uow::UnitOfWork;
use crate::types::{
    CreditReceipt, Error, LeaderboardEntry, Result, Transaction, UserProfile,
};

/// Optional filters for the transaction history query.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct TransactionQuery {
    pub user_twitch_id: Option<String>,
    pub unique_id: Option<String>,
    pub grouping_id: Option<String>,
}

pub struct Ledger;

impl Ledger {
    /// Apply a signed balance delta and append the matching transaction
    /// row. The user row is upserted, so a first-ever credit creates the
    /// user with placeholder names.
    ///
    /// With a `unique_id`, a credit that was already committed under that
    /// id is a no-op returning `Ok(None)` — the only case where "nothing
    /// happened" is a successful outcome.
    ///
    /// The ledger itself does not enforce non-negative balances; callers
    /// that need a funds check (bet placement) do it before debiting, and
    /// unconditional credits (moderator grants) stay unconditional.
    pub async fn credit(
        uow: &mut UnitOfWork,
        user_twitch_id: &str,
        amount: i64,
        reason: &str,
        unique_id: Option<&str>,
        grouping_id: Option<&str>,
    ) -> Result<Option<CreditReceipt>> {
        if let Some(unique_id) = unique_id {
            let existing: Option<(i64,)> =
                sqlx::query_as("SELECT id FROM transactions WHERE unique_id = ?1")
                    .bind(unique_id)
                    .fetch_optional(uow.conn())
                    .await?;
            if existing.is_some() {
                debug!(unique_id, "Duplicate credit suppressed");
                return Ok(None);
            }
        }

        let now = Utc::now();
        let (user_id, balance): (i64, i64) = sqlx::query_as(
            r#"
            INSERT INTO users (user_twitch_id, login_name, display_name, balance, last_updated)
            VALUES (?1, 'user', 'user', ?2, ?3)
            ON CONFLICT (user_twitch_id) DO UPDATE
            SET balance = balance + excluded.balance,
                last_updated = excluded.last_updated
            RETURNING id, balance
            "#,
        )
        .bind(user_twitch_id)
        .bind(amount)
        .bind(now)
        .fetch_one(uow.conn())
        .await?;

        let (transaction_id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO transactions (user_id, date, amount, balance, reason, unique_id, grouping_id)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(now)
        .bind(amount)
        .bind(balance)
        .bind(reason)
        .bind(unique_id)
        .bind(grouping_id)
        .fetch_one(uow.conn())
        .await?;

        uow.on_commit(Notification::CurrencyUpdated {
            user_twitch_id: user_twitch_id.to_string(),
            transaction_id,
            balance,
        });

        Ok(Some(CreditReceipt {
            transaction_id,
            balance,
        }))
    }

    /// Current balance. Unknown users read as zero; no row is required to
    /// answer the query.
    pub async fn balance(uow: &mut UnitOfWork, user_twitch_id: &str) -> Result<i64> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT balance FROM users WHERE user_twitch_id = ?1")
                .bind(user_twitch_id)
                .fetch_optional(uow.conn())
                .await?;
        Ok(row.map(|(balance,)| balance).unwrap_or(0))
    }

    /// Upsert a user's names (login flow), preserving any balance.
    pub async fn save_user(
        uow: &mut UnitOfWork,
        user_twitch_id: &str,
        login_name: &str,
        display_name: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (user_twitch_id, login_name, display_name, balance, last_updated)
            VALUES (?1, ?2, ?3, 0, ?4)
            ON CONFLICT (user_twitch_id) DO UPDATE
            SET login_name = excluded.login_name,
                display_name = excluded.display_name,
                last_updated = excluded.last_updated
            "#,
        )
        .bind(user_twitch_id)
        .bind(login_name)
        .bind(display_name)
        .bind(Utc::now())
        .execute(uow.conn())
        .await?;
        Ok(())
    }

    pub async fn user(uow: &mut UnitOfWork, user_twitch_id: &str) -> Result<UserProfile> {
        sqlx::query_as::<_, UserProfile>(
            "SELECT user_twitch_id, login_name, display_name, balance, last_updated
             FROM users WHERE user_twitch_id = ?1",
        )
        .bind(user_twitch_id)
        .fetch_optional(uow.conn())
        .await?
        .ok_or_else(|| Error::NotFound(format!("user {user_twitch_id}")))
    }

    /// Paged leaderboard, ranked by balance descending. Page numbers start
    /// at 1; a page size of 0 means the default of 20.
    pub async fn leaderboard(
        uow: &mut UnitOfWork,
        page_number: u32,
        page_size: u32,
    ) -> Result<Vec<LeaderboardEntry>> {
        let limit = if page_size == 0 { 20 } else { page_size } as i64;
        let offset = if page_number <= 1 {
            0
        } else {
            (page_number as i64 - 1) * limit
        };

        sqlx::query_as::<_, LeaderboardEntry>(
            r#"
            SELECT RANK() OVER (ORDER BY balance DESC) AS rank,
                   display_name, user_twitch_id, balance
            FROM users
            ORDER BY balance DESC
            LIMIT ?1 OFFSET ?2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(uow.conn())
        .await
        .map_err(Into::into)
    }

    /// Transaction history with optional filters, oldest first.
    pub async fn transactions(
        uow: &mut UnitOfWork,
        query: &TransactionQuery,
    ) -> Result<Vec<Transaction>> {
        sqlx::query_as::<_, Transaction>(
            r#"
            SELECT t.id, t.user_id, t.date, t.amount, t.balance, t.reason,
                   t.unique_id, t.grouping_id
            FROM transactions t
            INNER JOIN users u ON u.id = t.user_id
            WHERE (?1 IS NULL OR u.user_twitch_id = ?1)
              AND (?2 IS NULL OR t.unique_id = ?2)
              AND (?3 IS NULL OR t.grouping_id = ?3)
            ORDER BY t.id
            "#,
        )
        .bind(query.user_twitch_id.as_deref())
        .bind(query.unique_id.as_deref())
        .bind(query.grouping_id.as_deref())
        .fetch_all(uow.conn())
        .await
        .map_err(Into::into)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
