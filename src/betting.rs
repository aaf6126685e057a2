//! The betting engine: round lifecycle, wager ledger, and settlement.
//!
//! A round moves Open → Closed → Done, with Canceled reachable from Open
//! or Closed and Done → Closed as the payout-reversal path. Status changes
//! are compare-and-set updates so a lost race surfaces as a conflict
//! instead of a double refund or double payout. All money movement goes
//! through the ledger under the grouping id `Bet-<gameId>`.

use tracing::info;

use crate::hub::Notification;
use crate::ledger::Ledger;
use crate::odds::Odds;
use crate::store::uow::UnitOfWork;
use crate::types::{
    BettingGame, BettingOption, BettingStatus, Error, NewBettingOption, Result, Wager,
};

/// Row shape of the `games` table.
#[derive(Debug, sqlx::FromRow)]
struct GameRow {
    id: i64,
    objective: String,
    maximum_bet: Option<i64>,
    status: BettingStatus,
    winning_option: Option<i64>,
}

/// Row shape of the `game_options` table.
#[derive(Debug, sqlx::FromRow)]
struct OptionRow {
    option_id: i64,
    description: String,
    odds: Option<String>,
}

pub struct BettingEngine;

impl BettingEngine {
    /// Create a betting round in Open status with its options. Odds
    /// strings are validated here; settlement later assumes stored odds
    /// parse cleanly.
    pub async fn open_game(
        uow: &mut UnitOfWork,
        objective: &str,
        maximum_bet: Option<i64>,
        options: &[NewBettingOption],
    ) -> Result<BettingGame> {
        if options.len() < 2 {
            return Err(Error::validation(
                "options",
                "a betting round needs at least two options",
            ));
        }
        for option in options {
            if let Some(odds) = option.odds.as_deref() {
                if !Odds::validate(odds) {
                    return Err(Error::validation(
                        "options",
                        format!("malformed odds {odds:?}; expected \"[N:D]\""),
                    ));
                }
            }
        }

        let (game_id,): (i64,) = sqlx::query_as(
            "INSERT INTO games (objective, maximum_bet, status) VALUES (?1, ?2, ?3) RETURNING id",
        )
        .bind(objective)
        .bind(maximum_bet)
        .bind(BettingStatus::Open)
        .fetch_one(uow.conn())
        .await?;

        for (index, option) in options.iter().enumerate() {
            sqlx::query(
                "INSERT INTO game_options (game_id, option_id, description, odds)
                 VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(game_id)
            .bind(index as i64)
            .bind(&option.description)
            .bind(option.odds.as_deref())
            .execute(uow.conn())
            .await?;
        }

        let game = Self::game(uow, game_id).await?;
        uow.on_commit(Notification::BetStatusChanged { game: game.clone() });
        info!(game_id, objective, "Betting round opened");
        Ok(game)
    }

    /// Load a round with its options.
    pub async fn game(uow: &mut UnitOfWork, id: i64) -> Result<BettingGame> {
        let row: Option<GameRow> = sqlx::query_as(
            "SELECT id, objective, maximum_bet, status, winning_option FROM games WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(uow.conn())
        .await?;

        let row = row.ok_or_else(|| Error::NotFound(format!("game {id}")))?;
        Self::assemble(uow, row).await
    }

    /// The most recently opened round, if any. A derived read (max id),
    /// never a mutable pointer.
    pub async fn latest_game(uow: &mut UnitOfWork) -> Result<Option<BettingGame>> {
        let row: Option<GameRow> = sqlx::query_as(
            "SELECT id, objective, maximum_bet, status, winning_option
             FROM games ORDER BY id DESC LIMIT 1",
        )
        .fetch_optional(uow.conn())
        .await?;

        match row {
            Some(row) => Ok(Some(Self::assemble(uow, row).await?)),
            None => Ok(None),
        }
    }

    async fn assemble(uow: &mut UnitOfWork, row: GameRow) -> Result<BettingGame> {
        let options: Vec<OptionRow> = sqlx::query_as(
            "SELECT option_id, description, odds FROM game_options
             WHERE game_id = ?1 ORDER BY option_id",
        )
        .bind(row.id)
        .fetch_all(uow.conn())
        .await?;

        let totals: Vec<(i64, i64)> = sqlx::query_as(
            "SELECT option_id, COALESCE(SUM(amount), 0) FROM wagers
             WHERE game_id = ?1 GROUP BY option_id",
        )
        .bind(row.id)
        .fetch_all(uow.conn())
        .await?;

        // Totals stay hidden while the round is Open.
        let reveal_totals = row.status != BettingStatus::Open;
        let options = options
            .into_iter()
            .map(|option| BettingOption {
                id: option.option_id,
                description: option.description,
                odds: option.odds,
                total: if reveal_totals {
                    Some(
                        totals
                            .iter()
                            .find(|(id, _)| *id == option.option_id)
                            .map(|(_, total)| *total)
                            .unwrap_or(0),
                    )
                } else {
                    None
                },
            })
            .collect();

        Ok(BettingGame {
            id: row.id,
            objective: row.objective,
            maximum_bet: row.maximum_bet,
            status: row.status,
            winning_option: row.winning_option,
            options,
        })
    }

    /// All wagers on a round, in placement order.
    pub async fn wagers(uow: &mut UnitOfWork, game_id: i64) -> Result<Vec<Wager>> {
        sqlx::query_as::<_, Wager>(
            "SELECT game_id, user_twitch_id, option_id, amount, awarded
             FROM wagers WHERE game_id = ?1 ORDER BY id",
        )
        .bind(game_id)
        .fetch_all(uow.conn())
        .await
        .map_err(Into::into)
    }

    /// Apply a moderator-requested status change. The dispatch mirrors the
    /// legal edges of the state machine; anything else is a conflict
    /// carrying the round's current state.
    pub async fn transition(
        uow: &mut UnitOfWork,
        id: i64,
        target: BettingStatus,
        winning_option: Option<i64>,
    ) -> Result<BettingGame> {
        let game = Self::game(uow, id).await?;
        match (game.status, target) {
            (BettingStatus::Open, BettingStatus::Closed) => {
                Self::set_status(uow, id, BettingStatus::Open, BettingStatus::Closed).await?;
            }
            (BettingStatus::Open, BettingStatus::Canceled)
            | (BettingStatus::Closed, BettingStatus::Canceled) => {
                Self::cancel(uow, &game).await?;
            }
            (BettingStatus::Closed, BettingStatus::Done) => {
                let winner = winning_option.ok_or_else(|| {
                    Error::validation("winning_option", "declaring a winner requires winning_option")
                })?;
                Self::declare_winner(uow, &game, winner).await?;
            }
            (BettingStatus::Done, BettingStatus::Closed) => {
                Self::reverse_winner(uow, &game).await?;
            }
            _ => return Err(Error::Conflict { game }),
        }

        let game = Self::game(uow, id).await?;
        uow.on_commit(Notification::BetStatusChanged { game: game.clone() });
        Ok(game)
    }

    /// Compare-and-set the round status. Zero rows affected means the
    /// round moved underneath us; surface whatever state it is in now.
    async fn set_status(
        uow: &mut UnitOfWork,
        id: i64,
        from: BettingStatus,
        to: BettingStatus,
    ) -> Result<()> {
        let result = sqlx::query("UPDATE games SET status = ?1 WHERE id = ?2 AND status = ?3")
            .bind(to)
            .bind(id)
            .bind(from)
            .execute(uow.conn())
            .await?;

        if result.rows_affected() == 0 {
            let game = Self::game(uow, id).await?;
            return Err(Error::Conflict { game });
        }
        info!(game_id = id, %from, %to, "Betting round status changed");
        Ok(())
    }

    /// Cancellation: every stake comes back. Guarded by the status CAS —
    /// this path must run at most once per round or it double-refunds.
    async fn cancel(uow: &mut UnitOfWork, game: &BettingGame) -> Result<()> {
        Self::set_status(uow, game.id, game.status, BettingStatus::Canceled).await?;

        let grouping = grouping_id(game.id);
        for wager in Self::wagers(uow, game.id).await? {
            Ledger::credit(
                uow,
                &wager.user_twitch_id,
                wager.amount,
                "Bet refunded",
                None,
                Some(&grouping),
            )
            .await?;
        }
        info!(game_id = game.id, "Betting round canceled, stakes refunded");
        Ok(())
    }

    /// Settlement: compute the win multiplier (parimutuel from pool sizes,
    /// or fixed from the option's odds), floor each winner's payout, and
    /// credit it. Losing stakes were debited at placement and stay where
    /// they are.
    async fn declare_winner(uow: &mut UnitOfWork, game: &BettingGame, winner: i64) -> Result<()> {
        let winning_option = game
            .options
            .iter()
            .find(|option| option.id == winner)
            .ok_or_else(|| Error::validation("winning_option", "not an option of this game"))?;

        Self::set_status(uow, game.id, BettingStatus::Closed, BettingStatus::Done).await?;
        sqlx::query("UPDATE games SET winning_option = ?1 WHERE id = ?2")
            .bind(winner)
            .bind(game.id)
            .execute(uow.conn())
            .await?;

        let wagers = Self::wagers(uow, game.id).await?;
        let total_pool: i64 = wagers.iter().map(|w| w.amount).sum();
        let winning_pool: i64 = wagers
            .iter()
            .filter(|w| w.option_id == winner)
            .map(|w| w.amount)
            .sum();
        let multiplier =
            Odds::parse(winning_option.odds.as_deref()).win_multiplier(total_pool, winning_pool);
        info!(
            game_id = game.id,
            winner,
            %multiplier,
            total_pool,
            winning_pool,
            "Winner declared"
        );

        let grouping = grouping_id(game.id);
        for wager in wagers.into_iter().filter(|w| w.option_id == winner) {
            let awarded = Odds::payout(multiplier, wager.amount);
            sqlx::query("UPDATE wagers SET awarded = ?1 WHERE game_id = ?2 AND user_twitch_id = ?3")
                .bind(awarded)
                .bind(game.id)
                .bind(&wager.user_twitch_id)
                .execute(uow.conn())
                .await?;
            Ledger::credit(
                uow,
                &wager.user_twitch_id,
                awarded,
                "Betting payout",
                None,
                Some(&grouping),
            )
            .await?;
            uow.on_commit(Notification::BetChanged {
                user_twitch_id: wager.user_twitch_id.clone(),
                wager: Wager { awarded, ..wager },
            });
        }
        Ok(())
    }

    /// Undo a mis-declared winner: claw back every payout, zero the
    /// awarded amounts, clear the winner, and return the round to Closed.
    async fn reverse_winner(uow: &mut UnitOfWork, game: &BettingGame) -> Result<()> {
        Self::set_status(uow, game.id, BettingStatus::Done, BettingStatus::Closed).await?;

        let grouping = grouping_id(game.id);
        for wager in Self::wagers(uow, game.id)
            .await?
            .into_iter()
            .filter(|w| w.awarded > 0)
        {
            Ledger::credit(
                uow,
                &wager.user_twitch_id,
                -wager.awarded,
                "Betting payout reversed",
                None,
                Some(&grouping),
            )
            .await?;
            sqlx::query("UPDATE wagers SET awarded = 0 WHERE game_id = ?1 AND user_twitch_id = ?2")
                .bind(game.id)
                .bind(&wager.user_twitch_id)
                .execute(uow.conn())
                .await?;
            uow.on_commit(Notification::BetChanged {
                user_twitch_id: wager.user_twitch_id.clone(),
                wager: Wager { awarded: 0, ..wager },
            });
        }

        sqlx::query("UPDATE games SET winning_option = NULL WHERE id = ?1")
            .bind(game.id)
            .execute(uow.conn())
            .await?;
        info!(game_id = game.id, "Payout reversed, round back to Closed");
        Ok(())
    }

    /// Place a wager: stake is escrowed by debiting it immediately.
    /// Validations run in a fixed order so each failure is a distinct,
    /// user-visible rejection.
    pub async fn place_bet(
        uow: &mut UnitOfWork,
        game_id: i64,
        user_twitch_id: &str,
        option_id: i64,
        amount: i64,
    ) -> Result<BettingGame> {
        let game = Self::game(uow, game_id).await?;
        if game.status != BettingStatus::Open {
            return Err(Error::Conflict { game });
        }
        if amount <= 0 {
            return Err(Error::validation("amount", "you must bet at least 1 scale"));
        }
        let balance = Ledger::balance(uow, user_twitch_id).await?;
        if amount > balance {
            return Err(Error::validation(
                "amount",
                "you don't have that many scales to bet",
            ));
        }
        if !game.options.iter().any(|option| option.id == option_id) {
            return Err(Error::validation(
                "option_id",
                "you must select a valid option",
            ));
        }
        if let Some(maximum) = game.maximum_bet {
            if amount > maximum {
                return Err(Error::validation(
                    "amount",
                    format!("bets on this round are capped at {maximum} scales"),
                ));
            }
        }
        let already: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM wagers WHERE game_id = ?1 AND user_twitch_id = ?2")
                .bind(game_id)
                .bind(user_twitch_id)
                .fetch_optional(uow.conn())
                .await?;
        if already.is_some() {
            return Err(Error::validation(
                "user_twitch_id",
                "you cannot bet more than once",
            ));
        }

        // The UNIQUE (game_id, user_twitch_id) constraint backs up the
        // check above under concurrent placement.
        sqlx::query(
            "INSERT INTO wagers (game_id, user_twitch_id, option_id, amount)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(game_id)
        .bind(user_twitch_id)
        .bind(option_id)
        .bind(amount)
        .execute(uow.conn())
        .await?;

        let grouping = grouping_id(game_id);
        Ledger::credit(
            uow,
            user_twitch_id,
            -amount,
            "Bet placed",
            None,
            Some(&grouping),
        )
        .await?;
        info!(game_id, user_twitch_id, option_id, amount, "Bet placed");

        let game = Self::game(uow, game_id).await?;
        uow.on_commit(Notification::BetChanged {
            user_twitch_id: user_twitch_id.to_string(),
            wager: Wager {
                game_id,
                user_twitch_id: user_twitch_id.to_string(),
                option_id,
                amount,
                awarded: 0,
            },
        });
        uow.on_commit(Notification::BetStatusChanged { game: game.clone() });
        Ok(game)
    }
}

/// Correlation tag for all ledger rows of one round.
fn grouping_id(game_id: i64) -> String {
    format!("Bet-{game_id}")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::Hub;
    use crate::store::Database;

    async fn setup() -> (Database, Hub) {
        (Database::connect_in_memory().await.unwrap(), Hub::default())
    }

    async fn begin(db: &Database, hub: &Hub) -> UnitOfWork {
        UnitOfWork::begin(db.pool(), hub.clone()).await.unwrap()
    }

    fn two_options() -> Vec<NewBettingOption> {
        vec![
            NewBettingOption {
                description: "Yes".to_string(),
                odds: None,
            },
            NewBettingOption {
                description: "No".to_string(),
                odds: None,
            },
        ]
    }

    async fn fund(uow: &mut UnitOfWork, user: &str, amount: i64) {
        Ledger::credit(uow, user, amount, "Given", None, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_open_game_starts_open_with_hidden_totals() {
        let (db, hub) = setup().await;
        let mut uow = begin(&db, &hub).await;

        let game = BettingEngine::open_game(&mut uow, "First boss", Some(100), &two_options())
            .await
            .unwrap();
        assert_eq!(game.status, BettingStatus::Open);
        assert_eq!(game.options.len(), 2);
        assert!(game.options.iter().all(|o| o.total.is_none()));
        assert_eq!(game.maximum_bet, Some(100));
    }

    #[tokio::test]
    async fn test_open_game_requires_two_options() {
        let (db, hub) = setup().await;
        let mut uow = begin(&db, &hub).await;

        let result = BettingEngine::open_game(
            &mut uow,
            "o",
            None,
            &[NewBettingOption {
                description: "only".to_string(),
                odds: None,
            }],
        )
        .await;
        assert!(matches!(result, Err(Error::Validation { field: "options", .. })));
    }

    #[tokio::test]
    async fn test_open_game_rejects_malformed_odds() {
        let (db, hub) = setup().await;
        let mut uow = begin(&db, &hub).await;

        let options = vec![
            NewBettingOption {
                description: "Yes".to_string(),
                odds: Some("2:1".to_string()),
            },
            NewBettingOption {
                description: "No".to_string(),
                odds: None,
            },
        ];
        let result = BettingEngine::open_game(&mut uow, "o", None, &options).await;
        assert!(matches!(result, Err(Error::Validation { field: "options", .. })));
    }

    #[tokio::test]
    async fn test_latest_game_is_max_id() {
        let (db, hub) = setup().await;
        let mut uow = begin(&db, &hub).await;

        assert!(BettingEngine::latest_game(&mut uow).await.unwrap().is_none());
        BettingEngine::open_game(&mut uow, "first", None, &two_options())
            .await
            .unwrap();
        let second = BettingEngine::open_game(&mut uow, "second", None, &two_options())
            .await
            .unwrap();

        let latest = BettingEngine::latest_game(&mut uow).await.unwrap().unwrap();
        assert_eq!(latest.id, second.id);
        assert_eq!(latest.objective, "second");
    }

    #[tokio::test]
    async fn test_unknown_game_is_not_found() {
        let (db, hub) = setup().await;
        let mut uow = begin(&db, &hub).await;
        assert!(matches!(
            BettingEngine::game(&mut uow, 99).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            BettingEngine::place_bet(&mut uow, 99, "1", 0, 10).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_place_bet_debits_stake() {
        let (db, hub) = setup().await;
        let mut uow = begin(&db, &hub).await;
        fund(&mut uow, "u1", 100).await;

        let game = BettingEngine::open_game(&mut uow, "o", None, &two_options())
            .await
            .unwrap();
        BettingEngine::place_bet(&mut uow, game.id, "u1", 0, 40)
            .await
            .unwrap();

        assert_eq!(Ledger::balance(&mut uow, "u1").await.unwrap(), 60);
        let wagers = BettingEngine::wagers(&mut uow, game.id).await.unwrap();
        assert_eq!(wagers.len(), 1);
        assert_eq!(wagers[0].amount, 40);
        assert_eq!(wagers[0].awarded, 0);
    }

    #[tokio::test]
    async fn test_place_bet_validation_order() {
        let (db, hub) = setup().await;
        let mut uow = begin(&db, &hub).await;
        fund(&mut uow, "u1", 100).await;

        let game = BettingEngine::open_game(&mut uow, "o", Some(50), &two_options())
            .await
            .unwrap();

        let zero = BettingEngine::place_bet(&mut uow, game.id, "u1", 0, 0).await;
        assert!(matches!(zero, Err(Error::Validation { field: "amount", .. })));

        let broke = BettingEngine::place_bet(&mut uow, game.id, "u1", 0, 101).await;
        assert!(matches!(broke, Err(Error::Validation { field: "amount", .. })));

        let bad_option = BettingEngine::place_bet(&mut uow, game.id, "u1", 9, 10).await;
        assert!(matches!(
            bad_option,
            Err(Error::Validation { field: "option_id", .. })
        ));

        let over_cap = BettingEngine::place_bet(&mut uow, game.id, "u1", 0, 60).await;
        assert!(matches!(over_cap, Err(Error::Validation { field: "amount", .. })));

        // None of the rejections moved money.
        assert_eq!(Ledger::balance(&mut uow, "u1").await.unwrap(), 100);
        assert!(BettingEngine::wagers(&mut uow, game.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_one_wager_per_user_per_game() {
        let (db, hub) = setup().await;
        let mut uow = begin(&db, &hub).await;
        fund(&mut uow, "u1", 100).await;

        let game = BettingEngine::open_game(&mut uow, "o", None, &two_options())
            .await
            .unwrap();
        BettingEngine::place_bet(&mut uow, game.id, "u1", 0, 10)
            .await
            .unwrap();

        let second = BettingEngine::place_bet(&mut uow, game.id, "u1", 1, 10).await;
        assert!(matches!(
            second,
            Err(Error::Validation { field: "user_twitch_id", .. })
        ));
        assert_eq!(Ledger::balance(&mut uow, "u1").await.unwrap(), 90);
    }

    #[tokio::test]
    async fn test_bet_on_closed_game_conflicts() {
        let (db, hub) = setup().await;
        let mut uow = begin(&db, &hub).await;
        fund(&mut uow, "u1", 100).await;

        let game = BettingEngine::open_game(&mut uow, "o", None, &two_options())
            .await
            .unwrap();
        BettingEngine::transition(&mut uow, game.id, BettingStatus::Closed, None)
            .await
            .unwrap();

        let result = BettingEngine::place_bet(&mut uow, game.id, "u1", 0, 10).await;
        match result {
            Err(Error::Conflict { game }) => assert_eq!(game.status, BettingStatus::Closed),
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_declare_winner_requires_closed() {
        let (db, hub) = setup().await;
        let mut uow = begin(&db, &hub).await;

        let game = BettingEngine::open_game(&mut uow, "o", None, &two_options())
            .await
            .unwrap();
        let result =
            BettingEngine::transition(&mut uow, game.id, BettingStatus::Done, Some(0)).await;
        match result {
            Err(Error::Conflict { game }) => assert_eq!(game.status, BettingStatus::Open),
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_declare_winner_requires_option() {
        let (db, hub) = setup().await;
        let mut uow = begin(&db, &hub).await;

        let game = BettingEngine::open_game(&mut uow, "o", None, &two_options())
            .await
            .unwrap();
        BettingEngine::transition(&mut uow, game.id, BettingStatus::Closed, None)
            .await
            .unwrap();

        let missing =
            BettingEngine::transition(&mut uow, game.id, BettingStatus::Done, None).await;
        assert!(matches!(
            missing,
            Err(Error::Validation { field: "winning_option", .. })
        ));

        let invalid =
            BettingEngine::transition(&mut uow, game.id, BettingStatus::Done, Some(9)).await;
        assert!(matches!(
            invalid,
            Err(Error::Validation { field: "winning_option", .. })
        ));
    }

    #[tokio::test]
    async fn test_parimutuel_payout() {
        let (db, hub) = setup().await;
        let mut uow = begin(&db, &hub).await;
        fund(&mut uow, "u1", 100).await;
        fund(&mut uow, "u2", 200).await;
        fund(&mut uow, "u3", 50).await;

        let game = BettingEngine::open_game(&mut uow, "o", None, &two_options())
            .await
            .unwrap();
        BettingEngine::place_bet(&mut uow, game.id, "u1", 0, 100).await.unwrap();
        BettingEngine::place_bet(&mut uow, game.id, "u2", 1, 200).await.unwrap();
        BettingEngine::place_bet(&mut uow, game.id, "u3", 1, 50).await.unwrap();

        BettingEngine::transition(&mut uow, game.id, BettingStatus::Closed, None)
            .await
            .unwrap();
        let game = BettingEngine::transition(&mut uow, game.id, BettingStatus::Done, Some(1))
            .await
            .unwrap();

        // totalPool=350, winningPool=250 → multiplier 1.4
        assert_eq!(game.status, BettingStatus::Done);
        assert_eq!(game.winning_option, Some(1));
        assert_eq!(Ledger::balance(&mut uow, "u1").await.unwrap(), 0);
        assert_eq!(Ledger::balance(&mut uow, "u2").await.unwrap(), 280);
        assert_eq!(Ledger::balance(&mut uow, "u3").await.unwrap(), 70);

        let wagers = BettingEngine::wagers(&mut uow, game.id).await.unwrap();
        let by_user = |id: &str| wagers.iter().find(|w| w.user_twitch_id == id).unwrap();
        assert_eq!(by_user("u1").awarded, 0);
        assert_eq!(by_user("u2").awarded, 280);
        assert_eq!(by_user("u3").awarded, 70);
    }

    #[tokio::test]
    async fn test_fixed_odds_payout() {
        let (db, hub) = setup().await;
        let mut uow = begin(&db, &hub).await;
        fund(&mut uow, "u1", 100).await;
        fund(&mut uow, "u2", 500).await;

        let options = vec![
            NewBettingOption {
                description: "Long shot".to_string(),
                odds: Some("[2:1]".to_string()),
            },
            NewBettingOption {
                description: "Favourite".to_string(),
                odds: None,
            },
        ];
        let game = BettingEngine::open_game(&mut uow, "o", None, &options)
            .await
            .unwrap();
        BettingEngine::place_bet(&mut uow, game.id, "u1", 0, 50).await.unwrap();
        BettingEngine::place_bet(&mut uow, game.id, "u2", 1, 500).await.unwrap();

        BettingEngine::transition(&mut uow, game.id, BettingStatus::Closed, None)
            .await
            .unwrap();
        BettingEngine::transition(&mut uow, game.id, BettingStatus::Done, Some(0))
            .await
            .unwrap();

        // Multiplier is exactly 2 regardless of pool sizes.
        assert_eq!(Ledger::balance(&mut uow, "u1").await.unwrap(), 150);
        assert_eq!(Ledger::balance(&mut uow, "u2").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_winner_with_empty_pool_pays_nobody() {
        let (db, hub) = setup().await;
        let mut uow = begin(&db, &hub).await;
        fund(&mut uow, "u1", 100).await;

        let game = BettingEngine::open_game(&mut uow, "o", None, &two_options())
            .await
            .unwrap();
        BettingEngine::place_bet(&mut uow, game.id, "u1", 0, 100).await.unwrap();

        BettingEngine::transition(&mut uow, game.id, BettingStatus::Closed, None)
            .await
            .unwrap();
        // Winner is the option nobody backed.
        BettingEngine::transition(&mut uow, game.id, BettingStatus::Done, Some(1))
            .await
            .unwrap();

        assert_eq!(Ledger::balance(&mut uow, "u1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cancellation_refunds_stakes() {
        let (db, hub) = setup().await;
        let mut uow = begin(&db, &hub).await;
        fund(&mut uow, "u1", 100).await;
        fund(&mut uow, "u2", 200).await;

        let game = BettingEngine::open_game(&mut uow, "o", None, &two_options())
            .await
            .unwrap();
        BettingEngine::place_bet(&mut uow, game.id, "u1", 0, 100).await.unwrap();
        BettingEngine::place_bet(&mut uow, game.id, "u2", 1, 200).await.unwrap();

        let game = BettingEngine::transition(&mut uow, game.id, BettingStatus::Canceled, None)
            .await
            .unwrap();
        assert_eq!(game.status, BettingStatus::Canceled);
        assert_eq!(Ledger::balance(&mut uow, "u1").await.unwrap(), 100);
        assert_eq!(Ledger::balance(&mut uow, "u2").await.unwrap(), 200);
    }

    #[tokio::test]
    async fn test_cancel_from_closed() {
        let (db, hub) = setup().await;
        let mut uow = begin(&db, &hub).await;
        fund(&mut uow, "u1", 100).await;

        let game = BettingEngine::open_game(&mut uow, "o", None, &two_options())
            .await
            .unwrap();
        BettingEngine::place_bet(&mut uow, game.id, "u1", 0, 30).await.unwrap();
        BettingEngine::transition(&mut uow, game.id, BettingStatus::Closed, None)
            .await
            .unwrap();
        BettingEngine::transition(&mut uow, game.id, BettingStatus::Canceled, None)
            .await
            .unwrap();

        assert_eq!(Ledger::balance(&mut uow, "u1").await.unwrap(), 100);
    }

    #[tokio::test]
    async fn test_cancel_twice_conflicts() {
        let (db, hub) = setup().await;
        let mut uow = begin(&db, &hub).await;

        let game = BettingEngine::open_game(&mut uow, "o", None, &two_options())
            .await
            .unwrap();
        BettingEngine::transition(&mut uow, game.id, BettingStatus::Canceled, None)
            .await
            .unwrap();
        let again =
            BettingEngine::transition(&mut uow, game.id, BettingStatus::Canceled, None).await;
        assert!(matches!(again, Err(Error::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_reversal_restores_balances_and_state() {
        let (db, hub) = setup().await;
        let mut uow = begin(&db, &hub).await;
        fund(&mut uow, "u1", 100).await;
        fund(&mut uow, "u2", 200).await;

        let game = BettingEngine::open_game(&mut uow, "o", None, &two_options())
            .await
            .unwrap();
        BettingEngine::place_bet(&mut uow, game.id, "u1", 0, 100).await.unwrap();
        BettingEngine::place_bet(&mut uow, game.id, "u2", 1, 200).await.unwrap();
        BettingEngine::transition(&mut uow, game.id, BettingStatus::Closed, None)
            .await
            .unwrap();
        BettingEngine::transition(&mut uow, game.id, BettingStatus::Done, Some(0))
            .await
            .unwrap();
        // u1 got floor(3.0 * 100) = 300.
        assert_eq!(Ledger::balance(&mut uow, "u1").await.unwrap(), 300);

        let game = BettingEngine::transition(&mut uow, game.id, BettingStatus::Closed, None)
            .await
            .unwrap();
        assert_eq!(game.status, BettingStatus::Closed);
        assert!(game.winning_option.is_none());
        assert_eq!(Ledger::balance(&mut uow, "u1").await.unwrap(), 0);
        assert_eq!(Ledger::balance(&mut uow, "u2").await.unwrap(), 0);
        assert!(BettingEngine::wagers(&mut uow, game.id)
            .await
            .unwrap()
            .iter()
            .all(|w| w.awarded == 0));
    }

    #[tokio::test]
    async fn test_totals_revealed_once_closed() {
        let (db, hub) = setup().await;
        let mut uow = begin(&db, &hub).await;
        fund(&mut uow, "u1", 100).await;

        let game = BettingEngine::open_game(&mut uow, "o", None, &two_options())
            .await
            .unwrap();
        BettingEngine::place_bet(&mut uow, game.id, "u1", 0, 60).await.unwrap();

        let open = BettingEngine::game(&mut uow, game.id).await.unwrap();
        assert!(open.options.iter().all(|o| o.total.is_none()));

        let closed = BettingEngine::transition(&mut uow, game.id, BettingStatus::Closed, None)
            .await
            .unwrap();
        assert_eq!(closed.options[0].total, Some(60));
        assert_eq!(closed.options[1].total, Some(0));
    }

    #[tokio::test]
    async fn test_grouping_id_tags_all_round_money() {
        use crate::ledger::TransactionQuery;

        let (db, hub) = setup().await;
        let mut uow = begin(&db, &hub).await;
        fund(&mut uow, "u1", 100).await;

        let game = BettingEngine::open_game(&mut uow, "o", None, &two_options())
            .await
            .unwrap();
        BettingEngine::place_bet(&mut uow, game.id, "u1", 0, 100).await.unwrap();
        BettingEngine::transition(&mut uow, game.id, BettingStatus::Closed, None)
            .await
            .unwrap();
        BettingEngine::transition(&mut uow, game.id, BettingStatus::Done, Some(0))
            .await
            .unwrap();

        let grouped = Ledger::transactions(
            &mut uow,
            &TransactionQuery {
                grouping_id: Some(format!("Bet-{}", game.id)),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        // Stake debit + payout credit.
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped.iter().map(|t| t.amount).sum::<i64>(), 0);
    }
}
