//! Background work: the periodic passive-income cycle and channel-point
//! redemption fulfillment.
//!
//! The reward cycle drains a snapshot of viewers seen since the last run
//! and credits each according to stream state and subscriber status. The
//! presence data itself comes through a trait so tests (and future chat
//! integrations) can supply their own source.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::RewardsConfig;
use crate::hub::Hub;
use crate::ledger::Ledger;
use crate::store::uow::UnitOfWork;
use crate::store::Database;
use crate::types::CreditReceipt;

/// Where the reward cycle learns who was watching.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PresenceSource: Send + Sync {
    /// Whether the stream is currently live.
    async fn stream_online(&self) -> anyhow::Result<bool>;

    /// Take the set of viewers seen since the last cycle, clearing it.
    async fn drain_present(&self) -> anyhow::Result<Vec<String>>;

    async fn is_subscriber(&self, user_twitch_id: &str) -> anyhow::Result<bool>;
}

#[derive(Debug, Default)]
struct PresenceState {
    online: bool,
    present: HashSet<String>,
    subscribers: HashSet<String>,
}

/// Presence tracked from API calls. The production source until the chat
/// bridge feeds this directly.
#[derive(Default)]
pub struct InMemoryPresence {
    state: RwLock<PresenceState>,
}

impl InMemoryPresence {
    pub async fn set_online(&self, online: bool) {
        self.state.write().await.online = online;
    }

    /// Record that a viewer was seen; they earn in the next cycle.
    pub async fn mark_present(&self, user_twitch_id: &str) {
        self.state
            .write()
            .await
            .present
            .insert(user_twitch_id.to_string());
    }

    pub async fn set_subscriber(&self, user_twitch_id: &str, subscribed: bool) {
        let mut state = self.state.write().await;
        if subscribed {
            state.subscribers.insert(user_twitch_id.to_string());
        } else {
            state.subscribers.remove(user_twitch_id);
        }
    }
}

#[async_trait]
impl PresenceSource for InMemoryPresence {
    async fn stream_online(&self) -> anyhow::Result<bool> {
        Ok(self.state.read().await.online)
    }

    async fn drain_present(&self) -> anyhow::Result<Vec<String>> {
        let mut state = self.state.write().await;
        Ok(std::mem::take(&mut state.present).into_iter().collect())
    }

    async fn is_subscriber(&self, user_twitch_id: &str) -> anyhow::Result<bool> {
        Ok(self.state.read().await.subscribers.contains(user_twitch_id))
    }
}

/// Outcome of one reward cycle.
#[derive(Debug)]
pub struct RewardRunSummary {
    pub run_id: String,
    pub rewarded: usize,
    pub total_awarded: i64,
}

/// Credit every viewer seen since the last cycle. All credits of one run
/// share a grouping id; with `tag_unique_ids` on they also carry unique
/// ids, so a replayed run cannot award twice.
pub async fn run_reward_cycle(
    db: &Database,
    hub: &Hub,
    rewards: &RewardsConfig,
    presence: &dyn PresenceSource,
) -> anyhow::Result<RewardRunSummary> {
    let run_id = Uuid::new_v4().to_string();
    let online = presence.stream_online().await?;
    let viewers = presence.drain_present().await?;

    let grouping = format!("Reward-{run_id}");
    let mut uow = UnitOfWork::begin(db.pool(), hub.clone()).await?;
    let mut rewarded = 0usize;
    let mut total_awarded = 0i64;

    for user_twitch_id in &viewers {
        let subscriber = presence.is_subscriber(user_twitch_id).await?;
        let amount = rewards.award(online, subscriber);
        if amount == 0 {
            continue;
        }
        let unique_id = rewards
            .tag_unique_ids
            .then(|| format!("reward:{run_id}:{user_twitch_id}"));
        let receipt = Ledger::credit(
            &mut uow,
            user_twitch_id,
            amount,
            "Automatically added",
            unique_id.as_deref(),
            Some(&grouping),
        )
        .await?;
        if receipt.is_some() {
            rewarded += 1;
            total_awarded += amount;
        }
    }
    uow.commit().await?;

    info!(run_id, online, rewarded, total_awarded, "Reward cycle complete");
    Ok(RewardRunSummary {
        run_id,
        rewarded,
        total_awarded,
    })
}

/// Credit a channel-point redemption. Keyed on the platform event id, so a
/// redelivered event returns `false` and moves no money.
pub async fn fulfill_redemption(
    db: &Database,
    hub: &Hub,
    event_id: &str,
    user_twitch_id: &str,
    login_name: &str,
    display_name: &str,
    amount: i64,
) -> crate::types::Result<Option<CreditReceipt>> {
    let mut uow = UnitOfWork::begin(db.pool(), hub.clone()).await?;
    Ledger::save_user(&mut uow, user_twitch_id, login_name, display_name).await?;
    let receipt = Ledger::credit(
        &mut uow,
        user_twitch_id,
        amount,
        "Channel points redeemed",
        Some(&format!("redemption:{event_id}")),
        None,
    )
    .await?;
    uow.commit().await?;

    info!(
        event_id,
        user_twitch_id,
        amount,
        applied = receipt.is_some(),
        "Redemption processed"
    );
    Ok(receipt)
}

/// Run reward cycles forever at the configured interval.
pub fn spawn_reward_loop(
    db: Database,
    hub: Hub,
    rewards: RewardsConfig,
    presence: Arc<InMemoryPresence>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(rewards.interval_secs.max(1)));
        // The first tick fires immediately; skip it so a restart doesn't
        // double up with the previous process's last cycle.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(err) = run_reward_cycle(&db, &hub, &rewards, presence.as_ref()).await {
                error!(error = %err, "Reward cycle failed");
            }
        }
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
