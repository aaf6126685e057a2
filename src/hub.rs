//! Post-commit notification fan-out.
//!
//! Units of work queue notifications while a request runs; they reach the
//! hub only after the transaction commits, and never on rollback. Delivery
//! to clients (WebSocket bridge, chat bot) subscribes here and is out of
//! scope for this crate.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::types::{BettingGame, Wager};

/// An event produced by a committed unit of work.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// A user's balance changed. Scoped to that user.
    CurrencyUpdated {
        user_twitch_id: String,
        transaction_id: i64,
        balance: i64,
    },
    /// A betting round changed state. Scoped to all clients.
    BetStatusChanged { game: BettingGame },
    /// A single wager changed. Scoped to its user.
    BetChanged {
        user_twitch_id: String,
        wager: Wager,
    },
}

/// Broadcast hub. Cheap to clone; all clones share one channel.
#[derive(Clone)]
pub struct Hub {
    sender: broadcast::Sender<Notification>,
}

impl Hub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    /// Publish to all current subscribers. Having no subscribers is not an
    /// error; notifications are fire-and-forget.
    pub fn publish(&self, notification: Notification) {
        let _ = self.sender.send(notification);
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(256)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
