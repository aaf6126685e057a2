//! Unit of work: one database transaction per request plus the deferred
//! notifications that become visible only if that transaction commits.
//!
//! Every mutation in a request runs on the same transaction. On commit the
//! queued notifications are published to the hub, strictly afterwards; on
//! rollback (explicit or by drop) they are discarded along with the writes.

use sqlx::sqlite::SqlitePool;
use sqlx::{Sqlite, SqliteConnection, Transaction};

use crate::hub::{Hub, Notification};
use crate::types::Result;

pub struct UnitOfWork {
    tx: Transaction<'static, Sqlite>,
    hub: Hub,
    pending: Vec<Notification>,
}

impl UnitOfWork {
    pub async fn begin(pool: &SqlitePool, hub: Hub) -> Result<Self> {
        Ok(Self {
            tx: pool.begin().await?,
            hub,
            pending: Vec::new(),
        })
    }

    /// The transaction connection; every query of the request runs on it.
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }

    /// Queue a notification for publication after a successful commit.
    pub fn on_commit(&mut self, notification: Notification) {
        self.pending.push(notification);
    }

    /// Commit the transaction, then publish the queued notifications.
    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        for notification in self.pending {
            self.hub.publish(notification);
        }
        Ok(())
    }

    /// Roll back, discarding writes and queued notifications. Dropping the
    /// unit of work has the same effect; the explicit form reads better at
    /// call sites that bail out on purpose.
    pub async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
