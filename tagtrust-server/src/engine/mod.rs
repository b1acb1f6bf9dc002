//! The tagging and moderation engine
//!
//! `Engine` owns the pool, the per-user locks and the event bus. Each public
//! operation is one unit of work: validate, take the affected user's lock,
//! then run a transaction (retried on SQLite lock contention) that updates
//! the tag rows, folds the reputation event into the user's record and
//! appends the event. Live events go out only after commit.

mod entities;
mod locks;
mod moderation;
mod reconcile;
mod reputation;
mod tagging;
mod voting;

pub use entities::{EntityLookup, EntitySuggestion, PROMOTION_THRESHOLD};
pub use locks::UserLocks;
pub use moderation::{BatchItem, BatchOutcome, QueueEntry, QueuePage};
pub use reconcile::{spawn_reconciliation_job, ReconcileReport, TagDrift, UserDrift};
pub use reputation::ReputationView;
pub use tagging::{NewTag, Viewer, Withdrawal};
pub use voting::VoteOutcome;

use std::sync::Arc;

use sqlx::SqlitePool;
use tagtrust_common::config::ModerationConfig;
use tagtrust_common::events::{EventBus, TagTrustEvent};

/// `decided_by` recorded on tags approved by the auto-approval policy
pub const AUTO_APPROVAL_ACTOR: &str = "auto-approval-policy";

/// Largest accepted batch approval
pub const MAX_BATCH_SIZE: usize = 500;

/// Engine tuning taken from `[moderation]` config
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub max_lock_wait_ms: u64,
    pub page_size: i64,
}

impl From<&ModerationConfig> for EngineSettings {
    fn from(config: &ModerationConfig) -> Self {
        Self {
            max_lock_wait_ms: config.max_lock_wait_ms,
            page_size: config.page_size,
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&ModerationConfig::default())
    }
}

#[derive(Clone)]
pub struct Engine {
    db: SqlitePool,
    locks: Arc<UserLocks>,
    event_bus: EventBus,
    settings: EngineSettings,
}

impl Engine {
    pub fn new(db: SqlitePool, event_bus: EventBus, settings: EngineSettings) -> Self {
        Self {
            db,
            locks: Arc::new(UserLocks::new()),
            event_bus,
            settings,
        }
    }

    pub fn db(&self) -> &SqlitePool {
        &self.db
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Emit events collected by a committed unit of work
    fn publish(&self, events: Vec<TagTrustEvent>) {
        for event in events {
            self.event_bus.emit_lossy(event);
        }
    }
}
