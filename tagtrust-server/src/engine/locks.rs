//! Per-user serialization of reputation updates
//!
//! Every engine operation that appends a reputation event for a user holds
//! that user's lock for the whole unit of work. An operation takes at most
//! one user lock, and takes it before opening its transaction.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Idle entries are pruned once the map grows past this size
const PRUNE_THRESHOLD: usize = 1024;

#[derive(Default)]
pub struct UserLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `user_id`'s reputation
    pub async fn lock(&self, user_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            if map.len() > PRUNE_THRESHOLD {
                map.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            map.entry(user_id.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }
}
