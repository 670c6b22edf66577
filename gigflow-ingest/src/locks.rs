//! Per-user serialization point
//!
//! Bookings are partitioned by user, so locks are too. Writers to one user's
//! booking set take the write side; conflict queries take the read side and
//! so always see a set that no write is halfway through.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

#[derive(Clone, Default)]
pub struct UserLocks {
    locks: Arc<Mutex<HashMap<String, Arc<RwLock<()>>>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    async fn lock_for(&self, user_id: &str) -> Arc<RwLock<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }

    /// Exclusive access to a user's booking set
    pub async fn write(&self, user_id: &str) -> OwnedRwLockWriteGuard<()> {
        self.lock_for(user_id).await.write_owned().await
    }

    /// Shared, consistent view of a user's booking set
    pub async fn read(&self, user_id: &str) -> OwnedRwLockReadGuard<()> {
        self.lock_for(user_id).await.read_owned().await
    }

    /// Number of users seen so far
    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }
}
