//! In-process keyed locks.
//!
//! Lock entries are created on first use and dropped again once the last
//! guard for a key goes away, so the table only holds keys that are in use.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

type LockTable = DashMap<String, Arc<RwLock<()>>>;

/// A table of read/write locks indexed by string key.
///
/// Different keys never contend with each other.
#[derive(Clone, Default)]
pub struct KeyedLocks {
    table: Arc<LockTable>,
}

enum Held {
    Read(#[allow(dead_code)] OwnedRwLockReadGuard<()>),
    Write(#[allow(dead_code)] OwnedRwLockWriteGuard<()>),
}

/// A held lock on one key. Released on drop.
pub struct KeyGuard {
    key: String,
    table: Arc<LockTable>,
    held: Option<Held>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, key: &str) -> Arc<RwLock<()>> {
        self.table
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }

    /// Take the key shared.
    pub async fn read(&self, key: &str) -> KeyGuard {
        let guard = self.lock_for(key).read_owned().await;
        KeyGuard {
            key: key.to_string(),
            table: self.table.clone(),
            held: Some(Held::Read(guard)),
        }
    }

    /// Take the key exclusively.
    pub async fn write(&self, key: &str) -> KeyGuard {
        let guard = self.lock_for(key).write_owned().await;
        KeyGuard {
            key: key.to_string(),
            table: self.table.clone(),
            held: Some(Held::Write(guard)),
        }
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl KeyGuard {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_exclusive(&self) -> bool {
        matches!(self.held, Some(Held::Write(_)))
    }
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        // Release the lock before deciding whether anyone else still holds the entry.
        self.held.take();
        self.table
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}
