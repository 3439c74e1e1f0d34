//! # Key Locks
//!
//! Per-entity-key critical sections for the appender.
//!
//! ```text
//!   acquire("SKU-1") ─┐
//!   acquire("SKU-1") ─┼──► shard[h("SKU-1")] ──► Arc<Mutex<()>> ──► one holder at a time
//!   acquire("SKU-2") ─┴──► shard[h("SKU-2")] ──► Arc<Mutex<()>> ──► independent
//! ```
//!
//! Each shard maps a key to a `Weak` handle of its async mutex. Holders and
//! waiters keep the mutex alive through their `Arc`; once the last one is
//! gone the entry is dead and gets pruned, so the map only tracks keys that
//! are in use. Waiting is FIFO (tokio's mutex is fair), which makes the
//! grant order the order in which a key's entries are written.

use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::hash::BuildHasher;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::trace;

/// Default number of shards.
pub const DEFAULT_LOCK_SHARDS: usize = 16;

/// Dead entries are swept once a shard grows past this many keys.
const MIN_PRUNE_THRESHOLD: usize = 64;

#[derive(Debug)]
struct Shard {
    keys: HashMap<String, Weak<AsyncMutex<()>>>,
    prune_at: usize,
}

impl Shard {
    fn new() -> Self {
        Shard {
            keys: HashMap::new(),
            prune_at: MIN_PRUNE_THRESHOLD,
        }
    }

    /// Returns the live mutex for `key`, creating it if needed.
    fn mutex_for(&mut self, key: &str) -> Arc<AsyncMutex<()>> {
        if let Some(existing) = self.keys.get(key).and_then(Weak::upgrade) {
            return existing;
        }

        let mutex = Arc::new(AsyncMutex::new(()));
        self.keys.insert(key.to_string(), Arc::downgrade(&mutex));

        if self.keys.len() >= self.prune_at {
            self.keys.retain(|_, handle| handle.strong_count() > 0);
            self.prune_at = (self.keys.len() * 2).max(MIN_PRUNE_THRESHOLD);
        }

        mutex
    }
}

/// Sharded map of per-key async mutexes.
#[derive(Debug)]
pub struct KeyLocks {
    shards: Box<[Mutex<Shard>]>,
    hasher: RandomState,
}

/// Exclusive hold on one entity key. Released on drop.
#[derive(Debug)]
pub struct KeyGuard {
    key: String,
    _guard: OwnedMutexGuard<()>,
}

impl KeyGuard {
    /// The key this guard holds.
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Default for KeyLocks {
    fn default() -> Self {
        KeyLocks::new(DEFAULT_LOCK_SHARDS)
    }
}

impl KeyLocks {
    /// Creates a lock table with `shards` shards (at least one).
    pub fn new(shards: usize) -> Self {
        let shards = (0..shards.max(1))
            .map(|_| Mutex::new(Shard::new()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        KeyLocks {
            shards,
            hasher: RandomState::new(),
        }
    }

    /// Waits until `key` is free and takes it.
    ///
    /// Cancel-safe: dropping the future while waiting leaves no trace, and
    /// dropping the returned guard releases the key.
    pub async fn acquire(&self, key: &str) -> KeyGuard {
        let mutex = {
            let mut shard = self.shard(key).lock().unwrap_or_else(PoisonError::into_inner);
            shard.mutex_for(key)
        };

        let guard = mutex.lock_owned().await;
        trace!(entity_key = %key, "Key lock acquired");

        KeyGuard {
            key: key.to_string(),
            _guard: guard,
        }
    }

    /// Number of keys currently tracked with a live holder or waiter.
    pub fn active_keys(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| {
                shard
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .keys
                    .values()
                    .filter(|handle| handle.strong_count() > 0)
                    .count()
            })
            .sum()
    }

    /// Number of shards.
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    fn shard(&self, key: &str) -> &Mutex<Shard> {
        let index = (self.hasher.hash_one(key) % self.shards.len() as u64) as usize;
        &self.shards[index]
    }
}
