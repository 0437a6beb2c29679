//! Leaderboard Cache
//!
//! Short-TTL key → (value, inserted_at) store in front of the aggregate read
//! APIs. Constructed once at startup and shared by `Arc`; the aggregation
//! engine calls [`LeaderboardCache::invalidate_all`] after every rebuild.

use crate::clock::Clock;
use crate::model::{Category, ToolId};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Leaderboard { category: Category, min_votes: i64 },
    Teaser,
    Matrix(Category),
    H2hPair(ToolId, ToolId),
    FeaturedMatchup,
}

/// A cache hit or a freshly computed value
#[derive(Debug, Clone, PartialEq)]
pub struct Cached {
    pub value: Value,
    /// Seconds since insertion; `None` when just computed
    pub age_secs: Option<i64>,
}

impl Cached {
    pub fn is_hit(&self) -> bool {
        self.age_secs.is_some()
    }
}

struct Entry {
    value: Value,
    inserted_at: i64,
}

pub struct LeaderboardCache {
    entries: Mutex<HashMap<CacheKey, Entry>>,
    /// Bumped under the entries lock by every `invalidate_all`
    generation: AtomicU64,
    ttl_secs: i64,
    featured_ttl_secs: i64,
    clock: Clock,
}

impl LeaderboardCache {
    pub fn new(ttl_secs: u64, featured_ttl_secs: u64, clock: Clock) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
            ttl_secs: ttl_secs as i64,
            featured_ttl_secs: featured_ttl_secs as i64,
            clock,
        }
    }

    // A panic mid-insert cannot leave an Entry half-written; keep serving.
    fn entries(&self) -> MutexGuard<'_, HashMap<CacheKey, Entry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ttl_for(&self, key: &CacheKey) -> i64 {
        match key {
            CacheKey::FeaturedMatchup => self.featured_ttl_secs,
            _ => self.ttl_secs,
        }
    }

    /// Value and its age in seconds, if present and fresh
    pub fn get(&self, key: &CacheKey) -> Option<(Value, i64)> {
        let now = (self.clock)();
        let ttl = self.ttl_for(key);
        let mut entries = self.entries();

        match entries.get(key) {
            Some(entry) if now - entry.inserted_at < ttl => {
                Some((entry.value.clone(), now - entry.inserted_at))
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: CacheKey, value: Value) {
        let inserted_at = (self.clock)();
        self.entries().insert(key, Entry { value, inserted_at });
    }

    /// Serve from cache or compute, store and return. The lock is not held
    /// while computing; a value computed across an invalidation is returned
    /// but not stored.
    pub fn get_or_compute<E>(
        &self,
        key: CacheKey,
        compute: impl FnOnce() -> Result<Value, E>,
    ) -> Result<Cached, E> {
        if let Some((value, age)) = self.get(&key) {
            return Ok(Cached {
                value,
                age_secs: Some(age),
            });
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let value = compute()?;
        {
            let mut entries = self.entries();
            if self.generation.load(Ordering::SeqCst) == generation {
                let inserted_at = (self.clock)();
                entries.insert(
                    key,
                    Entry {
                        value: value.clone(),
                        inserted_at,
                    },
                );
            }
        }
        Ok(Cached {
            value,
            age_secs: None,
        })
    }

    pub fn invalidate_all(&self) {
        let mut entries = self.entries();
        self.generation.fetch_add(1, Ordering::SeqCst);
        let n = entries.len();
        entries.clear();
        log::debug!("🧹 Leaderboard cache invalidated ({} entries)", n);
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
