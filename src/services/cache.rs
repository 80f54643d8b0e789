use std::{collections::HashMap, sync::Arc, time::Duration};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::{
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval},
};
use tracing::{debug, info};

pub const DEFAULT_TTL: Duration = Duration::from_millis(300_000);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_millis(60_000);

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub size: usize,
    pub keys: Vec<String>,
    pub memory_bytes: usize,
    pub memory_usage: String,
}

/// In-memory key/value store where every entry carries its own TTL.
///
/// Expired entries are never returned. They are dropped lazily when read and
/// eagerly by [`ExpiringCache::sweep`], which [`ExpiringCache::start_sweeper`]
/// runs on a fixed interval.
pub struct ExpiringCache<V> {
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
    default_ttl: Duration,
}

impl<V: Clone> ExpiringCache<V> {
    pub fn new() -> Self {
        Self::with_default_ttl(DEFAULT_TTL)
    }

    pub fn with_default_ttl(default_ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            default_ttl,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn set(&self, key: impl Into<String>, value: V) {
        self.set_with_ttl(key, value, self.default_ttl);
    }

    pub fn set_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.entries.lock().insert(key.into(), entry);
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                debug!(key, "Evicted expired cache entry on read");
                None
            }
            None => None,
        }
    }

    pub fn has(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => true,
            Some(_) => {
                entries.remove(key);
                false
            }
            None => false,
        }
    }

    /// Returns whether a live entry was removed.
    pub fn delete(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries
            .lock()
            .remove(key)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .values()
            .filter(|entry| !entry.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }
}

impl<V: Clone + Serialize> ExpiringCache<V> {
    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let entries = self.entries.lock();

        let mut keys = Vec::new();
        let mut memory_bytes = 0;

        for (key, entry) in entries.iter().filter(|(_, entry)| !entry.is_expired(now)) {
            memory_bytes += serialized_len(key) + serialized_len(&entry.value);
            keys.push(key.clone());
        }
        keys.sort();

        CacheStats {
            size: keys.len(),
            keys,
            memory_bytes,
            memory_usage: format!("{} KB", (memory_bytes as f64 / 1024.0).round() as u64),
        }
    }
}

impl<V: Clone + Send + 'static> ExpiringCache<V> {
    /// Spawns the periodic sweep. The task lives as long as the runtime.
    pub fn start_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let cache = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                ticker.tick().await;

                let removed = cache.sweep();
                if removed > 0 {
                    info!(removed, "Cache cleanup removed expired entries");
                }
            }
        })
    }
}

impl<V: Clone> Default for ExpiringCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

fn serialized_len<T: Serialize + ?Sized>(value: &T) -> usize {
    serde_json::to_string(value).map(|s| s.len()).unwrap_or(0)
}
