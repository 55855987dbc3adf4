use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::clock::{Clock, SystemClock};

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            ttl: Duration::from_secs(60 * 60),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

#[derive(Debug)]
struct Entry<V> {
    value: V,
    inserted_at: Instant,
    seq: u64,
}

#[derive(Debug)]
struct Inner<V> {
    entries: HashMap<String, Entry<V>>,
    /// Keys in insertion order, tagged with the insert sequence number. May
    /// hold keys already removed by `get` or `sweep`, or re-inserted since;
    /// those are skipped when evicting.
    order: VecDeque<(String, u64)>,
    next_seq: u64,
    stats: CacheStats,
}

impl<V> Inner<V> {
    fn evict_oldest(&mut self) -> Option<String> {
        while let Some((key, seq)) = self.order.pop_front() {
            if self.entries.get(&key).is_some_and(|e| e.seq == seq) {
                self.entries.remove(&key);
                self.stats.evictions += 1;
                return Some(key);
            }
        }
        None
    }

    fn compact_order(&mut self) {
        let entries = &self.entries;
        self.order
            .retain(|(k, seq)| entries.get(k).is_some_and(|e| e.seq == *seq));
    }
}

#[derive(Debug)]
pub struct ResultCache<V> {
    inner: Mutex<Inner<V>>,
    config: CacheConfig,
    clock: Arc<dyn Clock>,
}

impl<V: Clone> ResultCache<V> {
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: VecDeque::new(),
                next_seq: 0,
                stats: CacheStats::default(),
            }),
            config,
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_expired(&self, inserted_at: Instant, now: Instant) -> bool {
        now.saturating_duration_since(inserted_at) >= self.config.ttl
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let mut inner = self.lock();

        let expired = inner
            .entries
            .get(key)
            .map(|entry| self.is_expired(entry.inserted_at, now));

        match expired {
            None => {
                inner.stats.misses += 1;
                None
            }
            Some(true) => {
                inner.entries.remove(key);
                inner.stats.expirations += 1;
                inner.stats.misses += 1;
                None
            }
            Some(false) => {
                inner.stats.hits += 1;
                inner.entries.get(key).map(|e| e.value.clone())
            }
        }
    }

    /// Insert or overwrite `key`. A new key evicts the oldest-inserted entry
    /// when the cache is full.
    pub fn set(&self, key: impl Into<String>, value: V) {
        let key = key.into();
        let now = self.clock.now();
        let mut inner = self.lock();

        if let Some(entry) = inner.entries.get_mut(&key) {
            entry.value = value;
            entry.inserted_at = now;
            return;
        }

        if self.config.max_entries == 0 {
            return;
        }

        while inner.entries.len() >= self.config.max_entries {
            match inner.evict_oldest() {
                Some(evicted) => tracing::debug!("Cache full, evicted {}", evicted),
                None => break,
            }
        }

        // Keys dropped by get/sweep leave holes in the order queue.
        if inner.order.len() > self.config.max_entries.saturating_mul(2) {
            inner.compact_order();
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.order.push_back((key.clone(), seq));
        inner.entries.insert(
            key,
            Entry {
                value,
                inserted_at: now,
                seq,
            },
        );
    }

    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut inner = self.lock();

        let stale: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, entry)| self.is_expired(entry.inserted_at, now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &stale {
            inner.entries.remove(key);
        }
        inner.stats.expirations += stale.len() as u64;
        if !stale.is_empty() {
            inner.compact_order();
        }

        stale.len()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}
