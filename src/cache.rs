use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use crate::error::CacheError;
use crate::models::Row;

// Cache entry with timestamp
#[derive(Clone, Debug)]
pub struct CacheEntry {
    pub sql: String,
    pub result: Option<Vec<Row>>,
    pub cached_at: Instant,
}

impl CacheEntry {
    pub fn new(sql: String, result: Option<Vec<Row>>) -> Self {
        Self {
            sql,
            result,
            cached_at: Instant::now(),
        }
    }
}

/// Store of previously generated answers, keyed by question.
pub trait QueryCache: Send + Sync {
    fn get(&self, question: &str) -> Option<CacheEntry>;
    fn put(&self, question: &str, entry: CacheEntry) -> Result<(), CacheError>;
    fn len(&self) -> usize;
    /// Out-of-band flush, returns how many entries were dropped.
    fn clear(&self) -> usize;
    /// Remove entries expired as of `now`, returns how many were dropped.
    fn purge_expired_at(&self, now: Instant) -> usize;
    fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now())
    }
    fn is_available(&self) -> bool {
        true
    }
}

// Collapse runs of whitespace, trim, lowercase
pub fn normalize_question(question: &str) -> String {
    question
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

// Create a cache key (hash of the question text)
pub fn make_cache_key(question: &str, normalize: bool) -> String {
    let mut hasher = Sha256::new();
    if normalize {
        hasher.update(normalize_question(question));
    } else {
        hasher.update(question);
    }
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CachePolicy {
    /// None keeps entries until flushed
    pub ttl: Option<Duration>,
    /// None means unbounded
    pub max_entries: Option<usize>,
    pub normalize: bool,
}

/// In-process cache backed by a concurrent map.
pub struct MemoryCache {
    entries: DashMap<String, CacheEntry>,
    policy: CachePolicy,
    // serializes evict + insert so the bound holds under concurrent puts
    insert_lock: Mutex<()>,
}

impl MemoryCache {
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            entries: DashMap::new(),
            policy,
            insert_lock: Mutex::new(()),
        }
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    fn is_expired(&self, entry: &CacheEntry, now: Instant) -> bool {
        self.policy
            .ttl
            .is_some_and(|ttl| now.saturating_duration_since(entry.cached_at) >= ttl)
    }

    pub fn get_at(&self, question: &str, now: Instant) -> Option<CacheEntry> {
        let key = make_cache_key(question, self.policy.normalize);
        if let Some(entry) = self.entries.get(&key) {
            if !self.is_expired(&entry, now) {
                return Some(entry.clone());
            }
        }
        // only removes if it is still expired, a concurrent put may have refreshed it
        self.entries
            .remove_if(&key, |_, entry| self.is_expired(entry, now));
        None
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|e| e.value().cached_at)
            .map(|e| e.key().clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }
}

impl QueryCache for MemoryCache {
    fn get(&self, question: &str) -> Option<CacheEntry> {
        self.get_at(question, Instant::now())
    }

    fn put(&self, question: &str, entry: CacheEntry) -> Result<(), CacheError> {
        let key = make_cache_key(question, self.policy.normalize);

        let Some(max) = self.policy.max_entries else {
            // last write wins
            self.entries.insert(key, entry);
            return Ok(());
        };
        if max == 0 {
            return Err(CacheError::Disabled);
        }

        // a poisoned lock guards no data, keep going
        let _guard = self.insert_lock.lock().unwrap_or_else(|e| e.into_inner());
        if !self.entries.contains_key(&key) {
            while self.entries.len() >= max {
                self.evict_oldest();
            }
        }
        self.entries.insert(key, entry);
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn clear(&self) -> usize {
        let n = self.entries.len();
        self.entries.clear();
        n
    }

    fn purge_expired_at(&self, now: Instant) -> usize {
        if self.policy.ttl.is_none() {
            return 0;
        }
        let before = self.entries.len();
        self.entries.retain(|_, entry| !self.is_expired(entry, now));
        before.saturating_sub(self.entries.len())
    }
}
