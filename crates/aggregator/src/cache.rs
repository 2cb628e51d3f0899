//! TTL cache for aggregated contexts.
//!
//! Keys are `(subject, query hash, conversation)`. Entries are immutable
//! `Arc`s with an expiry instant. Expiry is checked lazily: a read drops a
//! stale entry for its key, and every write prunes all stale entries, so
//! there is no background sweeper. Writes replace whatever was there.

use async_trait::async_trait;
use medctx_core::context::AggregatedContext;
use medctx_core::error::CacheError;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Stand-in for a missing conversation id.
pub const NO_CONVERSATION: &str = "-";

/// Cache key for one aggregation request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub subject_id: String,
    /// SHA-256 hex digest of the normalized query.
    pub query_hash: String,
    pub conversation_id: String,
}

impl CacheKey {
    pub fn new(subject_id: &str, query: &str, conversation_id: Option<&str>) -> Self {
        Self {
            subject_id: subject_id.to_string(),
            query_hash: hash_query(query),
            conversation_id: conversation_id.unwrap_or(NO_CONVERSATION).to_string(),
        }
    }
}

/// Lowercase and collapse whitespace so trivially different spellings of
/// the same query share an entry.
pub fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

fn hash_query(query: &str) -> String {
    format!("{:x}", Sha256::digest(normalize_query(query).as_bytes()))
}

/// A cached aggregate and the instant after which it is stale.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: Arc<AggregatedContext>,
    pub expires_at: Instant,
}

impl CacheEntry {
    pub fn is_live(&self, now: Instant) -> bool {
        now <= self.expires_at
    }
}

/// Hit/miss counters and current size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub hit_rate: f64,
}

/// Storage seam for aggregated contexts.
///
/// Errors are reported, never fatal: the aggregator treats a failed read as
/// a miss and a failed write as skipped.
#[async_trait]
pub trait ContextCache: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<Arc<AggregatedContext>>, CacheError>;

    async fn put(
        &self,
        key: CacheKey,
        value: Arc<AggregatedContext>,
        ttl: Duration,
    ) -> Result<(), CacheError>;

    /// Remove one entry. Returns whether a live entry was removed.
    async fn invalidate(&self, key: &CacheKey) -> Result<bool, CacheError>;

    async fn clear(&self) -> Result<(), CacheError>;

    fn stats(&self) -> CacheStats;
}

/// Process-local cache backed by a `HashMap` behind a std `Mutex`.
///
/// The lock is never held across an `.await`.
#[derive(Default)]
pub struct InMemoryContextCache {
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl InMemoryContextCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<CacheKey, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ContextCache for InMemoryContextCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<Arc<AggregatedContext>>, CacheError> {
        let now = Instant::now();
        let mut entries = self.lock();
        let lookup = entries
            .get(key)
            .map(|e| (e.is_live(now), Arc::clone(&e.value)));
        let found = match lookup {
            Some((true, value)) => Some(value),
            Some((false, _)) => {
                entries.remove(key);
                None
            }
            None => None,
        };
        drop(entries);

        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(found)
    }

    async fn put(
        &self,
        key: CacheKey,
        value: Arc<AggregatedContext>,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let now = Instant::now();
        let mut entries = self.lock();
        // Drop every stale entry, not just this key.
        entries.retain(|_, e| e.is_live(now));
        entries.insert(
            key,
            CacheEntry {
                value,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn invalidate(&self, key: &CacheKey) -> Result<bool, CacheError> {
        let now = Instant::now();
        Ok(self.lock().remove(key).is_some_and(|e| e.is_live(now)))
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.lock().clear();
        Ok(())
    }

    fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let entries = self.lock().values().filter(|e| e.is_live(now)).count();
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            hits,
            misses,
            entries,
            hit_rate: if total > 0 {
                hits as f64 / total as f64
            } else {
                0.0
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(subject: &str) -> Arc<AggregatedContext> {
        Arc::new(AggregatedContext::empty(subject, None, 2000))
    }

    #[test]
    fn query_normalization() {
        assert_eq!(normalize_query("  Chest\tPAIN \n again "), "chest pain again");
        let a = CacheKey::new("p1", "Chest  pain", None);
        let b = CacheKey::new("p1", "chest pain", None);
        assert_eq!(a, b);
        assert_eq!(a.conversation_id, NO_CONVERSATION);
        assert_eq!(a.query_hash.len(), 64);
    }

    #[test]
    fn conversation_and_subject_distinguish_keys() {
        let base = CacheKey::new("p1", "q", None);
        assert_ne!(base, CacheKey::new("p1", "q", Some("c1")));
        assert_ne!(base, CacheKey::new("p2", "q", None));
    }

    #[tokio::test]
    async fn hit_and_miss_counted() {
        let cache = InMemoryContextCache::new();
        let key = CacheKey::new("p1", "q", None);
        assert!(cache.get(&key).await.unwrap().is_none());

        let value = ctx("p1");
        cache
            .put(key.clone(), Arc::clone(&value), Duration::from_secs(60))
            .await
            .unwrap();
        let hit = cache.get(&key).await.unwrap().unwrap();
        assert!(Arc::ptr_eq(&hit, &value));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.hit_rate, 0.5);
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_lazily() {
        let cache = InMemoryContextCache::new();
        let key = CacheKey::new("p1", "q", None);
        cache
            .put(key.clone(), ctx("p1"), Duration::from_secs(300))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(300)).await;
        assert!(cache.get(&key).await.unwrap().is_some());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(cache.get(&key).await.unwrap().is_none());
        assert_eq!(cache.stats().entries, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn writes_prune_expired_entries() {
        let cache = InMemoryContextCache::new();
        for i in 0..1000 {
            let key = CacheKey::new("p1", &format!("query {i}"), None);
            cache.put(key, ctx("p1"), Duration::from_secs(300)).await.unwrap();
            tokio::time::advance(Duration::from_secs(301)).await;
        }
        assert_eq!(cache.lock().len(), 1);
        assert_eq!(cache.stats().entries, 0);

        let live = CacheKey::new("p1", "still fresh", None);
        cache.put(live.clone(), ctx("p1"), Duration::from_secs(300)).await.unwrap();
        assert_eq!(cache.lock().len(), 1);
        assert!(cache.get(&live).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn put_replaces() {
        let cache = InMemoryContextCache::new();
        let key = CacheKey::new("p1", "q", None);
        cache.put(key.clone(), ctx("first"), Duration::from_secs(60)).await.unwrap();
        cache.put(key.clone(), ctx("second"), Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap().unwrap().subject_id, "second");
        assert_eq!(cache.stats().entries, 1);
    }

    #[tokio::test]
    async fn invalidate_and_clear() {
        let cache = InMemoryContextCache::new();
        let a = CacheKey::new("p1", "a", None);
        let b = CacheKey::new("p1", "b", None);
        cache.put(a.clone(), ctx("p1"), Duration::from_secs(60)).await.unwrap();
        cache.put(b.clone(), ctx("p1"), Duration::from_secs(60)).await.unwrap();

        assert!(cache.invalidate(&a).await.unwrap());
        assert!(!cache.invalidate(&a).await.unwrap());
        assert!(cache.get(&a).await.unwrap().is_none());

        cache.clear().await.unwrap();
        assert!(cache.get(&b).await.unwrap().is_none());
        assert_eq!(cache.stats().entries, 0);
    }
}
