//! Persisted query cache.
//!
//! Maps a fingerprint to its compiled selection. Two tiers: a bounded
//! in-process map and an optional durable key/value store with a TTL,
//! consulted when the in-process tier misses.
//!
//! Writers (stores, durable promotions, capacity resets) are serialized by a
//! single async lock. Readers never take it: entries are handed out as
//! `Arc<Selection>`, so a reset only drops the tier's reference and a reader
//! holding the tree keeps it alive.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::ast::Selection;
use crate::config::ApiqlConfig;
use crate::error::{ApiqlError, ApiqlResult};
use crate::parser::compile;

/// External key/value store with per-key expiry.
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn get(&self, key: &str) -> ApiqlResult<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> ApiqlResult<()>;
}

/// In-process durable store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, (Vec<u8>, Instant)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn get(&self, key: &str) -> ApiqlResult<Option<Vec<u8>>> {
        let Some(entry) = self.entries.get(key) else {
            return Ok(None);
        };
        if entry.1 > Instant::now() {
            return Ok(Some(entry.0.clone()));
        }
        // Expired
        drop(entry);
        self.entries.remove(key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> ApiqlResult<()> {
        self.entries
            .insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }
}

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub capacity: usize,
    pub ttl: Duration,
    pub key_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::from(&ApiqlConfig::default())
    }
}

impl From<&ApiqlConfig> for CacheConfig {
    fn from(config: &ApiqlConfig) -> Self {
        Self {
            capacity: config.cache_capacity,
            ttl: config.durable_ttl(),
            key_prefix: config.cache_key_prefix.clone(),
        }
    }
}

/// Two-tier fingerprint → selection cache.
pub struct PersistedQueryCache {
    local: DashMap<String, Arc<Selection>>,
    durable: Option<Arc<dyn DurableStore>>,
    writer: Mutex<()>,
    config: CacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
    resets: AtomicU64,
}

impl PersistedQueryCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            local: DashMap::with_capacity(config.capacity.max(1)),
            durable: None,
            writer: Mutex::new(()),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            resets: AtomicU64::new(0),
        }
    }

    pub fn with_durable(mut self, store: Arc<dyn DurableStore>) -> Self {
        self.durable = Some(store);
        self
    }

    fn durable_key(&self, fingerprint: &str) -> String {
        format!("{}{}", self.config.key_prefix, fingerprint)
    }

    /// Compile `raw` and write it to both tiers under `fingerprint`.
    ///
    /// Replaces any tree already stored under the fingerprint. A schema that
    /// fails to compile is not cached.
    pub async fn store(&self, fingerprint: &str, raw: &str) -> ApiqlResult<Arc<Selection>> {
        let _guard = self.writer.lock().await;

        let selection = Arc::new(compile(raw)?);
        self.insert_local(fingerprint, Arc::clone(&selection));
        tracing::trace!(fingerprint, "query cache insert");

        if let Some(durable) = &self.durable {
            let bytes = serde_json::to_vec(selection.as_ref())?;
            if let Err(e) = durable
                .set(&self.durable_key(fingerprint), bytes, self.config.ttl)
                .await
            {
                tracing::warn!(fingerprint, error = %e, "durable query cache write failed");
            }
        }

        Ok(selection)
    }

    /// Look a fingerprint up in the in-process tier, then the durable one.
    ///
    /// A durable hit is promoted into the in-process tier. Fails with
    /// [`ApiqlError::CacheMiss`] when neither tier knows the fingerprint.
    pub async fn resolve(&self, fingerprint: &str) -> ApiqlResult<Arc<Selection>> {
        if let Some(selection) = self.local_get(fingerprint) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(fingerprint, "query cache hit");
            return Ok(selection);
        }

        if let Some(selection) = self.durable_get(fingerprint).await {
            let _guard = self.writer.lock().await;
            // A store may have landed while we were reading the durable tier.
            let selection = match self.local_get(fingerprint) {
                Some(current) => current,
                None => {
                    let selection = Arc::new(selection);
                    self.insert_local(fingerprint, Arc::clone(&selection));
                    selection
                }
            };
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(fingerprint, "query cache hit (durable)");
            return Ok(selection);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(fingerprint, "query cache miss");
        Err(ApiqlError::CacheMiss(fingerprint.to_string()))
    }

    fn local_get(&self, fingerprint: &str) -> Option<Arc<Selection>> {
        self.local.get(fingerprint).map(|entry| Arc::clone(entry.value()))
    }

    /// Durable-tier read. Store failures and undecodable entries count as a
    /// miss.
    async fn durable_get(&self, fingerprint: &str) -> Option<Selection> {
        let durable = self.durable.as_ref()?;
        let bytes = match durable.get(&self.durable_key(fingerprint)).await {
            Ok(bytes) => bytes?,
            Err(e) => {
                tracing::warn!(fingerprint, error = %e, "durable query cache read failed");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(selection) => Some(selection),
            Err(e) => {
                tracing::warn!(fingerprint, error = %e, "discarding undecodable durable entry");
                None
            }
        }
    }

    /// Must be called with the writer lock held.
    fn insert_local(&self, fingerprint: &str, selection: Arc<Selection>) {
        let capacity = self.config.capacity.max(1);
        if !self.local.contains_key(fingerprint) && self.local.len() >= capacity {
            tracing::debug!("Query cache full at {} entries, resetting", self.local.len());
            self.local.clear();
            self.resets.fetch_add(1, Ordering::Relaxed);
        }
        self.local.insert(fingerprint.to_string(), selection);
    }

    /// Entries in the in-process tier.
    pub fn len(&self) -> usize {
        self.local.len()
    }

    pub fn is_empty(&self) -> bool {
        self.local.is_empty()
    }

    /// Drop the in-process tier. The durable tier is untouched.
    pub async fn clear(&self) {
        let _guard = self.writer.lock().await;
        self.local.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.local.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            resets: self.resets.load(Ordering::Relaxed),
        }
    }
}

impl Default for PersistedQueryCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub resets: u64,
}

impl CacheStats {
    /// Hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::fingerprint;

    fn small(capacity: usize) -> PersistedQueryCache {
        PersistedQueryCache::new(CacheConfig {
            capacity,
            ..CacheConfig::default()
        })
    }

    struct Broken;

    #[async_trait]
    impl DurableStore for Broken {
        async fn get(&self, _key: &str) -> ApiqlResult<Option<Vec<u8>>> {
            Err(ApiqlError::Store("connection refused".into()))
        }

        async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> ApiqlResult<()> {
            Err(ApiqlError::Store("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn test_miss_then_store_then_hit() {
        let cache = PersistedQueryCache::default();
        assert!(matches!(
            cache.resolve("deadbeef").await,
            Err(ApiqlError::CacheMiss(ref fp)) if fp == "deadbeef"
        ));

        let stored = cache.store("deadbeef", "ping").await.unwrap();
        let resolved = cache.resolve("deadbeef").await.unwrap();
        assert_eq!(stored, resolved);
        assert_eq!(resolved.len(), 1);

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
        assert_eq!(stats.hit_rate(), 50.0);
    }

    #[tokio::test]
    async fn test_store_overwrites() {
        let cache = PersistedQueryCache::default();
        cache.store("fp", "a b").await.unwrap();
        cache.store("fp", "c").await.unwrap();
        let tree = cache.resolve("fp").await.unwrap();
        assert!(tree.get("c").is_some());
        assert!(tree.get("a").is_none());
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_parse_error_is_not_cached() {
        let cache = PersistedQueryCache::default();
        assert!(matches!(cache.store("fp", "user {").await, Err(ApiqlError::Parse { .. })));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_bounded_size() {
        let cache = small(8);
        for i in 0..100 {
            let schema = format!("field{}", i);
            cache.store(&fingerprint(&schema), &schema).await.unwrap();
            assert!(cache.len() <= 8);
        }
        assert!(cache.stats().resets > 0);
        // the most recent store always survives
        assert!(cache.resolve(&fingerprint("field99")).await.is_ok());
    }

    #[tokio::test]
    async fn test_durable_tier_refills_local() {
        let store = Arc::new(MemoryStore::new());
        let first = PersistedQueryCache::default().with_durable(store.clone());
        first.store("42", "user { id }").await.unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.get("apiql-cache-42").await.unwrap().is_some());

        // a fresh process sharing the durable tier
        let second = PersistedQueryCache::default().with_durable(store);
        assert!(second.is_empty());
        let tree = second.resolve("42").await.unwrap();
        assert!(tree.get("user").is_some());
        assert_eq!(second.len(), 1);
    }

    #[tokio::test]
    async fn test_durable_failures_degrade_to_local() {
        let cache = PersistedQueryCache::default().with_durable(Arc::new(Broken));
        assert!(cache.store("fp", "ping").await.is_ok());
        assert!(cache.resolve("fp").await.is_ok());
        assert!(matches!(cache.resolve("other").await, Err(ApiqlError::CacheMiss(_))));
    }

    #[tokio::test]
    async fn test_memory_store_expiry() {
        let store = MemoryStore::new();
        store.set("k", b"v".to_vec(), Duration::ZERO).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.is_empty());

        store.set("k", b"v".to_vec(), Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn test_concurrent_stores_of_same_fingerprint() {
        let cache = Arc::new(PersistedQueryCache::default());
        let mut tasks = Vec::new();
        for _ in 0..16 {
            let cache = Arc::clone(&cache);
            tasks.push(tokio::spawn(async move {
                cache.store("same", "user { id name }").await.unwrap()
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(cache.len(), 1);
        let tree = cache.resolve("same").await.unwrap();
        assert_eq!(tree.get("user").and_then(|c| c.subselection()).map(Selection::len), Some(2));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_resets_keep_promoted_trees() {
        let store = Arc::new(MemoryStore::new());
        let seeder = PersistedQueryCache::default().with_durable(store.clone());
        for i in 0..20 {
            let schema = format!("seed{} {{ id }}", i);
            seeder.store(&fingerprint(&schema), &schema).await.unwrap();
        }

        // every promotion and store overflows the tier
        let cache = Arc::new(small(2).with_durable(store));
        let mut tasks = Vec::new();
        for round in 0..4 {
            for i in 0..20 {
                let reader = Arc::clone(&cache);
                tasks.push(tokio::spawn(async move {
                    let name = format!("seed{}", i);
                    let schema = format!("{} {{ id }}", name);
                    let tree = reader.resolve(&fingerprint(&schema)).await.unwrap();
                    assert!(tree.get(&name).is_some());
                }));
                let writer = Arc::clone(&cache);
                tasks.push(tokio::spawn(async move {
                    let schema = format!("fresh{}x{}", round, i);
                    let tree = writer.store(&fingerprint(&schema), &schema).await.unwrap();
                    assert!(tree.get(&schema).is_some());
                }));
            }
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert!(cache.len() <= 2);
        assert!(cache.stats().resets > 0);
        assert_eq!(cache.stats().misses, 0);
    }
}
