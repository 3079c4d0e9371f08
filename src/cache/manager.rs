//! Registry of cache entries keyed by (source, ref)

use crate::cache::entry::{CacheEntry, CacheStatus, LoopSettings};
use crate::cache::{CacheKey, Producer};
use crate::error::{QuillError, QuillResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

/// Owns every cache entry and the producer their background loops use
pub struct CacheManager<T> {
    entries: Mutex<HashMap<CacheKey, Arc<CacheEntry<T>>>>,
    producer: Arc<dyn Producer<T>>,
    settings: LoopSettings,
}

impl<T: Send + Sync + 'static> CacheManager<T> {
    pub fn new(producer: Arc<dyn Producer<T>>, settings: LoopSettings) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            producer,
            settings,
        }
    }

    /// Entry for `key`, created on first access
    pub fn get(&self, key: &CacheKey) -> Arc<CacheEntry<T>> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(entries.entry(key.clone()).or_insert_with(|| {
            debug!("Creating cache entry for {}", key);
            Arc::new(CacheEntry::new(key.clone(), self.settings))
        }))
    }

    /// Entry for `key` if it has been accessed before
    pub fn lookup(&self, key: &CacheKey) -> QuillResult<Arc<CacheEntry<T>>> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
            .ok_or_else(|| QuillError::CacheEntryNotFound(key.to_string()))
    }

    pub fn read(&self, key: &CacheKey) -> Option<Arc<T>> {
        self.get(key).read()
    }

    /// Store a payload and make sure the entry's background loop runs
    pub async fn write(&self, key: &CacheKey, payload: T) -> Arc<T> {
        let entry = self.get(key);
        let payload = entry.store(payload);
        entry.ensure_loop(Arc::clone(&self.producer)).await;
        payload
    }

    /// Produce a fresh payload now.
    ///
    /// The producer runs without any lock held. On failure the previous
    /// payload stays in place and the error is returned wrapped with the key.
    pub async fn manual_refresh(
        &self,
        key: &CacheKey,
        producer: &dyn Producer<T>,
    ) -> QuillResult<Arc<T>> {
        let entry = self.get(key);

        let payload = producer
            .produce(key)
            .await
            .map_err(|e| QuillError::RefreshFailed {
                key: key.to_string(),
                source: Box::new(e),
            })?;

        let payload = entry.store(payload);
        entry.ensure_loop(Arc::clone(&self.producer)).await;
        info!("Cache manually refreshed for {}", key);
        Ok(payload)
    }

    /// Manual refresh using the manager's own producer
    pub async fn refresh(&self, key: &CacheKey) -> QuillResult<Arc<T>> {
        let producer = Arc::clone(&self.producer);
        self.manual_refresh(key, producer.as_ref()).await
    }

    /// Cached payload for `key`, refreshing through the manager's producer on a miss
    pub async fn get_or_refresh(&self, key: &CacheKey) -> QuillResult<Arc<T>> {
        if let Some(payload) = self.read(key) {
            debug!("Cache hit for {}", key);
            return Ok(payload);
        }
        self.refresh(key).await
    }

    pub async fn status(&self, key: &CacheKey) -> CacheStatus {
        self.get(key).status().await
    }

    /// Status of every known entry, ordered by key
    pub async fn all_status(&self) -> Vec<CacheStatus> {
        let mut entries: Vec<_> = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.key().cmp(b.key()));

        let mut statuses = Vec::with_capacity(entries.len());
        for entry in entries {
            statuses.push(entry.status().await);
        }
        statuses
    }

    /// Stop the background loop of one entry
    pub async fn stop(&self, key: &CacheKey) -> QuillResult<()> {
        self.lookup(key)?.stop_loop().await;
        Ok(())
    }

    /// Stop every background loop
    pub async fn shutdown(&self) {
        let entries: Vec<_> = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        for entry in entries {
            entry.stop_loop().await;
        }
        debug!("Cache manager shut down");
    }
}
