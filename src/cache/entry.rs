//! A single cache slot and its background refresh loop

use crate::cache::{CacheKey, Producer};
use crate::config::schema::CacheConfig;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Timing for background refresh loops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSettings {
    /// Pause between refreshes
    pub interval: Duration,
    /// How long a stop request waits for the loop to exit
    pub stop_timeout: Duration,
}

impl From<&CacheConfig> for LoopSettings {
    fn from(config: &CacheConfig) -> Self {
        Self {
            interval: config.refresh_interval(),
            stop_timeout: config.stop_timeout(),
        }
    }
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self::from(&CacheConfig::default())
    }
}

/// Lifecycle of an entry's background loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Stopped,
    Running,
    StopRequested,
}

/// Point-in-time view of one entry
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatus {
    pub source: String,
    pub reference: String,
    pub has_data: bool,
    pub last_refreshed: Option<DateTime<Utc>>,
    pub loop_alive: bool,
}

struct Slot<T> {
    payload: Option<Arc<T>>,
    last_refreshed: Option<DateTime<Utc>>,
}

struct LoopControl {
    state: LoopState,
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl LoopControl {
    fn is_alive(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

/// Counts loop tasks that have not yet been dropped
struct LoopGuard(Arc<AtomicUsize>);

impl LoopGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for LoopGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// One cached payload for one key.
///
/// The payload is swapped whole under a short write lock, so readers see
/// either the previous or the new value. Loop start and stop go through a
/// separate async mutex and are serialized per entry.
pub struct CacheEntry<T> {
    key: CacheKey,
    slot: RwLock<Slot<T>>,
    control: Mutex<LoopControl>,
    settings: LoopSettings,
    live_loops: Arc<AtomicUsize>,
}

impl<T: Send + Sync + 'static> CacheEntry<T> {
    /// Create an empty entry with no loop running
    pub fn new(key: CacheKey, settings: LoopSettings) -> Self {
        Self {
            key,
            slot: RwLock::new(Slot {
                payload: None,
                last_refreshed: None,
            }),
            control: Mutex::new(LoopControl {
                state: LoopState::Stopped,
                token: CancellationToken::new(),
                handle: None,
            }),
            settings,
            live_loops: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Current payload. Never waits on a refresh in progress.
    pub fn read(&self) -> Option<Arc<T>> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .payload
            .clone()
    }

    pub fn last_refreshed(&self) -> Option<DateTime<Utc>> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .last_refreshed
    }

    /// Replace the payload and refresh timestamp together
    pub fn store(&self, payload: T) -> Arc<T> {
        let payload = Arc::new(payload);
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        slot.payload = Some(Arc::clone(&payload));
        slot.last_refreshed = Some(Utc::now());
        payload
    }

    pub async fn status(&self) -> CacheStatus {
        let loop_alive = self.is_loop_alive().await;
        let slot = self.slot.read().unwrap_or_else(PoisonError::into_inner);
        CacheStatus {
            source: self.key.source.clone(),
            reference: self.key.reference.clone(),
            has_data: slot.payload.is_some(),
            last_refreshed: slot.last_refreshed,
            loop_alive,
        }
    }

    pub async fn is_loop_alive(&self) -> bool {
        self.control.lock().await.is_alive()
    }

    pub async fn loop_state(&self) -> LoopState {
        let control = self.control.lock().await;
        match control.state {
            LoopState::Running if !control.is_alive() => LoopState::Stopped,
            state => state,
        }
    }

    /// Number of loop tasks for this entry that still exist
    pub fn live_loops(&self) -> usize {
        self.live_loops.load(Ordering::SeqCst)
    }

    /// Start the background loop unless one is already alive.
    ///
    /// Returns true when a new loop was spawned.
    pub async fn ensure_loop(self: &Arc<Self>, producer: Arc<dyn Producer<T>>) -> bool {
        let mut control = self.control.lock().await;
        if control.is_alive() {
            return false;
        }
        self.restart_locked(&mut control, producer).await;
        true
    }

    /// Stop any running loop, then start a fresh one
    pub async fn start_loop(self: &Arc<Self>, producer: Arc<dyn Producer<T>>) {
        let mut control = self.control.lock().await;
        self.restart_locked(&mut control, producer).await;
    }

    /// Request the loop to stop, waiting at most `stop_timeout`
    pub async fn stop_loop(&self) {
        let mut control = self.control.lock().await;
        self.stop_locked(&mut control).await;
    }

    async fn restart_locked(self: &Arc<Self>, control: &mut LoopControl, producer: Arc<dyn Producer<T>>) {
        self.stop_locked(control).await;

        let guard = LoopGuard::enter(&self.live_loops);
        let handle = tokio::spawn(run_loop(
            Arc::downgrade(self),
            producer,
            control.token.clone(),
            self.settings.interval,
            guard,
        ));

        control.handle = Some(handle);
        control.state = LoopState::Running;
        info!("Started background refresh for {}", self.key);
    }

    async fn stop_locked(&self, control: &mut LoopControl) {
        if let Some(mut handle) = control.handle.take() {
            if !handle.is_finished() {
                control.state = LoopState::StopRequested;
                control.token.cancel();

                let stopped = tokio::time::timeout(self.settings.stop_timeout, &mut handle).await;
                if stopped.is_err() {
                    // The stale task is left to die at its next await point
                    warn!(
                        "Background refresh for {} did not stop within {:?}, aborting",
                        self.key, self.settings.stop_timeout
                    );
                    handle.abort();
                } else {
                    debug!("Background refresh for {} stopped", self.key);
                }
            }
        }

        control.token = CancellationToken::new();
        control.state = LoopState::Stopped;
    }
}

async fn run_loop<T: Send + Sync + 'static>(
    entry: Weak<CacheEntry<T>>,
    producer: Arc<dyn Producer<T>>,
    token: CancellationToken,
    interval: Duration,
    _guard: LoopGuard,
) {
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        let Some(entry) = entry.upgrade() else {
            break;
        };

        tokio::select! {
            _ = token.cancelled() => break,
            result = producer.produce(&entry.key) => match result {
                Ok(payload) => {
                    entry.store(payload);
                    info!("Cache refreshed for {}", entry.key);
                }
                Err(e) => warn!("Background refresh failed for {}: {}", entry.key, e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{QuillError, QuillResult};
    use async_trait::async_trait;

    struct Counter(AtomicUsize);

    #[async_trait]
    impl Producer<usize> for Counter {
        async fn produce(&self, _key: &CacheKey) -> QuillResult<usize> {
            Ok(self.0.fetch_add(1, Ordering::SeqCst) + 1)
        }
    }

    struct Failing;

    #[async_trait]
    impl Producer<usize> for Failing {
        async fn produce(&self, key: &CacheKey) -> QuillResult<usize> {
            Err(QuillError::sync(key.to_string(), "remote unreachable"))
        }
    }

    /// Ignores cancellation while producing
    struct Stuck;

    #[async_trait]
    impl Producer<usize> for Stuck {
        async fn produce(&self, _key: &CacheKey) -> QuillResult<usize> {
            std::future::pending::<()>().await;
            Ok(0)
        }
    }

    fn fast() -> LoopSettings {
        LoopSettings {
            interval: Duration::from_millis(10),
            stop_timeout: Duration::from_millis(200),
        }
    }

    fn entry(settings: LoopSettings) -> Arc<CacheEntry<usize>> {
        Arc::new(CacheEntry::new(CacheKey::new("repo", "main"), settings))
    }

    #[tokio::test]
    async fn store_replaces_payload_and_timestamp() {
        let entry = entry(fast());
        assert!(entry.read().is_none());
        assert!(entry.last_refreshed().is_none());

        entry.store(7);
        assert_eq!(*entry.read().unwrap(), 7);
        assert!(entry.last_refreshed().is_some());
    }

    #[tokio::test]
    async fn loop_refreshes_payload() {
        let entry = entry(fast());
        let producer = Arc::new(Counter(AtomicUsize::new(0)));

        assert!(entry.ensure_loop(producer).await);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(entry.read().is_some());
        assert_eq!(entry.loop_state().await, LoopState::Running);
        entry.stop_loop().await;
        assert_eq!(entry.loop_state().await, LoopState::Stopped);
    }

    #[tokio::test]
    async fn loop_survives_producer_errors() {
        let entry = entry(fast());
        entry.store(1);

        entry.ensure_loop(Arc::new(Failing)).await;
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert!(entry.is_loop_alive().await);
        assert_eq!(*entry.read().unwrap(), 1);
        entry.stop_loop().await;
    }

    #[tokio::test]
    async fn ensure_loop_is_idempotent() {
        let entry = entry(fast());
        let producer: Arc<dyn Producer<usize>> = Arc::new(Counter(AtomicUsize::new(0)));

        assert!(entry.ensure_loop(Arc::clone(&producer)).await);
        assert!(!entry.ensure_loop(Arc::clone(&producer)).await);
        assert_eq!(entry.live_loops(), 1);
        entry.stop_loop().await;
    }

    #[tokio::test]
    async fn stop_then_restart_keeps_one_loop() {
        let entry = entry(fast());
        let producer: Arc<dyn Producer<usize>> = Arc::new(Counter(AtomicUsize::new(0)));

        for _ in 0..5 {
            entry.start_loop(Arc::clone(&producer)).await;
            assert_eq!(entry.live_loops(), 1);
            entry.stop_loop().await;
            assert_eq!(entry.live_loops(), 0);
            assert!(!entry.is_loop_alive().await);
        }
    }

    #[tokio::test]
    async fn stop_is_bounded_for_stuck_producer() {
        let settings = LoopSettings {
            interval: Duration::from_millis(1),
            stop_timeout: Duration::from_millis(50),
        };
        let entry = entry(settings);
        entry.start_loop(Arc::new(Stuck)).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let started = std::time::Instant::now();
        entry.stop_loop().await;
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(entry.loop_state().await, LoopState::Stopped);
    }
}
