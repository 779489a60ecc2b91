use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{Poller, PollerConfig, StatusSource};
use crate::cache::StatusStore;
use crate::clock::Clock;

/// Keeps at most one running poller per system and caps how many fetches
/// run at the same time.
pub struct PollerRegistry {
    source: Arc<dyn StatusSource>,
    store: Arc<StatusStore>,
    clock: Arc<dyn Clock>,
    config: PollerConfig,
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
    pollers: Mutex<HashMap<String, Poller>>,
}

impl PollerRegistry {
    pub fn new(
        source: Arc<dyn StatusSource>,
        store: Arc<StatusStore>,
        clock: Arc<dyn Clock>,
        config: PollerConfig,
        max_concurrent_fetches: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            store,
            clock,
            config,
            permits: Arc::new(Semaphore::new(max_concurrent_fetches.max(1))),
            cancel,
            pollers: Mutex::new(HashMap::new()),
        }
    }

    /// Running poller for `entity_id`, started if it did not exist yet.
    pub fn ensure(&self, entity_id: &str) -> Poller {
        let mut pollers = self.pollers.lock();
        if let Some(existing) = pollers.get(entity_id) {
            if !existing.is_stopped() {
                return existing.clone();
            }
        }

        let poller = Poller::with_parts(
            entity_id,
            self.source.clone(),
            self.store.clone(),
            self.clock.clone(),
            self.config,
            self.cancel.child_token(),
            Some(self.permits.clone()),
        );
        poller.start();
        pollers.insert(entity_id.to_string(), poller.clone());
        poller
    }

    pub fn get(&self, entity_id: &str) -> Option<Poller> {
        self.pollers.lock().get(entity_id).cloned()
    }

    /// Request a forced refresh. False if the system is not tracked.
    pub fn refresh(&self, entity_id: &str) -> bool {
        match self.get(entity_id) {
            Some(poller) if !poller.is_stopped() => {
                poller.refresh();
                true
            }
            _ => false,
        }
    }

    pub fn stop(&self, entity_id: &str) -> bool {
        let removed = self.pollers.lock().remove(entity_id);
        match removed {
            Some(poller) => {
                poller.stop();
                info!(entity_id, "poller stopped");
                true
            }
            None => false,
        }
    }

    /// Tracked system ids, sorted.
    pub fn tracked(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.pollers.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.pollers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pollers.lock().is_empty()
    }

    /// Stop every poller and wait for their tasks to exit.
    pub async fn shutdown(&self) {
        let pollers: Vec<_> = self.pollers.lock().drain().map(|(_, p)| p).collect();
        for poller in &pollers {
            poller.stop();
        }
        self.cancel.cancel();
        futures::future::join_all(pollers.iter().map(|p| p.shutdown())).await;
        info!("all pollers stopped");
    }
}

impl Drop for PollerRegistry {
    fn drop(&mut self) {
        for poller in self.pollers.get_mut().values() {
            poller.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::domain::SystemStatus;
    use crate::poller::{FetchError, PollerState};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct SlowSource {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl StatusSource for SlowSource {
        async fn fetch_status(&self, _entity_id: &str) -> Result<SystemStatus, FetchError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(SystemStatus::Online)
        }
    }

    fn registry(source: Arc<dyn StatusSource>, store: Arc<StatusStore>, max: usize) -> PollerRegistry {
        PollerRegistry::new(
            source,
            store,
            Arc::new(ManualClock::at_epoch()),
            PollerConfig {
                interval: Duration::from_secs(600),
                throttle_window: Duration::from_secs(30),
                failure_status: SystemStatus::Online,
            },
            max,
            CancellationToken::new(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn ensure_is_idempotent() {
        let source = Arc::new(SlowSource {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let reg = registry(source, Arc::new(StatusStore::new()), 4);

        let a = reg.ensure("sys-1");
        let b = reg.ensure("sys-1");
        assert_eq!(a.entity_id(), b.entity_id());
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.tracked(), vec!["sys-1".to_string()]);

        reg.shutdown().await;
        assert!(reg.is_empty());
        assert_eq!(a.state(), PollerState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_concurrency_is_bounded() {
        let source = Arc::new(SlowSource {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let store = Arc::new(StatusStore::new());
        let mut view = store.aggregate_view();
        let reg = registry(source.clone(), store.clone(), 2);

        for i in 0..6 {
            reg.ensure(&format!("sys-{i}"));
        }
        while view.counts().total < 6 {
            view.changed().await.unwrap();
        }
        assert!(source.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(store.len(), 6);

        reg.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_and_stop_unknown_systems() {
        let source = Arc::new(SlowSource {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let reg = registry(source, Arc::new(StatusStore::new()), 4);
        assert!(!reg.refresh("missing"));
        assert!(!reg.stop("missing"));

        reg.ensure("sys-1");
        assert!(reg.refresh("sys-1"));
        assert!(reg.stop("sys-1"));
        assert!(reg.get("sys-1").is_none());
        reg.shutdown().await;
    }
}
