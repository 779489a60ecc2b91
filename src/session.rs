use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cache::{AggregateSnapshot, AggregateView, StatusStore};
use crate::clock::Clock;
use crate::config::MonitorConfig;
use crate::domain::StatusRecord;
use crate::poller::{PollerConfig, PollerRegistry, StatusSource};

/// One monitoring session: the status store, the pollers feeding it, and
/// the cancellation root they all hang off.
///
/// Nothing here is global. Two sessions never share state.
pub struct MonitorSession {
    store: Arc<StatusStore>,
    registry: PollerRegistry,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
    started_at: DateTime<Utc>,
}

impl MonitorSession {
    pub fn new(config: &MonitorConfig, source: Arc<dyn StatusSource>, clock: Arc<dyn Clock>) -> Self {
        Self::from_parts(
            config.to_poller_config(),
            config.max_concurrent_fetches,
            source,
            clock,
        )
    }

    pub fn from_parts(
        poller_config: PollerConfig,
        max_concurrent_fetches: usize,
        source: Arc<dyn StatusSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let store = Arc::new(StatusStore::new());
        let cancel = CancellationToken::new();
        let registry = PollerRegistry::new(
            source,
            store.clone(),
            clock.clone(),
            poller_config,
            max_concurrent_fetches,
            cancel.child_token(),
        );
        let started_at = clock.now();
        Self {
            store,
            registry,
            clock,
            cancel,
            started_at,
        }
    }

    /// Start polling every id in `ids`. Ids already tracked are left alone.
    pub fn track<I, S>(&self, ids: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if self.cancel.is_cancelled() {
            warn!("session already shut down; ignoring track request");
            return 0;
        }
        let before = self.registry.len();
        for id in ids {
            self.registry.ensure(id.as_ref());
        }
        let added = self.registry.len() - before;
        if added > 0 {
            info!(added, tracked = self.registry.len(), "tracking systems");
        }
        added
    }

    pub fn untrack(&self, entity_id: &str) -> bool {
        self.registry.stop(entity_id)
    }

    pub fn is_tracked(&self, entity_id: &str) -> bool {
        self.registry.get(entity_id).is_some()
    }

    pub fn store(&self) -> &Arc<StatusStore> {
        &self.store
    }

    pub fn registry(&self) -> &PollerRegistry {
        &self.registry
    }

    pub fn aggregate(&self) -> AggregateView {
        self.store.aggregate_view()
    }

    pub fn snapshot(&self) -> AggregateSnapshot {
        self.store.aggregate()
    }

    pub fn status(&self, entity_id: &str) -> Option<StatusRecord> {
        self.store.get(entity_id)
    }

    /// Forced refresh bypassing the throttle. False if `entity_id` is not tracked.
    pub fn refresh(&self, entity_id: &str) -> bool {
        self.registry.refresh(entity_id)
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn uptime(&self) -> chrono::Duration {
        self.clock.now() - self.started_at
    }

    /// Token that fires when the session shuts down.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.child_token()
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stop all pollers and wait for them. No store write happens after this
    /// returns.
    pub async fn shutdown(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.cancel.cancel();
        self.registry.shutdown().await;
        info!(systems = self.store.len(), "monitor session shut down");
    }
}
