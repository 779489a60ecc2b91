//! Per-system polling tasks.
//!
//! A [`Poller`] owns one entity. It wakes on a fixed interval (or when a
//! refresh is requested), skips the network call if the store already holds
//! a fresh enough record, otherwise asks its [`StatusSource`] and commits the
//! result through the throttle gate.
//!
//! Stopping is a single operation: [`Poller::stop`] cancels the task and
//! closes the commit gate while holding the gate lock. An in-flight network
//! call is not aborted, but nothing that completes afterwards can reach the
//! store.

pub mod registry;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::{CommitOutcome, StatusEvent, StatusStore, ThrottlePolicy};
use crate::clock::Clock;
use crate::domain::SystemStatus;

pub use registry::PollerRegistry;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("unknown system: {0}")]
    UnknownSystem(String),
}

/// Where pollers get fresh statuses from.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch_status(&self, entity_id: &str) -> Result<SystemStatus, FetchError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    pub interval: Duration,
    pub throttle_window: Duration,
    /// Proposed instead of a status when the fetch fails.
    pub failure_status: SystemStatus,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5 * 60),
            throttle_window: Duration::from_secs(30),
            // Fail open, matching the mobile client.
            failure_status: SystemStatus::Online,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PollerState {
    Idle,
    Scheduled,
    Fetching,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Accepted(StatusEvent),
    /// Fetched, but the throttle gate rejected the write.
    Throttled,
    /// Record still fresh; no fetch issued.
    Skipped,
    /// The poller was stopped before the result could be committed.
    Discarded,
}

struct Inner {
    entity_id: String,
    source: Arc<dyn StatusSource>,
    store: Arc<StatusStore>,
    clock: Arc<dyn Clock>,
    config: PollerConfig,
    throttle: ThrottlePolicy,
    state: Mutex<PollerState>,
    gate: Mutex<()>,
    cancel: CancellationToken,
    refresh: Notify,
    permits: Option<Arc<Semaphore>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Clone)]
pub struct Poller {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Poller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("entity_id", &self.inner.entity_id)
            .field("state", &self.state())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl Poller {
    pub fn new(
        entity_id: impl Into<String>,
        source: Arc<dyn StatusSource>,
        store: Arc<StatusStore>,
        clock: Arc<dyn Clock>,
        config: PollerConfig,
    ) -> Self {
        Self::with_parts(
            entity_id,
            source,
            store,
            clock,
            config,
            CancellationToken::new(),
            None,
        )
    }

    pub(crate) fn with_parts(
        entity_id: impl Into<String>,
        source: Arc<dyn StatusSource>,
        store: Arc<StatusStore>,
        clock: Arc<dyn Clock>,
        config: PollerConfig,
        cancel: CancellationToken,
        permits: Option<Arc<Semaphore>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                entity_id: entity_id.into(),
                source,
                store,
                clock,
                throttle: ThrottlePolicy::new(config.throttle_window),
                config,
                state: Mutex::new(PollerState::Idle),
                gate: Mutex::new(()),
                cancel,
                refresh: Notify::new(),
                permits,
                task: Mutex::new(None),
            }),
        }
    }

    pub fn entity_id(&self) -> &str {
        &self.inner.entity_id
    }

    pub fn state(&self) -> PollerState {
        *self.inner.state.lock()
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Arm the timer. The first poll happens immediately. No-op unless idle.
    pub fn start(&self) {
        {
            let mut state = self.inner.state.lock();
            if *state != PollerState::Idle || self.inner.cancel.is_cancelled() {
                return;
            }
            *state = PollerState::Scheduled;
        }

        let poller = self.clone();
        let mut task = self.inner.task.lock();
        *task = Some(tokio::spawn(async move { poller.run().await }));
        drop(task);
        info!(
            entity_id = %self.inner.entity_id,
            interval_s = self.inner.config.interval.as_secs(),
            "poller started"
        );
    }

    /// Ask the running task for a forced refresh.
    pub fn refresh(&self) {
        self.inner.refresh.notify_one();
    }

    /// Stop polling. Once this returns, no fetch result, including one
    /// already in flight, will be written to the store.
    pub fn stop(&self) {
        let _gate = self.inner.gate.lock();
        self.inner.cancel.cancel();
        *self.inner.state.lock() = PollerState::Stopped;
    }

    /// Stop and wait for the background task to exit.
    pub async fn shutdown(&self) {
        self.stop();
        let handle = self.inner.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(entity_id = %self.inner.entity_id, error = %e, "poller task failed");
            }
        }
    }

    /// Run one poll cycle now.
    pub async fn poll_once(&self, force: bool) -> PollOutcome {
        let inner = &self.inner;
        if inner.cancel.is_cancelled() {
            return PollOutcome::Discarded;
        }

        if !force
            && !inner
                .throttle
                .should_accept(&inner.store, &inner.entity_id, inner.clock.now(), false)
        {
            debug!(entity_id = %inner.entity_id, "record still fresh, skipping fetch");
            return PollOutcome::Skipped;
        }

        let _permit = match &inner.permits {
            Some(permits) => tokio::select! {
                biased;
                _ = inner.cancel.cancelled() => return PollOutcome::Discarded,
                permit = permits.clone().acquire_owned() => match permit {
                    Ok(permit) => Some(permit),
                    Err(_) => return PollOutcome::Discarded,
                },
            },
            None => None,
        };

        self.transition(PollerState::Fetching);
        // A fetch already under way runs to completion; `commit` drops its
        // result if the poller was stopped meanwhile.
        let fetched = inner.source.fetch_status(&inner.entity_id).await;

        let status = match fetched {
            Ok(status) => status,
            Err(e) => {
                warn!(
                    entity_id = %inner.entity_id,
                    error = %e,
                    fallback = %inner.config.failure_status,
                    "status fetch failed, using fallback status"
                );
                inner.config.failure_status
            }
        };

        let outcome = self.commit(status, force);
        let resting = if inner.task.lock().is_some() {
            PollerState::Scheduled
        } else {
            PollerState::Idle
        };
        self.transition(resting);
        outcome
    }

    /// The only place a poller writes to the store.
    fn commit(&self, status: SystemStatus, force: bool) -> PollOutcome {
        let inner = &self.inner;
        let _gate = inner.gate.lock();
        if inner.cancel.is_cancelled() {
            debug!(entity_id = %inner.entity_id, "poller stopped, discarding result");
            return PollOutcome::Discarded;
        }
        match inner.store.commit(
            &inner.entity_id,
            status,
            inner.clock.now(),
            force,
            &inner.throttle,
        ) {
            CommitOutcome::Accepted(event) => PollOutcome::Accepted(event),
            CommitOutcome::Throttled { .. } => PollOutcome::Throttled,
        }
    }

    fn transition(&self, next: PollerState) {
        let mut state = self.inner.state.lock();
        if *state != PollerState::Stopped {
            *state = next;
        }
    }

    async fn run(self) {
        let inner = &self.inner;
        let mut ticker = tokio::time::interval(inner.config.interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let force = tokio::select! {
                biased;
                _ = inner.cancel.cancelled() => break,
                _ = inner.refresh.notified() => true,
                _ = ticker.tick() => false,
            };
            if let PollOutcome::Accepted(event) = self.poll_once(force).await {
                debug!(entity_id = %event.entity_id, status = %event.current, forced = event.forced, "poll accepted");
            }
        }
        debug!(entity_id = %inner.entity_id, "poller task exited");
    }
}
