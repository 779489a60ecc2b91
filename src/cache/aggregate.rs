use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::domain::{severity, StatusRecord, SystemStatus};

/// Number of tracked systems at each status level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub online: usize,
    pub warning: usize,
    pub error: usize,
    pub offline: usize,
    pub total: usize,
}

impl StatusCounts {
    pub fn get(&self, status: SystemStatus) -> usize {
        match status {
            SystemStatus::Online => self.online,
            SystemStatus::Warning => self.warning,
            SystemStatus::Error => self.error,
            SystemStatus::Offline => self.offline,
        }
    }

    fn bump(&mut self, status: SystemStatus) {
        match status {
            SystemStatus::Online => self.online += 1,
            SystemStatus::Warning => self.warning += 1,
            SystemStatus::Error => self.error += 1,
            SystemStatus::Offline => self.offline += 1,
        }
        self.total += 1;
    }
}

/// Overall status and per-level counts, derived from the store contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateSnapshot {
    pub overall_status: SystemStatus,
    pub counts: StatusCounts,
}

impl Default for AggregateSnapshot {
    fn default() -> Self {
        Self {
            overall_status: SystemStatus::Online,
            counts: StatusCounts::default(),
        }
    }
}

impl AggregateSnapshot {
    pub fn from_records<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a StatusRecord>,
    {
        let mut counts = StatusCounts::default();
        let overall_status = severity::resolve(records.into_iter().map(|r| {
            counts.bump(r.status);
            r.status
        }));
        Self {
            overall_status,
            counts,
        }
    }
}

/// Read handle on the store's aggregate.
///
/// The store recomputes the snapshot on every accepted write; `changed`
/// only wakes when the snapshot actually differs.
#[derive(Debug, Clone)]
pub struct AggregateView {
    rx: watch::Receiver<AggregateSnapshot>,
}

impl AggregateView {
    pub(crate) fn new(rx: watch::Receiver<AggregateSnapshot>) -> Self {
        Self { rx }
    }

    pub fn current(&self) -> AggregateSnapshot {
        self.rx.borrow().clone()
    }

    pub fn overall_status(&self) -> SystemStatus {
        self.rx.borrow().overall_status
    }

    pub fn counts(&self) -> StatusCounts {
        self.rx.borrow().counts
    }

    /// Wait for the next change. Returns `None` once the store is dropped.
    pub async fn changed(&mut self) -> Option<AggregateSnapshot> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}
