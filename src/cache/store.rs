use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use tokio::sync::{broadcast, watch};
use tracing::debug;

use super::aggregate::{AggregateSnapshot, AggregateView};
use super::events::StatusEvent;
use super::throttle::ThrottlePolicy;
use crate::domain::{StatusRecord, SystemStatus};

const EVENT_CAPACITY: usize = 256;

/// Result of a throttled write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Accepted(StatusEvent),
    Throttled {
        next_eligible_at: Option<DateTime<Utc>>,
    },
}

impl CommitOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }
}

/// Authoritative `entity id -> last accepted status` map for one session.
///
/// Every accepted write recomputes the aggregate and emits a [`StatusEvent`]
/// while the write lock is held, so subscribers observe writes in the order
/// they were applied. The lock is never held across an await point.
pub struct StatusStore {
    records: RwLock<HashMap<String, StatusRecord>>,
    aggregate_tx: watch::Sender<AggregateSnapshot>,
    events_tx: broadcast::Sender<StatusEvent>,
}

impl Default for StatusStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusStore {
    pub fn new() -> Self {
        let (aggregate_tx, _) = watch::channel(AggregateSnapshot::default());
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            records: RwLock::new(HashMap::new()),
            aggregate_tx,
            events_tx,
        }
    }

    pub fn get(&self, entity_id: &str) -> Option<StatusRecord> {
        self.records.read().get(entity_id).cloned()
    }

    /// Copy of every record, sorted by entity id.
    pub fn all(&self) -> Vec<StatusRecord> {
        let mut records: Vec<_> = self.records.read().values().cloned().collect();
        records.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        records
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Unconditional insert or overwrite.
    pub fn set(
        &self,
        entity_id: impl Into<String>,
        status: SystemStatus,
        timestamp: DateTime<Utc>,
    ) -> StatusEvent {
        let mut records = self.records.write();
        self.apply(&mut records, entity_id.into(), status, timestamp, true)
    }

    /// Throttle check and write under one lock, so two pollers racing on the
    /// same entity can not both pass the gate.
    pub fn commit(
        &self,
        entity_id: &str,
        status: SystemStatus,
        now: DateTime<Utc>,
        force: bool,
        policy: &ThrottlePolicy,
    ) -> CommitOutcome {
        let mut records = self.records.write();
        let previous = records.get(entity_id);
        if !policy.admits(previous, now, force) {
            let next_eligible_at = policy.next_eligible_at(previous);
            debug!(entity_id, %status, ?next_eligible_at, "status update throttled");
            return CommitOutcome::Throttled { next_eligible_at };
        }
        CommitOutcome::Accepted(self.apply(&mut records, entity_id.to_string(), status, now, force))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.events_tx.subscribe()
    }

    pub fn aggregate_view(&self) -> AggregateView {
        AggregateView::new(self.aggregate_tx.subscribe())
    }

    pub fn aggregate(&self) -> AggregateSnapshot {
        self.aggregate_tx.borrow().clone()
    }

    fn apply(
        &self,
        records: &mut HashMap<String, StatusRecord>,
        entity_id: String,
        status: SystemStatus,
        timestamp: DateTime<Utc>,
        forced: bool,
    ) -> StatusEvent {
        let previous = records.get(&entity_id);
        let previous_status = previous.map(|r| r.status);
        // last_updated_at never moves backwards.
        let stamped = previous.map_or(timestamp, |r| r.last_updated_at.max(timestamp));

        records.insert(
            entity_id.clone(),
            StatusRecord::new(entity_id.clone(), status, stamped),
        );

        let snapshot = AggregateSnapshot::from_records(records.values());
        let overall_changed = self.aggregate_tx.send_if_modified(|current| {
            if *current == snapshot {
                return false;
            }
            *current = snapshot.clone();
            true
        });

        let event = StatusEvent {
            entity_id,
            previous: previous_status,
            current: status,
            at: stamped,
            forced,
        };
        if event.is_change() {
            debug!(
                entity_id = %event.entity_id,
                previous = ?event.previous,
                current = %event.current,
                overall = %snapshot.overall_status,
                "system status changed"
            );
        }
        if overall_changed {
            debug!(
                overall = %snapshot.overall_status,
                total = snapshot.counts.total,
                "aggregate recomputed"
            );
        }
        // No receivers is fine.
        let _ = self.events_tx.send(event.clone());
        event
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn get_and_set() {
        let store = StatusStore::new();
        assert!(store.get("sys-1").is_none());
        assert!(store.is_empty());

        store.set("sys-1", SystemStatus::Warning, at(1));
        let record = store.get("sys-1").unwrap();
        assert_eq!(record.status, SystemStatus::Warning);
        assert_eq!(record.last_updated_at, at(1));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn one_record_per_entity() {
        let store = StatusStore::new();
        store.set("sys-1", SystemStatus::Online, at(1));
        store.set("sys-1", SystemStatus::Error, at(2));
        store.set("sys-2", SystemStatus::Online, at(3));

        let all = store.all();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].entity_id, "sys-1");
        assert_eq!(all[0].status, SystemStatus::Error);
        assert_eq!(all[1].entity_id, "sys-2");
    }

    #[test]
    fn timestamp_never_moves_backwards() {
        let store = StatusStore::new();
        store.set("sys-1", SystemStatus::Online, at(50));
        store.set("sys-1", SystemStatus::Error, at(10));

        let record = store.get("sys-1").unwrap();
        assert_eq!(record.status, SystemStatus::Error);
        assert_eq!(record.last_updated_at, at(50));
    }

    #[test]
    fn commit_respects_throttle() {
        let store = StatusStore::new();
        let policy = ThrottlePolicy::new(Duration::from_secs(30));

        assert!(store.commit("sys-1", SystemStatus::Online, at(0), false, &policy).is_accepted());

        let outcome = store.commit("sys-1", SystemStatus::Offline, at(5), false, &policy);
        assert_eq!(
            outcome,
            CommitOutcome::Throttled {
                next_eligible_at: Some(at(30))
            }
        );
        assert_eq!(store.get("sys-1").unwrap().status, SystemStatus::Online);

        assert!(store.commit("sys-1", SystemStatus::Offline, at(31), false, &policy).is_accepted());
        assert_eq!(store.get("sys-1").unwrap().status, SystemStatus::Offline);
    }

    #[test]
    fn forced_refresh_with_same_status_only_touches_timestamp() {
        let store = StatusStore::new();
        let policy = ThrottlePolicy::new(Duration::from_secs(30));
        store.commit("sys-1", SystemStatus::Online, at(0), false, &policy);
        store.commit("sys-2", SystemStatus::Error, at(1), false, &policy);
        let before = store.aggregate();

        let outcome = store.commit("sys-1", SystemStatus::Online, at(2), true, &policy);
        match outcome {
            CommitOutcome::Accepted(event) => {
                assert!(event.forced);
                assert!(!event.is_change());
            }
            other => panic!("expected accepted, got {other:?}"),
        }
        assert_eq!(store.aggregate(), before);
        assert_eq!(store.get("sys-1").unwrap().last_updated_at, at(2));
    }

    #[tokio::test]
    async fn subscribers_see_events_and_aggregate() {
        let store = StatusStore::new();
        let mut events = store.subscribe();
        let mut view = store.aggregate_view();

        store.set("sys-1", SystemStatus::Online, at(0));
        let first = events.recv().await.unwrap();
        assert_eq!(first.previous, None);
        assert_eq!(first.current, SystemStatus::Online);
        let snap = view.changed().await.unwrap();
        assert_eq!(snap.counts.total, 1);

        store.set("sys-2", SystemStatus::Error, at(1));
        let snap = view.changed().await.unwrap();
        assert_eq!(snap.overall_status, SystemStatus::Error);
        assert_eq!(snap.counts.online, 1);
        assert_eq!(snap.counts.error, 1);
        assert_eq!(snap.counts.total, 2);
    }

    #[test]
    fn concurrent_writers_keep_counts_consistent() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(StatusStore::new());
        let policy = ThrottlePolicy::new(Duration::from_secs(30));

        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let store = store.clone();
                thread::spawn(move || {
                    for i in 0..50 {
                        let id = format!("sys-{}", (worker * 50 + i) % 100);
                        let status = if i % 3 == 0 {
                            SystemStatus::Error
                        } else {
                            SystemStatus::Online
                        };
                        store.commit(&id, status, at(i), false, &policy);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let snap = store.aggregate();
        assert_eq!(snap.counts.total, 100);
        assert_eq!(
            snap.counts.online + snap.counts.warning + snap.counts.error + snap.counts.offline,
            snap.counts.total
        );
        assert_eq!(snap, AggregateSnapshot::from_records(store.all().iter()));
    }
}
