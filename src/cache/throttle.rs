use chrono::{DateTime, Utc};
use std::time::Duration;

use super::store::StatusStore;
use crate::domain::StatusRecord;

/// Minimum spacing between two accepted updates of the same entity.
///
/// The first update of an entity and forced updates always pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottlePolicy {
    window: Duration,
}

impl ThrottlePolicy {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn should_accept(
        &self,
        store: &StatusStore,
        entity_id: &str,
        now: DateTime<Utc>,
        force: bool,
    ) -> bool {
        if force {
            return true;
        }
        self.admits(store.get(entity_id).as_ref(), now, false)
    }

    /// Same rule as [`should_accept`](Self::should_accept) on a record already in hand.
    pub fn admits(&self, previous: Option<&StatusRecord>, now: DateTime<Utc>, force: bool) -> bool {
        if force {
            return true;
        }
        match previous {
            None => true,
            // A clock that went backwards yields a negative delta; treat it as not elapsed.
            Some(record) => (now - record.last_updated_at)
                .to_std()
                .map_or(false, |elapsed| elapsed >= self.window),
        }
    }

    /// When the entity may next be updated without forcing. `None` if it is
    /// eligible already because it has never been seen.
    pub fn next_eligible_at(&self, previous: Option<&StatusRecord>) -> Option<DateTime<Utc>> {
        let record = previous?;
        let window = chrono::Duration::from_std(self.window).ok()?;
        record.last_updated_at.checked_add_signed(window)
    }
}
