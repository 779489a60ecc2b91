use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::SystemStatus;

/// Emitted by the store for every accepted write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusEvent {
    pub entity_id: String,
    /// `None` when this was the first record for the entity.
    pub previous: Option<SystemStatus>,
    pub current: SystemStatus,
    pub at: DateTime<Utc>,
    pub forced: bool,
}

impl StatusEvent {
    /// True when the status value differs from the previous one.
    pub fn is_change(&self) -> bool {
        self.previous != Some(self.current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(previous: Option<SystemStatus>, current: SystemStatus) -> StatusEvent {
        StatusEvent {
            entity_id: "sys-1".into(),
            previous,
            current,
            at: Utc::now(),
            forced: false,
        }
    }

    #[test]
    fn first_observation_is_a_change() {
        assert!(event(None, SystemStatus::Online).is_change());
    }

    #[test]
    fn same_status_is_not_a_change() {
        assert!(!event(Some(SystemStatus::Error), SystemStatus::Error).is_change());
        assert!(event(Some(SystemStatus::Error), SystemStatus::Online).is_change());
    }
}
