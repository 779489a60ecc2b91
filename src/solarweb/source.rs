use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::client::{SolarWebClient, SolarWebError};
use super::error_codes::ErrorCodeCatalog;
use crate::clock::Clock;
use crate::domain::{classify, Observation, SystemStatus};
use crate::poller::{FetchError, StatusSource};

#[derive(Debug, Clone, Copy, Default)]
struct Memory {
    status: Option<SystemStatus>,
    resolved_at: Option<DateTime<Utc>>,
}

/// [`StatusSource`] backed by Solar.web flow data and error messages.
///
/// Classification depends on the previous status and on when red errors
/// were last cleared, so both are remembered per system.
pub struct SolarWebStatusSource {
    client: SolarWebClient,
    catalog: ErrorCodeCatalog,
    clock: Arc<dyn Clock>,
    day_offset: chrono::Duration,
    memory: Mutex<HashMap<String, Memory>>,
}

impl SolarWebStatusSource {
    pub fn new(
        client: SolarWebClient,
        catalog: ErrorCodeCatalog,
        clock: Arc<dyn Clock>,
        day_offset_hours: i64,
    ) -> Self {
        Self {
            client,
            catalog,
            clock,
            day_offset: chrono::Duration::hours(day_offset_hours),
            memory: Mutex::new(HashMap::new()),
        }
    }

    /// Seed the previous status of `system_id`, e.g. from a persisted record.
    /// Ignored once the system has been classified.
    pub fn remember(&self, system_id: &str, status: SystemStatus) {
        let mut memory = self.memory.lock();
        let memo = memory.entry(system_id.to_string()).or_default();
        if memo.status.is_none() {
            memo.status = Some(status);
        }
    }

    /// Last time red errors were cleared for `system_id`, if ever.
    pub fn resolved_at(&self, system_id: &str) -> Option<DateTime<Utc>> {
        self.memory.lock().get(system_id).and_then(|m| m.resolved_at)
    }

    fn message_day(&self, now: DateTime<Utc>) -> NaiveDate {
        (now + self.day_offset).date_naive()
    }

    async fn observe(&self, system_id: &str, now: DateTime<Utc>) -> Result<Observation, SolarWebError> {
        let flow = self.client.flowdata(system_id).await?;
        if !flow.is_online() {
            return Ok(Observation::unreachable());
        }
        let messages = self
            .client
            .error_messages(system_id, self.message_day(now))
            .await?;
        Ok(Observation {
            reachable: true,
            power_w: flow.pv_power_w(),
            messages,
        })
    }
}

#[async_trait]
impl StatusSource for SolarWebStatusSource {
    async fn fetch_status(&self, entity_id: &str) -> Result<SystemStatus, FetchError> {
        let now = self.clock.now();
        let obs = self.observe(entity_id, now).await.map_err(FetchError::from)?;
        let catalog = if obs.messages.is_empty() {
            Default::default()
        } else {
            self.catalog.catalog().await
        };

        let mut memory = self.memory.lock();
        let memo = memory.entry(entity_id.to_string()).or_default();
        let result = classify(&obs, memo.status, memo.resolved_at, &catalog, now);
        if result.resolved_at != memo.resolved_at {
            info!(entity_id, resolved_at = ?result.resolved_at, "red errors resolved");
        }
        debug!(
            entity_id,
            reachable = obs.reachable,
            power_w = obs.power_w,
            messages = obs.messages.len(),
            status = %result.status,
            "classified system"
        );
        memo.status = Some(result.status);
        memo.resolved_at = result.resolved_at;
        Ok(result.status)
    }
}

impl From<SolarWebError> for FetchError {
    fn from(err: SolarWebError) -> Self {
        match err {
            SolarWebError::Decode(e) => FetchError::InvalidResponse(e.to_string()),
            SolarWebError::Status { status: 404, body } => FetchError::UnknownSystem(body),
            other => FetchError::Transport(other.to_string()),
        }
    }
}
