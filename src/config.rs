use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::warn;
use validator::Validate;

use crate::domain::SystemStatus;
use crate::poller::PollerConfig;

pub const ENV_PREFIX: &str = "PVMON__";

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Config {
    #[validate(nested)]
    pub server: ServerConfig,
    #[validate(nested)]
    pub monitor: MonitorConfig,
    #[validate(nested)]
    pub solarweb: SolarWebConfig,
    #[validate(nested)]
    pub error_codes: ErrorCodesConfig,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub host: String,
    pub port: u16,
    #[validate(range(min = 1, max = 300))]
    pub request_timeout_secs: u64,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct MonitorConfig {
    #[validate(range(min = 1))]
    pub poll_interval_secs: u64,
    pub throttle_window_secs: u64,
    /// Status proposed when a fetch fails. Accepts the same aliases as the
    /// wire format (`green`, `red`, ...).
    pub failure_status: String,
    /// Status used for wire values nobody recognises.
    pub unknown_status: SystemStatus,
    #[validate(range(min = 1, max = 256))]
    pub max_concurrent_fetches: usize,
    #[serde(default)]
    pub systems: Vec<String>,
    /// Last persisted wire status per system (`green`, `red`, `offline`, ...),
    /// used as the previous status for the first classification.
    #[serde(default)]
    pub last_known: BTreeMap<String, String>,
}

impl MonitorConfig {
    pub fn failure_status(&self) -> SystemStatus {
        match self.failure_status.parse() {
            Ok(status) => status,
            Err(err) => {
                warn!(%err, fallback = %self.unknown_status, "unrecognised monitor.failure_status");
                self.unknown_status
            }
        }
    }

    /// `last_known` mapped to statuses. Values outside the wire vocabulary
    /// become `unknown_status`.
    pub fn last_known_statuses(&self) -> Vec<(String, SystemStatus)> {
        self.last_known
            .iter()
            .map(|(id, wire)| {
                let status = SystemStatus::from_wire_or(wire, self.unknown_status);
                if wire.parse::<SystemStatus>().is_err() {
                    warn!(entity_id = %id, wire = %wire, fallback = %status, "unrecognised stored status");
                }
                (id.clone(), status)
            })
            .collect()
    }

    pub fn to_poller_config(&self) -> PollerConfig {
        PollerConfig {
            interval: Duration::from_secs(self.poll_interval_secs),
            throttle_window: Duration::from_secs(self.throttle_window_secs),
            failure_status: self.failure_status(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SolarWebConfig {
    #[validate(url)]
    pub base_url: String,
    #[serde(default)]
    pub access_key_id: String,
    #[serde(default)]
    pub access_key_value: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub password: String,
    #[validate(range(min = 1, max = 300))]
    pub http_timeout_secs: u64,
    #[validate(range(min = 1, max = 10))]
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    #[validate(range(min = 1))]
    pub token_ttl_secs: u64,
    /// Shift applied to "now" before taking the calendar day whose error
    /// messages are requested.
    #[validate(range(min = -14, max = 14))]
    pub day_offset_hours: i64,
}

impl SolarWebConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ErrorCodesConfig {
    /// Empty disables the catalog; every code is then treated as uncoloured.
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    #[validate(range(min = 1))]
    pub cache_ttl_secs: u64,
}

impl ErrorCodesConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::from_figment(Self::figment())
    }

    pub fn figment() -> Figment {
        Figment::new()
            .merge(Toml::file("config/default.toml"))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Config = figment.extract().context("failed to load configuration")?;
        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}
