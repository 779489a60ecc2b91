use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum::{Display, EnumIter};
use thiserror::Error;

/// Coarse health classification of a monitored PV system.
///
/// Variants are declared from least to most severe so the derived `Ord`
/// matches severity precedence: `Online < Warning < Error < Offline`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SystemStatus {
    Online,
    Warning,
    Error,
    Offline,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown system status: {0:?}")]
pub struct ParseStatusError(pub String);

impl SystemStatus {
    /// Rank used by the severity resolver, higher is more severe.
    pub fn severity(self) -> u8 {
        match self {
            Self::Online => 0,
            Self::Warning => 1,
            Self::Error => 2,
            Self::Offline => 3,
        }
    }

    /// Map an external wire value, falling back to `default` for anything
    /// the mapping does not know.
    pub fn from_wire_or(value: &str, default: SystemStatus) -> SystemStatus {
        value.parse().unwrap_or(default)
    }
}

/// Wire vocabulary accepted from status sources and stored records.
///
/// | wire value                              | status    |
/// |-----------------------------------------|-----------|
/// | `online`, `green`, `ok`, `normal`       | `Online`  |
/// | `warning`, `yellow`, `orange`, `amber`  | `Warning` |
/// | `error`, `red`, `fault`                 | `Error`   |
/// | `offline`, `moon`, `sleeping`, `sleep`  | `Offline` |
///
/// Matching is case-insensitive and ignores surrounding whitespace.
impl FromStr for SystemStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "online" | "green" | "ok" | "normal" => Ok(Self::Online),
            "warning" | "yellow" | "orange" | "amber" => Ok(Self::Warning),
            "error" | "red" | "fault" => Ok(Self::Error),
            "offline" | "moon" | "sleeping" | "sleep" => Ok(Self::Offline),
            _ => Err(ParseStatusError(s.to_string())),
        }
    }
}

/// Last accepted status of one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub entity_id: String,
    pub status: SystemStatus,
    pub last_updated_at: DateTime<Utc>,
}

impl StatusRecord {
    pub fn new(entity_id: impl Into<String>, status: SystemStatus, at: DateTime<Utc>) -> Self {
        Self {
            entity_id: entity_id.into(),
            status,
            last_updated_at: at,
        }
    }

    /// `last_updated_at` as milliseconds since the Unix epoch.
    pub fn last_updated_at_ms(&self) -> i64 {
        self.last_updated_at.timestamp_millis()
    }
}
