//! Turns raw observations of a PV system into a [`SystemStatus`].
//!
//! The rules mirror how the monitoring backend colours systems:
//! connectivity first, then red error codes weighed against current
//! production, then amber codes. Red errors count only when they were
//! logged after the last time the system recovered from red; recovery is
//! detected when the system produces power again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::status::SystemStatus;

/// Colour assigned to an inverter error code by the error-code catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorColour {
    Red,
    Amber,
    Other,
}

impl ErrorColour {
    pub fn from_catalog(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "red" => Self::Red,
            "yellow" | "orange" | "amber" => Self::Amber,
            _ => Self::Other,
        }
    }
}

pub type ErrorCatalog = HashMap<i64, ErrorColour>;

/// One error message reported by the inverter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub state_code: i64,
    pub logged_at: DateTime<Utc>,
}

/// What a single poll of the external API saw.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Observation {
    pub reachable: bool,
    pub power_w: f64,
    pub messages: Vec<ErrorMessage>,
}

impl Observation {
    pub fn unreachable() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub status: SystemStatus,
    /// Updated "red errors resolved" marker; unchanged when no recovery happened.
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Classify one observation.
///
/// `previous` is the last status this system was classified as, and
/// `resolved_at` the last time its red errors were cleared.
pub fn classify(
    obs: &Observation,
    previous: Option<SystemStatus>,
    resolved_at: Option<DateTime<Utc>>,
    catalog: &ErrorCatalog,
    now: DateTime<Utc>,
) -> Classification {
    if !obs.reachable {
        return Classification {
            status: SystemStatus::Offline,
            resolved_at,
        };
    }

    let producing = obs.power_w > 0.0;

    let newest_red = unresolved(obs, catalog, resolved_at, ErrorColour::Red)
        .map(|m| m.logged_at)
        .max();
    if let Some(newest) = newest_red {
        return if producing {
            Classification {
                status: SystemStatus::Online,
                resolved_at: Some(newest),
            }
        } else {
            Classification {
                status: SystemStatus::Error,
                resolved_at,
            }
        };
    }

    match previous {
        Some(SystemStatus::Error) if producing => {
            return Classification {
                status: SystemStatus::Online,
                resolved_at: Some(now),
            }
        }
        Some(SystemStatus::Error) => {
            return Classification {
                status: SystemStatus::Error,
                resolved_at,
            }
        }
        // Reachable but asleep (e.g. at night).
        Some(SystemStatus::Offline) if !producing => {
            return Classification {
                status: SystemStatus::Offline,
                resolved_at,
            }
        }
        _ => {}
    }

    let status = if unresolved(obs, catalog, resolved_at, ErrorColour::Amber)
        .next()
        .is_some()
    {
        SystemStatus::Warning
    } else {
        SystemStatus::Online
    };
    Classification {
        status,
        resolved_at,
    }
}

/// Messages of the given colour logged after the last recovery.
fn unresolved<'a>(
    obs: &'a Observation,
    catalog: &'a ErrorCatalog,
    resolved_at: Option<DateTime<Utc>>,
    colour: ErrorColour,
) -> impl Iterator<Item = &'a ErrorMessage> + 'a {
    obs.messages
        .iter()
        .filter(move |m| catalog.get(&m.state_code) == Some(&colour))
        .filter(move |m| resolved_at.map_or(true, |r| m.logged_at > r))
}
