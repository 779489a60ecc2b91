use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::domain::ErrorMessage;

/// `GET pvsystems/{id}/flowdata`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FlowData {
    #[serde(default)]
    pub status: Option<FlowStatus>,
    #[serde(default)]
    pub data: Option<FlowChannels>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowStatus {
    #[serde(default)]
    pub is_online: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FlowChannels {
    #[serde(default)]
    pub channels: Vec<Channel>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub channel_name: String,
    #[serde(default)]
    pub value: Option<f64>,
}

pub const PV_POWER_CHANNEL: &str = "PowerPV";

impl FlowData {
    pub fn is_online(&self) -> bool {
        self.status.as_ref().is_some_and(|s| s.is_online)
    }

    /// Current PV production in watts; zero when the channel is missing.
    pub fn pv_power_w(&self) -> f64 {
        self.data
            .iter()
            .flat_map(|d| d.channels.iter())
            .find(|c| c.channel_name == PV_POWER_CHANNEL)
            .and_then(|c| c.value)
            .unwrap_or(0.0)
    }
}

/// `GET pvsystems/{id}/messages`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessagesResponse {
    #[serde(default)]
    pub messages: Vec<RawMessage>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMessage {
    pub state_code: i64,
    pub log_date_time: DateTime<Utc>,
}

impl From<RawMessage> for ErrorMessage {
    fn from(raw: RawMessage) -> Self {
        ErrorMessage {
            state_code: raw.state_code,
            logged_at: raw.log_date_time,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct JwtResponse {
    #[serde(rename = "jwtToken")]
    pub jwt_token: Option<String>,
}

/// Row of the error-code catalog table.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorCodeRow {
    pub code: Option<i64>,
    pub colour: Option<String>,
}
