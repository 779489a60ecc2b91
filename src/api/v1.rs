use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::error::ApiError;
use super::response::ApiResponse;
use super::AppState;
use crate::cache::{AggregateSnapshot, StatusCounts};
use crate::domain::{StatusRecord, SystemStatus};
use crate::poller::PollerState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/status", get(get_status))
        .route("/systems", get(list_systems))
        .route("/systems/:id/status", get(get_system_status))
        .route("/systems/:id/refresh", post(refresh_system))
        .route("/healthz", get(healthz))
}

pub async fn healthz() -> impl IntoResponse {
    StatusCode::OK
}

#[derive(Debug, Serialize)]
pub struct OverallStatus {
    pub overall_status: SystemStatus,
    pub counts: StatusCounts,
}

impl From<AggregateSnapshot> for OverallStatus {
    fn from(snapshot: AggregateSnapshot) -> Self {
        Self {
            overall_status: snapshot.overall_status,
            counts: snapshot.counts,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SystemView {
    pub entity_id: String,
    pub status: SystemStatus,
    pub last_updated_at: DateTime<Utc>,
    pub last_updated_at_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poller: Option<PollerState>,
}

impl SystemView {
    fn new(record: StatusRecord, poller: Option<PollerState>) -> Self {
        Self {
            last_updated_at_ms: record.last_updated_at_ms(),
            entity_id: record.entity_id,
            status: record.status,
            last_updated_at: record.last_updated_at,
            poller,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RefreshQueued {
    pub entity_id: String,
}

/// GET /api/v1/status
pub async fn get_status(State(st): State<AppState>) -> impl IntoResponse {
    let snapshot = st.session.snapshot();
    let tracked = st.session.registry().len();
    ApiResponse::success(OverallStatus::from(snapshot)).with_tracked(tracked)
}

/// GET /api/v1/systems
pub async fn list_systems(State(st): State<AppState>) -> impl IntoResponse {
    let registry = st.session.registry();
    let systems: Vec<_> = st
        .session
        .store()
        .all()
        .into_iter()
        .map(|record| {
            let poller = registry.get(&record.entity_id).map(|p| p.state());
            SystemView::new(record, poller)
        })
        .collect();
    let count = systems.len();
    ApiResponse::success(systems)
        .with_count(count)
        .with_tracked(registry.len())
}

/// GET /api/v1/systems/:id/status
pub async fn get_system_status(
    State(st): State<AppState>,
    Path(id): Path<String>,
) -> Result<ApiResponse<SystemView>, ApiError> {
    let record = st
        .session
        .status(&id)
        .ok_or_else(|| ApiError::UnknownSystem(id.clone()))?;
    let poller = st.session.registry().get(&id).map(|p| p.state());
    Ok(ApiResponse::success(SystemView::new(record, poller)))
}

/// POST /api/v1/systems/:id/refresh
pub async fn refresh_system(
    State(st): State<AppState>,
    Path(id): Path<String>,
) -> Result<ApiResponse<RefreshQueued>, ApiError> {
    if st.session.is_shut_down() {
        return Err(ApiError::ShuttingDown);
    }
    if !st.session.refresh(&id) {
        return Err(ApiError::UnknownSystem(id));
    }
    tracing::info!(entity_id = %id, "forced refresh requested");
    Ok(ApiResponse::accepted(RefreshQueued { entity_id: id }))
}
