use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use super::AppState;
use crate::cache::AggregateSnapshot;
use crate::domain::SystemStatus;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    timestamp: chrono::DateTime<chrono::Utc>,
    uptime_secs: i64,
    checks: HealthChecks,
}

#[derive(Debug, Serialize)]
pub struct HealthChecks {
    pollers: ComponentHealth,
    store: ComponentHealth,
}

#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl ComponentHealth {
    fn healthy(detail: impl Into<String>) -> Self {
        Self {
            status: "healthy",
            detail: Some(detail.into()),
        }
    }

    fn unhealthy(detail: impl Into<String>) -> Self {
        Self {
            status: "unhealthy",
            detail: Some(detail.into()),
        }
    }

    fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

fn check_pollers(state: &AppState) -> ComponentHealth {
    if state.session.is_shut_down() {
        return ComponentHealth::unhealthy("session shut down");
    }
    ComponentHealth::healthy(format!("{} systems tracked", state.session.registry().len()))
}

fn check_store(state: &AppState) -> ComponentHealth {
    store_health(&state.session.snapshot())
}

// Fleet status is reported, not judged: an all-offline fleet is still a
// working monitor.
fn store_health(snapshot: &AggregateSnapshot) -> ComponentHealth {
    let counts = snapshot.counts;
    let all_offline = counts.total > 0 && counts.get(SystemStatus::Offline) == counts.total;
    ComponentHealth::healthy(format!(
        "{} systems, overall {}{}",
        counts.total,
        snapshot.overall_status,
        if all_offline { " (all offline)" } else { "" }
    ))
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let pollers = check_pollers(&state);
    let store = check_store(&state);
    let all_healthy = pollers.is_healthy() && store.is_healthy();

    let response = HealthResponse {
        status: if all_healthy { "healthy" } else { "degraded" },
        timestamp: chrono::Utc::now(),
        uptime_secs: state.session.uptime().num_seconds(),
        checks: HealthChecks { pollers, store },
    };
    let status_code = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status_code, Json(response))
}

/// GET /health/ready
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    if state.session.is_shut_down() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    }
}

/// GET /health/live
pub async fn liveness_check() -> impl IntoResponse {
    StatusCode::OK
}
