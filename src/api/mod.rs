pub mod error;
pub mod health;
pub mod response;
pub mod v1;

use axum::{
    http::{header, Method},
    routing::get,
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::{config::ServerConfig, session::MonitorSession};

#[derive(Clone)]
pub struct AppState {
    pub session: Arc<MonitorSession>,
}

impl AppState {
    pub fn new(session: Arc<MonitorSession>) -> Self {
        Self { session }
    }
}

pub fn router(state: AppState, cfg: &ServerConfig) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .nest("/api/v1", v1::router())
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check))
        .route("/health/live", get(health::liveness_check))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(axum::extract::DefaultBodyLimit::max(64 * 1024))
                .layer(TimeoutLayer::new(cfg.request_timeout())),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::domain::SystemStatus;
    use crate::poller::{MockStatusSource, PollerConfig};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use chrono::DateTime;
    use serde_json::Value;
    use std::time::Duration;
    use tower::ServiceExt;

    fn app() -> (Router, Arc<MonitorSession>) {
        let mut source = MockStatusSource::new();
        source
            .expect_fetch_status()
            .returning(|_| Ok(SystemStatus::Online));
        let session = Arc::new(MonitorSession::from_parts(
            PollerConfig {
                interval: Duration::from_secs(300),
                throttle_window: Duration::from_secs(30),
                failure_status: SystemStatus::Online,
            },
            2,
            Arc::new(source),
            Arc::new(ManualClock::at_epoch()),
        ));
        let cfg = ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            request_timeout_secs: 5,
        };
        (router(AppState::new(session.clone()), &cfg), session)
    }

    async fn call(app: Router, method: &str, uri: &str) -> (StatusCode, Value) {
        let resp = app
            .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn status_reports_aggregate() {
        let (app, session) = app();
        let t = DateTime::from_timestamp(10, 0).unwrap();
        session.store().set("sys-1", SystemStatus::Online, t);
        session.store().set("sys-2", SystemStatus::Error, t);

        let (status, body) = call(app, "GET", "/api/v1/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["overall_status"], "error");
        assert_eq!(body["data"]["counts"]["online"], 1);
        assert_eq!(body["data"]["counts"]["error"], 1);
        assert_eq!(body["data"]["counts"]["total"], 2);
    }

    #[tokio::test]
    async fn system_status_and_listing() {
        let (app, session) = app();
        let t = DateTime::from_timestamp(10, 0).unwrap();
        session.store().set("sys-2", SystemStatus::Offline, t);
        session.store().set("sys-1", SystemStatus::Warning, t);

        let (status, body) = call(app.clone(), "GET", "/api/v1/systems/sys-1/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "warning");
        assert_eq!(body["data"]["last_updated_at_ms"], 10_000);

        let (status, body) = call(app.clone(), "GET", "/api/v1/systems").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["metadata"]["total_count"], 2);
        assert_eq!(body["data"][0]["entity_id"], "sys-1");
        assert_eq!(body["data"][1]["status"], "offline");

        let (status, body) = call(app, "GET", "/api/v1/systems/nope/status").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "NotFound");
    }

    #[tokio::test]
    async fn refresh_requires_tracking() {
        let (app, session) = app();
        let (status, _) = call(app.clone(), "POST", "/api/v1/systems/sys-1/refresh").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        session.track(["sys-1"]);
        let (status, body) = call(app.clone(), "POST", "/api/v1/systems/sys-1/refresh").await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["data"]["entity_id"], "sys-1");

        session.shutdown().await;
        let (status, _) = call(app, "POST", "/api/v1/systems/sys-1/refresh").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn health_endpoints() {
        let (app, session) = app();
        let (status, _) = call(app.clone(), "GET", "/health/live").await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = call(app.clone(), "GET", "/api/v1/healthz").await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = call(app.clone(), "GET", "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");

        session.shutdown().await;
        let (status, _) = call(app.clone(), "GET", "/health/ready").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        let (status, body) = call(app, "GET", "/health").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["checks"]["pollers"]["status"], "unhealthy");
    }
}
