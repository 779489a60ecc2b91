use anyhow::{Context, Result};
use pv_status_monitor::clock::{Clock, SystemClock};
use pv_status_monitor::{api, config, solarweb, telemetry, MonitorSession};
use config::Config;
use solarweb::{ErrorCodeCatalog, SolarWebClient, SolarWebStatusSource};
use std::sync::Arc;
use telemetry::init_tracing;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is normal outside development.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = Config::load()?;

    if cfg.solarweb.access_key_id.is_empty() || cfg.solarweb.access_key_value.is_empty() {
        anyhow::bail!(
            "Solar.web credentials missing: set PVMON__SOLARWEB__ACCESS_KEY_ID and \
            PVMON__SOLARWEB__ACCESS_KEY_VALUE"
        );
    }
    if cfg.monitor.systems.is_empty() {
        warn!("no systems configured (monitor.systems); nothing will be polled");
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let client = SolarWebClient::new(&cfg.solarweb).context("building Solar.web client")?;
    let catalog = ErrorCodeCatalog::new(&cfg.error_codes, cfg.solarweb.http_timeout())
        .context("building error code catalog client")?;
    let source = Arc::new(SolarWebStatusSource::new(
        client,
        catalog,
        clock.clone(),
        cfg.solarweb.day_offset_hours,
    ));
    for (id, status) in cfg.monitor.last_known_statuses() {
        source.remember(&id, status);
    }

    let session = Arc::new(MonitorSession::new(&cfg.monitor, source, clock));
    let listener_task = tokio::spawn(telemetry::log_status_changes(
        session.store().subscribe(),
        session.aggregate(),
        session.cancellation(),
    ));
    let tracked = session.track(&cfg.monitor.systems);

    let app = api::router(api::AppState::new(session.clone()), &cfg.server);
    let addr = cfg.server.socket_addr()?;
    info!(%addr, tracked, "starting PV status monitor");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(telemetry::shutdown_signal())
        .await?;

    session.shutdown().await;
    match listener_task.await {
        Ok(stats) => info!(
            transitions = stats.transitions,
            aggregate_changes = stats.aggregate_changes,
            lagged = stats.lagged,
            "status listener stopped"
        ),
        Err(err) => warn!(error = %err, "status listener task failed"),
    }
    info!("shutdown complete");
    Ok(())
}
