use tokio::signal;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cache::{AggregateView, StatusEvent};

pub const DEFAULT_FILTER: &str = "info,hyper=warn,reqwest=warn,tower_http=info";

pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! { _ = ctrl_c => {}, _ = terminate => {}, }
    info!("shutdown signal received");
}

/// What the status listener saw before it stopped.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ListenerStats {
    pub transitions: u64,
    pub aggregate_changes: u64,
    pub lagged: u64,
}

/// Log status transitions and aggregate changes until `cancel` fires or the
/// store goes away.
pub async fn log_status_changes(
    mut events: broadcast::Receiver<StatusEvent>,
    mut aggregate: AggregateView,
    cancel: CancellationToken,
) -> ListenerStats {
    let mut stats = ListenerStats::default();
    let mut aggregate_open = true;
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            snapshot = aggregate.changed(), if aggregate_open => match snapshot {
                Some(snapshot) => {
                    stats.aggregate_changes += 1;
                    info!(
                        overall = %snapshot.overall_status,
                        online = snapshot.counts.online,
                        warning = snapshot.counts.warning,
                        error = snapshot.counts.error,
                        offline = snapshot.counts.offline,
                        total = snapshot.counts.total,
                        "aggregate status changed"
                    );
                }
                None => aggregate_open = false,
            },
            event = events.recv() => match event {
                Ok(event) if event.is_change() => {
                    stats.transitions += 1;
                    info!(
                        entity_id = %event.entity_id,
                        previous = ?event.previous,
                        current = %event.current,
                        forced = event.forced,
                        "status transition"
                    );
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    stats.lagged += skipped;
                    error!(skipped, "status event listener lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::StatusStore;
    use crate::domain::SystemStatus;
    use chrono::{DateTime, Duration, Utc};

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::UNIX_EPOCH + Duration::seconds(secs)
    }

    #[tokio::test]
    async fn counts_only_real_transitions() {
        let store = StatusStore::new();
        let events = store.subscribe();
        let view = store.aggregate_view();

        store.set("sys-1", SystemStatus::Online, at(0));
        store.set("sys-1", SystemStatus::Online, at(10));
        store.set("sys-1", SystemStatus::Error, at(20));
        drop(store);

        let stats = log_status_changes(events, view, CancellationToken::new()).await;
        assert_eq!(
            stats,
            ListenerStats {
                transitions: 2,
                aggregate_changes: 1,
                lagged: 0,
            }
        );
    }

    #[tokio::test]
    async fn stops_on_cancel_while_store_lives() {
        let store = StatusStore::new();
        let cancel = CancellationToken::new();
        let listener = tokio::spawn(log_status_changes(
            store.subscribe(),
            store.aggregate_view(),
            cancel.clone(),
        ));

        cancel.cancel();
        assert_eq!(listener.await.unwrap(), ListenerStats::default());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn reports_skipped_events_when_lagging() {
        let store = StatusStore::new();
        let events = store.subscribe();
        let view = store.aggregate_view();

        for step in 0..300i64 {
            let status = if step % 2 == 0 {
                SystemStatus::Online
            } else {
                SystemStatus::Error
            };
            store.set("sys-1", status, at(step));
        }
        drop(store);

        let stats = log_status_changes(events, view, CancellationToken::new()).await;
        assert_eq!(stats.lagged, 44);
        assert_eq!(stats.transitions, 256);
        assert_eq!(stats.aggregate_changes, 1);
    }
}
