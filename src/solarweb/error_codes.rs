use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, error, info};

use super::client::SolarWebError;
use super::models::ErrorCodeRow;
use crate::config::ErrorCodesConfig;
use crate::domain::{ErrorCatalog, ErrorColour};

/// Colour table for inverter error codes, cached for `cache_ttl`.
#[derive(Clone)]
pub struct ErrorCodeCatalog {
    url: String,
    api_key: String,
    client: reqwest::Client,
    ttl: Duration,
    cache: Arc<RwLock<Option<(Instant, ErrorCatalog)>>>,
}

impl ErrorCodeCatalog {
    pub fn new(cfg: &ErrorCodesConfig, timeout: Duration) -> Result<Self, SolarWebError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("pv-status-monitor/0.1"));
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;
        Ok(Self {
            url: cfg.url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
            client,
            ttl: cfg.cache_ttl(),
            cache: Arc::new(RwLock::new(None)),
        })
    }

    /// Current catalog. A failed fetch yields an empty catalog and is not
    /// cached, so the next call tries again.
    pub async fn catalog(&self) -> ErrorCatalog {
        if self.url.is_empty() {
            debug!("error code catalog not configured");
            return ErrorCatalog::new();
        }
        {
            let cached = self.cache.read().await;
            if let Some((fetched, catalog)) = &*cached {
                if fetched.elapsed() < self.ttl {
                    return catalog.clone();
                }
            }
        }

        match self.fetch().await {
            Ok(catalog) => {
                info!(codes = catalog.len(), "error code catalog refreshed");
                *self.cache.write().await = Some((Instant::now(), catalog.clone()));
                catalog
            }
            Err(err) => {
                error!(error = %err, "failed to fetch error code catalog");
                ErrorCatalog::new()
            }
        }
    }

    async fn fetch(&self) -> Result<ErrorCatalog, SolarWebError> {
        let resp = self
            .client
            .get(format!("{}/rest/v1/error_codes", self.url))
            .query(&[("select", "code,colour")])
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(SolarWebError::Status {
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            });
        }
        let rows: Vec<ErrorCodeRow> = resp.json().await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| Some((row.code?, ErrorColour::from_catalog(row.colour.as_deref()?))))
            .collect())
    }
}
