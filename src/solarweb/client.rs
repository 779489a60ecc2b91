use chrono::NaiveDate;
use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER, USER_AGENT};
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::models::{FlowData, JwtResponse, MessagesResponse};
use crate::config::SolarWebConfig;
use crate::domain::ErrorMessage;

const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum SolarWebError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("JWT response is missing the jwtToken field")]
    MissingToken,
    #[error("invalid JSON: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("still rate limited after {0} attempts")]
    RateLimited(u32),
}

/// Authenticated Solar.web query API client.
#[derive(Clone)]
pub struct SolarWebClient {
    base_url: String,
    access_key_id: String,
    access_key_value: String,
    user_id: String,
    password: String,
    client: reqwest::Client,
    token: Arc<RwLock<Option<(Instant, String)>>>,
    token_ttl: Duration,
    max_retries: u32,
    retry_base_delay: Duration,
}

impl SolarWebClient {
    pub fn new(cfg: &SolarWebConfig) -> Result<Self, SolarWebError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("pv-status-monitor/0.1"));
        let client = reqwest::Client::builder()
            .timeout(cfg.http_timeout())
            .default_headers(headers)
            .build()?;
        Ok(Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            access_key_id: cfg.access_key_id.clone(),
            access_key_value: cfg.access_key_value.clone(),
            user_id: cfg.user_id.clone(),
            password: cfg.password.clone(),
            client,
            token: Arc::new(RwLock::new(None)),
            token_ttl: cfg.token_ttl(),
            max_retries: cfg.max_retries.max(1),
            retry_base_delay: cfg.retry_base_delay(),
        })
    }

    pub async fn flowdata(&self, system_id: &str) -> Result<FlowData, SolarWebError> {
        let value = self
            .get_json(&format!("pvsystems/{system_id}/flowdata"), &[])
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Error messages logged since the start of `day`.
    pub async fn error_messages(
        &self,
        system_id: &str,
        day: NaiveDate,
    ) -> Result<Vec<ErrorMessage>, SolarWebError> {
        let query = [
            ("from", format!("{}T000000", day.format("%Y%m%d"))),
            ("statetype", "Error".to_string()),
            ("stateseverity", "Error".to_string()),
        ];
        let value = self
            .get_json(&format!("pvsystems/{system_id}/messages"), &query)
            .await?;
        let resp: MessagesResponse = serde_json::from_value(value)?;
        Ok(resp.messages.into_iter().map(Into::into).collect())
    }

    /// Authenticated GET. 204 yields an empty object.
    pub async fn get_json(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<Value, SolarWebError> {
        let url = format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'));
        let mut last_err = None;

        for attempt in 0..self.max_retries {
            let token = self.token().await?;
            let sent = self
                .client
                .get(&url)
                .query(query)
                .header("AccessKeyId", &self.access_key_id)
                .header("AccessKeyValue", &self.access_key_value)
                .bearer_auth(&token)
                .send()
                .await;

            let resp = match sent {
                Ok(resp) => resp,
                Err(err) => {
                    warn!(endpoint, attempt, error = %err, "Solar.web request failed");
                    last_err = Some(err.into());
                    self.backoff(attempt).await;
                    continue;
                }
            };

            let status = resp.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                let wait = retry_after(resp.headers());
                warn!(endpoint, attempt, wait_secs = wait.as_secs(), "rate limited by Solar.web");
                last_err = Some(SolarWebError::RateLimited(attempt + 1));
                tokio::time::sleep(wait).await;
                continue;
            }
            if status == StatusCode::NO_CONTENT {
                debug!(endpoint, "no content");
                return Ok(json!({}));
            }
            if status == StatusCode::UNAUTHORIZED {
                self.token.write().await.take();
            }

            let body = match resp.text().await {
                Ok(body) => body,
                Err(err) => {
                    last_err = Some(err.into());
                    self.backoff(attempt).await;
                    continue;
                }
            };
            if !status.is_success() {
                warn!(endpoint, attempt, status = status.as_u16(), "Solar.web returned an error");
                last_err = Some(SolarWebError::Status {
                    status: status.as_u16(),
                    body,
                });
                self.backoff(attempt).await;
                continue;
            }
            return Ok(serde_json::from_str(&body)?);
        }

        Err(last_err.unwrap_or(SolarWebError::RateLimited(self.max_retries)))
    }

    async fn token(&self) -> Result<String, SolarWebError> {
        {
            let cached = self.token.read().await;
            if let Some((issued, token)) = &*cached {
                if issued.elapsed() < self.token_ttl {
                    return Ok(token.clone());
                }
            }
        }

        let mut cached = self.token.write().await;
        // Another task may have refreshed while we waited for the lock.
        if let Some((issued, token)) = &*cached {
            if issued.elapsed() < self.token_ttl {
                return Ok(token.clone());
            }
        }
        let token = self.request_token().await?;
        *cached = Some((Instant::now(), token.clone()));
        Ok(token)
    }

    async fn request_token(&self) -> Result<String, SolarWebError> {
        let url = format!("{}/iam/jwt", self.base_url);
        let body = json!({ "UserId": self.user_id, "password": self.password });
        let mut last_err = SolarWebError::MissingToken;

        for attempt in 0..self.max_retries {
            match self.try_request_token(&url, &body).await {
                Ok(token) => {
                    info!("obtained Solar.web JWT");
                    return Ok(token);
                }
                Err(err) => {
                    warn!(attempt, error = %err, "JWT request failed");
                    last_err = err;
                    self.backoff(attempt).await;
                }
            }
        }
        Err(last_err)
    }

    async fn try_request_token(&self, url: &str, body: &Value) -> Result<String, SolarWebError> {
        let resp = self
            .client
            .post(url)
            .header("AccessKeyId", &self.access_key_id)
            .header("AccessKeyValue", &self.access_key_value)
            .json(body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(SolarWebError::Status {
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            });
        }
        let jwt: JwtResponse = resp.json().await?;
        jwt.jwt_token.ok_or(SolarWebError::MissingToken)
    }

    /// `retry_base_delay * 2^attempt`, skipped after the last attempt.
    async fn backoff(&self, attempt: u32) {
        if attempt + 1 >= self.max_retries {
            return;
        }
        let delay = self.retry_base_delay.saturating_mul(2u32.saturating_pow(attempt));
        tokio::time::sleep(delay).await;
    }
}

fn retry_after(headers: &HeaderMap) -> Duration {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_RETRY_AFTER)
}
