use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

use super::error::AccrualError;
use super::types::{AccrualReply, AccrualResult};
use super::AccrualSource;
use crate::order_number::OrderNumber;

/// reqwest-backed accrual client
#[derive(Debug, Clone)]
pub struct HttpAccrualClient {
    client: Client,
    base_url: String,
}

impl HttpAccrualClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AccrualError> {
        let base_url = base_url.trim_end_matches('/');
        if base_url.is_empty() {
            return Err(AccrualError::Config("accrual base URL is empty".into()));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AccrualError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// `Retry-After` as integer seconds
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[async_trait]
impl AccrualSource for HttpAccrualClient {
    async fn fetch_accrual(&self, number: &OrderNumber) -> Result<AccrualReply, AccrualError> {
        let url = format!("{}/api/orders/{}", self.base_url, number);
        let response = self
            .client
            .get(&url)
            .header(CONTENT_TYPE, "text/plain")
            .send()
            .await
            .map_err(AccrualError::Transport)?;

        let status = response.status();
        debug!(order = %number, status = status.as_u16(), "Accrual lookup");

        match status {
            StatusCode::OK => {
                let body = response.bytes().await.map_err(AccrualError::Transport)?;
                let result: AccrualResult = serde_json::from_slice(&body)
                    .map_err(|e| AccrualError::Decode(format!("order {}: {}", number, e)))?;
                Ok(AccrualReply::Ready(result))
            }
            StatusCode::NO_CONTENT => Ok(AccrualReply::NotRegistered),
            StatusCode::TOO_MANY_REQUESTS => match parse_retry_after(response.headers()) {
                Some(pause) => Ok(AccrualReply::RateLimited(pause)),
                None => {
                    warn!(order = %number, "429 without usable Retry-After, skipping");
                    Ok(AccrualReply::Skipped)
                }
            },
            StatusCode::INTERNAL_SERVER_ERROR => Err(AccrualError::Server(status)),
            other => Err(AccrualError::UnexpectedStatus(other)),
        }
    }
}
