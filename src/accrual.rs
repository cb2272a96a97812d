use std::time::Duration;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use reqwest::{header, StatusCode};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccrualStatus {
    Registered,
    Invalid,
    Processing,
    Processed,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AccrualOrderInfo {
    pub order: String,
    pub status: AccrualStatus,
    #[serde(default, deserialize_with = "crate::amount::deserialize_option")]
    pub accrual: Option<BigDecimal>,
}

#[derive(Error, Debug)]
pub enum AccrualError {
    #[error("accrual service did not answer within {0:?}")]
    Timeout(Duration),

    #[error("accrual service rate limit, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("accrual service returned status {0}")]
    UnexpectedStatus(u16),

    #[error("accrual service request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("accrual service response could not be decoded: {0}")]
    Decode(String),
}

/// Client side of the external accrual service.
///
/// `Ok(None)` means the service does not know the order (yet).
#[async_trait]
pub trait AccrualClient: Send + Sync {
    async fn order_info(&self, order_number: &str) -> Result<Option<AccrualOrderInfo>, AccrualError>;
}

#[derive(Debug, Clone)]
pub struct HttpAccrualClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpAccrualClient {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, AccrualError> {
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

fn retry_after(headers: &header::HeaderMap) -> Option<Duration> {
    headers
        .get(header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[async_trait]
impl AccrualClient for HttpAccrualClient {
    async fn order_info(&self, order_number: &str) -> Result<Option<AccrualOrderInfo>, AccrualError> {
        let url = format!("{}/api/orders/{}", self.base_url, order_number);
        let response = self.client.get(&url).send().await?;

        match response.status() {
            StatusCode::OK => {
                let body = response.bytes().await?;
                let info: AccrualOrderInfo =
                    serde_json::from_slice(&body).map_err(|e| AccrualError::Decode(e.to_string()))?;
                if info.order != order_number {
                    return Err(AccrualError::Decode(format!(
                        "asked for order {order_number}, got {}",
                        info.order
                    )));
                }
                Ok(Some(info))
            }
            StatusCode::NO_CONTENT => Ok(None),
            StatusCode::TOO_MANY_REQUESTS => Err(AccrualError::RateLimited {
                retry_after: retry_after(response.headers()),
            }),
            other => Err(AccrualError::UnexpectedStatus(other.as_u16())),
        }
    }
}
