//! Client for a deployed relay.
//!
//! Mints a bearer token, POSTs `{"image_url": ...}` to the relay and returns
//! the JSON body as received. One attempt; no retries.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::auth::{AuthError, TokenProvider};
use crate::server::http::IMAGE_URL_FIELD;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("request failed: {0}")]
    Request(String),

    #[error("HTTP Error: {status} {reason}")]
    Status {
        status: u16,
        reason: String,
        body: String,
    },

    #[error("failed to decode response: {0}")]
    Decode(String),
}

/// Calls a remote relay on behalf of a caller.
pub struct RelayClient {
    http: reqwest::Client,
    api_url: String,
    tokens: Arc<dyn TokenProvider>,
}

impl RelayClient {
    pub fn new(api_url: impl Into<String>, tokens: Arc<dyn TokenProvider>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(180))
            .build()
            .map_err(|e| ClientError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            api_url: api_url.into(),
            tokens,
        })
    }

    pub async fn analyze(&self, image_url: &str) -> Result<Value, ClientError> {
        let token = self.tokens.token().await?;

        tracing::info!(api_url = %self.api_url, image_url = %image_url, "sending moderation request");
        let response = self
            .http
            .post(&self.api_url)
            .header(reqwest::header::AUTHORIZATION, token.header_value())
            .json(&serde_json::json!({ IMAGE_URL_FIELD: image_url }))
            .send()
            .await
            .map_err(|e| ClientError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable>".to_string());
            return Err(ClientError::Status {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("unknown").to_string(),
                body,
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))
    }
}
