//! Multimodal model invocation.
//!
//! Sends one image plus a fixed instruction block to a Gemini
//! `generateContent` endpoint and returns the raw text of the first candidate.
//! Two backends are supported:
//!
//! - **Developer API**: `x-goog-api-key` authentication
//! - **Vertex AI**: bearer token for the execution identity, taken from the
//!   instance metadata server
//!
//! The process-wide [`ModelClientHandle`] is built once at startup and shared
//! read-only across requests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use thiserror::Error;

use crate::config::ModelConfig;
use crate::media::fetch::ImageAsset;

/// Errors that can occur while invoking the model.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("model client is not initialized: {0}")]
    Unavailable(String),

    #[error("response was blocked by the model backend: {0}")]
    Blocked(String),

    #[error("model request failed: {0}")]
    Request(String),

    #[error("model backend returned {status}: {body}")]
    ApiResponse { status: u16, body: String },

    #[error("failed to parse model response: {0}")]
    ParseResponse(String),
}

/// A single-shot multimodal model call.
#[async_trait]
pub trait ModerationModel: Send + Sync {
    /// Send the image and instructions; return the first candidate's text verbatim.
    async fn invoke(&self, asset: &ImageAsset, instructions: &str) -> Result<String, ModelError>;

    /// Model identifier, for logging.
    fn model_name(&self) -> &str;
}

enum BackendAuth {
    ApiKey(String),
    ExecutionIdentity { token_url: String },
}

/// Gemini `generateContent` client.
pub struct GeminiModelClient {
    client: reqwest::Client,
    endpoint: String,
    auth: BackendAuth,
    model: String,
}

impl std::fmt::Debug for GeminiModelClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let auth = match &self.auth {
            BackendAuth::ApiKey(_) => "api_key(***)",
            BackendAuth::ExecutionIdentity { .. } => "execution_identity",
        };
        f.debug_struct("GeminiModelClient")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("auth", &auth)
            .finish()
    }
}

impl GeminiModelClient {
    /// Build a client from configuration.
    ///
    /// Fails with [`ModelError::Unavailable`] when a required setting is
    /// missing: the model name always, the API key in developer mode, and
    /// project plus location in Vertex mode.
    pub fn from_config(config: &ModelConfig) -> Result<Self, ModelError> {
        let model = required(config.model_name.as_deref(), "model name")?.to_string();

        let (endpoint, auth) = if config.use_vertexai {
            let project = required(config.project.as_deref(), "project")?;
            let location = required(config.location.as_deref(), "location")?;
            let base = config
                .vertex_base_url
                .clone()
                .unwrap_or_else(|| format!("https://{location}-aiplatform.googleapis.com"));
            (
                vertex_endpoint(&base, project, location, &model),
                BackendAuth::ExecutionIdentity {
                    token_url: config.metadata_token_url.clone(),
                },
            )
        } else {
            let api_key = required(config.api_key.as_deref(), "API key")?.to_string();
            (
                developer_endpoint(&config.base_url, &model),
                BackendAuth::ApiKey(api_key),
            )
        };

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| ModelError::Unavailable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            auth,
            model,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn execution_identity_token(&self, token_url: &str) -> Result<String, ModelError> {
        let response = self
            .client
            .get(token_url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| ModelError::Request(format!("metadata token request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable>".to_string());
            return Err(ModelError::Request(format!(
                "metadata server returned {}: {}",
                status.as_u16(),
                body
            )));
        }

        let token: MetadataToken = response
            .json()
            .await
            .map_err(|e| ModelError::Request(format!("invalid metadata token response: {e}")))?;
        Ok(token.access_token)
    }
}

#[async_trait]
impl ModerationModel for GeminiModelClient {
    async fn invoke(&self, asset: &ImageAsset, instructions: &str) -> Result<String, ModelError> {
        let body = build_request_body(asset, instructions);

        let request = self.client.post(&self.endpoint).json(&body);
        let request = match &self.auth {
            BackendAuth::ApiKey(key) => request.header("x-goog-api-key", key),
            BackendAuth::ExecutionIdentity { token_url } => {
                let token = self.execution_identity_token(token_url).await?;
                request.bearer_auth(token)
            }
        };

        let response = request
            .send()
            .await
            .map_err(|e| ModelError::Request(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable>".to_string());
            return Err(ModelError::ApiResponse {
                status: status.as_u16(),
                body: body_text,
            });
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ModelError::ParseResponse(format!("failed to read JSON: {e}")))?;

        if let Some(usage) = &parsed.usage_metadata {
            tracing::debug!(
                model = %self.model,
                total_tokens = usage.total_token_count.unwrap_or(0),
                "model usage"
            );
        }

        extract_candidate_text(parsed)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Process-wide model client handle.
///
/// Constructed once; if construction failed, every request is answered with
/// [`ModelError::Unavailable`] carrying the original reason.
#[derive(Clone)]
pub struct ModelClientHandle {
    inner: Result<Arc<dyn ModerationModel>, String>,
}

impl ModelClientHandle {
    /// Build the Gemini client from configuration, recording any failure.
    pub fn initialize(config: &ModelConfig) -> Self {
        match GeminiModelClient::from_config(config) {
            Ok(client) => {
                tracing::info!(
                    model = %client.model,
                    endpoint = %client.endpoint,
                    "model client initialized"
                );
                Self::ready(Arc::new(client))
            }
            Err(e) => {
                tracing::error!(error = %e, "model client initialization failed");
                Self::unavailable(e.to_string())
            }
        }
    }

    pub fn ready(model: Arc<dyn ModerationModel>) -> Self {
        Self { inner: Ok(model) }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            inner: Err(reason.into()),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.inner.is_ok()
    }

    /// The initialized client, or `Unavailable`.
    pub fn model(&self) -> Result<&Arc<dyn ModerationModel>, ModelError> {
        self.inner
            .as_ref()
            .map_err(|reason| ModelError::Unavailable(reason.clone()))
    }
}

impl std::fmt::Debug for ModelClientHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            Ok(model) => f
                .debug_struct("ModelClientHandle")
                .field("model", &model.model_name())
                .finish(),
            Err(reason) => f
                .debug_struct("ModelClientHandle")
                .field("unavailable", reason)
                .finish(),
        }
    }
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct MetadataToken {
    access_token: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<serde_json::Value>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    total_token_count: Option<u64>,
}

fn required<'a>(value: Option<&'a str>, what: &str) -> Result<&'a str, ModelError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ModelError::Unavailable(format!("{what} is not configured")))
}

fn developer_endpoint(base_url: &str, model: &str) -> String {
    format!(
        "{}/v1beta/models/{}:generateContent",
        base_url.trim_end_matches('/'),
        model
    )
}

fn vertex_endpoint(base_url: &str, project: &str, location: &str, model: &str) -> String {
    format!(
        "{}/v1/projects/{}/locations/{}/publishers/google/models/{}:generateContent",
        base_url.trim_end_matches('/'),
        project,
        location,
        model
    )
}

/// Build the `generateContent` body: the image part first, then the instructions.
fn build_request_body(asset: &ImageAsset, instructions: &str) -> serde_json::Value {
    let b64 = base64::engine::general_purpose::STANDARD.encode(&asset.bytes);
    serde_json::json!({
        "contents": [{
            "role": "user",
            "parts": [
                {
                    "inlineData": {
                        "mimeType": asset.mime_type,
                        "data": b64,
                    }
                },
                {
                    "text": instructions,
                }
            ]
        }]
    })
}

/// Pull the first candidate's text out of a response.
///
/// No candidates means the backend blocked the request outright.
fn extract_candidate_text(response: GenerateContentResponse) -> Result<String, ModelError> {
    let Some(candidate) = response.candidates.into_iter().next() else {
        let feedback = match response.prompt_feedback {
            Some(fb) => describe_feedback(&fb),
            None => "no feedback provided".to_string(),
        };
        return Err(ModelError::Blocked(feedback));
    };

    let text = candidate
        .content
        .map(|c| {
            c.parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<String>()
        })
        .unwrap_or_default();
    Ok(text)
}

fn describe_feedback(feedback: &serde_json::Value) -> String {
    let reason = feedback.get("blockReason").and_then(|v| v.as_str());
    let message = feedback.get("blockReasonMessage").and_then(|v| v.as_str());
    match (reason, message) {
        (Some(r), Some(m)) => format!("{r}: {m}"),
        (Some(r), None) => r.to_string(),
        _ => feedback.to_string(),
    }
}
