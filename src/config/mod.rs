//! Relay configuration
//!
//! Layers, lowest precedence first:
//! 1. built-in defaults (or the hosted constants for `serve`)
//! 2. an optional JSON5 file, applied as a merge patch
//! 3. process environment
//!
//! The hosted adapter takes its model settings from fixed constants; the direct
//! adapter reads them from `GOOGLE_CLOUD_PROJECT`, `GOOGLE_CLOUD_LOCATION`,
//! `GOOGLE_GENAI_USE_VERTEXAI` and `MODEL_NAME`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::auth::AuthConfig;
use crate::logging::{LogFormat, LoggingConfig};
use crate::media::fetch::FetchConfig;

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 8080;

/// Default bind address.
pub const DEFAULT_BIND: &str = "0.0.0.0";

/// Default Gemini Developer API base URL.
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Metadata server endpoint for the execution identity's access token.
pub const DEFAULT_METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Default model call timeout (120 seconds).
pub const DEFAULT_MODEL_TIMEOUT_MS: u64 = 120_000;

/// Hosted adapter constants.
pub const HOSTED_PROJECT: &str = "project-id";
pub const HOSTED_LOCATION: &str = "project-location";
pub const HOSTED_MODEL_NAME: &str = "gemini-2.5-flash-lite";

/// Image analyzed by `modrelay analyze` when no reference is given.
pub const DEFAULT_IMAGE_REFERENCE: &str =
    "https://storage.googleapis.com/putra_image_content_moderation_1/protests.jpg";

/// Placeholder for redacted values.
const REDACTED: &str = "[REDACTED]";

/// Keys (lowercased, exact match) whose values are never printed.
const SECRET_KEYS: &[&str] = &["apikey", "api_key", "token", "secret", "password"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },
}

/// Where model settings come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelSource {
    /// Fixed constants baked into the hosted adapter
    Hosted,
    /// Process environment (direct/console adapter)
    Environment,
}

/// Model backend settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelConfig {
    pub project: Option<String>,
    pub location: Option<String>,
    /// Use Vertex AI instead of the Gemini Developer API
    pub use_vertexai: bool,
    pub model_name: Option<String>,
    /// Developer API key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub base_url: String,
    /// Override for the regional Vertex AI host
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vertex_base_url: Option<String>,
    pub metadata_token_url: String,
    pub timeout_ms: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            project: None,
            location: None,
            use_vertexai: false,
            model_name: None,
            api_key: None,
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            vertex_base_url: None,
            metadata_token_url: DEFAULT_METADATA_TOKEN_URL.to_string(),
            timeout_ms: DEFAULT_MODEL_TIMEOUT_MS,
        }
    }
}

impl ModelConfig {
    /// Settings used by the hosted HTTP adapter.
    pub fn hosted() -> Self {
        Self {
            project: Some(HOSTED_PROJECT.to_string()),
            location: Some(HOSTED_LOCATION.to_string()),
            use_vertexai: true,
            model_name: Some(HOSTED_MODEL_NAME.to_string()),
            ..Self::default()
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

/// Root configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelayConfig {
    pub model: ModelConfig,
    pub server: ServerConfig,
    pub fetch: FetchConfig,
    pub logging: LoggingConfig,
    pub auth: AuthConfig,
    /// Reference analyzed by the direct adapter when none is given
    pub image_reference: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            server: ServerConfig::default(),
            fetch: FetchConfig::default(),
            logging: LoggingConfig::default(),
            auth: AuthConfig::default(),
            image_reference: DEFAULT_IMAGE_REFERENCE.to_string(),
        }
    }
}

impl RelayConfig {
    /// Starting point for the given model source, before file and environment.
    pub fn base(source: ModelSource) -> Self {
        match source {
            ModelSource::Hosted => Self {
                model: ModelConfig::hosted(),
                ..Self::default()
            },
            ModelSource::Environment => Self::default(),
        }
    }

    /// Resolve configuration from the process environment and an optional file.
    pub fn load(source: ModelSource, path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::base(source);
        if let Some(path) = path {
            config = config.merge_file(path)?;
        }
        config.apply_env(source, |key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply a JSON5 file on top of this configuration.
    pub fn merge_file(self, path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        self.merge_str(&raw).map_err(|reason| ConfigError::Parse {
            path: path.to_path_buf(),
            reason,
        })
    }

    fn merge_str(self, raw: &str) -> Result<Self, String> {
        let patch = json5::from_str::<Value>(raw).map_err(|e| e.to_string())?;
        if !patch.is_object() {
            return Err("config root must be an object".to_string());
        }
        let base = serde_json::to_value(&self).map_err(|e| e.to_string())?;
        serde_json::from_value(merge_patch(base, patch)).map_err(|e| e.to_string())
    }

    /// Apply environment overrides. `lookup` is injectable for tests.
    pub fn apply_env<F>(&mut self, source: ModelSource, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if source == ModelSource::Environment {
            if let Some(v) = get("GOOGLE_CLOUD_PROJECT") {
                self.model.project = Some(v);
            }
            if let Some(v) = get("GOOGLE_CLOUD_LOCATION") {
                self.model.location = Some(v);
            }
            if let Some(v) = get("GOOGLE_GENAI_USE_VERTEXAI") {
                self.model.use_vertexai = parse_flag("GOOGLE_GENAI_USE_VERTEXAI", &v)?;
            }
            if let Some(v) = get("MODEL_NAME") {
                self.model.model_name = Some(v);
            }
            if let Some(v) = get("MODRELAY_IMAGE_REFERENCE") {
                self.image_reference = v;
            }
        }

        // Secrets and ambient settings apply to every adapter.
        if let Some(v) = get("GOOGLE_API_KEY") {
            self.model.api_key = Some(v);
        }
        if let Some(v) = get("GEMINI_BASE_URL") {
            self.model.base_url = v;
        }
        if let Some(v) = get("MODRELAY_BIND") {
            self.server.bind = v;
        }
        if let Some(v) = get("MODRELAY_PORT") {
            self.server.port = v.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "MODRELAY_PORT".to_string(),
                value: v.clone(),
            })?;
        }
        if let Some(v) = get("MODRELAY_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = get("MODRELAY_LOG_FORMAT") {
            self.logging.format =
                v.parse::<LogFormat>()
                    .map_err(|_| ConfigError::InvalidValue {
                        key: "MODRELAY_LOG_FORMAT".to_string(),
                        value: v.clone(),
                    })?;
        }
        Ok(())
    }

    /// JSON view with secrets redacted, for `config show`.
    pub fn redacted(&self) -> Value {
        redact_secrets(serde_json::to_value(self).unwrap_or(Value::Null))
    }
}

/// Parse a boolean flag leniently (`true/false/1/0/yes/no/on/off`).
pub fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

/// RFC 7386 merge patch.
fn merge_patch(base: Value, patch: Value) -> Value {
    match (base, patch) {
        (_, Value::Null) => Value::Null,
        (Value::Object(mut base_map), Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                if patch_value.is_null() {
                    base_map.remove(&key);
                } else {
                    let base_value = base_map.remove(&key).unwrap_or(Value::Null);
                    let merged = merge_patch(base_value, patch_value);
                    base_map.insert(key, merged);
                }
            }
            Value::Object(base_map)
        }
        (_, patch_value) => patch_value,
    }
}

/// Redact known secret keys in a JSON value (recursive).
fn redact_secrets(mut value: Value) -> Value {
    match &mut value {
        Value::Object(map) => {
            let keys: Vec<String> = map.keys().cloned().collect();
            for key in keys {
                let lower = key.to_lowercase();
                if SECRET_KEYS.contains(&lower.as_str()) {
                    map.insert(key, Value::String(REDACTED.to_string()));
                } else if let Some(child) = map.remove(&key) {
                    map.insert(key, redact_secrets(child));
                }
            }
        }
        Value::Array(arr) => {
            for item in arr.iter_mut() {
                *item = redact_secrets(item.take());
            }
        }
        _ => {}
    }
    value
}
