//! Bearer credentials for outbound calls
//!
//! Only the remote invocation path needs a token. The hosted server trusts its
//! own execution identity and never goes through here.

use std::io::ErrorKind;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::Command;

/// Default command that mints an identity token.
pub const DEFAULT_TOKEN_COMMAND: &[&str] = &["gcloud", "auth", "print-identity-token"];

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("credentials unavailable: {0}")]
    Unavailable(String),
}

/// A short-lived bearer credential.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Value for an `Authorization` header.
    pub fn header_value(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("BearerToken").field(&"***").finish()
    }
}

/// Source of bearer tokens. One attempt per call; callers decide on retries.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self) -> Result<BearerToken, AuthError>;
}

/// Token source configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthConfig {
    /// Program and arguments that print a token on stdout
    pub command: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            command: DEFAULT_TOKEN_COMMAND.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Runs an external credential command and returns its trimmed stdout.
#[derive(Debug, Clone)]
pub struct CommandTokenProvider {
    program: String,
    args: Vec<String>,
}

impl CommandTokenProvider {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        let (program, args) = config
            .command
            .split_first()
            .ok_or_else(|| AuthError::Unavailable("no credential command configured".to_string()))?;
        Ok(Self::new(program.clone(), args.to_vec()))
    }

    fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[async_trait]
impl TokenProvider for CommandTokenProvider {
    async fn token(&self) -> Result<BearerToken, AuthError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => AuthError::Unavailable(format!(
                    "`{}` is not installed or not on PATH: {e}",
                    self.program
                )),
                _ => AuthError::Unavailable(format!("failed to run `{}`: {e}", self.command_line())),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::debug!(code = ?output.status.code(), "credential command failed");
            return Err(AuthError::Unavailable(format!(
                "`{}` exited with {}: {}",
                self.command_line(),
                output.status,
                stderr.trim()
            )));
        }

        let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if token.is_empty() {
            return Err(AuthError::Unavailable(format!(
                "`{}` printed an empty token",
                self.command_line()
            )));
        }

        tracing::info!(command = %self.program, "fetched bearer token");
        Ok(BearerToken(token))
    }
}

/// Fixed token, for callers that already hold a credential.
#[derive(Debug, Clone)]
pub struct StaticTokenProvider(BearerToken);

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self(BearerToken::new(token))
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn token(&self) -> Result<BearerToken, AuthError> {
        Ok(self.0.clone())
    }
}
