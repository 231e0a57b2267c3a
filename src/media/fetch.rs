//! Image retrieval from URLs and local paths.
//!
//! Remote references are fetched with a single GET; bodies are streamed with a
//! size cap. The MIME type comes from `Content-Type` (remote) or the file
//! extension (local) when either names a supported image type, and otherwise
//! falls back to `image/jpeg`. That fallback is a known simplification: bytes
//! are never sniffed.
//!
//! By default the fetcher is remote-only and SSRF-guarded:
//! - local paths and `file://` URLs are refused unless `allowLocal` is set
//! - loopback, private, link-local (cloud metadata) and unspecified addresses
//!   are refused, both as literal hosts and after DNS resolution
//! - redirects are not followed

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// MIME type assumed when the reference carries no usable type information.
pub const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

/// Default total timeout for a remote fetch (30 seconds).
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 30_000;

/// Default connect timeout for a remote fetch (10 seconds).
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Default maximum image size (20 MiB).
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 20 * 1024 * 1024;

/// Errors that can occur while fetching an image.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("invalid image reference: {0}")]
    InvalidReference(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("HTTP {status}: {reason}")]
    Status { status: u16, reason: String },

    #[error("image exceeds the {limit} byte limit")]
    TooLarge { limit: usize },

    #[error("image data is empty")]
    Empty,

    #[error("failed to read {path}: {reason}")]
    Io { path: String, reason: String },
}

/// Raw image bytes plus their MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAsset {
    pub bytes: Bytes,
    pub mime_type: String,
}

impl ImageAsset {
    pub fn new(bytes: impl Into<Bytes>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Fetch configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FetchConfig {
    pub timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub max_bytes: usize,
    /// Accept local paths and `file://` URLs (direct adapter only)
    pub allow_local: bool,
    /// Accept loopback/private/link-local hosts
    pub allow_private_hosts: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_FETCH_TIMEOUT_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            max_bytes: DEFAULT_MAX_IMAGE_BYTES,
            allow_local: false,
            allow_private_hosts: false,
        }
    }
}

/// Retrieves image bytes for a reference.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, reference: &str) -> Result<ImageAsset, FetchError>;
}

/// A parsed image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageReference {
    Remote(Url),
    Local(PathBuf),
}

impl ImageReference {
    pub fn parse(reference: &str) -> Result<Self, FetchError> {
        let trimmed = reference.trim();
        if trimmed.is_empty() {
            return Err(FetchError::InvalidReference(
                "reference must not be empty".to_string(),
            ));
        }

        match Url::parse(trimmed) {
            Ok(url) => match url.scheme() {
                "http" | "https" => Ok(ImageReference::Remote(url)),
                "file" => url.to_file_path().map(ImageReference::Local).map_err(|_| {
                    FetchError::InvalidReference(format!("not a local file URL: {trimmed}"))
                }),
                // Windows drive letters parse as one-letter schemes.
                scheme if scheme.len() == 1 => Ok(ImageReference::Local(PathBuf::from(trimmed))),
                scheme => Err(FetchError::InvalidReference(format!(
                    "unsupported scheme: {scheme}"
                ))),
            },
            Err(_) => Ok(ImageReference::Local(PathBuf::from(trimmed))),
        }
    }
}

/// Fetches HTTP(S) URLs with reqwest and local paths from disk.
#[derive(Debug, Clone)]
pub struct ReferenceFetcher {
    client: reqwest::Client,
    max_bytes: usize,
    allow_local: bool,
    allow_private_hosts: bool,
}

impl ReferenceFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.timeout_ms))
            .redirect(reqwest::redirect::Policy::none());
        if !config.allow_private_hosts {
            builder = builder.dns_resolver(Arc::new(GuardedResolver));
        }
        let client = builder
            .build()
            .map_err(|e| FetchError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            max_bytes: config.max_bytes,
            allow_local: config.allow_local,
            allow_private_hosts: config.allow_private_hosts,
        })
    }

    /// Refuse hosts that point back into the relay's own network.
    fn check_remote_host(&self, url: &Url) -> Result<(), FetchError> {
        if self.allow_private_hosts {
            return Ok(());
        }
        let blocked = match url.host() {
            Some(url::Host::Ipv4(ip)) => is_blocked_addr(IpAddr::V4(ip)),
            Some(url::Host::Ipv6(ip)) => is_blocked_addr(IpAddr::V6(ip)),
            Some(url::Host::Domain(domain)) => {
                let domain = domain.trim_end_matches('.').to_ascii_lowercase();
                domain == "localhost" || domain.ends_with(".localhost")
            }
            None => true,
        };
        if blocked {
            return Err(FetchError::InvalidReference(format!(
                "host is not allowed: {}",
                url.host_str().unwrap_or("")
            )));
        }
        Ok(())
    }

    async fn fetch_remote(&self, url: Url) -> Result<ImageAsset, FetchError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("unknown").to_string(),
            });
        }

        if let Some(len) = response.content_length() {
            if len > self.max_bytes as u64 {
                return Err(FetchError::TooLarge {
                    limit: self.max_bytes,
                });
            }
        }

        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(normalize_image_mime)
            .unwrap_or(DEFAULT_IMAGE_MIME)
            .to_string();

        let mut buf = BytesMut::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| FetchError::Request(format!("failed to read body: {e}")))?
        {
            if buf.len() + chunk.len() > self.max_bytes {
                return Err(FetchError::TooLarge {
                    limit: self.max_bytes,
                });
            }
            buf.extend_from_slice(&chunk);
        }

        Ok(ImageAsset::new(buf.freeze(), mime_type))
    }

    async fn fetch_local(&self, path: &Path) -> Result<ImageAsset, FetchError> {
        let io_err = |e: std::io::Error| FetchError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        };

        let metadata = tokio::fs::metadata(path).await.map_err(io_err)?;
        if metadata.len() > self.max_bytes as u64 {
            return Err(FetchError::TooLarge {
                limit: self.max_bytes,
            });
        }
        let data = tokio::fs::read(path).await.map_err(io_err)?;

        let mime_type = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(mime_from_extension)
            .unwrap_or(DEFAULT_IMAGE_MIME);

        Ok(ImageAsset::new(data, mime_type))
    }
}

#[async_trait]
impl ImageFetcher for ReferenceFetcher {
    async fn fetch(&self, reference: &str) -> Result<ImageAsset, FetchError> {
        let asset = match ImageReference::parse(reference)? {
            ImageReference::Remote(url) => {
                self.check_remote_host(&url)?;
                self.fetch_remote(url).await?
            }
            ImageReference::Local(_) if !self.allow_local => {
                return Err(FetchError::InvalidReference(
                    "only http(s) URLs are accepted".to_string(),
                ));
            }
            ImageReference::Local(path) => self.fetch_local(&path).await?,
        };

        if asset.is_empty() {
            return Err(FetchError::Empty);
        }

        tracing::debug!(
            bytes = asset.len(),
            mime_type = %asset.mime_type,
            "fetched image"
        );
        Ok(asset)
    }
}

/// Whether an address is loopback, private, link-local, CGNAT, unspecified or
/// broadcast. IPv4-mapped IPv6 addresses are checked as IPv4.
pub fn is_blocked_addr(addr: IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => {
            let octets = v4.octets();
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
                || (octets[0] == 100 && (octets[1] & 0xc0) == 64)
        }
        IpAddr::V6(v6) => {
            if let Some(v4) = v6.to_ipv4_mapped() {
                return is_blocked_addr(IpAddr::V4(v4));
            }
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                || (first & 0xfe00) == 0xfc00
                || (first & 0xffc0) == 0xfe80
        }
    }
}

/// DNS resolver that fails when a name resolves to a blocked address. The
/// connection uses the addresses checked here, so a second lookup cannot
/// rebind the name.
#[derive(Debug, Default)]
struct GuardedResolver;

impl reqwest::dns::Resolve for GuardedResolver {
    fn resolve(&self, name: reqwest::dns::Name) -> reqwest::dns::Resolving {
        Box::pin(resolve_guarded(name.as_str().to_string()))
    }
}

async fn resolve_guarded(
    host: String,
) -> Result<reqwest::dns::Addrs, Box<dyn std::error::Error + Send + Sync>> {
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host.as_str(), 0))
        .await?
        .collect();
    if let Some(addr) = addrs.iter().find(|a| is_blocked_addr(a.ip())) {
        tracing::warn!(host = %host, address = %addr.ip(), "refused blocked address");
        return Err(format!("{host} resolves to blocked address {}", addr.ip()).into());
    }
    Ok(Box::new(addrs.into_iter()))
}

/// Normalize a `Content-Type` value to a supported image MIME type.
pub fn normalize_image_mime(content_type: &str) -> Option<&'static str> {
    let lower = content_type.to_lowercase();
    // Strip any parameters (e.g., "image/jpeg; charset=utf-8")
    let base = lower.split(';').next().unwrap_or("").trim();
    match base {
        "image/jpeg" | "image/jpg" => Some("image/jpeg"),
        "image/png" => Some("image/png"),
        "image/gif" => Some("image/gif"),
        "image/webp" => Some("image/webp"),
        _ => None,
    }
}

fn mime_from_extension(ext: &str) -> Option<&'static str> {
    match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}
