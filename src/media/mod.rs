//! Media module
//!
//! - **ReferenceFetcher**: image bytes from HTTP(S) URLs or local paths, with
//!   a size cap and MIME detection from `Content-Type` or the file extension
//! - **GeminiModelClient**: one `generateContent` call per image, behind the
//!   [`ModerationModel`] trait so tests can substitute a stub
//! - **ModelClientHandle**: the process-wide, read-only model client
//!
//! # Example
//!
//! ```ignore
//! use moderation_relay::media::{ImageFetcher, ReferenceFetcher, FetchConfig};
//!
//! let fetcher = ReferenceFetcher::new(&FetchConfig::default())?;
//! let asset = fetcher.fetch("https://example.com/image.png").await?;
//! println!("{} bytes of {}", asset.len(), asset.mime_type);
//! ```

pub mod analysis;
pub mod fetch;

pub use analysis::{GeminiModelClient, ModelClientHandle, ModelError, ModerationModel};
pub use fetch::{
    FetchConfig, FetchError, ImageAsset, ImageFetcher, ImageReference, ReferenceFetcher,
    DEFAULT_FETCH_TIMEOUT_MS, DEFAULT_IMAGE_MIME, DEFAULT_MAX_IMAGE_BYTES,
};
