//! moderation relay library
//!
//! Fetches an image, asks a multimodal model for a content-safety verdict and
//! returns the verdict as a typed record. The pipeline lives in
//! [`moderation`]; [`server`] and [`cli`] are the two adapters in front of it.

pub mod auth;
pub mod cli;
pub mod client;
pub mod config;
pub mod logging;
pub mod media;
pub mod moderation;
pub mod server;
