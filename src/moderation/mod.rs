//! Moderation core
//!
//! The pipeline every adapter shares: fetch the image, send it to the model
//! with the fixed instruction block, strip markdown wrapping from the reply and
//! parse it into a [`ModerationVerdict`]. Each failure maps to exactly one
//! [`PipelineError`] variant.

pub mod error;
pub mod instructions;
pub mod pipeline;
pub mod sanitize;
pub mod verdict;

pub use error::PipelineError;
pub use instructions::{InstructionTemplate, VerdictField, MODERATION_INSTRUCTIONS};
pub use pipeline::{ModerationPipeline, ModerationRequest};
pub use sanitize::sanitize;
pub use verdict::{parse_verdict, ModerationVerdict, VerdictParseError};
