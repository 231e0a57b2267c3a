//! CLI subcommand definitions and handlers.
//!
//! Uses clap derive to define the subcommand hierarchy:
//! - `serve` (default) -- run the HTTP adapter
//! - `analyze` -- run the pipeline in-process and print the verdict
//! - `call` -- send an image to a deployed relay with a bearer token
//! - `config show` -- print the resolved configuration (secrets redacted)
//! - `version` -- print build/version info

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::auth::CommandTokenProvider;
use crate::client::{ClientError, RelayClient};
use crate::config::{ModelSource, RelayConfig};
use crate::media::{ModelClientHandle, ReferenceFetcher};
use crate::moderation::{ModerationPipeline, ModerationRequest, ModerationVerdict, PipelineError};
use crate::server::{self, AppState};

/// Image moderation relay.
#[derive(Parser, Debug)]
#[command(
    name = "modrelay",
    version = env!("CARGO_PKG_VERSION"),
    about = "Forward images to a multimodal model and return a moderation verdict"
)]
pub struct Cli {
    /// Path to a JSON5 configuration file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP adapter (default when no subcommand is given).
    Serve {
        /// Address to bind (default: from config or 0.0.0.0).
        #[arg(long)]
        bind: Option<String>,

        /// Port to listen on (default: from config or 8080).
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Analyze one image in-process and print the verdict.
    Analyze {
        /// Image URL or local path (default: from config).
        #[arg(short, long)]
        image: Option<String>,
    },

    /// Send an image URL to a deployed relay.
    Call {
        /// Full URL of the relay endpoint.
        #[arg(long)]
        api_url: String,

        /// Public URL of the image to analyze.
        #[arg(short, long)]
        image: String,
    },

    /// Inspect configuration.
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Print version, build date, and git commit information.
    Version,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the resolved configuration (secrets redacted) as JSON.
    Show {
        /// Resolve as the hosted adapter would instead of the direct one.
        #[arg(long)]
        hosted: bool,
    },
}

impl Command {
    /// Which model settings this command runs with.
    pub fn model_source(&self) -> ModelSource {
        match self {
            Command::Serve { .. } => ModelSource::Hosted,
            Command::Config(ConfigCommand::Show { hosted: true }) => ModelSource::Hosted,
            _ => ModelSource::Environment,
        }
    }
}

// ---------------------------------------------------------------------------
// Subcommand handlers
// ---------------------------------------------------------------------------

/// Build the pipeline from resolved configuration.
pub fn build_pipeline(config: &RelayConfig) -> Result<ModerationPipeline, Box<dyn std::error::Error>> {
    let fetcher = ReferenceFetcher::new(&config.fetch)?;
    let model = ModelClientHandle::initialize(&config.model);
    Ok(ModerationPipeline::new(Arc::new(fetcher), model))
}

/// Run the `serve` subcommand.
pub async fn handle_serve(
    mut config: RelayConfig,
    bind: Option<String>,
    port: Option<u16>,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(bind) = bind {
        config.server.bind = bind;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    let pipeline = build_pipeline(&config)?;
    server::run_server(&config.server, AppState::new(pipeline)).await?;
    Ok(())
}

/// Console adapter: run one request, print the verdict or the error, and hand
/// the outcome back to the caller.
pub async fn run_direct(
    pipeline: &ModerationPipeline,
    reference: &str,
) -> Result<ModerationVerdict, PipelineError> {
    let result = pipeline.process(&ModerationRequest::new(reference)).await;
    match &result {
        Ok(verdict) => match serde_json::to_string_pretty(verdict) {
            Ok(pretty) => println!("{}", pretty),
            Err(e) => eprintln!("Failed to render verdict: {}", e),
        },
        Err(err) => {
            eprintln!("Error ({}): {}", err.kind(), err);
            if let Some(raw) = err.raw_response() {
                eprintln!("  Raw response: {}", raw);
            }
        }
    }
    result
}

/// Run the `analyze` subcommand.
pub async fn handle_analyze(
    mut config: RelayConfig,
    image: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    // Local paths are accepted from the console only.
    config.fetch.allow_local = true;
    let reference = image.unwrap_or_else(|| config.image_reference.clone());
    let pipeline = build_pipeline(&config)?;
    if run_direct(&pipeline, &reference).await.is_err() {
        std::process::exit(1);
    }
    Ok(())
}

/// Run the `call` subcommand.
pub async fn handle_call(
    config: RelayConfig,
    api_url: &str,
    image: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let tokens = CommandTokenProvider::from_config(&config.auth)?;
    let client = RelayClient::new(api_url, Arc::new(tokens))?;

    println!("Sending request to API for image: {}", image);
    match client.analyze(image).await {
        Ok(body) => {
            println!("Request successful!");
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        Err(ClientError::Auth(e)) => {
            eprintln!("Error: failed to get an identity token.");
            eprintln!("   Make sure the credential CLI is installed and authenticated.");
            eprintln!("   Details: {}", e);
            std::process::exit(1);
        }
        Err(ClientError::Status {
            status,
            reason,
            body,
        }) => {
            eprintln!("HTTP Error: {} {}", status, reason);
            eprintln!("   Response Body: {}", body);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("An unexpected error occurred: {}", e);
            std::process::exit(1);
        }
    }
    Ok(())
}

/// Run the `config show` subcommand.
pub fn handle_config_show(config: &RelayConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(&config.redacted())?);
    Ok(())
}

/// Run the `version` subcommand.
pub fn handle_version() {
    println!("modrelay {}", env!("CARGO_PKG_VERSION"));
    println!("  Build date: {}", env!("MODRELAY_BUILD_DATE"));
    println!("  Git commit: {}", env!("MODRELAY_GIT_HASH"));
    println!(
        "  Platform:   {} ({})",
        std::env::consts::OS,
        std::env::consts::ARCH
    );
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
