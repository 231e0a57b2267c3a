use clap::Parser;

use moderation_relay::cli::{self, Cli, Command, ConfigCommand};
use moderation_relay::config::RelayConfig;
use moderation_relay::logging;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Cli::parse();
    let command = args.command.unwrap_or(Command::Serve {
        bind: None,
        port: None,
    });

    if let Command::Version = command {
        cli::handle_version();
        return Ok(());
    }

    let config = RelayConfig::load(command.model_source(), args.config.as_deref())?;
    logging::init_logging(&config.logging)?;

    match command {
        Command::Serve { bind, port } => cli::handle_serve(config, bind, port).await,
        Command::Analyze { image } => cli::handle_analyze(config, image).await,
        Command::Call { api_url, image } => cli::handle_call(config, &api_url, &image).await,
        Command::Config(ConfigCommand::Show { .. }) => cli::handle_config_show(&config),
        Command::Version => Ok(()),
    }
}
