use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use depository::cli::{self, Cli, Commands};
use depository::config::{ConfigSource, DepositoryConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let (mut config, source) = DepositoryConfig::load_or_default(&cli.config)?;
    config.apply_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level)),
        )
        .init();

    match source {
        ConfigSource::File(path) => info!("config loaded from {}", path),
        ConfigSource::CreatedDefault(path) => info!("config not found, wrote defaults to {}", path),
        ConfigSource::Default => info!("using default config"),
    }

    match cli.command.unwrap_or(Commands::Serve {
        listen: None,
        db_path: None,
    }) {
        Commands::Serve { listen, db_path } => {
            if let Some(listen) = listen {
                config.server.listen_addr = listen;
            }
            if let Some(db_path) = db_path {
                config.storage.db_path = db_path;
            }
            cli::node::serve(config).await
        }
        Commands::Wipe { db_path } => {
            cli::node::wipe(db_path.as_deref().unwrap_or(&config.storage.db_path))?;
            Ok(())
        }
    }
}
