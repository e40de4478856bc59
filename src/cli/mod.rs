use anyhow::Result;
use clap::{Parser, Subcommand};

pub mod chat;
pub mod migrate;
pub mod serve;

use crate::core::{AppConfig, SinkKind};

#[derive(Subcommand)]
enum Command {
    /// Create or update the db schema
    Migrate {},
    /// Run the API server and web UI
    Serve {
        /// Set the server host address
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Set the server port
        #[arg(long, default_value = "2222")]
        port: String,
    },
    /// Start a chat session in the terminal
    Chat {
        /// Where `/save` writes the conversation (overrides IDEABOT_SINK)
        #[arg(long, value_enum)]
        sink: Option<SinkKind>,
    },
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

pub async fn run() -> Result<()> {
    let args = Cli::parse();

    // Handle each sub command
    match args.command {
        Some(Command::Migrate {}) => {
            migrate::run(&AppConfig::db_path_from_env()).await?;
        }
        Some(Command::Serve { host, port }) => {
            let config = AppConfig::from_env()?;
            serve::run(host, port, config).await?;
        }
        Some(Command::Chat { sink }) => {
            let mut config = AppConfig::from_env()?;
            if let Some(sink) = sink {
                config.sink = sink;
            }
            chat::run(config).await?;
        }
        None => {}
    }

    Ok(())
}
