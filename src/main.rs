// SubjectChat - subject tutoring chat backend
// Main entry point

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use subjectchat::config::{load_config, Config};
use subjectchat::logging::init_tracing;
use subjectchat::server::SubjectChatServer;

#[derive(Parser, Debug)]
#[command(name = "subjectchat", version, about = "Subject tutoring chat backend")]
struct Cli {
    /// Path to a TOML config file (defaults to ~/.subjectchat/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default)
    Serve {
        /// Bind address, overrides config
        #[arg(long)]
        bind: Option<String>,
    },
    /// Load and validate configuration, print the redacted result
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;
    init_tracing(cli.debug || config.debug_logging);

    match cli.command.unwrap_or(Command::Serve { bind: None }) {
        Command::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind_address = bind;
            }
            serve(config).await
        }
        Command::Check => check(&config),
    }
}

async fn serve(config: Config) -> Result<()> {
    let server = SubjectChatServer::from_config(&config)?;
    server.serve().await
}

fn check(config: &Config) -> Result<()> {
    config.validate()?;
    let redacted = config.redacted();
    println!("{}", serde_json::to_string_pretty(&redacted)?);
    println!(
        "{} subject override(s), {} track override(s)",
        config.subjects.len(),
        config.tracks.len()
    );
    Ok(())
}
