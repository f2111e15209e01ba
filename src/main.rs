//! Politiko CLI - profiles of Philippine public figures
//!
//! The application logic is contained in lib.rs, and this file is responsible
//! for parsing arguments and handling top-level errors.

use clap::{Parser, Subcommand};
use politiko::server::{self, AppState};
use politiko::{logging, Config, Subject, Topic};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "politiko")]
#[command(author, version, about = "Profiles of Philippine public figures via LLM search", long_about = None)]
struct Cli {
    /// Config file (defaults to politiko.toml in cwd or ~/.config/politiko)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(short, long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Address to bind
        #[arg(short, long)]
        bind: Option<String>,
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Print the (cached) summary for a person as JSON
    Summary {
        name: String,
        #[arg(long)]
        province: Option<String>,
        #[arg(long)]
        municipality: Option<String>,
    },
    /// Print a single topic record as JSON, bypassing the cache
    Topic {
        /// cases, dynasty, career, projects, bills, education, names or desc
        topic: Topic,
        name: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    dotenv::dotenv().ok();
    logging::init_logging(cli.log_file.as_deref())?;

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command.unwrap_or(Commands::Serve {
        bind: None,
        port: None,
    }) {
        Commands::Serve { bind, port } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
            let state = AppState::from_config(&config)?;
            server::serve(addr, state).await?;
        }
        Commands::Summary {
            name,
            province,
            municipality,
        } => {
            let state = AppState::from_config(&config)?;
            let subject = Subject::new(name).with_locality(province, municipality);
            let summary = state.summaries.get_or_compute(&subject).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Topic { topic, name } => {
            let state = AppState::from_config(&config)?;
            let record = state
                .summaries
                .source()
                .fetch(topic, &Subject::new(name))
                .await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
    }

    Ok(())
}
