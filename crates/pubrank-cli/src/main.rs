//! pubrank — publication aggregation with journal-ranking enrichment.
//! Entry point for the command-line binary.

mod app;
mod commands;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use pubrank_config::Config;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pubrank", version)]
#[command(about = "Aggregate author publications and enrich them with journal rankings")]
struct Cli {
    /// Config file; defaults to $PUBRANK_CONFIG, then ./pubrank.toml
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Publications per resolved author identifier
    Publications {
        /// Author IDs or account references
        #[arg(required = true)]
        tokens: Vec<String>,
        /// Refresh cache entries older than this many hours
        #[arg(long)]
        max_age_hours: Option<u64>,
    },
    /// Publication counts per year
    Counts {
        #[arg(required = true)]
        tokens: Vec<String>,
    },
    /// Publication counts per best quartile
    Quartiles {
        #[arg(required = true)]
        tokens: Vec<String>,
    },
    /// Ranking of one journal in one year
    Lookup { journal: String, year: i32 },
    /// Drop cached publications for the given identifiers
    Invalidate {
        #[arg(required = true)]
        tokens: Vec<String>,
    },
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    let Some(path) = path else {
        return Ok(Config::load()?);
    };
    let mut config = Config::from_path(path)?;
    config.apply_env(|key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref()).context("loading configuration")?;

    // Logs go to stderr; stdout carries the JSON result
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let output = match &cli.command {
        Command::Lookup { journal, year } => {
            let engine = app::load_ranking(&config);
            commands::lookup(&engine, journal, *year)
        }
        Command::Publications { tokens, max_age_hours } => {
            let service = app::build_service(&config).await?;
            commands::publications(&service, tokens, *max_age_hours).await?
        }
        Command::Counts { tokens } => {
            let service = app::build_service(&config).await?;
            commands::counts(&service, tokens).await?
        }
        Command::Quartiles { tokens } => {
            let service = app::build_service(&config).await?;
            commands::quartiles(&service, tokens).await?
        }
        Command::Invalidate { tokens } => {
            let service = app::build_service(&config).await?;
            commands::invalidate(&service, tokens).await?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
