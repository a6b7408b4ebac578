//! Energy Forecasting CLI
//!
//! A command-line tool for checking the forecast server, inspecting the
//! active model and requesting forecasts from input files.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{metrics, predict, status};
use std::path::PathBuf;

/// Energy Forecasting CLI
#[derive(Parser)]
#[command(name = "forecast")]
#[command(author, version, about = "CLI for the Energy Forecasting server", long_about = None)]
pub struct Cli {
    /// Server URL (can also be set via FORECAST_API_URL env var)
    #[arg(long, env = "FORECAST_API_URL", default_value = "http://localhost:5000")]
    pub api_url: String,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check whether the server has a model ready
    Health,

    /// Show metadata of the active model
    Info,

    /// Forecast the sequences in a JSON or CSV file
    Predict {
        /// Input file (.json or .csv)
        #[arg(long)]
        file: PathBuf,

        /// Input encoding (detected from the extension if not specified)
        #[arg(long, value_enum)]
        input_format: Option<predict::InputFormat>,
    },

    /// Show server metrics
    Metrics {
        /// Only show series containing this text
        #[arg(long)]
        filter: Option<String>,

        /// Print the exposition text unchanged
        #[arg(long)]
        raw: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize client
    let client = client::ApiClient::new(&cli.api_url)?;

    // Execute command
    match cli.command {
        Commands::Health => status::show_health(&client, cli.format).await?,
        Commands::Info => status::show_info(&client, cli.format).await?,
        Commands::Predict { file, input_format } => {
            predict::run_predict(&client, &file, input_format, cli.format).await?
        }
        Commands::Metrics { filter, raw } => {
            metrics::show_metrics(&client, filter, raw, cli.format).await?
        }
    }

    Ok(())
}
