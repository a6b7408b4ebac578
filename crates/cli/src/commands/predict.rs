//! Prediction command and input file parsing

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{format_values, print_info, print_json, print_table, OutputFormat};

/// How an input file encodes sequences
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum InputFormat {
    /// `{"sequences": [[..], ..]}` or a bare array of arrays
    Json,
    /// One sequence per line, comma-separated
    Csv,
}

impl InputFormat {
    /// Guess from the file extension, defaulting to JSON
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => InputFormat::Csv,
            _ => InputFormat::Json,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonInput {
    Wrapped { sequences: Vec<Vec<f64>> },
    Bare(Vec<Vec<f64>>),
}

/// Parse sequences from JSON text
pub fn parse_json(raw: &str) -> Result<Vec<Vec<f64>>> {
    let input: JsonInput = serde_json::from_str(raw)
        .context("Expected {\"sequences\": [[numbers]]} or [[numbers]]")?;
    Ok(match input {
        JsonInput::Wrapped { sequences } => sequences,
        JsonInput::Bare(sequences) => sequences,
    })
}

/// Parse sequences from CSV text; blank lines and `#` comments are skipped
pub fn parse_csv(raw: &str) -> Result<Vec<Vec<f64>>> {
    let mut sequences = Vec::new();
    for (line_no, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let sequence = line
            .split(',')
            .map(|field| field.trim().parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("Line {}: expected comma-separated numbers", line_no + 1))?;
        sequences.push(sequence);
    }
    Ok(sequences)
}

pub fn read_sequences(path: &Path, format: Option<InputFormat>) -> Result<Vec<Vec<f64>>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let sequences = match format.unwrap_or_else(|| InputFormat::from_path(path)) {
        InputFormat::Json => parse_json(&raw)?,
        InputFormat::Csv => parse_csv(&raw)?,
    };
    if sequences.is_empty() {
        bail!("{} contains no sequences", path.display());
    }
    Ok(sequences)
}

#[derive(Tabled, Serialize)]
struct ForecastRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Steps")]
    steps: usize,
    #[tabled(rename = "Forecast")]
    forecast: String,
}

/// Send the sequences in `path` to `/predict` and print the forecasts
pub async fn run_predict(
    client: &ApiClient,
    path: &Path,
    input_format: Option<InputFormat>,
    format: OutputFormat,
) -> Result<()> {
    let sequences = read_sequences(path, input_format)?;
    let response = client.predict(sequences).await?;

    match format {
        OutputFormat::Json => print_json(&response),
        OutputFormat::Table => {
            if let Some(version) = &response.model_version {
                print_info(&format!("Model version {}", version));
            }
            let rows: Vec<ForecastRow> = response
                .predictions
                .iter()
                .enumerate()
                .map(|(index, values)| ForecastRow {
                    index,
                    steps: values.len(),
                    forecast: format_values(values, 6),
                })
                .collect();
            print_table(&rows, OutputFormat::Table);
        }
    }

    Ok(())
}
