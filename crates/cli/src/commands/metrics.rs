//! Metrics command

use anyhow::Result;
use serde::Serialize;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{print_table, OutputFormat};

#[derive(Debug, Clone, PartialEq, Tabled, Serialize)]
pub struct Sample {
    #[tabled(rename = "Series")]
    pub series: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

/// Split exposition text into samples, skipping `#` lines and series not
/// containing `filter`
pub fn parse_exposition(text: &str, filter: Option<&str>) -> Vec<Sample> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter(|line| filter.map_or(true, |f| line.contains(f)))
        .filter_map(|line| {
            let (series, value) = line.rsplit_once(' ')?;
            Some(Sample {
                series: series.to_string(),
                value: value.to_string(),
            })
        })
        .collect()
}

/// Show the server's metrics, optionally filtered by substring
pub async fn show_metrics(
    client: &ApiClient,
    filter: Option<String>,
    raw: bool,
    format: OutputFormat,
) -> Result<()> {
    let text = client.metrics().await?;
    if raw {
        print!("{}", text);
        return Ok(());
    }

    let samples = parse_exposition(&text, filter.as_deref());
    print_table(&samples, format);
    Ok(())
}
