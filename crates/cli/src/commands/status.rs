//! Health and model info commands

use anyhow::Result;
use serde::Serialize;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{
    color_status, format_timestamp, print_json, print_success, print_table, print_warning,
    OutputFormat,
};

#[derive(Tabled, Serialize)]
struct InfoRow {
    #[tabled(rename = "Field")]
    field: String,
    #[tabled(rename = "Value")]
    value: String,
}

/// Show server readiness
pub async fn show_health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let (status, health) = client.health().await?;

    match format {
        OutputFormat::Json => print_json(&health),
        OutputFormat::Table => {
            let message = format!("Server is {} ({})", color_status(&health.status), status);
            if status.is_success() {
                print_success(&message);
            } else {
                print_warning(&message);
            }
        }
    }

    if !status.is_success() {
        anyhow::bail!("model is not ready");
    }
    Ok(())
}

/// Show metadata of the active model artifact
pub async fn show_info(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let info = client.info().await?;

    match format {
        OutputFormat::Json => print_json(&info),
        OutputFormat::Table => {
            let mut rows = vec![
                row("Version", &info.version),
                row("Input steps", &info.input_steps.to_string()),
                row("Output steps", &info.output_steps.to_string()),
                row("Loaded at", &format_timestamp(&info.loaded_at)),
            ];
            if let Some(name) = &info.name {
                rows.insert(0, row("Name", name));
            }
            if let Some(artifact_format) = &info.format {
                rows.push(row("Format", artifact_format));
            }
            if let Some(created_at) = &info.created_at {
                rows.push(row("Created at", &format_timestamp(created_at)));
            }
            print_table(&rows, OutputFormat::Table);
        }
    }

    Ok(())
}

fn row(field: &str, value: &str) -> InfoRow {
    InfoRow {
        field: field.to_string(),
        value: value.to_string(),
    }
}
