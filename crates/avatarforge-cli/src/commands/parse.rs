//! Manifest inspection.

use std::path::PathBuf;

use clap::Args;
use serde::Serialize;
use tabled::Tabled;

use avatarforge_converter::Url;
use avatarforge_converter::manifest;
use avatarforge_core::AppResult;
use avatarforge_core::error::AppError;

use crate::output::{self, OutputFormat};

/// Arguments for the parse command
#[derive(Debug, Args)]
pub struct ParseArgs {
    /// Manifest file
    pub file: PathBuf,

    /// URL the manifest was served from; relative references are resolved
    /// against it
    #[arg(long)]
    pub base_url: Option<String>,
}

/// One manifest reference
#[derive(Debug, Serialize, Tabled)]
pub struct ReferenceRow {
    /// `base` or `overlay N`
    #[tabled(rename = "Role")]
    pub role: String,
    /// Reference as written, or resolved when a base URL was given
    #[tabled(rename = "Source")]
    pub source: String,
}

/// Execute the parse command
pub async fn execute(args: &ParseArgs, format: OutputFormat) -> AppResult<()> {
    let data = super::read_input(&args.file).await?;
    let text = String::from_utf8_lossy(&data);
    let parsed = manifest::parse(&text)?;

    let (base, overlays): (String, Vec<String>) = match &args.base_url {
        Some(raw) => {
            let origin = Url::parse(raw)
                .map_err(|e| AppError::validation(format!("Invalid base URL '{raw}': {e}")))?;
            let resolved = parsed.resolve(Some(&origin))?;
            (
                resolved.base_source.to_string(),
                resolved
                    .overlay_sources
                    .iter()
                    .map(Url::to_string)
                    .collect(),
            )
        }
        None => (parsed.base_source.clone(), parsed.overlay_sources.clone()),
    };

    match format {
        OutputFormat::Json => output::print_item(&serde_json::json!({
            "base": base,
            "overlays": overlays,
        })),
        OutputFormat::Table => {
            let rows: Vec<ReferenceRow> = std::iter::once(ReferenceRow {
                role: "base".to_string(),
                source: base,
            })
            .chain(overlays.into_iter().enumerate().map(|(i, source)| ReferenceRow {
                role: format!("overlay {i}"),
                source,
            }))
            .collect();
            output::print_list(&rows, format);
        }
    }

    Ok(())
}
