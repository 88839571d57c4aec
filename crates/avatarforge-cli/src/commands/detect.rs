//! Source format detection.

use std::path::PathBuf;

use clap::Args;
use serde::Serialize;
use tabled::Tabled;

use avatarforge_converter::detect::{self, DetectedFormat};
use avatarforge_core::AppResult;

use crate::output::{self, OutputFormat};

/// Arguments for the detect command
#[derive(Debug, Args)]
pub struct DetectArgs {
    /// Files to inspect
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

/// One detection result
#[derive(Debug, Serialize, Tabled)]
pub struct DetectionRow {
    /// Inspected file
    #[tabled(rename = "File")]
    pub file: String,
    /// Detected format
    #[tabled(rename = "Format")]
    pub format: String,
    /// Size in bytes
    #[tabled(rename = "Size")]
    pub size: usize,
}

/// Execute the detect command
pub async fn execute(args: &DetectArgs, format: OutputFormat) -> AppResult<()> {
    let mut rows = Vec::with_capacity(args.files.len());

    for file in &args.files {
        let data = super::read_input(file).await?;
        rows.push(DetectionRow {
            file: file.display().to_string(),
            format: format_label(detect::detect(&data)).to_string(),
            size: data.len(),
        });
    }

    output::print_list(&rows, format);
    Ok(())
}

fn format_label(format: DetectedFormat) -> &'static str {
    match format.source_type() {
        Some(source) => source.as_str(),
        None => "unknown",
    }
}
