//! Local conversion through the full pipeline.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use clap::Args;

use avatarforge_converter::ConversionPipeline;
use avatarforge_converter::filesystem::FsUtils;
use avatarforge_core::AppResult;
use avatarforge_core::error::AppError;

use crate::output;

/// Arguments for the convert command
#[derive(Debug, Args)]
pub struct ConvertArgs {
    /// Local GLB or MML file
    #[arg(short, long, conflicts_with_all = ["url", "mml"])]
    pub input: Option<PathBuf>,

    /// URL of a GLB or MML document, detected after download
    #[arg(long, conflicts_with = "mml")]
    pub url: Option<String>,

    /// URL of an MML manifest
    #[arg(long)]
    pub mml: Option<String>,

    /// Output VRM path (defaults to `<input stem>.vrm` or `avatar.vrm`)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Execute the convert command
pub async fn execute(args: &ConvertArgs, config_path: Option<&str>) -> AppResult<()> {
    let config = super::load_config(config_path)?;
    let pipeline = ConversionPipeline::from_config(&config)?;

    let outcome = if let Some(input) = &args.input {
        let data = super::read_input(input).await?;
        pipeline.convert_payload(Bytes::from(data)).await?
    } else if let Some(url) = &args.url {
        pipeline.convert_url(url).await?
    } else if let Some(mml) = &args.mml {
        pipeline.convert_manifest_url(mml).await?
    } else {
        return Err(AppError::validation(
            "one of --input, --url or --mml is required",
        ));
    };

    let output_path = args
        .output
        .clone()
        .unwrap_or_else(|| default_output(args.input.as_deref()));

    tokio::fs::write(&output_path, &outcome.data)
        .await
        .map_err(|e| {
            AppError::internal(format!(
                "Failed to write '{}': {}",
                output_path.display(),
                e
            ))
        })?;

    output::print_success(&format!("VRM written to '{}'", output_path.display()));
    output::print_kv("Request", &outcome.request_id.to_string());
    output::print_kv("Source type", outcome.source_type.as_str());
    output::print_kv("Size", &format!("{} bytes", outcome.data.len()));
    output::print_kv(
        "Elapsed",
        &format!("{} ms", outcome.duration.as_millis()),
    );
    Ok(())
}

fn default_output(input: Option<&Path>) -> PathBuf {
    let name = input
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str());
    PathBuf::from(FsUtils::vrm_filename(name))
}
