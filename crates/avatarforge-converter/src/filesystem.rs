//! Filesystem utilities for the conversion pipeline.

use std::path::Path;

use bytes::Bytes;

use crate::error::ConversionError;
use crate::models::JobKind;

/// Filesystem utility functions.
pub struct FsUtils;

impl FsUtils {
    /// Download name used when the caller supplied no usable file name.
    pub const DEFAULT_STEM: &'static str = "avatar";

    /// Sanitize a filename stem for use in a `Content-Disposition` header.
    pub fn sanitize_stem(filename: &str) -> String {
        let path = Path::new(filename);
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(filename);

        stem.chars()
            .filter_map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    Some(c)
                } else if c.is_whitespace() {
                    Some('_')
                } else {
                    None
                }
            })
            .take(200)
            .collect()
    }

    /// `<stem>.vrm` for the given upload name, `avatar.vrm` otherwise.
    pub fn vrm_filename(original_name: Option<&str>) -> String {
        let stem = original_name
            .map(Self::sanitize_stem)
            .filter(|s| !s.is_empty() && s.chars().any(|c| c != '.'))
            .unwrap_or_else(|| Self::DEFAULT_STEM.to_string());
        format!("{stem}.vrm")
    }

    /// Check that an engine output exists and meets the minimum size.
    ///
    /// Returns the output size in bytes.
    pub async fn check_output(
        job: JobKind,
        path: &Path,
        min_output_bytes: u64,
    ) -> Result<u64, ConversionError> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConversionError::OutputMissing {
                    job,
                    path: path.to_path_buf(),
                });
            }
            Err(e) => return Err(ConversionError::Io(e)),
        };

        let size = metadata.len();
        if !metadata.is_file() || size < min_output_bytes {
            return Err(ConversionError::OutputTooSmall {
                job,
                path: path.to_path_buf(),
                size,
            });
        }
        Ok(size)
    }

    /// Read a finished output file into memory.
    pub async fn read_output(path: &Path) -> Result<Bytes, ConversionError> {
        Ok(Bytes::from(tokio::fs::read(path).await?))
    }
}
