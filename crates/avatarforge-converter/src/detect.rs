//! Content-type detection from a bounded header prefix.

use serde::{Deserialize, Serialize};

use crate::models::SourceType;

/// GLB container magic, `glTF` in ASCII.
pub const GLB_MAGIC: [u8; 4] = [0x67, 0x6C, 0x54, 0x46];

/// Number of bytes inspected for the textual check.
pub const HEADER_WINDOW: usize = 8;

const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

/// Result of classifying a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectedFormat {
    /// A binary GLB model.
    BinaryModel,
    /// A markup manifest. Structure is not validated here.
    Manifest,
    /// Neither; the caller must reject the resource.
    Unknown,
}

impl DetectedFormat {
    /// Source type reported for a recognized format.
    pub fn source_type(&self) -> Option<SourceType> {
        match self {
            Self::BinaryModel => Some(SourceType::Glb),
            Self::Manifest => Some(SourceType::Mml),
            Self::Unknown => None,
        }
    }
}

/// Classify `data` by inspecting at most the BOM plus [`HEADER_WINDOW`] bytes.
pub fn detect(data: &[u8]) -> DetectedFormat {
    if data.starts_with(&GLB_MAGIC) {
        return DetectedFormat::BinaryModel;
    }

    let text = data.strip_prefix(&UTF8_BOM).unwrap_or(data);
    let window = &text[..text.len().min(HEADER_WINDOW)];
    if String::from_utf8_lossy(window).contains('<') {
        DetectedFormat::Manifest
    } else {
        DetectedFormat::Unknown
    }
}
