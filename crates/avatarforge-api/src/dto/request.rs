//! Request DTOs.

use serde::{Deserialize, Serialize};

/// Body of `POST /convert-mml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConvertMmlRequest {
    /// URL of the manifest document.
    #[serde(rename = "mmlUrl", default)]
    pub mml_url: Option<String>,
}

/// Query string of `GET /convert-url`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConvertUrlQuery {
    /// URL of a GLB or a manifest.
    #[serde(default)]
    pub url: Option<String>,
}
