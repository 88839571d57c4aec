//! Conversion handlers. Each returns the VRM bytes as an attachment.

use axum::Json;
use axum::extract::{Multipart, Query, State};
use axum::http::{HeaderName, StatusCode, header};
use axum::response::{IntoResponse, Response};

use avatarforge_converter::ConversionOutcome;
use avatarforge_converter::filesystem::FsUtils;

use crate::dto::request::{ConvertMmlRequest, ConvertUrlQuery};
use crate::error::ApiError;
use crate::state::AppState;

/// Media type of both GLB input and VRM output.
pub const GLTF_BINARY: &str = "model/gltf-binary";
/// Elapsed pipeline time in milliseconds.
pub const X_CONVERSION_TIME_MS: HeaderName = HeaderName::from_static("x-conversion-time-ms");
/// `glb` or `mml`.
pub const X_SOURCE_TYPE: HeaderName = HeaderName::from_static("x-source-type");
/// Identifier of the request workspace, also present in the logs.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Multipart field carrying the upload.
const UPLOAD_FIELD: &str = "glb";

/// POST /convert
pub async fn convert_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut upload = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation(format!("Invalid multipart body: {}", e.body_text())))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        if !is_glb_upload(file_name.as_deref(), content_type.as_deref()) {
            return Err(ApiError::validation("Only GLB files are allowed"));
        }

        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::validation(format!("Failed to read upload: {}", e.body_text())))?;
        upload = Some((file_name, data));
        break;
    }

    let (file_name, data) = upload.ok_or_else(|| ApiError::validation("No GLB file uploaded"))?;
    if data.is_empty() {
        return Err(ApiError::validation("No GLB file uploaded"));
    }

    tracing::info!(
        file_name = file_name.as_deref().unwrap_or("-"),
        size = data.len(),
        "Conversion upload received"
    );

    let outcome = state.pipeline.convert_payload(data).await?;
    Ok(vrm_response(outcome, file_name.as_deref()))
}

/// POST /convert-mml
pub async fn convert_mml(
    State(state): State<AppState>,
    Json(body): Json<ConvertMmlRequest>,
) -> Result<Response, ApiError> {
    let url = body
        .mml_url
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| ApiError::validation("mmlUrl is required in request body"))?;

    let outcome = state.pipeline.convert_manifest_url(&url).await?;
    Ok(vrm_response(outcome, None))
}

/// GET /convert-url
pub async fn convert_url(
    State(state): State<AppState>,
    Query(query): Query<ConvertUrlQuery>,
) -> Result<Response, ApiError> {
    let url = query
        .url
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| ApiError::validation("url query parameter is required"))?;

    let outcome = state.pipeline.convert_url(&url).await?;
    Ok(vrm_response(outcome, None))
}

/// Accept by extension or by declared media type.
fn is_glb_upload(file_name: Option<&str>, content_type: Option<&str>) -> bool {
    let by_name = file_name.is_some_and(|n| n.to_ascii_lowercase().ends_with(".glb"));
    let by_type = content_type.is_some_and(|t| t.eq_ignore_ascii_case(GLTF_BINARY));
    by_name || by_type
}

fn vrm_response(outcome: ConversionOutcome, original_name: Option<&str>) -> Response {
    let disposition = format!(
        "attachment; filename=\"{}\"",
        FsUtils::vrm_filename(original_name)
    );

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, GLTF_BINARY.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
            (X_CONVERSION_TIME_MS, outcome.duration.as_millis().to_string()),
            (X_SOURCE_TYPE, outcome.source_type.to_string()),
            (X_REQUEST_ID, outcome.request_id.to_string()),
        ],
        outcome.data,
    )
        .into_response()
}
