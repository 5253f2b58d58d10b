// handlers/protected/recordings.rs - encrypted recording transfer
//
// Thin HTTP layer over `RecordingService`; all state transitions live there.

use axum::extract::{Multipart, Path, State};
use serde::Deserialize;

use crate::database::models::PatientExercise;
use crate::error::ApiError;
use crate::handlers::{read_upload_form, AppJson, UploadResponse};
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::recording_service::{DownloadTicket, UploadTicket};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UploadUrlRequest {
    pub aes_key: String,
    pub extension: Option<String>,
}

/// POST /patientexercise/uploadrecording/:id - multipart `file` + `aes_key`
pub async fn upload_recording(
    State(state): State<AppState>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> ApiResult<UploadResponse> {
    let form = read_upload_form(multipart, state.limits.max_recording_bytes).await?;
    let file = form.file.ok_or_else(|| ApiError::field_error("file", "is required"))?;
    let aes_key = form
        .aes_key
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| ApiError::field_error("aes_key", "is required"))?;

    let location = state
        .recordings
        .upload_recording(&id, &aes_key, form.file_name.as_deref(), form.content_type.as_deref(), file)
        .await?;

    Ok(ApiResponse::success(UploadResponse { message: "File uploaded successfully".to_string(), location }))
}

/// POST /getuploadurl/:id
pub async fn get_upload_url(
    State(state): State<AppState>,
    Path(id): Path<String>,
    AppJson(req): AppJson<UploadUrlRequest>,
) -> ApiResult<UploadTicket> {
    let ticket = state
        .recordings
        .issue_upload_url(&id, &req.aes_key, req.extension.as_deref())
        .await?;
    Ok(ApiResponse::success(ticket))
}

/// POST /confirmupload/:id
pub async fn confirm_upload(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<PatientExercise> {
    Ok(ApiResponse::success(state.recordings.confirm_upload(&id).await?))
}

/// GET /getdownloadurl/:id
pub async fn get_download_url(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<DownloadTicket> {
    Ok(ApiResponse::success(state.recordings.download_url(&id).await?))
}
