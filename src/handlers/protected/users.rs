// handlers/protected/users.rs - account management, therapist linking, profile images

use axum::extract::{Multipart, Path, Query, State};
use axum::Extension;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::database::models::{PageQuery, Role, User, UserPatch};
use crate::database::UserStore;
use crate::error::ApiError;
use crate::handlers::{non_empty, read_upload_form, validate_name, AppJson, MessageResponse, UploadResponse};
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::{file_extension, ObjectAcl};
use crate::state::AppState;

const DEFAULT_IMAGE_EXTENSION: &str = "jpg";

#[derive(Debug, Serialize)]
pub struct UserList {
    pub total: i64,
    pub users: Vec<User>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LinkTherapistRequest {
    pub reference_code: String,
}

/// Only the account holder may change their own account
fn ensure_self(auth: &AuthUser, user_id: &str) -> Result<(), ApiError> {
    if auth.user_id != user_id {
        return Err(ApiError::forbidden("You may only modify your own account"));
    }
    Ok(())
}

async fn load_user(state: &AppState, user_id: &str) -> Result<User, ApiError> {
    state
        .store
        .find_user(user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))
}

/// GET /user/:user_id
pub async fn get_user(State(state): State<AppState>, Path(user_id): Path<String>) -> ApiResult<User> {
    Ok(ApiResponse::success(load_user(&state, &user_id).await?))
}

/// GET /users?page&recordPerPage
pub async fn list_users(State(state): State<AppState>, Query(query): Query<PageQuery>) -> ApiResult<UserList> {
    let (total, users) = state.store.list_users(query.into()).await?;
    Ok(ApiResponse::success(UserList { total, users }))
}

/// PUT /user/:user_id - rename; blank fields are ignored
pub async fn update_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(user_id): Path<String>,
    AppJson(req): AppJson<UpdateUserRequest>,
) -> ApiResult<User> {
    ensure_self(&auth, &user_id)?;

    let patch = UserPatch {
        first_name: non_empty(req.first_name).map(|v| validate_name("first_name", &v)).transpose()?,
        last_name: non_empty(req.last_name).map(|v| validate_name("last_name", &v)).transpose()?,
        ..Default::default()
    };
    if patch.first_name.is_none() && patch.last_name.is_none() {
        return Err(ApiError::validation_error("Nothing to update", None));
    }

    Ok(ApiResponse::success(state.store.update_user(&user_id, &patch).await?))
}

/// DELETE /user/:user_id - removes the account and everything hanging off it
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(user_id): Path<String>,
) -> ApiResult<MessageResponse> {
    ensure_self(&auth, &user_id)?;
    let user = load_user(&state, &user_id).await?;

    let removal = state.store.delete_user_cascade(&user).await?;
    if !removal.deleted {
        return Err(ApiError::not_found("User not found"));
    }

    info!(
        user_id = %user_id,
        role = user.role.as_str(),
        assignments = removal.assignments,
        unlinked_patients = removal.unlinked_patients,
        "User deleted"
    );
    Ok(ApiResponse::success(MessageResponse::new("User deleted successfully")))
}

/// POST /user/linkToTherapist/:user_id - a patient adopts a therapist's reference code
pub async fn link_to_therapist(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(user_id): Path<String>,
    AppJson(req): AppJson<LinkTherapistRequest>,
) -> ApiResult<User> {
    ensure_self(&auth, &user_id)?;

    let code = req.reference_code.trim().to_ascii_uppercase();
    if code.is_empty() {
        return Err(ApiError::field_error("reference_code", "is required"));
    }

    let user = load_user(&state, &user_id).await?;
    if user.role != Role::Patient {
        return Err(ApiError::bad_request("Only patients can link to a therapist"));
    }

    let therapist = state
        .store
        .find_therapist_by_code(&code)
        .await?
        .ok_or_else(|| ApiError::not_found("No therapist with that reference code"))?;

    let patch = UserPatch { reference_code: Some(code), ..Default::default() };
    let updated = state.store.update_user(&user_id, &patch).await?;

    info!(user_id = %user_id, therapist_id = %therapist.user_id, "Patient linked to therapist");
    Ok(ApiResponse::success(updated))
}

/// GET /patients/:therapist_id
pub async fn get_patients(State(state): State<AppState>, Path(therapist_id): Path<String>) -> ApiResult<Vec<User>> {
    let therapist = state
        .store
        .find_user(&therapist_id)
        .await?
        .filter(|u| u.role == Role::Therapist)
        .ok_or_else(|| ApiError::not_found("Therapist not found"))?;

    let patients = match &therapist.reference_code {
        Some(code) => state.store.list_patients(code).await?,
        None => Vec::new(),
    };
    Ok(ApiResponse::success(patients))
}

/// POST /user/uploadprofile/:user_id - multipart `file`, stored publicly readable
pub async fn upload_profile(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(user_id): Path<String>,
    multipart: Multipart,
) -> ApiResult<UploadResponse> {
    ensure_self(&auth, &user_id)?;
    load_user(&state, &user_id).await?;

    let form = read_upload_form(multipart, state.limits.max_profile_image_bytes).await?;
    let file = form
        .file
        .filter(|f| !f.is_empty())
        .ok_or_else(|| ApiError::field_error("file", "is required"))?;

    let extension = form
        .file_name
        .as_deref()
        .and_then(|name| std::path::Path::new(name).extension())
        .and_then(|ext| ext.to_str());
    let extension = file_extension(extension, DEFAULT_IMAGE_EXTENSION).map_err(|e| ApiError::field_error("file", e))?;

    let key = format!("profile/{user_id}.{extension}");
    state
        .storage
        .put_object(&key, file, form.content_type.as_deref(), ObjectAcl::PublicRead)
        .await?;

    // Same key on every upload, so bust caches in front of the bucket
    let location = format!("{}?cb={}", state.storage.public_url(&key), Utc::now().timestamp_millis());
    let patch = UserPatch { profile_image: Some(location.clone()), ..Default::default() };
    state.store.update_user(&user_id, &patch).await?;

    info!(user_id = %user_id, key = %key, "Profile image uploaded");
    Ok(ApiResponse::success(UploadResponse { message: "File uploaded successfully".to_string(), location }))
}
