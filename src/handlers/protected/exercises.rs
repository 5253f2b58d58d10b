// handlers/protected/exercises.rs - exercise catalogue CRUD

use axum::extract::{Path, Query, State};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::database::models::{new_id, Exercise, ExercisePatch, PageQuery};
use crate::database::ExerciseStore;
use crate::error::ApiError;
use crate::handlers::{non_empty, validate_name, AppJson, MessageResponse};
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateExerciseRequest {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub video_url: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateExerciseRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub video_url: Option<String>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct ExerciseList {
    pub total: i64,
    pub exercises: Vec<Exercise>,
}

fn clean_tags(tags: Vec<String>) -> Vec<String> {
    let mut cleaned: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags.into_iter().filter_map(|t| non_empty(Some(t))) {
        if !cleaned.contains(&tag) {
            cleaned.push(tag);
        }
    }
    cleaned
}

/// POST /exercise
pub async fn create_exercise(
    State(state): State<AppState>,
    AppJson(req): AppJson<CreateExerciseRequest>,
) -> ApiResult<Exercise> {
    let name = validate_name("name", &req.name)?;
    let description = non_empty(Some(req.description)).ok_or_else(|| ApiError::field_error("description", "is required"))?;

    let now = Utc::now();
    let exercise = Exercise {
        exercise_id: new_id(),
        name,
        description,
        video_url: req.video_url.trim().to_string(),
        tags: clean_tags(req.tags),
        created_at: now,
        updated_at: now,
    };
    state.store.insert_exercise(&exercise).await?;

    info!(exercise_id = %exercise.exercise_id, "Exercise created");
    Ok(ApiResponse::created(exercise))
}

/// GET /exercise/:exercise_id
pub async fn get_exercise(State(state): State<AppState>, Path(exercise_id): Path<String>) -> ApiResult<Exercise> {
    let exercise = state
        .store
        .find_exercise(&exercise_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Exercise not found"))?;
    Ok(ApiResponse::success(exercise))
}

/// GET /exercises?page&recordPerPage
pub async fn list_exercises(State(state): State<AppState>, Query(query): Query<PageQuery>) -> ApiResult<ExerciseList> {
    let (total, exercises) = state.store.list_exercises(query.into()).await?;
    Ok(ApiResponse::success(ExerciseList { total, exercises }))
}

/// PUT /exercise/:exercise_id - only supplied, non-blank fields change
pub async fn update_exercise(
    State(state): State<AppState>,
    Path(exercise_id): Path<String>,
    AppJson(req): AppJson<UpdateExerciseRequest>,
) -> ApiResult<Exercise> {
    let patch = ExercisePatch {
        name: non_empty(req.name).map(|v| validate_name("name", &v)).transpose()?,
        description: non_empty(req.description),
        video_url: non_empty(req.video_url),
        tags: req.tags.map(clean_tags),
    };

    let exercise = state.store.update_exercise(&exercise_id, &patch).await?;
    info!(exercise_id = %exercise_id, "Exercise updated");
    Ok(ApiResponse::success(exercise))
}

/// DELETE /exercise/:exercise_id
pub async fn delete_exercise(
    State(state): State<AppState>,
    Path(exercise_id): Path<String>,
) -> ApiResult<MessageResponse> {
    if !state.store.delete_exercise(&exercise_id).await? {
        return Err(ApiError::not_found("Exercise not found"));
    }
    info!(exercise_id = %exercise_id, "Exercise deleted");
    Ok(ApiResponse::success(MessageResponse::new("Exercise deleted successfully")))
}
