// handlers/protected/patient_exercises.rs - assignments of exercises to patients

use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::info;

use crate::database::models::{
    AssignmentPatch, AssignmentReport, AssignmentStatus, PatientExercise, PatientExerciseDetail, Role, UploadState,
};
use crate::database::{ExerciseStore, PatientExerciseStore, UserStore};
use crate::error::ApiError;
use crate::handlers::{non_empty, AppJson, MessageResponse};
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateAssignmentsRequest {
    pub patient_id: String,
    pub therapist_id: String,
    pub exercise_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CreatedAssignments {
    pub inserted_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAssignmentRequest {
    pub status: Option<String>,
    pub recording: Option<String>,
}

async fn load_assignment(state: &AppState, id: &str) -> Result<PatientExercise, ApiError> {
    state
        .store
        .find_assignment(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Patient exercise not found"))
}

/// POST /patientexercise - one assignment per exercise for a therapist/patient pair
pub async fn create_assignments(
    State(state): State<AppState>,
    AppJson(req): AppJson<CreateAssignmentsRequest>,
) -> ApiResult<CreatedAssignments> {
    let mut seen = HashSet::new();
    let exercise_ids: Vec<String> = req
        .exercise_ids
        .into_iter()
        .filter_map(|id| non_empty(Some(id)))
        .filter(|id| seen.insert(id.clone()))
        .collect();
    if exercise_ids.is_empty() {
        return Err(ApiError::field_error("exercise_ids", "must name at least one exercise"));
    }

    let therapist = state
        .store
        .find_user(&req.therapist_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Therapist not found"))?;
    if therapist.role != Role::Therapist {
        return Err(ApiError::forbidden("Only therapists can assign exercises"));
    }

    let patient = state
        .store
        .find_user(&req.patient_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Patient not found"))?;
    if patient.role != Role::Patient {
        return Err(ApiError::field_error("patient_id", "does not belong to a patient"));
    }

    let found: HashSet<String> = state
        .store
        .find_exercises(&exercise_ids)
        .await?
        .into_iter()
        .map(|e| e.exercise_id)
        .collect();
    let missing: Vec<&str> = exercise_ids
        .iter()
        .filter(|id| !found.contains(*id))
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        return Err(ApiError::not_found(format!("Exercises not found: {}", missing.join(", "))));
    }

    let assignments: Vec<PatientExercise> = exercise_ids
        .iter()
        .map(|exercise_id| PatientExercise::new(&patient.user_id, &therapist.user_id, exercise_id))
        .collect();
    state.store.insert_assignments(&assignments).await?;

    info!(
        patient_id = %patient.user_id,
        therapist_id = %therapist.user_id,
        count = assignments.len(),
        "Exercises assigned"
    );
    Ok(ApiResponse::created(CreatedAssignments {
        inserted_ids: assignments.into_iter().map(|a| a.patient_exercise_id).collect(),
    }))
}

/// GET /patientexercise/:id
pub async fn get_assignment(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<PatientExercise> {
    Ok(ApiResponse::success(load_assignment(&state, &id).await?))
}

/// GET /patientexercises/:patient_id
pub async fn list_by_patient(
    State(state): State<AppState>,
    Path(patient_id): Path<String>,
) -> ApiResult<Vec<PatientExerciseDetail>> {
    Ok(ApiResponse::success(state.store.list_by_patient(&patient_id).await?))
}

/// PUT /patientexercise/:id - status and recording are patched independently
pub async fn update_assignment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    AppJson(req): AppJson<UpdateAssignmentRequest>,
) -> ApiResult<PatientExercise> {
    let status = non_empty(req.status)
        .map(|raw| raw.parse::<AssignmentStatus>())
        .transpose()
        .map_err(|_| ApiError::field_error("status", "must be pending or completed"))?;
    let recording = non_empty(req.recording);
    if status.is_none() && recording.is_none() {
        return Err(ApiError::validation_error("Nothing to update", None));
    }

    let current = load_assignment(&state, &id).await?;
    let upload_state = match status {
        // Completing an open upload must see the object in storage first
        Some(AssignmentStatus::Completed) if current.upload_state != UploadState::Completed => {
            let confirmed = state.recordings.confirm_upload(&id).await?;
            if recording.is_none() {
                info!(patient_exercise_id = %id, "Assignment completed by direct edit");
                return Ok(ApiResponse::success(confirmed));
            }
            None
        }
        Some(status) => Some(
            current
                .upload_state
                .apply(status.edit_event())
                .map_err(|e| ApiError::validation_error(e.to_string(), None))?,
        ),
        None => None,
    };

    let patch = AssignmentPatch { upload_state, recording, ..Default::default() };
    let updated = state.store.update_assignment(&id, &patch).await?;

    info!(patient_exercise_id = %id, state = %updated.upload_state, "Assignment updated");
    Ok(ApiResponse::success(updated))
}

/// DELETE /patientexercise/:id
pub async fn delete_assignment(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<MessageResponse> {
    if !state.store.delete_assignment(&id).await? {
        return Err(ApiError::not_found("Patient exercise not found"));
    }
    info!(patient_exercise_id = %id, "Assignment deleted");
    Ok(ApiResponse::success(MessageResponse::new("Patient exercise deleted successfully")))
}

/// GET /patientexercise/:id/report
pub async fn assignment_report(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<AssignmentReport> {
    let report = state
        .store
        .assignment_report(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("Patient exercise not found"))?;
    Ok(ApiResponse::success(report))
}
