use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use super::exercise::Exercise;
use super::upload_state::{AssignmentStatus, UploadState};

/// A patient-exercise assignment and the state of its recording
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(into = "PatientExerciseView")]
pub struct PatientExercise {
    pub patient_exercise_id: String,
    pub patient_id: String,
    pub therapist_id: String,
    pub exercise_id: String,
    #[sqlx(try_from = "String")]
    pub upload_state: UploadState,
    /// Public URL of the uploaded object, empty until completed
    pub recording: String,
    /// Object path inside the bucket, set once a credential or upload names it
    pub recording_key: String,
    /// KMS-wrapped content key; never serialized
    pub wrapped_key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PatientExercise {
    pub fn new(patient_id: &str, therapist_id: &str, exercise_id: &str) -> Self {
        let now = Utc::now();
        Self {
            patient_exercise_id: super::new_id(),
            patient_id: patient_id.to_string(),
            therapist_id: therapist_id.to_string(),
            exercise_id: exercise_id.to_string(),
            upload_state: UploadState::Pending,
            recording: String::new(),
            recording_key: String::new(),
            wrapped_key: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn status(&self) -> AssignmentStatus {
        self.upload_state.status()
    }

    /// Completed, with both the object location and the wrapped key on file
    pub fn is_retrievable(&self) -> bool {
        self.status() == AssignmentStatus::Completed
            && !self.recording_key.is_empty()
            && !self.wrapped_key.is_empty()
    }
}

#[derive(Debug, Serialize)]
struct PatientExerciseView {
    patient_exercise_id: String,
    patient_id: String,
    therapist_id: String,
    exercise_id: String,
    status: AssignmentStatus,
    upload_state: UploadState,
    recording: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<PatientExercise> for PatientExerciseView {
    fn from(pe: PatientExercise) -> Self {
        Self {
            status: pe.status(),
            patient_exercise_id: pe.patient_exercise_id,
            patient_id: pe.patient_id,
            therapist_id: pe.therapist_id,
            exercise_id: pe.exercise_id,
            upload_state: pe.upload_state,
            recording: pe.recording,
            created_at: pe.created_at,
            updated_at: pe.updated_at,
        }
    }
}

/// Partial `$set`-style update; only `Some` fields overwrite
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssignmentPatch {
    pub upload_state: Option<UploadState>,
    pub recording: Option<String>,
    pub recording_key: Option<String>,
    pub wrapped_key: Option<String>,
}

impl AssignmentPatch {
    pub fn is_empty(&self) -> bool {
        *self == AssignmentPatch::default()
    }

    pub fn apply_to(&self, record: &mut PatientExercise) {
        if let Some(state) = self.upload_state {
            record.upload_state = state;
        }
        if let Some(recording) = &self.recording {
            record.recording = recording.clone();
        }
        if let Some(key) = &self.recording_key {
            record.recording_key = key.clone();
        }
        if let Some(wrapped) = &self.wrapped_key {
            record.wrapped_key = wrapped.clone();
        }
        record.updated_at = Utc::now();
    }
}

/// Assignment joined with the exercise it points at
#[derive(Debug, Clone, Serialize)]
pub struct PatientExerciseDetail {
    pub patient_exercise: PatientExercise,
    pub exercise: Option<Exercise>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Participant {
    pub user_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExerciseSummary {
    pub exercise_id: String,
    pub name: String,
    pub description: String,
    pub video_url: String,
}

/// Therapist / patient / exercise report for a single assignment
#[derive(Debug, Clone, Serialize)]
pub struct AssignmentReport {
    pub patient_exercise_id: String,
    pub status: AssignmentStatus,
    pub patient: Option<Participant>,
    pub therapist: Option<Participant>,
    pub exercise: Option<ExerciseSummary>,
}
