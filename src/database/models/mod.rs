pub mod exercise;
pub mod page;
pub mod patient_exercise;
pub mod upload_state;
pub mod user;

pub use exercise::{Exercise, ExercisePatch};
pub use page::{Page, PageQuery};
pub use patient_exercise::{
    AssignmentPatch, AssignmentReport, ExerciseSummary, Participant, PatientExercise, PatientExerciseDetail,
};
pub use upload_state::{AssignmentStatus, TransitionError, UploadEvent, UploadState};
pub use user::{Role, User, UserPatch};

use thiserror::Error;

/// A stored enum column held a value this build does not know about
#[derive(Debug, Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Fresh opaque identifier for users, exercises and assignments
pub fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
