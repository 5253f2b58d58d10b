use async_trait::async_trait;
use sqlx::PgPool;
use std::time::Duration;

use super::manager::{health_check, with_timeout, DatabaseError};
use super::models::{
    AssignmentPatch, AssignmentReport, Exercise, ExercisePatch, Page, PatientExercise, PatientExerciseDetail, User,
    UserPatch,
};

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert_user(&self, user: &User) -> Result<(), DatabaseError>;
    async fn find_user(&self, user_id: &str) -> Result<Option<User>, DatabaseError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError>;
    async fn find_therapist_by_code(&self, code: &str) -> Result<Option<User>, DatabaseError>;
    /// Total row count plus the requested page, newest first
    async fn list_users(&self, page: Page) -> Result<(i64, Vec<User>), DatabaseError>;
    /// Patients whose reference code points at the given therapist code
    async fn list_patients(&self, therapist_code: &str) -> Result<Vec<User>, DatabaseError>;
    async fn update_user(&self, user_id: &str, patch: &UserPatch) -> Result<User, DatabaseError>;
    /// Removes the user together with their assignments in one transaction.
    ///
    /// A therapist's linked patients lose their reference code; a patient's
    /// assignments go with them. Nothing changes when any step fails.
    async fn delete_user_cascade(&self, user: &User) -> Result<UserRemoval, DatabaseError>;
}

/// What a cascading user delete touched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserRemoval {
    pub deleted: bool,
    pub assignments: u64,
    pub unlinked_patients: u64,
}

#[async_trait]
pub trait ExerciseStore: Send + Sync {
    async fn insert_exercise(&self, exercise: &Exercise) -> Result<(), DatabaseError>;
    async fn find_exercise(&self, exercise_id: &str) -> Result<Option<Exercise>, DatabaseError>;
    /// Subset of `ids` that exist; order is unspecified
    async fn find_exercises(&self, ids: &[String]) -> Result<Vec<Exercise>, DatabaseError>;
    async fn list_exercises(&self, page: Page) -> Result<(i64, Vec<Exercise>), DatabaseError>;
    async fn update_exercise(&self, exercise_id: &str, patch: &ExercisePatch) -> Result<Exercise, DatabaseError>;
    async fn delete_exercise(&self, exercise_id: &str) -> Result<bool, DatabaseError>;
}

#[async_trait]
pub trait PatientExerciseStore: Send + Sync {
    async fn insert_assignments(&self, assignments: &[PatientExercise]) -> Result<(), DatabaseError>;
    async fn find_assignment(&self, id: &str) -> Result<Option<PatientExercise>, DatabaseError>;
    async fn list_by_patient(&self, patient_id: &str) -> Result<Vec<PatientExerciseDetail>, DatabaseError>;
    /// Applies only the `Some` fields; `NotFound` when the id is unknown
    async fn update_assignment(&self, id: &str, patch: &AssignmentPatch) -> Result<PatientExercise, DatabaseError>;
    async fn delete_assignment(&self, id: &str) -> Result<bool, DatabaseError>;
    async fn assignment_report(&self, id: &str) -> Result<Option<AssignmentReport>, DatabaseError>;
}

/// Everything the HTTP layer needs from persistence
#[async_trait]
pub trait Store: UserStore + ExerciseStore + PatientExerciseStore {
    async fn ping(&self) -> Result<(), DatabaseError>;
}

/// Postgres-backed store; every query is bounded by `query_timeout`
#[derive(Clone)]
pub struct PgStore {
    pub(super) pool: PgPool,
    pub(super) query_timeout: Duration,
}

impl PgStore {
    pub fn new(pool: PgPool, query_timeout: Duration) -> Self {
        Self { pool, query_timeout }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<(), DatabaseError> {
        with_timeout(self.query_timeout, health_check(&self.pool)).await
    }
}
