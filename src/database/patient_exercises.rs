use async_trait::async_trait;
use sqlx::FromRow;
use std::collections::HashMap;

use super::manager::{with_timeout, DatabaseError};
use super::models::{
    AssignmentPatch, AssignmentReport, Exercise, ExerciseSummary, Participant, PatientExercise,
    PatientExerciseDetail, UploadState,
};
use super::store::{PatientExerciseStore, PgStore};

const ASSIGNMENT_COLUMNS: &str = "patient_exercise_id, patient_id, therapist_id, exercise_id, upload_state, \
                                  recording, recording_key, wrapped_key, created_at, updated_at";

/// Flat LEFT JOIN row; any side may be missing when its owner was deleted
#[derive(Debug, FromRow)]
struct ReportRow {
    patient_exercise_id: String,
    upload_state: String,
    patient_id: Option<String>,
    patient_first_name: Option<String>,
    patient_last_name: Option<String>,
    therapist_id: Option<String>,
    therapist_first_name: Option<String>,
    therapist_last_name: Option<String>,
    exercise_id: Option<String>,
    exercise_name: Option<String>,
    exercise_description: Option<String>,
    exercise_video_url: Option<String>,
}

fn participant(id: Option<String>, first: Option<String>, last: Option<String>) -> Option<Participant> {
    let user_id = id?;
    let name = format!("{} {}", first.unwrap_or_default(), last.unwrap_or_default());
    Some(Participant { user_id, name: name.trim().to_string() })
}

impl TryFrom<ReportRow> for AssignmentReport {
    type Error = DatabaseError;

    fn try_from(row: ReportRow) -> Result<Self, Self::Error> {
        let state = UploadState::try_from(row.upload_state)
            .map_err(|e| DatabaseError::Sqlx(sqlx::Error::Decode(Box::new(e))))?;

        let exercise = row.exercise_id.map(|exercise_id| ExerciseSummary {
            exercise_id,
            name: row.exercise_name.unwrap_or_default(),
            description: row.exercise_description.unwrap_or_default(),
            video_url: row.exercise_video_url.unwrap_or_default(),
        });

        Ok(AssignmentReport {
            patient_exercise_id: row.patient_exercise_id,
            status: state.status(),
            patient: participant(row.patient_id, row.patient_first_name, row.patient_last_name),
            therapist: participant(row.therapist_id, row.therapist_first_name, row.therapist_last_name),
            exercise,
        })
    }
}

#[async_trait]
impl PatientExerciseStore for PgStore {
    async fn insert_assignments(&self, assignments: &[PatientExercise]) -> Result<(), DatabaseError> {
        with_timeout(self.query_timeout, async {
            let mut tx = self.pool.begin().await?;
            for pe in assignments {
                sqlx::query(
                    "INSERT INTO patient_exercises (patient_exercise_id, patient_id, therapist_id, exercise_id, \
                     upload_state, recording, recording_key, wrapped_key, created_at, updated_at) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
                )
                .bind(&pe.patient_exercise_id)
                .bind(&pe.patient_id)
                .bind(&pe.therapist_id)
                .bind(&pe.exercise_id)
                .bind(pe.upload_state.as_str())
                .bind(&pe.recording)
                .bind(&pe.recording_key)
                .bind(&pe.wrapped_key)
                .bind(pe.created_at)
                .bind(pe.updated_at)
                .execute(&mut *tx)
                .await?;
            }
            tx.commit().await?;
            Ok(())
        })
        .await
    }

    async fn find_assignment(&self, id: &str) -> Result<Option<PatientExercise>, DatabaseError> {
        let sql = format!("SELECT {ASSIGNMENT_COLUMNS} FROM patient_exercises WHERE patient_exercise_id = $1");
        with_timeout(self.query_timeout, async {
            Ok(sqlx::query_as::<_, PatientExercise>(&sql).bind(id).fetch_optional(&self.pool).await?)
        })
        .await
    }

    async fn list_by_patient(&self, patient_id: &str) -> Result<Vec<PatientExerciseDetail>, DatabaseError> {
        let sql = format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM patient_exercises WHERE patient_id = $1 ORDER BY created_at"
        );
        with_timeout(self.query_timeout, async {
            let assignments = sqlx::query_as::<_, PatientExercise>(&sql)
                .bind(patient_id)
                .fetch_all(&self.pool)
                .await?;

            let ids: Vec<String> = assignments.iter().map(|pe| pe.exercise_id.clone()).collect();
            let exercises: HashMap<String, Exercise> = sqlx::query_as::<_, Exercise>(
                "SELECT exercise_id, name, description, video_url, tags, created_at, updated_at \
                 FROM exercises WHERE exercise_id = ANY($1)",
            )
            .bind(&ids)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|e| (e.exercise_id.clone(), e))
            .collect();

            Ok(assignments
                .into_iter()
                .map(|pe| PatientExerciseDetail {
                    exercise: exercises.get(&pe.exercise_id).cloned(),
                    patient_exercise: pe,
                })
                .collect())
        })
        .await
    }

    async fn update_assignment(&self, id: &str, patch: &AssignmentPatch) -> Result<PatientExercise, DatabaseError> {
        let sql = format!(
            "UPDATE patient_exercises SET \
                upload_state = COALESCE($2, upload_state), \
                recording = COALESCE($3, recording), \
                recording_key = COALESCE($4, recording_key), \
                wrapped_key = COALESCE($5, wrapped_key), \
                updated_at = now() \
             WHERE patient_exercise_id = $1 RETURNING {ASSIGNMENT_COLUMNS}"
        );
        with_timeout(self.query_timeout, async {
            sqlx::query_as::<_, PatientExercise>(&sql)
                .bind(id)
                .bind(patch.upload_state.map(|s| s.as_str()))
                .bind(&patch.recording)
                .bind(&patch.recording_key)
                .bind(&patch.wrapped_key)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| DatabaseError::NotFound(format!("patient exercise {id}")))
        })
        .await
    }

    async fn delete_assignment(&self, id: &str) -> Result<bool, DatabaseError> {
        with_timeout(self.query_timeout, async {
            let result = sqlx::query("DELETE FROM patient_exercises WHERE patient_exercise_id = $1")
                .bind(id)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }

    async fn assignment_report(&self, id: &str) -> Result<Option<AssignmentReport>, DatabaseError> {
        with_timeout(self.query_timeout, async {
            let row = sqlx::query_as::<_, ReportRow>(
                "SELECT pe.patient_exercise_id, pe.upload_state, \
                        p.user_id AS patient_id, p.first_name AS patient_first_name, \
                        p.last_name AS patient_last_name, \
                        t.user_id AS therapist_id, t.first_name AS therapist_first_name, \
                        t.last_name AS therapist_last_name, \
                        e.exercise_id, e.name AS exercise_name, e.description AS exercise_description, \
                        e.video_url AS exercise_video_url \
                 FROM patient_exercises pe \
                 LEFT JOIN users p ON p.user_id = pe.patient_id \
                 LEFT JOIN users t ON t.user_id = pe.therapist_id \
                 LEFT JOIN exercises e ON e.exercise_id = pe.exercise_id \
                 WHERE pe.patient_exercise_id = $1",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

            row.map(AssignmentReport::try_from).transpose()
        })
        .await
    }
}
