use async_trait::async_trait;

use super::manager::{with_timeout, DatabaseError};
use super::models::{Exercise, ExercisePatch, Page};
use super::store::{ExerciseStore, PgStore};

const EXERCISE_COLUMNS: &str = "exercise_id, name, description, video_url, tags, created_at, updated_at";

#[async_trait]
impl ExerciseStore for PgStore {
    async fn insert_exercise(&self, exercise: &Exercise) -> Result<(), DatabaseError> {
        with_timeout(self.query_timeout, async {
            sqlx::query(
                "INSERT INTO exercises (exercise_id, name, description, video_url, tags, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(&exercise.exercise_id)
            .bind(&exercise.name)
            .bind(&exercise.description)
            .bind(&exercise.video_url)
            .bind(&exercise.tags)
            .bind(exercise.created_at)
            .bind(exercise.updated_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn find_exercise(&self, exercise_id: &str) -> Result<Option<Exercise>, DatabaseError> {
        let sql = format!("SELECT {EXERCISE_COLUMNS} FROM exercises WHERE exercise_id = $1");
        with_timeout(self.query_timeout, async {
            Ok(sqlx::query_as::<_, Exercise>(&sql).bind(exercise_id).fetch_optional(&self.pool).await?)
        })
        .await
    }

    async fn find_exercises(&self, ids: &[String]) -> Result<Vec<Exercise>, DatabaseError> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        let sql = format!("SELECT {EXERCISE_COLUMNS} FROM exercises WHERE exercise_id = ANY($1)");
        with_timeout(self.query_timeout, async {
            Ok(sqlx::query_as::<_, Exercise>(&sql).bind(ids).fetch_all(&self.pool).await?)
        })
        .await
    }

    async fn list_exercises(&self, page: Page) -> Result<(i64, Vec<Exercise>), DatabaseError> {
        let sql = format!("SELECT {EXERCISE_COLUMNS} FROM exercises ORDER BY created_at DESC LIMIT $1 OFFSET $2");
        with_timeout(self.query_timeout, async {
            let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM exercises").fetch_one(&self.pool).await?;
            let exercises = sqlx::query_as::<_, Exercise>(&sql)
                .bind(page.per_page)
                .bind(page.offset())
                .fetch_all(&self.pool)
                .await?;
            Ok((total, exercises))
        })
        .await
    }

    async fn update_exercise(&self, exercise_id: &str, patch: &ExercisePatch) -> Result<Exercise, DatabaseError> {
        let sql = format!(
            "UPDATE exercises SET \
                name = COALESCE($2, name), \
                description = COALESCE($3, description), \
                video_url = COALESCE($4, video_url), \
                tags = COALESCE($5, tags), \
                updated_at = now() \
             WHERE exercise_id = $1 RETURNING {EXERCISE_COLUMNS}"
        );
        with_timeout(self.query_timeout, async {
            sqlx::query_as::<_, Exercise>(&sql)
                .bind(exercise_id)
                .bind(&patch.name)
                .bind(&patch.description)
                .bind(&patch.video_url)
                .bind(&patch.tags)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| DatabaseError::NotFound(format!("exercise {exercise_id}")))
        })
        .await
    }

    async fn delete_exercise(&self, exercise_id: &str) -> Result<bool, DatabaseError> {
        with_timeout(self.query_timeout, async {
            let result = sqlx::query("DELETE FROM exercises WHERE exercise_id = $1")
                .bind(exercise_id)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }
}
