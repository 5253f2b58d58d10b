use async_trait::async_trait;

use super::manager::{with_timeout, DatabaseError};
use super::models::{Page, Role, User, UserPatch};
use super::store::{PgStore, UserRemoval, UserStore};

const USER_COLUMNS: &str = "user_id, first_name, last_name, email, password_hash, role, \
                            reference_code, profile_image, created_at, updated_at";

#[async_trait]
impl UserStore for PgStore {
    async fn insert_user(&self, user: &User) -> Result<(), DatabaseError> {
        let query = sqlx::query(
            "INSERT INTO users (user_id, first_name, last_name, email, password_hash, role, \
             reference_code, profile_image, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(&user.user_id)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(&user.reference_code)
        .bind(&user.profile_image)
        .bind(user.created_at)
        .bind(user.updated_at);

        with_timeout(self.query_timeout, async {
            query.execute(&self.pool).await?;
            Ok(())
        })
        .await
    }

    async fn find_user(&self, user_id: &str) -> Result<Option<User>, DatabaseError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE user_id = $1");
        with_timeout(self.query_timeout, async {
            Ok(sqlx::query_as::<_, User>(&sql).bind(user_id).fetch_optional(&self.pool).await?)
        })
        .await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)");
        with_timeout(self.query_timeout, async {
            Ok(sqlx::query_as::<_, User>(&sql).bind(email).fetch_optional(&self.pool).await?)
        })
        .await
    }

    async fn find_therapist_by_code(&self, code: &str) -> Result<Option<User>, DatabaseError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE role = 'therapist' AND reference_code = $1");
        with_timeout(self.query_timeout, async {
            Ok(sqlx::query_as::<_, User>(&sql).bind(code).fetch_optional(&self.pool).await?)
        })
        .await
    }

    async fn list_users(&self, page: Page) -> Result<(i64, Vec<User>), DatabaseError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC LIMIT $1 OFFSET $2");
        with_timeout(self.query_timeout, async {
            let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users").fetch_one(&self.pool).await?;
            let users = sqlx::query_as::<_, User>(&sql)
                .bind(page.per_page)
                .bind(page.offset())
                .fetch_all(&self.pool)
                .await?;
            Ok((total, users))
        })
        .await
    }

    async fn list_patients(&self, therapist_code: &str) -> Result<Vec<User>, DatabaseError> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE role = 'patient' AND reference_code = $1 \
             ORDER BY last_name, first_name"
        );
        with_timeout(self.query_timeout, async {
            Ok(sqlx::query_as::<_, User>(&sql).bind(therapist_code).fetch_all(&self.pool).await?)
        })
        .await
    }

    async fn update_user(&self, user_id: &str, patch: &UserPatch) -> Result<User, DatabaseError> {
        let sql = format!(
            "UPDATE users SET \
                first_name = COALESCE($2, first_name), \
                last_name = COALESCE($3, last_name), \
                reference_code = COALESCE($4, reference_code), \
                profile_image = COALESCE($5, profile_image), \
                updated_at = now() \
             WHERE user_id = $1 RETURNING {USER_COLUMNS}"
        );
        with_timeout(self.query_timeout, async {
            sqlx::query_as::<_, User>(&sql)
                .bind(user_id)
                .bind(&patch.first_name)
                .bind(&patch.last_name)
                .bind(&patch.reference_code)
                .bind(&patch.profile_image)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| DatabaseError::NotFound(format!("user {user_id}")))
        })
        .await
    }

    async fn delete_user_cascade(&self, user: &User) -> Result<UserRemoval, DatabaseError> {
        with_timeout(self.query_timeout, async {
            let mut tx = self.pool.begin().await?;
            let mut removal = UserRemoval::default();

            let owner_column = match user.role {
                Role::Patient => "patient_id",
                Role::Therapist => "therapist_id",
            };
            if let (Role::Therapist, Some(code)) = (user.role, &user.reference_code) {
                removal.unlinked_patients = sqlx::query(
                    "UPDATE users SET reference_code = NULL, updated_at = now() \
                     WHERE role = 'patient' AND reference_code = $1",
                )
                .bind(code)
                .execute(&mut *tx)
                .await?
                .rows_affected();
            }

            removal.assignments = sqlx::query(&format!("DELETE FROM patient_exercises WHERE {owner_column} = $1"))
                .bind(&user.user_id)
                .execute(&mut *tx)
                .await?
                .rows_affected();

            removal.deleted = sqlx::query("DELETE FROM users WHERE user_id = $1")
                .bind(&user.user_id)
                .execute(&mut *tx)
                .await?
                .rows_affected()
                > 0;

            if removal.deleted {
                tx.commit().await?;
            } else {
                tx.rollback().await?;
            }
            Ok(removal)
        })
        .await
    }
}
