use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Exercise {
    pub exercise_id: String,
    pub name: String,
    pub description: String,
    pub video_url: String,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct ExercisePatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub video_url: Option<String>,
    pub tags: Option<Vec<String>>,
}
