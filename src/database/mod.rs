pub mod exercises;
pub mod manager;
pub mod models;
pub mod patient_exercises;
pub mod store;
pub mod users;

pub use manager::DatabaseError;
pub use store::{ExerciseStore, PatientExerciseStore, PgStore, Store, UserRemoval, UserStore};
