// handlers/protected/mod.rs - Protected handlers (JWT authentication required)
//
// Every route in this tier sits behind `jwt_auth_middleware`, which rejects
// requests without a valid access token and injects `AuthUser` into the
// request extensions.

pub mod exercises;
pub mod patient_exercises;
pub mod recordings;
pub mod users;
