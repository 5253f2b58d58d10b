use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::SecurityConfig;
use crate::handlers::{protected, public};
use crate::middleware::jwt_auth_middleware;
use crate::state::{AppState, UploadLimits};

/// Headroom for multipart framing and text fields on top of the file itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn app(state: AppState, security: &SecurityConfig) -> Router {
    let protected = Router::new()
        .merge(user_routes(state.limits))
        .merge(exercise_routes())
        .merge(patient_exercise_routes(state.limits))
        .merge(recording_routes())
        .route_layer(middleware::from_fn_with_state(state.clone(), jwt_auth_middleware));

    Router::new()
        // Public
        .route("/", get(public::root))
        .route("/health", get(public::health))
        .merge(auth_public_routes())
        // Protected API
        .merge(protected)
        // Global middleware
        .layer(cors_layer(security))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn auth_public_routes() -> Router<AppState> {
    Router::new()
        .route("/signup", post(public::signup))
        .route("/login", post(public::login))
        .route("/refresh", post(public::refresh))
}

fn user_routes(limits: UploadLimits) -> Router<AppState> {
    use protected::users;

    Router::new()
        .route("/users", get(users::list_users))
        .route(
            "/user/:user_id",
            get(users::get_user).put(users::update_user).delete(users::delete_user),
        )
        .route("/user/linkToTherapist/:user_id", post(users::link_to_therapist))
        .route(
            "/user/uploadprofile/:user_id",
            post(users::upload_profile).layer(DefaultBodyLimit::max(limits.max_profile_image_bytes + MULTIPART_OVERHEAD)),
        )
        .route("/patients/:therapist_id", get(users::get_patients))
}

fn exercise_routes() -> Router<AppState> {
    use protected::exercises;

    Router::new()
        .route("/exercise", post(exercises::create_exercise))
        .route("/exercises", get(exercises::list_exercises))
        .route(
            "/exercise/:exercise_id",
            get(exercises::get_exercise)
                .put(exercises::update_exercise)
                .delete(exercises::delete_exercise),
        )
}

fn patient_exercise_routes(limits: UploadLimits) -> Router<AppState> {
    use protected::{patient_exercises, recordings};

    Router::new()
        .route("/patientexercise", post(patient_exercises::create_assignments))
        .route(
            "/patientexercise/:id",
            get(patient_exercises::get_assignment)
                .put(patient_exercises::update_assignment)
                .delete(patient_exercises::delete_assignment),
        )
        .route("/patientexercise/:id/report", get(patient_exercises::assignment_report))
        .route("/patientexercises/:patient_id", get(patient_exercises::list_by_patient))
        .route(
            "/patientexercise/uploadrecording/:id",
            post(recordings::upload_recording).layer(DefaultBodyLimit::max(limits.max_recording_bytes + MULTIPART_OVERHEAD)),
        )
}

fn recording_routes() -> Router<AppState> {
    use protected::recordings;

    Router::new()
        .route("/getuploadurl/:id", post(recordings::get_upload_url))
        .route("/confirmupload/:id", post(recordings::confirm_upload))
        .route("/getdownloadurl/:id", get(recordings::get_download_url))
}

fn cors_layer(security: &SecurityConfig) -> CorsLayer {
    if !security.enable_cors {
        return CorsLayer::new();
    }
    if security.cors_origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = security
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}
