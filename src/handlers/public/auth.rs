// handlers/public/auth.rs - POST /signup, /login, /refresh

use axum::extract::State;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::auth::password::{generate_reference_code, hash_password, verify_password};
use crate::auth::TokenKind;
use crate::database::models::{new_id, Role, User};
use crate::database::UserStore;
use crate::error::ApiError;
use crate::handlers::{validate_email, validate_name, AppJson};
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;

const PASSWORD_MIN: usize = 6;
const REFERENCE_CODE_ATTEMPTS: usize = 5;

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
    pub refresh_token: String,
}

async fn unique_reference_code(state: &AppState) -> Result<String, ApiError> {
    for _ in 0..REFERENCE_CODE_ATTEMPTS {
        let code = generate_reference_code();
        if state.store.find_therapist_by_code(&code).await?.is_none() {
            return Ok(code);
        }
    }
    Err(ApiError::internal_server_error("Could not allocate a reference code"))
}

/// POST /signup - create a patient or therapist account and sign it in
pub async fn signup(State(state): State<AppState>, AppJson(req): AppJson<SignupRequest>) -> ApiResult<AuthResponse> {
    let first_name = validate_name("first_name", &req.first_name)?;
    let last_name = validate_name("last_name", &req.last_name)?;
    let email = validate_email(&req.email)?;
    if req.password.chars().count() < PASSWORD_MIN {
        return Err(ApiError::field_error("password", format!("must be at least {PASSWORD_MIN} characters")));
    }
    let role: Role = req.role.parse().map_err(|_| ApiError::field_error("role", "must be patient or therapist"))?;

    if state.store.find_user_by_email(&email).await?.is_some() {
        return Err(ApiError::conflict("Email already exists"));
    }

    let reference_code = match role {
        Role::Therapist => Some(unique_reference_code(&state).await?),
        Role::Patient => None,
    };

    let now = Utc::now();
    let user = User {
        user_id: new_id(),
        first_name,
        last_name,
        email,
        password_hash: hash_password(&req.password)?,
        role,
        reference_code,
        profile_image: None,
        created_at: now,
        updated_at: now,
    };
    state.store.insert_user(&user).await?;

    let tokens = state.tokens.issue_pair(&user)?;
    info!(user_id = %user.user_id, role = role.as_str(), "User signed up");

    Ok(ApiResponse::created(AuthResponse { user, token: tokens.token, refresh_token: tokens.refresh_token }))
}

/// POST /login - exchange email and password for an access/refresh token pair
pub async fn login(State(state): State<AppState>, AppJson(req): AppJson<LoginRequest>) -> ApiResult<AuthResponse> {
    let invalid = || ApiError::unauthorized("Invalid email or password");

    let user = state
        .store
        .find_user_by_email(&req.email.trim().to_ascii_lowercase())
        .await?
        .ok_or_else(invalid)?;

    if !verify_password(&req.password, &user.password_hash)? {
        warn!(user_id = %user.user_id, "Failed login attempt");
        return Err(invalid());
    }

    let tokens = state.tokens.issue_pair(&user)?;
    info!(user_id = %user.user_id, "User logged in");

    Ok(ApiResponse::success(AuthResponse { user, token: tokens.token, refresh_token: tokens.refresh_token }))
}

/// POST /refresh - trade a refresh token for a fresh pair
pub async fn refresh(
    State(state): State<AppState>,
    AppJson(req): AppJson<RefreshRequest>,
) -> ApiResult<crate::auth::TokenPair> {
    let claims = state.tokens.validate(&req.refresh_token, TokenKind::Refresh)?;

    let user = state
        .store
        .find_user(&claims.sub)
        .await?
        .ok_or_else(|| ApiError::unauthorized("User no longer exists"))?;

    Ok(ApiResponse::success(state.tokens.issue_pair(&user)?))
}
