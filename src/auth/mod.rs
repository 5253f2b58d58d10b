pub mod password;

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::SecurityConfig;
use crate::database::models::{Role, User};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("JWT secret not configured")]
    MissingSecret,

    #[error("JWT generation error: {0}")]
    TokenGeneration(String),

    #[error("Invalid JWT token: {0}")]
    InvalidToken(String),

    #[error("Token has the wrong type for this endpoint")]
    WrongTokenKind,

    #[error("Password hashing error: {0}")]
    Hashing(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub kind: TokenKind,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Debug, Serialize)]
pub struct TokenPair {
    pub token: String,
    pub refresh_token: String,
}

/// Longest lifetime a token can be configured with (ten years)
const MAX_TOKEN_HOURS: u64 = 24 * 365 * 10;

fn token_ttl(hours: u64) -> Duration {
    Duration::hours(hours.min(MAX_TOKEN_HOURS) as i64)
}

/// HS256 signing material plus token lifetimes
#[derive(Clone)]
pub struct TokenKeys {
    secret: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenKeys {
    pub fn new(secret: impl Into<String>, access_hours: u64, refresh_hours: u64) -> Self {
        Self {
            secret: secret.into(),
            access_ttl: token_ttl(access_hours),
            refresh_ttl: token_ttl(refresh_hours),
        }
    }

    pub fn from_config(config: &SecurityConfig) -> Self {
        Self::new(config.jwt_secret.clone(), config.access_token_hours, config.refresh_token_hours)
    }

    pub fn issue(&self, user: &User, kind: TokenKind) -> Result<String, AuthError> {
        if self.secret.is_empty() {
            return Err(AuthError::MissingSecret);
        }

        let now = Utc::now();
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let claims = Claims {
            sub: user.user_id.clone(),
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            role: user.role,
            kind,
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::default(), &claims, &EncodingKey::from_secret(self.secret.as_bytes()))
            .map_err(|e| AuthError::TokenGeneration(e.to_string()))
    }

    pub fn issue_pair(&self, user: &User) -> Result<TokenPair, AuthError> {
        Ok(TokenPair {
            token: self.issue(user, TokenKind::Access)?,
            refresh_token: self.issue(user, TokenKind::Refresh)?,
        })
    }

    /// Decode, check signature and expiry, and insist on the expected token kind
    pub fn validate(&self, token: &str, expected: TokenKind) -> Result<Claims, AuthError> {
        if self.secret.is_empty() {
            return Err(AuthError::MissingSecret);
        }

        let data = decode::<Claims>(token, &DecodingKey::from_secret(self.secret.as_bytes()), &Validation::default())
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        if data.claims.kind != expected {
            return Err(AuthError::WrongTokenKind);
        }
        Ok(data.claims)
    }
}
