// handlers/mod.rs - Public (no auth) and protected (bearer JWT) handler tiers

pub mod protected;
pub mod public;

use axum::extract::{FromRequest, Multipart};
use bytes::Bytes;
use serde::Serialize;

use crate::error::ApiError;

/// `Json` extractor whose rejections use the API error envelope
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct AppJson<T>(pub T);

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// `{ message, location }` answer for direct uploads
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub location: String,
}

pub(crate) const NAME_MIN: usize = 2;
pub(crate) const NAME_MAX: usize = 100;

pub(crate) fn validate_name(field: &str, value: &str) -> Result<String, ApiError> {
    let trimmed = value.trim();
    let len = trimmed.chars().count();
    if !(NAME_MIN..=NAME_MAX).contains(&len) {
        return Err(ApiError::field_error(field, format!("must be {NAME_MIN}-{NAME_MAX} characters")));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn validate_email(value: &str) -> Result<String, ApiError> {
    let email = value.trim().to_ascii_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        return Err(ApiError::field_error("email", "is not a valid address"));
    }
    Ok(email)
}

/// Treats missing and blank strings alike
pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// A `file` part plus any text fields that came with it
#[derive(Debug, Default)]
pub(crate) struct UploadForm {
    pub file: Option<Bytes>,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub aes_key: Option<String>,
}

/// Drains a multipart body, rejecting files above `max_bytes`
pub(crate) async fn read_upload_form(mut multipart: Multipart, max_bytes: usize) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart.next_field().await? {
        match field.name() {
            Some("file") => {
                form.file_name = field.file_name().map(str::to_string);
                form.content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await?;
                if bytes.len() > max_bytes {
                    return Err(ApiError::payload_too_large(format!("file exceeds {max_bytes} bytes")));
                }
                form.file = Some(bytes);
            }
            Some("aes_key") => form.aes_key = Some(field.text().await?),
            _ => {}
        }
    }

    Ok(form)
}
