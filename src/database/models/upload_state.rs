//! Recording lifecycle for a patient-exercise assignment.
//!
//! ```text
//!  pending ──CredentialIssued──▶ credential_issued ──UploadVerified──▶ completed
//!     │                                                                  ▲
//!     └──────────────────────────ServerUploaded──────────────────────────┘
//! ```
//!
//! Issuing an upload URL never completes an assignment on its own; only a verified
//! object (HEAD after a client upload, or a successful server-side put) does.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::UnknownVariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadState {
    Pending,
    CredentialIssued,
    Completed,
}

/// Externally visible status of an assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentStatus {
    Pending,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadEvent {
    /// A presigned PUT was handed out and the wrapped key stored
    CredentialIssued,
    /// The object was observed in storage after a client-side upload
    UploadVerified,
    /// The server itself streamed the object to storage
    ServerUploaded,
    /// Direct status edit back to pending
    Reset,
    /// Direct status edit to completed; only accepted for records already completed
    MarkCompleted,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot apply {event:?} to an assignment in state {from}")]
pub struct TransitionError {
    pub from: UploadState,
    pub event: UploadEvent,
}

impl UploadState {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadState::Pending => "pending",
            UploadState::CredentialIssued => "credential_issued",
            UploadState::Completed => "completed",
        }
    }

    pub fn status(&self) -> AssignmentStatus {
        match self {
            UploadState::Completed => AssignmentStatus::Completed,
            UploadState::Pending | UploadState::CredentialIssued => AssignmentStatus::Pending,
        }
    }

    pub fn apply(self, event: UploadEvent) -> Result<UploadState, TransitionError> {
        match (self, event) {
            // Re-issuing replaces the wrapped key; a completed recording may be re-recorded
            (_, UploadEvent::CredentialIssued) => Ok(UploadState::CredentialIssued),
            (UploadState::Pending, UploadEvent::UploadVerified) => Err(TransitionError { from: self, event }),
            (_, UploadEvent::UploadVerified) => Ok(UploadState::Completed),
            (_, UploadEvent::ServerUploaded) => Ok(UploadState::Completed),
            (_, UploadEvent::Reset) => Ok(UploadState::Pending),
            // Completion from an edit needs a verified object; see RecordingService::confirm_upload
            (UploadState::Completed, UploadEvent::MarkCompleted) => Ok(UploadState::Completed),
            (_, UploadEvent::MarkCompleted) => Err(TransitionError { from: self, event }),
        }
    }
}

impl fmt::Display for UploadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for UploadState {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "pending" => Ok(UploadState::Pending),
            "credential_issued" => Ok(UploadState::CredentialIssued),
            "completed" => Ok(UploadState::Completed),
            _ => Err(UnknownVariant { kind: "upload state", value }),
        }
    }
}

impl AssignmentStatus {
    /// Event a direct status edit maps onto
    pub fn edit_event(&self) -> UploadEvent {
        match self {
            AssignmentStatus::Pending => UploadEvent::Reset,
            AssignmentStatus::Completed => UploadEvent::MarkCompleted,
        }
    }
}

impl FromStr for AssignmentStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(AssignmentStatus::Pending),
            "completed" => Ok(AssignmentStatus::Completed),
            _ => Err(UnknownVariant { kind: "status", value: s.to_string() }),
        }
    }
}
