//! Recording transfer coordinator.
//!
//! Drives the assignment upload state machine across the key wrapper, object
//! storage and the metadata store. Two upload paths exist: the client-mediated
//! one (presigned PUT, then an explicit confirmation that HEADs the object) and
//! a server-mediated multipart upload that completes once the put succeeds.

use bytes::Bytes;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use super::key_wrap::{KeyWrapError, KeyWrapper};
use super::storage::{file_extension, ObjectAcl, ObjectStorage, StorageError};
use crate::database::models::{AssignmentPatch, PatientExercise, TransitionError, UploadEvent};
use crate::database::{DatabaseError, PatientExerciseStore, Store};

const DEFAULT_EXTENSION: &str = "mp4";

#[derive(Debug, Error)]
pub enum RecordingError {
    #[error("Patient exercise not found")]
    NotFound,

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Key(#[from] KeyWrapError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Persistence(DatabaseError),
}

impl From<DatabaseError> for RecordingError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound(_) => RecordingError::NotFound,
            other => RecordingError::Persistence(other),
        }
    }
}

impl From<TransitionError> for RecordingError {
    fn from(err: TransitionError) -> Self {
        RecordingError::Validation(err.to_string())
    }
}

#[derive(Debug, Serialize)]
pub struct UploadTicket {
    pub upload_url: String,
    pub object_key: String,
    pub expires_in_secs: u64,
}

#[derive(Debug, Serialize)]
pub struct DownloadTicket {
    pub download_url: String,
    pub aes_key: String,
    pub expires_in_secs: u64,
}

/// Where a recording lives inside the bucket
pub fn object_key(patient_exercise_id: &str, extension: &str) -> String {
    format!("recordings/{patient_exercise_id}.{extension}")
}

/// Normalises a client-supplied extension; absent or blank means mp4
pub fn recording_extension(raw: Option<&str>) -> Result<String, RecordingError> {
    file_extension(raw, DEFAULT_EXTENSION).map_err(RecordingError::Validation)
}

pub struct RecordingService {
    store: Arc<dyn Store>,
    keys: KeyWrapper,
    storage: Arc<dyn ObjectStorage>,
    presign_ttl: Duration,
}

impl RecordingService {
    pub fn new(store: Arc<dyn Store>, keys: KeyWrapper, storage: Arc<dyn ObjectStorage>, presign_ttl: Duration) -> Self {
        Self { store, keys, storage, presign_ttl }
    }

    async fn load(&self, id: &str) -> Result<PatientExercise, RecordingError> {
        self.store.find_assignment(id).await?.ok_or(RecordingError::NotFound)
    }

    fn wrap_error(err: KeyWrapError) -> RecordingError {
        match err {
            KeyWrapError::EmptyKey => RecordingError::Validation(err.to_string()),
            other => RecordingError::Key(other),
        }
    }

    /// Wraps the client key and hands back a presigned PUT. The assignment stays
    /// `pending` until [`confirm_upload`](Self::confirm_upload) sees the object.
    pub async fn issue_upload_url(
        &self,
        id: &str,
        aes_key: &str,
        extension: Option<&str>,
    ) -> Result<UploadTicket, RecordingError> {
        let assignment = self.load(id).await?;
        let key = object_key(id, &recording_extension(extension)?);
        let next = assignment.upload_state.apply(UploadEvent::CredentialIssued)?;

        let wrapped = self.keys.wrap(aes_key).await.map_err(Self::wrap_error)?;
        let presigned = self.storage.presign_put(&key, self.presign_ttl).await?;

        let patch = AssignmentPatch {
            upload_state: Some(next),
            recording: Some(String::new()),
            recording_key: Some(key.clone()),
            wrapped_key: Some(wrapped),
        };
        self.store.update_assignment(id, &patch).await?;

        info!(patient_exercise_id = id, object_key = %key, "Issued upload credential");
        Ok(UploadTicket {
            upload_url: presigned.url,
            object_key: key,
            expires_in_secs: presigned.expires_in.as_secs(),
        })
    }

    /// Marks the assignment completed once the uploaded object is visible in storage
    pub async fn confirm_upload(&self, id: &str) -> Result<PatientExercise, RecordingError> {
        let assignment = self.load(id).await?;
        let next = assignment.upload_state.apply(UploadEvent::UploadVerified)?;

        if assignment.recording_key.is_empty() {
            return Err(RecordingError::Validation("no upload credential has been issued".to_string()));
        }
        if !self.storage.object_exists(&assignment.recording_key).await? {
            warn!(patient_exercise_id = id, object_key = %assignment.recording_key, "Confirmation before upload");
            return Err(RecordingError::Validation("recording has not been uploaded".to_string()));
        }

        let patch = AssignmentPatch {
            upload_state: Some(next),
            recording: Some(self.storage.public_url(&assignment.recording_key)),
            ..Default::default()
        };
        let updated = self.store.update_assignment(id, &patch).await?;

        info!(patient_exercise_id = id, "Recording upload confirmed");
        Ok(updated)
    }

    /// Server-mediated upload of an already encrypted file; returns its public location
    pub async fn upload_recording(
        &self,
        id: &str,
        aes_key: &str,
        file_name: Option<&str>,
        content_type: Option<&str>,
        body: Bytes,
    ) -> Result<String, RecordingError> {
        let assignment = self.load(id).await?;
        if body.is_empty() {
            return Err(RecordingError::Validation("file is empty".to_string()));
        }

        let extension = file_name
            .and_then(|name| Path::new(name).extension())
            .and_then(|ext| ext.to_str());
        let key = object_key(id, &recording_extension(extension)?);
        let next = assignment.upload_state.apply(UploadEvent::ServerUploaded)?;

        let wrapped = self.keys.wrap(aes_key).await.map_err(Self::wrap_error)?;
        self.storage.put_object(&key, body, content_type, ObjectAcl::Private).await?;

        let location = self.storage.public_url(&key);
        let patch = AssignmentPatch {
            upload_state: Some(next),
            recording: Some(location.clone()),
            recording_key: Some(key),
            wrapped_key: Some(wrapped),
        };
        self.store.update_assignment(id, &patch).await?;

        info!(patient_exercise_id = id, location = %location, "Recording uploaded through server");
        Ok(location)
    }

    /// Unwraps the stored key and presigns a GET; only completed recordings qualify
    pub async fn download_url(&self, id: &str) -> Result<DownloadTicket, RecordingError> {
        let assignment = self.load(id).await?;
        if !assignment.is_retrievable() {
            return Err(RecordingError::NotFound);
        }

        let aes_key = self.keys.unwrap(&assignment.wrapped_key).await?;
        let presigned = self.storage.presign_get(&assignment.recording_key, self.presign_ttl).await?;

        info!(patient_exercise_id = id, "Issued download credential");
        Ok(DownloadTicket {
            download_url: presigned.url,
            aes_key,
            expires_in_secs: presigned.expires_in.as_secs(),
        })
    }
}
