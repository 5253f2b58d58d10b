use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use bytes::Bytes;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::StorageConfig;

const MAX_EXTENSION_LEN: usize = 8;

/// Lowercased object-key extension: 1-8 ASCII alphanumerics, `default` when absent
pub fn file_extension(raw: Option<&str>, default: &str) -> Result<String, String> {
    let ext = raw.map(|e| e.trim().trim_start_matches('.')).unwrap_or_default();
    if ext.is_empty() {
        return Ok(default.to_string());
    }
    if ext.len() > MAX_EXTENSION_LEN || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(format!("extension must be 1-{MAX_EXTENSION_LEN} alphanumeric characters"));
    }
    Ok(ext.to_ascii_lowercase())
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Could not presign request: {0}")]
    Presign(String),

    #[error("Object storage request failed: {0}")]
    Request(String),

    #[error("Object storage timed out after {0:?}")]
    Timeout(Duration),
}

/// Canned ACL applied on direct puts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectAcl {
    Private,
    PublicRead,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresignedUrl {
    pub url: String,
    pub expires_in: Duration,
}

/// The slice of an S3-compatible API the recording and profile flows rely on
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn presign_put(&self, key: &str, expires_in: Duration) -> Result<PresignedUrl, StorageError>;
    async fn presign_get(&self, key: &str, expires_in: Duration) -> Result<PresignedUrl, StorageError>;
    async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        content_type: Option<&str>,
        acl: ObjectAcl,
    ) -> Result<(), StorageError>;
    async fn object_exists(&self, key: &str) -> Result<bool, StorageError>;
    /// Stable URL the object is reachable at once uploaded
    fn public_url(&self, key: &str) -> String;
}

pub struct S3Storage {
    client: aws_sdk_s3::Client,
    bucket: String,
    public_base_url: String,
    timeout: Duration,
}

impl S3Storage {
    pub async fn from_config(config: &StorageConfig) -> Self {
        let sdk = super::aws_sdk_config(&config.region, config.access_key.as_deref(), config.secret_key.as_deref())
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        info!(bucket = %config.bucket, endpoint = ?config.endpoint, "Configured object storage");
        Self {
            client: aws_sdk_s3::Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
            public_base_url: config.public_base_url.trim_end_matches('/').to_string(),
            timeout: config.transfer_timeout(),
        }
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T, StorageError>
    where
        F: Future<Output = Result<T, StorageError>>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| StorageError::Timeout(self.timeout))?
    }
}

fn presigning(expires_in: Duration) -> Result<PresigningConfig, StorageError> {
    PresigningConfig::expires_in(expires_in).map_err(|e| StorageError::Presign(e.to_string()))
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn presign_put(&self, key: &str, expires_in: Duration) -> Result<PresignedUrl, StorageError> {
        let request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning(expires_in)?)
            .await
            .map_err(|e| StorageError::Presign(DisplayErrorContext(&e).to_string()))?;

        debug!(key, ?expires_in, "Presigned PUT");
        Ok(PresignedUrl { url: request.uri().to_string(), expires_in })
    }

    async fn presign_get(&self, key: &str, expires_in: Duration) -> Result<PresignedUrl, StorageError> {
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning(expires_in)?)
            .await
            .map_err(|e| StorageError::Presign(DisplayErrorContext(&e).to_string()))?;

        debug!(key, ?expires_in, "Presigned GET");
        Ok(PresignedUrl { url: request.uri().to_string(), expires_in })
    }

    async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        content_type: Option<&str>,
        acl: ObjectAcl,
    ) -> Result<(), StorageError> {
        let canned = match acl {
            ObjectAcl::Private => ObjectCannedAcl::Private,
            ObjectAcl::PublicRead => ObjectCannedAcl::PublicRead,
        };
        let size = body.len();

        self.bounded(async {
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(key)
                .acl(canned)
                .set_content_type(content_type.map(str::to_string))
                .body(ByteStream::from(body))
                .send()
                .await
                .map_err(|e| StorageError::Request(DisplayErrorContext(&e).to_string()))?;
            Ok(())
        })
        .await?;

        info!(key, size, "Stored object");
        Ok(())
    }

    async fn object_exists(&self, key: &str) -> Result<bool, StorageError> {
        self.bounded(async {
            match self.client.head_object().bucket(&self.bucket).key(key).send().await {
                Ok(_) => Ok(true),
                Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => Ok(false),
                Err(e) => Err(StorageError::Request(DisplayErrorContext(&e).to_string())),
            }
        })
        .await
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }
}
