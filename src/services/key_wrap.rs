//! Envelope-key wrapping against an external KMS.
//!
//! Clients encrypt media with their own symmetric key and hand that key to us;
//! we persist only the KMS ciphertext (standard base64) and unwrap it again when
//! a download is requested. Nothing is cached locally.

use async_trait::async_trait;
use aws_sdk_kms::error::DisplayErrorContext;
use aws_sdk_kms::primitives::Blob;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::KmsConfig;

#[derive(Debug, Error)]
pub enum KeyWrapError {
    #[error("aes_key must not be empty")]
    EmptyKey,

    #[error("Wrapped key could not be decoded: {0}")]
    Decode(String),

    #[error("Key service error: {0}")]
    KeyService(String),

    #[error("Key service timed out after {0:?}")]
    Timeout(Duration),
}

/// Minimal Encrypt/Decrypt surface of a key-management service
#[async_trait]
pub trait KeyManagementService: Send + Sync {
    async fn encrypt(&self, key_id: &str, plaintext: &[u8]) -> Result<Vec<u8>, KeyWrapError>;
    async fn decrypt(&self, key_id: &str, ciphertext: &[u8]) -> Result<Vec<u8>, KeyWrapError>;
}

/// AWS KMS client built once at startup
pub struct AwsKms {
    client: aws_sdk_kms::Client,
}

impl AwsKms {
    pub async fn from_config(config: &KmsConfig) -> Self {
        let sdk = super::aws_sdk_config(&config.region, config.access_key.as_deref(), config.secret_key.as_deref())
            .await;
        Self { client: aws_sdk_kms::Client::new(&sdk) }
    }
}

#[async_trait]
impl KeyManagementService for AwsKms {
    async fn encrypt(&self, key_id: &str, plaintext: &[u8]) -> Result<Vec<u8>, KeyWrapError> {
        let output = self
            .client
            .encrypt()
            .key_id(key_id)
            .plaintext(Blob::new(plaintext))
            .send()
            .await
            .map_err(|e| KeyWrapError::KeyService(DisplayErrorContext(&e).to_string()))?;

        output
            .ciphertext_blob()
            .map(|blob| blob.as_ref().to_vec())
            .ok_or_else(|| KeyWrapError::KeyService("encrypt returned no ciphertext".to_string()))
    }

    async fn decrypt(&self, key_id: &str, ciphertext: &[u8]) -> Result<Vec<u8>, KeyWrapError> {
        let output = self
            .client
            .decrypt()
            .key_id(key_id)
            .ciphertext_blob(Blob::new(ciphertext))
            .send()
            .await
            .map_err(|e| KeyWrapError::KeyService(DisplayErrorContext(&e).to_string()))?;

        output
            .plaintext()
            .map(|blob| blob.as_ref().to_vec())
            .ok_or_else(|| KeyWrapError::KeyService("decrypt returned no plaintext".to_string()))
    }
}

/// Wraps and unwraps client content keys with the configured KMS key
#[derive(Clone)]
pub struct KeyWrapper {
    kms: Arc<dyn KeyManagementService>,
    key_id: String,
    timeout: Duration,
}

impl KeyWrapper {
    pub fn new(kms: Arc<dyn KeyManagementService>, key_id: impl Into<String>, timeout: Duration) -> Self {
        Self { kms, key_id: key_id.into(), timeout }
    }

    pub async fn wrap(&self, plaintext_key: &str) -> Result<String, KeyWrapError> {
        if plaintext_key.is_empty() {
            return Err(KeyWrapError::EmptyKey);
        }

        let ciphertext = tokio::time::timeout(self.timeout, self.kms.encrypt(&self.key_id, plaintext_key.as_bytes()))
            .await
            .map_err(|_| KeyWrapError::Timeout(self.timeout))?
            .inspect_err(|e| warn!(error = %e, "KMS encrypt failed"))?;

        debug!(ciphertext_len = ciphertext.len(), "Wrapped content key");
        Ok(STANDARD.encode(ciphertext))
    }

    pub async fn unwrap(&self, wrapped_key: &str) -> Result<String, KeyWrapError> {
        if wrapped_key.is_empty() {
            return Err(KeyWrapError::Decode("wrapped key is empty".to_string()));
        }
        let ciphertext = STANDARD
            .decode(wrapped_key)
            .map_err(|e| KeyWrapError::Decode(e.to_string()))?;

        let plaintext = tokio::time::timeout(self.timeout, self.kms.decrypt(&self.key_id, &ciphertext))
            .await
            .map_err(|_| KeyWrapError::Timeout(self.timeout))?
            .inspect_err(|e| warn!(error = %e, "KMS decrypt failed"))?;

        String::from_utf8(plaintext).map_err(|_| KeyWrapError::Decode("unwrapped key is not UTF-8".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeKms;

    fn wrapper(kms: FakeKms) -> KeyWrapper {
        KeyWrapper::new(Arc::new(kms), "test-key", Duration::from_secs(1))
    }

    #[tokio::test]
    async fn unwrap_inverts_wrap() {
        let keys = wrapper(FakeKms::default());
        let token = keys.wrap("0123456789abcdef").await.unwrap();
        assert_ne!(token, "0123456789abcdef");
        assert_eq!(keys.unwrap(&token).await.unwrap(), "0123456789abcdef");
    }

    #[tokio::test]
    async fn empty_key_never_reaches_kms() {
        let kms = FakeKms::default();
        let calls = kms.calls();
        let err = wrapper(kms).wrap("").await.unwrap_err();
        assert!(matches!(err, KeyWrapError::EmptyKey));
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn malformed_token_is_a_decode_error() {
        let err = wrapper(FakeKms::default()).unwrap("not base64!!").await.unwrap_err();
        assert!(matches!(err, KeyWrapError::Decode(_)));
    }

    #[tokio::test]
    async fn rejected_token_is_a_key_service_error() {
        let keys = wrapper(FakeKms::default());
        let foreign = STANDARD.encode(b"ciphertext from another key");
        let err = keys.unwrap(&foreign).await.unwrap_err();
        assert!(matches!(err, KeyWrapError::KeyService(_)));
    }

    #[tokio::test]
    async fn failing_kms_surfaces_key_service_error() {
        let err = wrapper(FakeKms::failing()).wrap("k").await.unwrap_err();
        assert!(matches!(err, KeyWrapError::KeyService(_)));
    }
}
