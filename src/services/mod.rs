pub mod key_wrap;
pub mod recording_service;
pub mod storage;

pub use key_wrap::{AwsKms, KeyManagementService, KeyWrapError, KeyWrapper};
pub use recording_service::{RecordingError, RecordingService};
pub use storage::{file_extension, ObjectAcl, ObjectStorage, PresignedUrl, S3Storage, StorageError};

use aws_credential_types::Credentials;

/// Shared SDK config; static credentials win over the default provider chain when both halves are set
pub(crate) async fn aws_sdk_config(region: &str, access_key: Option<&str>, secret_key: Option<&str>) -> aws_config::SdkConfig {
    let mut loader =
        aws_config::defaults(aws_config::BehaviorVersion::latest()).region(aws_config::Region::new(region.to_string()));

    if let (Some(access), Some(secret)) = (access_key, secret_key) {
        loader = loader.credentials_provider(Credentials::new(access, secret, None, None, "speak-api"));
    }

    loader.load().await
}
