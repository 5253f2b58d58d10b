use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::TokenKeys;
use crate::config::AppConfig;
use crate::database::{manager, PgStore, Store};
use crate::services::{AwsKms, KeyManagementService, KeyWrapper, ObjectStorage, RecordingService, S3Storage};

/// Request body ceilings for multipart endpoints
#[derive(Debug, Clone, Copy)]
pub struct UploadLimits {
    pub max_recording_bytes: usize,
    pub max_profile_image_bytes: usize,
}

/// Shared clients, built once at startup and cloned into every request
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub storage: Arc<dyn ObjectStorage>,
    pub recordings: Arc<RecordingService>,
    pub tokens: TokenKeys,
    pub limits: UploadLimits,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        kms: Arc<dyn KeyManagementService>,
        storage: Arc<dyn ObjectStorage>,
        config: &AppConfig,
    ) -> Self {
        let keys = KeyWrapper::new(kms, config.kms.key_id.clone(), config.kms.timeout());
        let recordings = RecordingService::new(store.clone(), keys, storage.clone(), config.storage.presign_ttl());

        Self {
            store,
            storage,
            recordings: Arc::new(recordings),
            tokens: TokenKeys::from_config(&config.security),
            limits: UploadLimits {
                max_recording_bytes: config.storage.max_recording_bytes,
                max_profile_image_bytes: config.storage.max_profile_image_bytes,
            },
        }
    }

    /// Connects Postgres, KMS and object storage from configuration
    pub async fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let pool = manager::connect(&config.database)?;
        if config.database.auto_migrate {
            manager::migrate(&pool).await?;
        }

        if config.kms.key_id.is_empty() {
            warn!("KMS_KEY_ID is not set; recording uploads will fail");
        }
        if config.security.jwt_secret.is_empty() {
            warn!("SECRET_KEY is not set; logins will fail");
        }

        let store = Arc::new(PgStore::new(pool, config.database.query_timeout()));
        let kms = Arc::new(AwsKms::from_config(&config.kms).await);
        let storage = Arc::new(S3Storage::from_config(&config.storage).await);

        info!(environment = ?config.environment, "Application state ready");
        Ok(Self::new(store, kms, storage, config))
    }
}
