//! S3-compatible backup client.

use std::path::Path;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Builder;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use aws_types::region::Region;
use serde::Deserialize;
use tracing::{debug, info};

use crate::backup::{content_type_for, object_key, BackupStorage};
use crate::error::{StorageError, StorageResult};

fn default_region() -> String {
    "auto".to_string()
}

/// Connection settings for an S3-compatible bucket.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct S3BackupConfig {
    /// S3 API endpoint URL
    pub endpoint_url: String,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Bucket name
    pub bucket_name: String,
    /// Region ("auto" for most S3-compatible providers)
    #[serde(default = "default_region")]
    pub region: String,
}

impl S3BackupConfig {
    /// Create config from `BACKUP_S3_*` environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self {
            endpoint_url: std::env::var("BACKUP_S3_ENDPOINT_URL")
                .map_err(|_| StorageError::config_error("BACKUP_S3_ENDPOINT_URL not set"))?,
            access_key_id: std::env::var("BACKUP_S3_ACCESS_KEY_ID")
                .map_err(|_| StorageError::config_error("BACKUP_S3_ACCESS_KEY_ID not set"))?,
            secret_access_key: std::env::var("BACKUP_S3_SECRET_ACCESS_KEY")
                .map_err(|_| StorageError::config_error("BACKUP_S3_SECRET_ACCESS_KEY not set"))?,
            bucket_name: std::env::var("BACKUP_S3_BUCKET_NAME")
                .map_err(|_| StorageError::config_error("BACKUP_S3_BUCKET_NAME not set"))?,
            region: std::env::var("BACKUP_S3_REGION").unwrap_or_else(|_| default_region()),
        })
    }

    /// Reject settings that can never connect.
    pub fn validate(&self) -> StorageResult<()> {
        if self.endpoint_url.trim().is_empty() {
            return Err(StorageError::config_error("endpoint_url is empty"));
        }
        if self.bucket_name.trim().is_empty() {
            return Err(StorageError::config_error("bucket_name is empty"));
        }
        Ok(())
    }
}

/// Backup storage in an S3-compatible bucket.
#[derive(Clone)]
pub struct S3BackupClient {
    client: Client,
    bucket: String,
}

impl S3BackupClient {
    /// Create a new client from configuration.
    pub fn new(config: S3BackupConfig) -> StorageResult<Self> {
        config.validate()?;

        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "livecut-backup",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(sdk_config),
            bucket: config.bucket_name,
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Self::new(S3BackupConfig::from_env()?)
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl BackupStorage for S3BackupClient {
    async fn upload(&self, path: &Path, destination: &str) -> StorageResult<String> {
        let key = object_key(path, destination)?;
        debug!("Uploading {} to {}/{}", path.display(), self.bucket, key);

        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(body)
            .content_type(content_type_for(path))
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        info!("Uploaded {} to {}", path.display(), key);
        Ok(key)
    }
}
