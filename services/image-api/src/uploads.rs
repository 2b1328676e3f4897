use crate::config::Config;
use crate::error::{Error, Result};
use crate::keys::KeyCodec;
use crate::storage::{expiry_from_now, ObjectStore, PostPolicyRequest, PresignedAccess};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};

/// Everything a client needs to POST one file straight to the bucket
#[derive(Debug, Clone, Serialize)]
pub struct UploadIntent {
    pub key: String,
    pub content_type: String,
    /// Validity of the upload descriptor in seconds
    pub expires_in: u64,
    pub expires_at: DateTime<Utc>,
    pub upload_url: String,
    pub upload_fields: BTreeMap<String, String>,
    /// Public URL the object is served from once uploaded
    pub download_url: String,
}

/// Presigned GET issued for an explicit download request
#[derive(Debug, Clone, Serialize)]
pub struct DownloadUrl {
    pub download_url: String,
    pub expires_in: u64,
    pub expires_at: DateTime<Utc>,
}

/// Issues presigned upload descriptors and download URLs
pub struct UploadService {
    store: Arc<dyn ObjectStore>,
    codec: KeyCodec,
    public_endpoint: String,
    max_upload_bytes: u64,
    upload_expiry: Duration,
    default_download_expiry_secs: u64,
    max_download_expiry_secs: u64,
}

impl UploadService {
    pub fn new(store: Arc<dyn ObjectStore>, config: &Config) -> Self {
        Self {
            store,
            codec: KeyCodec::new(&config.storage.namespace),
            public_endpoint: config.s3.public_endpoint.trim_end_matches('/').to_string(),
            max_upload_bytes: config.storage.max_upload_bytes,
            upload_expiry: config.upload_expiry(),
            default_download_expiry_secs: config.storage.download_expiry_secs,
            max_download_expiry_secs: config.storage.max_download_expiry_secs,
        }
    }

    /// Presigned POST for a new object named `filename` of type `content_type`
    #[instrument(skip(self))]
    pub async fn create_upload_intent(
        &self,
        filename: &str,
        content_type: &str,
    ) -> Result<UploadIntent> {
        if filename.is_empty() || content_type.is_empty() {
            return Err(Error::BadRequest(
                "Missing required parameters: filename and content_type".to_string(),
            ));
        }

        let key = self
            .codec
            .generate_key(filename)
            .map_err(|e| Error::BadRequest(e.to_string()))?;

        let request = PostPolicyRequest {
            key: key.clone(),
            content_type: content_type.to_string(),
            max_content_length: self.max_upload_bytes,
            expires_in: self.upload_expiry,
        };
        let presigned = self.store.presign_post(&request).await?;

        metrics::counter!("image_api_upload_intents_total").increment(1);
        info!(key = %key, "Issued upload intent");

        Ok(UploadIntent {
            download_url: format!("{}/{}", self.public_endpoint, key),
            key,
            content_type: content_type.to_string(),
            expires_in: self.upload_expiry.as_secs(),
            expires_at: expiry_from_now(self.upload_expiry),
            upload_url: presigned.url,
            upload_fields: presigned.fields,
        })
    }

    /// Presigned GET for `key`, valid `expires_in` seconds (configured default when `None`)
    #[instrument(skip(self))]
    pub async fn create_download_url(
        &self,
        key: &str,
        expires_in: Option<u64>,
    ) -> Result<DownloadUrl> {
        if key.is_empty() {
            return Err(Error::BadRequest("Missing required parameter: key".to_string()));
        }

        let expires_in = expires_in.unwrap_or(self.default_download_expiry_secs);
        if expires_in == 0 || expires_in > self.max_download_expiry_secs {
            return Err(Error::BadRequest(format!(
                "expires_in must be between 1 and {} seconds",
                self.max_download_expiry_secs
            )));
        }

        let PresignedAccess { url, expires_at } = self
            .store
            .presign_get(key, Duration::from_secs(expires_in))
            .await?;

        metrics::counter!("image_api_download_urls_total").increment(1);
        Ok(DownloadUrl {
            download_url: url,
            expires_in,
            expires_at,
        })
    }
}
