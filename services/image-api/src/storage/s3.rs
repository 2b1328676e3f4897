use super::post_policy::{sign_post_policy, SigningCredentials};
use super::{
    expiry_from_now, ObjectStore, ObjectSummary, PostPolicyRequest, PresignedAccess,
    PresignedPost, StorageError,
};
use crate::config::S3Config;
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::provider::{ProvideCredentials, SharedCredentialsProvider};
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::Client as S3Client;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, info, instrument};

/// S3-compatible object store
pub struct S3Store {
    client: S3Client,
    bucket: String,
    region: String,
    credentials: SharedCredentialsProvider,
    post_url: String,
}

impl S3Store {
    /// Create a new S3 store
    pub async fn new(config: &S3Config) -> Result<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()));

        if let (Some(access_key_id), Some(secret_access_key)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            loader = loader.credentials_provider(Credentials::new(
                access_key_id,
                secret_access_key,
                None,
                None,
                "image-api",
            ));
        }

        let aws_config = loader.load().await;
        let credentials = aws_config
            .credentials_provider()
            .context("No AWS credentials provider configured")?;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        // Configure custom endpoint for Tigris/MinIO/LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = S3Client::from_conf(s3_config_builder.build());
        let post_url = post_endpoint(
            config.endpoint_url.as_deref(),
            &config.region,
            &config.bucket,
            config.force_path_style,
        );

        info!(
            bucket = %config.bucket,
            region = %config.region,
            post_url = %post_url,
            "S3 store initialized"
        );

        Ok(Self {
            client,
            bucket: config.bucket.clone(),
            region: config.region.clone(),
            credentials,
            post_url,
        })
    }

    /// Get the bucket name
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn signing_credentials(&self) -> Result<SigningCredentials, StorageError> {
        let credentials = self
            .credentials
            .provide_credentials()
            .await
            .map_err(|e| StorageError::Credentials(DisplayErrorContext(&e).to_string()))?;

        Ok(SigningCredentials {
            access_key_id: credentials.access_key_id().to_string(),
            secret_access_key: credentials.secret_access_key().to_string(),
            session_token: credentials.session_token().map(String::from),
        })
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    #[instrument(skip(self))]
    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<ObjectSummary>, StorageError> {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .into_paginator()
            .send();

        let mut objects = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| StorageError::List {
                prefix: prefix.to_string(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

            objects.extend(page.contents().iter().filter_map(|obj| {
                let key = obj.key()?;
                Some(ObjectSummary {
                    key: key.to_string(),
                    size: obj.size().unwrap_or_default(),
                    last_modified: obj.last_modified().and_then(|t| {
                        DateTime::<Utc>::from_timestamp(t.secs(), t.subsec_nanos())
                    }),
                })
            }));
        }

        debug!(prefix = %prefix, count = objects.len(), "Listed objects");
        Ok(objects)
    }

    async fn presign_get(
        &self,
        key: &str,
        expires_in: Duration,
    ) -> Result<PresignedAccess, StorageError> {
        let presign_error = |message: String| StorageError::Presign {
            operation: "GET",
            key: key.to_string(),
            message,
        };

        let presigning_config =
            PresigningConfig::expires_in(expires_in).map_err(|e| presign_error(e.to_string()))?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning_config)
            .await
            .map_err(|e| presign_error(DisplayErrorContext(&e).to_string()))?;

        Ok(PresignedAccess {
            url: presigned.uri().to_string(),
            expires_at: expiry_from_now(expires_in),
        })
    }

    #[instrument(skip(self, request), fields(key = %request.key))]
    async fn presign_post(
        &self,
        request: &PostPolicyRequest,
    ) -> Result<PresignedPost, StorageError> {
        let credentials = self.signing_credentials().await?;
        let fields = sign_post_policy(request, &self.bucket, &self.region, &credentials, Utc::now())?;

        Ok(PresignedPost {
            url: self.post_url.clone(),
            fields,
        })
    }

    #[instrument(skip(self))]
    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::Delete {
                key: key.to_string(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        debug!(key = %key, "Object deleted");
        Ok(())
    }
}

/// URL a browser form POST targets for `bucket`
fn post_endpoint(
    endpoint_url: Option<&str>,
    region: &str,
    bucket: &str,
    force_path_style: bool,
) -> String {
    match endpoint_url.map(|e| e.trim_end_matches('/')) {
        Some(endpoint) if force_path_style => format!("{endpoint}/{bucket}"),
        Some(endpoint) => match endpoint.split_once("://") {
            Some((scheme, host)) => format!("{scheme}://{bucket}.{host}"),
            None => format!("https://{bucket}.{endpoint}"),
        },
        None if force_path_style => format!("https://s3.{region}.amazonaws.com/{bucket}"),
        None => format!("https://{bucket}.s3.{region}.amazonaws.com"),
    }
}
