//! Object storage capability set.
//!
//! Everything the service does against the backend goes through [`ObjectStore`]:
//! list by prefix, presign GET, presign POST and delete. [`S3Store`] talks to an
//! S3-compatible endpoint, [`MemoryStore`] keeps objects in memory for tests.

pub mod memory;
pub mod post_policy;
pub mod s3;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

pub use memory::MemoryStore;
pub use s3::S3Store;

/// Errors returned by an object storage backend
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to list objects under {prefix}: {message}")]
    List { prefix: String, message: String },

    #[error("Failed to presign {operation} for {key}: {message}")]
    Presign {
        operation: &'static str,
        key: String,
        message: String,
    },

    #[error("Failed to delete {key}: {message}")]
    Delete { key: String, message: String },

    #[error("Storage credentials unavailable: {0}")]
    Credentials(String),
}

/// One object as reported by a listing
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectSummary {
    pub key: String,
    pub size: i64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Time-limited URL granting a single operation on one object
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PresignedAccess {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// Constraints baked into a presigned POST policy
#[derive(Debug, Clone, PartialEq)]
pub struct PostPolicyRequest {
    pub key: String,
    /// Exact Content-Type the upload must declare
    pub content_type: String,
    /// Inclusive upper bound of the content-length-range condition
    pub max_content_length: u64,
    pub expires_in: Duration,
}

/// Browser form upload descriptor: POST `fields` as multipart form data to `url`
#[derive(Debug, Clone, PartialEq)]
pub struct PresignedPost {
    pub url: String,
    pub fields: BTreeMap<String, String>,
}

/// Narrow interface over the object storage backend
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List every object whose key starts with `prefix`, in backend order
    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<ObjectSummary>, StorageError>;

    /// Presigned GET for `key`, valid for `expires_in`
    async fn presign_get(
        &self,
        key: &str,
        expires_in: Duration,
    ) -> Result<PresignedAccess, StorageError>;

    /// Presigned POST descriptor enforcing the request's constraints
    async fn presign_post(&self, request: &PostPolicyRequest)
        -> Result<PresignedPost, StorageError>;

    /// Delete `key`. Deleting an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// `now + expires_in` as a UTC timestamp
pub(crate) fn expiry_from_now(expires_in: Duration) -> DateTime<Utc> {
    let ttl = chrono::Duration::from_std(expires_in).unwrap_or(chrono::Duration::MAX);
    Utc::now()
        .checked_add_signed(ttl)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
