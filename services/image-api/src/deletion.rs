use crate::config::Config;
use crate::error::{Error, Result};
use crate::keys::KeyCodec;
use crate::storage::ObjectStore;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, Serialize)]
pub struct DeleteOutcome {
    pub success: bool,
    pub message: String,
    pub key: String,
}

/// Deletes objects, but only inside the managed namespace
pub struct DeletionGate {
    store: Arc<dyn ObjectStore>,
    codec: KeyCodec,
}

impl DeletionGate {
    pub fn new(store: Arc<dyn ObjectStore>, config: &Config) -> Self {
        Self {
            store,
            codec: KeyCodec::new(&config.storage.namespace),
        }
    }

    /// Delete `key`. Absent keys succeed like present ones.
    #[instrument(skip(self))]
    pub async fn delete_image(&self, key: &str) -> Result<DeleteOutcome> {
        if key.is_empty() {
            return Err(Error::BadRequest("Missing required parameter: key".to_string()));
        }

        if !self.codec.is_within_namespace(key) {
            warn!(key = %key, "Rejected delete outside namespace");
            return Err(Error::Forbidden(format!(
                "Only keys under {} can be deleted",
                self.codec.prefix()
            )));
        }

        self.store.delete(key).await?;

        metrics::counter!("image_api_deletes_total").increment(1);
        info!(key = %key, "Image deleted");

        Ok(DeleteOutcome {
            success: true,
            message: "Image deleted successfully".to_string(),
            key: key.to_string(),
        })
    }
}
