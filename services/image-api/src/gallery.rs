//! Gallery listing: list the namespace, keep images, attach an access URL to each.

use crate::config::{Config, GalleryUrls};
use crate::error::{Error, Result};
use crate::keys::{filename_of, is_image_key, KeyCodec};
use crate::storage::{ObjectStore, ObjectSummary, PresignedAccess};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Validity of gallery presigned URLs
pub const GALLERY_URL_EXPIRY: Duration = Duration::from_secs(3600);

/// Bytes escaped when a filename becomes a single URL path segment
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// One stored image with a URL the browser can load
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryImage {
    pub key: String,
    pub url: String,
    pub size: i64,
    pub last_modified: Option<DateTime<Utc>>,
    pub filename: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Gallery {
    pub images: Vec<GalleryImage>,
    pub count: usize,
}

pub struct GalleryService {
    store: Arc<dyn ObjectStore>,
    codec: KeyCodec,
    urls: GalleryUrls,
    public_base_url: String,
}

impl GalleryService {
    pub fn new(store: Arc<dyn ObjectStore>, config: &Config) -> Self {
        Self {
            store,
            codec: KeyCodec::new(&config.storage.namespace),
            urls: config.storage.gallery_urls,
            public_base_url: config.api.public_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Every image under the namespace, in listing order.
    ///
    /// A failed listing fails the call; an image whose URL cannot be produced
    /// is dropped and the rest are still returned.
    #[instrument(skip(self))]
    pub async fn list_gallery(&self) -> Result<Gallery> {
        let objects = self.store.list_by_prefix(self.codec.prefix()).await?;
        let total = objects.len();

        let pending = objects
            .into_iter()
            .filter(|object| is_image_key(&object.key))
            .map(|object| self.resolve(object));

        let images: Vec<GalleryImage> = join_all(pending).await.into_iter().flatten().collect();

        metrics::gauge!("image_api_gallery_images").set(images.len() as f64);
        debug!(listed = total, images = images.len(), "Gallery assembled");

        Ok(Gallery {
            count: images.len(),
            images,
        })
    }

    async fn resolve(&self, object: ObjectSummary) -> Option<GalleryImage> {
        let url = match self.urls {
            GalleryUrls::Presigned => {
                match self.store.presign_get(&object.key, GALLERY_URL_EXPIRY).await {
                    Ok(access) => access.url,
                    Err(e) => {
                        warn!(error = %e, key = %object.key, "Dropping image without presigned URL");
                        metrics::counter!("image_api_gallery_presign_failures_total").increment(1);
                        return None;
                    }
                }
            }
            GalleryUrls::Proxy => match self.codec.parse_key(&object.key) {
                Ok(parsed) => format!(
                    "{}/api/images/{}/{}",
                    self.public_base_url,
                    parsed.uuid,
                    utf8_percent_encode(&parsed.filename, PATH_SEGMENT)
                ),
                Err(e) => {
                    warn!(error = %e, key = %object.key, "Dropping image with unparseable key");
                    return None;
                }
            },
        };

        Some(GalleryImage {
            filename: filename_of(&object.key).to_string(),
            key: object.key,
            url,
            size: object.size,
            last_modified: object.last_modified,
        })
    }

    /// Fresh presigned GET for the image at `<uuid>/<filename>`
    #[instrument(skip(self))]
    pub async fn resolve_image(&self, uuid: &str, filename: &str) -> Result<PresignedAccess> {
        if uuid.is_empty() || filename.is_empty() {
            return Err(Error::BadRequest(
                "Missing required parameters: uuid and filename".to_string(),
            ));
        }

        let key = self.codec.compose(uuid, filename).map_err(Error::not_found)?;
        let access = self.store.presign_get(&key, GALLERY_URL_EXPIRY).await?;

        metrics::counter!("image_api_image_redirects_total").increment(1);
        Ok(access)
    }
}
