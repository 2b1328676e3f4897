//! Chavy Image API
//!
//! Thin HTTP façade over an S3-compatible bucket. Browsers never send image
//! bytes through this service: they receive presigned POST descriptors and
//! upload straight to storage, then read images back through presigned GET
//! URLs.
//!
//! ## Features
//!
//! - **Upload intents**: presigned POST policies limited to one key, one
//!   Content-Type and 10MB, valid for 15 minutes
//! - **Download URLs**: presigned GET URLs with a bounded lifetime
//! - **Gallery**: every image under the namespace with a URL per image,
//!   presigned concurrently; individual failures are dropped
//! - **Deletion**: restricted to keys inside the namespace
//! - **Browser SDK**: `/sdk/image-api.js` and an example page
//!
//! ## Key layout
//!
//! ```text
//! <namespace>/<uuid-v4>/<original filename>
//! chavy/uploads/550e8400-e29b-41d4-a716-446655440000/cat.png
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐      ┌──────────────┐
//! │ HTTP routes  │─────▶│ Upload       │──┐
//! │ (axum)       │      │ Service      │  │
//! │              │      └──────────────┘  │     ┌──────────────┐     ┌──────────┐
//! │              │      ┌──────────────┐  ├────▶│ ObjectStore  │────▶│ S3 /     │
//! │              │─────▶│ Gallery      │──┤     │ (S3Store)    │     │ Tigris   │
//! │              │      │ Service      │  │     └──────────────┘     └──────────┘
//! │              │      └──────────────┘  │
//! │              │      ┌──────────────┐  │
//! │              │─────▶│ Deletion     │──┘
//! └──────────────┘      │ Gate         │
//!                       └──────────────┘
//! ```

pub mod api;
pub mod assets;
pub mod config;
pub mod deletion;
pub mod error;
pub mod gallery;
pub mod keys;
pub mod storage;
pub mod uploads;

pub use api::{create_router, start_api_server, AppState};
pub use config::Config;
pub use deletion::{DeleteOutcome, DeletionGate};
pub use error::Error;
pub use gallery::{Gallery, GalleryImage, GalleryService};
pub use keys::{KeyCodec, ParsedKey};
pub use storage::{MemoryStore, ObjectStore, S3Store, StorageError};
pub use uploads::{DownloadUrl, UploadIntent, UploadService};
