use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for the image API
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// S3 configuration
    #[serde(default)]
    pub s3: S3Config,
    /// Key namespace, limits and expiries
    #[serde(default)]
    pub storage: StorageConfig,
    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,
    /// Static SDK assets
    #[serde(default)]
    pub assets: AssetConfig,
}

/// Deployment mode. Development relaxes CORS and switches to human-readable logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    #[default]
    #[serde(other)]
    Production,
}

impl Environment {
    pub fn is_development(self) -> bool {
        self == Environment::Development
    }
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub environment: Environment,
    /// Metrics port, 0 disables the Prometheus exporter
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// S3-compatible backend configuration
#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    /// Bucket holding every managed object
    #[serde(default = "default_bucket")]
    pub bucket: String,
    /// Signing region ("auto" for Tigris/R2)
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL (Tigris, MinIO, LocalStack, ...)
    #[serde(default = "default_endpoint_url")]
    pub endpoint_url: Option<String>,
    /// Force path-style access
    #[serde(default = "default_true")]
    pub force_path_style: bool,
    /// Public base URL objects are reachable under, used for download links
    #[serde(default = "default_public_endpoint")]
    pub public_endpoint: String,
    /// Static credentials; the default AWS provider chain is used when unset
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

/// How gallery entries point at their image bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GalleryUrls {
    /// Presigned GET URL per image
    #[default]
    Presigned,
    /// Same-origin `/api/images/<uuid>/<filename>` URL that redirects to a presigned GET
    Proxy,
}

/// Key namespace, limits and expiries
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Leading key segment(s) all managed objects live under, without trailing slash
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Upper bound of the presigned POST content-length-range
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
    /// Presigned POST validity in seconds
    #[serde(default = "default_upload_expiry_secs")]
    pub upload_expiry_secs: u64,
    /// Default presigned GET validity in seconds
    #[serde(default = "default_download_expiry_secs")]
    pub download_expiry_secs: u64,
    /// Largest caller-requested presigned GET validity in seconds
    #[serde(default = "default_max_download_expiry_secs")]
    pub max_download_expiry_secs: u64,
    #[serde(default)]
    pub gallery_urls: GalleryUrls,
}

/// HTTP API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API listen address
    #[serde(default = "default_api_host")]
    pub host: String,
    /// API listen port
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Externally visible base URL of this API, used for proxy image URLs
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
    /// Allowed CORS origins
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

/// Locations of the static SDK assets
#[derive(Debug, Clone, Deserialize)]
pub struct AssetConfig {
    #[serde(default = "default_sdk_script")]
    pub sdk_script: PathBuf,
    #[serde(default = "default_example_page")]
    pub example_page: PathBuf,
}

// Default value functions
fn default_service_name() -> String {
    "image-api".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_bucket() -> String {
    "ai-generation-v0".to_string()
}

fn default_region() -> String {
    "auto".to_string()
}

fn default_endpoint_url() -> Option<String> {
    Some("https://fly.storage.tigris.dev".to_string())
}

fn default_public_endpoint() -> String {
    "https://ai-generation-v0.fly.storage.tigris.dev".to_string()
}

fn default_namespace() -> String {
    "chavy/uploads".to_string()
}

fn default_max_upload_bytes() -> u64 {
    10 * 1024 * 1024 // 10MB
}

fn default_upload_expiry_secs() -> u64 {
    900
}

fn default_download_expiry_secs() -> u64 {
    3600
}

fn default_max_download_expiry_secs() -> u64 {
    7 * 24 * 3600 // SigV4 limit
}

fn default_true() -> bool {
    true
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    3000
}

fn default_public_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://localhost:3001".to_string(),
        "http://127.0.0.1:3000".to_string(),
        "https://hono-chavy.fly.dev".to_string(),
    ]
}

fn default_sdk_script() -> PathBuf {
    PathBuf::from("assets/image-api.js")
}

fn default_example_page() -> PathBuf {
    PathBuf::from("assets/example.html")
}

/// Flat variables understood by earlier deployments, mapped onto config keys.
const LEGACY_ENV: &[(&str, &str)] = &[
    ("AWS_REGION", "s3.region"),
    ("AWS_ENDPOINT_URL_S3", "s3.endpoint_url"),
    ("AWS_S3_BUCKET", "s3.bucket"),
    ("AWS_S3_PUBLIC_ENDPOINT", "s3.public_endpoint"),
    ("PORT", "api.port"),
    ("NODE_ENV", "service.environment"),
];

impl Config {
    /// Load configuration from config files and the environment
    pub fn load() -> anyhow::Result<Self> {
        let mut builder = config::Config::builder()
            // Add config file if present
            .add_source(
                config::File::with_name("config/image-api")
                    .required(false)
            )
            .add_source(
                config::File::with_name("/etc/image-api/image-api")
                    .required(false)
            )
            // Override with environment variables
            // IMAGE_API__S3__BUCKET -> s3.bucket
            .add_source(
                config::Environment::with_prefix("IMAGE_API")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("api.cors_origins")
                    .try_parsing(true)
            );

        for (var, key) in LEGACY_ENV {
            builder = builder.set_override_option(*key, std::env::var(var).ok())?;
        }

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        let namespace = self.storage.namespace.trim_matches('/');
        if namespace.is_empty() {
            anyhow::bail!("storage.namespace must not be empty");
        }
        if self.storage.download_expiry_secs == 0
            || self.storage.download_expiry_secs > self.storage.max_download_expiry_secs
        {
            anyhow::bail!(
                "storage.download_expiry_secs must be within 1..={}",
                self.storage.max_download_expiry_secs
            );
        }
        if self.s3.access_key_id.is_some() != self.s3.secret_access_key.is_some() {
            anyhow::bail!("s3.access_key_id and s3.secret_access_key must be set together");
        }
        Ok(())
    }

    /// Presigned POST validity as Duration
    pub fn upload_expiry(&self) -> Duration {
        Duration::from_secs(self.storage.upload_expiry_secs)
    }

    /// Listen address for the HTTP server
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            environment: Environment::default(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket: default_bucket(),
            region: default_region(),
            endpoint_url: default_endpoint_url(),
            force_path_style: true,
            public_endpoint: default_public_endpoint(),
            access_key_id: None,
            secret_access_key: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            max_upload_bytes: default_max_upload_bytes(),
            upload_expiry_secs: default_upload_expiry_secs(),
            download_expiry_secs: default_download_expiry_secs(),
            max_download_expiry_secs: default_max_download_expiry_secs(),
            gallery_urls: GalleryUrls::default(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            public_base_url: default_public_base_url(),
            cors_origins: default_cors_origins(),
        }
    }
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            sdk_script: default_sdk_script(),
            example_page: default_example_page(),
        }
    }
}
