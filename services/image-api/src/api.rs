use crate::assets;
use crate::config::{AssetConfig, Config};
use crate::deletion::{DeleteOutcome, DeletionGate};
use crate::error::Error;
use crate::gallery::{Gallery, GalleryService};
use crate::storage::ObjectStore;
use crate::uploads::{DownloadUrl, UploadIntent, UploadService};
use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::{rejection::JsonRejection, Path, Request, State},
    http::{header, HeaderName, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub uploads: Arc<UploadService>,
    pub gallery: Arc<GalleryService>,
    pub deletion: Arc<DeletionGate>,
    pub assets: Arc<AssetConfig>,
    pub service_name: Arc<str>,
}

impl AppState {
    pub fn new(store: Arc<dyn ObjectStore>, config: &Config) -> Self {
        Self {
            uploads: Arc::new(UploadService::new(store.clone(), config)),
            gallery: Arc::new(GalleryService::new(store.clone(), config)),
            deletion: Arc::new(DeletionGate::new(store, config)),
            assets: Arc::new(config.assets.clone()),
            service_name: Arc::from(config.service.name.as_str()),
        }
    }
}

/// Upload intent request
#[derive(Debug, Deserialize)]
pub struct PresignedUrlRequest {
    pub filename: Option<String>,
    pub content_type: Option<String>,
}

/// Download URL request
#[derive(Debug, Deserialize)]
pub struct DownloadUrlRequest {
    pub key: Option<String>,
    /// Validity in seconds
    pub expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
    pub key: Option<String>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Operation failure paired with the message shown when the backend is at fault
#[derive(Debug)]
pub struct ApiError {
    error: Error,
    backend_message: &'static str,
}

impl ApiError {
    fn with(backend_message: &'static str) -> impl FnOnce(Error) -> ApiError {
        move |error| ApiError {
            error,
            backend_message,
        }
    }

    fn invalid_body(rejection: JsonRejection) -> ApiError {
        ApiError {
            error: Error::BadRequest(format!("Invalid JSON body: {}", rejection.body_text())),
            backend_message: "",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.error {
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let code = self.error.code().to_string();

        // Backend causes are logged, never returned
        let message = match self.error {
            Error::Backend(cause) => {
                error!(error = %cause, "{}", self.backend_message);
                self.backend_message.to_string()
            }
            other => other.to_string(),
        };

        (status, Json(ErrorResponse { error: message, code })).into_response()
    }
}

/// Create the API router
pub fn create_router(state: AppState, config: &Config) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/api/uploads/presigned-url", post(create_presigned_url))
        .route("/api/uploads/download-url", post(create_download_url))
        .route("/api/uploads/delete", delete(delete_image))
        .route("/api/gallery", get(list_gallery))
        .route("/api/gallery/:uuid/:filename", get(redirect_to_image))
        .route("/api/images/:uuid/:filename", get(redirect_to_image))
        .route("/sdk/image-api.js", get(sdk_script))
        .route("/sdk/example", get(example_page))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(config))
        .layer(middleware::from_fn(preflight_no_content))
        .with_state(state)
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins = if config.service.environment.is_development() {
        AllowOrigin::mirror_request()
    } else {
        AllowOrigin::list(
            config
                .api
                .cors_origins
                .iter()
                .filter_map(|o| o.parse::<HeaderValue>().ok()),
        )
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-requested-with"),
        ])
        .allow_credentials(true)
        .max_age(Duration::from_secs(86400))
}

/// Answer every OPTIONS request with an empty 204, keeping the CORS headers
async fn preflight_no_content(request: Request, next: Next) -> Response {
    if request.method() != Method::OPTIONS {
        return next.run(request).await;
    }

    let (mut parts, _) = next.run(request).await.into_parts();
    parts.status = StatusCode::NO_CONTENT;
    parts.headers.remove(header::CONTENT_LENGTH);
    parts.headers.remove(header::CONTENT_TYPE);
    Response::from_parts(parts, Body::empty())
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": &*state.service_name,
        "endpoints": {
            "presigned_url": "POST /api/uploads/presigned-url",
            "download_url": "POST /api/uploads/download-url",
            "delete": "DELETE /api/uploads/delete",
            "gallery": "GET /api/gallery",
            "images": "GET /api/images/:uuid/:filename",
            "sdk": "GET /sdk/image-api.js",
            "example": "GET /sdk/example",
        }
    }))
}

#[instrument(skip_all)]
async fn create_presigned_url(
    State(state): State<AppState>,
    payload: Result<Json<PresignedUrlRequest>, JsonRejection>,
) -> Result<Json<UploadIntent>, ApiError> {
    let Json(request) = payload.map_err(ApiError::invalid_body)?;

    state
        .uploads
        .create_upload_intent(
            request.filename.as_deref().unwrap_or_default(),
            request.content_type.as_deref().unwrap_or_default(),
        )
        .await
        .map(Json)
        .map_err(ApiError::with("Failed to generate presigned URL"))
}

#[instrument(skip_all)]
async fn create_download_url(
    State(state): State<AppState>,
    payload: Result<Json<DownloadUrlRequest>, JsonRejection>,
) -> Result<Json<DownloadUrl>, ApiError> {
    let Json(request) = payload.map_err(ApiError::invalid_body)?;

    state
        .uploads
        .create_download_url(request.key.as_deref().unwrap_or_default(), request.expires_in)
        .await
        .map(Json)
        .map_err(ApiError::with("Failed to generate download URL"))
}

#[instrument(skip_all)]
async fn delete_image(
    State(state): State<AppState>,
    payload: Result<Json<DeleteRequest>, JsonRejection>,
) -> Result<Json<DeleteOutcome>, ApiError> {
    let Json(request) = payload.map_err(ApiError::invalid_body)?;

    state
        .deletion
        .delete_image(request.key.as_deref().unwrap_or_default())
        .await
        .map(Json)
        .map_err(ApiError::with("Failed to delete image"))
}

#[instrument(skip_all)]
async fn list_gallery(State(state): State<AppState>) -> Result<Json<Gallery>, ApiError> {
    state
        .gallery
        .list_gallery()
        .await
        .map(Json)
        .map_err(ApiError::with("Failed to fetch gallery"))
}

/// 302 to a fresh presigned GET for `<uuid>/<filename>`
#[instrument(skip(state))]
async fn redirect_to_image(
    State(state): State<AppState>,
    Path((uuid, filename)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let access = state
        .gallery
        .resolve_image(&uuid, &filename)
        .await
        .map_err(ApiError::with("Failed to resolve image"))?;

    Ok((StatusCode::FOUND, [(header::LOCATION, access.url)]).into_response())
}

async fn sdk_script(State(state): State<AppState>) -> Response {
    assets::sdk_script(&state.assets.sdk_script).await
}

async fn example_page(State(state): State<AppState>) -> Response {
    assets::example_page(&state.assets.example_page).await
}

/// Serve the API until `shutdown` resolves
pub async fn start_api_server(
    router: Router,
    addr: &str,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    info!(address = %addr, "Starting image API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("API server error")?;

    Ok(())
}
