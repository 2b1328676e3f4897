//! Browser SDK script and its example page, read from configured paths.

use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use std::path::Path;
use tracing::error;

pub async fn sdk_script(path: &Path) -> Response {
    match tokio::fs::read_to_string(path).await {
        Ok(script) => (
            [
                (header::CONTENT_TYPE, "application/javascript; charset=utf-8"),
                (header::CACHE_CONTROL, "public, max-age=3600"),
            ],
            script,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, path = %path.display(), "Failed to read SDK script");
            (StatusCode::INTERNAL_SERVER_ERROR, "// Error loading SDK").into_response()
        }
    }
}

pub async fn example_page(path: &Path) -> Response {
    match tokio::fs::read_to_string(path).await {
        Ok(page) => Html(page).into_response(),
        Err(e) => {
            error!(error = %e, path = %path.display(), "Failed to read example page");
            (StatusCode::INTERNAL_SERVER_ERROR, "Error loading example page").into_response()
        }
    }
}
