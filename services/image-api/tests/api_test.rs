use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use image_api::config::{Config, Environment, GalleryUrls};
use image_api::{create_router, AppState, MemoryStore};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceExt;

const ID: &str = "550e8400-e29b-41d4-a716-446655440000";

fn test_config() -> Config {
    let mut config = Config::default();
    let assets = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("assets");
    config.assets.sdk_script = assets.join("image-api.js");
    config.assets.example_page = assets.join("example.html");
    config
}

fn app_with(store: Arc<MemoryStore>, config: &Config) -> Router {
    create_router(AppState::new(store, config), config)
}

fn app(store: Arc<MemoryStore>) -> Router {
    app_with(store, &test_config())
}

fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_health_lists_endpoints() {
    let response = app(Arc::new(MemoryStore::new())).oneshot(get("/")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "image-api");
    assert_eq!(body["endpoints"]["gallery"], "GET /api/gallery");
}

#[tokio::test]
async fn test_presigned_url_for_png() {
    let response = app(Arc::new(MemoryStore::new()))
        .oneshot(json_request(
            Method::POST,
            "/api/uploads/presigned-url",
            json!({ "filename": "cat.png", "content_type": "image/png" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let key = body["key"].as_str().unwrap();

    assert_eq!(body["expires_in"], 900);
    assert_eq!(body["content_type"], "image/png");
    assert_eq!(body["upload_fields"]["Content-Type"], "image/png");
    assert!(key.starts_with("chavy/uploads/"));
    assert!(key.ends_with("/cat.png"));
    assert_eq!(key.split('/').nth(2).unwrap().len(), 36);
    assert_eq!(
        body["download_url"],
        format!("https://ai-generation-v0.fly.storage.tigris.dev/{key}")
    );
}

#[tokio::test]
async fn test_presigned_url_keys_are_distinct() {
    let app = app(Arc::new(MemoryStore::new()));
    let mut keys = Vec::new();

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/api/uploads/presigned-url",
                json!({ "filename": "cat.png", "content_type": "image/png" }),
            ))
            .await
            .unwrap();
        keys.push(body_json(response).await["key"].as_str().unwrap().to_string());
    }

    assert_ne!(keys[0], keys[1]);
}

#[tokio::test]
async fn test_presigned_url_missing_params() {
    let response = app(Arc::new(MemoryStore::new()))
        .oneshot(json_request(
            Method::POST,
            "/api/uploads/presigned-url",
            json!({ "filename": "cat.png" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Missing required parameters: filename and content_type");
    assert_eq!(body["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/uploads/presigned-url")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let response = app(Arc::new(MemoryStore::new())).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_json_body_without_content_type_is_bad_request() {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/uploads/presigned-url")
        .body(Body::from(
            json!({ "filename": "cat.png", "content_type": "image/png" }).to_string(),
        ))
        .unwrap();

    let response = app(Arc::new(MemoryStore::new())).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_download_url_default_and_custom_expiry() {
    let app = app(Arc::new(MemoryStore::new()));

    let response = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/uploads/download-url",
            json!({ "key": "chavy/uploads/x/cat.png" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["expires_in"], 3600);
    assert_eq!(
        body["download_url"],
        "memory://bucket/chavy/uploads/x/cat.png?expires_in=3600"
    );

    let response = app
        .oneshot(json_request(
            Method::POST,
            "/api/uploads/download-url",
            json!({ "key": "chavy/uploads/x/cat.png", "expires_in": 60 }),
        ))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["expires_in"], 60);
}

#[tokio::test]
async fn test_download_url_missing_key() {
    let response = app(Arc::new(MemoryStore::new()))
        .oneshot(json_request(Method::POST, "/api/uploads/download-url", json!({})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "Missing required parameter: key");
}

#[tokio::test]
async fn test_download_url_backend_failure_is_generic() {
    let store = Arc::new(MemoryStore::new());
    store.fail_presign_for("chavy/uploads/x/cat.png");

    let response = app(store)
        .oneshot(json_request(
            Method::POST,
            "/api/uploads/download-url",
            json!({ "key": "chavy/uploads/x/cat.png" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Failed to generate download URL");
    assert!(!body.to_string().contains("injected"));
}

#[tokio::test]
async fn test_delete_outside_namespace_is_forbidden() {
    let store = Arc::new(MemoryStore::new());
    store.insert("other/uploads/x/y.png", 10);

    let response = app(store.clone())
        .oneshot(json_request(
            Method::DELETE,
            "/api/uploads/delete",
            json!({ "key": "other/uploads/x/y.png" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(body_json(response).await["error"].is_string());
    assert!(store.deleted_keys().is_empty());
    assert!(store.contains("other/uploads/x/y.png"));
}

#[tokio::test]
async fn test_delete_inside_namespace() {
    let store = Arc::new(MemoryStore::new());
    let key = format!("chavy/uploads/{ID}/cat.png");
    store.insert(key.clone(), 10);

    let response = app(store.clone())
        .oneshot(json_request(Method::DELETE, "/api/uploads/delete", json!({ "key": key })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["key"], key.as_str());
    assert!(!store.contains(&key));
}

#[tokio::test]
async fn test_delete_missing_key() {
    let store = Arc::new(MemoryStore::new());
    let response = app(store.clone())
        .oneshot(json_request(Method::DELETE, "/api/uploads/delete", json!({})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(store.deleted_keys().is_empty());
}

#[tokio::test]
async fn test_delete_backend_failure() {
    let store = Arc::new(MemoryStore::new());
    store.fail_deletes();

    let response = app(store)
        .oneshot(json_request(
            Method::DELETE,
            "/api/uploads/delete",
            json!({ "key": "chavy/uploads/x/y.png" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["error"], "Failed to delete image");
}

#[tokio::test]
async fn test_empty_gallery() {
    let response = app(Arc::new(MemoryStore::new()))
        .oneshot(get("/api/gallery"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "images": [], "count": 0 }));
}

#[tokio::test]
async fn test_gallery_only_lists_images_in_namespace() {
    let store = Arc::new(MemoryStore::new());
    store.insert(format!("chavy/uploads/{ID}/a.JPG"), 1);
    store.insert(format!("chavy/uploads/{ID}/b.gif"), 2);
    store.insert(format!("chavy/uploads/{ID}/notes.txt"), 3);
    store.insert(format!("chavy/uploads/{ID}/archive.png.zip"), 4);
    store.insert("other/uploads/x/c.png", 5);

    let response = app(store).oneshot(get("/api/gallery")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["count"], 2);

    let images = body["images"].as_array().unwrap();
    assert_eq!(images[0]["filename"], "a.JPG");
    assert_eq!(images[0]["size"], 1);
    assert!(images[0]["lastModified"].is_string());
    assert!(images[0]["url"].as_str().unwrap().starts_with("memory://bucket/"));
    assert_eq!(images[1]["filename"], "b.gif");
}

#[tokio::test]
async fn test_gallery_drops_images_that_fail_to_presign() {
    let store = Arc::new(MemoryStore::new());
    store.insert(format!("chavy/uploads/{ID}/good.png"), 1);
    store.insert(format!("chavy/uploads/{ID}/bad.png"), 1);
    store.fail_presign_for(format!("chavy/uploads/{ID}/bad.png"));

    let response = app(store).oneshot(get("/api/gallery")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["images"][0]["filename"], "good.png");
}

#[tokio::test]
async fn test_gallery_listing_failure() {
    let store = Arc::new(MemoryStore::new());
    store.insert(format!("chavy/uploads/{ID}/a.png"), 1);
    store.fail_listing();

    let response = app(store).oneshot(get("/api/gallery")).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Failed to fetch gallery");
    assert!(body.get("images").is_none());
}

#[tokio::test]
async fn test_gallery_proxy_urls() {
    let store = Arc::new(MemoryStore::new());
    store.insert(format!("chavy/uploads/{ID}/cat.png"), 1);

    let mut config = test_config();
    config.storage.gallery_urls = GalleryUrls::Proxy;
    config.api.public_base_url = "https://api.example.com".to_string();

    let response = app_with(store, &config).oneshot(get("/api/gallery")).await.unwrap();

    let body = body_json(response).await;
    assert_eq!(
        body["images"][0]["url"],
        format!("https://api.example.com/api/images/{ID}/cat.png")
    );
}

#[tokio::test]
async fn test_gallery_proxy_url_round_trips_escaped_filename() {
    let key = format!("chavy/uploads/{ID}/my cat#1.png");
    let store = Arc::new(MemoryStore::new());
    store.insert(key.clone(), 1);

    let mut config = test_config();
    config.storage.gallery_urls = GalleryUrls::Proxy;
    config.api.public_base_url = "https://api.example.com".to_string();
    let app = app_with(store, &config);

    let response = app.clone().oneshot(get("/api/gallery")).await.unwrap();
    let body = body_json(response).await;
    let url = body["images"][0]["url"].as_str().unwrap().to_string();
    assert_eq!(url, format!("https://api.example.com/api/images/{ID}/my%20cat%231.png"));

    let path = url.trim_start_matches("https://api.example.com");
    let response = app.oneshot(get(path)).await.unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers()[header::LOCATION],
        format!("memory://bucket/{key}?expires_in=3600").as_str()
    );
}

#[tokio::test]
async fn test_image_redirect() {
    let app = app(Arc::new(MemoryStore::new()));

    for prefix in ["/api/images", "/api/gallery"] {
        let response = app
            .clone()
            .oneshot(get(&format!("{prefix}/{ID}/cat.png")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers()[header::LOCATION],
            format!("memory://bucket/chavy/uploads/{ID}/cat.png?expires_in=3600").as_str()
        );
    }
}

#[tokio::test]
async fn test_image_redirect_malformed_id() {
    let response = app(Arc::new(MemoryStore::new()))
        .oneshot(get("/api/images/not-a-uuid/cat.png"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_sdk_script_is_served() {
    let response = app(Arc::new(MemoryStore::new()))
        .oneshot(get("/sdk/image-api.js"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/javascript; charset=utf-8"
    );
    assert_eq!(response.headers()[header::CACHE_CONTROL], "public, max-age=3600");
    assert!(body_text(response).await.contains("window.ImageAPI"));
}

#[tokio::test]
async fn test_example_page_is_served() {
    let response = app(Arc::new(MemoryStore::new()))
        .oneshot(get("/sdk/example"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("/sdk/image-api.js"));
}

#[tokio::test]
async fn test_missing_assets_are_server_errors() {
    let mut config = test_config();
    config.assets.sdk_script = PathBuf::from("/nonexistent/image-api.js");
    config.assets.example_page = PathBuf::from("/nonexistent/example.html");
    let app = app_with(Arc::new(MemoryStore::new()), &config);

    let response = app.clone().oneshot(get("/sdk/image-api.js")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_text(response).await, "// Error loading SDK");

    let response = app.oneshot(get("/sdk/example")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_preflight_from_allowed_origin() {
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/uploads/presigned-url")
        .header(header::ORIGIN, "http://localhost:3000")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();

    let response = app(Arc::new(MemoryStore::new())).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "http://localhost:3000"
    );
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
    assert_eq!(response.headers()[header::ACCESS_CONTROL_MAX_AGE], "86400");
    assert!(body_text(response).await.is_empty());
}

#[tokio::test]
async fn test_unknown_origin_gets_no_cors_header() {
    let request = Request::builder()
        .uri("/api/gallery")
        .header(header::ORIGIN, "https://evil.example")
        .body(Body::empty())
        .unwrap();

    let response = app(Arc::new(MemoryStore::new())).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .is_none());
}

#[tokio::test]
async fn test_development_mirrors_any_origin() {
    let mut config = test_config();
    config.service.environment = Environment::Development;

    let request = Request::builder()
        .uri("/api/gallery")
        .header(header::ORIGIN, "http://192.168.1.20:5173")
        .body(Body::empty())
        .unwrap();

    let response = app_with(Arc::new(MemoryStore::new()), &config)
        .oneshot(request)
        .await
        .unwrap();

    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "http://192.168.1.20:5173"
    );
}

#[tokio::test]
async fn test_bare_options_is_no_content() {
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/gallery")
        .body(Body::empty())
        .unwrap();

    let response = app(Arc::new(MemoryStore::new())).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}
