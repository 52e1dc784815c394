use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::Duration;
use serde_json::{json, Value};
use tower::ServiceExt;

use super::create_router;
use crate::config::Config;
use crate::db::MemoryRepository;
use crate::middleware::issue_token;
use crate::models::AppState;
use crate::storage::{thumbnail_key, MockStore, ObjectInfo, ObjectStore, PresignedUpload, UploadTarget};
use crate::types::{AppError, AppResult};

const SECRET: &str = "router-test-secret";

/// Mock storage that records deletions and can pretend objects are missing
/// or carry a given content type
struct RecordingStore {
    inner: MockStore,
    missing: bool,
    content_type: Option<String>,
    fail_deletes: bool,
    deleted: Mutex<Vec<String>>,
}

impl RecordingStore {
    fn new() -> Self {
        Self {
            inner: MockStore::new("library-dev"),
            missing: false,
            content_type: None,
            fail_deletes: false,
            deleted: Mutex::new(Vec::new()),
        }
    }

    fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStore for RecordingStore {
    fn is_mock(&self) -> bool {
        true
    }

    fn public_url(&self, key: &str) -> String {
        self.inner.public_url(key)
    }

    async fn presign_upload(&self, target: UploadTarget<'_>) -> AppResult<PresignedUpload> {
        self.inner.presign_upload(target).await
    }

    async fn presign_download(&self, key: &str, expires_in: u32) -> AppResult<String> {
        self.inner.presign_download(key, expires_in).await
    }

    async fn stat(&self, _key: &str) -> AppResult<Option<ObjectInfo>> {
        if self.missing {
            return Ok(None);
        }
        Ok(Some(ObjectInfo {
            size: None,
            content_type: self.content_type.clone(),
        }))
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        if self.fail_deletes {
            return Err(AppError::Storage("bucket unavailable".to_string()));
        }
        self.deleted.lock().unwrap().push(key.to_string());
        Ok(())
    }

    async fn copy(&self, source_key: &str, dest_key: &str) -> AppResult<()> {
        self.inner.copy(source_key, dest_key).await
    }
}

fn app_with_store(debug: bool, store: Arc<dyn ObjectStore>) -> Router {
    let mut config = Config::for_development(SECRET);
    config.debug = debug;
    create_router(AppState {
        repo: Arc::new(MemoryRepository::new()),
        store,
        config,
    })
}

fn app_with(debug: bool) -> Router {
    app_with_store(debug, Arc::new(MockStore::new("library-dev")))
}

fn token(subject: &str) -> String {
    issue_token(subject, SECRET, Duration::minutes(30)).unwrap()
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn register(app: &Router, subject: &str, nickname: &str) -> String {
    let token = token(subject);
    let (status, body) = send(
        app,
        Method::POST,
        "/api/v1/users",
        Some(&token),
        Some(json!({ "nickname": nickname })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    token
}

/// Presign `cat.png`, returning the storage key
async fn presign(app: &Router, token: &str) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/v1/upload/presigned-url",
        Some(token),
        Some(json!({ "filename": "cat.png", "content_type": "image/png", "file_size": 2048 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    body["data"]["s3_key"].as_str().unwrap().to_string()
}

fn create_body(name: &str, s3_key: &str) -> Value {
    json!({
        "name": name,
        "type": "image",
        "mime_type": "image/png",
        "visibility": "private",
        "s3_key": s3_key,
        "file_size": 2048,
        "original_filename": "cat.png",
    })
}

async fn create(app: &Router, token: &str, body: Value) -> (StatusCode, Value) {
    send(app, Method::POST, "/api/v1/library-items", Some(token), Some(body)).await
}

/// Presign and register an item, returning its id
async fn upload_item(app: &Router, token: &str, name: &str, visibility: &str) -> String {
    let s3_key = presign(app, token).await;
    let mut body = create_body(name, &s3_key);
    body["visibility"] = json!(visibility);

    let (status, body) = create(app, token, body).await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body["data"]["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_reports_backends() {
    let app = app_with(true);
    let (status, body) = send(&app, Method::GET, "/api/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], "memory");
    assert_eq!(body["storage"], "mock");
}

#[tokio::test]
async fn test_anonymous_presign_only_in_debug() {
    let request = json!({ "filename": "notes.txt", "content_type": "text/plain", "file_size": 10 });

    let debug_app = app_with(true);
    let (status, body) = send(
        &debug_app,
        Method::POST,
        "/api/v1/upload/presigned-url",
        None,
        Some(request.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["is_mock"], true);
    assert_eq!(body["data"]["file_info"]["item_type"], "document");
    assert!(body["data"]["s3_key"].as_str().unwrap().contains("/test-user/"));
    assert!(body["data"]["upload_url"].as_str().unwrap().ends_with("?mock=true"));

    let app = app_with(false);
    let response = app
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/v1/upload/presigned-url")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(request.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");
}

#[tokio::test]
async fn test_presign_rejects_invalid_uploads() {
    let app = app_with(true);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/upload/presigned-url",
        None,
        Some(json!({ "filename": "run.sh", "content_type": "application/x-sh", "file_size": 10 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["status"], 400);

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/upload/presigned-url",
        None,
        Some(json!({ "filename": "big.bin", "content_type": "application/octet-stream", "file_size": 200u64 * 1024 * 1024 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_registration_and_profile() {
    let app = app_with(true);

    let (status, _) = send(&app, Method::GET, "/api/v1/users/me", Some(&token("ghost")), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let alice = register(&app, "sub-alice", "alice").await;

    let (status, body) = send(&app, Method::GET, "/api/v1/users/me", Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["nickname"], "alice");
    assert_eq!(body["data"]["username"], "sub-alice");

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/users",
        Some(&token("sub-bob")),
        Some(json!({ "nickname": "alice" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, body) = send(&app, Method::GET, "/api/v1/users/nickname-available?nickname=alice", None, None).await;
    assert_eq!(body["data"]["available"], false);

    // Keeping one's own nickname is not a conflict
    let (status, _) = send(
        &app,
        Method::PATCH,
        "/api/v1/users/me",
        Some(&alice),
        Some(json!({ "nickname": "alice" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        Method::PATCH,
        "/api/v1/users/me",
        Some(&alice),
        Some(json!({ "nickname": "alice2" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["nickname"], "alice2");

    let (_, body) = send(&app, Method::GET, "/api/v1/users/nickname-available?nickname=alice", None, None).await;
    assert_eq!(body["data"]["available"], true);
}

#[tokio::test]
async fn test_item_visibility_rules() {
    let app = app_with(true);
    let alice = register(&app, "sub-alice", "alice").await;
    let bob = register(&app, "sub-bob", "bob").await;

    let private_id = upload_item(&app, &alice, "Private cat", "private").await;
    let public_id = upload_item(&app, &alice, "Public cat", "public").await;

    let (status, _) = send(&app, Method::GET, &format!("/api/v1/library-items/{}", private_id), Some(&bob), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, Method::GET, &format!("/api/v1/library-items/{}", public_id), Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["type"], "image");
    assert!(body["data"]["file_url"].as_str().unwrap().contains(".s3.amazonaws.com/uploads/"));

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/api/v1/upload/download/{}", public_id),
        Some(&bob),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["filename"], "cat.png");
    assert_eq!(body["data"]["file_size"], 2048);

    let (status, _) = send(
        &app,
        Method::PATCH,
        &format!("/api/v1/library-items/{}", public_id),
        Some(&bob),
        Some(json!({ "name": "Mine now" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, body) = send(&app, Method::GET, "/api/v1/library-items/public", None, None).await;
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["id"], public_id.as_str());

    let (_, body) = send(&app, Method::GET, "/api/v1/library-items", Some(&bob), None).await;
    assert_eq!(body["data"]["total"], 0);
}

#[tokio::test]
async fn test_create_rejects_foreign_storage_key() {
    let app = app_with(true);
    let alice = register(&app, "sub-alice", "alice").await;

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/library-items",
        Some(&alice),
        Some(json!({
            "name": "Stolen",
            "type": "file",
            "mime_type": "application/zip",
            "s3_key": "uploads/2024/01/someone-else/a.zip",
            "file_size": 10,
            "original_filename": "a.zip",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_trash_restore_and_purge() {
    let app = app_with(true);
    let alice = register(&app, "sub-alice", "alice").await;
    let id = upload_item(&app, &alice, "Cat", "private").await;
    let item_uri = format!("/api/v1/library-items/{}", id);

    let (status, _) = send(&app, Method::DELETE, &item_uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(&app, Method::GET, "/api/v1/library-items", Some(&alice), None).await;
    assert_eq!(body["data"]["total"], 0);
    let (_, body) = send(&app, Method::GET, "/api/v1/library-items?include_deleted=true", Some(&alice), None).await;
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["is_deleted"], true);

    let (status, body) = send(&app, Method::POST, &format!("{}/restore", item_uri), Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["is_deleted"], false);

    let (status, _) = send(&app, Method::DELETE, &format!("{}?permanent=true", item_uri), Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, Method::GET, &item_uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_listing_pages_and_stats() {
    let app = app_with(true);
    let alice = register(&app, "sub-alice", "alice").await;
    for name in ["One", "Two", "Three"] {
        upload_item(&app, &alice, name, "private").await;
    }

    let (_, body) = send(&app, Method::GET, "/api/v1/library-items?limit=2&sort_by=name&sort_order=asc", Some(&alice), None).await;
    assert_eq!(body["data"]["total"], 3);
    assert_eq!(body["data"]["limit"], 2);
    assert_eq!(body["data"]["has_more"], true);
    assert_eq!(body["data"]["items"][0]["name"], "One");
    assert_eq!(body["data"]["items"][1]["name"], "Three");

    let (_, body) = send(&app, Method::GET, "/api/v1/library-items?search=tw", Some(&alice), None).await;
    assert_eq!(body["data"]["total"], 1);

    let (status, body) = send(&app, Method::GET, "/api/v1/users/me/stats", Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total_items"], 3);
    assert_eq!(body["data"]["total_file_size"], 3 * 2048);
    assert_eq!(body["data"]["items_by_type"]["image"], 3);
    assert_eq!(body["data"]["recent_uploads"], 3);
}

#[tokio::test]
async fn test_item_names_must_not_be_blank() {
    let app = app_with(true);
    let alice = register(&app, "sub-alice", "alice").await;
    let s3_key = presign(&app, &alice).await;

    let (status, body) = create(&app, &alice, create_body("   ", &s3_key)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "name must not be blank");

    let (status, body) = create(&app, &alice, create_body("  Cat  ", &s3_key)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["name"], "Cat");
    let item_uri = format!("/api/v1/library-items/{}", body["data"]["id"].as_str().unwrap());

    let (status, _) = send(&app, Method::PATCH, &item_uri, Some(&alice), Some(json!({ "name": "  " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = send(&app, Method::GET, &item_uri, Some(&alice), None).await;
    assert_eq!(body["data"]["name"], "Cat");
}

#[tokio::test]
async fn test_preview_can_be_set_and_cleared() {
    let app = app_with(true);
    let alice = register(&app, "sub-alice", "alice").await;
    let id = upload_item(&app, &alice, "Cat", "private").await;
    let item_uri = format!("/api/v1/library-items/{}", id);

    let (_, body) = send(&app, Method::PATCH, &item_uri, Some(&alice), Some(json!({ "preview_text": "whiskers" }))).await;
    assert_eq!(body["data"]["preview_text"], "whiskers");

    let (_, body) = send(&app, Method::PATCH, &item_uri, Some(&alice), Some(json!({ "name": "Cat 2" }))).await;
    assert_eq!(body["data"]["preview_text"], "whiskers");

    let (status, body) = send(&app, Method::PATCH, &item_uri, Some(&alice), Some(json!({ "preview_text": null }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["preview_text"], Value::Null);
}

#[tokio::test]
async fn test_create_derives_type_from_content_type() {
    let app = app_with(true);
    let alice = register(&app, "sub-alice", "alice").await;
    let s3_key = presign(&app, &alice).await;

    let mut body = create_body("Cat", &s3_key);
    body["type"] = json!("video");
    body["mime_type"] = json!("application/x-msdownload");
    let (status, _) = create(&app, &alice, body.clone()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    body["mime_type"] = json!("image/png");
    let (status, body) = create(&app, &alice, body).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["type"], "image");
    assert_eq!(body["data"]["mime_type"], "image/png");
}

#[tokio::test]
async fn test_stored_content_type_wins() {
    let mut store = RecordingStore::new();
    store.content_type = Some("video/mp4".to_string());
    let app = app_with_store(true, Arc::new(store));
    let alice = register(&app, "sub-alice", "alice").await;
    let s3_key = presign(&app, &alice).await;

    let (status, body) = create(&app, &alice, create_body("Clip", &s3_key)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["type"], "video");
    assert_eq!(body["data"]["mime_type"], "video/mp4");
}

#[tokio::test]
async fn test_create_requires_stored_object() {
    let mut store = RecordingStore::new();
    store.missing = true;
    let app = app_with_store(true, Arc::new(store));
    let alice = register(&app, "sub-alice", "alice").await;
    let s3_key = presign(&app, &alice).await;

    let (status, body) = create(&app, &alice, create_body("Cat", &s3_key)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "Uploaded file was not found in storage");
}

#[tokio::test]
async fn test_thumbnail_key_must_match_and_is_purged() {
    let store = Arc::new(RecordingStore::new());
    let app = app_with_store(true, store.clone());
    let alice = register(&app, "sub-alice", "alice").await;
    let s3_key = presign(&app, &alice).await;

    let mut body = create_body("Cat", &s3_key);
    body["s3_thumbnail_key"] = json!("thumbnails/elsewhere.png");
    let (status, _) = create(&app, &alice, body.clone()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let thumb = thumbnail_key(&s3_key);
    body["s3_thumbnail_key"] = json!(thumb);
    let (status, body) = create(&app, &alice, body).await;
    assert_eq!(status, StatusCode::CREATED);
    let item_uri = format!("/api/v1/library-items/{}", body["data"]["id"].as_str().unwrap());

    let (status, _) = send(&app, Method::DELETE, &format!("{}?permanent=true", item_uri), Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(store.deleted(), vec![s3_key, thumb]);
}

#[tokio::test]
async fn test_purge_survives_storage_failure() {
    let mut store = RecordingStore::new();
    store.fail_deletes = true;
    let app = app_with_store(true, Arc::new(store));
    let alice = register(&app, "sub-alice", "alice").await;
    let id = upload_item(&app, &alice, "Cat", "private").await;
    let item_uri = format!("/api/v1/library-items/{}", id);

    let (status, _) = send(&app, Method::DELETE, &format!("{}?permanent=true", item_uri), Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, Method::GET, &item_uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_download_access_rules() {
    let app = app_with(true);
    let alice = register(&app, "sub-alice", "alice").await;
    let bob = register(&app, "sub-bob", "bob").await;
    let private_id = upload_item(&app, &alice, "Private cat", "private").await;
    let public_id = upload_item(&app, &alice, "Public cat", "public").await;

    let (status, _) = send(&app, Method::GET, &format!("/api/v1/upload/download/{}", private_id), Some(&bob), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, Method::GET, &format!("/api/v1/upload/download/{}", private_id), Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["download_url"].as_str().unwrap().ends_with("?mock=true"));

    let (status, _) = send(&app, Method::DELETE, &format!("/api/v1/library-items/{}", public_id), Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    for token in [&bob, &alice] {
        let (status, _) = send(&app, Method::GET, &format!("/api/v1/upload/download/{}", public_id), Some(token.as_str()), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

#[tokio::test]
async fn test_nickname_length_counts_trimmed_text() {
    let app = app_with(true);

    let padded = format!("  {}  ", "n".repeat(100));
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/users",
        Some(&token("sub-long")),
        Some(json!({ "nickname": padded })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["data"]["nickname"].as_str().unwrap().len(), 100);

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/users",
        Some(&token("sub-longer")),
        Some(json!({ "nickname": "n".repeat(101) })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/users",
        Some(&token("sub-blank")),
        Some(json!({ "nickname": "   " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
