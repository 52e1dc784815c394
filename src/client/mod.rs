//! HTTP client for the library API
//!
//! [`LibraryClient`] wraps every REST endpoint and unwraps the
//! `{ success, message, data }` envelope. Error responses keep the server's
//! message verbatim in [`ClientError::Api`] so callers can show it as-is.
//!
//! On top of the raw calls:
//! - [`upload::UploadPipeline`] runs presign, transfer and finalize with progress
//! - [`view`] maps wire records to display rows
//! - [`catalog::Catalog`] loads a listing and falls back to placeholder rows

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use bytes::Bytes;
use futures::future::join_all;
use reqwest::{
    multipart::{Form, Part},
    Body, Client, Method, RequestBuilder,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{
    AvailabilityResponse, CreateItemRequest, DownloadUrlResponse, HealthResponse,
    LibraryItemResponse, ListItemsParams, PaginatedResponse, PresignedUrlRequest,
    PresignedUrlResponse, RegisterUserRequest, SuccessResponse, UpdateItemRequest,
    UpdateUserRequest, User, UserStats,
};
use crate::upload_policy::UploadRejection;

pub mod catalog;
pub mod upload;
pub mod view;

pub use catalog::*;
pub use upload::*;
pub use view::*;

/// Size of the chunks a storage upload is streamed in
const UPLOAD_CHUNK_BYTES: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx response; `message` is the server's own text
    #[error("{message}")]
    Api { status: u16, message: String },

    #[error("{0}")]
    Rejected(#[from] UploadRejection),

    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            ClientError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Byte-level progress of a storage transfer: `(sent, total)`
pub type TransferProgress = Arc<dyn Fn(u64, u64) + Send + Sync>;

#[derive(Serialize)]
struct DeleteQuery {
    permanent: bool,
}

#[derive(Serialize)]
struct NicknameParam<'a> {
    nickname: &'a str,
}

#[derive(Clone)]
pub struct LibraryClient {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl LibraryClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, format!("{}{}", self.base_url, path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send and unwrap the success envelope
    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> ClientResult<T> {
        let envelope: SuccessResponse<T> = self.send_raw(builder).await?;
        debug!("API: {}", envelope.message);
        Ok(envelope.data)
    }

    async fn send_raw<T: DeserializeOwned>(&self, builder: RequestBuilder) -> ClientResult<T> {
        let response = builder.send().await?;
        let status = response.status();

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&text)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| {
                    if text.is_empty() {
                        status.canonical_reason().unwrap_or("Request failed").to_string()
                    } else {
                        text
                    }
                });
            return Err(ClientError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json::<T>().await?)
    }

    pub async fn health(&self) -> ClientResult<HealthResponse> {
        self.send_raw(self.request(Method::GET, "/api/health")).await
    }

    // Upload

    pub async fn presign(&self, request: &PresignedUrlRequest) -> ClientResult<PresignedUrlResponse> {
        self.send(
            self.request(Method::POST, "/api/v1/upload/presigned-url")
                .json(request),
        )
        .await
    }

    /// POST the presigned form fields followed by the file part, straight to storage
    pub async fn upload_to_storage(
        &self,
        presigned: &PresignedUrlResponse,
        filename: &str,
        content_type: &str,
        data: Bytes,
        progress: TransferProgress,
    ) -> ClientResult<()> {
        let total = data.len() as u64;
        let sent = Arc::new(AtomicU64::new(0));

        let chunks = (0..data.len())
            .step_by(UPLOAD_CHUNK_BYTES)
            .map(move |start| {
                let end = (start + UPLOAD_CHUNK_BYTES).min(data.len());
                let chunk = data.slice(start..end);
                let so_far = sent.fetch_add(chunk.len() as u64, Ordering::SeqCst) + chunk.len() as u64;
                progress(so_far, total);
                Ok::<Bytes, std::io::Error>(chunk)
            });
        let body = Body::wrap_stream(futures::stream::iter(chunks));

        let file_part = Part::stream_with_length(body, total)
            .file_name(filename.to_string())
            .mime_str(content_type)?;

        let mut form = Form::new();
        for (name, value) in &presigned.fields {
            form = form.text(name.clone(), value.clone());
        }
        form = form.part("file", file_part);

        // Storage is addressed directly; the API token must not leak to it
        let response = self
            .http
            .post(&presigned.upload_url)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Storage upload rejected");
            return Err(ClientError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }

    pub async fn download_url(&self, item_id: Uuid) -> ClientResult<DownloadUrlResponse> {
        self.send(self.request(Method::GET, &format!("/api/v1/upload/download/{}", item_id)))
            .await
    }

    // Library items

    pub async fn create_item(&self, request: &CreateItemRequest) -> ClientResult<LibraryItemResponse> {
        self.send(self.request(Method::POST, "/api/v1/library-items").json(request))
            .await
    }

    pub async fn list_items(
        &self,
        params: &ListItemsParams,
    ) -> ClientResult<PaginatedResponse<LibraryItemResponse>> {
        self.send(self.request(Method::GET, "/api/v1/library-items").query(params))
            .await
    }

    pub async fn list_public_items(
        &self,
        params: &ListItemsParams,
    ) -> ClientResult<PaginatedResponse<LibraryItemResponse>> {
        self.send(
            self.request(Method::GET, "/api/v1/library-items/public")
                .query(params),
        )
        .await
    }

    pub async fn get_item(&self, id: Uuid) -> ClientResult<LibraryItemResponse> {
        self.send(self.request(Method::GET, &format!("/api/v1/library-items/{}", id)))
            .await
    }

    pub async fn update_item(&self, id: Uuid, changes: &UpdateItemRequest) -> ClientResult<LibraryItemResponse> {
        self.send(
            self.request(Method::PATCH, &format!("/api/v1/library-items/{}", id))
                .json(changes),
        )
        .await
    }

    pub async fn delete_item(&self, id: Uuid, permanent: bool) -> ClientResult<()> {
        let _: Uuid = self
            .send(
                self.request(Method::DELETE, &format!("/api/v1/library-items/{}", id))
                    .query(&DeleteQuery { permanent }),
            )
            .await?;
        Ok(())
    }

    pub async fn restore_item(&self, id: Uuid) -> ClientResult<LibraryItemResponse> {
        self.send(self.request(Method::POST, &format!("/api/v1/library-items/{}/restore", id)))
            .await
    }

    /// Delete several items concurrently. Each id gets its own outcome, in input order.
    pub async fn bulk_delete(&self, ids: &[Uuid], permanent: bool) -> Vec<(Uuid, ClientResult<()>)> {
        let outcomes = join_all(ids.iter().map(|id| self.delete_item(*id, permanent))).await;
        ids.iter().copied().zip(outcomes).collect()
    }

    // Users

    pub async fn register(&self, nickname: &str) -> ClientResult<User> {
        let request = RegisterUserRequest {
            nickname: nickname.to_string(),
        };
        self.send(self.request(Method::POST, "/api/v1/users").json(&request))
            .await
    }

    pub async fn me(&self) -> ClientResult<User> {
        self.send(self.request(Method::GET, "/api/v1/users/me")).await
    }

    pub async fn update_me(&self, request: &UpdateUserRequest) -> ClientResult<User> {
        self.send(self.request(Method::PATCH, "/api/v1/users/me").json(request))
            .await
    }

    pub async fn stats(&self) -> ClientResult<UserStats> {
        self.send(self.request(Method::GET, "/api/v1/users/me/stats"))
            .await
    }

    pub async fn nickname_available(&self, nickname: &str) -> ClientResult<bool> {
        let response: AvailabilityResponse = self
            .send(
                self.request(Method::GET, "/api/v1/users/nickname-available")
                    .query(&NicknameParam { nickname }),
            )
            .await?;
        Ok(response.available)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;
    use std::sync::Mutex;

    fn item_json(id: Uuid, name: &str) -> serde_json::Value {
        json!({
            "id": id,
            "user_profile_id": Uuid::nil(),
            "name": name,
            "type": "document",
            "mime_type": "application/pdf",
            "visibility": "private",
            "s3_thumbnail_key": null,
            "s3_key": "uploads/2024/01/u/a.pdf",
            "file_size": 1536,
            "preview_text": null,
            "original_filename": "a.pdf",
            "file_url": "https://bucket.s3.amazonaws.com/uploads/2024/01/u/a.pdf",
            "thumbnail_url": null,
            "is_deleted": false,
            "created_at": "2024-01-02T03:04:05Z",
            "updated_at": "2024-01-02T03:04:05Z",
            "deleted_at": null,
        })
    }

    #[tokio::test]
    async fn test_bearer_token_and_envelope() {
        let mut server = mockito::Server::new_async().await;
        let id = Uuid::new_v4();
        let mock = server
            .mock("GET", format!("/api/v1/library-items/{}", id).as_str())
            .match_header("authorization", "Bearer tok")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({ "success": true, "message": "ok", "data": item_json(id, "Report") }).to_string())
            .create_async()
            .await;

        let client = LibraryClient::new(&server.url()).with_token("tok");
        let item = client.get_item(id).await.unwrap();

        assert_eq!(item.id, id);
        assert_eq!(item.name, "Report");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_message_is_passed_through() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v1/users")
            .with_status(409)
            .with_header("content-type", "application/json")
            .with_body(r#"{"success":false,"error":{"message":"Nickname is already taken","status":409}}"#)
            .create_async()
            .await;

        let client = LibraryClient::new(&server.url()).with_token("tok");
        let err = client.register("alice").await.unwrap_err();

        assert_eq!(err.status(), Some(409));
        assert_eq!(err.to_string(), "Nickname is already taken");
    }

    #[tokio::test]
    async fn test_list_sends_query_parameters() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/library-items")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("limit".into(), "5".into()),
                Matcher::UrlEncoded("type".into(), "document".into()),
                Matcher::UrlEncoded("search".into(), "report".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "success": true,
                    "message": "ok",
                    "data": { "items": [item_json(Uuid::new_v4(), "Report")], "total": 1, "skip": 0, "limit": 5, "has_more": false }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = LibraryClient::new(&server.url());
        let params = ListItemsParams {
            limit: Some(5),
            item_type: Some(crate::types::ItemType::Document),
            search: Some("report".to_string()),
            ..Default::default()
        };
        let page = client.list_items(&params).await.unwrap();

        assert_eq!(page.total, 1);
        assert_eq!(page.items.len(), 1);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_bulk_delete_reports_each_outcome() {
        let mut server = mockito::Server::new_async().await;
        let ok_id = Uuid::new_v4();
        let missing_id = Uuid::new_v4();

        server
            .mock("DELETE", format!("/api/v1/library-items/{}", ok_id).as_str())
            .match_query(Matcher::UrlEncoded("permanent".into(), "false".into()))
            .with_status(200)
            .with_body(json!({ "success": true, "message": "deleted", "data": ok_id }).to_string())
            .create_async()
            .await;
        server
            .mock("DELETE", format!("/api/v1/library-items/{}", missing_id).as_str())
            .match_query(Matcher::Any)
            .with_status(404)
            .with_body(r#"{"success":false,"error":{"message":"Item not found","status":404}}"#)
            .create_async()
            .await;

        let client = LibraryClient::new(&server.url());
        let outcomes = client.bulk_delete(&[ok_id, missing_id], false).await;

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].0, ok_id);
        assert!(outcomes[0].1.is_ok());
        assert_eq!(outcomes[1].0, missing_id);
        assert_eq!(outcomes[1].1.as_ref().unwrap_err().to_string(), "Item not found");
    }

    #[tokio::test]
    async fn test_storage_upload_streams_with_progress() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/bucket")
            .match_header("authorization", Matcher::Missing)
            .match_body(Matcher::Regex("name=\"key\"".to_string()))
            .with_status(204)
            .create_async()
            .await;

        let presigned = PresignedUrlResponse {
            upload_url: format!("{}/bucket", server.url()),
            s3_key: "uploads/2024/01/u/a.bin".to_string(),
            expires_in: 60,
            fields: [("key".to_string(), "uploads/2024/01/u/a.bin".to_string())].into(),
            file_info: crate::upload_policy::validate_upload_request(
                "a.bin",
                "application/octet-stream",
                150_000,
                u64::MAX,
            )
            .unwrap(),
            is_mock: false,
        };

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let client = LibraryClient::new("http://unused").with_token("secret");
        client
            .upload_to_storage(
                &presigned,
                "a.bin",
                "application/octet-stream",
                Bytes::from(vec![7u8; 150_000]),
                Arc::new(move |sent, total| sink.lock().unwrap().push((sent, total))),
            )
            .await
            .unwrap();

        mock.assert_async().await;
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen.last(), Some(&(150_000, 150_000)));
        assert!(seen.windows(2).all(|w| w[0].0 < w[1].0));
    }
}
