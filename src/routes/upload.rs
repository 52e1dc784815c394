use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::middleware::{CurrentUser, MaybeUser};
use crate::models::{
    AppState, DownloadUrlResponse, PresignedUrlRequest, PresignedUrlResponse, SuccessResponse,
};
use crate::storage::{generate_object_key, UploadTarget};
use crate::types::{AppError, AppResult};
use crate::upload_policy::validate_upload_request;

/// Uploader id for anonymous callers while `DEBUG` is on
pub const DEBUG_UPLOADER_ID: &str = "test-user";

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/upload/presigned-url", post(presigned_url))
        .route("/api/v1/upload/download/{item_id}", get(download_url))
        .with_state(state)
}

async fn presigned_url(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Json(request): Json<PresignedUrlRequest>,
) -> AppResult<Json<SuccessResponse<PresignedUrlResponse>>> {
    let file_info = validate_upload_request(
        &request.filename,
        &request.content_type,
        request.file_size,
        state.config.upload.max_upload_bytes,
    )
    .map_err(|rejection| AppError::InvalidRequest(rejection.to_string()))?;

    let (user_id, username) = match &user {
        Some(user) => (user.id.to_string(), user.username.as_str()),
        None if state.config.debug => (DEBUG_UPLOADER_ID.to_string(), DEBUG_UPLOADER_ID),
        None => return Err(AppError::Auth("Authentication required".to_string())),
    };

    let filename = request.filename.trim();
    let s3_key = generate_object_key(filename, &user_id, Utc::now());
    let upload = state
        .store
        .presign_upload(UploadTarget {
            key: &s3_key,
            content_type: &file_info.mime_type,
            user_id: &user_id,
            original_filename: filename,
            max_bytes: state.config.upload.max_upload_bytes,
            expires_in: state.config.upload.upload_url_expires_secs,
        })
        .await?;

    info!(filename, username, s3_key = %s3_key, "Presigned upload URL issued");

    Ok(Json(SuccessResponse::new(
        PresignedUrlResponse {
            upload_url: upload.url,
            s3_key,
            expires_in: upload.expires_in,
            fields: upload.fields,
            file_info,
            is_mock: state.store.is_mock(),
        },
        "Upload URL created",
    )))
}

async fn download_url(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(item_id): Path<Uuid>,
) -> AppResult<Json<SuccessResponse<DownloadUrlResponse>>> {
    let item = state
        .repo
        .get_item(item_id)
        .await?
        .filter(|item| !item.is_deleted())
        .ok_or_else(|| AppError::NotFound("File not found".to_string()))?;

    if !item.is_visible_to(Some(user.id)) {
        return Err(AppError::Forbidden("You do not have access to this file".to_string()));
    }

    let expires_in = state.config.upload.download_url_expires_secs;
    let download_url = state.store.presign_download(&item.s3_key, expires_in).await?;
    let thumbnail_url = match &item.s3_thumbnail_key {
        Some(key) => Some(state.store.presign_download(key, expires_in).await?),
        None => None,
    };

    info!(item_id = %item.id, username = %user.username, "Download URL issued");

    Ok(Json(SuccessResponse::new(
        DownloadUrlResponse {
            download_url,
            filename: item.original_filename,
            file_size: item.file_size,
            thumbnail_url,
        },
        "Download URL created",
    )))
}
