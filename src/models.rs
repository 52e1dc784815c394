use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::config::Config;
use crate::db::LibraryRepository;
use crate::storage::ObjectStore;
use crate::types::{ItemType, SortBy, SortOrder, Visibility};
use crate::upload_policy::FileInfo;

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn LibraryRepository>,
    pub store: Arc<dyn ObjectStore>,
    pub config: Config,
}

// Core records

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    /// Identity-provider subject
    pub username: String,
    pub nickname: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LibraryItem {
    pub id: Uuid,
    pub user_profile_id: Uuid,
    pub name: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub item_type: ItemType,
    pub mime_type: String,
    pub visibility: Visibility,
    pub s3_thumbnail_key: Option<String>,
    pub s3_key: String,
    pub file_size: i64,
    pub preview_text: Option<String>,
    pub original_filename: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl LibraryItem {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.user_profile_id == user_id
    }

    /// Owners see everything they own; everyone else only live public items.
    pub fn is_visible_to(&self, user_id: Option<Uuid>) -> bool {
        match user_id {
            Some(id) if self.is_owned_by(id) => true,
            _ => self.visibility == Visibility::Public && !self.is_deleted(),
        }
    }
}

/// Insert payload for a new library item
#[derive(Debug, Clone)]
pub struct NewLibraryItem {
    pub user_profile_id: Uuid,
    pub name: String,
    pub item_type: ItemType,
    pub mime_type: String,
    pub visibility: Visibility,
    pub s3_thumbnail_key: Option<String>,
    pub s3_key: String,
    pub file_size: i64,
    pub preview_text: Option<String>,
    pub original_filename: String,
}

/// Partial update; `None` leaves a column untouched. `preview_text: Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct ItemChanges {
    pub name: Option<String>,
    pub visibility: Option<Visibility>,
    pub preview_text: Option<Option<String>>,
}

#[derive(Debug, Clone)]
pub struct ItemQuery {
    pub owner: Option<Uuid>,
    pub public_only: bool,
    pub include_deleted: bool,
    pub item_type: Option<ItemType>,
    pub visibility: Option<Visibility>,
    pub search: Option<String>,
    pub sort_by: SortBy,
    pub sort_order: SortOrder,
    pub skip: i64,
    pub limit: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserStats {
    pub total_items: i64,
    pub total_file_size: i64,
    pub items_by_type: HashMap<ItemType, i64>,
    pub recent_uploads: i64,
}

// API envelope

#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse<T> {
    pub success: bool,
    pub message: String,
    pub data: T,
}

impl<T> SuccessResponse<T> {
    pub fn new(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub skip: i64,
    pub limit: i64,
    pub has_more: bool,
}

// Upload API

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresignedUrlRequest {
    pub filename: String,
    pub content_type: String,
    pub file_size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresignedUrlResponse {
    pub upload_url: String,
    pub s3_key: String,
    pub expires_in: u32,
    #[serde(default)]
    pub fields: HashMap<String, String>,
    pub file_info: FileInfo,
    #[serde(default)]
    pub is_mock: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadUrlResponse {
    pub download_url: String,
    pub filename: String,
    pub file_size: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}

// Library item API

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateItemRequest {
    #[validate(length(min = 1, max = 255, message = "name must be 1-255 characters"))]
    pub name: String,
    #[serde(rename = "type")]
    pub item_type: ItemType,
    #[validate(length(min = 3, max = 255))]
    pub mime_type: String,
    #[serde(default)]
    pub visibility: Visibility,
    #[validate(length(min = 1, max = 500))]
    pub s3_key: String,
    #[validate(length(max = 500))]
    pub s3_thumbnail_key: Option<String>,
    #[validate(range(min = 1))]
    pub file_size: i64,
    pub preview_text: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub original_filename: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateItemRequest {
    #[validate(length(min = 1, max = 255, message = "name must be 1-255 characters"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Visibility>,
    /// Absent leaves the preview alone, `null` clears it
    #[serde(default, deserialize_with = "explicit_null", skip_serializing_if = "Option::is_none")]
    pub preview_text: Option<Option<String>>,
}

/// Keep `"field": null` apart from a missing field
fn explicit_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Wire representation of a library item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LibraryItemResponse {
    pub id: Uuid,
    pub user_profile_id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub item_type: ItemType,
    pub mime_type: String,
    pub visibility: Visibility,
    pub s3_thumbnail_key: Option<String>,
    pub s3_key: String,
    pub file_size: i64,
    pub preview_text: Option<String>,
    pub original_filename: String,
    pub file_url: String,
    pub thumbnail_url: Option<String>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl LibraryItemResponse {
    pub fn from_item(item: LibraryItem, store: &dyn ObjectStore) -> Self {
        Self {
            file_url: store.public_url(&item.s3_key),
            thumbnail_url: item.s3_thumbnail_key.as_deref().map(|k| store.public_url(k)),
            is_deleted: item.is_deleted(),
            id: item.id,
            user_profile_id: item.user_profile_id,
            name: item.name,
            item_type: item.item_type,
            mime_type: item.mime_type,
            visibility: item.visibility,
            s3_thumbnail_key: item.s3_thumbnail_key,
            s3_key: item.s3_key,
            file_size: item.file_size,
            preview_text: item.preview_text,
            original_filename: item.original_filename,
            created_at: item.created_at,
            updated_at: item.updated_at,
            deleted_at: item.deleted_at,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListItemsParams {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
    pub sort_by: Option<SortBy>,
    pub sort_order: Option<SortOrder>,
    #[serde(rename = "type")]
    pub item_type: Option<ItemType>,
    pub visibility: Option<Visibility>,
    pub search: Option<String>,
    pub include_deleted: Option<bool>,
}

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

impl ListItemsParams {
    /// Clamp paging and normalise the search term
    pub fn into_query(self, owner: Option<Uuid>, public_only: bool) -> ItemQuery {
        ItemQuery {
            owner,
            public_only,
            include_deleted: !public_only && self.include_deleted.unwrap_or(false),
            item_type: self.item_type,
            visibility: if public_only { Some(Visibility::Public) } else { self.visibility },
            search: self
                .search
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            sort_by: self.sort_by.unwrap_or_default(),
            sort_order: self.sort_order.unwrap_or_default(),
            skip: self.skip.unwrap_or(0).max(0),
            limit: self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeleteItemParams {
    pub permanent: Option<bool>,
}

// User API

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterUserRequest {
    pub nickname: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateUserRequest {
    pub nickname: Option<String>,
}

pub const MAX_NICKNAME_CHARS: usize = 100;

/// Trim a nickname and check it is 1-100 characters long
pub fn normalize_nickname(nickname: &str) -> Result<&str, String> {
    let nickname = nickname.trim();
    let chars = nickname.chars().count();
    if chars == 0 || chars > MAX_NICKNAME_CHARS {
        return Err(format!("nickname must be 1-{} characters", MAX_NICKNAME_CHARS));
    }
    Ok(nickname)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NicknameQuery {
    pub nickname: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityResponse {
    pub available: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub database: String,
    pub storage: String,
}
