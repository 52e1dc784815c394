//! Object Storage
//!
//! Library files never pass through this service: clients upload straight to the
//! bucket with a presigned POST and download through presigned GET URLs. This
//! module issues those URLs, checks that uploaded objects exist, and removes
//! objects when an item is purged.
//!
//! Two backends implement [`ObjectStore`]:
//! - [`S3Store`]: a real S3 (or S3-compatible) bucket
//! - [`MockStore`]: used when no credentials are configured; hands out
//!   `?mock=true` URLs and treats every object as present

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::{StorageConfig, UploadConfig};
use crate::types::AppResult;
use crate::upload_policy::file_extension;

pub mod mock;
pub mod post_policy;
pub mod s3_client;

pub use mock::*;
pub use s3_client::*;

/// A presigned POST form: the client submits `fields` followed by the file part to `url`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresignedUpload {
    pub url: String,
    pub fields: HashMap<String, String>,
    pub expires_in: u32,
}

/// What the uploader tells storage about the object
#[derive(Debug, Clone)]
pub struct UploadTarget<'a> {
    pub key: &'a str,
    pub content_type: &'a str,
    pub user_id: &'a str,
    pub original_filename: &'a str,
    pub max_bytes: u64,
    pub expires_in: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub size: Option<u64>,
    pub content_type: Option<String>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// True for the development backend that never talks to a bucket
    fn is_mock(&self) -> bool;

    /// Plain (unsigned) URL of an object
    fn public_url(&self, key: &str) -> String;

    async fn presign_upload(&self, target: UploadTarget<'_>) -> AppResult<PresignedUpload>;

    async fn presign_download(&self, key: &str, expires_in: u32) -> AppResult<String>;

    /// `None` when the object does not exist
    async fn stat(&self, key: &str) -> AppResult<Option<ObjectInfo>>;

    async fn delete(&self, key: &str) -> AppResult<()>;

    async fn copy(&self, source_key: &str, dest_key: &str) -> AppResult<()>;
}

/// Pick the storage backend from configuration
pub fn build_store(config: &StorageConfig, upload: &UploadConfig) -> anyhow::Result<Arc<dyn ObjectStore>> {
    if config.has_credentials() {
        Ok(Arc::new(S3Store::new(config.clone(), upload.clone())?))
    } else {
        tracing::warn!("AWS credentials not configured, using mock storage");
        Ok(Arc::new(MockStore::new(&config.s3_bucket)))
    }
}

/// `uploads/{yyyy}/{mm}/{user_id}/{uuid}.{ext}`
pub fn generate_object_key(filename: &str, user_id: &str, now: DateTime<Utc>) -> String {
    let id = Uuid::new_v4();
    let unique = match file_extension(filename) {
        Some(ext) => format!("{}.{}", id, ext),
        None => id.to_string(),
    };
    format!("uploads/{}/{:02}/{}/{}", now.year(), now.month(), user_id, unique)
}

/// `uploads/2024/12/u/abc.jpg` becomes `thumbnails/2024/12/u/abc_thumb.jpg`
pub fn thumbnail_key(object_key: &str) -> String {
    let mut parts: Vec<&str> = object_key.split('/').collect();
    let filename = parts.pop().unwrap_or_default();
    let middle = parts.get(1..).map(|p| p.join("/")).unwrap_or_default();

    let thumb = match filename.rsplit_once('.') {
        Some((stem, ext)) if !ext.is_empty() => format!("{}_thumb.{}", stem, ext),
        _ => format!("{}_thumb", filename),
    };

    if middle.is_empty() {
        format!("thumbnails/{}", thumb)
    } else {
        format!("thumbnails/{}/{}", middle, thumb)
    }
}

/// True when `key` was generated for `user_id` by [`generate_object_key`]
pub fn key_belongs_to(key: &str, user_id: &str) -> bool {
    let parts: Vec<&str> = key.split('/').collect();
    matches!(
        parts.as_slice(),
        ["uploads", year, month, owner, file]
            if year.len() == 4
                && year.chars().all(|c| c.is_ascii_digit())
                && month.len() == 2
                && month.chars().all(|c| c.is_ascii_digit())
                && *owner == user_id
                && !file.is_empty()
    )
}
