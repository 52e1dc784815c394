// S3 client backed by rust-s3, with locally signed POST policies

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use s3::{creds::Credentials, error::S3Error, Bucket, Region};
use std::sync::Arc;
use tracing::{error, info};

use super::post_policy::{sign_post_policy, PostPolicyRequest};
use super::{ObjectInfo, ObjectStore, PresignedUpload, UploadTarget};
use crate::config::{StorageConfig, UploadConfig};
use crate::types::{AppError, AppResult};

pub struct S3Store {
    bucket: Arc<Bucket>,
    config: StorageConfig,
    upload: UploadConfig,
}

fn storage_error(context: &str, err: S3Error) -> AppError {
    error!("{}: {}", context, err);
    AppError::Storage(format!("{}: {}", context, err))
}

impl S3Store {
    pub fn new(config: StorageConfig, upload: UploadConfig) -> Result<Self> {
        let credentials = Credentials::new(
            config.s3_access_key_id.as_deref(),
            config.s3_secret_access_key.as_deref(),
            None,
            None,
            None,
        )?;

        let region = match &config.s3_endpoint {
            Some(endpoint) => Region::Custom {
                region: config.s3_region.clone(),
                endpoint: endpoint.trim_end_matches('/').to_string(),
            },
            None => config.s3_region.parse()?,
        };

        let mut bucket = Bucket::new(&config.s3_bucket, region, credentials)?;
        if config.s3_endpoint.is_some() {
            bucket.set_path_style();
        }

        info!(bucket = %config.s3_bucket, region = %config.s3_region, "S3 client initialized");

        Ok(Self {
            bucket: Arc::from(bucket),
            config,
            upload,
        })
    }

    /// Form action URL for presigned POST uploads
    pub fn upload_endpoint(&self) -> String {
        match &self.config.s3_endpoint {
            Some(endpoint) => format!("{}/{}", endpoint.trim_end_matches('/'), self.config.s3_bucket),
            None => format!(
                "https://{}.s3.{}.amazonaws.com/",
                self.config.s3_bucket, self.config.s3_region
            ),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    fn is_mock(&self) -> bool {
        false
    }

    fn public_url(&self, key: &str) -> String {
        match &self.config.s3_endpoint {
            Some(endpoint) => format!(
                "{}/{}/{}",
                endpoint.trim_end_matches('/'),
                self.config.s3_bucket,
                key
            ),
            None => format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                self.config.s3_bucket, self.config.s3_region, key
            ),
        }
    }

    async fn presign_upload(&self, target: UploadTarget<'_>) -> AppResult<PresignedUpload> {
        let access_key = self.config.s3_access_key_id.as_deref().unwrap_or_default();
        let secret_key = self.config.s3_secret_access_key.as_deref().unwrap_or_default();

        let fields = [
            ("Content-Type", target.content_type),
            ("x-amz-meta-user-id", target.user_id),
            ("x-amz-meta-original-filename", target.original_filename),
        ];
        let form = sign_post_policy(&PostPolicyRequest {
            bucket: &self.config.s3_bucket,
            key: target.key,
            region: &self.config.s3_region,
            access_key,
            secret_key,
            fields: &fields,
            min_length: 1,
            max_length: target.max_bytes.min(self.upload.max_upload_bytes),
            expires_in: target.expires_in,
            now: Utc::now(),
        });

        info!(key = target.key, "Presigned POST generated");

        Ok(PresignedUpload {
            url: self.upload_endpoint(),
            fields: form,
            expires_in: target.expires_in,
        })
    }

    async fn presign_download(&self, key: &str, expires_in: u32) -> AppResult<String> {
        self.bucket
            .presign_get(key, expires_in, None)
            .await
            .map_err(|e| storage_error("Failed to presign download", e))
    }

    async fn stat(&self, key: &str) -> AppResult<Option<ObjectInfo>> {
        match self.bucket.head_object(key).await {
            Ok((_, 404)) | Err(S3Error::HttpFailWithBody(404, _)) => Ok(None),
            Ok((head, _)) => Ok(Some(ObjectInfo {
                size: head.content_length.and_then(|len| u64::try_from(len).ok()),
                content_type: head.content_type,
            })),
            Err(e) => Err(storage_error("Failed to stat object", e)),
        }
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let response = self
            .bucket
            .delete_object(key)
            .await
            .map_err(|e| storage_error("Failed to delete object", e))?;

        info!(key, status = response.status_code(), "S3 object deleted");
        Ok(())
    }

    async fn copy(&self, source_key: &str, dest_key: &str) -> AppResult<()> {
        let status = self
            .bucket
            .copy_object_internal(source_key, dest_key)
            .await
            .map_err(|e| storage_error("Failed to copy object", e))?;

        info!(source_key, dest_key, status, "S3 object copied");
        Ok(())
    }
}
