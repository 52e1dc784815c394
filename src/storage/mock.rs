// Development storage: no bucket, no credentials

use async_trait::async_trait;
use std::collections::HashMap;
use tracing::info;

use super::{ObjectInfo, ObjectStore, PresignedUpload, UploadTarget};
use crate::types::AppResult;

pub struct MockStore {
    bucket: String,
}

impl MockStore {
    pub fn new(bucket: &str) -> Self {
        let bucket = if bucket.is_empty() { "library-dev" } else { bucket };
        Self {
            bucket: bucket.to_string(),
        }
    }
}

#[async_trait]
impl ObjectStore for MockStore {
    fn is_mock(&self) -> bool {
        true
    }

    fn public_url(&self, key: &str) -> String {
        format!("https://{}.s3.amazonaws.com/{}", self.bucket, key)
    }

    async fn presign_upload(&self, target: UploadTarget<'_>) -> AppResult<PresignedUpload> {
        Ok(PresignedUpload {
            url: format!("{}?mock=true", self.public_url(target.key)),
            fields: HashMap::new(),
            expires_in: target.expires_in,
        })
    }

    async fn presign_download(&self, key: &str, _expires_in: u32) -> AppResult<String> {
        Ok(format!("{}?mock=true", self.public_url(key)))
    }

    async fn stat(&self, _key: &str) -> AppResult<Option<ObjectInfo>> {
        Ok(Some(ObjectInfo {
            size: None,
            content_type: None,
        }))
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        info!(key, "mock storage: simulated delete");
        Ok(())
    }

    async fn copy(&self, source_key: &str, dest_key: &str) -> AppResult<()> {
        info!(source_key, dest_key, "mock storage: simulated copy");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload_key() -> &'static str {
        "uploads/2024/01/u/a.png"
    }

    #[tokio::test]
    async fn test_mock_urls_are_flagged() {
        let store = MockStore::new("");
        let upload = store
            .presign_upload(UploadTarget {
                key: "uploads/2024/01/u/a.png",
                content_type: "image/png",
                user_id: "u",
                original_filename: "a.png",
                max_bytes: 10,
                expires_in: 60,
            })
            .await
            .unwrap();

        assert_eq!(upload.url, "https://library-dev.s3.amazonaws.com/uploads/2024/01/u/a.png?mock=true");
        assert!(upload.fields.is_empty());
        assert_eq!(upload.expires_in, 60);
        assert!(store.stat("anything").await.unwrap().is_some());
        assert!(store.copy(upload_key(), "uploads/2024/01/u/b.png").await.is_ok());
        assert!(store.delete(upload_key()).await.is_ok());
    }
}
