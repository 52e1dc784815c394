// Three-step upload: presign, transfer to storage, register metadata

use std::path::Path;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use serde::Serialize;
use tracing::info;

use super::{ClientError, ClientResult, LibraryClient};
use crate::config::DEFAULT_MAX_UPLOAD_BYTES;
use crate::models::{CreateItemRequest, LibraryItemResponse, PresignedUrlRequest};
use crate::types::Visibility;
use crate::upload_policy::validate_upload_request;

const PRESIGN_DONE: u8 = 10;
const TRANSFER_DONE: u8 = 80;
const FINALIZE_DONE: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStage {
    Presigning,
    Transferring,
    Finalizing,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UploadProgress {
    pub stage: UploadStage,
    pub percent: u8,
    pub bytes_sent: u64,
    pub total_bytes: u64,
}

/// Map transferred bytes onto the 10-80 % band
pub fn transfer_percent(sent: u64, total: u64) -> u8 {
    if total == 0 {
        return TRANSFER_DONE;
    }
    let span = u64::from(TRANSFER_DONE - PRESIGN_DONE);
    let scaled = span * sent.min(total) / total;
    PRESIGN_DONE + scaled as u8
}

/// A file ready to upload
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub filename: String,
    pub content_type: String,
    pub data: Bytes,
}

impl UploadFile {
    pub fn new(filename: impl Into<String>, content_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            data: data.into(),
        }
    }

    /// Read a file from disk, guessing its content type from the extension
    pub async fn from_path(path: impl AsRef<Path>) -> ClientResult<Self> {
        let path = path.as_ref();
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| ClientError::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name")))?;
        let content_type = mime_guess::from_path(path).first_or_octet_stream();
        let data = tokio::fs::read(path).await?;

        Ok(Self::new(filename, content_type.essence_str(), data))
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// Display name; defaults to the filename
    pub name: Option<String>,
    pub visibility: Visibility,
    pub preview_text: Option<String>,
    pub max_bytes: u64,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            name: None,
            visibility: Visibility::Private,
            preview_text: None,
            max_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

/// Reports progress with a percentage that never goes backwards
struct ProgressReporter {
    callback: Box<dyn Fn(UploadProgress) + Send + Sync>,
    last_percent: Mutex<u8>,
    total_bytes: u64,
}

impl ProgressReporter {
    fn emit(&self, stage: UploadStage, percent: u8, bytes_sent: u64) {
        let percent = {
            let mut last = self.last_percent.lock().unwrap_or_else(|e| e.into_inner());
            *last = (*last).max(percent.min(FINALIZE_DONE));
            *last
        };
        (self.callback)(UploadProgress {
            stage,
            percent,
            bytes_sent,
            total_bytes: self.total_bytes,
        });
    }
}

pub struct UploadPipeline<'a> {
    client: &'a LibraryClient,
}

impl<'a> UploadPipeline<'a> {
    pub fn new(client: &'a LibraryClient) -> Self {
        Self { client }
    }

    /// Upload one file and register it as a library item.
    ///
    /// Validation runs before any request is made. Mock storage skips the
    /// transfer and jumps straight to the finalize band.
    pub async fn run<F>(&self, file: &UploadFile, options: &UploadOptions, on_progress: F) -> ClientResult<LibraryItemResponse>
    where
        F: Fn(UploadProgress) + Send + Sync + 'static,
    {
        let total = file.size();
        let file_info = validate_upload_request(&file.filename, &file.content_type, total, options.max_bytes)?;
        let filename = file.filename.trim();

        let reporter = Arc::new(ProgressReporter {
            callback: Box::new(on_progress),
            last_percent: Mutex::new(0),
            total_bytes: total,
        });

        reporter.emit(UploadStage::Presigning, 0, 0);
        let presigned = self
            .client
            .presign(&PresignedUrlRequest {
                filename: filename.to_string(),
                content_type: file_info.mime_type.clone(),
                file_size: total,
            })
            .await?;
        reporter.emit(UploadStage::Presigning, PRESIGN_DONE, 0);

        if presigned.is_mock {
            info!(s3_key = %presigned.s3_key, "Mock storage, skipping transfer");
        } else {
            let transfer = reporter.clone();
            self.client
                .upload_to_storage(
                    &presigned,
                    filename,
                    &file_info.mime_type,
                    file.data.clone(),
                    Arc::new(move |sent, total| {
                        transfer.emit(UploadStage::Transferring, transfer_percent(sent, total), sent)
                    }),
                )
                .await?;
        }
        reporter.emit(UploadStage::Finalizing, TRANSFER_DONE, total);

        let request = CreateItemRequest {
            name: options
                .name
                .clone()
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| filename.to_string()),
            item_type: file_info.item_type,
            mime_type: file_info.mime_type.clone(),
            visibility: options.visibility,
            s3_key: presigned.s3_key.clone(),
            s3_thumbnail_key: None,
            file_size: total as i64,
            preview_text: options.preview_text.clone(),
            original_filename: filename.to_string(),
        };
        let item = self.client.create_item(&request).await?;
        reporter.emit(UploadStage::Done, FINALIZE_DONE, total);

        info!(item_id = %item.id, "Upload complete");
        Ok(item)
    }
}
