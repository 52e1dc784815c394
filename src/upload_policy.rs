//! Upload Policy
//!
//! Decides whether a file may be uploaded and what kind of library item it becomes.
//! The same checks run on the server before a presigned URL is issued and in the
//! client before any network call is made.

use crate::types::ItemType;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest accepted filename, in bytes
pub const MAX_FILENAME_BYTES: usize = 255;

/// Content types that are never accepted
const BLOCKED_CONTENT_TYPES: &[&str] = &[
    "application/x-msdownload",
    "application/x-sh",
    "application/x-executable",
    "application/x-msdos-program",
];

/// Document types that are not under `text/*`
const DOCUMENT_CONTENT_TYPES: &[&str] = &[
    "application/pdf",
    "application/msword",
    "application/vnd.ms-excel",
    "application/vnd.ms-powerpoint",
    "application/rtf",
    "application/json",
    "application/vnd.oasis.opendocument.text",
    "application/vnd.oasis.opendocument.spreadsheet",
    "application/vnd.oasis.opendocument.presentation",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadRejection {
    #[error("Filename is required")]
    EmptyFilename,

    #[error("Filename must be at most {MAX_FILENAME_BYTES} bytes")]
    FilenameTooLong,

    #[error("Filename must not contain path separators")]
    InvalidFilename,

    #[error("Invalid content type: {0}")]
    InvalidContentType(String),

    #[error("File type is not allowed: {0}")]
    BlockedContentType(String),

    #[error("File is empty")]
    EmptyFile,

    #[error("File is too large: {size} bytes (limit {limit} bytes)")]
    TooLarge { size: u64, limit: u64 },
}

/// What the server learned about an accepted upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub item_type: ItemType,
    pub mime_type: String,
    pub extension: Option<String>,
    pub file_size: u64,
    pub needs_thumbnail: bool,
}

/// Validate an upload request and classify the file
pub fn validate_upload_request(
    filename: &str,
    content_type: &str,
    file_size: u64,
    max_bytes: u64,
) -> Result<FileInfo, UploadRejection> {
    let filename = filename.trim();
    if filename.is_empty() {
        return Err(UploadRejection::EmptyFilename);
    }
    if filename.len() > MAX_FILENAME_BYTES {
        return Err(UploadRejection::FilenameTooLong);
    }
    if filename.contains(['/', '\\', '\0']) {
        return Err(UploadRejection::InvalidFilename);
    }

    let (essence, item_type) = check_content_type(content_type)?;

    if file_size == 0 {
        return Err(UploadRejection::EmptyFile);
    }
    if file_size > max_bytes {
        return Err(UploadRejection::TooLarge {
            size: file_size,
            limit: max_bytes,
        });
    }

    Ok(FileInfo {
        item_type,
        mime_type: essence,
        extension: file_extension(filename),
        file_size,
        needs_thumbnail: matches!(item_type, ItemType::Image | ItemType::Video),
    })
}

/// Parse a content type, refuse blocked ones, and classify the rest.
/// Returns the lowercased essence (`text/markdown` for `text/markdown; charset=utf-8`).
pub fn check_content_type(content_type: &str) -> Result<(String, ItemType), UploadRejection> {
    let mime: mime::Mime = content_type
        .trim()
        .parse()
        .map_err(|_| UploadRejection::InvalidContentType(content_type.to_string()))?;
    let essence = mime.essence_str().to_ascii_lowercase();
    if BLOCKED_CONTENT_TYPES.contains(&essence.as_str()) {
        return Err(UploadRejection::BlockedContentType(essence));
    }
    Ok((essence, classify(&mime)))
}

/// Map a MIME type onto a library item type
pub fn classify(mime: &mime::Mime) -> ItemType {
    if mime.type_() == mime::IMAGE {
        return ItemType::Image;
    }
    if mime.type_() == mime::VIDEO {
        return ItemType::Video;
    }
    if mime.type_() == mime::TEXT {
        return ItemType::Document;
    }

    let essence = mime.essence_str().to_ascii_lowercase();
    if DOCUMENT_CONTENT_TYPES.contains(&essence.as_str())
        || essence.starts_with("application/vnd.openxmlformats-officedocument.")
    {
        ItemType::Document
    } else {
        ItemType::File
    }
}

/// Lowercased extension after the last dot, if any
pub fn file_extension(filename: &str) -> Option<String> {
    let (stem, ext) = filename.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
