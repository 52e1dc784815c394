// Display rows for library items

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::LibraryItemResponse;
use crate::types::{ItemType, Visibility};

const SIZE_UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemView {
    pub id: Uuid,
    pub name: String,
    pub item_type: ItemType,
    pub type_label: &'static str,
    pub icon: &'static str,
    pub size_label: String,
    pub date_label: String,
    pub visibility_badge: &'static str,
    pub preview: Option<String>,
    pub is_deleted: bool,
}

impl From<&LibraryItemResponse> for ItemView {
    fn from(item: &LibraryItemResponse) -> Self {
        Self {
            id: item.id,
            name: item.name.clone(),
            item_type: item.item_type,
            type_label: type_label(item.item_type),
            icon: type_icon(item.item_type),
            size_label: format_file_size(u64::try_from(item.file_size).unwrap_or(0)),
            date_label: format_date(item.created_at),
            visibility_badge: visibility_badge(item.visibility),
            preview: item.preview_text.clone(),
            is_deleted: item.is_deleted,
        }
    }
}

pub fn type_label(item_type: ItemType) -> &'static str {
    match item_type {
        ItemType::Image => "Image",
        ItemType::Document => "Document",
        ItemType::File => "File",
        ItemType::Video => "Video",
    }
}

pub fn type_icon(item_type: ItemType) -> &'static str {
    match item_type {
        ItemType::Image => "🖼",
        ItemType::Document => "📄",
        ItemType::File => "📁",
        ItemType::Video => "🎬",
    }
}

pub fn visibility_badge(visibility: Visibility) -> &'static str {
    match visibility {
        Visibility::Public => "Public",
        Visibility::Private => "Private",
    }
}

/// Human-readable size, 1024-based: `0 B`, `512 B`, `1.5 KB`, `2.0 MB`
pub fn format_file_size(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{} B", bytes);
    }

    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", size, SIZE_UNITS[unit])
}

pub fn format_date(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M").to_string()
}

/// Client-side narrowing of an already fetched list: case-insensitive name
/// search plus an optional type filter
pub fn filter_views<'a>(views: &'a [ItemView], search: &str, item_type: Option<ItemType>) -> Vec<&'a ItemView> {
    let needle = search.trim().to_lowercase();
    views
        .iter()
        .filter(|view| item_type.map_or(true, |t| view.item_type == t))
        .filter(|view| needle.is_empty() || view.name.to_lowercase().contains(&needle))
        .collect()
}
