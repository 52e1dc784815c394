// Item listing with a placeholder fallback when the API is unreachable

use chrono::{TimeZone, Utc};
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use super::{ItemView, LibraryClient};
use crate::models::ListItemsParams;
use crate::types::{ItemType, Visibility};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogSource {
    Live,
    Placeholder,
}

#[derive(Debug, Clone, Serialize)]
pub struct Catalog {
    pub items: Vec<ItemView>,
    pub total: i64,
    pub has_more: bool,
    pub source: CatalogSource,
    /// Why the live listing could not be used
    pub notice: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogScope {
    Mine,
    Public,
}

impl Catalog {
    /// Fetch one page. Any failure is logged and replaced by placeholder rows.
    pub async fn load(client: &LibraryClient, scope: CatalogScope, params: &ListItemsParams) -> Self {
        let result = match scope {
            CatalogScope::Mine => client.list_items(params).await,
            CatalogScope::Public => client.list_public_items(params).await,
        };

        match result {
            Ok(page) => Catalog {
                items: page.items.iter().map(ItemView::from).collect(),
                total: page.total,
                has_more: page.has_more,
                source: CatalogSource::Live,
                notice: None,
            },
            Err(e) => {
                warn!("Failed to load library items, showing placeholder data: {}", e);
                let items = placeholder_items();
                Catalog {
                    total: items.len() as i64,
                    items,
                    has_more: false,
                    source: CatalogSource::Placeholder,
                    notice: Some(e.to_string()),
                }
            }
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.source == CatalogSource::Placeholder
    }
}

fn placeholder(seq: u128, name: &str, item_type: ItemType, size: u64, visibility: Visibility, day: u32) -> ItemView {
    ItemView {
        id: Uuid::from_u128(seq),
        name: name.to_string(),
        item_type,
        type_label: super::type_label(item_type),
        icon: super::type_icon(item_type),
        size_label: super::format_file_size(size),
        date_label: Utc
            .with_ymd_and_hms(2024, 1, day, 9, 0, 0)
            .single()
            .map(super::format_date)
            .unwrap_or_default(),
        visibility_badge: super::visibility_badge(visibility),
        preview: None,
        is_deleted: false,
    }
}

/// Static rows shown when the listing cannot be fetched
pub fn placeholder_items() -> Vec<ItemView> {
    vec![
        placeholder(1, "Welcome guide", ItemType::Document, 245_760, Visibility::Public, 15),
        placeholder(2, "Team photo", ItemType::Image, 2_097_152, Visibility::Private, 12),
        placeholder(3, "Product demo", ItemType::Video, 52_428_800, Visibility::Public, 10),
        placeholder(4, "Project archive", ItemType::File, 10_485_760, Visibility::Private, 5),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_live_listing() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/library-items/public")
            .with_status(200)
            .with_body(
                json!({
                    "success": true,
                    "message": "ok",
                    "data": {
                        "items": [{
                            "id": Uuid::new_v4(),
                            "user_profile_id": Uuid::new_v4(),
                            "name": "Shared deck",
                            "type": "document",
                            "mime_type": "application/pdf",
                            "visibility": "public",
                            "s3_thumbnail_key": null,
                            "s3_key": "uploads/2024/01/u/a.pdf",
                            "file_size": 1024,
                            "preview_text": null,
                            "original_filename": "deck.pdf",
                            "file_url": "https://bucket/a.pdf",
                            "thumbnail_url": null,
                            "is_deleted": false,
                            "created_at": "2024-01-02T03:04:05Z",
                            "updated_at": "2024-01-02T03:04:05Z",
                            "deleted_at": null
                        }],
                        "total": 1, "skip": 0, "limit": 20, "has_more": false
                    }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = LibraryClient::new(&server.url());
        let catalog = Catalog::load(&client, CatalogScope::Public, &ListItemsParams::default()).await;

        assert_eq!(catalog.source, CatalogSource::Live);
        assert_eq!(catalog.total, 1);
        assert_eq!(catalog.items[0].size_label, "1.0 KB");
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_placeholders() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/library-items")
            .with_status(500)
            .with_body(r#"{"success":false,"error":{"message":"Database operation failed","status":500}}"#)
            .create_async()
            .await;

        let client = LibraryClient::new(&server.url());
        let catalog = Catalog::load(&client, CatalogScope::Mine, &ListItemsParams::default()).await;

        assert!(catalog.is_placeholder());
        assert_eq!(catalog.items, placeholder_items());
        assert_eq!(catalog.notice.as_deref(), Some("Database operation failed"));
    }
}
