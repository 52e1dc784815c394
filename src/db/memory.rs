// In-memory repository for debug runs and tests

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::LibraryRepository;
use crate::models::*;
use crate::types::{AppError, AppResult, SortBy, SortOrder};

#[derive(Default)]
pub struct MemoryRepository {
    users: RwLock<HashMap<Uuid, User>>,
    items: RwLock<HashMap<Uuid, LibraryItem>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn matches_query(item: &LibraryItem, query: &ItemQuery) -> bool {
    if let Some(owner) = query.owner {
        if item.user_profile_id != owner {
            return false;
        }
    }
    if (query.public_only || !query.include_deleted) && item.is_deleted() {
        return false;
    }
    if query.item_type.is_some_and(|t| t != item.item_type) {
        return false;
    }
    if query.visibility.is_some_and(|v| v != item.visibility) {
        return false;
    }
    if let Some(search) = &query.search {
        let needle = search.to_lowercase();
        if !item.name.to_lowercase().contains(&needle)
            && !item.original_filename.to_lowercase().contains(&needle)
        {
            return false;
        }
    }
    true
}

fn compare_items(a: &LibraryItem, b: &LibraryItem, sort_by: SortBy) -> Ordering {
    let primary = match sort_by {
        SortBy::CreatedAt => a.created_at.cmp(&b.created_at),
        SortBy::UpdatedAt => a.updated_at.cmp(&b.updated_at),
        SortBy::Name => a.name.cmp(&b.name),
        SortBy::FileSize => a.file_size.cmp(&b.file_size),
    };
    primary.then_with(|| a.id.cmp(&b.id))
}

#[async_trait]
impl LibraryRepository for MemoryRepository {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn create_user(&self, username: &str, nickname: &str) -> AppResult<User> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.username == username) {
            return Err(AppError::Conflict(format!("User already exists: {}", username)));
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            nickname: nickname.to_string(),
            created_at: now,
            updated_at: now,
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user_by_username(&self, username: &str) -> AppResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.username == username).cloned())
    }

    async fn get_user_by_nickname(&self, nickname: &str) -> AppResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.nickname == nickname).cloned())
    }

    async fn update_user_nickname(&self, user_id: Uuid, nickname: &str) -> AppResult<Option<User>> {
        let mut users = self.users.write().await;
        Ok(users.get_mut(&user_id).map(|user| {
            user.nickname = nickname.to_string();
            user.updated_at = Utc::now();
            user.clone()
        }))
    }

    async fn user_stats(&self, user_id: Uuid, recent_since: DateTime<Utc>) -> AppResult<UserStats> {
        let items = self.items.read().await;
        let mut stats = UserStats {
            total_items: 0,
            total_file_size: 0,
            items_by_type: HashMap::new(),
            recent_uploads: 0,
        };

        for item in items
            .values()
            .filter(|i| i.user_profile_id == user_id && !i.is_deleted())
        {
            stats.total_items += 1;
            stats.total_file_size += item.file_size;
            *stats.items_by_type.entry(item.item_type).or_insert(0) += 1;
            if item.created_at >= recent_since {
                stats.recent_uploads += 1;
            }
        }

        Ok(stats)
    }

    async fn create_item(&self, item: NewLibraryItem) -> AppResult<LibraryItem> {
        let users = self.users.read().await;
        if !users.contains_key(&item.user_profile_id) {
            return Err(AppError::InvalidRequest("Unknown owner".to_string()));
        }

        let now = Utc::now();
        let created = LibraryItem {
            id: Uuid::new_v4(),
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
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        self.items.write().await.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_item(&self, id: Uuid) -> AppResult<Option<LibraryItem>> {
        Ok(self.items.read().await.get(&id).cloned())
    }

    async fn list_items(&self, query: &ItemQuery) -> AppResult<(Vec<LibraryItem>, i64)> {
        let items = self.items.read().await;
        let mut matched: Vec<LibraryItem> = items
            .values()
            .filter(|item| matches_query(item, query))
            .cloned()
            .collect();

        matched.sort_by(|a, b| {
            let ord = compare_items(a, b, query.sort_by);
            match query.sort_order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            }
        });

        let total = matched.len() as i64;
        let page = matched
            .into_iter()
            .skip(query.skip as usize)
            .take(query.limit as usize)
            .collect();

        Ok((page, total))
    }

    async fn update_item(&self, id: Uuid, changes: ItemChanges) -> AppResult<Option<LibraryItem>> {
        let mut items = self.items.write().await;
        Ok(items.get_mut(&id).map(|item| {
            if let Some(name) = changes.name {
                item.name = name;
            }
            if let Some(visibility) = changes.visibility {
                item.visibility = visibility;
            }
            if let Some(preview_text) = changes.preview_text {
                item.preview_text = preview_text;
            }
            item.updated_at = Utc::now();
            item.clone()
        }))
    }

    async fn soft_delete_item(&self, id: Uuid) -> AppResult<bool> {
        let mut items = self.items.write().await;
        match items.get_mut(&id) {
            Some(item) if !item.is_deleted() => {
                let now = Utc::now();
                item.deleted_at = Some(now);
                item.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn restore_item(&self, id: Uuid) -> AppResult<bool> {
        let mut items = self.items.write().await;
        match items.get_mut(&id) {
            Some(item) if item.is_deleted() => {
                item.deleted_at = None;
                item.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn purge_item(&self, id: Uuid) -> AppResult<bool> {
        Ok(self.items.write().await.remove(&id).is_some())
    }
}
