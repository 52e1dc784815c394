use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::models::{ItemChanges, ItemQuery, LibraryItem, NewLibraryItem, User, UserStats};
use crate::types::AppResult;
use anyhow::{Context, Result};

pub use memory::*;
pub use operations::*;
pub use pool::*;

pub mod memory;
pub mod operations;
pub mod pool;

pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool> {
    let url = config
        .url
        .as_deref()
        .context("DATABASE_URL is not configured")?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect(url)
        .await?;

    health_check(&pool).await?;

    Ok(pool)
}

/// Persistence for users and library items
#[async_trait]
pub trait LibraryRepository: Send + Sync {
    /// Short backend name for health reporting
    fn backend(&self) -> &'static str;

    async fn ping(&self) -> Result<()>;

    // Users
    async fn create_user(&self, username: &str, nickname: &str) -> AppResult<User>;
    async fn get_user_by_username(&self, username: &str) -> AppResult<Option<User>>;
    async fn get_user_by_nickname(&self, nickname: &str) -> AppResult<Option<User>>;
    async fn update_user_nickname(&self, user_id: Uuid, nickname: &str) -> AppResult<Option<User>>;
    async fn user_stats(&self, user_id: Uuid, recent_since: DateTime<Utc>) -> AppResult<UserStats>;

    // Library items
    async fn create_item(&self, item: NewLibraryItem) -> AppResult<LibraryItem>;
    async fn get_item(&self, id: Uuid) -> AppResult<Option<LibraryItem>>;
    /// One page of matching items plus the total match count
    async fn list_items(&self, query: &ItemQuery) -> AppResult<(Vec<LibraryItem>, i64)>;
    async fn update_item(&self, id: Uuid, changes: ItemChanges) -> AppResult<Option<LibraryItem>>;
    /// Returns false when the item is missing or already deleted
    async fn soft_delete_item(&self, id: Uuid) -> AppResult<bool>;
    /// Returns false when the item is missing or not deleted
    async fn restore_item(&self, id: Uuid) -> AppResult<bool>;
    async fn purge_item(&self, id: Uuid) -> AppResult<bool>;

    async fn is_nickname_available(&self, nickname: &str, exclude_user: Option<Uuid>) -> AppResult<bool> {
        Ok(match self.get_user_by_nickname(nickname).await? {
            Some(user) => Some(user.id) == exclude_user,
            None => true,
        })
    }
}
