use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::collections::HashMap;
use uuid::Uuid;

use super::{pool, LibraryRepository};
use crate::models::*;
use crate::types::{AppError, AppResult, ItemType};

/// Postgres-backed repository
#[derive(Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Unique violations become conflicts, everything else stays a database error
fn map_unique_violation(err: sqlx::Error, message: &str) -> AppError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            return AppError::Conflict(message.to_string());
        }
    }
    AppError::Database(err)
}

/// Escape LIKE wildcards so user input matches literally
pub fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for ch in term.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn push_item_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &ItemQuery) {
    builder.push(" WHERE TRUE");

    if let Some(owner) = query.owner {
        builder.push(" AND user_profile_id = ").push_bind(owner);
    }
    if query.public_only || !query.include_deleted {
        builder.push(" AND deleted_at IS NULL");
    }
    if let Some(item_type) = query.item_type {
        builder.push(" AND type = ").push_bind(item_type);
    }
    if let Some(visibility) = query.visibility {
        builder.push(" AND visibility = ").push_bind(visibility);
    }
    if let Some(search) = &query.search {
        let pattern = format!("%{}%", escape_like(search));
        builder
            .push(" AND (name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR original_filename ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

#[async_trait]
impl LibraryRepository for PgRepository {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn ping(&self) -> anyhow::Result<()> {
        pool::health_check(&self.pool).await
    }

    // User operations
    async fn create_user(&self, username: &str, nickname: &str) -> AppResult<User> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, username, nickname)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(username)
        .bind(nickname)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, &format!("User already exists: {}", username)))
    }

    async fn get_user_by_username(&self, username: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    async fn get_user_by_nickname(&self, nickname: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE nickname = $1 LIMIT 1")
            .bind(nickname)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    async fn update_user_nickname(&self, user_id: Uuid, nickname: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET nickname = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(nickname)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn user_stats(&self, user_id: Uuid, recent_since: DateTime<Utc>) -> AppResult<UserStats> {
        let (total_items, total_file_size) = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT COUNT(*)::BIGINT, COALESCE(SUM(file_size), 0)::BIGINT
            FROM library_items
            WHERE user_profile_id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        let by_type = sqlx::query_as::<_, (ItemType, i64)>(
            r#"
            SELECT type, COUNT(*)::BIGINT
            FROM library_items
            WHERE user_profile_id = $1 AND deleted_at IS NULL
            GROUP BY type
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let recent_uploads = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)::BIGINT
            FROM library_items
            WHERE user_profile_id = $1 AND deleted_at IS NULL AND created_at >= $2
            "#,
        )
        .bind(user_id)
        .bind(recent_since)
        .fetch_one(&self.pool)
        .await?;

        let items_by_type: HashMap<ItemType, i64> = by_type.into_iter().collect();

        Ok(UserStats {
            total_items,
            total_file_size,
            items_by_type,
            recent_uploads,
        })
    }

    // Library item operations
    async fn create_item(&self, item: NewLibraryItem) -> AppResult<LibraryItem> {
        let created = sqlx::query_as::<_, LibraryItem>(
            r#"
            INSERT INTO library_items
                (id, user_profile_id, name, type, mime_type, visibility,
                 s3_thumbnail_key, s3_key, file_size, preview_text, original_filename)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(item.user_profile_id)
        .bind(&item.name)
        .bind(item.item_type)
        .bind(&item.mime_type)
        .bind(item.visibility)
        .bind(&item.s3_thumbnail_key)
        .bind(&item.s3_key)
        .bind(item.file_size)
        .bind(&item.preview_text)
        .bind(&item.original_filename)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    async fn get_item(&self, id: Uuid) -> AppResult<Option<LibraryItem>> {
        let item = sqlx::query_as::<_, LibraryItem>("SELECT * FROM library_items WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(item)
    }

    async fn list_items(&self, query: &ItemQuery) -> AppResult<(Vec<LibraryItem>, i64)> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*)::BIGINT FROM library_items");
        push_item_filters(&mut count, query);
        let total = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new("SELECT * FROM library_items");
        push_item_filters(&mut select, query);
        select
            .push(format!(
                " ORDER BY {col} {dir}, id {dir}",
                col = query.sort_by.column(),
                dir = query.sort_order.keyword()
            ))
            .push(" LIMIT ")
            .push_bind(query.limit)
            .push(" OFFSET ")
            .push_bind(query.skip);

        let items = select
            .build_query_as::<LibraryItem>()
            .fetch_all(&self.pool)
            .await?;

        Ok((items, total))
    }

    async fn update_item(&self, id: Uuid, changes: ItemChanges) -> AppResult<Option<LibraryItem>> {
        let item = sqlx::query_as::<_, LibraryItem>(
            r#"
            UPDATE library_items
            SET name = COALESCE($2, name),
                visibility = COALESCE($3, visibility),
                preview_text = CASE WHEN $4 THEN $5 ELSE preview_text END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(changes.name)
        .bind(changes.visibility)
        .bind(changes.preview_text.is_some())
        .bind(changes.preview_text.flatten())
        .fetch_optional(&self.pool)
        .await?;

        Ok(item)
    }

    async fn soft_delete_item(&self, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE library_items SET deleted_at = NOW(), updated_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn restore_item(&self, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE library_items SET deleted_at = NULL, updated_at = NOW() WHERE id = $1 AND deleted_at IS NOT NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn purge_item(&self, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM library_items WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
