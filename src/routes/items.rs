use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::middleware::{CurrentUser, MaybeUser};
use crate::models::{
    AppState, CreateItemRequest, DeleteItemParams, ItemChanges, ItemQuery, LibraryItem,
    LibraryItemResponse, ListItemsParams, NewLibraryItem, PaginatedResponse, SuccessResponse,
    UpdateItemRequest, User,
};
use crate::storage::{key_belongs_to, thumbnail_key};
use crate::types::{AppError, AppResult};
use crate::upload_policy::check_content_type;

type ItemPage = SuccessResponse<PaginatedResponse<LibraryItemResponse>>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/library-items", post(create_item).get(list_items))
        .route("/api/v1/library-items/public", get(list_public_items))
        .route(
            "/api/v1/library-items/{id}",
            get(get_item).patch(update_item).delete(delete_item),
        )
        .route("/api/v1/library-items/{id}/restore", post(restore_item))
        .with_state(state)
}

/// Load an item the caller owns. Missing items are 404, foreign ones 403.
async fn owned_item(state: &AppState, user: &User, id: Uuid) -> AppResult<LibraryItem> {
    let item = state
        .repo
        .get_item(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Item not found".to_string()))?;

    if !item.is_owned_by(user.id) {
        return Err(AppError::Forbidden("You do not have permission for this item".to_string()));
    }
    Ok(item)
}

/// Item names are stored trimmed and must not be blank
fn item_name(name: &str) -> AppResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::InvalidRequest("name must not be blank".to_string()));
    }
    Ok(name.to_string())
}

async fn page(state: &AppState, query: ItemQuery) -> AppResult<PaginatedResponse<LibraryItemResponse>> {
    let (items, total) = state.repo.list_items(&query).await?;
    let has_more = query.skip + (items.len() as i64) < total;

    Ok(PaginatedResponse {
        items: items
            .into_iter()
            .map(|item| LibraryItemResponse::from_item(item, state.store.as_ref()))
            .collect(),
        total,
        skip: query.skip,
        limit: query.limit,
        has_more,
    })
}

async fn create_item(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<CreateItemRequest>,
) -> AppResult<(StatusCode, Json<SuccessResponse<LibraryItemResponse>>)> {
    request.validate()?;
    let name = item_name(&request.name)?;
    let (mut mime_type, mut item_type) =
        check_content_type(&request.mime_type).map_err(|rejection| AppError::InvalidRequest(rejection.to_string()))?;

    if !key_belongs_to(&request.s3_key, &user.id.to_string()) {
        return Err(AppError::Forbidden("Storage key does not belong to the caller".to_string()));
    }
    if let Some(thumb) = &request.s3_thumbnail_key {
        if *thumb != thumbnail_key(&request.s3_key) {
            return Err(AppError::InvalidRequest("Thumbnail key does not match the file key".to_string()));
        }
    }

    let object = state
        .store
        .stat(&request.s3_key)
        .await?
        .ok_or_else(|| AppError::InvalidRequest("Uploaded file was not found in storage".to_string()))?;

    let file_size = object
        .size
        .and_then(|size| i64::try_from(size).ok())
        .unwrap_or(request.file_size);

    // The content type recorded by storage wins over the one claimed in the request
    if let Some(stored) = object.content_type.as_deref() {
        (mime_type, item_type) =
            check_content_type(stored).map_err(|rejection| AppError::InvalidRequest(rejection.to_string()))?;
    }
    if item_type != request.item_type {
        debug!(claimed = %request.item_type, derived = %item_type, "Item type derived from content type");
    }

    let item = state
        .repo
        .create_item(NewLibraryItem {
            user_profile_id: user.id,
            name,
            item_type,
            mime_type,
            visibility: request.visibility,
            s3_thumbnail_key: request.s3_thumbnail_key,
            s3_key: request.s3_key,
            file_size,
            preview_text: request.preview_text,
            original_filename: request.original_filename,
        })
        .await?;

    info!(item_id = %item.id, username = %user.username, "Library item created");

    Ok((
        StatusCode::CREATED,
        Json(SuccessResponse::new(
            LibraryItemResponse::from_item(item, state.store.as_ref()),
            "Library item created",
        )),
    ))
}

async fn list_items(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(params): Query<ListItemsParams>,
) -> AppResult<Json<ItemPage>> {
    let page = page(&state, params.into_query(Some(user.id), false)).await?;
    Ok(Json(SuccessResponse::new(page, "Library items retrieved")))
}

async fn list_public_items(
    State(state): State<AppState>,
    MaybeUser(_user): MaybeUser,
    Query(params): Query<ListItemsParams>,
) -> AppResult<Json<ItemPage>> {
    let page = page(&state, params.into_query(None, true)).await?;
    Ok(Json(SuccessResponse::new(page, "Public library items retrieved")))
}

async fn get_item(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<SuccessResponse<LibraryItemResponse>>> {
    let item = state
        .repo
        .get_item(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Item not found".to_string()))?;

    if !item.is_visible_to(Some(user.id)) {
        if item.is_deleted() {
            return Err(AppError::NotFound("Item not found".to_string()));
        }
        return Err(AppError::Forbidden("You do not have permission for this item".to_string()));
    }

    Ok(Json(SuccessResponse::new(
        LibraryItemResponse::from_item(item, state.store.as_ref()),
        "Library item retrieved",
    )))
}

async fn update_item(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateItemRequest>,
) -> AppResult<Json<SuccessResponse<LibraryItemResponse>>> {
    request.validate()?;
    let item = owned_item(&state, &user, id).await?;
    if item.is_deleted() {
        return Err(AppError::InvalidRequest("Deleted items cannot be edited".to_string()));
    }

    let changes = ItemChanges {
        name: request.name.as_deref().map(item_name).transpose()?,
        visibility: request.visibility,
        preview_text: request.preview_text,
    };
    let updated = state
        .repo
        .update_item(id, changes)
        .await?
        .ok_or_else(|| AppError::NotFound("Item not found".to_string()))?;

    info!(item_id = %id, "Library item updated");

    Ok(Json(SuccessResponse::new(
        LibraryItemResponse::from_item(updated, state.store.as_ref()),
        "Library item updated",
    )))
}

async fn delete_item(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Query(params): Query<DeleteItemParams>,
) -> AppResult<Json<SuccessResponse<Uuid>>> {
    let item = owned_item(&state, &user, id).await?;

    if params.permanent.unwrap_or(false) {
        state.repo.purge_item(id).await?;
        // The row is gone; a leftover object is only logged
        for key in std::iter::once(&item.s3_key).chain(item.s3_thumbnail_key.as_ref()) {
            if let Err(e) = state.store.delete(key).await {
                warn!(item_id = %id, key = %key, "Failed to delete stored object: {}", e);
            }
        }
        info!(item_id = %id, "Library item permanently deleted");
        return Ok(Json(SuccessResponse::new(id, "Library item permanently deleted")));
    }

    if !state.repo.soft_delete_item(id).await? {
        return Err(AppError::NotFound("Item is already deleted".to_string()));
    }
    info!(item_id = %id, "Library item moved to trash");
    Ok(Json(SuccessResponse::new(id, "Library item deleted")))
}

async fn restore_item(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<SuccessResponse<LibraryItemResponse>>> {
    owned_item(&state, &user, id).await?;

    if !state.repo.restore_item(id).await? {
        return Err(AppError::InvalidRequest("Item is not deleted".to_string()));
    }
    let item = state
        .repo
        .get_item(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Item not found".to_string()))?;

    info!(item_id = %id, "Library item restored");
    Ok(Json(SuccessResponse::new(
        LibraryItemResponse::from_item(item, state.store.as_ref()),
        "Library item restored",
    )))
}
