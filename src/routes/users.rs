use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{Duration, Utc};
use tracing::info;

use crate::middleware::{CurrentUser, TokenSubject};
use crate::models::{
    normalize_nickname, AppState, AvailabilityResponse, NicknameQuery, RegisterUserRequest,
    SuccessResponse, UpdateUserRequest, User, UserStats,
};
use crate::types::{AppError, AppResult};

/// Window for `recent_uploads` in user stats
const RECENT_UPLOAD_DAYS: i64 = 7;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/users", post(register))
        .route("/api/v1/users/me", get(me).patch(update_me))
        .route("/api/v1/users/me/stats", get(stats))
        .route("/api/v1/users/nickname-available", get(nickname_available))
        .with_state(state)
}

async fn register(
    State(state): State<AppState>,
    TokenSubject(username): TokenSubject,
    Json(request): Json<RegisterUserRequest>,
) -> AppResult<(StatusCode, Json<SuccessResponse<User>>)> {
    let nickname = normalize_nickname(&request.nickname).map_err(AppError::InvalidRequest)?;

    if state.repo.get_user_by_username(&username).await?.is_some() {
        return Err(AppError::Conflict("User is already registered".to_string()));
    }
    if !state.repo.is_nickname_available(nickname, None).await? {
        return Err(AppError::Conflict("Nickname is already taken".to_string()));
    }

    let user = state.repo.create_user(&username, nickname).await?;
    info!(user_id = %user.id, username = %user.username, "User registered");

    Ok((StatusCode::CREATED, Json(SuccessResponse::new(user, "User registered"))))
}

async fn me(CurrentUser(user): CurrentUser) -> Json<SuccessResponse<User>> {
    Json(SuccessResponse::new(user, "Profile retrieved"))
}

async fn update_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<UpdateUserRequest>,
) -> AppResult<Json<SuccessResponse<User>>> {
    let Some(nickname) = request.nickname.as_deref() else {
        return Ok(Json(SuccessResponse::new(user, "Nothing to update")));
    };
    let nickname = normalize_nickname(nickname).map_err(AppError::InvalidRequest)?;

    if !state.repo.is_nickname_available(nickname, Some(user.id)).await? {
        return Err(AppError::Conflict("Nickname is already taken".to_string()));
    }

    let updated = state
        .repo
        .update_user_nickname(user.id, nickname)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    info!(user_id = %updated.id, "Nickname updated");
    Ok(Json(SuccessResponse::new(updated, "Profile updated")))
}

async fn stats(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<SuccessResponse<UserStats>>> {
    let since = Utc::now() - Duration::days(RECENT_UPLOAD_DAYS);
    let stats = state.repo.user_stats(user.id, since).await?;
    Ok(Json(SuccessResponse::new(stats, "Statistics retrieved")))
}

async fn nickname_available(
    State(state): State<AppState>,
    Query(query): Query<NicknameQuery>,
) -> AppResult<Json<SuccessResponse<AvailabilityResponse>>> {
    let nickname = normalize_nickname(&query.nickname).map_err(AppError::InvalidRequest)?;

    let available = state.repo.is_nickname_available(nickname, None).await?;
    Ok(Json(SuccessResponse::new(
        AvailabilityResponse { available },
        if available { "Nickname is available" } else { "Nickname is taken" },
    )))
}
