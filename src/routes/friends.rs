//! # 친구 라우트 핸들러
//!
//! ## 엔드포인트
//! - `POST   /api/v1/friends/requests`              → 이메일로 친구 요청
//! - `GET    /api/v1/friends/requests`              → 보냈거나 받은 대기 중 요청
//! - `POST   /api/v1/friends/requests/{id}/accept`  → 수락
//! - `POST   /api/v1/friends/requests/{id}/decline` → 거절
//! - `GET    /api/v1/friends`                       → 친구 목록
//! - `DELETE /api/v1/friends/{user_id}`             → 친구 끊기
//! - `GET    /api/v1/friends/{user_id}/pages`       → 친구가 공개한 페이지 목록

use crate::{
    db,
    error::AppError,
    middleware::auth::AuthUser,
    models::*,
    routes::AppState,
    services::{
        access::{can_access, FriendList},
        friends,
    },
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

pub async fn send_request(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(req): Json<SendFriendRequest>,
) -> Result<(StatusCode, Json<FriendRequest>), AppError> {
    let request = friends::send_request(&state.pool, &state.feed, &auth_user.user_id, &req.email).await?;
    Ok((StatusCode::CREATED, Json(request)))
}

pub async fn list_requests(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<Value>, AppError> {
    let requests = db::list_pending_requests(&state.pool, &auth_user.user_id).await?;
    let (incoming, outgoing): (Vec<_>, Vec<_>) = requests
        .into_iter()
        .partition(|r| r.recipient_id == auth_user.user_id);
    Ok(Json(json!({ "incoming": incoming, "outgoing": outgoing })))
}

pub async fn accept_request(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let (request, friendship) =
        friends::accept_request(&state.pool, &state.feed, &auth_user.user_id, &id).await?;
    Ok(Json(json!({ "request": request, "friendship": friendship })))
}

pub async fn decline_request(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<FriendRequest>, AppError> {
    let request = friends::decline_request(&state.pool, &state.feed, &auth_user.user_id, &id).await?;
    Ok(Json(request))
}

pub async fn list_friends(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<Value>, AppError> {
    let friends = db::list_friends(&state.pool, &auth_user.user_id).await?;
    Ok(Json(json!({ "friends": friends })))
}

pub async fn remove_friend(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(friend_id): Path<String>,
) -> Result<StatusCode, AppError> {
    friends::remove_friend(&state.pool, &state.feed, &auth_user.user_id, &friend_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// 친구의 페이지 중 내가 읽을 수 있는 것만 돌려줍니다.
pub async fn list_friend_pages(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(friend_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let graph = FriendList::new(
        db::friendships_between(&state.pool, &auth_user.user_id, &friend_id).await?,
    );
    let pages: Vec<PageSummary> = db::list_friend_visible_pages(&state.pool, &friend_id)
        .await?
        .into_iter()
        .filter(|page| can_access(&auth_user.user_id, page, &graph))
        .collect();

    Ok(Json(json!({ "pages": pages })))
}
