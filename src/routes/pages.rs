//! # 페이지 라우트 핸들러
//!
//! ## 엔드포인트
//! - `GET    /api/v1/pages`                 → 내 페이지 목록
//! - `POST   /api/v1/pages`                 → 새 페이지 생성
//! - `GET    /api/v1/pages/{id}`            → 페이지 조회 (소유자 또는 친구 공개 + 친구)
//! - `PATCH  /api/v1/pages/{id}/visibility` → 공개 범위 변경 (소유자만)
//! - `DELETE /api/v1/pages/{id}`            → 페이지 삭제 (소유자만)
//!
//! 본문 저장은 여기 없고 편집기 세션(`/editor/content`)과 자동 저장을 거칩니다.

use crate::{
    db,
    error::AppError,
    middleware::auth::AuthUser,
    models::*,
    routes::AppState,
    services::access,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

pub async fn list_pages(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<Value>, AppError> {
    let pages = db::list_pages(&state.pool, &auth_user.user_id).await?;
    Ok(Json(json!({ "pages": pages })))
}

pub async fn create_page(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(req): Json<CreatePageRequest>,
) -> Result<(StatusCode, Json<Page>), AppError> {
    if req.section_id.trim().is_empty() {
        return Err(AppError::BadRequest("section_id is required".to_string()));
    }

    let page = Page::from(db::create_page(&state.pool, &auth_user.user_id, &req).await?);
    state.feed.publish(ChangeEvent::insert(Table::Pages, &page));
    Ok((StatusCode::CREATED, Json(page)))
}

/// `GET /pages/{id}`: 접근 게이트를 통과해야 읽을 수 있습니다.
pub async fn get_page(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Page>, AppError> {
    let row = db::get_page(&state.pool, &id)
        .await?
        .ok_or(AppError::NotFound)?;
    access::authorize_read(&state.pool, &auth_user.user_id, &row).await?;

    Ok(Json(Page::from(row)))
}

pub async fn update_visibility(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateVisibilityRequest>,
) -> Result<Json<Page>, AppError> {
    let row = db::update_visibility(&state.pool, &auth_user.user_id, &id, req.visibility)
        .await?
        .ok_or(AppError::NotFound)?;

    let page = Page::from(row);
    state.feed.publish(ChangeEvent::update(Table::Pages, &page));
    tracing::info!(page_id = %id, visibility = ?req.visibility, "page visibility changed");
    Ok(Json(page))
}

pub async fn delete_page(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let row = db::get_page(&state.pool, &id)
        .await?
        .ok_or(AppError::NotFound)?;
    if row.user_id != auth_user.user_id {
        return Err(AppError::Forbidden("Only the owner can delete this page".to_string()));
    }

    if !db::delete_page(&state.pool, &auth_user.user_id, &id).await? {
        return Err(AppError::NotFound);
    }
    state.editors.autosave().forget(&id);
    state
        .feed
        .publish(ChangeEvent::delete(Table::Pages, &json!({ "id": id, "user_id": row.user_id })));

    Ok(StatusCode::NO_CONTENT)
}
