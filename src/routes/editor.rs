//! # 편집기 세션 라우트 핸들러
//!
//! 인증된 사용자마다 세션이 하나 있습니다.
//!
//! ## 엔드포인트
//! - `POST /api/v1/editor/open`    → 페이지를 세션에 연결 (`Loading`)
//! - `POST /api/v1/editor/ack`     → 렌더 완료 확인 (`Bound`)
//! - `PUT  /api/v1/editor/content` → 로컬 편집 (적용되면 자동 저장 예약)
//! - `GET  /api/v1/editor/status`  → 세션 상태 + 저장 상태
//! - `POST /api/v1/editor/close`   → 세션 종료 (남은 저장을 마칠 때까지 대기)

use crate::{
    db,
    error::AppError,
    middleware::auth::AuthUser,
    models::*,
    routes::AppState,
    services::{access, editor::{EditorStatus, SessionTag}},
};
use axum::{extract::State, Json};
use serde_json::{json, Value};

pub async fn open(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(req): Json<OpenEditorRequest>,
) -> Result<Json<OpenEditorResponse>, AppError> {
    if req.page_id.trim().is_empty() {
        return Err(AppError::BadRequest("page_id is required".to_string()));
    }
    let row = db::get_page(&state.pool, &req.page_id)
        .await?
        .ok_or(AppError::NotFound)?;
    access::authorize_read(&state.pool, &auth_user.user_id, &row).await?;
    // 친구 공개 페이지는 읽기만 가능합니다.
    if row.user_id != auth_user.user_id {
        return Err(AppError::Forbidden("Only the owner can edit this page".to_string()));
    }

    let response = state.editors.open(&auth_user.user_id, Page::from(row)).await?;
    Ok(Json(response))
}

pub async fn acknowledge(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(req): Json<AckRequest>,
) -> Result<Json<Value>, AppError> {
    let tag = SessionTag {
        page_id: req.page_id,
        epoch: req.epoch,
    };
    let acknowledged = state.editors.acknowledge(&auth_user.user_id, &tag).await?;
    Ok(Json(json!({ "acknowledged": acknowledged })))
}

pub async fn edit(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(req): Json<EditRequest>,
) -> Result<Json<Value>, AppError> {
    let outcome = state.editors.edit(&auth_user.user_id, req).await?;
    Ok(Json(json!({ "outcome": outcome })))
}

pub async fn status(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Json<EditorStatus> {
    Json(state.editors.status(&auth_user.user_id).await)
}

pub async fn close(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Json<Value> {
    let save = state.editors.close(&auth_user.user_id).await;
    Json(json!({ "save": save }))
}
