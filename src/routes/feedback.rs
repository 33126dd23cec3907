//! # 피드백 보드 라우트 핸들러
//!
//! ## 엔드포인트
//! - `GET    /api/v1/feedback`           → 목록 (작성자 이름, 내 투표 여부 포함)
//! - `POST   /api/v1/feedback`           → 작성
//! - `DELETE /api/v1/feedback/{id}`      → 삭제 (작성자만)
//! - `POST   /api/v1/feedback/{id}/vote` → 투표 토글
//!
//! 응답의 `vote_count`는 참고용입니다. 클라이언트는 변경 피드의 값으로 확정합니다.

use crate::{
    db,
    error::AppError,
    middleware::auth::AuthUser,
    models::*,
    routes::AppState,
    services::board,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

pub async fn list_feedback(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<Value>, AppError> {
    let feedback = db::list_feedback(&state.pool, &auth_user.user_id).await?;
    Ok(Json(json!({ "feedback": feedback })))
}

pub async fn create_feedback(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(req): Json<CreateFeedbackRequest>,
) -> Result<(StatusCode, Json<Feedback>), AppError> {
    let feedback =
        board::create_feedback(&state.pool, &state.feed, &auth_user.user_id, &req.content).await?;
    Ok((StatusCode::CREATED, Json(feedback)))
}

pub async fn delete_feedback(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    board::delete_feedback(&state.pool, &state.feed, &auth_user.user_id, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn toggle_vote(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<VoteOutcome>, AppError> {
    let outcome = board::toggle_vote(&state.pool, &state.feed, &auth_user.user_id, &id).await?;
    Ok(Json(outcome))
}
