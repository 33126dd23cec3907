//! # 헬스체크(Health Check) 핸들러
//!
//! ## 엔드포인트
//! - `GET /api/v1/health` → `{ "status": "ok", "database": "ok" }`
//!
//! DB에 `SELECT 1`을 보내 연결 풀이 살아 있는지도 함께 확인합니다.
//! DB가 응답하지 않으면 상태 코드는 그대로 200이고 `"database": "unavailable"`이 됩니다.

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::routes::AppState;

/// `GET /health`: 서버 상태를 확인합니다.
pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let database = match sqlx::query("SELECT 1").execute(&state.pool).await {
        Ok(_) => "ok",
        Err(e) => {
            tracing::warn!("health check database ping failed: {}", e);
            "unavailable"
        }
    };

    Json(json!({
        "status": "ok",
        "database": database
    }))
}
