//! # 에러 처리 모듈
//!
//! 애플리케이션에서 발생할 수 있는 모든 에러 타입을 정의합니다.
//! Rust에서는 예외(exception) 대신 `Result<T, E>` 타입으로 에러를 처리합니다.
//!
//! 이 모듈의 핵심:
//! - `AppError` 열거형(enum): 모든 에러 종류를 하나의 타입으로 통합
//! - `ErrorKind`: 재시도 여부를 결정하는 에러 분류 (검증/권한/일시적/없음/충돌/예상 외)
//! - `IntoResponse` 구현: 에러를 HTTP 응답으로 자동 변환

use axum::{
    http::StatusCode,                   // HTTP 상태 코드 (200, 404, 500 등)
    response::{IntoResponse, Response}, // Axum의 응답 변환 트레이트
    Json,                               // JSON 응답 래퍼
};
use serde_json::json;
use thiserror::Error;

/// 애플리케이션에서 발생할 수 있는 모든 에러 종류
///
/// 각 에러 variant는 적절한 HTTP 상태 코드와 메시지로 변환됩니다.
/// 핸들러에서 `Result<T, AppError>`를 반환하면,
/// Axum이 자동으로 `IntoResponse`를 호출하여 HTTP 응답으로 변환합니다.
#[derive(Debug, Error)]
pub enum AppError {
    /// 요청한 리소스를 찾을 수 없음 (HTTP 404)
    #[error("Resource not found")]
    NotFound,

    /// 잘못된 요청 (HTTP 400). 페이지 ID 누락, 깨진 문서 JSON 등 검증 실패.
    /// 재시도해도 결과가 같으므로 절대 재시도하지 않습니다.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// 서버 내부 오류 (HTTP 500)
    #[error("Internal error: {0}")]
    Internal(String),

    /// 데이터베이스 오류
    /// #[from]: sqlx::Error → AppError::Database 자동 변환.
    /// 상태 코드는 `kind()`가 sqlx 에러 내용을 보고 결정합니다.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// 인증 실패 (HTTP 401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// 권한 없음 (HTTP 403). 소유자가 아닌 사용자의 쓰기 등 행 단위 정책 거부.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// 리소스 충돌 (HTTP 409). "이미 존재함"을 나타냅니다.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// 일시적인 백엔드 오류 (HTTP 503). 스키마 캐시가 낡았거나 DB가 잠깐 바쁜 경우.
    /// 자동 저장은 이 종류에 한해서만 한 번 재시도합니다.
    #[error("Temporarily unavailable: {0}")]
    Transient(String),
}

/// 에러 분류. 호출 지점은 이 분류를 보고 재시도할지, 그대로 드러낼지를 결정합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Authorization,
    Transient,
    NotFound,
    Conflict,
    Unexpected,
}

// SQLite 기본 결과 코드: SQLITE_BUSY(5), SQLITE_LOCKED(6).
// 확장 코드(예: 517 = BUSY_SNAPSHOT)는 하위 8비트가 기본 코드입니다.
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

impl AppError {
    /// 에러를 `ErrorKind`로 분류합니다.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::NotFound => ErrorKind::NotFound,
            AppError::BadRequest(_) => ErrorKind::Validation,
            AppError::Unauthorized(_) | AppError::Forbidden(_) => ErrorKind::Authorization,
            AppError::Conflict(_) => ErrorKind::Conflict,
            AppError::Transient(_) => ErrorKind::Transient,
            AppError::Internal(_) => ErrorKind::Unexpected,
            AppError::Database(e) => classify_sqlx(e),
        }
    }

    /// 재시도할 가치가 있는 에러인지. 일시적 오류만 해당합니다.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

fn classify_sqlx(err: &sqlx::Error) -> ErrorKind {
    match err {
        sqlx::Error::RowNotFound => ErrorKind::NotFound,
        sqlx::Error::PoolTimedOut => ErrorKind::Transient,
        sqlx::Error::Database(db_err) => {
            if db_err.is_unique_violation() {
                return ErrorKind::Conflict;
            }
            if db_err.message().contains("schema cache") {
                return ErrorKind::Transient;
            }
            let primary = db_err
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                .map(|code| code & 0xff);
            match primary {
                Some(SQLITE_BUSY) | Some(SQLITE_LOCKED) => ErrorKind::Transient,
                _ => ErrorKind::Unexpected,
            }
        }
        _ => ErrorKind::Unexpected,
    }
}

impl IntoResponse for AppError {
    /// AppError를 HTTP 응답으로 변환합니다.
    ///
    /// 각 에러 종류에 따라 적절한 HTTP 상태 코드와 JSON 에러 메시지를 생성합니다.
    /// 내부 에러는 실제 에러 내용을 로그에만 기록하고,
    /// 클라이언트에는 일반적인 메시지만 반환합니다.
    fn into_response(self) -> Response {
        // (status, code, message) 튜플을 반환합니다.
        let (status, code, message) = match self {
            AppError::NotFound => (StatusCode::NOT_FOUND, "not_found", self.to_string()),
            AppError::BadRequest(ref msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            AppError::Unauthorized(ref msg) => {
                (StatusCode::UNAUTHORIZED, "unauthorized", msg.clone())
            }
            AppError::Forbidden(ref msg) => (StatusCode::FORBIDDEN, "forbidden", msg.clone()),
            AppError::Conflict(ref msg) => (StatusCode::CONFLICT, "conflict", msg.clone()),
            AppError::Transient(ref msg) => {
                tracing::warn!("Transient backend error: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "temporarily_unavailable",
                    "The service is temporarily unavailable, please retry".to_string(),
                )
            }
            AppError::Internal(ref msg) => {
                // 내부 에러는 로그에 기록 (서버 관리자용)
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    // 클라이언트에는 일반적인 메시지만 반환 (내부 구현 노출 방지)
                    "An internal error occurred".to_string(),
                )
            }
            // 데이터베이스 에러는 분류 결과에 따라 상태 코드가 달라집니다.
            AppError::Database(ref e) => match classify_sqlx(e) {
                ErrorKind::NotFound => (
                    StatusCode::NOT_FOUND,
                    "not_found",
                    "Resource not found".to_string(),
                ),
                ErrorKind::Conflict => (
                    StatusCode::CONFLICT,
                    "conflict",
                    "Resource already exists".to_string(),
                ),
                ErrorKind::Transient => {
                    tracing::warn!("Transient database error: {}", e);
                    (
                        StatusCode::SERVICE_UNAVAILABLE,
                        "temporarily_unavailable",
                        "The service is temporarily unavailable, please retry".to_string(),
                    )
                }
                _ => {
                    tracing::error!("Database error: {}", e);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "database_error",
                        "A database error occurred".to_string(),
                    )
                }
            },
        };

        // 결과: { "error": { "code": "not_found", "message": "Resource not found" } }
        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(AppError::Transient("schema cache".into()).is_retryable());
        assert!(!AppError::BadRequest("missing page id".into()).is_retryable());
        assert!(!AppError::Forbidden("not yours".into()).is_retryable());
        assert!(!AppError::Conflict("duplicate".into()).is_retryable());
        assert!(!AppError::NotFound.is_retryable());
        assert!(!AppError::Internal("boom".into()).is_retryable());
    }

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(AppError::BadRequest("x".into()).kind(), ErrorKind::Validation);
        assert_eq!(AppError::Unauthorized("x".into()).kind(), ErrorKind::Authorization);
        assert_eq!(AppError::Forbidden("x".into()).kind(), ErrorKind::Authorization);
        assert_eq!(AppError::Database(sqlx::Error::RowNotFound).kind(), ErrorKind::NotFound);
        assert_eq!(AppError::Database(sqlx::Error::PoolTimedOut).kind(), ErrorKind::Transient);
    }

    #[test]
    fn status_codes_match_kind() {
        assert_eq!(
            AppError::Forbidden("x".into()).into_response().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::Transient("x".into()).into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::Conflict("x".into()).into_response().status(),
            StatusCode::CONFLICT
        );
    }
}
