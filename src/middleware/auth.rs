//! # 인증 미들웨어
//!
//! `Authorization: Bearer <token>` 헤더에서 사용자를 꺼내는 추출기입니다.
//! 브라우저 `EventSource`는 헤더를 붙일 수 없으므로, 실시간 스트림을 위해
//! `?access_token=` 쿼리 파라미터도 받습니다.
//!
//! 토큰은 두 종류입니다. 종류는 `typ` 클레임에 들어가며, access 토큰 자리에
//! refresh 토큰을 쓰거나 그 반대로 쓰면 거부됩니다.
//! - access: 15분, 모든 API 요청
//! - refresh: 7일, `/auth/refresh` 전용. 해시(`hash_token`)만 DB에 저장됩니다.

use axum::{
    extract::{FromRequestParts, Query},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::routes::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn ttl(self) -> Duration {
        match self {
            TokenKind::Access => Duration::minutes(15),
            TokenKind::Refresh => Duration::days(7),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // user id
    pub exp: i64,
    pub iat: i64,
    /// 같은 초에 두 번 발급해도 refresh 토큰 해시가 겹치지 않게 하는 고유 ID
    pub jti: String,
    pub typ: TokenKind,
}

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
}

/// SSE 연결용 `?access_token=...`
#[derive(Debug, Deserialize)]
struct TokenQuery {
    access_token: Option<String>,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = match parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
        {
            Some(header) => header
                .strip_prefix("Bearer ")
                .ok_or(AuthError::InvalidToken)?
                .to_string(),
            None => query_token(parts).ok_or(AuthError::MissingToken)?,
        };

        let claims = verify_token(&token, TokenKind::Access, &state.jwt_secret)?;

        Ok(AuthUser {
            user_id: claims.sub,
        })
    }
}

// 쿼리 문자열은 axum `Query`로 파싱하므로 퍼센트 인코딩도 풀립니다.
fn query_token(parts: &Parts) -> Option<String> {
    let Query(query) = Query::<TokenQuery>::try_from_uri(&parts.uri).ok()?;
    query.access_token.filter(|token| !token.is_empty())
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Authorization token is required")]
    MissingToken,
    #[error("Invalid authorization token")]
    InvalidToken,
    #[error("Authorization token has expired")]
    ExpiredToken,
}

impl AuthError {
    fn code(&self) -> &'static str {
        match self {
            AuthError::MissingToken => "missing_token",
            AuthError::InvalidToken => "invalid_token",
            AuthError::ExpiredToken => "expired_token",
        }
    }
}

impl IntoResponse for AuthError {
    /// `AppError`와 같은 모양: `{ "error": { "code", "message" } }`, 상태는 항상 401.
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "code": self.code(),
                "message": self.to_string()
            }
        }));

        (StatusCode::UNAUTHORIZED, body).into_response()
    }
}

pub fn create_token(
    user_id: &str,
    kind: TokenKind,
    secret: &str,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        exp: (now + kind.ttl()).timestamp(),
        iat: now.timestamp(),
        jti: uuid::Uuid::new_v4().to_string(),
        typ: kind,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// 서명, 만료, 종류를 확인합니다.
pub fn verify_token(token: &str, kind: TokenKind, secret: &str) -> Result<Claims, AuthError> {
    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
        _ => AuthError::InvalidToken,
    })?
    .claims;

    if claims.typ != kind {
        return Err(AuthError::InvalidToken);
    }
    Ok(claims)
}

pub fn hash_token(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}
