//! # 인증 라우트 핸들러
//!
//! ## 엔드포인트
//! - `POST /api/v1/auth/register` → 이메일/비밀번호 회원가입
//! - `POST /api/v1/auth/login`    → 로그인 (access + refresh 토큰 발급)
//! - `POST /api/v1/auth/refresh`  → refresh 토큰 교체
//! - `POST /api/v1/auth/logout`   → 내 refresh 토큰 전부 폐기
//! - `GET  /api/v1/auth/me`       → 내 정보 (결제 필드는 읽기 전용)

use crate::{
    db::users as db_users,
    error::AppError,
    middleware::auth::{create_token, hash_token, verify_token, AuthUser, TokenKind},
    models::user::*,
    routes::AppState,
};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{extract::State, Json};
use chrono::Utc;
use serde_json::{json, Value};

const TOKEN_EXPIRY_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    // Validate input
    let email = req.email.trim().to_lowercase();
    if req.password.len() < 8 {
        return Err(AppError::BadRequest("Password must be at least 8 characters".to_string()));
    }
    if !email.contains('@') {
        return Err(AppError::BadRequest("Invalid email address".to_string()));
    }

    // Check if email already exists
    if db_users::find_by_email(&state.pool, &email).await?.is_some() {
        return Err(AppError::Conflict("Email already exists".to_string()));
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))?
        .to_string();

    // Create user
    let user_id = uuid::Uuid::now_v7().to_string();
    let display_name = req
        .display_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty());
    let user = db_users::create_user(&state.pool, &user_id, &email, display_name, &password_hash).await?;
    tracing::info!(user_id = %user.id, "user registered");

    Ok(Json(issue_tokens(&state, user).await?))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    // Find user by email
    let user = db_users::find_by_email(&state.pool, req.email.trim())
        .await?
        .ok_or(AppError::Unauthorized("Invalid email or password".to_string()))?;

    // Verify password
    let parsed_hash = PasswordHash::new(&user.password_hash)
        .map_err(|e| AppError::Internal(format!("Password hash parse error: {}", e)))?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| AppError::Unauthorized("Invalid email or password".to_string()))?;

    Ok(Json(issue_tokens(&state, user).await?))
}

pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    // Verify the refresh token JWT
    let _claims = verify_token(&req.refresh_token, TokenKind::Refresh, &state.jwt_secret)
        .map_err(|_| AppError::Unauthorized("Invalid refresh token".to_string()))?;

    // Check if refresh token hash exists in DB
    let token_hash = hash_token(&req.refresh_token);
    let (_token_id, user_id, expires_at) = db_users::find_refresh_token(&state.pool, &token_hash)
        .await?
        .ok_or(AppError::Unauthorized("Refresh token not found or revoked".to_string()))?;

    // Check expiration
    let expires = chrono::NaiveDateTime::parse_from_str(&expires_at, TOKEN_EXPIRY_FORMAT)
        .map_err(|e| AppError::Internal(format!("Date parse error: {}", e)))?;
    if expires.and_utc() < Utc::now() {
        // Delete expired token
        db_users::delete_refresh_token(&state.pool, &token_hash).await?;
        return Err(AppError::Unauthorized("Refresh token expired".to_string()));
    }

    // Verify user still exists
    let user = db_users::find_by_id(&state.pool, &user_id)
        .await?
        .ok_or(AppError::Unauthorized("User not found".to_string()))?;

    // Delete old refresh token
    db_users::delete_refresh_token(&state.pool, &token_hash).await?;

    Ok(Json(issue_tokens(&state, user).await?))
}

pub async fn logout(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<Value>, AppError> {
    // Delete all refresh tokens for this user
    db_users::delete_user_refresh_tokens(&state.pool, &auth_user.user_id).await?;

    Ok(Json(json!({ "message": "Logged out successfully" })))
}

pub async fn me(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<UserResponse>, AppError> {
    let user = db_users::find_by_id(&state.pool, &auth_user.user_id)
        .await?
        .ok_or(AppError::NotFound)?;

    Ok(Json(user.into()))
}

// access/refresh 토큰을 만들고 refresh 토큰의 해시를 저장합니다.
async fn issue_tokens(state: &AppState, user: User) -> Result<AuthResponse, AppError> {
    let access_token = create_token(&user.id, TokenKind::Access, &state.jwt_secret)
        .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))?;
    let refresh_token = create_token(&user.id, TokenKind::Refresh, &state.jwt_secret)
        .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))?;

    let token_id = uuid::Uuid::now_v7().to_string();
    let token_hash = hash_token(&refresh_token);
    let expires_at = (Utc::now() + TokenKind::Refresh.ttl())
        .format(TOKEN_EXPIRY_FORMAT)
        .to_string();

    db_users::store_refresh_token(&state.pool, &token_id, &user.id, &token_hash, &expires_at).await?;

    Ok(AuthResponse {
        user: user.into(),
        access_token,
        refresh_token,
    })
}
