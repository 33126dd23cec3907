//! # 사용자 / refresh 토큰 쿼리 모듈
//!
//! 사용자는 이메일로 식별합니다. `is_pro`/`plan`/`current_period_end`는
//! 결제 웹훅이 채우는 값이라 여기서는 읽기만 합니다.

use crate::error::AppError;
use crate::models::user::User;
use sqlx::SqlitePool;

const USER_COLUMNS: &str = "id, email, display_name, password_hash, is_pro, plan, \
                            current_period_end, created_at, updated_at";

pub async fn create_user(
    pool: &SqlitePool,
    id: &str,
    email: &str,
    display_name: Option<&str>,
    password_hash: &str,
) -> Result<User, AppError> {
    sqlx::query(
        r#"
        INSERT INTO users (id, email, display_name, password_hash)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(id)
    .bind(email)
    .bind(display_name)
    .bind(password_hash)
    .execute(pool)
    .await?;

    find_by_id(pool, id)
        .await?
        .ok_or(AppError::Internal("Failed to retrieve created user".to_string()))
}

pub async fn find_by_id(pool: &SqlitePool, id: &str) -> Result<Option<User>, AppError> {
    let user = sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(user)
}

pub async fn find_by_email(pool: &SqlitePool, email: &str) -> Result<Option<User>, AppError> {
    // 이메일은 대소문자를 구분하지 않고 비교합니다.
    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {} FROM users WHERE lower(email) = lower(?)",
        USER_COLUMNS
    ))
    .bind(email)
    .fetch_optional(pool)
    .await?;

    Ok(user)
}

pub async fn store_refresh_token(
    pool: &SqlitePool,
    id: &str,
    user_id: &str,
    token_hash: &str,
    expires_at: &str,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(id)
    .bind(user_id)
    .bind(token_hash)
    .bind(expires_at)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn find_refresh_token(
    pool: &SqlitePool,
    token_hash: &str,
) -> Result<Option<(String, String, String)>, AppError> {
    let row = sqlx::query_as::<_, (String, String, String)>(
        r#"
        SELECT id, user_id, expires_at
        FROM refresh_tokens
        WHERE token_hash = ?
        "#,
    )
    .bind(token_hash)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

pub async fn delete_refresh_token(pool: &SqlitePool, token_hash: &str) -> Result<(), AppError> {
    sqlx::query("DELETE FROM refresh_tokens WHERE token_hash = ?")
        .bind(token_hash)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn delete_user_refresh_tokens(pool: &SqlitePool, user_id: &str) -> Result<(), AppError> {
    sqlx::query("DELETE FROM refresh_tokens WHERE user_id = ?")
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::memory_pool;

    #[tokio::test]
    async fn email_lookup_ignores_case() {
        let pool = memory_pool().await;
        let user = create_user(&pool, "u1", "Ana@Example.com", Some("Ana"), "hash")
            .await
            .unwrap();
        assert_eq!(user.is_pro, 0);
        assert!(user.plan.is_none());

        let found = find_by_email(&pool, "ana@example.com").await.unwrap().unwrap();
        assert_eq!(found.id, "u1");
        assert!(find_by_email(&pool, "ben@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn refresh_tokens_are_found_by_hash_and_revoked() {
        let pool = memory_pool().await;
        create_user(&pool, "u1", "ana@example.com", None, "hash").await.unwrap();
        store_refresh_token(&pool, "t1", "u1", "digest", "2099-01-01T00:00:00Z")
            .await
            .unwrap();

        let (id, user_id, _) = find_refresh_token(&pool, "digest").await.unwrap().unwrap();
        assert_eq!((id.as_str(), user_id.as_str()), ("t1", "u1"));

        delete_user_refresh_tokens(&pool, "u1").await.unwrap();
        assert!(find_refresh_token(&pool, "digest").await.unwrap().is_none());
    }
}
