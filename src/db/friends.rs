//! # 친구 관계 / 친구 요청 쿼리 모듈
//!
//! 친구 관계는 대칭이지만 행은 `(user_id, friend_id)` 한 방향으로만 저장됩니다.
//! 두 사람 사이의 관계를 찾는 쿼리는 `friendships_between` 하나뿐이고,
//! `are_friends`를 비롯한 다른 경로는 모두 이 함수를 거칩니다.

use crate::error::AppError;
use crate::models::*;
use sqlx::{Sqlite, SqlitePool};

/// 두 사람 사이의 친구 관계 행 (어느 방향으로 저장됐든)
pub async fn friendships_between<'e, E>(executor: E, a: &str, b: &str) -> Result<Vec<Friendship>, AppError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query_as::<_, Friendship>(
        r#"
        SELECT id, user_id, friend_id, created_at
        FROM friendships
        WHERE (user_id = ? AND friend_id = ?) OR (user_id = ? AND friend_id = ?)
        "#,
    )
    .bind(a)
    .bind(b)
    .bind(b)
    .bind(a)
    .fetch_all(executor)
    .await?;

    Ok(rows)
}

pub async fn are_friends(pool: &SqlitePool, a: &str, b: &str) -> Result<bool, AppError> {
    if a == b {
        return Ok(false);
    }
    Ok(!friendships_between(pool, a, b).await?.is_empty())
}

/// 친구 목록 (상대방 정보)
pub async fn list_friends(pool: &SqlitePool, user_id: &str) -> Result<Vec<FriendSummary>, AppError> {
    let friends = sqlx::query_as::<_, FriendSummary>(
        r#"
        SELECT u.id, u.email, u.display_name
        FROM friendships f
        JOIN users u
          ON u.id = CASE WHEN f.user_id = ? THEN f.friend_id ELSE f.user_id END
        WHERE f.user_id = ? OR f.friend_id = ?
        ORDER BY u.email
        "#,
    )
    .bind(user_id)
    .bind(user_id)
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(friends)
}

/// 두 사람 사이의 관계 행을 지우고, 지운 행을 돌려줍니다.
pub async fn delete_friendship(pool: &SqlitePool, a: &str, b: &str) -> Result<Vec<Friendship>, AppError> {
    let rows = friendships_between(pool, a, b).await?;
    for row in &rows {
        sqlx::query("DELETE FROM friendships WHERE id = ?")
            .bind(&row.id)
            .execute(pool)
            .await?;
    }
    Ok(rows)
}

// ── 친구 요청 ──

const REQUEST_COLUMNS: &str = "id, sender_id, recipient_id, status, created_at, updated_at";

pub async fn get_friend_request(pool: &SqlitePool, id: &str) -> Result<Option<FriendRequest>, AppError> {
    let request = sqlx::query_as::<_, FriendRequest>(&format!(
        "SELECT {} FROM friend_requests WHERE id = ?",
        REQUEST_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(request)
}

/// 두 사람 사이에 오간 모든 요청 (양방향)
pub async fn requests_between(pool: &SqlitePool, a: &str, b: &str) -> Result<Vec<FriendRequest>, AppError> {
    let requests = sqlx::query_as::<_, FriendRequest>(&format!(
        r#"
        SELECT {}
        FROM friend_requests
        WHERE (sender_id = ? AND recipient_id = ?) OR (sender_id = ? AND recipient_id = ?)
        ORDER BY created_at
        "#,
        REQUEST_COLUMNS
    ))
    .bind(a)
    .bind(b)
    .bind(b)
    .bind(a)
    .fetch_all(pool)
    .await?;

    Ok(requests)
}

/// 내가 보냈거나 받은 대기 중 요청 (양쪽 이메일 포함)
pub async fn list_pending_requests(
    pool: &SqlitePool,
    user_id: &str,
) -> Result<Vec<FriendRequestView>, AppError> {
    let requests = sqlx::query_as::<_, FriendRequestView>(
        r#"
        SELECT r.id, r.sender_id, s.email AS sender_email,
               r.recipient_id, t.email AS recipient_email,
               r.status, r.created_at
        FROM friend_requests r
        JOIN users s ON s.id = r.sender_id
        JOIN users t ON t.id = r.recipient_id
        WHERE r.status = 'pending' AND (r.sender_id = ? OR r.recipient_id = ?)
        ORDER BY r.created_at DESC
        "#,
    )
    .bind(user_id)
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(requests)
}

pub async fn insert_friend_request(
    pool: &SqlitePool,
    sender_id: &str,
    recipient_id: &str,
) -> Result<FriendRequest, AppError> {
    let id = uuid::Uuid::now_v7().to_string();

    sqlx::query("INSERT INTO friend_requests (id, sender_id, recipient_id) VALUES (?, ?, ?)")
        .bind(&id)
        .bind(sender_id)
        .bind(recipient_id)
        .execute(pool)
        .await?;

    get_friend_request(pool, &id)
        .await?
        .ok_or(AppError::Internal("Failed to retrieve created friend request".to_string()))
}

/// 대기 중 요청의 상태를 바꿉니다. 이미 처리된 요청이면 None.
pub async fn set_request_status(
    pool: &SqlitePool,
    id: &str,
    status: FriendRequestStatus,
) -> Result<Option<FriendRequest>, AppError> {
    let result = sqlx::query(
        r#"
        UPDATE friend_requests
        SET status = ?, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
        WHERE id = ? AND status = 'pending'
        "#,
    )
    .bind(status)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }
    get_friend_request(pool, id).await
}

/// 요청을 수락합니다: 요청 상태를 accepted로 바꾸고 친구 관계 행을 하나 만듭니다.
///
/// 이미 어느 방향으로든 관계 행이 있으면 새로 만들지 않습니다.
/// ## 반환값
/// `(수락된 요청, 새로 만든 관계 행)`
pub async fn accept_friend_request(
    pool: &SqlitePool,
    request: &FriendRequest,
) -> Result<(FriendRequest, Option<Friendship>), AppError> {
    let mut tx = pool.begin().await?;

    let updated = sqlx::query(
        r#"
        UPDATE friend_requests
        SET status = 'accepted', updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
        WHERE id = ? AND status = 'pending'
        "#,
    )
    .bind(&request.id)
    .execute(&mut *tx)
    .await?;
    if updated.rows_affected() == 0 {
        return Err(AppError::Conflict(
            "This friend request was already handled".to_string(),
        ));
    }

    let existing = friendships_between(&mut *tx, &request.sender_id, &request.recipient_id).await?;
    let created = if existing.is_empty() {
        let id = uuid::Uuid::now_v7().to_string();
        sqlx::query("INSERT INTO friendships (id, user_id, friend_id) VALUES (?, ?, ?)")
            .bind(&id)
            .bind(&request.sender_id)
            .bind(&request.recipient_id)
            .execute(&mut *tx)
            .await?;
        friendships_between(&mut *tx, &request.sender_id, &request.recipient_id)
            .await?
            .into_iter()
            .next()
    } else {
        None
    };

    tx.commit().await?;

    let accepted = get_friend_request(pool, &request.id)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok((accepted, created))
}

/// 두 사람 사이에 남은 대기 중 요청을 지웁니다 (수락 후 정리용).
pub async fn delete_pending_between(
    pool: &SqlitePool,
    a: &str,
    b: &str,
) -> Result<Vec<FriendRequest>, AppError> {
    let pending: Vec<FriendRequest> = requests_between(pool, a, b)
        .await?
        .into_iter()
        .filter(|r| r.status == FriendRequestStatus::Pending)
        .collect();

    for request in &pending {
        sqlx::query("DELETE FROM friend_requests WHERE id = ?")
            .bind(&request.id)
            .execute(pool)
            .await?;
    }
    Ok(pending)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{memory_pool, seed_user};

    #[tokio::test]
    async fn are_friends_checks_both_orientations() {
        let pool = memory_pool().await;
        seed_user(&pool, "u1", "ana@example.com").await;
        seed_user(&pool, "u2", "ben@example.com").await;
        seed_user(&pool, "u3", "cho@example.com").await;

        sqlx::query("INSERT INTO friendships (id, user_id, friend_id) VALUES ('f1', 'u2', 'u1')")
            .execute(&pool)
            .await
            .unwrap();

        assert!(are_friends(&pool, "u1", "u2").await.unwrap());
        assert!(are_friends(&pool, "u2", "u1").await.unwrap());
        assert!(!are_friends(&pool, "u1", "u3").await.unwrap());
        assert!(!are_friends(&pool, "u1", "u1").await.unwrap());

        let friends = list_friends(&pool, "u1").await.unwrap();
        assert_eq!(friends.len(), 1);
        assert_eq!(friends[0].email, "ben@example.com");
    }

    #[tokio::test]
    async fn accepting_twice_creates_one_friendship() {
        let pool = memory_pool().await;
        seed_user(&pool, "u1", "ana@example.com").await;
        seed_user(&pool, "u2", "ben@example.com").await;

        let request = insert_friend_request(&pool, "u1", "u2").await.unwrap();
        let (accepted, created) = accept_friend_request(&pool, &request).await.unwrap();
        assert_eq!(accepted.status, FriendRequestStatus::Accepted);
        assert!(created.is_some());

        assert!(matches!(
            accept_friend_request(&pool, &request).await,
            Err(AppError::Conflict(_))
        ));
        assert_eq!(friendships_between(&pool, "u2", "u1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn cleanup_only_removes_pending_requests() {
        let pool = memory_pool().await;
        seed_user(&pool, "u1", "ana@example.com").await;
        seed_user(&pool, "u2", "ben@example.com").await;

        let declined = insert_friend_request(&pool, "u1", "u2").await.unwrap();
        set_request_status(&pool, &declined.id, FriendRequestStatus::Declined)
            .await
            .unwrap();
        insert_friend_request(&pool, "u2", "u1").await.unwrap();

        let removed = delete_pending_between(&pool, "u1", "u2").await.unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(requests_between(&pool, "u1", "u2").await.unwrap().len(), 1);
        assert!(set_request_status(&pool, &declined.id, FriendRequestStatus::Accepted)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn only_one_pending_request_per_direction() {
        let pool = memory_pool().await;
        seed_user(&pool, "u1", "ana@example.com").await;
        seed_user(&pool, "u2", "ben@example.com").await;

        let first = insert_friend_request(&pool, "u1", "u2").await.unwrap();
        let err = insert_friend_request(&pool, "u1", "u2").await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Conflict);

        // 처리된 요청은 새 요청을 막지 않습니다.
        set_request_status(&pool, &first.id, FriendRequestStatus::Declined)
            .await
            .unwrap();
        assert!(insert_friend_request(&pool, "u1", "u2").await.is_ok());
    }
}
