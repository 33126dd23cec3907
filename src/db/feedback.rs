//! # 피드백 보드 쿼리 모듈
//!
//! ## 테이블 구조
//! - `feedback`: 피드백 글 (vote_count는 비정규화 카운터)
//! - `votes`: (feedback_id, user_id) 복합 기본키. 행이 있으면 투표한 상태
//!
//! 투표 토글은 한 트랜잭션 안에서 votes 행을 넣거나 지우고,
//! `vote_count`를 `COUNT(*)`로 다시 계산합니다. 카운터가 행 수와 어긋날 수 없습니다.

use crate::error::AppError;
use crate::models::*;
use sqlx::SqlitePool;

/// 보는 사람 기준 목록. 작성자 이름과 내 투표 여부를 함께 가져옵니다.
pub async fn list_feedback(pool: &SqlitePool, viewer_id: &str) -> Result<Vec<FeedbackView>, AppError> {
    let rows = sqlx::query_as::<_, FeedbackViewRow>(
        r#"
        SELECT f.id, f.user_id, f.content, f.vote_count, f.created_at, f.updated_at,
               COALESCE(u.display_name, u.email) AS author_name,
               EXISTS (
                   SELECT 1 FROM votes v WHERE v.feedback_id = f.id AND v.user_id = ?
               ) AS has_voted
        FROM feedback f
        LEFT JOIN users u ON u.id = f.user_id
        ORDER BY f.vote_count DESC, f.created_at DESC
        "#,
    )
    .bind(viewer_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(FeedbackView::from).collect())
}

pub async fn get_feedback(pool: &SqlitePool, id: &str) -> Result<Option<Feedback>, AppError> {
    let feedback = sqlx::query_as::<_, Feedback>(
        "SELECT id, user_id, content, vote_count, created_at, updated_at FROM feedback WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(feedback)
}

pub async fn insert_feedback(pool: &SqlitePool, user_id: &str, content: &str) -> Result<Feedback, AppError> {
    let id = uuid::Uuid::now_v7().to_string();

    sqlx::query("INSERT INTO feedback (id, user_id, content) VALUES (?, ?, ?)")
        .bind(&id)
        .bind(user_id)
        .bind(content)
        .execute(pool)
        .await?;

    get_feedback(pool, &id)
        .await?
        .ok_or(AppError::Internal("Failed to retrieve created feedback".to_string()))
}

pub async fn delete_feedback(pool: &SqlitePool, id: &str) -> Result<bool, AppError> {
    let result = sqlx::query("DELETE FROM feedback WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// 투표를 토글합니다.
///
/// ## 반환값
/// `(갱신된 피드백, 넣거나 지운 투표 행, 토글 후 투표 여부)`
pub async fn toggle_vote(
    pool: &SqlitePool,
    feedback_id: &str,
    user_id: &str,
) -> Result<(Feedback, Vote, bool), AppError> {
    let mut tx = pool.begin().await?;

    let exists: Option<(String,)> = sqlx::query_as("SELECT id FROM feedback WHERE id = ?")
        .bind(feedback_id)
        .fetch_optional(&mut *tx)
        .await?;
    if exists.is_none() {
        return Err(AppError::NotFound);
    }

    let existing = sqlx::query_as::<_, Vote>(
        "SELECT feedback_id, user_id, created_at FROM votes WHERE feedback_id = ? AND user_id = ?",
    )
    .bind(feedback_id)
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await?;

    let (vote, voted) = match existing {
        Some(vote) => {
            sqlx::query("DELETE FROM votes WHERE feedback_id = ? AND user_id = ?")
                .bind(feedback_id)
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
            (vote, false)
        }
        None => {
            sqlx::query("INSERT INTO votes (feedback_id, user_id) VALUES (?, ?)")
                .bind(feedback_id)
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
            let vote = sqlx::query_as::<_, Vote>(
                "SELECT feedback_id, user_id, created_at FROM votes WHERE feedback_id = ? AND user_id = ?",
            )
            .bind(feedback_id)
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;
            (vote, true)
        }
    };

    sqlx::query(
        r#"
        UPDATE feedback
        SET vote_count = (SELECT COUNT(*) FROM votes WHERE feedback_id = ?),
            updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
        WHERE id = ?
        "#,
    )
    .bind(feedback_id)
    .bind(feedback_id)
    .execute(&mut *tx)
    .await?;

    let feedback = sqlx::query_as::<_, Feedback>(
        "SELECT id, user_id, content, vote_count, created_at, updated_at FROM feedback WHERE id = ?",
    )
    .bind(feedback_id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok((feedback, vote, voted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{memory_pool, seed_user};

    #[tokio::test]
    async fn vote_count_always_matches_vote_rows() {
        let pool = memory_pool().await;
        seed_user(&pool, "u1", "ana@example.com").await;
        seed_user(&pool, "u2", "ben@example.com").await;
        let item = insert_feedback(&pool, "u1", "Dark mode please").await.unwrap();

        let (after, _, voted) = toggle_vote(&pool, &item.id, "u1").await.unwrap();
        assert!(voted);
        assert_eq!(after.vote_count, 1);

        let (after, _, _) = toggle_vote(&pool, &item.id, "u2").await.unwrap();
        assert_eq!(after.vote_count, 2);

        let (after, vote, voted) = toggle_vote(&pool, &item.id, "u1").await.unwrap();
        assert!(!voted);
        assert_eq!(vote.user_id, "u1");
        assert_eq!(after.vote_count, 1);

        let views = list_feedback(&pool, "u2").await.unwrap();
        assert_eq!(views.len(), 1);
        assert!(views[0].has_voted);
        assert_eq!(views[0].author_name.as_deref(), Some("ana@example.com"));
        assert!(!list_feedback(&pool, "u1").await.unwrap()[0].has_voted);
    }

    #[tokio::test]
    async fn voting_on_missing_feedback_is_not_found() {
        let pool = memory_pool().await;
        seed_user(&pool, "u1", "ana@example.com").await;
        assert!(matches!(
            toggle_vote(&pool, "missing", "u1").await,
            Err(AppError::NotFound)
        ));
    }
}
