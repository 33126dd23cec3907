//! # 피드백 보드 서비스
//!
//! 라우트와 `DbFeedbackApi`가 함께 쓰는 쓰기 경로입니다. 커밋이 끝난 뒤에
//! 변경 피드로 이벤트를 발행합니다.

use sqlx::SqlitePool;

use crate::{
    db,
    error::AppError,
    models::{ChangeEvent, Feedback, Table, VoteOutcome},
    services::{optimistic::FeedbackApi, realtime::ChangeFeed},
};

const MAX_FEEDBACK_CHARS: usize = 2000;

pub async fn create_feedback(
    pool: &SqlitePool,
    feed: &ChangeFeed,
    user_id: &str,
    content: &str,
) -> Result<Feedback, AppError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(AppError::BadRequest("Feedback cannot be empty".to_string()));
    }
    if content.chars().count() > MAX_FEEDBACK_CHARS {
        return Err(AppError::BadRequest(format!(
            "Feedback must be at most {} characters",
            MAX_FEEDBACK_CHARS
        )));
    }

    let feedback = db::insert_feedback(pool, user_id, content).await?;
    feed.publish(ChangeEvent::insert(Table::Feedback, &feedback));
    tracing::info!(feedback_id = %feedback.id, user_id, "feedback created");
    Ok(feedback)
}

pub async fn toggle_vote(
    pool: &SqlitePool,
    feed: &ChangeFeed,
    user_id: &str,
    feedback_id: &str,
) -> Result<VoteOutcome, AppError> {
    let (feedback, vote, voted) = db::toggle_vote(pool, feedback_id, user_id).await?;

    if voted {
        feed.publish(ChangeEvent::insert(Table::Votes, &vote));
    } else {
        feed.publish(ChangeEvent::delete(Table::Votes, &vote));
    }
    feed.publish(ChangeEvent::update(Table::Feedback, &feedback));

    tracing::debug!(feedback_id, user_id, voted, vote_count = feedback.vote_count, "vote toggled");
    Ok(VoteOutcome { feedback, voted })
}

/// 작성자만 지울 수 있습니다.
pub async fn delete_feedback(
    pool: &SqlitePool,
    feed: &ChangeFeed,
    user_id: &str,
    feedback_id: &str,
) -> Result<(), AppError> {
    let feedback = db::get_feedback(pool, feedback_id)
        .await?
        .ok_or(AppError::NotFound)?;
    if feedback.user_id != user_id {
        return Err(AppError::Forbidden(
            "Only the author can delete this feedback".to_string(),
        ));
    }

    if !db::delete_feedback(pool, feedback_id).await? {
        return Err(AppError::NotFound);
    }
    feed.publish(ChangeEvent::delete(Table::Feedback, &feedback));
    Ok(())
}

/// 서버 쪽 `FeedbackApi`. 한 사용자 이름으로 변경을 보냅니다.
#[derive(Clone)]
pub struct DbFeedbackApi {
    pool: SqlitePool,
    feed: ChangeFeed,
    user_id: String,
}

impl DbFeedbackApi {
    pub fn new(pool: SqlitePool, feed: ChangeFeed, user_id: &str) -> Self {
        Self {
            pool,
            feed,
            user_id: user_id.to_string(),
        }
    }
}

impl FeedbackApi for DbFeedbackApi {
    async fn toggle_vote(&self, feedback_id: &str) -> Result<VoteOutcome, AppError> {
        toggle_vote(&self.pool, &self.feed, &self.user_id, feedback_id).await
    }

    async fn create_feedback(&self, content: &str) -> Result<Feedback, AppError> {
        create_feedback(&self.pool, &self.feed, &self.user_id, content).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{memory_pool, seed_user};
    use crate::models::EventMask;
    use crate::services::optimistic::{FeedbackBoard, OptimisticDelta, VoteCount};

    #[tokio::test]
    async fn optimistic_board_converges_with_server_through_feed() {
        let pool = memory_pool().await;
        seed_user(&pool, "u1", "ana@example.com").await;
        seed_user(&pool, "u2", "ben@example.com").await;
        let feed = ChangeFeed::default();

        let item = create_feedback(&pool, &feed, "u2", "Dark mode please").await.unwrap();
        let mut feedback_events = feed.subscribe(Table::Feedback, EventMask::ALL);
        let mut vote_events = feed.subscribe(Table::Votes, EventMask::ALL);

        let mut board = FeedbackBoard::new("u1", None);
        board.load(db::list_feedback(&pool, "u1").await.unwrap());

        let api = DbFeedbackApi::new(pool.clone(), feed.clone(), "u1");
        let ticket = board.apply_optimistic(&item.id, OptimisticDelta::ToggleVote).unwrap();
        board.submit(ticket, &api).await.unwrap();
        assert!(board.get(&item.id).unwrap().vote_count.is_pending());

        while let Some(event) = vote_events.try_recv() {
            board.on_remote_event(&event);
        }
        while let Some(event) = feedback_events.try_recv() {
            board.on_remote_event(&event);
        }

        let reconciled = board.get(&item.id).unwrap();
        assert_eq!(reconciled.vote_count, VoteCount::Confirmed(1));
        assert!(reconciled.has_voted);
    }

    #[tokio::test]
    async fn only_author_can_delete() {
        let pool = memory_pool().await;
        seed_user(&pool, "u1", "ana@example.com").await;
        seed_user(&pool, "u2", "ben@example.com").await;
        let feed = ChangeFeed::default();
        let mut events = feed.subscribe(Table::Feedback, EventMask::only(crate::models::EventType::Delete));

        let item = create_feedback(&pool, &feed, "u1", "  Export to PDF  ").await.unwrap();
        assert_eq!(item.content, "Export to PDF");

        assert!(matches!(
            delete_feedback(&pool, &feed, "u2", &item.id).await,
            Err(AppError::Forbidden(_))
        ));
        delete_feedback(&pool, &feed, "u1", &item.id).await.unwrap();
        assert!(events.try_recv().is_some());
        assert!(matches!(
            delete_feedback(&pool, &feed, "u1", &item.id).await,
            Err(AppError::NotFound)
        ));
    }

    #[tokio::test]
    async fn blank_feedback_is_rejected() {
        let pool = memory_pool().await;
        let feed = ChangeFeed::default();
        assert!(matches!(
            create_feedback(&pool, &feed, "u1", "   ").await,
            Err(AppError::BadRequest(_))
        ));
    }
}
