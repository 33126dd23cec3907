//! # 피드백 보드 모델
//!
//! - `Feedback`: `feedback` 테이블 한 행. 변경 피드 이벤트의 페이로드이기도 합니다.
//! - `Vote`: `(feedback_id, user_id)` 쌍. 행이 있으면 "투표함".
//! - `FeedbackView`: 보는 사람 기준의 목록 항목 (작성자 이름, 내 투표 여부 포함)

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Feedback {
    pub id: String,
    pub user_id: String,
    pub content: String,
    /// votes 행 수와 항상 같은 비정규화 카운터. 서버 값만 신뢰합니다.
    pub vote_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Vote {
    pub feedback_id: String,
    pub user_id: String,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FeedbackViewRow {
    pub id: String,
    pub user_id: String,
    pub content: String,
    pub vote_count: i64,
    pub created_at: String,
    pub updated_at: String,
    pub author_name: Option<String>,
    // SQLite에는 BOOLEAN이 없어 EXISTS 결과가 0/1 정수로 옵니다.
    pub has_voted: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackView {
    pub id: String,
    pub user_id: String,
    pub content: String,
    pub vote_count: i64,
    pub created_at: String,
    pub updated_at: String,
    pub author_name: Option<String>,
    pub has_voted: bool,
}

impl From<FeedbackViewRow> for FeedbackView {
    fn from(row: FeedbackViewRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            content: row.content,
            vote_count: row.vote_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
            author_name: row.author_name,
            has_voted: row.has_voted != 0,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateFeedbackRequest {
    pub content: String,
}

/// 투표 토글 결과
#[derive(Debug, Clone, Serialize)]
pub struct VoteOutcome {
    pub feedback: Feedback,
    pub voted: bool,
}
