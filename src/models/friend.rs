use serde::{Deserialize, Serialize};

/// 친구 관계 한 행. 대칭 관계지만 `(user_id, friend_id)` 한 방향으로만 저장됩니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Friendship {
    pub id: String,
    pub user_id: String,
    pub friend_id: String,
    pub created_at: String,
}

impl Friendship {
    /// `user`의 상대편 ID. 이 관계에 `user`가 없으면 None.
    pub fn other(&self, user: &str) -> Option<&str> {
        if self.user_id == user {
            Some(&self.friend_id)
        } else if self.friend_id == user {
            Some(&self.user_id)
        } else {
            None
        }
    }
}

/// pending → accepted | declined. 거절된 요청은 새 요청으로 대체될 수 있습니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum FriendRequestStatus {
    Pending,
    Accepted,
    Declined,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct FriendRequest {
    pub id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub status: FriendRequestStatus,
    pub created_at: String,
    pub updated_at: String,
}

/// 요청 목록 항목 (양쪽 이메일 포함)
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct FriendRequestView {
    pub id: String,
    pub sender_id: String,
    pub sender_email: String,
    pub recipient_id: String,
    pub recipient_email: String,
    pub status: FriendRequestStatus,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct FriendSummary {
    pub id: String,
    pub email: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SendFriendRequest {
    pub email: String,
}
