//! # 변경 피드(change feed) 이벤트 모델
//!
//! 저장소의 INSERT/UPDATE/DELETE 알림 한 건을 표현합니다.
//! `new`/`old`는 해당 테이블 행의 JSON입니다.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Pages,
    Feedback,
    Votes,
    Friendships,
    FriendRequests,
}

impl Table {
    /// URL 경로 조각(`/realtime/{table}`)에서 테이블을 찾습니다.
    pub fn from_path(name: &str) -> Option<Self> {
        match name {
            "pages" => Some(Table::Pages),
            "feedback" => Some(Table::Feedback),
            "votes" => Some(Table::Votes),
            "friendships" => Some(Table::Friendships),
            "friend_requests" => Some(Table::FriendRequests),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Insert,
    Update,
    Delete,
}

/// 구독할 이벤트 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventMask {
    pub insert: bool,
    pub update: bool,
    pub delete: bool,
}

impl EventMask {
    pub const ALL: EventMask = EventMask {
        insert: true,
        update: true,
        delete: true,
    };

    pub fn only(event_type: EventType) -> Self {
        EventMask {
            insert: event_type == EventType::Insert,
            update: event_type == EventType::Update,
            delete: event_type == EventType::Delete,
        }
    }

    pub fn matches(&self, event_type: EventType) -> bool {
        match event_type {
            EventType::Insert => self.insert,
            EventType::Update => self.update,
            EventType::Delete => self.delete,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: Table,
    #[serde(rename = "eventType")]
    pub event_type: EventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old: Option<Value>,
}

impl ChangeEvent {
    pub fn insert<T: Serialize>(table: Table, row: &T) -> Self {
        Self {
            table,
            event_type: EventType::Insert,
            new: serde_json::to_value(row).ok(),
            old: None,
        }
    }

    pub fn update<T: Serialize>(table: Table, row: &T) -> Self {
        Self {
            table,
            event_type: EventType::Update,
            new: serde_json::to_value(row).ok(),
            old: None,
        }
    }

    pub fn delete<T: Serialize>(table: Table, row: &T) -> Self {
        Self {
            table,
            event_type: EventType::Delete,
            new: None,
            old: serde_json::to_value(row).ok(),
        }
    }

    /// `new` 행을 타입으로 읽습니다. 없거나 모양이 다르면 None.
    pub fn new_row<T: DeserializeOwned>(&self) -> Option<T> {
        self.new.clone().and_then(|v| serde_json::from_value(v).ok())
    }

    pub fn old_row<T: DeserializeOwned>(&self) -> Option<T> {
        self.old.clone().and_then(|v| serde_json::from_value(v).ok())
    }
}
