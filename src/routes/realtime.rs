//! # 변경 피드 SSE 엔드포인트
//!
//! - `GET /api/v1/realtime/{table}` → 해당 테이블의 INSERT/UPDATE/DELETE를
//!   Server-Sent Events로 흘려보냅니다. 이벤트 이름은 `INSERT`/`UPDATE`/`DELETE`,
//!   데이터는 `{ table, eventType, new?, old? }` JSON입니다.
//!
//! 피드백 보드(feedback, votes)는 모두에게 보이고, 나머지 테이블은
//! 본인과 관련된 행만 보냅니다.

use std::convert::Infallible;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use tokio_stream::{
    wrappers::{errors::BroadcastStreamRecvError, BroadcastStream},
    Stream, StreamExt,
};

use crate::{
    error::AppError,
    middleware::auth::AuthUser,
    models::{ChangeEvent, EventType, Table},
    routes::AppState,
};

pub async fn stream_table(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(table): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let table = Table::from_path(&table)
        .ok_or_else(|| AppError::BadRequest(format!("Unknown table: {}", table)))?;
    let user_id = auth_user.user_id;
    tracing::debug!(user_id = %user_id, ?table, "realtime subscriber connected");

    let stream = BroadcastStream::new(state.feed.raw_receiver()).filter_map(move |item| match item {
        Ok(event) if event.table == table && visible_to(&event, &user_id) => Event::default()
            .event(event_name(event.event_type))
            .json_data(&event)
            .ok()
            .map(Ok),
        Ok(_) => None,
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            tracing::warn!(user_id = %user_id, skipped, "realtime stream lagged");
            None
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn event_name(event_type: EventType) -> &'static str {
    match event_type {
        EventType::Insert => "INSERT",
        EventType::Update => "UPDATE",
        EventType::Delete => "DELETE",
    }
}

/// 이 사용자에게 이벤트를 보내도 되는지
fn visible_to(event: &ChangeEvent, user_id: &str) -> bool {
    let row = event.new.as_ref().or(event.old.as_ref());
    let field = |key: &str| row.and_then(|r| r.get(key)).and_then(|v| v.as_str());

    match event.table {
        Table::Feedback | Table::Votes => true,
        Table::Pages => field("user_id") == Some(user_id),
        Table::Friendships => field("user_id") == Some(user_id) || field("friend_id") == Some(user_id),
        Table::FriendRequests => {
            field("sender_id") == Some(user_id) || field("recipient_id") == Some(user_id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn private_tables_only_reach_involved_users() {
        let page = ChangeEvent::update(Table::Pages, &json!({ "id": "p1", "user_id": "u1" }));
        assert!(visible_to(&page, "u1"));
        assert!(!visible_to(&page, "u2"));

        let request = ChangeEvent::insert(
            Table::FriendRequests,
            &json!({ "id": "r1", "sender_id": "u1", "recipient_id": "u2" }),
        );
        assert!(visible_to(&request, "u2"));
        assert!(!visible_to(&request, "u3"));

        let unfriended = ChangeEvent::delete(
            Table::Friendships,
            &json!({ "id": "f1", "user_id": "u2", "friend_id": "u1" }),
        );
        assert!(visible_to(&unfriended, "u1"));
    }

    #[test]
    fn board_events_are_public() {
        let vote = ChangeEvent::insert(Table::Votes, &json!({ "feedback_id": "f1", "user_id": "u9" }));
        assert!(visible_to(&vote, "u1"));
        assert_eq!(event_name(vote.event_type), "INSERT");
    }
}
