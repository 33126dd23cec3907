//! # 낙관적 변경 + 실시간 보정
//!
//! 피드백 보드를 보는 쪽의 로컬 상태입니다. 상태를 바꾸는 곳은 두 군데뿐입니다.
//!
//! 1. `apply_optimistic`: 서버 응답 전에 화면을 먼저 바꾸고 이전 값을 표(ticket)에 기록
//! 2. `on_remote_event`: 변경 피드 이벤트로 서버 값을 병합
//!
//! 모든 보정은 항목 ID로 찾습니다(배열 위치 사용 안 함). 같은 이벤트를 두 번 적용해도
//! 한 번 적용한 것과 결과가 같습니다. `vote_count`는 서버가 보낸 값만 `Confirmed`이고,
//! 로컬에서 더한 값은 `Pending`으로 구분됩니다.
//!
//! 이벤트는 순서가 뒤바뀌거나 중복으로 올 수 있습니다.
//! - 삭제된 ID는 기억해 두고, 그 뒤에 오는 INSERT/UPDATE는 버립니다.
//! - `updated_at`이 지금 가진 값보다 오래된 행은 병합하지 않습니다.

use std::collections::HashSet;
use std::future::Future;

use serde::Serialize;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{ChangeEvent, EventType, Feedback, FeedbackView, Table, Vote, VoteOutcome},
};

const PLACEHOLDER_PREFIX: &str = "temp-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteCount {
    /// 서버가 확인한 값
    Confirmed(i64),
    /// 확인된 값에 아직 반영되지 않은 로컬 증감을 더한 상태
    Pending { confirmed: i64, delta: i64 },
}

impl VoteCount {
    /// 화면 표시용 근사값
    pub fn display(&self) -> i64 {
        match *self {
            VoteCount::Confirmed(count) => count,
            VoteCount::Pending { confirmed, delta } => (confirmed + delta).max(0),
        }
    }

    pub fn confirmed(&self) -> i64 {
        match *self {
            VoteCount::Confirmed(count) => count,
            VoteCount::Pending { confirmed, .. } => confirmed,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, VoteCount::Pending { .. })
    }

    fn shifted(self, by: i64) -> Self {
        let (confirmed, delta) = match self {
            VoteCount::Confirmed(count) => (count, by),
            VoteCount::Pending { confirmed, delta } => (confirmed, delta + by),
        };
        if delta == 0 {
            VoteCount::Confirmed(confirmed)
        } else {
            VoteCount::Pending { confirmed, delta }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoardItem {
    pub id: String,
    pub user_id: String,
    pub content: String,
    pub author_name: Option<String>,
    pub has_voted: bool,
    pub vote_count: VoteCount,
    pub created_at: String,
    /// 마지막으로 병합한 서버 행의 `updated_at`. 서버 확인 전 임시 항목은 빈 문자열.
    pub updated_at: String,
}

impl BoardItem {
    /// 서버 확인 전 임시 항목인지
    pub fn is_placeholder(&self) -> bool {
        self.id.starts_with(PLACEHOLDER_PREFIX)
    }
}

impl From<FeedbackView> for BoardItem {
    fn from(view: FeedbackView) -> Self {
        Self {
            id: view.id,
            user_id: view.user_id,
            content: view.content,
            author_name: view.author_name,
            has_voted: view.has_voted,
            vote_count: VoteCount::Confirmed(view.vote_count),
            created_at: view.created_at,
            updated_at: view.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptimisticDelta {
    ToggleVote,
    AddFeedback { content: String },
}

#[derive(Debug, Clone, PartialEq)]
enum Prior {
    Vote { has_voted: bool, vote_count: VoteCount },
    Absent,
}

/// 낙관적 변경 한 건. 실패하면 이 기록으로 되돌립니다.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimisticTicket {
    pub entity_id: String,
    pub delta: OptimisticDelta,
    prior: Prior,
}

/// 실제 변경을 보내는 경계
pub trait FeedbackApi {
    fn toggle_vote(
        &self,
        feedback_id: &str,
    ) -> impl Future<Output = Result<VoteOutcome, AppError>> + Send;

    fn create_feedback(&self, content: &str) -> impl Future<Output = Result<Feedback, AppError>> + Send;
}

pub struct FeedbackBoard {
    viewer_id: String,
    viewer_name: Option<String>,
    items: Vec<BoardItem>,
    /// 삭제 이벤트를 받은 ID
    deleted: HashSet<String>,
}

impl FeedbackBoard {
    pub fn new(viewer_id: &str, viewer_name: Option<String>) -> Self {
        Self {
            viewer_id: viewer_id.to_string(),
            viewer_name,
            items: Vec::new(),
            deleted: HashSet::new(),
        }
    }

    pub fn placeholder_id() -> String {
        format!("{}{}", PLACEHOLDER_PREFIX, Uuid::new_v4())
    }

    /// 서버 목록으로 상태를 통째로 바꿉니다.
    pub fn load(&mut self, rows: Vec<FeedbackView>) {
        self.items = rows
            .into_iter()
            .filter(|row| !self.deleted.contains(&row.id))
            .map(BoardItem::from)
            .collect();
    }

    pub fn items(&self) -> &[BoardItem] {
        &self.items
    }

    pub fn get(&self, id: &str) -> Option<&BoardItem> {
        self.items.iter().find(|item| item.id == id)
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut BoardItem> {
        self.items.iter_mut().find(|item| item.id == id)
    }

    pub fn apply_optimistic(
        &mut self,
        entity_id: &str,
        delta: OptimisticDelta,
    ) -> Result<OptimisticTicket, AppError> {
        let prior = match &delta {
            OptimisticDelta::ToggleVote => {
                let item = self.get_mut(entity_id).ok_or(AppError::NotFound)?;
                let prior = Prior::Vote {
                    has_voted: item.has_voted,
                    vote_count: item.vote_count,
                };
                item.has_voted = !item.has_voted;
                let by = if item.has_voted { 1 } else { -1 };
                item.vote_count = item.vote_count.shifted(by);
                prior
            }
            OptimisticDelta::AddFeedback { content } => {
                if self.get(entity_id).is_some() {
                    return Err(AppError::Conflict(format!("{} already exists", entity_id)));
                }
                self.items.insert(
                    0,
                    BoardItem {
                        id: entity_id.to_string(),
                        user_id: self.viewer_id.clone(),
                        content: content.clone(),
                        author_name: self.viewer_name.clone(),
                        has_voted: false,
                        vote_count: VoteCount::Confirmed(0),
                        created_at: chrono::Utc::now().to_rfc3339(),
                        updated_at: String::new(),
                    },
                );
                Prior::Absent
            }
        };

        Ok(OptimisticTicket {
            entity_id: entity_id.to_string(),
            delta,
            prior,
        })
    }

    /// 실제 변경을 보냅니다. 실패하면 되돌리고 에러를 그대로 돌려줍니다.
    /// 성공하면 아무것도 하지 않습니다. 최종 값은 변경 피드가 가져옵니다.
    pub async fn submit(
        &mut self,
        ticket: OptimisticTicket,
        api: &impl FeedbackApi,
    ) -> Result<(), AppError> {
        let result = match &ticket.delta {
            OptimisticDelta::ToggleVote => api.toggle_vote(&ticket.entity_id).await.map(|_| ()),
            OptimisticDelta::AddFeedback { content } => {
                api.create_feedback(content).await.map(|_| ())
            }
        };

        if let Err(err) = result {
            tracing::warn!(
                entity_id = %ticket.entity_id,
                operation = ?ticket.delta,
                "optimistic mutation rejected, rolling back: {}",
                err
            );
            self.rollback(&ticket);
            return Err(err);
        }
        Ok(())
    }

    fn rollback(&mut self, ticket: &OptimisticTicket) {
        match &ticket.prior {
            Prior::Vote {
                has_voted,
                vote_count,
            } => {
                if let Some(item) = self.get_mut(&ticket.entity_id) {
                    item.has_voted = *has_voted;
                    // 그 사이 서버 값이 도착했다면 그 값을 유지합니다.
                    if item.vote_count.is_pending() {
                        item.vote_count = *vote_count;
                    }
                }
            }
            Prior::Absent => {
                self.items
                    .retain(|item| !(item.id == ticket.entity_id && item.is_placeholder()));
            }
        }
    }

    /// 변경 피드 이벤트를 병합합니다. 상태가 바뀌었으면 true.
    pub fn on_remote_event(&mut self, event: &ChangeEvent) -> bool {
        match event.table {
            Table::Feedback => self.on_feedback_event(event),
            Table::Votes => self.on_vote_event(event),
            _ => false,
        }
    }

    fn on_feedback_event(&mut self, event: &ChangeEvent) -> bool {
        match event.event_type {
            EventType::Insert | EventType::Update => {
                let Some(row) = event.new_row::<Feedback>() else {
                    tracing::debug!("feedback event without a readable row");
                    return false;
                };
                if self.deleted.contains(&row.id) {
                    tracing::debug!(feedback_id = %row.id, "ignored event for deleted feedback");
                    return false;
                }
                if self.get(&row.id).is_some() {
                    return self.merge(row);
                }
                if event.event_type == EventType::Update {
                    return false;
                }
                self.insert_confirmed(row);
                true
            }
            EventType::Delete => {
                let Some(id) = deleted_id(event, "id") else {
                    return false;
                };
                let before = self.items.len();
                self.items.retain(|item| item.id != id);
                self.deleted.insert(id);
                self.items.len() != before
            }
        }
    }

    fn on_vote_event(&mut self, event: &ChangeEvent) -> bool {
        let (vote, voted) = match event.event_type {
            EventType::Insert => (event.new_row::<Vote>(), true),
            EventType::Delete => (event.old_row::<Vote>(), false),
            EventType::Update => return false,
        };
        let Some(vote) = vote else {
            return false;
        };
        if vote.user_id != self.viewer_id {
            return false;
        }
        match self.get_mut(&vote.feedback_id) {
            Some(item) if item.has_voted != voted => {
                item.has_voted = voted;
                true
            }
            _ => false,
        }
    }

    /// 서버 값(내용, vote_count)만 덮어쓰고 작성자 이름과 내 투표 여부는 유지합니다.
    /// 지금 가진 행보다 오래된 행은 무시합니다.
    fn merge(&mut self, row: Feedback) -> bool {
        let Some(item) = self.get_mut(&row.id) else {
            return false;
        };
        // 타임스탬프는 모두 같은 ISO-8601(UTC, 밀리초) 형식이라 문자열 비교로 충분합니다.
        if row.updated_at < item.updated_at {
            tracing::debug!(feedback_id = %row.id, "ignored out-of-order feedback update");
            return false;
        }
        let next = VoteCount::Confirmed(row.vote_count);
        let changed = item.vote_count != next || item.content != row.content;
        item.vote_count = next;
        item.content = row.content;
        item.updated_at = row.updated_at;
        changed
    }

    fn insert_confirmed(&mut self, row: Feedback) {
        let placeholder = self.items.iter_mut().find(|item| {
            item.is_placeholder() && item.content == row.content && item.user_id == row.user_id
        });
        match placeholder {
            Some(item) => {
                item.id = row.id;
                item.vote_count = VoteCount::Confirmed(row.vote_count);
                item.created_at = row.created_at;
                item.updated_at = row.updated_at;
            }
            None => {
                let author_name = if row.user_id == self.viewer_id {
                    self.viewer_name.clone()
                } else {
                    None
                };
                self.items.insert(
                    0,
                    BoardItem {
                        id: row.id,
                        user_id: row.user_id,
                        content: row.content,
                        author_name,
                        has_voted: false,
                        vote_count: VoteCount::Confirmed(row.vote_count),
                        created_at: row.created_at,
                        updated_at: row.updated_at,
                    },
                );
            }
        }
    }
}

// DELETE 이벤트의 old 행에는 키만 들어 있을 수 있습니다.
fn deleted_id(event: &ChangeEvent, key: &str) -> Option<String> {
    event
        .old
        .as_ref()
        .and_then(|old| old.get(key))
        .and_then(|id| id.as_str())
        .map(str::to_string)
}
