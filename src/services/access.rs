//! # 친구/공개 범위 접근 게이트
//!
//! "사용자 U가 페이지 P를 읽을 수 있는가"를 판단하는 순수 술어입니다.
//!
//! ```text
//! can_access(viewer, page) = page.owner == viewer
//!                         || (page.visibility == friends && are_friends(viewer, page.owner))
//! ```
//!
//! 친구 관계 행은 `(a, b)` / `(b, a)` 어느 방향으로든 저장될 수 있으므로
//! 대칭 확인은 `FriendGraph::are_friends` 한 곳에서만 합니다.

use sqlx::SqlitePool;
use thiserror::Error;

use crate::{
    db,
    error::AppError,
    models::{FriendRequest, FriendRequestStatus, Friendship, Page, PageRow, PageSummary, Visibility},
};

/// 친구 관계 조회
pub trait FriendGraph {
    fn are_friends(&self, a: &str, b: &str) -> bool;
}

/// 메모리에 읽어 둔 친구 관계 행 목록
#[derive(Debug, Clone, Default)]
pub struct FriendList {
    rows: Vec<Friendship>,
}

impl FriendList {
    pub fn new(rows: Vec<Friendship>) -> Self {
        Self { rows }
    }

    /// `user`의 친구 ID 목록
    pub fn friends_of<'a>(&'a self, user: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.rows.iter().filter_map(move |row| row.other(user))
    }
}

impl FriendGraph for FriendList {
    fn are_friends(&self, a: &str, b: &str) -> bool {
        if a == b {
            return false;
        }
        self.rows.iter().any(|row| {
            (row.user_id == a && row.friend_id == b) || (row.user_id == b && row.friend_id == a)
        })
    }
}

/// 접근 판단에 필요한 페이지 정보
pub trait SharedResource {
    fn owner_id(&self) -> &str;
    fn visibility(&self) -> Visibility;
}

impl SharedResource for Page {
    fn owner_id(&self) -> &str {
        &self.user_id
    }
    fn visibility(&self) -> Visibility {
        self.visibility
    }
}

impl SharedResource for PageRow {
    fn owner_id(&self) -> &str {
        &self.user_id
    }
    fn visibility(&self) -> Visibility {
        self.visibility
    }
}

impl SharedResource for PageSummary {
    fn owner_id(&self) -> &str {
        &self.user_id
    }
    fn visibility(&self) -> Visibility {
        self.visibility
    }
}

pub fn can_access(viewer_id: &str, page: &impl SharedResource, graph: &impl FriendGraph) -> bool {
    if page.owner_id() == viewer_id {
        return true;
    }
    match page.visibility() {
        Visibility::Private => false,
        Visibility::Friends => graph.are_friends(viewer_id, page.owner_id()),
    }
}

/// 라우트용 읽기 권한 확인. 친구 관계는 필요할 때만 조회합니다.
pub async fn authorize_read(
    pool: &SqlitePool,
    viewer_id: &str,
    page: &impl SharedResource,
) -> Result<(), AppError> {
    let graph = if page.owner_id() != viewer_id && page.visibility() == Visibility::Friends {
        FriendList::new(db::friendships_between(pool, viewer_id, page.owner_id()).await?)
    } else {
        FriendList::default()
    };

    if can_access(viewer_id, page, &graph) {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "You are not authorized to view this page".to_string(),
        ))
    }
}

// ── 친구 요청 검증 ──

/// 친구 요청을 거절하는 이유. 같은 요청을 반복해도 같은 이유가 돌아옵니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FriendRequestRejection {
    #[error("You cannot send a friend request to yourself")]
    SelfRequest,
    #[error("You are already friends with this user")]
    AlreadyFriends,
    #[error("You already sent a friend request to this user")]
    AlreadyRequested,
    #[error("This user already sent you a request")]
    IncomingPending,
}

impl From<FriendRequestRejection> for AppError {
    fn from(reason: FriendRequestRejection) -> Self {
        match reason {
            FriendRequestRejection::SelfRequest => AppError::BadRequest(reason.to_string()),
            _ => AppError::Conflict(reason.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FriendRequestContext {
    pub sender_id: String,
    pub recipient_id: String,
    pub already_friends: bool,
    pub outbound_pending: bool,
    pub inbound_pending: bool,
}

impl FriendRequestContext {
    /// 두 사람 사이의 기존 요청들로 문맥을 만듭니다. 거절된 요청은 무시합니다.
    pub fn from_requests(
        sender_id: &str,
        recipient_id: &str,
        already_friends: bool,
        existing: &[FriendRequest],
    ) -> Self {
        let pending = |from: &str, to: &str| {
            existing.iter().any(|r| {
                r.status == FriendRequestStatus::Pending && r.sender_id == from && r.recipient_id == to
            })
        };
        Self {
            sender_id: sender_id.to_string(),
            recipient_id: recipient_id.to_string(),
            already_friends,
            outbound_pending: pending(sender_id, recipient_id),
            inbound_pending: pending(recipient_id, sender_id),
        }
    }
}

pub fn check_friend_request(ctx: &FriendRequestContext) -> Result<(), FriendRequestRejection> {
    if ctx.sender_id == ctx.recipient_id {
        return Err(FriendRequestRejection::SelfRequest);
    }
    if ctx.already_friends {
        return Err(FriendRequestRejection::AlreadyFriends);
    }
    if ctx.inbound_pending {
        return Err(FriendRequestRejection::IncomingPending);
    }
    if ctx.outbound_pending {
        return Err(FriendRequestRejection::AlreadyRequested);
    }
    Ok(())
}
