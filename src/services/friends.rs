//! # 친구 요청 흐름
//!
//! 요청 검증은 `access::check_friend_request`가 하고, 여기서는 DB 쓰기와
//! 변경 피드 발행, 수락 후 정리를 묶습니다.

use sqlx::SqlitePool;

use crate::{
    db,
    error::{AppError, ErrorKind},
    models::{ChangeEvent, FriendRequest, FriendRequestStatus, Friendship, Table},
    services::{
        access::{check_friend_request, FriendRequestContext, FriendRequestRejection},
        realtime::ChangeFeed,
    },
};

/// 이메일로 친구 요청을 보냅니다.
pub async fn send_request(
    pool: &SqlitePool,
    feed: &ChangeFeed,
    sender_id: &str,
    recipient_email: &str,
) -> Result<FriendRequest, AppError> {
    let email = recipient_email.trim();
    if email.is_empty() {
        return Err(AppError::BadRequest("Email is required".to_string()));
    }
    let recipient = db::users::find_by_email(pool, email)
        .await?
        .ok_or(AppError::NotFound)?;

    let already_friends = db::are_friends(pool, sender_id, &recipient.id).await?;
    let existing = db::requests_between(pool, sender_id, &recipient.id).await?;
    let ctx = FriendRequestContext::from_requests(sender_id, &recipient.id, already_friends, &existing);

    if let Err(reason) = check_friend_request(&ctx) {
        tracing::debug!(sender_id, recipient_id = %recipient.id, ?reason, "friend request rejected");
        return Err(reason.into());
    }

    let request = insert_pending(pool, sender_id, &recipient.id).await?;
    feed.publish(ChangeEvent::insert(Table::FriendRequests, &request));
    Ok(request)
}

// 검사와 INSERT 사이에 같은 요청이 먼저 들어왔으면 부분 유니크 인덱스가 막습니다.
async fn insert_pending(
    pool: &SqlitePool,
    sender_id: &str,
    recipient_id: &str,
) -> Result<FriendRequest, AppError> {
    match db::insert_friend_request(pool, sender_id, recipient_id).await {
        Err(e) if e.kind() == ErrorKind::Conflict => {
            tracing::debug!(sender_id, recipient_id, "concurrent duplicate friend request");
            Err(FriendRequestRejection::AlreadyRequested.into())
        }
        result => result,
    }
}

/// 받은 요청을 수락합니다. 관계 행 하나를 만들고, 두 사람 사이에 남은
/// 대기 중 요청은 최선을 다해 지웁니다. 정리 실패는 수락을 실패시키지 않습니다.
pub async fn accept_request(
    pool: &SqlitePool,
    feed: &ChangeFeed,
    user_id: &str,
    request_id: &str,
) -> Result<(FriendRequest, Option<Friendship>), AppError> {
    let request = pending_for_recipient(pool, user_id, request_id).await?;
    let (accepted, created) = db::accept_friend_request(pool, &request).await?;

    feed.publish(ChangeEvent::update(Table::FriendRequests, &accepted));
    if let Some(friendship) = &created {
        feed.publish(ChangeEvent::insert(Table::Friendships, friendship));
    }

    match db::delete_pending_between(pool, &request.sender_id, &request.recipient_id).await {
        Ok(removed) => {
            for stale in &removed {
                feed.publish(ChangeEvent::delete(Table::FriendRequests, stale));
            }
        }
        Err(e) => {
            tracing::warn!(
                request_id,
                "failed to clean up duplicate friend requests: {}",
                e
            );
        }
    }

    tracing::info!(request_id, user_id, "friend request accepted");
    Ok((accepted, created))
}

pub async fn decline_request(
    pool: &SqlitePool,
    feed: &ChangeFeed,
    user_id: &str,
    request_id: &str,
) -> Result<FriendRequest, AppError> {
    pending_for_recipient(pool, user_id, request_id).await?;
    let declined = db::set_request_status(pool, request_id, FriendRequestStatus::Declined)
        .await?
        .ok_or_else(|| AppError::Conflict("This friend request was already handled".to_string()))?;

    feed.publish(ChangeEvent::update(Table::FriendRequests, &declined));
    Ok(declined)
}

/// 친구 관계를 끊습니다. 어느 방향으로 저장됐든 모두 지웁니다.
pub async fn remove_friend(
    pool: &SqlitePool,
    feed: &ChangeFeed,
    user_id: &str,
    friend_id: &str,
) -> Result<(), AppError> {
    let removed = db::delete_friendship(pool, user_id, friend_id).await?;
    if removed.is_empty() {
        return Err(AppError::NotFound);
    }
    for row in &removed {
        feed.publish(ChangeEvent::delete(Table::Friendships, row));
    }
    Ok(())
}

async fn pending_for_recipient(
    pool: &SqlitePool,
    user_id: &str,
    request_id: &str,
) -> Result<FriendRequest, AppError> {
    let request = db::get_friend_request(pool, request_id)
        .await?
        .ok_or(AppError::NotFound)?;
    if request.recipient_id != user_id {
        return Err(AppError::Forbidden(
            "Only the recipient can respond to this request".to_string(),
        ));
    }
    if request.status != FriendRequestStatus::Pending {
        return Err(AppError::Conflict(
            "This friend request was already handled".to_string(),
        ));
    }
    Ok(request)
}
