//! # 페이지 데이터베이스 쿼리 모듈
//!
//! `pages` 테이블 CRUD와 자동 저장용 본문 갱신 쿼리입니다.
//! `content`(평문)는 `content_json`에서 파생되며 저장할 때마다 다시 계산됩니다.

use crate::error::AppError;
use crate::models::*;
use crate::services::codec;
use sqlx::SqlitePool;

const PAGE_COLUMNS: &str = "id, user_id, section_id, parent_page_id, title, content, content_json, \
                            visibility, created_at, updated_at";

pub async fn get_page(pool: &SqlitePool, id: &str) -> Result<Option<PageRow>, AppError> {
    let page = sqlx::query_as::<_, PageRow>(&format!("SELECT {} FROM pages WHERE id = ?", PAGE_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(page)
}

/// 사용자의 페이지 목록 (최근 수정순)
pub async fn list_pages(pool: &SqlitePool, user_id: &str) -> Result<Vec<PageSummary>, AppError> {
    let pages = sqlx::query_as::<_, PageSummary>(
        r#"
        SELECT id, user_id, section_id, title, visibility, updated_at
        FROM pages
        WHERE user_id = ?
        ORDER BY updated_at DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(pages)
}

/// 친구 공개(`friends`)로 설정된 페이지만 조회합니다.
pub async fn list_friend_visible_pages(
    pool: &SqlitePool,
    owner_id: &str,
) -> Result<Vec<PageSummary>, AppError> {
    let pages = sqlx::query_as::<_, PageSummary>(
        r#"
        SELECT id, user_id, section_id, title, visibility, updated_at
        FROM pages
        WHERE user_id = ? AND visibility = 'friends'
        ORDER BY updated_at DESC
        "#,
    )
    .bind(owner_id)
    .fetch_all(pool)
    .await?;

    Ok(pages)
}

pub async fn create_page(
    pool: &SqlitePool,
    user_id: &str,
    req: &CreatePageRequest,
) -> Result<PageRow, AppError> {
    let id = uuid::Uuid::now_v7().to_string();
    let title = req
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or("Untitled");

    sqlx::query(
        r#"
        INSERT INTO pages (id, user_id, section_id, parent_page_id, title, content_json)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(user_id)
    .bind(&req.section_id)
    .bind(&req.parent_page_id)
    .bind(title)
    .bind(codec::encode_to_string(&Document::empty()))
    .execute(pool)
    .await?;

    get_page(pool, &id)
        .await?
        .ok_or(AppError::Internal("Failed to retrieve created page".to_string()))
}

/// 자동 저장 경로: 제목과 본문을 저장합니다. 소유자만 쓸 수 있습니다.
///
/// 0행이 갱신되면 페이지가 없는 것(NotFound)과 남의 페이지인 것(Forbidden)을 구분합니다.
pub async fn save_page_content(
    pool: &SqlitePool,
    owner_id: &str,
    page_id: &str,
    title: Option<&str>,
    document: &Document,
) -> Result<PageRow, AppError> {
    let result = sqlx::query(
        r#"
        UPDATE pages
        SET title = COALESCE(?, title),
            content = ?,
            content_json = ?,
            updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
        WHERE id = ? AND user_id = ?
        "#,
    )
    .bind(title)
    .bind(document.extract_plain_text())
    .bind(codec::encode_to_string(document))
    .bind(page_id)
    .bind(owner_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return match get_page(pool, page_id).await? {
            Some(_) => Err(AppError::Forbidden(
                "Only the owner can edit this page".to_string(),
            )),
            None => Err(AppError::NotFound),
        };
    }

    get_page(pool, page_id).await?.ok_or(AppError::NotFound)
}

pub async fn update_visibility(
    pool: &SqlitePool,
    owner_id: &str,
    page_id: &str,
    visibility: Visibility,
) -> Result<Option<PageRow>, AppError> {
    let result = sqlx::query(
        r#"
        UPDATE pages
        SET visibility = ?, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
        WHERE id = ? AND user_id = ?
        "#,
    )
    .bind(visibility)
    .bind(page_id)
    .bind(owner_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }
    get_page(pool, page_id).await
}

pub async fn delete_page(pool: &SqlitePool, owner_id: &str, page_id: &str) -> Result<bool, AppError> {
    let result = sqlx::query("DELETE FROM pages WHERE id = ? AND user_id = ?")
        .bind(page_id)
        .bind(owner_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{memory_pool, seed_user};

    fn new_page() -> CreatePageRequest {
        CreatePageRequest {
            section_id: "s1".into(),
            parent_page_id: None,
            title: None,
        }
    }

    #[tokio::test]
    async fn save_updates_plain_text_projection() {
        let pool = memory_pool().await;
        seed_user(&pool, "u1", "ana@example.com").await;
        let page = create_page(&pool, "u1", &new_page()).await.unwrap();
        assert_eq!(page.title, "Untitled");

        let doc = Document::new(vec![Block::paragraph("Hello"), Block::paragraph("World")]);
        let saved = save_page_content(&pool, "u1", &page.id, Some("Biology Notes"), &doc)
            .await
            .unwrap();

        assert_eq!(saved.title, "Biology Notes");
        assert_eq!(saved.content, "Hello\nWorld");
        assert_eq!(Page::from(saved).content_json, doc);
    }

    #[tokio::test]
    async fn save_distinguishes_forbidden_from_missing() {
        let pool = memory_pool().await;
        seed_user(&pool, "u1", "ana@example.com").await;
        seed_user(&pool, "u2", "ben@example.com").await;
        let page = create_page(&pool, "u1", &new_page()).await.unwrap();
        let doc = Document::empty();

        let forbidden = save_page_content(&pool, "u2", &page.id, None, &doc).await;
        assert!(matches!(forbidden, Err(AppError::Forbidden(_))));

        let missing = save_page_content(&pool, "u1", "nope", None, &doc).await;
        assert!(matches!(missing, Err(AppError::NotFound)));
    }

    #[tokio::test]
    async fn friend_visible_listing_skips_private_pages() {
        let pool = memory_pool().await;
        seed_user(&pool, "u1", "ana@example.com").await;
        let shared = create_page(&pool, "u1", &new_page()).await.unwrap();
        create_page(&pool, "u1", &new_page()).await.unwrap();

        update_visibility(&pool, "u1", &shared.id, Visibility::Friends)
            .await
            .unwrap()
            .unwrap();
        assert!(update_visibility(&pool, "u2", &shared.id, Visibility::Private)
            .await
            .unwrap()
            .is_none());

        let visible = list_friend_visible_pages(&pool, "u1").await.unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, shared.id);
        assert_eq!(list_pages(&pool, "u1").await.unwrap().len(), 2);
    }
}
