use serde::{Deserialize, Serialize};

use crate::models::document::Document;
use crate::services::codec;

/// 페이지 공개 범위. `friends`면 친구도 읽을 수 있습니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Visibility {
    Private,
    Friends,
}

/// `pages` 테이블 한 행. `content_json`은 TEXT로 저장된 문서 JSON입니다.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PageRow {
    pub id: String,
    pub user_id: String,
    pub section_id: String,
    pub parent_page_id: Option<String>,
    pub title: String,
    pub content: String,
    pub content_json: String,
    pub visibility: Visibility,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub id: String,
    pub user_id: String,
    pub section_id: String,
    pub parent_page_id: Option<String>,
    pub title: String,
    /// `content_json`의 평문 투영. 저장할 때마다 다시 계산됩니다.
    pub content: String,
    pub content_json: Document,
    pub visibility: Visibility,
    pub created_at: String,
    pub updated_at: String,
}

impl From<PageRow> for Page {
    fn from(row: PageRow) -> Self {
        Self {
            content_json: codec::parse(&row.content_json),
            id: row.id,
            user_id: row.user_id,
            section_id: row.section_id,
            parent_page_id: row.parent_page_id,
            title: row.title,
            content: row.content,
            visibility: row.visibility,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// 목록용 요약 (본문 트리 제외)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PageSummary {
    pub id: String,
    pub user_id: String,
    pub section_id: String,
    pub title: String,
    pub visibility: Visibility,
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreatePageRequest {
    pub section_id: String,
    pub parent_page_id: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateVisibilityRequest {
    pub visibility: Visibility,
}
