//! # 편집기 세션 API 요청/응답 본문

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::document::Document;

#[derive(Debug, Deserialize)]
pub struct OpenEditorRequest {
    pub page_id: String,
}

/// `open` 응답. 클라이언트는 렌더링을 마친 뒤 같은 `epoch`로 `ack`를 보내야 합니다.
#[derive(Debug, Serialize)]
pub struct OpenEditorResponse {
    pub page_id: String,
    pub epoch: u64,
    pub title: String,
    pub content_json: Document,
}

#[derive(Debug, Deserialize)]
pub struct AckRequest {
    pub page_id: String,
    pub epoch: u64,
}

/// 로컬 편집 한 건. `content_json`은 엄격하게 검증됩니다.
#[derive(Debug, Deserialize)]
pub struct EditRequest {
    pub page_id: String,
    pub epoch: u64,
    pub title: Option<String>,
    pub content_json: Value,
}
