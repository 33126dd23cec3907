//! # 라우트 핸들러 모듈
//!
//! HTTP 요청을 처리하는 핸들러 함수들을 모아둔 모듈입니다.
//! Axum에서 핸들러는 HTTP 요청을 받아 응답을 반환하는 async 함수입니다.
//!
//! 각 하위 모듈:
//! - `auth`: 인증 관련 (회원가입, 로그인, 토큰 갱신, 로그아웃)
//! - `pages`: 페이지 CRUD와 접근 게이트를 거친 조회
//! - `editor`: 편집기 세션 (열기/렌더 확인/편집/상태/닫기)
//! - `feedback`: 피드백 보드와 투표
//! - `friends`: 친구 요청과 친구 목록
//! - `realtime`: 변경 피드 SSE 스트림
//! - `health`: 서버 상태 확인 (헬스체크)

pub mod auth;
pub mod editor;
pub mod feedback;
pub mod friends;
pub mod health;
pub mod pages;
pub mod realtime;

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::services::{editor::EditorHub, realtime::ChangeFeed};

/// 애플리케이션 공유 상태
///
/// 모든 요청 핸들러가 `State(state): State<AppState>`로 접근합니다.
/// 필드는 모두 내부적으로 Arc를 쓰므로 clone해도 같은 자원을 가리킵니다.
#[derive(Clone)]
pub struct AppState {
    /// SQLite 연결 풀
    pub pool: SqlitePool,
    /// JWT 토큰 서명용 비밀키
    pub jwt_secret: String,
    /// 커밋된 쓰기의 변경 이벤트 허브
    pub feed: ChangeFeed,
    /// 사용자별 편집기 세션과 자동 저장 코디네이터
    pub editors: Arc<EditorHub>,
}
