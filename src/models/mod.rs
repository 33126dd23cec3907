//! # 데이터 모델 모듈
//!
//! 애플리케이션에서 사용하는 데이터 구조체(struct)들을 정의합니다.
//! - `document`: 페이지 리치 텍스트 트리 (Document / Block / Inline / Mark)
//! - `page`: 페이지 행과 공개 범위
//! - `feedback`: 피드백 보드와 투표
//! - `friend`: 친구 관계와 친구 요청
//! - `realtime`: 변경 피드 이벤트
//! - `editor`: 편집기 세션 API 본문
//! - `user`: 사용자와 인증 요청/응답

pub mod document;
pub mod editor;
pub mod feedback;
pub mod friend;
pub mod page;
pub mod realtime;
pub mod user;

pub use document::*;
pub use editor::*;
pub use feedback::*;
pub use friend::*;
pub use page::*;
pub use realtime::*;
pub use user::*;
