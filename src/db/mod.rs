//! # 데이터베이스 접근 계층 (Data Access Layer)
//!
//! 데이터베이스와 직접 상호작용하는 함수들을 모아둔 모듈입니다.
//! 라우트 핸들러(routes/)와 서비스(services/)에서 이 모듈의 함수를 호출합니다.
//!
//! 각 하위 모듈:
//! - `pages`: 페이지 CRUD와 자동 저장용 본문 갱신
//! - `feedback`: 피드백 보드와 투표 토글(트랜잭션)
//! - `friends`: 친구 관계(대칭 조회)와 친구 요청
//! - `users`: 사용자 인증 관련 쿼리

pub mod feedback;
pub mod friends;
pub mod pages;
pub mod users;

// 하위 모듈의 모든 공개 함수를 재공개(re-export)하여
// `crate::db::get_page`처럼 바로 접근할 수 있게 합니다.
// `users`는 이름이 겹치기 쉬워 `db::users::find_by_id`처럼 경로로 부릅니다.
pub use feedback::*;
pub use friends::*;
pub use pages::*;
