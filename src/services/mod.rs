//! # 서비스 계층
//!
//! 페이지 문서의 상태와 동기화를 담당하는 핵심 로직입니다.
//! - `codec`: 문서 트리 ↔ JSON 변환
//! - `editor`: 편집기 세션 상태 기계 (페이지 전환 시 내용 섞임 방지)
//! - `autosave`: 페이지별 디바운스 자동 저장과 일시적 오류 재시도
//! - `realtime`: 변경 피드 (broadcast 채널)
//! - `optimistic`: 피드백 보드의 낙관적 변경과 실시간 보정
//! - `board`: 피드백/투표 쓰기 경로
//! - `access`: 친구/공개 범위 접근 게이트
//! - `friends`: 친구 요청 흐름

pub mod access;
pub mod autosave;
pub mod board;
pub mod codec;
pub mod editor;
pub mod friends;
pub mod optimistic;
pub mod realtime;
