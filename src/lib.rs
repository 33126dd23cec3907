//! # Scribly 백엔드 코어
//!
//! 노트 페이지의 문서 상태와 동기화 계층입니다.
//! 바이너리(`main.rs`)는 이 크레이트를 가져다 HTTP 서버로 묶기만 합니다.
//!
//! - `models`: 문서 트리와 테이블 행 타입
//! - `services`: 코덱, 편집기 세션, 자동 저장, 변경 피드, 낙관적 보정, 접근 게이트
//! - `db`: SQLite 쿼리
//! - `routes` / `middleware`: axum 핸들러와 인증 추출기

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
