//! # 미들웨어 모듈
//!
//! - `auth`: Bearer JWT 인증 추출기(`AuthUser`)와 토큰 발급/검증 도우미

pub mod auth;
