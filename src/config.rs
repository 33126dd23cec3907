//! # 애플리케이션 설정(Configuration) 모듈
//!
//! 환경변수에서 서버 설정값을 읽어오는 모듈입니다.
//! `.env` 파일이나 시스템 환경변수에서 값을 가져옵니다.
//!
//! 설정 항목:
//! - `DATABASE_URL`: SQLite 데이터베이스 경로
//! - `JWT_SECRET`: JWT 토큰 서명에 사용할 비밀키
//! - `HOST`, `PORT`: 서버 바인딩 주소와 포트
//! - `AUTOSAVE_DEBOUNCE_MS`: 자동 저장 디바운스 창 (기본 100ms)
//! - `AUTOSAVE_RETRY_BACKOFF_MS`: 일시적 오류 재시도 전 대기 시간 (기본 500ms)
//! - `FRONTEND_DIST`: 빌드된 프론트엔드 정적 파일 경로

use std::env;
use std::time::Duration;

use crate::services::autosave::AutosaveConfig;

/// 애플리케이션 전체 설정을 담는 구조체
///
/// 서버 시작 시 환경변수에서 한 번 읽어온 후,
/// 애플리케이션 전체에서 공유됩니다.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite 데이터베이스 URL (예: "sqlite:data/scribly.db")
    pub database_url: String,
    /// JWT 토큰 서명/검증에 사용하는 비밀키
    pub jwt_secret: String,
    /// 서버가 바인딩할 호스트 주소 (기본값: "0.0.0.0")
    pub host: String,
    /// 서버 포트 번호 (기본값: 3000)
    pub port: u16,
    /// 자동 저장 디바운스 창(밀리초)
    pub autosave_debounce_ms: u64,
    /// 일시적 오류 재시도 전 대기 시간(밀리초)
    pub autosave_retry_backoff_ms: u64,
    /// 프론트엔드 빌드 결과물 디렉토리
    pub frontend_dist: String,
}

impl Config {
    /// 환경변수에서 설정값을 읽어 Config 인스턴스를 생성합니다.
    ///
    /// # 에러
    /// `DATABASE_URL`과 `JWT_SECRET`은 필수이며, 없으면 에러가 발생합니다.
    /// 나머지 설정은 기본값이 있어 환경변수가 없어도 동작합니다.
    pub fn from_env() -> Result<Self, env::VarError> {
        Ok(Self {
            database_url: env::var("DATABASE_URL")?, // 필수
            jwt_secret: env::var("JWT_SECRET")?,     // 필수
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parse_or("PORT", 3000),
            autosave_debounce_ms: parse_or("AUTOSAVE_DEBOUNCE_MS", 100),
            autosave_retry_backoff_ms: parse_or("AUTOSAVE_RETRY_BACKOFF_MS", 500),
            frontend_dist: env::var("FRONTEND_DIST")
                .unwrap_or_else(|_| "../frontend/dist".to_string()),
        })
    }

    /// 자동 저장 코디네이터 설정을 만듭니다. 재시도 횟수는 1회로 고정입니다.
    pub fn autosave(&self) -> AutosaveConfig {
        AutosaveConfig {
            debounce: Duration::from_millis(self.autosave_debounce_ms),
            retry_backoff: Duration::from_millis(self.autosave_retry_backoff_ms),
            max_retries: 1,
            ..AutosaveConfig::default()
        }
    }
}

// 숫자형 환경변수: 없거나 파싱에 실패하면 기본값을 사용합니다.
fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}
