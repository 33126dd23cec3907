//! # Scribly 웹 서버 진입점
//!
//! 이 파일이 수행하는 작업:
//! 1. 환경변수(.env) 로딩
//! 2. 로깅(tracing) 초기화
//! 3. SQLite 데이터베이스 연결 풀 생성
//! 4. 데이터베이스 마이그레이션 실행
//! 5. 변경 피드, 자동 저장 코디네이터, 편집기 세션 허브 생성
//! 6. API 라우터 설정
//! 7. HTTP 서버 시작

use std::path::Path;
use std::sync::Arc;

use anyhow::Result; // anyhow::Result: 어떤 에러 타입이든 담을 수 있는 범용 Result 타입
use axum::{
    routing::{delete, get, patch, post, put}, // HTTP 메서드별 라우팅 함수들
    Router,
};
use scribly::{
    config::Config,
    routes::{self, AppState},
    services::{
        autosave::{AutosaveCoordinator, SqlitePageStore},
        editor::EditorHub,
        realtime::ChangeFeed,
    },
};
use sqlx::sqlite::SqlitePoolOptions;
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1단계: 환경변수 로딩 ──
    // .env 파일이 없어도 에러 없이 넘어갑니다.
    dotenvy::dotenv().ok();

    // ── 2단계: 로깅(tracing) 초기화 ──
    // RUST_LOG가 없으면 scribly, tower_http, axum 모듈을 debug 레벨로 설정
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scribly=debug,tower_http=debug,axum=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // ── 3단계: 설정 로딩 ──
    let config = Config::from_env()?;
    tracing::info!("Starting Scribly server on {}:{}", config.host, config.port);

    // ── 4단계: SQLite 연결 풀 생성 ──
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;

    // ── 5단계: 데이터베이스 마이그레이션 실행 ──
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;

    // ── 6단계: 변경 피드 / 자동 저장 / 편집기 세션 ──
    // 자동 저장은 변경 피드에 pages UPDATE를 발행하므로 같은 피드를 공유합니다.
    let feed = ChangeFeed::default();
    let autosave_config = config.autosave();
    tracing::info!(
        "Autosave debounce {:?}, retry backoff {:?}",
        autosave_config.debounce,
        autosave_config.retry_backoff
    );
    let autosave = AutosaveCoordinator::new(
        SqlitePageStore::new(pool.clone(), feed.clone()),
        autosave_config,
    );

    let state = AppState {
        pool: pool.clone(),
        jwt_secret: config.jwt_secret.clone(),
        feed,
        editors: Arc::new(EditorHub::new(autosave)),
    };

    // ── 7단계: API 라우터 설정 ──
    // axum 0.8부터 경로 파라미터는 `{id}` 문법을 씁니다.
    let auth_routes = Router::new()
        .route("/auth/register", post(routes::auth::register))
        .route("/auth/login", post(routes::auth::login))
        .route("/auth/refresh", post(routes::auth::refresh))
        .route("/auth/logout", post(routes::auth::logout))
        .route("/auth/me", get(routes::auth::me));

    let editor_routes = Router::new()
        .route("/editor/open", post(routes::editor::open))
        .route("/editor/ack", post(routes::editor::acknowledge))
        .route("/editor/content", put(routes::editor::edit))
        .route("/editor/status", get(routes::editor::status))
        .route("/editor/close", post(routes::editor::close));

    let friend_routes = Router::new()
        .route("/friends", get(routes::friends::list_friends))
        .route("/friends/{user_id}", delete(routes::friends::remove_friend))
        .route("/friends/{user_id}/pages", get(routes::friends::list_friend_pages))
        .route(
            "/friends/requests",
            get(routes::friends::list_requests).post(routes::friends::send_request),
        )
        .route("/friends/requests/{id}/accept", post(routes::friends::accept_request))
        .route("/friends/requests/{id}/decline", post(routes::friends::decline_request));

    let api_routes = Router::new()
        .merge(auth_routes)
        .merge(editor_routes)
        .merge(friend_routes)
        // 페이지
        .route("/pages", get(routes::pages::list_pages).post(routes::pages::create_page))
        .route(
            "/pages/{id}",
            get(routes::pages::get_page).delete(routes::pages::delete_page),
        )
        .route("/pages/{id}/visibility", patch(routes::pages::update_visibility))
        // 피드백 보드
        .route(
            "/feedback",
            get(routes::feedback::list_feedback).post(routes::feedback::create_feedback),
        )
        .route("/feedback/{id}", delete(routes::feedback::delete_feedback))
        .route("/feedback/{id}/vote", post(routes::feedback::toggle_vote))
        // 변경 피드 (SSE)
        .route("/realtime/{table}", get(routes::realtime::stream_table))
        .route("/health", get(routes::health::health_check))
        .with_state(state);

    // ── 8단계: CORS 미들웨어 설정 ──
    // 개발 환경에서는 Any(모두 허용). 프로덕션에서는 특정 도메인만 허용해야 합니다.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // ── 9단계: 프론트엔드 정적 파일 서빙 설정 ──
    // SPA이므로 찾을 수 없는 경로는 index.html로 돌려보냅니다.
    let frontend_dist = Path::new(&config.frontend_dist);
    let app = if frontend_dist.exists() {
        tracing::info!("Serving frontend static files from {}", config.frontend_dist);

        let serve_dir = ServeDir::new(frontend_dist)
            .not_found_service(ServeFile::new(frontend_dist.join("index.html")));

        Router::new()
            .nest("/api/v1", api_routes)
            .fallback_service(serve_dir)
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    } else {
        tracing::warn!("Frontend dist directory not found, serving API only");

        Router::new()
            .nest("/api/v1", api_routes)
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    };

    // ── 10단계: 서버 시작 ──
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
