//! 봉 조회 HTTP 서버.
//!
//! # 모듈 구성
//!
//! - [`bootstrap`]: 설정에서 구성 요소 조립, 백그라운드 작업 시작
//! - [`state`]: 애플리케이션 공유 상태 (AppState)
//! - [`routes`]: REST API 엔드포인트
//! - [`error`]: 에러 응답 형식과 상태 코드 매핑

pub mod bootstrap;
pub mod error;
pub mod routes;
pub mod state;

pub use bootstrap::{build_state, start_background};
pub use error::{ApiErrorResponse, ApiResult};
pub use routes::create_api_router;
pub use state::AppState;

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// 미들웨어까지 붙인 전체 라우터.
pub fn create_router(state: Arc<AppState>, request_timeout: Duration) -> Router {
    create_api_router()
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(CorsLayer::permissive())
}
