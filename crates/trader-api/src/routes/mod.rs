//! API 라우트.
//!
//! # 라우트 구조
//!
//! - `/klines`, `/batch_klines` - 봉 조회
//! - `/health` - 헬스 체크
//! - `/stats` - 서비스 통계
//! - `/sync/*`, `/backups/*` - 동기화 작업과 백업

pub mod health;
pub mod klines;
pub mod stats;
pub mod sync;

pub use health::{health_router, ComponentHealth, ComponentStatus, HealthResponse};
pub use klines::{klines_router, BatchKlinesResponse, KlinesResponse};
pub use stats::{stats_router, StatsResponse};
pub use sync::sync_router;

use axum::Router;
use std::sync::Arc;

use crate::state::AppState;

/// 전체 API 라우터.
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .merge(klines_router())
        .merge(health_router())
        .merge(stats_router())
        .merge(sync_router())
}
