//! 서비스 통계 endpoint.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;

use trader_data::{CacheStats, StatsSnapshot};
use trader_exchange::HealthSnapshot;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub success: bool,
    /// 요청/캐시/제공자별 카운터
    pub stats: StatsSnapshot,
    pub cache: CacheStats,
    /// 제공자 쿨다운 상태
    pub providers: Vec<HealthSnapshot>,
    pub timestamp: String,
}

/// GET /stats
pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let manager = &state.manager;
    Json(StatsResponse {
        success: true,
        stats: manager.stats(),
        cache: manager.cache().stats(),
        providers: manager.health_registry().snapshots(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

pub fn stats_router() -> Router<Arc<AppState>> {
    Router::new().route("/stats", get(get_stats))
}
