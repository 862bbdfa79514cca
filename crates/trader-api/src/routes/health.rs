//! 헬스 체크 endpoint.
//!
//! 초기화가 끝났으면 200, 아니면 503을 반환합니다.
//! 캐시 또는 제공자가 비정상이면 200이지만 상태는 "degraded"입니다.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::state::AppState;

/// 헬스 체크 응답 구조체.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// 전체 서비스 상태 ("healthy" | "degraded" | "unhealthy")
    pub status: String,

    pub version: String,

    pub uptime_secs: i64,

    /// 현재 시간 (ISO 8601)
    pub timestamp: String,

    pub initialized: bool,

    pub components: ComponentHealth,
}

/// 개별 컴포넌트 상태.
#[derive(Debug, Serialize, Deserialize)]
pub struct ComponentHealth {
    /// L2 캐시 저장소 상태
    pub cache: ComponentStatus,

    /// 제공자별 상태
    pub providers: Vec<ProviderStatus>,
}

/// 컴포넌트 상태.
#[derive(Debug, Serialize, Deserialize)]
pub struct ComponentStatus {
    /// 상태 ("up" | "down" | "disabled")
    pub status: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ComponentStatus {
    pub fn up_with_info(message: impl Into<String>) -> Self {
        Self {
            status: "up".to_string(),
            message: Some(message.into()),
        }
    }

    pub fn down(message: impl Into<String>) -> Self {
        Self {
            status: "down".to_string(),
            message: Some(message.into()),
        }
    }

    pub fn disabled() -> Self {
        Self {
            status: "disabled".to_string(),
            message: None,
        }
    }
}

/// 제공자 상태 요약.
#[derive(Debug, Serialize, Deserialize)]
pub struct ProviderStatus {
    pub name: String,
    /// "up" | "cooldown"
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_remaining_secs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// GET /health
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.manager.health().await;

    let cache = if !health.cache_enabled {
        ComponentStatus::disabled()
    } else if health.cache_healthy {
        ComponentStatus::up_with_info(health.cache_backend.clone())
    } else {
        ComponentStatus::down(format!("{} unreachable", health.cache_backend))
    };

    let providers = health
        .providers
        .into_iter()
        .map(|p| ProviderStatus {
            name: p.name,
            status: if p.available { "up" } else { "cooldown" }.to_string(),
            cooldown_remaining_secs: p.cooldown_remaining_secs,
            last_error: p.last_error,
        })
        .collect();

    let initialized = state.is_initialized();
    let (status, code) = match (initialized, health.healthy) {
        (false, _) => ("unhealthy", StatusCode::SERVICE_UNAVAILABLE),
        (true, true) => ("healthy", StatusCode::OK),
        (true, false) => ("degraded", StatusCode::OK),
    };

    let response = HealthResponse {
        status: status.to_string(),
        version: state.version.clone(),
        uptime_secs: state.uptime_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        initialized,
        components: ComponentHealth { cache, providers },
    };

    (code, Json(response))
}

pub fn health_router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health_check))
}
