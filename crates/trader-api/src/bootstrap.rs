//! 설정에서 전체 구성 요소를 조립합니다.
//!
//! ```text
//! AppConfig
//!   ├─ cache    → BarStore(file|redis) → TieredCache
//!   ├─ health   → HealthRegistry
//!   ├─ quality  → QualityEvaluator
//!   ├─ providers→ ProviderAdapter × N (enabled만)
//!   ├─ manager  → DataSourceManager
//!   └─ sync/backup → BackupManager → SyncEngine
//! ```
//!
//! 전역 상태는 없습니다. 모든 구성 요소는 여기서 만들어 [`AppState`]로 전달합니다.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use trader_core::AppConfig;
use trader_data::{
    build_store, BackupManager, DataError, DataSourceManager, QualityEvaluator, Result,
    SyncEngine, TieredCache,
};
use trader_exchange::{build_provider, HealthPolicy, HealthRegistry};

use crate::state::AppState;

/// 설정을 검증하고 상태를 조립합니다. 네트워크 연결은 하지 않습니다(Redis 제외).
pub async fn build_state(config: &AppConfig) -> Result<AppState> {
    config
        .validate()
        .map_err(|e| DataError::ConfigError(e.to_string()))?;

    let store = build_store(&config.cache).await?;
    let cache = Arc::new(TieredCache::new(config.cache.clone(), store));

    let health = Arc::new(HealthRegistry::new(HealthPolicy::from(&config.health)));
    let evaluator = QualityEvaluator::new(config.quality.clone())?;

    let mut builder = DataSourceManager::builder(config.manager.clone())
        .cache(cache.clone())
        .evaluator(evaluator)
        .health(health);

    for provider in config.providers.iter().filter(|p| p.enabled) {
        let adapter = build_provider(provider)?;
        info!(
            provider = %provider.name,
            kind = ?provider.kind,
            priority = provider.priority,
            "Provider registered"
        );
        builder = builder.provider(adapter, provider.priority);
    }
    if config.providers.iter().all(|p| !p.enabled) {
        warn!("No enabled providers configured; only cached data can be served");
    }

    let manager = builder.build()?;
    let backups = Arc::new(BackupManager::open(config.backup.clone(), cache).await?);
    let sync = SyncEngine::new(config.sync.clone(), &config.backup, manager.clone(), backups);

    Ok(AppState::new(manager, sync))
}

/// 제공자 연결, 캐시 정리, 동기화 엔진을 시작하고 상태를 초기화 완료로 표시합니다.
pub async fn start_background(
    state: &AppState,
    config: &AppConfig,
    token: CancellationToken,
) -> Vec<JoinHandle<()>> {
    state.manager.connect_all().await;

    let mut handles = Vec::new();
    let cache = state.manager.cache();
    if cache.is_enabled() {
        let interval = Duration::from_secs(config.cache.sweep_interval_secs.max(1));
        handles.push(cache.spawn_sweeper(interval, token.clone()));
    }
    handles.extend(state.sync.start(token));

    state.mark_initialized();
    info!(background_tasks = handles.len(), "Background services started");
    handles
}
