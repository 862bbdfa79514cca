//! 모든 핸들러에서 공유되는 애플리케이션 상태.
//!
//! 부트스트랩에서 한 번 만들어지고 `Arc`로 핸들러에 주입됩니다.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use trader_data::{BackupManager, DataSourceManager, SyncEngine};

/// 애플리케이션 공유 상태.
#[derive(Clone)]
pub struct AppState {
    /// 봉 조회 진입점
    pub manager: DataSourceManager,

    /// 동기화 엔진
    pub sync: SyncEngine,

    /// 백업 관리자 (동기화 엔진과 공유)
    pub backups: Arc<BackupManager>,

    /// 제공자 연결과 백그라운드 작업 시작이 끝났는지 여부
    initialized: Arc<AtomicBool>,

    pub started_at: DateTime<Utc>,

    pub version: String,
}

impl AppState {
    pub fn new(manager: DataSourceManager, sync: SyncEngine) -> Self {
        let backups = sync.backups().clone();
        Self {
            manager,
            sync,
            backups,
            initialized: Arc::new(AtomicBool::new(false)),
            started_at: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn mark_initialized(&self) {
        self.initialized.store(true, Ordering::Release);
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn uptime_secs(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}
