//! 봉(OHLCV) 데이터 수집, 캐싱, 백업.
//!
//! 이 crate는 다음을 제공합니다:
//! - 여러 제공자를 우선순위대로 시도하는 데이터 소스 관리자 (요청 병합, 품질 게이트)
//! - 봉 시계열 품질 평가
//! - L1(LRU) + L2(파일/Redis) 2계층 캐시
//! - 계층 간 동기화 엔진과 체크섬 검증 백업

pub mod cache;
pub mod error;
pub mod manager;
pub mod quality;
pub mod stats;
pub mod storage;
pub mod sync;

pub use cache::{CacheEntry, CacheKey, CacheStats, CacheWriteStatus, TieredCache};
pub use error::{DataError, Result};
pub use manager::{
    BarQuery, BarsResponse, CacheStatus, DataSource, DataSourceManager, DataSourceManagerBuilder,
    ManagerHealth, QualitySummary,
};
pub use quality::{EvaluationContext, QualityEvaluator, QualityLevel, QualityReport};
pub use stats::{ServiceStats, StatsSnapshot};
pub use storage::{build_store, BarStore, FileStore, RedisStore};
pub use sync::{
    BackupManager, BackupManifest, BackupType, DataTier, RestoreReport, SyncEngine, SyncTask,
    SystemStatus, TaskState,
};
