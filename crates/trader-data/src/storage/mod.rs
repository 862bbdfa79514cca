//! L2 캐시 저장소.
//!
//! - [`FileStore`]: 디렉터리에 키마다 JSON 문서 하나 (재시작 후 유지)
//! - [`RedisStore`]: Redis 문자열 값, `SET EX`로 물리 만료

pub mod file;
pub mod redis;

pub use self::file::FileStore;
pub use self::redis::RedisStore;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use trader_core::{CacheConfig, L2Backend};

use crate::cache::{CacheEntry, CacheKey};
use crate::error::Result;

/// L2 저장소 인터페이스.
///
/// 만료된 항목도 `get`에서 그대로 반환합니다. 만료 판정은 호출자가 합니다.
#[async_trait]
pub trait BarStore: Send + Sync {
    /// 저장소 이름 (로그/헬스 체크용).
    fn name(&self) -> &str;

    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>>;

    async fn put(&self, entry: &CacheEntry) -> Result<()>;

    async fn delete(&self, key: &CacheKey) -> Result<bool>;

    /// 저장된 모든 항목. 읽을 수 없는 항목은 건너뜁니다.
    async fn entries(&self) -> Result<Vec<CacheEntry>>;

    /// 유예 기간까지 지난 항목을 삭제하고 삭제 수를 반환합니다.
    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize>;

    async fn health_check(&self) -> bool;
}

/// 설정에 맞는 L2 저장소를 생성합니다.
pub async fn build_store(config: &CacheConfig) -> Result<Arc<dyn BarStore>> {
    let grace = chrono::Duration::seconds(config.l2_grace_secs as i64);
    let store: Arc<dyn BarStore> = match config.l2_backend {
        L2Backend::File => Arc::new(FileStore::open(&config.l2_dir, grace).await?),
        L2Backend::Redis => Arc::new(RedisStore::connect(&config.redis_url, grace).await?),
    };
    Ok(store)
}
