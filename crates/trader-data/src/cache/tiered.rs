//! 2계층 봉 캐시.
//!
//! # 동작 흐름
//!
//! ```text
//! get(key)                          put(entry)
//!    │                                 │
//!    ▼                                 ▼
//! ┌────────┐ hit                 ┌──────────────┐ 미달
//! │   L1   │────► 반환            │ 품질 하한 검사 │────► Skipped
//! └───┬────┘                     └──────┬───────┘
//!     │ miss / 만료                      │
//! ┌───▼────┐ hit                 ┌──────▼───────┐ 실패
//! │   L2   │────► L1 승격 후 반환  │ 키별 잠금 + L2 │────► Failed (L1 유지)
//! └───┬────┘                     └──────┬───────┘
//!     │ miss / 만료 / 오류                │
//!     ▼                                 ▼
//!   None                           L1 쓰기 → Written
//! ```
//!
//! 만료된 항목은 미스로 취급하되 읽기 경로에서 삭제하지 않습니다.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use trader_core::{CacheConfig, Timeframe};

use super::lru::LruCache;
use super::{CacheEntry, CacheKey};
use crate::error::{DataError, Result};
use crate::storage::BarStore;

/// 쓰기 결과.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheWriteStatus {
    /// L2, L1 모두 기록
    Written,
    /// 품질 미달 또는 캐시 비활성
    Skipped,
    /// L2 기록 실패 (L1 미기록)
    Failed,
}

/// 캐시 통계.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub l1_hits: u64,
    pub l2_hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub write_failures: u64,
    pub skipped_writes: u64,
    pub l1_evictions: u64,
    pub l1_len: usize,
    pub l1_capacity: usize,
    pub hit_rate: f64,
}

#[derive(Default)]
struct Counters {
    l1_hits: AtomicU64,
    l2_hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    write_failures: AtomicU64,
    skipped_writes: AtomicU64,
}

type WriteLockMap = Arc<RwLock<HashMap<String, Arc<RwLock<()>>>>>;

/// L1 LRU + L2 저장소 캐시.
pub struct TieredCache {
    config: CacheConfig,
    l1: Mutex<LruCache<CacheKey, CacheEntry>>,
    l2: Arc<dyn BarStore>,
    l2_timeout: Duration,
    /// 같은 키의 L2 쓰기를 직렬화
    write_locks: WriteLockMap,
    counters: Counters,
}

impl TieredCache {
    pub fn new(config: CacheConfig, l2: Arc<dyn BarStore>) -> Self {
        let l1 = LruCache::new(config.l1_capacity);
        let l2_timeout = Duration::from_millis(config.l2_timeout_ms.max(1));
        Self {
            config,
            l1: Mutex::new(l1),
            l2,
            l2_timeout,
            write_locks: Arc::new(RwLock::new(HashMap::new())),
            counters: Counters::default(),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// 타임프레임별 TTL(초).
    pub fn ttl_for(&self, timeframe: Timeframe) -> u64 {
        self.config.ttl_for(timeframe)
    }

    /// L2 저장소.
    pub fn store(&self) -> &Arc<dyn BarStore> {
        &self.l2
    }

    /// 만료되지 않은 항목을 조회합니다.
    pub async fn get(&self, key: &CacheKey, now: DateTime<Utc>) -> Option<CacheEntry> {
        if !self.config.enabled {
            return None;
        }

        if let Some(entry) = self.l1_get(key) {
            if !entry.is_expired(now) {
                self.counters.l1_hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry);
            }
        }

        match self.l2_get(key).await {
            Ok(Some(entry)) if !entry.is_expired(now) => {
                self.counters.l2_hits.fetch_add(1, Ordering::Relaxed);
                self.l1_put(entry.clone());
                debug!(key = %key, "L2 hit promoted to L1");
                Some(entry)
            }
            Ok(_) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(e) => {
                warn!(key = %key, error = %e, "L2 read failed, treating as miss");
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// 항목을 기록합니다. L2가 먼저이며 L2 실패 시 L1은 건드리지 않습니다.
    #[instrument(skip(self, entry), fields(key = %entry.key, score = entry.quality_score))]
    pub async fn put(&self, entry: CacheEntry) -> CacheWriteStatus {
        if !self.config.enabled || entry.quality_score < self.config.min_quality_for_cache {
            self.counters.skipped_writes.fetch_add(1, Ordering::Relaxed);
            debug!("Cache write skipped");
            return CacheWriteStatus::Skipped;
        }

        let lock_key = entry.key.to_string();
        let lock = self.get_or_create_lock(&lock_key).await;
        let status = {
            let _guard = lock.write().await;
            match self.l2_put(&entry).await {
                Ok(()) => {
                    self.l1_put(entry);
                    self.counters.writes.fetch_add(1, Ordering::Relaxed);
                    CacheWriteStatus::Written
                }
                Err(e) => {
                    self.counters.write_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(error = %e, backend = self.l2.name(), "L2 write failed, entry not cached");
                    CacheWriteStatus::Failed
                }
            }
        };
        drop(lock);
        self.release_lock(&lock_key).await;
        status
    }

    /// 양쪽 계층에서 키를 제거합니다.
    pub async fn invalidate(&self, key: &CacheKey) -> Result<bool> {
        let in_l1 = self
            .l1
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key)
            .is_some();
        let in_l2 = tokio::time::timeout(self.l2_timeout, self.l2.delete(key)).await??;
        Ok(in_l1 || in_l2)
    }

    /// L2에 저장된 모든 항목 (만료 포함).
    pub async fn entries(&self) -> Result<Vec<CacheEntry>> {
        self.l2.entries().await
    }

    /// L2 유예 기간이 지난 항목을 정리합니다.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<usize> {
        self.l2.sweep_expired(now).await
    }

    pub async fn health_check(&self) -> bool {
        tokio::time::timeout(self.l2_timeout, self.l2.health_check())
            .await
            .unwrap_or(false)
    }

    pub fn stats(&self) -> CacheStats {
        let (l1_len, l1_capacity, l1_evictions) = {
            let l1 = self.l1.lock().unwrap_or_else(|e| e.into_inner());
            (l1.len(), l1.capacity(), l1.stats().evictions)
        };
        let l1_hits = self.counters.l1_hits.load(Ordering::Relaxed);
        let l2_hits = self.counters.l2_hits.load(Ordering::Relaxed);
        let misses = self.counters.misses.load(Ordering::Relaxed);
        let total = l1_hits + l2_hits + misses;
        let hit_rate = if total > 0 {
            (l1_hits + l2_hits) as f64 / total as f64
        } else {
            0.0
        };

        CacheStats {
            l1_hits,
            l2_hits,
            misses,
            writes: self.counters.writes.load(Ordering::Relaxed),
            write_failures: self.counters.write_failures.load(Ordering::Relaxed),
            skipped_writes: self.counters.skipped_writes.load(Ordering::Relaxed),
            l1_evictions,
            l1_len,
            l1_capacity,
            hit_rate,
        }
    }

    /// 주기적으로 L2를 정리하는 태스크를 시작합니다.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // 첫 tick은 즉시 완료
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        match cache.sweep(Utc::now()).await {
                            Ok(0) => debug!("Cache sweep found nothing to reclaim"),
                            Ok(removed) => info!(removed, backend = cache.l2.name(), "Cache sweep reclaimed entries"),
                            Err(e) => warn!(error = %e, "Cache sweep failed"),
                        }
                    }
                }
            }
            debug!("Cache sweeper stopped");
        })
    }

    // =========================================================================
    // 내부
    // =========================================================================

    fn l1_get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.l1
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    fn l1_put(&self, entry: CacheEntry) {
        let mut l1 = self.l1.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((evicted, _)) = l1.put(entry.key.clone(), entry) {
            debug!(key = %evicted, "L1 entry evicted");
        }
    }

    async fn l2_get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        tokio::time::timeout(self.l2_timeout, self.l2.get(key))
            .await
            .map_err(|_| DataError::Timeout(format!("L2 read of {}", key)))?
    }

    async fn l2_put(&self, entry: &CacheEntry) -> Result<()> {
        tokio::time::timeout(self.l2_timeout, self.l2.put(entry))
            .await
            .map_err(|_| DataError::Timeout(format!("L2 write of {}", entry.key)))?
    }

    /// 동시성 제어를 위한 Lock 획득 또는 생성.
    async fn get_or_create_lock(&self, key: &str) -> Arc<RwLock<()>> {
        let locks = self.write_locks.read().await;
        if let Some(lock) = locks.get(key) {
            return lock.clone();
        }
        drop(locks);

        let mut locks = self.write_locks.write().await;
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }

    /// 다른 쓰기가 잡고 있지 않은 Lock을 맵에서 제거합니다.
    async fn release_lock(&self, key: &str) {
        let mut locks = self.write_locks.write().await;
        if locks.get(key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(key);
        }
    }
}
