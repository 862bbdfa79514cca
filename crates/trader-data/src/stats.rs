//! 데이터 소스 매니저 통계.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;

/// 제공자별 카운터.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ProviderCounters {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub rejections: u64,
}

/// 통계 스냅샷.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub coalesced_waiters: u64,
    pub success_rate: f64,
    pub average_response_ms: f64,
    pub providers: BTreeMap<String, ProviderCounters>,
}

/// 누적 통계.
#[derive(Default)]
pub struct ServiceStats {
    total_requests: AtomicU64,
    successful_requests: AtomicU64,
    failed_requests: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    coalesced_waiters: AtomicU64,
    total_response_micros: AtomicU64,
    providers: Mutex<HashMap<String, ProviderCounters>>,
}

impl ServiceStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// 요청 완료를 기록합니다.
    pub fn record_outcome(&self, success: bool, elapsed: Duration) {
        if success {
            self.successful_requests.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.total_response_micros
            .fetch_add(micros, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_coalesced(&self) {
        self.coalesced_waiters.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_attempt(&self, provider: &str) {
        self.with_provider(provider, |c| c.attempts += 1);
    }

    pub fn record_provider_success(&self, provider: &str) {
        self.with_provider(provider, |c| c.successes += 1);
    }

    pub fn record_provider_failure(&self, provider: &str) {
        self.with_provider(provider, |c| c.failures += 1);
    }

    pub fn record_rejection(&self, provider: &str) {
        self.with_provider(provider, |c| c.rejections += 1);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let total = self.total_requests.load(Ordering::Relaxed);
        let successful = self.successful_requests.load(Ordering::Relaxed);
        let failed = self.failed_requests.load(Ordering::Relaxed);
        let completed = successful + failed;
        let micros = self.total_response_micros.load(Ordering::Relaxed);

        let providers = self
            .providers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(name, counters)| (name.clone(), *counters))
            .collect();

        StatsSnapshot {
            total_requests: total,
            successful_requests: successful,
            failed_requests: failed,
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            coalesced_waiters: self.coalesced_waiters.load(Ordering::Relaxed),
            success_rate: if completed > 0 {
                successful as f64 / completed as f64
            } else {
                0.0
            },
            average_response_ms: if completed > 0 {
                micros as f64 / completed as f64 / 1_000.0
            } else {
                0.0
            },
            providers,
        }
    }

    fn with_provider(&self, provider: &str, update: impl FnOnce(&mut ProviderCounters)) {
        let mut providers = self.providers.lock().unwrap_or_else(|e| e.into_inner());
        update(providers.entry(provider.to_string()).or_default());
    }
}
