//! 제공자 상태 추적 (쿨다운 차단기).
//!
//! 제공자별로 연속 실패와 연속 품질 거부를 세고, 임계치에 도달하면
//! 쿨다운 구간 동안 해당 제공자를 건너뛰게 합니다.
//!
//! ```text
//! Available ──[연속 실패/거부 임계치 도달]──> CoolingDown
//!     ↑                                          │
//!     └────────────[쿨다운 경과]─────────────────┘
//! ```
//!
//! 쿨다운이 끝나면 카운터를 초기화하고 다시 요청을 허용합니다.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use serde::Serialize;
use trader_core::ProviderHealthConfig;

use crate::{FailureCategory, ProviderError};

/// 쿨다운 정책.
#[derive(Debug, Clone, Copy)]
pub struct HealthPolicy {
    /// 연속 전송 실패 임계치
    pub failure_threshold: u32,
    /// 연속 품질 거부 임계치
    pub rejection_threshold: u32,
    /// 쿨다운 길이
    pub cooldown: Duration,
}

impl From<&ProviderHealthConfig> for HealthPolicy {
    fn from(config: &ProviderHealthConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            rejection_threshold: config.rejection_threshold.max(1),
            cooldown: Duration::from_secs(config.cooldown_secs),
        }
    }
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self::from(&ProviderHealthConfig::default())
    }
}

struct HealthState {
    consecutive_failures: u32,
    consecutive_rejections: u32,
    cooldown_until: Option<Instant>,
    category_failures: HashMap<FailureCategory, u32>,
    tripped_by: Option<FailureCategory>,
    last_error: Option<String>,
}

impl HealthState {
    fn new() -> Self {
        Self {
            consecutive_failures: 0,
            consecutive_rejections: 0,
            cooldown_until: None,
            category_failures: HashMap::new(),
            tripped_by: None,
            last_error: None,
        }
    }

    fn clear_counters(&mut self) {
        self.consecutive_failures = 0;
        self.consecutive_rejections = 0;
        self.category_failures.clear();
        self.tripped_by = None;
    }
}

/// 단일 제공자의 상태.
pub struct ProviderHealth {
    name: String,
    policy: HealthPolicy,
    state: RwLock<HealthState>,
    total_successes: AtomicU64,
    total_failures: AtomicU64,
    total_rejections: AtomicU64,
    cooldown_count: AtomicU64,
}

impl ProviderHealth {
    /// 새 상태 추적기를 생성합니다.
    pub fn new(name: impl Into<String>, policy: HealthPolicy) -> Self {
        Self {
            name: name.into(),
            policy,
            state: RwLock::new(HealthState::new()),
            total_successes: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
            total_rejections: AtomicU64::new(0),
            cooldown_count: AtomicU64::new(0),
        }
    }

    /// 제공자 이름.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 요청을 보낼 수 있는지 확인합니다. 만료된 쿨다운은 여기서 해제됩니다.
    pub fn is_available(&self) -> bool {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        match state.cooldown_until {
            Some(until) if Instant::now() < until => false,
            Some(_) => {
                state.cooldown_until = None;
                state.clear_counters();
                tracing::info!(provider = %self.name, "Provider cooldown elapsed");
                true
            }
            None => true,
        }
    }

    /// 남은 쿨다운 시간.
    pub fn remaining_cooldown(&self) -> Option<Duration> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state
            .cooldown_until
            .and_then(|until| until.checked_duration_since(Instant::now()))
            .filter(|d| !d.is_zero())
    }

    /// 성공을 기록합니다. 연속 카운터를 초기화합니다.
    pub fn record_success(&self) {
        self.total_successes.fetch_add(1, Ordering::Relaxed);
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.clear_counters();
    }

    /// 전송 실패를 기록합니다. 요청 자체의 문제(미일치 심볼 등)는 무시합니다.
    pub fn record_failure(&self, error: &ProviderError) {
        let Some(category) = error.category() else {
            return;
        };
        self.total_failures.fetch_add(1, Ordering::Relaxed);

        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.consecutive_failures += 1;
        *state.category_failures.entry(category).or_insert(0) += 1;
        state.last_error = Some(error.to_string());

        if state.consecutive_failures >= self.policy.failure_threshold {
            self.open_cooldown(&mut state, category);
        }
    }

    /// 품질 거부를 기록합니다.
    pub fn record_rejection(&self, score: f64) {
        self.total_rejections.fetch_add(1, Ordering::Relaxed);

        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.consecutive_rejections += 1;
        *state
            .category_failures
            .entry(FailureCategory::Quality)
            .or_insert(0) += 1;
        state.last_error = Some(format!("quality score {:.4} below threshold", score));

        if state.consecutive_rejections >= self.policy.rejection_threshold {
            self.open_cooldown(&mut state, FailureCategory::Quality);
        }
    }

    /// 수동으로 쿨다운을 해제합니다.
    pub fn reset(&self) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.cooldown_until = None;
        state.clear_counters();
        tracing::info!(provider = %self.name, "Provider health manually reset");
    }

    /// 현재 상태 스냅샷.
    pub fn snapshot(&self) -> HealthSnapshot {
        let remaining = self.remaining_cooldown();
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        HealthSnapshot {
            name: self.name.clone(),
            available: remaining.is_none(),
            consecutive_failures: state.consecutive_failures,
            consecutive_rejections: state.consecutive_rejections,
            cooldown_remaining_secs: remaining.map(|d| d.as_secs_f64()),
            total_successes: self.total_successes.load(Ordering::Relaxed),
            total_failures: self.total_failures.load(Ordering::Relaxed),
            total_rejections: self.total_rejections.load(Ordering::Relaxed),
            cooldown_count: self.cooldown_count.load(Ordering::Relaxed),
            category_failures: state.category_failures.clone(),
            tripped_by: state.tripped_by,
            last_error: state.last_error.clone(),
        }
    }

    fn open_cooldown(&self, state: &mut HealthState, category: FailureCategory) {
        state.cooldown_until = Some(Instant::now() + self.policy.cooldown);
        state.tripped_by = Some(category);
        self.cooldown_count.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            provider = %self.name,
            category = %category,
            consecutive_failures = state.consecutive_failures,
            consecutive_rejections = state.consecutive_rejections,
            cooldown_secs = self.policy.cooldown.as_secs(),
            "Provider entered cooldown"
        );
    }
}

/// 제공자 상태 스냅샷.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub name: String,
    pub available: bool,
    pub consecutive_failures: u32,
    pub consecutive_rejections: u32,
    pub cooldown_remaining_secs: Option<f64>,
    pub total_successes: u64,
    pub total_failures: u64,
    pub total_rejections: u64,
    pub cooldown_count: u64,
    pub category_failures: HashMap<FailureCategory, u32>,
    pub tripped_by: Option<FailureCategory>,
    pub last_error: Option<String>,
}

/// 제공자 이름별 상태 저장소.
pub struct HealthRegistry {
    policy: HealthPolicy,
    entries: RwLock<HashMap<String, Arc<ProviderHealth>>>,
}

impl HealthRegistry {
    /// 새 저장소를 생성합니다.
    pub fn new(policy: HealthPolicy) -> Self {
        Self {
            policy,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// 제공자 상태를 가져오거나 생성합니다.
    pub fn get(&self, name: &str) -> Arc<ProviderHealth> {
        {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            if let Some(health) = entries.get(name) {
                return health.clone();
            }
        }

        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(ProviderHealth::new(name, self.policy)))
            .clone()
    }

    /// 모든 제공자의 스냅샷 (이름순).
    pub fn snapshots(&self) -> Vec<HealthSnapshot> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let mut snapshots: Vec<HealthSnapshot> = entries.values().map(|h| h.snapshot()).collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn policy(cooldown_ms: u64) -> HealthPolicy {
        HealthPolicy {
            failure_threshold: 3,
            rejection_threshold: 2,
            cooldown: Duration::from_millis(cooldown_ms),
        }
    }

    #[test]
    fn test_cooldown_after_consecutive_failures() {
        let health = ProviderHealth::new("tv", policy(30_000));
        let err = ProviderError::ConnectionError("reset".into());

        health.record_failure(&err);
        health.record_failure(&err);
        assert!(health.is_available());

        health.record_failure(&err);
        assert!(!health.is_available());
        assert!(health.remaining_cooldown().is_some());

        let snapshot = health.snapshot();
        assert_eq!(snapshot.tripped_by, Some(FailureCategory::Network));
        assert_eq!(snapshot.cooldown_count, 1);
        assert!(!snapshot.available);
    }

    #[test]
    fn test_success_resets_streak() {
        let health = ProviderHealth::new("tv", policy(30_000));
        let err = ProviderError::Timeout("slow".into());

        health.record_failure(&err);
        health.record_failure(&err);
        health.record_success();
        health.record_failure(&err);
        assert!(health.is_available());
        assert_eq!(health.snapshot().consecutive_failures, 1);
    }

    #[test]
    fn test_request_errors_do_not_count() {
        let health = ProviderHealth::new("tv", policy(30_000));
        for _ in 0..5 {
            health.record_failure(&ProviderError::UnrecognizedSymbol("??".into()));
        }
        assert!(health.is_available());
        assert_eq!(health.snapshot().total_failures, 0);
    }

    #[test]
    fn test_quality_rejections_open_cooldown() {
        let health = ProviderHealth::new("binance", policy(30_000));
        health.record_rejection(0.5);
        assert!(health.is_available());
        health.record_rejection(0.6);
        assert!(!health.is_available());
        assert_eq!(health.snapshot().tripped_by, Some(FailureCategory::Quality));
    }

    #[test]
    fn test_cooldown_expires() {
        let health = ProviderHealth::new("tv", policy(50));
        let err = ProviderError::ConnectionError("reset".into());
        for _ in 0..3 {
            health.record_failure(&err);
        }
        assert!(!health.is_available());

        thread::sleep(Duration::from_millis(80));
        assert!(health.is_available());
        assert_eq!(health.snapshot().consecutive_failures, 0);
    }

    #[test]
    fn test_registry_shares_entries() {
        let registry = HealthRegistry::new(policy(1_000));
        let a = registry.get("tv");
        let b = registry.get("tv");
        assert!(Arc::ptr_eq(&a, &b));
        registry.get("binance");
        let names: Vec<String> = registry.snapshots().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["binance", "tv"]);
    }
}
