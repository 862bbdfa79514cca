//! 데이터 소스 매니저.
//!
//! 캐시, 제공자 폴백, 품질 게이트를 묶어 봉 조회의 단일 진입점을 제공합니다.
//!
//! # 동작 흐름
//!
//! ```text
//! get_bars(symbol, tf, start, end)
//!         │
//!         ▼
//! ┌───────────────────┐ hit
//! │ 1. 캐시 조회        │──────► source = Cache
//! └─────────┬─────────┘
//!           │ miss
//! ┌─────────▼─────────┐
//! │ 2. 병합 슬롯 참여   │ ← 같은 키는 업스트림 호출 하나만
//! └─────────┬─────────┘
//!           │ (선도 요청만)
//! ┌─────────▼─────────┐  실패/품질 미달
//! │ 3. 우선순위 순 제공자 │─────────────► 다음 제공자
//! │    변환 → 조회 → 평가 │
//! └─────────┬─────────┘
//!           │ 합격
//! ┌─────────▼─────────┐
//! │ 4. write-through   │──────► source = Provider(name)
//! └───────────────────┘
//! ```
//!
//! 모든 제공자가 실패하면 `AllSourcesExhausted`를 반환하고 아무것도 캐시하지 않습니다.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeZone, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, instrument, warn, Instrument};
use trader_core::{
    filter_range, normalize_bars, Bar, CanonicalSymbol, ManagerConfig, QualityConfig,
    QualityTier, Timeframe,
};
use trader_exchange::{
    FetchRange, HealthPolicy, HealthRegistry, HealthSnapshot, ProviderAdapter, ProviderError,
    SymbolTranslator,
};

use crate::cache::{align_down, CacheEntry, CacheKey, CacheWriteStatus, TieredCache};
use crate::error::{DataError, Result};
use crate::quality::{EvaluationContext, QualityEvaluator, QualityLevel, QualityReport};
use crate::stats::{ServiceStats, StatsSnapshot};

// =============================================================================
// 요청/응답 타입
// =============================================================================

/// 봉 조회 요청.
#[derive(Debug, Clone)]
pub struct BarQuery {
    pub symbol: CanonicalSymbol,
    pub timeframe: Timeframe,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// 없으면 매니저 기본 등급
    pub tier: Option<QualityTier>,
    pub use_cache: bool,
    /// 우선순위를 무시하고 이 제공자만 사용 (쿨다운은 적용)
    pub pinned_provider: Option<String>,
    /// 응답에서 최근 N개만 반환
    pub limit: Option<usize>,
}

impl BarQuery {
    pub fn new(
        symbol: impl Into<CanonicalSymbol>,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
            start,
            end,
            tier: None,
            use_cache: true,
            pinned_provider: None,
            limit: None,
        }
    }

    pub fn with_tier(mut self, tier: QualityTier) -> Self {
        self.tier = Some(tier);
        self
    }

    pub fn with_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    pub fn pinned_to(mut self, provider: impl Into<String>) -> Self {
        self.pinned_provider = Some(provider.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// 응답 데이터 출처.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Cache,
    Provider(String),
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::Cache => f.write_str("cache"),
            DataSource::Provider(name) => f.write_str(name),
        }
    }
}

/// 응답의 캐시 처리 결과.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
    Hit,
    Written,
    Skipped,
    Failed,
}

impl From<CacheWriteStatus> for CacheStatus {
    fn from(status: CacheWriteStatus) -> Self {
        match status {
            CacheWriteStatus::Written => CacheStatus::Written,
            CacheWriteStatus::Skipped => CacheStatus::Skipped,
            CacheWriteStatus::Failed => CacheStatus::Failed,
        }
    }
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CacheStatus::Hit => "hit",
            CacheStatus::Written => "written",
            CacheStatus::Skipped => "skipped",
            CacheStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// 응답 품질 요약.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QualitySummary {
    pub score: f64,
    pub level: QualityLevel,
}

impl QualitySummary {
    fn from_score(score: f64) -> Self {
        Self {
            score,
            level: QualityLevel::from_score(score),
        }
    }
}

/// 봉 조회 응답.
#[derive(Debug, Clone, Serialize)]
pub struct BarsResponse {
    pub symbol: CanonicalSymbol,
    pub timeframe: Timeframe,
    pub bars: Vec<Bar>,
    pub source: DataSource,
    pub quality: QualitySummary,
    pub cache_status: CacheStatus,
}

impl BarsResponse {
    fn truncate_to(mut self, limit: Option<usize>) -> Self {
        if let Some(limit) = limit {
            if self.bars.len() > limit {
                self.bars.drain(..self.bars.len() - limit);
            }
        }
        self
    }
}

/// 매니저 상태.
#[derive(Debug, Clone, Serialize)]
pub struct ManagerHealth {
    pub healthy: bool,
    pub cache_enabled: bool,
    pub cache_backend: String,
    pub cache_healthy: bool,
    pub providers: Vec<HealthSnapshot>,
}

// =============================================================================
// 매니저
// =============================================================================

type SharedFetch = Shared<BoxFuture<'static, Result<BarsResponse>>>;

struct RegisteredProvider {
    adapter: Arc<dyn ProviderAdapter>,
    priority: u32,
}

struct ManagerInner {
    config: ManagerConfig,
    providers: Vec<RegisteredProvider>,
    translator: SymbolTranslator,
    evaluator: QualityEvaluator,
    cache: Arc<TieredCache>,
    health: Arc<HealthRegistry>,
    fetch_pool: Semaphore,
    in_flight: Mutex<HashMap<String, SharedFetch>>,
    stats: ServiceStats,
}

/// 데이터 소스 매니저. 복제 비용이 낮은 핸들입니다.
#[derive(Clone)]
pub struct DataSourceManager {
    inner: Arc<ManagerInner>,
}

/// [`DataSourceManager`] 빌더.
pub struct DataSourceManagerBuilder {
    config: ManagerConfig,
    cache: Option<Arc<TieredCache>>,
    evaluator: Option<QualityEvaluator>,
    health: Option<Arc<HealthRegistry>>,
    translator: SymbolTranslator,
    providers: Vec<RegisteredProvider>,
}

impl DataSourceManagerBuilder {
    pub fn cache(mut self, cache: Arc<TieredCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn evaluator(mut self, evaluator: QualityEvaluator) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    pub fn health(mut self, health: Arc<HealthRegistry>) -> Self {
        self.health = Some(health);
        self
    }

    pub fn translator(mut self, translator: SymbolTranslator) -> Self {
        self.translator = translator;
        self
    }

    /// 제공자를 등록합니다. 우선순위 값이 작을수록 먼저 시도합니다.
    pub fn provider(mut self, adapter: Arc<dyn ProviderAdapter>, priority: u32) -> Self {
        self.providers.push(RegisteredProvider { adapter, priority });
        self
    }

    pub fn build(mut self) -> Result<DataSourceManager> {
        let cache = self
            .cache
            .ok_or_else(|| DataError::ConfigError("cache is required".to_string()))?;
        let evaluator = match self.evaluator {
            Some(evaluator) => evaluator,
            None => QualityEvaluator::new(QualityConfig::default())?,
        };
        let health = self
            .health
            .unwrap_or_else(|| Arc::new(HealthRegistry::new(HealthPolicy::default())));

        let mut seen = std::collections::HashSet::new();
        for p in &self.providers {
            if !seen.insert(p.adapter.name().to_string()) {
                return Err(DataError::ConfigError(format!(
                    "duplicate provider name: {}",
                    p.adapter.name()
                )));
            }
            // 스냅샷에 처음부터 나타나도록 등록
            health.get(p.adapter.name());
        }

        // 안정 정렬: 같은 우선순위는 등록 순서 유지
        self.providers.sort_by_key(|p| p.priority);

        info!(
            providers = ?self.providers.iter().map(|p| p.adapter.name()).collect::<Vec<_>>(),
            max_concurrent_fetches = self.config.max_concurrent_fetches,
            "DataSourceManager initialized"
        );

        Ok(DataSourceManager {
            inner: Arc::new(ManagerInner {
                fetch_pool: Semaphore::new(self.config.max_concurrent_fetches.max(1)),
                config: self.config,
                providers: self.providers,
                translator: self.translator,
                evaluator,
                cache,
                health,
                in_flight: Mutex::new(HashMap::new()),
                stats: ServiceStats::new(),
            }),
        })
    }
}

impl DataSourceManager {
    pub fn builder(config: ManagerConfig) -> DataSourceManagerBuilder {
        DataSourceManagerBuilder {
            config,
            cache: None,
            evaluator: None,
            health: None,
            translator: SymbolTranslator::default(),
            providers: Vec::new(),
        }
    }

    /// 구간 조회 (기본 옵션).
    pub async fn get_bars(
        &self,
        symbol: impl Into<CanonicalSymbol>,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<BarsResponse> {
        self.get_bars_with(BarQuery::new(symbol, timeframe, start, end))
            .await
    }

    /// 옵션을 지정한 조회.
    #[instrument(
        skip(self, query),
        fields(symbol = %query.symbol, timeframe = %query.timeframe)
    )]
    pub async fn get_bars_with(&self, query: BarQuery) -> Result<BarsResponse> {
        let started = Instant::now();
        let stats = &self.inner.stats;
        stats.record_request();

        let result = self.resolve(query).await;
        stats.record_outcome(result.is_ok(), started.elapsed());
        result
    }

    /// 최근 `count`개 봉을 위한 조회를 만듭니다.
    ///
    /// 종료 시각은 현재 봉 경계로 내림 정렬하므로 같은 봉 안의 반복 요청은
    /// 같은 캐시 키를 씁니다. 평일 캘린더 일봉은 주말을 감안해 구간을 넓힙니다.
    pub fn recent_query(
        &self,
        symbol: impl Into<CanonicalSymbol>,
        timeframe: Timeframe,
        count: usize,
        now: DateTime<Utc>,
    ) -> BarQuery {
        let symbol = symbol.into();
        let asset_class = self.inner.translator.classify(&symbol);
        let count = count.max(1);

        let span_bars = if timeframe == Timeframe::D1 && asset_class.trades_weekdays_only() {
            (count * 7).div_ceil(5) + 2
        } else {
            count - 1
        };

        let end = Utc
            .timestamp_opt(align_down(now, timeframe), 0)
            .single()
            .unwrap_or(now);
        let span = timeframe.chrono_duration() * i32::try_from(span_bars).unwrap_or(i32::MAX);
        let start = end.checked_sub_signed(span).unwrap_or(DateTime::<Utc>::MIN_UTC);

        BarQuery::new(symbol, timeframe, start, end).with_limit(count)
    }

    /// 등록된 제공자 이름 (우선순위 순).
    pub fn provider_names(&self) -> Vec<String> {
        self.inner
            .providers
            .iter()
            .map(|p| p.adapter.name().to_string())
            .collect()
    }

    pub fn cache(&self) -> &Arc<TieredCache> {
        &self.inner.cache
    }

    pub fn translator(&self) -> &SymbolTranslator {
        &self.inner.translator
    }

    pub fn evaluator(&self) -> &QualityEvaluator {
        &self.inner.evaluator
    }

    pub fn health_registry(&self) -> &Arc<HealthRegistry> {
        &self.inner.health
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// 캐시와 제공자 상태.
    pub async fn health(&self) -> ManagerHealth {
        let cache = &self.inner.cache;
        let cache_healthy = !cache.is_enabled() || cache.health_check().await;
        let providers = self.inner.health.snapshots();
        let any_available = providers.iter().any(|p| p.available);

        ManagerHealth {
            healthy: cache_healthy && any_available,
            cache_enabled: cache.is_enabled(),
            cache_backend: cache.store().name().to_string(),
            cache_healthy,
            providers,
        }
    }

    /// 모든 제공자에 미리 연결합니다. 실패는 경고만 남깁니다.
    pub async fn connect_all(&self) {
        for p in &self.inner.providers {
            match p.adapter.connect().await {
                Ok(()) => debug!(provider = p.adapter.name(), "Provider connected"),
                Err(e) => warn!(provider = p.adapter.name(), error = %e, "Provider connect failed"),
            }
        }
    }

    pub async fn disconnect_all(&self) {
        for p in &self.inner.providers {
            if let Err(e) = p.adapter.disconnect().await {
                warn!(provider = p.adapter.name(), error = %e, "Provider disconnect failed");
            }
        }
    }

    // =========================================================================
    // 내부
    // =========================================================================

    async fn resolve(&self, query: BarQuery) -> Result<BarsResponse> {
        if query.start > query.end {
            return Err(DataError::InvalidRange(format!(
                "start {} is after end {}",
                query.start, query.end
            )));
        }

        let inner = &self.inner;
        let key = CacheKey::new(&query.symbol, query.timeframe, query.start, query.end);
        let limit = query.limit;

        if query.use_cache && inner.cache.is_enabled() {
            match inner.cache.get(&key, Utc::now()).await {
                Some(entry) if entry.covers(query.start, query.end) => {
                    inner.stats.record_cache_hit();
                    debug!(key = %key, "Serving from cache");
                    return Ok(BarsResponse {
                        symbol: query.symbol.clone(),
                        timeframe: query.timeframe,
                        bars: entry.bars_in(query.start, query.end),
                        source: DataSource::Cache,
                        quality: QualitySummary::from_score(entry.quality_score),
                        cache_status: CacheStatus::Hit,
                    }
                    .truncate_to(limit));
                }
                _ => inner.stats.record_cache_miss(),
            }
        }

        self.coalesced(key, query)
            .await
            .map(|response| response.truncate_to(limit))
    }

    async fn coalesced(&self, key: CacheKey, query: BarQuery) -> Result<BarsResponse> {
        let tier = query.tier.unwrap_or(self.inner.config.default_tier);
        let slot = format!(
            "{}#{}#{}",
            key,
            tier,
            query.pinned_provider.as_deref().unwrap_or("*")
        );

        let (fetch, joined) = {
            let mut in_flight = self
                .inner
                .in_flight
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            match in_flight.get(&slot) {
                Some(existing) => (existing.clone(), true),
                None => {
                    // 호출자가 취소되어도 조회는 끝까지 진행되고 슬롯은 조회 태스크가 비웁니다
                    let inner = Arc::clone(&self.inner);
                    let task_slot = slot.clone();
                    let key_label = key.to_string();
                    let task = tokio::spawn(
                        async move {
                            let result = inner.fetch_from_providers(key, query, tier).await;
                            inner
                                .in_flight
                                .lock()
                                .unwrap_or_else(|e| e.into_inner())
                                .remove(&task_slot);
                            result
                        }
                        .instrument(tracing::Span::current()),
                    );
                    let fetch = async move {
                        task.await.unwrap_or_else(|e| {
                            error!(key = %key_label, error = %e, "Fetch task ended abnormally");
                            Err(DataError::AllSourcesExhausted {
                                key: key_label,
                                attempts: 0,
                            })
                        })
                    }
                    .boxed()
                    .shared();
                    in_flight.insert(slot, fetch.clone());
                    (fetch, false)
                }
            }
        };

        if joined {
            self.inner.stats.record_coalesced();
            debug!("Joined in-flight fetch");
        }

        fetch.await
    }
}

impl ManagerInner {
    async fn fetch_from_providers(
        &self,
        key: CacheKey,
        query: BarQuery,
        tier: QualityTier,
    ) -> Result<BarsResponse> {
        let threshold = self.evaluator.threshold(tier);
        let candidates: Vec<&RegisteredProvider> = match &query.pinned_provider {
            Some(name) => {
                let pinned: Vec<_> = self
                    .providers
                    .iter()
                    .filter(|p| p.adapter.name() == name)
                    .collect();
                if pinned.is_empty() {
                    return Err(DataError::ConfigError(format!("unknown provider: {}", name)));
                }
                pinned
            }
            None => self.providers.iter().collect(),
        };

        let mut attempts = 0;
        for provider in candidates {
            let name = provider.adapter.name();
            let health = self.health.get(name);
            if !health.is_available() {
                debug!(provider = name, "Skipping provider in cooldown");
                continue;
            }

            attempts += 1;
            self.stats.record_attempt(name);

            let span = trader_core::bars_span!("provider_fetch", query.symbol, query.timeframe, name);
            let fetched = self
                .fetch_one(provider.adapter.as_ref(), &query)
                .instrument(span)
                .await;
            let (bars, report) = match fetched {
                Ok(result) => result,
                Err(e) => {
                    if let DataError::Provider(provider_error) = &e {
                        health.record_failure(provider_error);
                    }
                    self.stats.record_provider_failure(name);
                    warn!(provider = name, error = %e, "Provider fetch failed, trying next");
                    continue;
                }
            };

            if !report.passes(threshold) {
                health.record_rejection(report.score);
                self.stats.record_rejection(name);
                let rejected = DataError::QualityRejected {
                    provider: name.to_string(),
                    score: report.score,
                    threshold,
                };
                warn!(
                    provider = name,
                    score = report.score,
                    threshold,
                    issues = report.issues.len(),
                    "{}",
                    rejected
                );
                continue;
            }

            health.record_success();
            self.stats.record_provider_success(name);

            let cache_status = self.write_through(&key, &query, &bars, &report, name).await;
            info!(
                provider = name,
                bars = bars.len(),
                score = report.score,
                cache_status = %cache_status,
                "Bars fetched"
            );

            return Ok(BarsResponse {
                symbol: query.symbol.clone(),
                timeframe: query.timeframe,
                bars,
                source: DataSource::Provider(name.to_string()),
                quality: QualitySummary {
                    score: report.score,
                    level: report.level,
                },
                cache_status,
            });
        }

        let err = DataError::AllSourcesExhausted {
            key: key.to_string(),
            attempts,
        };
        error!(error = %err, "No provider produced acceptable bars");
        Err(err)
    }

    /// 제공자 하나에서 조회하고 정규화/평가합니다.
    async fn fetch_one(
        &self,
        adapter: &dyn ProviderAdapter,
        query: &BarQuery,
    ) -> Result<(Vec<Bar>, QualityReport)> {
        let qualified = self
            .translator
            .translate(&query.symbol, adapter.symbol_profile())?;
        let range = FetchRange::Range {
            start: query.start,
            end: query.end,
        };

        let raw = {
            let _permit = self
                .fetch_pool
                .acquire()
                .await
                .map_err(|_| DataError::ConfigError("fetch pool closed".to_string()))?;
            let deadline = Duration::from_secs(self.config.fetch_timeout_secs.max(1));
            tokio::time::timeout(
                deadline,
                adapter.fetch_bars(&qualified, query.timeframe, range),
            )
            .await
            .map_err(|_| {
                ProviderError::Timeout(format!(
                    "{} did not answer within {:?}",
                    adapter.name(),
                    deadline
                ))
            })??
        };

        // 평가는 정렬/중복 제거 전 원본 기준
        let in_range = filter_range(&raw, query.start, query.end);
        let ctx = EvaluationContext::new(query.start, query.end, qualified.asset_class());
        let report = self.evaluator.evaluate(&in_range, query.timeframe, &ctx);
        let bars = normalize_bars(in_range);
        debug!(
            provider = adapter.name(),
            qualified = %qualified,
            raw_bars = raw.len(),
            bars = bars.len(),
            score = report.score,
            "Provider batch evaluated"
        );
        Ok((bars, report))
    }

    async fn write_through(
        &self,
        key: &CacheKey,
        query: &BarQuery,
        bars: &[Bar],
        report: &QualityReport,
        provider: &str,
    ) -> CacheStatus {
        let now = Utc::now();
        let entry = CacheEntry::new(
            key.clone(),
            bars.to_vec(),
            report.score,
            provider,
            (query.start, query.end),
            now,
            self.cache.ttl_for(query.timeframe),
        );
        self.cache.put(entry).await.into()
    }
}
