//! Shared fixtures for trader-data integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, TimeZone, Utc, Weekday};
use rust_decimal_macros::dec;
use trader_core::{
    Bar, CacheConfig, ManagerConfig, ProviderKind, QualifiedSymbol, SymbolStyle, Timeframe,
};
use trader_data::{
    BarStore, CacheEntry, CacheKey, DataError, DataSourceManager, DataSourceManagerBuilder,
    FileStore, TieredCache,
};
use trader_exchange::{FetchRange, ProviderAdapter, ProviderError, ProviderResult, SymbolProfile};

/// Scripted provider that counts upstream calls.
pub struct MockProvider {
    name: String,
    bars: Mutex<ProviderResult<Vec<Bar>>>,
    delay: Duration,
    /// 요청 구간을 빈틈없이 채우는 봉을 생성
    generate: bool,
    calls: AtomicUsize,
}

impl MockProvider {
    pub fn serving(name: &str, bars: Vec<Bar>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            bars: Mutex::new(Ok(bars)),
            delay: Duration::ZERO,
            generate: false,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            bars: Mutex::new(Err(ProviderError::ConnectionError(format!(
                "{} is down",
                name
            )))),
            delay: Duration::ZERO,
            generate: false,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn slow(name: &str, bars: Vec<Bar>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            bars: Mutex::new(Ok(bars)),
            delay,
            generate: false,
            calls: AtomicUsize::new(0),
        })
    }

    /// Answers every range with a complete series.
    pub fn generating(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            bars: Mutex::new(Ok(Vec::new())),
            delay: Duration::ZERO,
            generate: true,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_bars(&self, bars: ProviderResult<Vec<Bar>>) {
        *self.bars.lock().unwrap() = bars;
    }
}

#[async_trait]
impl ProviderAdapter for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Polling
    }

    fn symbol_profile(&self) -> SymbolProfile {
        SymbolProfile {
            style: SymbolStyle::Prefixed,
            requires_translation: false,
        }
    }

    async fn connect(&self) -> ProviderResult<()> {
        Ok(())
    }

    async fn disconnect(&self) -> ProviderResult<()> {
        Ok(())
    }

    async fn fetch_bars(
        &self,
        _symbol: &QualifiedSymbol,
        timeframe: Timeframe,
        range: FetchRange,
    ) -> ProviderResult<Vec<Bar>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.generate {
            if let Some((start, _)) = range.bounds() {
                return Ok(series(start, timeframe, range.bar_count(timeframe)));
            }
        }
        self.bars.lock().unwrap().clone()
    }

    async fn health_check(&self) -> bool {
        self.bars.lock().unwrap().is_ok()
    }
}

pub fn bar(timestamp: DateTime<Utc>) -> Bar {
    Bar::new(timestamp, dec!(100), dec!(101), dec!(99), dec!(100), dec!(1000))
}

/// `count` contiguous bars starting at `start`.
pub fn series(start: DateTime<Utc>, timeframe: Timeframe, count: usize) -> Vec<Bar> {
    (0..count)
        .map(|i| bar(start + timeframe.chrono_duration() * i as i32))
        .collect()
}

/// Weekday daily bars in `[start, end]`, skipping the given days of month.
pub fn weekday_bars(start: DateTime<Utc>, end: DateTime<Utc>, skip_days: &[u32]) -> Vec<Bar> {
    let mut bars = Vec::new();
    let mut day = start;
    while day <= end {
        let weekend = matches!(day.weekday(), Weekday::Sat | Weekday::Sun);
        if !weekend && !skip_days.contains(&day.day()) {
            bars.push(bar(day));
        }
        day += chrono::Duration::days(1);
    }
    bars
}

pub fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

pub fn cache_config(dir: &Path) -> CacheConfig {
    CacheConfig {
        l2_dir: dir.to_string_lossy().into_owned(),
        ..CacheConfig::default()
    }
}

pub async fn file_cache(dir: &Path) -> Arc<TieredCache> {
    let config = cache_config(dir);
    let store = FileStore::open(dir, chrono::Duration::seconds(config.l2_grace_secs as i64))
        .await
        .unwrap();
    Arc::new(TieredCache::new(config, Arc::new(store)))
}

/// Manager over a file-backed cache with providers registered in the given order.
pub async fn manager_with(
    dir: &Path,
    providers: &[Arc<MockProvider>],
) -> DataSourceManager {
    manager_builder(dir, ManagerConfig::default(), providers)
        .await
        .build()
        .unwrap()
}

/// Builder over a file-backed cache, for scenarios that tune config or health.
pub async fn manager_builder(
    dir: &Path,
    config: ManagerConfig,
    providers: &[Arc<MockProvider>],
) -> DataSourceManagerBuilder {
    let mut builder = DataSourceManager::builder(config).cache(file_cache(dir).await);
    for (priority, provider) in providers.iter().enumerate() {
        builder = builder.provider(provider.clone(), priority as u32 + 1);
    }
    builder
}

/// L2 store whose every read and write fails.
pub struct BrokenStore;

#[async_trait]
impl BarStore for BrokenStore {
    fn name(&self) -> &str {
        "broken"
    }

    async fn get(&self, _key: &CacheKey) -> trader_data::Result<Option<CacheEntry>> {
        Err(DataError::CacheError("store offline".into()))
    }

    async fn put(&self, _entry: &CacheEntry) -> trader_data::Result<()> {
        Err(DataError::CacheError("store offline".into()))
    }

    async fn delete(&self, _key: &CacheKey) -> trader_data::Result<bool> {
        Ok(false)
    }

    async fn entries(&self) -> trader_data::Result<Vec<CacheEntry>> {
        Ok(Vec::new())
    }

    async fn sweep_expired(&self, _now: DateTime<Utc>) -> trader_data::Result<usize> {
        Ok(0)
    }

    async fn health_check(&self) -> bool {
        false
    }
}
