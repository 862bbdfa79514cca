//! 캐싱 레이어.
//!
//! - L1: 프로세스 내 LRU ([`lru::LruCache`])
//! - L2: 재시작 후에도 유지되는 [`crate::storage::BarStore`]
//! - [`tiered::TieredCache`]: 두 계층을 묶는 읽기/쓰기 경로

pub mod lru;
pub mod tiered;

pub use lru::{LruCache, LruStats};
pub use tiered::{CacheStats, CacheWriteStatus, TieredCache};

use std::fmt;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use trader_core::{filter_range, Bar, CanonicalSymbol, Timeframe};

/// 캐시 키.
///
/// 요청 구간을 타임프레임 경계로 내림 정렬한 버킷을 포함하므로
/// 같은 버킷에 속하는 요청은 같은 키를 씁니다. L1/L2에서 동일하게 사용합니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub start_bucket: i64,
    pub end_bucket: i64,
}

impl CacheKey {
    pub fn new(
        symbol: &CanonicalSymbol,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol: symbol.to_string(),
            timeframe,
            start_bucket: align_down(start, timeframe),
            end_bucket: align_down(end, timeframe),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}-{}",
            self.symbol, self.timeframe, self.start_bucket, self.end_bucket
        )
    }
}

/// 타임프레임 경계로 내림 정렬한 epoch 초.
pub fn align_down(ts: DateTime<Utc>, timeframe: Timeframe) -> i64 {
    let step = timeframe.as_secs() as i64;
    ts.timestamp().div_euclid(step) * step
}

/// 캐시 항목.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    /// 시간순 정렬, 타임스탬프 중복 없음
    pub bars: Vec<Bar>,
    pub quality_score: f64,
    /// 데이터를 가져온 제공자 이름
    pub source: String,
    pub fetched_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub range_start: DateTime<Utc>,
    pub range_end: DateTime<Utc>,
}

impl CacheEntry {
    /// 새 항목을 생성합니다. 만료 시각은 `fetched_at + ttl_secs`.
    pub fn new(
        key: CacheKey,
        bars: Vec<Bar>,
        quality_score: f64,
        source: impl Into<String>,
        range: (DateTime<Utc>, DateTime<Utc>),
        fetched_at: DateTime<Utc>,
        ttl_secs: u64,
    ) -> Self {
        let ttl = Duration::seconds(i64::try_from(ttl_secs).unwrap_or(i64::MAX / 1_000));
        Self {
            key,
            bars,
            quality_score,
            source: source.into(),
            fetched_at,
            expires_at: fetched_at + ttl,
            range_start: range.0,
            range_end: range.1,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// 요청 구간 전체를 담고 있는지 확인합니다.
    pub fn covers(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.range_start <= start && self.range_end >= end
    }

    /// 요청 구간에 속하는 봉만 반환합니다.
    pub fn bars_in(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<Bar> {
        filter_range(&self.bars, start, end)
    }

    /// 마지막 봉의 시각.
    pub fn last_bar_time(&self) -> Option<DateTime<Utc>> {
        self.bars.last().map(|b| b.timestamp)
    }

    /// 버킷 시작 시각.
    pub fn bucket_start(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.key.start_bucket, 0)
            .single()
            .unwrap_or(self.range_start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_cache_key_aligns_to_bucket() {
        let symbol = CanonicalSymbol::new("BINANCE:BTCUSDT");
        let a = CacheKey::new(&symbol, Timeframe::M15, ts(900 + 10), ts(9_000 + 59));
        let b = CacheKey::new(&symbol, Timeframe::M15, ts(900 + 800), ts(9_000));
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "BINANCE:BTCUSDT|15|900-9000");

        let c = CacheKey::new(&symbol, Timeframe::M5, ts(900), ts(9_000));
        assert_ne!(a, c);
    }

    #[test]
    fn test_entry_expiry_and_coverage() {
        let symbol = CanonicalSymbol::new("SSE:600519");
        let key = CacheKey::new(&symbol, Timeframe::M1, ts(0), ts(600));
        let bar = Bar::new(ts(60), dec!(1), dec!(2), dec!(1), dec!(2), dec!(5));
        let entry = CacheEntry::new(key, vec![bar], 0.99, "a", (ts(0), ts(600)), ts(1_000), 60);

        assert!(!entry.is_expired(ts(1_059)));
        assert!(entry.is_expired(ts(1_060)));
        assert!(entry.covers(ts(0), ts(600)));
        assert!(entry.covers(ts(60), ts(120)));
        assert!(!entry.covers(ts(0), ts(660)));
        assert_eq!(entry.bars_in(ts(120), ts(600)).len(), 0);
        assert_eq!(entry.last_bar_time(), Some(ts(60)));
    }
}
