//! OHLCV 봉 데이터.
//!
//! `Bar`는 고정된 시간 간격 하나의 관측값입니다. `high ≥ max(open, close)`,
//! `low ≤ min(open, close)` 조건은 생성 시 강제하지 않고 품질 평가에서 검사합니다.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 가격 타입.
pub type Price = Decimal;

/// 거래량 타입.
pub type Volume = Decimal;

/// OHLCV 봉.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bar {
    /// 봉 시작 시각 (UTC)
    pub timestamp: DateTime<Utc>,
    /// 시가
    pub open: Price,
    /// 고가
    pub high: Price,
    /// 저가
    pub low: Price,
    /// 종가
    pub close: Price,
    /// 거래량
    pub volume: Volume,
}

impl Bar {
    /// 새 봉을 생성합니다.
    pub fn new(
        timestamp: DateTime<Utc>,
        open: Price,
        high: Price,
        low: Price,
        close: Price,
        volume: Volume,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// 고가/저가가 시가·종가를 감싸는지 확인합니다.
    pub fn is_consistent(&self) -> bool {
        self.high >= self.open.max(self.close) && self.low <= self.open.min(self.close)
    }

    /// 가격이 모두 양수이고 거래량이 음수가 아닌지 확인합니다.
    pub fn has_valid_values(&self) -> bool {
        self.open > Decimal::ZERO
            && self.high > Decimal::ZERO
            && self.low > Decimal::ZERO
            && self.close > Decimal::ZERO
            && self.volume >= Decimal::ZERO
    }

    /// 밀리초 단위 Unix 타임스탬프.
    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }
}

/// 봉을 시간순으로 정렬하고 중복 타임스탬프를 제거합니다.
///
/// 같은 타임스탬프가 여러 번 나오면 마지막 값을 유지합니다.
pub fn normalize_bars(mut bars: Vec<Bar>) -> Vec<Bar> {
    // 안정 정렬이므로 같은 타임스탬프는 입력 순서를 유지
    bars.sort_by_key(|b| b.timestamp);
    let mut out: Vec<Bar> = Vec::with_capacity(bars.len());
    for bar in bars {
        match out.last_mut() {
            Some(last) if last.timestamp == bar.timestamp => *last = bar,
            _ => out.push(bar),
        }
    }
    out
}

/// `[start, end]` 구간에 속하는 봉만 남깁니다.
pub fn filter_range(bars: &[Bar], start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<Bar> {
    bars.iter()
        .filter(|b| b.timestamp >= start && b.timestamp <= end)
        .cloned()
        .collect()
}
