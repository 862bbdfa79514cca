//! 제공자 어댑터 trait 정의.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use trader_core::{Bar, ProviderKind, QualifiedSymbol, SymbolStyle, Timeframe};

use crate::ProviderResult;

/// 조회 범위.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchRange {
    /// 최근 N개 봉
    Count(usize),
    /// `[start, end]` 구간
    Range {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

impl FetchRange {
    /// 구간을 덮는 데 필요한 봉 개수 (최소 1).
    pub fn bar_count(&self, timeframe: Timeframe) -> usize {
        match self {
            FetchRange::Count(n) => (*n).max(1),
            FetchRange::Range { start, end } => {
                let span = (*end - *start).num_seconds().max(0) as u64;
                (span / timeframe.as_secs()) as usize + 1
            }
        }
    }

    /// 구간 조회일 때 시작/종료 시각.
    pub fn bounds(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        match self {
            FetchRange::Count(_) => None,
            FetchRange::Range { start, end } => Some((*start, *end)),
        }
    }
}

/// 벤더가 기대하는 심볼 형식.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolProfile {
    /// 표기 방식
    pub style: SymbolStyle,
    /// 규칙 미일치 시 실패 처리 여부
    pub requires_translation: bool,
}

impl Default for SymbolProfile {
    fn default() -> Self {
        Self {
            style: SymbolStyle::Prefixed,
            requires_translation: false,
        }
    }
}

/// 업스트림 제공자 어댑터.
///
/// 어댑터는 전송 계층 재연결 외에는 재시도하지 않습니다.
/// `Arc<dyn ProviderAdapter>`로 공유되므로 연결 상태는 내부 가변성으로 관리합니다.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// 제공자 이름.
    fn name(&self) -> &str;

    /// 연결 방식.
    fn kind(&self) -> ProviderKind;

    /// 심볼 형식.
    fn symbol_profile(&self) -> SymbolProfile;

    /// 연결을 수립합니다. polling 어댑터는 아무 일도 하지 않습니다.
    async fn connect(&self) -> ProviderResult<()>;

    /// 연결을 해제합니다.
    async fn disconnect(&self) -> ProviderResult<()>;

    /// 봉 데이터를 조회합니다. 결과 순서는 보장하지 않습니다.
    async fn fetch_bars(
        &self,
        symbol: &QualifiedSymbol,
        timeframe: Timeframe,
        range: FetchRange,
    ) -> ProviderResult<Vec<Bar>>;

    /// 제공자가 요청을 처리할 수 있는지 확인합니다.
    async fn health_check(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_bar_count_for_range() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 1, 1, 1, 0, 0).unwrap();
        let range = FetchRange::Range { start, end };
        // 00:00 ~ 01:00 포함 구간 15분봉 5개
        assert_eq!(range.bar_count(Timeframe::M15), 5);
        assert_eq!(FetchRange::Count(0).bar_count(Timeframe::M1), 1);
        assert_eq!(range.bounds(), Some((start, end)));
    }
}
