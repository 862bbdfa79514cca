//! 봉 데이터 품질 평가.
//!
//! 여섯 가지 차원을 0~1로 측정하고 가중 합으로 종합 점수를 냅니다.
//!
//! | 차원 | 측정 |
//! |------|------|
//! | completeness | 구간 내 고유 봉 수 ÷ 기대 봉 수 (주식은 거래 세션 기준) |
//! | accuracy | OHLC 관계와 양수 가격/비음수 거래량을 만족하는 비율 |
//! | consistency | 인접 봉 시가·직전 종가 괴리가 허용치 이하인 비율 |
//! | timeliness | 마지막 봉의 지연 (봉 단위) |
//! | validity | 타임스탬프가 증가하고 미래가 아닌 비율 |
//! | uniqueness | 고유 타임스탬프 비율 |
//!
//! 빈 결과는 0점이며 항상 거부됩니다.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use trader_core::{AssetClass, Bar, QualityConfig, QualityTier, Timeframe};

use crate::error::{DataError, Result};

// =============================================================================
// 보고서 타입
// =============================================================================

/// 점수 구간별 품질 등급.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityLevel {
    Unacceptable,
    Poor,
    Acceptable,
    Good,
    Excellent,
}

impl QualityLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.95 {
            QualityLevel::Excellent
        } else if score >= 0.85 {
            QualityLevel::Good
        } else if score >= 0.75 {
            QualityLevel::Acceptable
        } else if score >= 0.60 {
            QualityLevel::Poor
        } else {
            QualityLevel::Unacceptable
        }
    }
}

impl fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QualityLevel::Excellent => "excellent",
            QualityLevel::Good => "good",
            QualityLevel::Acceptable => "acceptable",
            QualityLevel::Poor => "poor",
            QualityLevel::Unacceptable => "unacceptable",
        };
        f.write_str(s)
    }
}

/// 품질 문제 종류.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    MissingData,
    InvalidValue,
    LogicalError,
    TimestampError,
    PriceAnomaly,
    VolumeAnomaly,
    SequenceError,
    DuplicateData,
}

impl IssueKind {
    /// 조치 제안.
    pub fn suggestion(&self) -> &'static str {
        match self {
            IssueKind::MissingData => "Backfill the gap from another provider or widen the request window",
            IssueKind::InvalidValue => "Drop bars with non-positive prices or negative volume",
            IssueKind::LogicalError => "Check high/low against open/close; the provider may be sending unadjusted data",
            IssueKind::TimestampError => "Verify the provider clock and timezone handling",
            IssueKind::PriceAnomaly => "Confirm corporate actions or switch to split-adjusted series",
            IssueKind::VolumeAnomaly => "Cross-check volume spikes against a second provider",
            IssueKind::SequenceError => "Sort bars by timestamp before storing",
            IssueKind::DuplicateData => "Deduplicate bars by timestamp keeping the latest value",
        }
    }
}

/// 발견된 문제.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityIssue {
    pub kind: IssueKind,
    pub count: usize,
    pub description: String,
}

/// 차원별 점수.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct QualityDimensions {
    pub completeness: f64,
    pub accuracy: f64,
    pub consistency: f64,
    pub timeliness: f64,
    pub validity: f64,
    pub uniqueness: f64,
}

/// 평가 결과.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityReport {
    pub score: f64,
    pub dimensions: QualityDimensions,
    pub level: QualityLevel,
    pub issues: Vec<QualityIssue>,
    pub suggestions: Vec<String>,
    pub bar_count: usize,
    pub expected_bars: usize,
}

impl QualityReport {
    /// 요구 점수를 만족하는지 확인합니다. 빈 결과는 항상 불합격.
    pub fn passes(&self, threshold: f64) -> bool {
        self.bar_count > 0 && self.score >= threshold
    }

    pub fn has_issue(&self, kind: IssueKind) -> bool {
        self.issues.iter().any(|i| i.kind == kind)
    }

    fn empty(expected_bars: usize) -> Self {
        let kind = IssueKind::MissingData;
        Self {
            score: 0.0,
            dimensions: QualityDimensions::default(),
            level: QualityLevel::Unacceptable,
            issues: vec![QualityIssue {
                kind,
                count: expected_bars,
                description: "No bars returned".to_string(),
            }],
            suggestions: vec![kind.suggestion().to_string()],
            bar_count: 0,
            expected_bars,
        }
    }
}

/// 평가 컨텍스트.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationContext {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub asset_class: AssetClass,
    pub now: DateTime<Utc>,
}

impl EvaluationContext {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, asset_class: AssetClass) -> Self {
        Self {
            start,
            end,
            asset_class,
            now: Utc::now(),
        }
    }

    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// 미래 구간을 잘라낸 유효 종료 시각.
    fn effective_end(&self) -> DateTime<Utc> {
        self.end.min(self.now)
    }
}

// =============================================================================
// 평가기
// =============================================================================

/// 품질 평가기.
#[derive(Debug, Clone)]
pub struct QualityEvaluator {
    config: QualityConfig,
}

impl QualityEvaluator {
    /// 가중치 합이 1이 아니면 실패합니다.
    pub fn new(config: QualityConfig) -> Result<Self> {
        config
            .weights
            .validate()
            .map_err(|e| DataError::ConfigError(e.to_string()))?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &QualityConfig {
        &self.config
    }

    /// 등급별 요구 점수.
    pub fn threshold(&self, tier: QualityTier) -> f64 {
        self.config.thresholds.get(tier)
    }

    /// 기대 봉 수.
    pub fn expected_bars(&self, timeframe: Timeframe, ctx: &EvaluationContext) -> usize {
        let end = ctx.effective_end();
        if end < ctx.start {
            return 0;
        }

        calendar_slots(timeframe, ctx.asset_class, ctx.start, end).unwrap_or_else(|| {
            let span = (end - ctx.start).num_seconds();
            (span / timeframe.as_secs() as i64) as usize + 1
        })
    }

    /// 봉 묶음을 평가합니다.
    pub fn evaluate(
        &self,
        bars: &[Bar],
        timeframe: Timeframe,
        ctx: &EvaluationContext,
    ) -> QualityReport {
        let expected = self.expected_bars(timeframe, ctx);
        if bars.is_empty() {
            return QualityReport::empty(expected);
        }

        let mut issues = Vec::new();
        let total = bars.len();

        // completeness
        let in_range: HashSet<DateTime<Utc>> = bars
            .iter()
            .filter(|b| b.timestamp >= ctx.start && b.timestamp <= ctx.end)
            .map(|b| b.timestamp)
            .collect();
        let completeness = if expected == 0 {
            1.0
        } else {
            (in_range.len() as f64 / expected as f64).min(1.0)
        };
        if in_range.len() < expected {
            push_issue(
                &mut issues,
                IssueKind::MissingData,
                expected - in_range.len(),
                format!("{} of {} expected bars present", in_range.len(), expected),
            );
        }

        // accuracy
        let invalid_values = bars.iter().filter(|b| !b.has_valid_values()).count();
        let illogical = bars.iter().filter(|b| !b.is_consistent()).count();
        let accurate = bars
            .iter()
            .filter(|b| b.has_valid_values() && b.is_consistent())
            .count();
        let accuracy = ratio(accurate, total);
        push_issue(
            &mut issues,
            IssueKind::InvalidValue,
            invalid_values,
            "Non-positive price or negative volume".to_string(),
        );
        push_issue(
            &mut issues,
            IssueKind::LogicalError,
            illogical,
            "High/low do not bound open/close".to_string(),
        );

        // consistency
        let tolerance = Decimal::try_from(self.config.consistency_tolerance).unwrap_or(Decimal::ONE);
        let pairs = total.saturating_sub(1);
        let gaps = bars
            .windows(2)
            .filter(|w| {
                let prev_close = w[0].close;
                if prev_close <= Decimal::ZERO {
                    return true;
                }
                ((w[1].open - prev_close).abs() / prev_close) > tolerance
            })
            .count();
        let consistency = if pairs == 0 { 1.0 } else { 1.0 - ratio(gaps, pairs) };
        push_issue(
            &mut issues,
            IssueKind::PriceAnomaly,
            gaps,
            format!(
                "Open deviates from previous close by more than {:.0}%",
                self.config.consistency_tolerance * 100.0
            ),
        );

        // timeliness
        let timeliness = self.timeliness(bars, timeframe, ctx);

        // validity
        let future_limit = ctx.now + timeframe.chrono_duration();
        let mut out_of_order = 0;
        let mut in_future = 0;
        let mut valid = 0;
        for (i, bar) in bars.iter().enumerate() {
            let ordered = i == 0 || bar.timestamp > bars[i - 1].timestamp;
            let present = bar.timestamp <= future_limit;
            if !ordered {
                out_of_order += 1;
            }
            if !present {
                in_future += 1;
            }
            if ordered && present {
                valid += 1;
            }
        }
        let validity = ratio(valid, total);
        push_issue(
            &mut issues,
            IssueKind::SequenceError,
            out_of_order,
            "Timestamps not strictly increasing".to_string(),
        );
        push_issue(
            &mut issues,
            IssueKind::TimestampError,
            in_future,
            "Bars dated in the future".to_string(),
        );

        // uniqueness
        let distinct: HashSet<DateTime<Utc>> = bars.iter().map(|b| b.timestamp).collect();
        let uniqueness = ratio(distinct.len(), total);
        push_issue(
            &mut issues,
            IssueKind::DuplicateData,
            total - distinct.len(),
            "Duplicate timestamps".to_string(),
        );

        // 거래량 급증은 점수에 반영하지 않고 보고만 합니다
        let spikes = self.volume_spikes(bars);
        push_issue(
            &mut issues,
            IssueKind::VolumeAnomaly,
            spikes,
            format!(
                "Volume above {:.1}x median",
                self.config.volume_spike_factor
            ),
        );

        let dimensions = QualityDimensions {
            completeness,
            accuracy,
            consistency,
            timeliness,
            validity,
            uniqueness,
        };
        let score = self.weighted(&dimensions);
        let suggestions = issues
            .iter()
            .map(|i| i.kind.suggestion().to_string())
            .collect();

        QualityReport {
            score,
            dimensions,
            level: QualityLevel::from_score(score),
            issues,
            suggestions,
            bar_count: total,
            expected_bars: expected,
        }
    }

    fn weighted(&self, d: &QualityDimensions) -> f64 {
        let w = &self.config.weights;
        let score = d.completeness * w.completeness
            + d.accuracy * w.accuracy
            + d.consistency * w.consistency
            + d.timeliness * w.timeliness
            + d.validity * w.validity
            + d.uniqueness * w.uniqueness;
        score.clamp(0.0, 1.0)
    }

    fn timeliness(&self, bars: &[Bar], timeframe: Timeframe, ctx: &EvaluationContext) -> f64 {
        let Some(last) = bars.iter().map(|b| b.timestamp).max() else {
            return 0.0;
        };
        let reference = ctx.effective_end();
        let step = timeframe.chrono_duration();
        // 거래 캘린더가 있으면 마지막 봉 이후 끝난 거래 슬롯 수가 지연
        let lag = match calendar_slots(timeframe, ctx.asset_class, last + step, reference - step) {
            Some(missed) => missed as f64,
            None => (reference - (last + step)).num_seconds() as f64 / timeframe.as_secs() as f64,
        };

        let allowance = self.config.timeliness_allowance_bars;
        let window = self.config.timeliness_window_bars.max(f64::EPSILON);
        if lag <= allowance {
            1.0
        } else {
            (1.0 - (lag - allowance) / window).clamp(0.0, 1.0)
        }
    }

    fn volume_spikes(&self, bars: &[Bar]) -> usize {
        let mut volumes: Vec<f64> = bars.iter().filter_map(|b| b.volume.to_f64()).collect();
        if volumes.len() < 3 {
            return 0;
        }
        volumes.sort_by(|a, b| a.total_cmp(b));
        let median = volumes[volumes.len() / 2];
        if median <= 0.0 {
            return 0;
        }
        let limit = median * self.config.volume_spike_factor;
        volumes.iter().filter(|v| **v > limit).count()
    }
}

const DAY_SECS: i64 = 86_400;

/// 거래 캘린더 안에서 `[from, to]`에 시작하는 봉 수.
///
/// 연속 거래 자산이나 일봉보다 긴 타임프레임은 `None`. 일봉은 평일 날짜 수,
/// 분/시간봉은 현지 세션 시작부터 타임프레임 간격으로 놓이는 슬롯 수입니다.
fn calendar_slots(
    timeframe: Timeframe,
    asset_class: AssetClass,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Option<usize> {
    let step = timeframe.as_secs() as i64;
    if !asset_class.trades_weekdays_only() || step > DAY_SECS {
        return None;
    }
    if to < from {
        return Some(0);
    }

    let tz = asset_class.timezone();
    let first = from.with_timezone(&tz).date_naive();
    let last = to.with_timezone(&tz).date_naive();
    let days = first
        .iter_days()
        .take_while(|d| *d <= last)
        .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun));

    if step == DAY_SECS {
        return Some(days.count());
    }
    Some(
        days.map(|date| {
            asset_class
                .sessions()
                .iter()
                .map(|&(open, close)| session_slots(&tz, date, open, close, step, from, to))
                .sum::<usize>()
        })
        .sum(),
    )
}

/// 세션 하나에서 `[from, to]`에 시작하는 슬롯 수.
fn session_slots<Z: TimeZone>(
    tz: &Z,
    date: NaiveDate,
    open: (u32, u32),
    close: (u32, u32),
    step: i64,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> usize {
    let local = |(hour, min): (u32, u32)| {
        NaiveTime::from_hms_opt(hour, min, 0)
            .and_then(|t| tz.from_local_datetime(&date.and_time(t)).single())
            .map(|dt| dt.with_timezone(&Utc))
    };
    let (Some(open), Some(close)) = (local(open), local(close)) else {
        return 0;
    };

    let length = (close - open).num_seconds();
    if length <= 0 || to < open {
        return 0;
    }
    let slots = (length + step - 1) / step;
    let lo = if from <= open {
        0
    } else {
        ((from - open).num_seconds() + step - 1) / step
    };
    let hi = ((to - open).num_seconds() / step).min(slots - 1);
    if hi < lo {
        0
    } else {
        (hi - lo + 1) as usize
    }
}

fn ratio(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

fn push_issue(issues: &mut Vec<QualityIssue>, kind: IssueKind, count: usize, description: String) {
    if count > 0 {
        issues.push(QualityIssue {
            kind,
            count,
            description,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;
    use trader_core::QualityWeights;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn evaluator() -> QualityEvaluator {
        QualityEvaluator::new(QualityConfig::default()).unwrap()
    }

    fn flat_bars(count: i64, step: i64) -> Vec<Bar> {
        (0..count)
            .map(|i| Bar::new(ts(i * step), dec!(10), dec!(11), dec!(9), dec!(10), dec!(100)))
            .collect()
    }

    fn crypto_ctx(start: i64, end: i64, now: i64) -> EvaluationContext {
        EvaluationContext::new(ts(start), ts(end), AssetClass::Crypto).with_now(ts(now))
    }

    #[test]
    fn test_rejects_invalid_weights() {
        let mut config = QualityConfig::default();
        config.weights = QualityWeights {
            completeness: 0.5,
            ..Default::default()
        };
        assert!(matches!(
            QualityEvaluator::new(config),
            Err(DataError::ConfigError(_))
        ));
    }

    #[test]
    fn test_perfect_series_scores_one() {
        let bars = flat_bars(10, 60);
        let report = evaluator().evaluate(&bars, Timeframe::M1, &crypto_ctx(0, 540, 600));
        assert!((report.score - 1.0).abs() < 1e-9);
        assert_eq!(report.level, QualityLevel::Excellent);
        assert!(report.issues.is_empty());
        assert_eq!(report.expected_bars, 10);
    }

    #[test]
    fn test_empty_batch_scores_zero() {
        let report = evaluator().evaluate(&[], Timeframe::M1, &crypto_ctx(0, 540, 600));
        assert_eq!(report.score, 0.0);
        assert!(report.has_issue(IssueKind::MissingData));
        assert!(!report.passes(0.0));
        assert_eq!(report.level, QualityLevel::Unacceptable);
    }

    #[test]
    fn test_high_below_close_lowers_accuracy() {
        let mut bars = flat_bars(4, 60);
        bars[1].close = dec!(10.5);
        bars[1].high = dec!(10.2);
        let report = evaluator().evaluate(&bars, Timeframe::M1, &crypto_ctx(0, 180, 240));
        assert!((report.dimensions.accuracy - 0.75).abs() < 1e-9);
        assert!(report.has_issue(IssueKind::LogicalError));
        assert!(report.score < 1.0);
    }

    #[test]
    fn test_missing_bars_lower_completeness() {
        let bars: Vec<Bar> = flat_bars(10, 60).into_iter().step_by(2).collect();
        let report = evaluator().evaluate(&bars, Timeframe::M1, &crypto_ctx(0, 540, 600));
        assert!((report.dimensions.completeness - 0.5).abs() < 1e-9);
        let missing = report
            .issues
            .iter()
            .find(|i| i.kind == IssueKind::MissingData)
            .unwrap();
        assert_eq!(missing.count, 5);
    }

    #[test]
    fn test_consistency_gap() {
        let mut bars = flat_bars(3, 60);
        bars[2].open = dec!(13);
        bars[2].high = dec!(13);
        let report = evaluator().evaluate(&bars, Timeframe::M1, &crypto_ctx(0, 120, 180));
        assert!((report.dimensions.consistency - 0.5).abs() < 1e-9);
        assert!(report.has_issue(IssueKind::PriceAnomaly));
    }

    #[test]
    fn test_timeliness_decays_linearly() {
        let bars = flat_bars(5, 60);
        let eval = evaluator();
        // 마지막 봉 240초, 종료 300초 → 지연 0
        let fresh = eval.evaluate(&bars, Timeframe::M1, &crypto_ctx(0, 300, 300));
        assert_eq!(fresh.dimensions.timeliness, 1.0);

        // 지연 12봉 → 1 - (12-2)/20 = 0.5
        let end = 300 + 12 * 60;
        let stale = eval.timeliness(&bars, Timeframe::M1, &crypto_ctx(0, end, end));
        assert!((stale - 0.5).abs() < 1e-9);

        let very_stale = eval.timeliness(&bars, Timeframe::M1, &crypto_ctx(0, 100_000, 100_000));
        assert_eq!(very_stale, 0.0);
    }

    #[test]
    fn test_duplicates_and_sequence() {
        let mut bars = flat_bars(4, 60);
        bars[3].timestamp = bars[2].timestamp;
        let report = evaluator().evaluate(&bars, Timeframe::M1, &crypto_ctx(0, 180, 240));
        assert!((report.dimensions.uniqueness - 0.75).abs() < 1e-9);
        assert!((report.dimensions.validity - 0.75).abs() < 1e-9);
        assert!(report.has_issue(IssueKind::DuplicateData));
        assert!(report.has_issue(IssueKind::SequenceError));
    }

    #[test]
    fn test_future_bars_flagged() {
        let bars = flat_bars(3, 60);
        let report = evaluator().evaluate(&bars, Timeframe::M1, &crypto_ctx(0, 120, 0));
        // 120초 봉은 now(0) + 1분 이후
        assert!(report.has_issue(IssueKind::TimestampError));
    }

    #[test]
    fn test_weekday_calendar_for_daily_equities() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 1, 20, 0, 0, 0).unwrap();
        let ctx = EvaluationContext::new(start, end, AssetClass::ChinaEquity)
            .with_now(end + Duration::days(1));
        assert_eq!(evaluator().expected_bars(Timeframe::D1, &ctx), 14);

        let crypto = EvaluationContext::new(start, end, AssetClass::Crypto)
            .with_now(end + Duration::days(1));
        assert_eq!(evaluator().expected_bars(Timeframe::D1, &crypto), 20);
    }

    #[test]
    fn test_intraday_equity_counts_session_hours_only() {
        let eval = evaluator();

        // 2025-01-06(월) 미국 정규장 09:30-16:00 ET = 14:30-21:00 UTC
        let start = Utc.with_ymd_and_hms(2025, 1, 6, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 1, 6, 23, 0, 0).unwrap();
        let ctx = EvaluationContext::new(start, end, AssetClass::UsEquity)
            .with_now(end + Duration::hours(1));
        assert_eq!(eval.expected_bars(Timeframe::H1, &ctx), 7);

        let open = Utc.with_ymd_and_hms(2025, 1, 6, 14, 30, 0).unwrap();
        let bars: Vec<Bar> = (0..7)
            .map(|i| {
                Bar::new(open + Duration::hours(i), dec!(10), dec!(11), dec!(9), dec!(10), dec!(100))
            })
            .collect();
        let report = eval.evaluate(&bars, Timeframe::H1, &ctx);
        assert!((report.score - 1.0).abs() < 1e-9);
        assert!(report.passes(eval.threshold(QualityTier::Production)));

        // 상하이 30분봉: 일요일 제외, 월요일 오전 4개 + 오후 4개, 화요일은 개장 전
        let sunday = Utc.with_ymd_and_hms(2025, 1, 5, 0, 0, 0).unwrap();
        let tuesday = Utc.with_ymd_and_hms(2025, 1, 7, 0, 0, 0).unwrap();
        let shanghai = EvaluationContext::new(sunday, tuesday, AssetClass::ChinaEquity)
            .with_now(tuesday);
        assert_eq!(eval.expected_bars(Timeframe::M30, &shanghai), 8);
    }

    #[test]
    fn test_equity_timeliness_ignores_closed_market() {
        // 금요일 마지막 정규장 봉, 평가 시점은 일요일
        let friday_last = Utc.with_ymd_and_hms(2025, 1, 10, 20, 30, 0).unwrap();
        let sunday = Utc.with_ymd_and_hms(2025, 1, 12, 12, 0, 0).unwrap();
        let bars = vec![Bar::new(friday_last, dec!(10), dec!(11), dec!(9), dec!(10), dec!(100))];
        let ctx = EvaluationContext::new(friday_last, sunday, AssetClass::UsEquity).with_now(sunday);
        assert_eq!(evaluator().timeliness(&bars, Timeframe::H1, &ctx), 1.0);
    }

    #[test]
    fn test_volume_spike_reported() {
        let mut bars = flat_bars(5, 60);
        bars[4].volume = dec!(10000);
        let report = evaluator().evaluate(&bars, Timeframe::M1, &crypto_ctx(0, 240, 300));
        assert!(report.has_issue(IssueKind::VolumeAnomaly));
        // 점수에는 영향 없음
        assert!((report.score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_quality_level_bands() {
        assert_eq!(QualityLevel::from_score(0.96), QualityLevel::Excellent);
        assert_eq!(QualityLevel::from_score(0.90), QualityLevel::Good);
        assert_eq!(QualityLevel::from_score(0.80), QualityLevel::Acceptable);
        assert_eq!(QualityLevel::from_score(0.65), QualityLevel::Poor);
        assert_eq!(QualityLevel::from_score(0.10), QualityLevel::Unacceptable);
    }
}
