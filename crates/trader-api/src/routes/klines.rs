//! 봉 조회 endpoint.
//!
//! # 엔드포인트
//!
//! - `GET /klines?symbol=BTCUSDT&timeframe=15&count=100&quality=production&use_cache=true&format=json`
//! - `GET /batch_klines?symbols=BINANCE:BTCUSDT,BINANCE:ETHUSDT&timeframe=1h&count=50`
//!
//! 접두어 없는 심볼은 `BINANCE:`로 간주합니다. 타임프레임은 `15`/`1D` 형식과
//! `15m`/`1h`/`1d` 형식을 모두 받습니다.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use trader_core::{AssetClass, Bar, QualityTier, Timeframe};
use trader_data::{BarsResponse, DataSourceManager};
use trader_exchange::SymbolTranslator;

use crate::error::{bad_request, data_error, ApiResult};
use crate::state::AppState;

pub const MAX_COUNT: usize = 5000;
pub const MAX_BATCH_SYMBOLS: usize = 50;

// ==================== 요청 타입 ====================

/// 응답 형식.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KlineFormat {
    /// 출처, 품질, 캐시 상태 포함
    #[default]
    Json,
    /// 봉 배열만
    Simple,
}

#[derive(Debug, Deserialize)]
pub struct KlinesQuery {
    pub symbol: String,
    #[serde(default = "default_timeframe")]
    pub timeframe: String,
    #[serde(default = "default_count")]
    pub count: usize,
    #[serde(default = "default_quality")]
    pub quality: String,
    #[serde(default = "default_true")]
    pub use_cache: bool,
    #[serde(default)]
    pub format: KlineFormat,
}

#[derive(Debug, Deserialize)]
pub struct BatchKlinesQuery {
    /// 쉼표로 구분한 심볼 목록
    pub symbols: String,
    #[serde(default = "default_timeframe")]
    pub timeframe: String,
    #[serde(default = "default_count")]
    pub count: usize,
    #[serde(default = "default_quality")]
    pub quality: String,
    #[serde(default = "default_true")]
    pub use_cache: bool,
}

fn default_timeframe() -> String {
    "15".to_string()
}

fn default_count() -> usize {
    100
}

fn default_quality() -> String {
    "production".to_string()
}

fn default_true() -> bool {
    true
}

// ==================== 응답 타입 ====================

/// 단일 봉.
#[derive(Debug, Serialize)]
pub struct KlineItem {
    /// 봉 시작 (Unix 초)
    pub timestamp: i64,
    /// 봉 시작 (RFC 3339)
    pub datetime: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl From<&Bar> for KlineItem {
    fn from(bar: &Bar) -> Self {
        Self {
            timestamp: bar.timestamp.timestamp(),
            datetime: bar.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            open: to_f64(bar.open),
            high: to_f64(bar.high),
            low: to_f64(bar.low),
            close: to_f64(bar.close),
            volume: to_f64(bar.volume),
        }
    }
}

fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or_default()
}

#[derive(Debug, Serialize)]
pub struct KlinesResponse {
    pub success: bool,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_status: Option<String>,
    pub data: Vec<KlineItem>,
}

impl KlinesResponse {
    fn build(response: &BarsResponse, format: KlineFormat) -> Self {
        let detailed = format == KlineFormat::Json;
        Self {
            success: true,
            symbol: response.symbol.to_string(),
            timeframe: response.timeframe,
            count: response.bars.len(),
            source: detailed.then(|| response.source.to_string()),
            quality_score: detailed.then_some(response.quality.score),
            quality_level: detailed.then(|| response.quality.level.to_string()),
            cache_status: detailed.then(|| response.cache_status.to_string()),
            data: response.bars.iter().map(KlineItem::from).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BatchKlineResult {
    pub symbol: String,
    pub timeframe: Timeframe,
    /// "success" | "failed"
    pub status: String,
    pub count: usize,
    pub quality_score: Option<f64>,
    pub data: Vec<KlineItem>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BatchKlinesResponse {
    pub success: bool,
    pub total: usize,
    pub results: Vec<BatchKlineResult>,
}

// ==================== 파라미터 정규화 ====================

/// 대문자로 바꾸고, 접두어 없는 암호화폐 페어에만 거래소를 붙입니다.
///
/// 주식 코드는 제공자별 변환에 맡기도록 그대로 둡니다.
pub fn normalize_symbol(raw: &str, translator: &SymbolTranslator) -> String {
    let symbol = raw.trim().to_uppercase();
    if symbol.contains(':') {
        return symbol;
    }
    match translator.qualify(&symbol) {
        Some(qualified) if qualified.asset_class() == AssetClass::Crypto => {
            qualified.as_str().to_string()
        }
        _ => symbol,
    }
}

fn parse_timeframe(raw: &str) -> ApiResult<Timeframe> {
    Timeframe::from_str(raw).map_err(bad_request)
}

fn parse_tier(raw: &str) -> ApiResult<QualityTier> {
    QualityTier::from_str(raw).map_err(bad_request)
}

fn check_count(count: usize) -> ApiResult<usize> {
    if (1..=MAX_COUNT).contains(&count) {
        Ok(count)
    } else {
        Err(bad_request(format!(
            "count must be within 1..={}, got {}",
            MAX_COUNT, count
        )))
    }
}

async fn fetch_recent(
    manager: &DataSourceManager,
    symbol: String,
    timeframe: Timeframe,
    count: usize,
    tier: QualityTier,
    use_cache: bool,
    now: DateTime<Utc>,
) -> trader_data::Result<BarsResponse> {
    let query = manager
        .recent_query(symbol, timeframe, count, now)
        .with_tier(tier)
        .with_cache(use_cache);
    manager.get_bars_with(query).await
}

// ==================== 핸들러 ====================

/// 단일 심볼 조회.
///
/// GET /klines
pub async fn get_klines(
    State(state): State<Arc<AppState>>,
    Query(params): Query<KlinesQuery>,
) -> ApiResult<Json<KlinesResponse>> {
    let timeframe = parse_timeframe(&params.timeframe)?;
    let tier = parse_tier(&params.quality)?;
    let count = check_count(params.count)?;
    let symbol = normalize_symbol(&params.symbol, state.manager.translator());

    debug!(symbol = %symbol, timeframe = %timeframe, count, "Kline request");

    let response = fetch_recent(
        &state.manager,
        symbol,
        timeframe,
        count,
        tier,
        params.use_cache,
        Utc::now(),
    )
    .await
    .map_err(data_error)?;

    Ok(Json(KlinesResponse::build(&response, params.format)))
}

/// 여러 심볼 동시 조회. 심볼별 실패는 결과 항목에 담고 요청 자체는 성공합니다.
///
/// GET /batch_klines
pub async fn get_batch_klines(
    State(state): State<Arc<AppState>>,
    Query(params): Query<BatchKlinesQuery>,
) -> ApiResult<Json<BatchKlinesResponse>> {
    let symbols: Vec<String> = params
        .symbols
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|raw| normalize_symbol(raw, state.manager.translator()))
        .collect();

    if symbols.is_empty() {
        return Err(bad_request("symbols must not be empty"));
    }
    if symbols.len() > MAX_BATCH_SYMBOLS {
        return Err(bad_request(format!(
            "at most {} symbols per batch, got {}",
            MAX_BATCH_SYMBOLS,
            symbols.len()
        )));
    }

    let timeframe = parse_timeframe(&params.timeframe)?;
    let tier = parse_tier(&params.quality)?;
    let count = check_count(params.count)?;
    let now = Utc::now();

    let fetches = symbols.iter().map(|symbol| {
        fetch_recent(
            &state.manager,
            symbol.clone(),
            timeframe,
            count,
            tier,
            params.use_cache,
            now,
        )
    });
    let outcomes = futures::future::join_all(fetches).await;

    let results: Vec<BatchKlineResult> = symbols
        .into_iter()
        .zip(outcomes)
        .map(|(symbol, outcome)| match outcome {
            Ok(response) => BatchKlineResult {
                symbol,
                timeframe,
                status: "success".to_string(),
                count: response.bars.len(),
                quality_score: Some(response.quality.score),
                data: response.bars.iter().map(KlineItem::from).collect(),
                error: None,
            },
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "Batch kline entry failed");
                BatchKlineResult {
                    symbol,
                    timeframe,
                    status: "failed".to_string(),
                    count: 0,
                    quality_score: None,
                    data: Vec::new(),
                    error: Some(e.to_string()),
                }
            }
        })
        .collect();

    Ok(Json(BatchKlinesResponse {
        success: true,
        total: results.len(),
        results,
    }))
}

pub fn klines_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/klines", get(get_klines))
        .route("/batch_klines", get(get_batch_klines))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_symbol() {
        let translator = SymbolTranslator::default();
        assert_eq!(normalize_symbol("btcusdt", &translator), "BINANCE:BTCUSDT");
        assert_eq!(normalize_symbol("eth/usdt", &translator), "BINANCE:ETHUSDT");
        assert_eq!(normalize_symbol(" OANDA:XAUUSD ", &translator), "OANDA:XAUUSD");
        // 주식은 접두어 없이 유지
        assert_eq!(normalize_symbol("600519", &translator), "600519");
        assert_eq!(normalize_symbol("aapl", &translator), "AAPL");
    }

    #[test]
    fn test_timeframe_accepts_both_styles() {
        assert_eq!(parse_timeframe("15").unwrap(), Timeframe::M15);
        assert_eq!(parse_timeframe("15m").unwrap(), Timeframe::M15);
        assert_eq!(parse_timeframe("1h").unwrap(), Timeframe::H1);
        assert_eq!(parse_timeframe("1D").unwrap(), Timeframe::D1);
        assert!(parse_timeframe("7x").is_err());
    }

    #[test]
    fn test_count_bounds() {
        assert!(check_count(0).is_err());
        assert!(check_count(1).is_ok());
        assert!(check_count(MAX_COUNT).is_ok());
        assert!(check_count(MAX_COUNT + 1).is_err());
    }
}
