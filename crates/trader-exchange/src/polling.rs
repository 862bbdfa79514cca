//! HTTP polling 제공자.
//!
//! 상태 없는 요청/응답 방식으로 `/api/v3/klines`를 호출합니다. 응답은 배열의
//! 배열이며 요청당 최대 1000개이므로 긴 구간은 여러 페이지로 나눠 조회합니다.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, warn};
use trader_core::{Bar, ProviderConfig, ProviderKind, QualifiedSymbol, Timeframe};

use crate::rate_limit::RateLimiter;
use crate::traits::{FetchRange, ProviderAdapter, SymbolProfile};
use crate::{ProviderError, ProviderResult};

/// 요청당 최대 봉 개수 (벤더 제한).
const PAGE_LIMIT: usize = 1000;

// ============================================================================
// 설정
// ============================================================================

/// polling 제공자 설정.
///
/// `Debug` 구현은 API 키를 출력하지 않습니다.
#[derive(Clone)]
pub struct PollingConfig {
    /// 제공자 이름
    pub name: String,
    /// REST 기본 URL
    pub base_url: String,
    /// API 키 (공개 엔드포인트는 불필요)
    pub api_key: Option<SecretString>,
    /// 요청 타임아웃
    pub timeout: Duration,
    /// 요청 간 최소 간격
    pub min_request_interval: Duration,
    /// 심볼 형식
    pub symbol_profile: SymbolProfile,
    /// 조회당 최대 봉 개수
    pub max_bars_per_request: usize,
}

impl fmt::Debug for PollingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollingConfig")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "***REDACTED***"))
            .field("timeout", &self.timeout)
            .field("min_request_interval", &self.min_request_interval)
            .field("symbol_profile", &self.symbol_profile)
            .finish()
    }
}

impl PollingConfig {
    /// 기본값으로 생성합니다.
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            api_key: None,
            timeout: Duration::from_secs(30),
            min_request_interval: Duration::from_millis(100),
            symbol_profile: SymbolProfile {
                style: trader_core::SymbolStyle::Bare,
                requires_translation: false,
            },
            max_bars_per_request: 5000,
        }
    }

    /// 요청 간 최소 간격을 설정합니다.
    pub fn with_min_request_interval(mut self, interval: Duration) -> Self {
        self.min_request_interval = interval;
        self
    }

    /// 애플리케이션 설정에서 생성합니다. 자격증명은 환경 변수에서 읽습니다.
    pub fn from_provider_config(config: &ProviderConfig) -> Self {
        Self {
            name: config.name.clone(),
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.read_credential().map(SecretString::from),
            timeout: Duration::from_secs(config.timeout_secs),
            min_request_interval: Duration::from_millis(config.min_request_interval_ms),
            symbol_profile: SymbolProfile {
                style: config.symbol_style,
                requires_translation: config.requires_translation,
            },
            max_bars_per_request: config.max_bars_per_request.max(1),
        }
    }
}

// ============================================================================
// API 응답 타입
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawKline(
    i64,    // 0: Open time
    String, // 1: Open
    String, // 2: High
    String, // 3: Low
    String, // 4: Close
    String, // 5: Volume
    i64,    // 6: Close time
    String, // 7: Quote asset volume
    i64,    // 8: Number of trades
    String, // 9: Taker buy base asset volume
    String, // 10: Taker buy quote asset volume
    String, // 11: Ignore
);

#[derive(Debug, Deserialize)]
struct VendorError {
    code: i32,
    msg: String,
}

impl RawKline {
    fn into_bar(self) -> ProviderResult<Bar> {
        let timestamp = DateTime::<Utc>::from_timestamp_millis(self.0).ok_or_else(|| {
            ProviderError::MalformedResponse(format!("invalid open time: {}", self.0))
        })?;
        Ok(Bar::new(
            timestamp,
            parse_decimal(&self.1)?,
            parse_decimal(&self.2)?,
            parse_decimal(&self.3)?,
            parse_decimal(&self.4)?,
            parse_decimal(&self.5)?,
        ))
    }
}

fn parse_decimal(s: &str) -> ProviderResult<Decimal> {
    s.parse::<Decimal>()
        .map_err(|e| ProviderError::MalformedResponse(format!("invalid number '{}': {}", s, e)))
}

// ============================================================================
// 제공자
// ============================================================================

/// HTTP polling 제공자.
pub struct PollingProvider {
    config: PollingConfig,
    client: Client,
    limiter: RateLimiter,
}

impl PollingProvider {
    /// 새 제공자를 생성합니다.
    ///
    /// # Errors
    /// HTTP 클라이언트 생성에 실패하면 `ProviderError::ConnectionError`를 반환합니다.
    pub fn new(config: PollingConfig) -> ProviderResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                ProviderError::ConnectionError(format!("HTTP 클라이언트 생성 실패: {}", e))
            })?;
        let limiter = RateLimiter::new(config.min_request_interval);

        Ok(Self {
            config,
            client,
            limiter,
        })
    }

    /// 제공자 설정.
    pub fn config(&self) -> &PollingConfig {
        &self.config
    }

    async fn public_get<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> ProviderResult<T> {
        self.limiter.acquire().await;

        let url = format!("{}{}", self.config.base_url, endpoint);
        debug!(provider = %self.config.name, url = %url, ?params, "GET");

        let mut request = self.client.get(&url).query(params);
        if let Some(key) = &self.config.api_key {
            request = request.header("X-MBX-APIKEY", key.expose_secret());
        }

        let response = request.send().await?;
        self.handle_response(response).await
    }

    async fn handle_response<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> ProviderResult<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::ConnectionError(e.to_string()))?;

        if status.is_success() {
            return serde_json::from_str(&body).map_err(|e| {
                warn!(provider = %self.config.name, error = %e, "Failed to parse response");
                ProviderError::MalformedResponse(e.to_string())
            });
        }

        let vendor = serde_json::from_str::<VendorError>(&body).ok();
        Err(map_status(status, vendor, body))
    }

    async fn fetch_page(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> ProviderResult<Vec<Bar>> {
        let mut params = vec![
            ("symbol", symbol.to_string()),
            ("interval", timeframe.to_binance_interval().to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(start) = start {
            params.push(("startTime", start.timestamp_millis().to_string()));
        }
        if let Some(end) = end {
            params.push(("endTime", end.timestamp_millis().to_string()));
        }

        let raw: Vec<RawKline> = self.public_get("/api/v3/klines", &params).await?;
        raw.into_iter().map(RawKline::into_bar).collect()
    }

    /// 구간을 시작 시각부터 앞으로 페이지 단위로 조회합니다.
    async fn fetch_forward(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        wanted: usize,
    ) -> ProviderResult<Vec<Bar>> {
        let mut bars = Vec::with_capacity(wanted.min(self.config.max_bars_per_request));
        let mut cursor = start;

        while bars.len() < wanted && cursor <= end {
            let limit = (wanted - bars.len()).min(PAGE_LIMIT);
            let page = self
                .fetch_page(symbol, timeframe, limit, Some(cursor), Some(end))
                .await?;
            let page_len = page.len();
            let Some(last) = page.last().map(|b| b.timestamp) else {
                break;
            };
            bars.extend(page);
            if page_len < limit {
                break;
            }
            cursor = last + timeframe.chrono_duration();
        }

        Ok(bars)
    }

    /// 최근 N개를 끝에서부터 뒤로 페이지 단위로 조회합니다.
    async fn fetch_backward(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        wanted: usize,
    ) -> ProviderResult<Vec<Bar>> {
        let mut bars: Vec<Bar> = Vec::with_capacity(wanted);
        let mut end: Option<DateTime<Utc>> = None;

        while bars.len() < wanted {
            let limit = (wanted - bars.len()).min(PAGE_LIMIT);
            let mut page = self.fetch_page(symbol, timeframe, limit, None, end).await?;
            let page_len = page.len();
            let Some(first) = page.first().map(|b| b.timestamp) else {
                break;
            };
            page.append(&mut bars);
            bars = page;
            if page_len < limit {
                break;
            }
            end = Some(first - chrono::Duration::milliseconds(1));
        }

        Ok(bars)
    }
}

/// HTTP 상태와 벤더 에러 코드를 에러 분류로 변환합니다.
fn map_status(status: StatusCode, vendor: Option<VendorError>, body: String) -> ProviderError {
    if let Some(err) = vendor {
        match err.code {
            -1003 => return ProviderError::RateLimited(err.msg),
            -1002 | -2014 | -2015 => return ProviderError::AuthError(err.msg),
            -1121 => return ProviderError::UnrecognizedSymbol(err.msg),
            _ => {}
        }
        return match status.as_u16() {
            429 | 418 => ProviderError::RateLimited(err.msg),
            401 | 403 => ProviderError::AuthError(err.msg),
            s if s >= 500 => ProviderError::ConnectionError(format!("{}: {}", s, err.msg)),
            _ => ProviderError::MalformedResponse(format!("vendor error {}: {}", err.code, err.msg)),
        };
    }

    match status.as_u16() {
        429 | 418 => ProviderError::RateLimited(format!("HTTP {}", status)),
        401 | 403 => ProviderError::AuthError(format!("HTTP {}", status)),
        s if s >= 500 => ProviderError::ConnectionError(format!("HTTP {}: {}", status, body)),
        _ => ProviderError::MalformedResponse(format!("HTTP {}: {}", status, body)),
    }
}

#[async_trait]
impl ProviderAdapter for PollingProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Polling
    }

    fn symbol_profile(&self) -> SymbolProfile {
        self.config.symbol_profile
    }

    async fn connect(&self) -> ProviderResult<()> {
        Ok(())
    }

    async fn disconnect(&self) -> ProviderResult<()> {
        Ok(())
    }

    async fn fetch_bars(
        &self,
        symbol: &QualifiedSymbol,
        timeframe: Timeframe,
        range: FetchRange,
    ) -> ProviderResult<Vec<Bar>> {
        let wanted = range
            .bar_count(timeframe)
            .min(self.config.max_bars_per_request);
        let code = symbol.code().replace('/', "");

        let bars = match range.bounds() {
            Some((start, end)) => {
                self.fetch_forward(&code, timeframe, start, end, wanted)
                    .await?
            }
            None => self.fetch_backward(&code, timeframe, wanted).await?,
        };

        debug!(
            provider = %self.config.name,
            symbol = %symbol,
            timeframe = %timeframe,
            bars = bars.len(),
            "Fetched bars"
        );
        Ok(bars)
    }

    async fn health_check(&self) -> bool {
        match self
            .public_get::<serde_json::Value>("/api/v3/ping", &[])
            .await
        {
            Ok(_) => true,
            Err(e) => {
                warn!(provider = %self.config.name, error = %e, "Health check failed");
                false
            }
        }
    }
}
