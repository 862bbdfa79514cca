//! WebSocket 스트리밍 제공자.
//!
//! 연결 하나를 공유하고, 조회마다 별도의 차트 세션을 엽니다:
//!
//! ```text
//! set_auth_token ─> chart_create_session ─> resolve_symbol ─> create_series
//!                                   timescale_update* ─> series_completed
//! ```
//!
//! 연결이 끊긴 뒤의 다음 조회는 지수 백오프로 재연결합니다.

pub mod protocol;
mod session;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio_tungstenite::connect_async;
use tracing::{debug, info, warn};
use trader_core::{Bar, ProviderConfig, ProviderKind, QualifiedSymbol, SymbolStyle, Timeframe};

use self::session::Connection;
use crate::traits::{FetchRange, ProviderAdapter, SymbolProfile};
use crate::{ProviderError, ProviderResult};

// ============================================================================
// 설정
// ============================================================================

/// 스트리밍 제공자 설정.
///
/// `Debug` 구현은 인증 토큰을 출력하지 않습니다.
#[derive(Clone)]
pub struct StreamingConfig {
    /// 제공자 이름
    pub name: String,
    /// WebSocket URL
    pub url: String,
    /// 인증 토큰. 없으면 익명 토큰 사용
    pub auth_token: Option<SecretString>,
    /// 조회 타임아웃 (연결 시간 포함)
    pub timeout: Duration,
    /// 최대 재연결 시도 횟수
    pub max_reconnect_attempts: u32,
    /// 재연결 기본 지연 (시도마다 2배)
    pub reconnect_base_delay: Duration,
    /// 심볼 형식
    pub symbol_profile: SymbolProfile,
    /// 조회당 최대 봉 개수
    pub max_bars_per_request: usize,
    /// reader → dispatcher 채널 용량
    pub channel_capacity: usize,
}

impl fmt::Debug for StreamingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingConfig")
            .field("name", &self.name)
            .field("url", &self.url)
            .field(
                "auth_token",
                &self.auth_token.as_ref().map(|_| "***REDACTED***"),
            )
            .field("timeout", &self.timeout)
            .field("max_reconnect_attempts", &self.max_reconnect_attempts)
            .field("reconnect_base_delay", &self.reconnect_base_delay)
            .finish()
    }
}

impl StreamingConfig {
    /// 기본값으로 생성합니다.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            auth_token: None,
            timeout: Duration::from_secs(30),
            max_reconnect_attempts: 5,
            reconnect_base_delay: Duration::from_millis(500),
            symbol_profile: SymbolProfile {
                style: SymbolStyle::Prefixed,
                requires_translation: true,
            },
            max_bars_per_request: 5000,
            channel_capacity: 256,
        }
    }

    /// 조회 타임아웃을 설정합니다.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// 재연결 정책을 설정합니다.
    pub fn with_reconnect(mut self, attempts: u32, base_delay: Duration) -> Self {
        self.max_reconnect_attempts = attempts;
        self.reconnect_base_delay = base_delay;
        self
    }

    /// 애플리케이션 설정에서 생성합니다. 토큰은 환경 변수에서 읽습니다.
    pub fn from_provider_config(config: &ProviderConfig) -> Self {
        Self {
            name: config.name.clone(),
            url: config.url.clone(),
            auth_token: config.read_credential().map(SecretString::from),
            timeout: Duration::from_secs(config.timeout_secs),
            max_reconnect_attempts: config.max_reconnect_attempts,
            reconnect_base_delay: Duration::from_millis(config.reconnect_base_delay_ms),
            symbol_profile: SymbolProfile {
                style: config.symbol_style,
                requires_translation: config.requires_translation,
            },
            max_bars_per_request: config.max_bars_per_request.max(1),
            channel_capacity: 256,
        }
    }
}

// ============================================================================
// 제공자
// ============================================================================

/// WebSocket 스트리밍 제공자.
pub struct StreamingProvider {
    config: StreamingConfig,
    connection: Mutex<Option<Arc<Connection>>>,
}

impl StreamingProvider {
    /// 새 제공자를 생성합니다. 연결은 첫 조회 때 수립됩니다.
    pub fn new(config: StreamingConfig) -> Self {
        Self {
            config,
            connection: Mutex::new(None),
        }
    }

    /// 제공자 설정.
    pub fn config(&self) -> &StreamingConfig {
        &self.config
    }

    /// 살아 있는 연결을 반환하거나 새로 연결합니다.
    async fn ensure_connected(&self) -> ProviderResult<Arc<Connection>> {
        let mut guard = self.connection.lock().await;
        if let Some(conn) = guard.as_ref() {
            if conn.is_alive() {
                return Ok(conn.clone());
            }
            info!(provider = %self.config.name, "Streaming connection lost, reconnecting");
        }
        *guard = None;

        let conn = Arc::new(self.connect_with_backoff().await?);
        *guard = Some(conn.clone());
        Ok(conn)
    }

    async fn connect_with_backoff(&self) -> ProviderResult<Connection> {
        let mut attempt: u32 = 0;
        loop {
            match self.connect_once().await {
                Ok(conn) => return Ok(conn),
                Err(e) if e.is_auth_error() => return Err(e),
                Err(e) => {
                    if attempt >= self.config.max_reconnect_attempts {
                        warn!(
                            provider = %self.config.name,
                            attempts = attempt + 1,
                            error = %e,
                            "Maximum reconnect attempts exceeded"
                        );
                        return Err(e);
                    }
                    let delay = self
                        .config
                        .reconnect_base_delay
                        .saturating_mul(2u32.saturating_pow(attempt));
                    warn!(
                        provider = %self.config.name,
                        attempt = attempt + 1,
                        max_attempts = self.config.max_reconnect_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Connect failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn connect_once(&self) -> ProviderResult<Connection> {
        info!(provider = %self.config.name, url = %self.config.url, "Connecting");

        let (ws, _) = tokio::time::timeout(self.config.timeout, connect_async(self.config.url.as_str()))
            .await
            .map_err(|_| ProviderError::Timeout(format!("connect to {}", self.config.url)))??;

        let conn = Connection::spawn(&self.config.name, ws, self.config.channel_capacity);
        let token = self
            .config
            .auth_token
            .as_ref()
            .map(|t| t.expose_secret().to_string())
            .unwrap_or_else(|| protocol::ANONYMOUS_TOKEN.to_string());
        conn.send("set_auth_token", vec![json!(token)]).await?;

        info!(provider = %self.config.name, "Streaming connection established");
        Ok(conn)
    }

    fn new_session_id() -> String {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(12)
            .map(|c| char::from(c).to_ascii_lowercase())
            .collect();
        format!("cs_{}", suffix)
    }

    /// 서버는 최근 N개 봉을 돌려주므로 구간 조회는 현재까지의 봉 수를 요청합니다.
    fn requested_count(&self, timeframe: Timeframe, range: FetchRange) -> usize {
        let count = match range {
            FetchRange::Count(n) => n.max(1),
            FetchRange::Range { start, end } => FetchRange::Range {
                start,
                end: end.max(Utc::now()),
            }
            .bar_count(timeframe),
        };
        count.min(self.config.max_bars_per_request)
    }

    async fn run_session(
        &self,
        conn: &Connection,
        session: &str,
        symbol: &QualifiedSymbol,
        timeframe: Timeframe,
        count: usize,
    ) -> ProviderResult<Vec<Bar>> {
        let rx = conn.register(session)?;

        let symbol_init = json!({ "symbol": symbol.as_str(), "adjustment": "splits" });
        let messages: [(&str, Vec<Value>); 3] = [
            ("chart_create_session", vec![json!(session), json!("")]),
            (
                "resolve_symbol",
                vec![
                    json!(session),
                    json!("ser_1"),
                    json!(format!("={}", symbol_init)),
                ],
            ),
            (
                "create_series",
                vec![
                    json!(session),
                    json!("$prices"),
                    json!("s1"),
                    json!("ser_1"),
                    json!(timeframe.as_str()),
                    json!(count),
                ],
            ),
        ];
        for (method, params) in messages {
            conn.send(method, params).await?;
        }

        rx.await.map_err(|_| {
            ProviderError::ConnectionError("session dropped before completion".to_string())
        })?
    }
}

#[async_trait]
impl ProviderAdapter for StreamingProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Streaming
    }

    fn symbol_profile(&self) -> SymbolProfile {
        self.config.symbol_profile
    }

    async fn connect(&self) -> ProviderResult<()> {
        self.ensure_connected().await.map(|_| ())
    }

    async fn disconnect(&self) -> ProviderResult<()> {
        let conn = self.connection.lock().await.take();
        if let Some(conn) = conn {
            conn.close().await;
        }
        Ok(())
    }

    async fn fetch_bars(
        &self,
        symbol: &QualifiedSymbol,
        timeframe: Timeframe,
        range: FetchRange,
    ) -> ProviderResult<Vec<Bar>> {
        let count = self.requested_count(timeframe, range);
        let session = Self::new_session_id();

        let work = async {
            let conn = self.ensure_connected().await?;
            let result = self
                .run_session(&conn, &session, symbol, timeframe, count)
                .await;
            conn.forget(&session);
            if conn.is_alive() {
                let _ = conn
                    .send("chart_delete_session", vec![json!(session)])
                    .await;
            }
            result
        };

        let bars = match tokio::time::timeout(self.config.timeout, work).await {
            Ok(result) => result?,
            Err(_) => {
                // 시간 초과된 세션 정리
                if let Some(conn) = self.connection.lock().await.as_ref() {
                    conn.forget(&session);
                }
                return Err(ProviderError::Timeout(format!(
                    "{} {} after {:?}",
                    symbol, timeframe, self.config.timeout
                )));
            }
        };

        debug!(
            provider = %self.config.name,
            symbol = %symbol,
            timeframe = %timeframe,
            session = %session,
            bars = bars.len(),
            "Fetched bars"
        );
        Ok(bars)
    }

    async fn health_check(&self) -> bool {
        match self.ensure_connected().await {
            Ok(conn) => conn.is_alive(),
            Err(e) => {
                warn!(provider = %self.config.name, error = %e, "Health check failed");
                false
            }
        }
    }
}
