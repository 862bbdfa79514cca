//! 설정 관리.
//!
//! 애플리케이션 설정을 정의하고 로드합니다. 로드 순서는
//! 기본값 → TOML 파일 → 환경 변수(`TRADER__SECTION__KEY`)입니다.
//! 모든 섹션은 `Default`를 구현하므로 파일에 없는 항목은 기본값을 사용합니다.
//! 생성 이후 설정은 변경되지 않습니다.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

use crate::error::{TraderError, TraderResult};
use crate::logging::{LogConfig, LogFormat};
use crate::types::Timeframe;

/// 애플리케이션 설정.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// 서버 설정
    pub server: ServerConfig,
    /// 로깅 설정
    pub logging: LoggingConfig,
    /// 업스트림 제공자 목록 (priority 오름차순으로 시도)
    pub providers: Vec<ProviderConfig>,
    /// 제공자 상태(쿨다운) 설정
    pub health: ProviderHealthConfig,
    /// 품질 평가 설정
    pub quality: QualityConfig,
    /// 캐시 설정
    pub cache: CacheConfig,
    /// 데이터 소스 매니저 설정
    pub manager: ManagerConfig,
    /// 동기화 설정
    pub sync: SyncConfig,
    /// 백업 설정
    pub backup: BackupConfig,
}

// =============================================================================
// 서버 / 로깅
// =============================================================================

/// 서버 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 바인딩할 호스트
    pub host: String,
    /// 리스닝할 포트
    pub port: u16,
    /// 요청 타임아웃 (초)
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            request_timeout_secs: 60,
        }
    }
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 로그 레벨
    pub level: String,
    /// 로그 형식 (pretty, json, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl LoggingConfig {
    /// 로깅 초기화용 설정으로 변환합니다. 알 수 없는 형식은 pretty로 대체합니다.
    pub fn to_log_config(&self) -> LogConfig {
        let format = LogFormat::from_str(&self.format).unwrap_or_default();
        LogConfig::new(self.level.clone()).with_format(format)
    }
}

// =============================================================================
// 제공자
// =============================================================================

/// 제공자 연결 방식.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// 상태 유지 WebSocket 세션
    Streaming,
    /// 상태 없는 HTTP 요청/응답
    Polling,
}

/// 벤더가 기대하는 심볼 표기.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolStyle {
    /// `EXCHANGE:CODE`
    #[default]
    Prefixed,
    /// 접두어 없는 코드 (예: `BTCUSDT`)
    Bare,
}

/// 업스트림 제공자 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    /// 제공자 이름 (로그와 통계의 식별자)
    pub name: String,
    /// 연결 방식
    pub kind: ProviderKind,
    /// 우선순위 (낮을수록 먼저 시도)
    #[serde(default = "default_priority")]
    pub priority: u32,
    /// 활성화 여부
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// 엔드포인트 URL (ws:// 또는 http://)
    pub url: String,
    /// 자격증명을 담고 있는 환경 변수 이름
    #[serde(default)]
    pub credential_env: Option<String>,
    /// 요청 타임아웃 (초)
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
    /// 요청 간 최소 간격 (밀리초, polling 전용)
    #[serde(default = "default_min_request_interval")]
    pub min_request_interval_ms: u64,
    /// 최대 재연결 시도 횟수 (streaming 전용)
    #[serde(default = "default_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// 재연결 기본 지연 (밀리초, 시도마다 2배)
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_base_delay_ms: u64,
    /// 심볼 변환 규칙 미일치 시 실패 처리 여부
    #[serde(default)]
    pub requires_translation: bool,
    /// 심볼 표기 방식
    #[serde(default)]
    pub symbol_style: SymbolStyle,
    /// 요청당 최대 봉 개수
    #[serde(default = "default_max_bars")]
    pub max_bars_per_request: usize,
}

fn default_priority() -> u32 {
    100
}
fn default_true() -> bool {
    true
}
fn default_provider_timeout() -> u64 {
    30
}
fn default_min_request_interval() -> u64 {
    100
}
fn default_reconnect_attempts() -> u32 {
    5
}
fn default_reconnect_delay() -> u64 {
    500
}
fn default_max_bars() -> usize {
    5000
}

impl ProviderConfig {
    /// 기본값으로 새 제공자 설정을 생성합니다.
    pub fn new(name: impl Into<String>, kind: ProviderKind, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            priority: default_priority(),
            enabled: true,
            url: url.into(),
            credential_env: None,
            timeout_secs: default_provider_timeout(),
            min_request_interval_ms: default_min_request_interval(),
            max_reconnect_attempts: default_reconnect_attempts(),
            reconnect_base_delay_ms: default_reconnect_delay(),
            requires_translation: false,
            symbol_style: SymbolStyle::default(),
            max_bars_per_request: default_max_bars(),
        }
    }

    /// 우선순위를 설정합니다.
    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// 심볼 표기 방식을 설정합니다.
    pub fn with_symbol_style(mut self, style: SymbolStyle) -> Self {
        self.symbol_style = style;
        self
    }

    /// 환경 변수에서 자격증명을 읽습니다. 변수가 없으면 `None`.
    pub fn read_credential(&self) -> Option<String> {
        self.credential_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|v| !v.is_empty())
    }
}

/// 제공자 상태(쿨다운) 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProviderHealthConfig {
    /// 연속 전송 실패 임계치
    pub failure_threshold: u32,
    /// 연속 품질 거부 임계치
    pub rejection_threshold: u32,
    /// 쿨다운 시간 (초)
    pub cooldown_secs: u64,
}

impl Default for ProviderHealthConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            rejection_threshold: 3,
            cooldown_secs: 60,
        }
    }
}

impl ProviderHealthConfig {
    /// 보수적인 설정 (낮은 임계치, 긴 쿨다운).
    pub fn conservative() -> Self {
        Self {
            failure_threshold: 2,
            rejection_threshold: 2,
            cooldown_secs: 300,
        }
    }

    /// 공격적인 설정 (높은 임계치, 짧은 쿨다운).
    pub fn aggressive() -> Self {
        Self {
            failure_threshold: 10,
            rejection_threshold: 5,
            cooldown_secs: 10,
        }
    }
}

// =============================================================================
// 품질
// =============================================================================

/// 품질 요구 등급.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    /// 개발용 (≥ 0.90)
    Development,
    /// 운영용 (≥ 0.95)
    #[default]
    Production,
    /// 금융 등급 (≥ 0.98)
    Financial,
}

impl FromStr for QualityTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" => Ok(Self::Development),
            "production" => Ok(Self::Production),
            "financial" => Ok(Self::Financial),
            _ => Err(format!(
                "Unknown quality tier: {} (expected development, production, financial)",
                s
            )),
        }
    }
}

impl std::fmt::Display for QualityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QualityTier::Development => write!(f, "development"),
            QualityTier::Production => write!(f, "production"),
            QualityTier::Financial => write!(f, "financial"),
        }
    }
}

/// 품질 차원별 가중치. 합이 1이어야 합니다.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QualityWeights {
    pub completeness: f64,
    pub accuracy: f64,
    pub consistency: f64,
    pub timeliness: f64,
    pub validity: f64,
    pub uniqueness: f64,
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            completeness: 0.25,
            accuracy: 0.25,
            consistency: 0.20,
            timeliness: 0.15,
            validity: 0.10,
            uniqueness: 0.05,
        }
    }
}

impl QualityWeights {
    /// 가중치 합계.
    pub fn sum(&self) -> f64 {
        self.completeness
            + self.accuracy
            + self.consistency
            + self.timeliness
            + self.validity
            + self.uniqueness
    }

    /// 합이 1인지, 음수가 없는지 검사합니다.
    pub fn validate(&self) -> TraderResult<()> {
        let all = [
            self.completeness,
            self.accuracy,
            self.consistency,
            self.timeliness,
            self.validity,
            self.uniqueness,
        ];
        if all.iter().any(|w| *w < 0.0 || !w.is_finite()) {
            return Err(TraderError::Config(
                "quality weights must be finite and non-negative".to_string(),
            ));
        }
        if (self.sum() - 1.0).abs() > 1e-6 {
            return Err(TraderError::Config(format!(
                "quality weights must sum to 1.0, got {:.6}",
                self.sum()
            )));
        }
        Ok(())
    }
}

/// 등급별 통과 임계치.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TierThresholds {
    pub development: f64,
    pub production: f64,
    pub financial: f64,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            development: 0.90,
            production: 0.95,
            financial: 0.98,
        }
    }
}

impl TierThresholds {
    /// 등급의 임계치를 반환합니다.
    pub fn get(&self, tier: QualityTier) -> f64 {
        match tier {
            QualityTier::Development => self.development,
            QualityTier::Production => self.production,
            QualityTier::Financial => self.financial,
        }
    }
}

/// 품질 평가 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QualityConfig {
    /// 차원별 가중치
    pub weights: QualityWeights,
    /// 등급별 임계치
    pub thresholds: TierThresholds,
    /// 인접 봉 시가/전 종가 허용 편차 (비율)
    pub consistency_tolerance: f64,
    /// 지연 허용 봉 수 (이하이면 적시성 1.0)
    pub timeliness_allowance_bars: f64,
    /// 적시성이 0이 되기까지의 추가 지연 봉 수
    pub timeliness_window_bars: f64,
    /// 거래량 이상치 판단 배수 (중앙값 대비)
    pub volume_spike_factor: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            weights: QualityWeights::default(),
            thresholds: TierThresholds::default(),
            consistency_tolerance: 0.20,
            timeliness_allowance_bars: 2.0,
            timeliness_window_bars: 20.0,
            volume_spike_factor: 5.0,
        }
    }
}

// =============================================================================
// 캐시
// =============================================================================

/// L2 저장소 종류.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum L2Backend {
    /// 디렉터리 기반 JSON 파일
    #[default]
    File,
    /// Redis
    Redis,
}

/// 캐시 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// 캐시 사용 여부
    pub enabled: bool,
    /// L1 최대 항목 수
    pub l1_capacity: usize,
    /// 고정 TTL (초). 없으면 타임프레임 기반
    pub ttl_secs: Option<u64>,
    /// 타임프레임 기반 TTL 하한 (초)
    pub min_ttl_secs: u64,
    /// 타임프레임 기반 TTL 상한 (초)
    pub max_ttl_secs: u64,
    /// 캐시에 쓰기 위한 최소 품질 점수
    pub min_quality_for_cache: f64,
    /// L2 저장소 종류
    pub l2_backend: L2Backend,
    /// 파일 저장소 디렉터리
    pub l2_dir: String,
    /// Redis URL
    pub redis_url: String,
    /// L2 I/O 타임아웃 (밀리초)
    pub l2_timeout_ms: u64,
    /// 만료 후 물리 삭제까지의 유예 (초)
    pub l2_grace_secs: u64,
    /// 만료 항목 정리 주기 (초)
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            l1_capacity: 1024,
            ttl_secs: None,
            min_ttl_secs: 60,
            max_ttl_secs: 86_400,
            min_quality_for_cache: 0.90,
            l2_backend: L2Backend::File,
            l2_dir: "data/cache".to_string(),
            redis_url: "redis://localhost:6379/0".to_string(),
            l2_timeout_ms: 2_000,
            l2_grace_secs: 86_400,
            sweep_interval_secs: 600,
        }
    }
}

impl CacheConfig {
    /// 타임프레임에 맞는 TTL(초)을 반환합니다.
    ///
    /// 고정 TTL이 없으면 봉 하나의 길이를 하한/상한으로 자릅니다.
    pub fn ttl_for(&self, timeframe: Timeframe) -> u64 {
        self.ttl_secs.unwrap_or_else(|| {
            timeframe
                .as_secs()
                .clamp(self.min_ttl_secs, self.max_ttl_secs.max(self.min_ttl_secs))
        })
    }
}

/// 데이터 소스 매니저 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// 동시 업스트림 조회 수
    pub max_concurrent_fetches: usize,
    /// 제공자 조회 타임아웃 (초)
    pub fetch_timeout_secs: u64,
    /// 요청에 등급이 없을 때 사용할 기본 등급
    pub default_tier: QualityTier,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: 8,
            fetch_timeout_secs: 30,
            default_tier: QualityTier::Production,
        }
    }
}

// =============================================================================
// 동기화 / 백업
// =============================================================================

/// 동기화 엔진 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SyncConfig {
    /// 주기 동기화 활성화 여부
    pub enabled: bool,
    /// 주기 동기화 간격 (초)
    pub sync_interval_secs: u64,
    /// 동시 실행 태스크 수
    pub max_concurrent_tasks: usize,
    /// 태스크 최대 재시도 횟수
    pub max_retries: u32,
    /// 재시도 기본 지연 (밀리초, 2^n 배)
    pub retry_base_delay_ms: u64,
    /// 동기화 시 심볼/타임프레임당 조회할 봉 수
    pub batch_size: usize,
    /// 주기 동기화 대상 심볼
    pub hot_symbols: Vec<String>,
    /// 주기 동기화 대상 타임프레임
    pub hot_timeframes: Vec<Timeframe>,
    /// 조회용으로 보관할 종료 태스크 수 (초과분은 오래된 순으로 제거)
    pub task_retention: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sync_interval_secs: 300,
            max_concurrent_tasks: 5,
            max_retries: 3,
            retry_base_delay_ms: 1_000,
            batch_size: 100,
            hot_symbols: vec!["BINANCE:BTCUSDT".to_string(), "BINANCE:ETHUSDT".to_string()],
            hot_timeframes: vec![Timeframe::M1, Timeframe::M5, Timeframe::M15, Timeframe::H1],
            task_retention: 500,
        }
    }
}

/// 백업 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackupConfig {
    /// 백업 디렉터리
    pub dir: String,
    /// 스케줄 실행 여부
    pub schedule_enabled: bool,
    /// 전체 백업 시각 (UTC 시)
    pub full_backup_hour: u32,
    /// 증분 백업 간격 (분)
    pub incremental_interval_mins: u64,
    /// 스냅샷 시각 목록 (UTC 시)
    pub snapshot_hours: Vec<u32>,
    /// 나이/개수와 무관하게 항상 보존할 최근 백업 수
    pub keep_min_recent: usize,
    /// 최대 백업 파일 수
    pub max_backup_files: usize,
    /// 최대 보존 기간 (일)
    pub max_age_days: i64,
    /// 쓰기 재시도 횟수
    pub write_retries: u32,
    /// 쓰기 타임아웃 (초)
    pub write_timeout_secs: u64,
    /// 복원한 캐시 항목의 TTL (초)
    pub restore_ttl_secs: u64,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            dir: "data/backups".to_string(),
            schedule_enabled: true,
            full_backup_hour: 2,
            incremental_interval_mins: 30,
            snapshot_hours: vec![6, 12, 18],
            keep_min_recent: 5,
            max_backup_files: 30,
            max_age_days: 30,
            write_retries: 3,
            write_timeout_secs: 60,
            restore_ttl_secs: 3_600,
        }
    }
}

// =============================================================================
// 로드 / 검증
// =============================================================================

impl AppConfig {
    /// 파일과 환경 변수에서 설정을 로드합니다. 파일이 없으면 기본값을 사용합니다.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            // 파일에서 로드
            .add_source(config::File::from(path.as_ref()).required(false))
            // 환경 변수로 오버라이드
            .add_source(
                config::Environment::with_prefix("TRADER")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// 기본 경로에서 설정을 로드합니다.
    pub fn load_default() -> Result<Self, config::ConfigError> {
        Self::load("config/default.toml")
    }

    /// 설정 값의 일관성을 검사합니다.
    pub fn validate(&self) -> TraderResult<()> {
        self.quality.weights.validate()?;

        let thresholds = &self.quality.thresholds;
        for (name, value) in [
            ("development", thresholds.development),
            ("production", thresholds.production),
            ("financial", thresholds.financial),
            ("min_quality_for_cache", self.cache.min_quality_for_cache),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(TraderError::Config(format!(
                    "{} threshold must be within [0, 1], got {}",
                    name, value
                )));
            }
        }

        if self.cache.l1_capacity == 0 {
            return Err(TraderError::Config("cache.l1_capacity must be > 0".to_string()));
        }
        if self.manager.max_concurrent_fetches == 0 || self.sync.max_concurrent_tasks == 0 {
            return Err(TraderError::Config(
                "worker pool sizes must be > 0".to_string(),
            ));
        }
        if self.sync.task_retention == 0 {
            return Err(TraderError::Config("sync.task_retention must be > 0".to_string()));
        }
        if self.backup.full_backup_hour > 23 || self.backup.snapshot_hours.iter().any(|h| *h > 23)
        {
            return Err(TraderError::Config(
                "backup hours must be within 0..=23".to_string(),
            ));
        }

        let mut names: Vec<&str> = self.providers.iter().map(|p| p.name.as_str()).collect();
        names.sort_unstable();
        if names.windows(2).any(|w| w[0] == w[1]) {
            return Err(TraderError::Config("provider names must be unique".to_string()));
        }

        Ok(())
    }
}
