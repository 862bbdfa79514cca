//! 설정 파일 로드 통합 테스트.

use std::io::Write;

use trader_core::{AppConfig, L2Backend, ProviderKind, QualityTier, SymbolStyle, Timeframe};

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp file");
    file.write_all(contents.as_bytes()).expect("write config");
    file
}

#[test]
fn test_missing_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = AppConfig::load(dir.path().join("absent.toml")).unwrap();

    assert_eq!(config.server.port, 8000);
    assert_eq!(config.manager.default_tier, QualityTier::Production);
    assert!(config.providers.is_empty());
    assert!(config.validate().is_ok());
}

#[test]
fn test_load_providers_and_sections() {
    let file = write_config(
        r#"
[server]
port = 9100

[[providers]]
name = "tradingview"
kind = "streaming"
priority = 1
url = "wss://data.tradingview.com/socket.io/websocket?type=chart"
credential_env = "TV_SESSION_TOKEN"
requires_translation = true

[[providers]]
name = "binance"
kind = "polling"
priority = 2
url = "https://api.binance.com"
symbol_style = "bare"

[cache]
l2_backend = "redis"
min_quality_for_cache = 0.92

[sync]
hot_timeframes = ["1", "15", "1D"]
"#,
    );

    let config = AppConfig::load(file.path()).unwrap();
    assert_eq!(config.server.port, 9100);
    assert_eq!(config.providers.len(), 2);

    let tv = &config.providers[0];
    assert_eq!(tv.kind, ProviderKind::Streaming);
    assert!(tv.requires_translation);
    assert_eq!(tv.symbol_style, SymbolStyle::Prefixed);
    // 명시하지 않은 항목은 기본값
    assert_eq!(tv.max_reconnect_attempts, 5);

    let binance = &config.providers[1];
    assert_eq!(binance.kind, ProviderKind::Polling);
    assert_eq!(binance.symbol_style, SymbolStyle::Bare);

    assert_eq!(config.cache.l2_backend, L2Backend::Redis);
    assert_eq!(config.cache.min_quality_for_cache, 0.92);
    assert_eq!(
        config.sync.hot_timeframes,
        vec![Timeframe::M1, Timeframe::M15, Timeframe::D1]
    );
    assert!(config.validate().is_ok());
}

#[test]
fn test_invalid_weights_fail_validation() {
    let file = write_config(
        r#"
[quality.weights]
completeness = 0.9
"#,
    );

    let config = AppConfig::load(file.path()).unwrap();
    assert!(config.validate().is_err());
}
