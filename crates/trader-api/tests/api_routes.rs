//! HTTP handler tests driven through the router with `tower::ServiceExt::oneshot`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use rust_decimal_macros::dec;
use serde_json::Value;
use tower::ServiceExt;

use trader_api::{create_router, AppState};
use trader_core::{
    BackupConfig, Bar, CacheConfig, ManagerConfig, ProviderKind, QualifiedSymbol, SyncConfig,
    Timeframe,
};
use trader_data::{BackupManager, DataSourceManager, FileStore, SyncEngine, TieredCache};
use trader_exchange::{
    FetchRange, ProviderAdapter, ProviderError, ProviderResult, SymbolProfile,
};

/// Fills any requested range with flat bars, or fails every call.
struct RangeProvider {
    fail: bool,
}

#[async_trait]
impl ProviderAdapter for RangeProvider {
    fn name(&self) -> &str {
        "range"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Polling
    }

    fn symbol_profile(&self) -> SymbolProfile {
        SymbolProfile::default()
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
        if self.fail {
            return Err(ProviderError::ConnectionError("upstream down".to_string()));
        }
        let (start, _) = range.bounds().unwrap();
        Ok((0..range.bar_count(timeframe))
            .map(|i| {
                Bar::new(
                    start + timeframe.chrono_duration() * i as i32,
                    dec!(100),
                    dec!(101),
                    dec!(99),
                    dec!(100),
                    dec!(10),
                )
            })
            .collect())
    }

    async fn health_check(&self) -> bool {
        !self.fail
    }
}

struct Harness {
    app: Router,
    state: Arc<AppState>,
    _dirs: (tempfile::TempDir, tempfile::TempDir),
}

async fn harness(fail: bool) -> Harness {
    let cache_dir = tempfile::tempdir().unwrap();
    let backup_dir = tempfile::tempdir().unwrap();

    let cache_config = CacheConfig {
        l2_dir: cache_dir.path().to_string_lossy().into_owned(),
        ..CacheConfig::default()
    };
    let store = FileStore::open(cache_dir.path(), chrono::Duration::hours(1))
        .await
        .unwrap();
    let cache = Arc::new(TieredCache::new(cache_config, Arc::new(store)));

    let manager = DataSourceManager::builder(ManagerConfig::default())
        .cache(cache.clone())
        .provider(Arc::new(RangeProvider { fail }), 1)
        .build()
        .unwrap();

    let backup_config = BackupConfig {
        dir: backup_dir.path().to_string_lossy().into_owned(),
        schedule_enabled: false,
        ..BackupConfig::default()
    };
    let backups = Arc::new(
        BackupManager::open(backup_config.clone(), cache)
            .await
            .unwrap(),
    );
    let sync_config = SyncConfig {
        enabled: false,
        ..SyncConfig::default()
    };
    let sync = SyncEngine::new(sync_config, &backup_config, manager.clone(), backups);

    let state = Arc::new(AppState::new(manager, sync));
    let app = create_router(state.clone(), Duration::from_secs(10));
    Harness {
        app,
        state,
        _dirs: (cache_dir, backup_dir),
    }
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_klines_json_format() {
    let h = harness(false).await;
    let (status, body) = call(&h.app, "GET", "/klines?symbol=btcusdt&timeframe=15m&count=5", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["symbol"], "BINANCE:BTCUSDT");
    assert_eq!(body["timeframe"], "15");
    assert_eq!(body["count"], 5);
    assert_eq!(body["source"], "range");
    assert_eq!(body["cache_status"], "written");
    assert_eq!(body["data"].as_array().unwrap().len(), 5);
    assert_eq!(body["data"][0]["close"], 100.0);

    let (_, again) = call(&h.app, "GET", "/klines?symbol=btcusdt&timeframe=15m&count=5", None).await;
    assert_eq!(again["source"], "cache");
}

#[tokio::test]
async fn test_klines_simple_format_omits_metadata() {
    let h = harness(false).await;
    let (status, body) = call(
        &h.app,
        "GET",
        "/klines?symbol=BINANCE:ETHUSDT&timeframe=60&count=3&format=simple",
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 3);
    assert!(body.get("source").is_none());
    assert!(body.get("quality_score").is_none());
    assert!(body["data"][0]["datetime"].as_str().unwrap().ends_with('Z'));
}

#[tokio::test]
async fn test_klines_rejects_bad_parameters() {
    let h = harness(false).await;

    let (status, body) = call(&h.app, "GET", "/klines?symbol=BTCUSDT&count=0", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_INPUT");

    let (status, _) = call(&h.app, "GET", "/klines?symbol=BTCUSDT&quality=premium", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&h.app, "GET", "/klines?symbol=BTCUSDT&timeframe=7x", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_klines_exhausted_is_bad_gateway() {
    let h = harness(true).await;
    let (status, body) = call(&h.app, "GET", "/klines?symbol=BTCUSDT&count=10", None).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "ALL_SOURCES_EXHAUSTED");
    assert_eq!(body["details"]["attempts"], 1);
    assert!(body["timestamp"].is_i64());
}

#[tokio::test]
async fn test_batch_klines() {
    let h = harness(false).await;
    let (status, body) = call(
        &h.app,
        "GET",
        "/batch_klines?symbols=btcusdt,%20ethusdt&timeframe=15&count=4",
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
    assert_eq!(body["results"][1]["symbol"], "BINANCE:ETHUSDT");
    assert_eq!(body["results"][0]["status"], "success");
    assert_eq!(body["results"][0]["count"], 4);

    let many = (0..51).map(|i| format!("S{}", i)).collect::<Vec<_>>().join(",");
    let (status, _) = call(&h.app, "GET", &format!("/batch_klines?symbols={}", many), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_batch_klines_reports_per_symbol_failure() {
    let h = harness(true).await;
    let (status, body) = call(&h.app, "GET", "/batch_klines?symbols=BTCUSDT", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"][0]["status"], "failed");
    assert!(body["results"][0]["error"].is_string());
}

#[tokio::test]
async fn test_health_follows_initialization() {
    let h = harness(false).await;

    let (status, body) = call(&h.app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "unhealthy");

    h.state.mark_initialized();
    let (status, body) = call(&h.app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["components"]["cache"]["status"], "up");
    assert_eq!(body["components"]["providers"][0]["name"], "range");
}

#[tokio::test]
async fn test_stats_counts_requests() {
    let h = harness(false).await;
    call(&h.app, "GET", "/klines?symbol=BTCUSDT&count=2", None).await;
    call(&h.app, "GET", "/klines?symbol=BTCUSDT&count=2", None).await;

    let (status, body) = call(&h.app, "GET", "/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stats"]["total_requests"], 2);
    assert_eq!(body["stats"]["cache_hits"], 1);
    assert_eq!(body["cache"]["l1_len"], 1);
}

#[tokio::test]
async fn test_backup_endpoints() {
    let h = harness(false).await;
    call(&h.app, "GET", "/klines?symbol=BTCUSDT&count=8", None).await;

    let (status, manifest) = call(
        &h.app,
        "POST",
        "/backups",
        Some(serde_json::json!({ "backup_type": "full" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(manifest["bar_count"], 8);
    let id = manifest["backup_id"].as_str().unwrap().to_string();

    let (_, list) = call(&h.app, "GET", "/backups", None).await;
    assert_eq!(list["total"], 1);

    let (status, verify) = call(&h.app, "GET", &format!("/backups/{}/verify", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(verify["valid"], true);

    let (status, report) = call(&h.app, "POST", &format!("/backups/{}/restore", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["series_restored"], 1);

    let (status, body) = call(&h.app, "POST", "/backups/missing/restore", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "BACKUP_NOT_FOUND");

    let (status, _) = call(
        &h.app,
        "POST",
        "/backups",
        Some(serde_json::json!({ "backup_type": "weekly" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_sync_task_submission() {
    let h = harness(false).await;

    let (status, body) = call(
        &h.app,
        "POST",
        "/sync/tasks",
        Some(serde_json::json!({
            "source_type": "primary",
            "target_type": "cache",
            "symbols": ["BINANCE:BTCUSDT"],
            "timeframes": ["15"],
            "priority": 2
        })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let task_id = body["task_id"].as_str().unwrap().to_string();

    let (status, task) = call(&h.app, "GET", &format!("/sync/tasks/{}", task_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(task["state"], "pending");
    assert_eq!(task["priority"], 2);

    let (_, sync_status) = call(&h.app, "GET", "/sync/status", None).await;
    assert_eq!(sync_status["queue_length"], 1);

    let (status, _) = call(
        &h.app,
        "POST",
        "/sync/tasks",
        Some(serde_json::json!({ "source_type": "cache", "target_type": "primary" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&h.app, "GET", "/sync/tasks/unknown", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
