//! WebSocket 스트리밍 제공자 통합 테스트.
//!
//! 로컬 tokio-tungstenite 서버가 차트 세션 프로토콜을 흉내 냅니다.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use trader_core::{AssetClass, QualifiedSymbol, Timeframe};
use trader_exchange::streaming::protocol::{decode_frames, encode_frame, encode_message, Packet};
use trader_exchange::{
    FetchRange, ProviderAdapter, ProviderError, StreamingConfig, StreamingProvider,
};

#[derive(Clone, Copy, PartialEq)]
enum Behavior {
    /// 정상 응답
    Serve,
    /// 첫 연결은 create_series 수신 시 끊음
    DropFirst,
    /// 응답하지 않음
    Silent,
}

#[derive(Default)]
struct ServerState {
    connections: AtomicUsize,
    heartbeats_echoed: AtomicUsize,
    auth_tokens: Mutex<Vec<String>>,
    series_requests: Mutex<Vec<Vec<Value>>>,
}

fn bars_update(session: &str) -> String {
    encode_message(
        "timescale_update",
        vec![
            json!(session),
            json!({
                "$prices": {
                    "s": [
                        {"i": 0, "v": [1735776000.0, 1500.0, 1520.0, 1490.0, 1510.0, 1000.0]},
                        {"i": 1, "v": [1736121600.0, 1510.0, 1530.0, 1505.0, 1525.0, 1100.0]},
                        {"i": 2, "v": [1736208000.0, 1525.0, 1540.0, 1515.0, 1535.0, 900.0]}
                    ]
                }
            }),
        ],
    )
}

async fn spawn_server(behavior: Behavior) -> (String, Arc<ServerState>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let state = Arc::new(ServerState::default());

    let server_state = state.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let index = server_state.connections.fetch_add(1, Ordering::SeqCst);
            let state = server_state.clone();
            tokio::spawn(async move {
                let ws = accept_async(stream).await.unwrap();
                let (mut write, mut read) = ws.split();
                write
                    .send(Message::Text(encode_frame("~h~1")))
                    .await
                    .unwrap();

                while let Some(Ok(message)) = read.next().await {
                    let Message::Text(text) = message else { continue };
                    for packet in decode_frames(&text) {
                        match packet {
                            Packet::Heartbeat(payload) if payload == "~h~1" => {
                                state.heartbeats_echoed.fetch_add(1, Ordering::SeqCst);
                            }
                            Packet::Message { method, params } => match method.as_str() {
                                "set_auth_token" => {
                                    let token = params[0].as_str().unwrap_or_default().to_string();
                                    state.auth_tokens.lock().unwrap().push(token);
                                }
                                "resolve_symbol" => {
                                    let session = params[0].as_str().unwrap().to_string();
                                    let init = params[2].as_str().unwrap_or_default();
                                    if init.contains("BAD") {
                                        let reply = encode_message(
                                            "symbol_error",
                                            vec![json!(session), json!("ser_1"), json!("invalid symbol")],
                                        );
                                        write.send(Message::Text(reply)).await.unwrap();
                                    }
                                }
                                "create_series" => {
                                    state.series_requests.lock().unwrap().push(params.clone());
                                    let session = params[0].as_str().unwrap().to_string();
                                    match behavior {
                                        Behavior::DropFirst if index == 0 => return,
                                        Behavior::Silent => continue,
                                        _ => {}
                                    }
                                    write
                                        .send(Message::Text(bars_update(&session)))
                                        .await
                                        .unwrap();
                                    let done = encode_message(
                                        "series_completed",
                                        vec![json!(session), json!("s1")],
                                    );
                                    write.send(Message::Text(done)).await.unwrap();
                                }
                                _ => {}
                            },
                            _ => {}
                        }
                    }
                }
            });
        }
    });

    (url, state)
}

fn provider(url: &str, timeout: Duration) -> StreamingProvider {
    StreamingProvider::new(
        StreamingConfig::new("tradingview", url)
            .with_timeout(timeout)
            .with_reconnect(2, Duration::from_millis(10)),
    )
}

fn moutai() -> QualifiedSymbol {
    QualifiedSymbol::new("SSE:600519", AssetClass::ChinaEquity)
}

/// 세션 생성부터 series_completed까지 봉을 모아 반환.
#[tokio::test]
async fn test_fetch_completes_session() {
    let (url, state) = spawn_server(Behavior::Serve).await;
    let provider = provider(&url, Duration::from_secs(5));

    let bars = provider
        .fetch_bars(&moutai(), Timeframe::D1, FetchRange::Count(3))
        .await
        .unwrap();

    assert_eq!(bars.len(), 3);
    assert_eq!(bars[0].timestamp.timestamp(), 1_735_776_000);

    // 익명 토큰으로 인증
    assert_eq!(
        *state.auth_tokens.lock().unwrap(),
        vec!["unauthorized_user_token".to_string()]
    );
    // 벤더 타임프레임 문자열과 봉 개수 전달
    let requests = state.series_requests.lock().unwrap();
    assert_eq!(requests[0][4], json!("1D"));
    assert_eq!(requests[0][5], json!(3));
}

/// 하트비트는 그대로 되돌려 보냄.
#[tokio::test]
async fn test_heartbeat_echoed() {
    let (url, state) = spawn_server(Behavior::Serve).await;
    let provider = provider(&url, Duration::from_secs(5));

    provider.connect().await.unwrap();
    for _ in 0..50 {
        if state.heartbeats_echoed.load(Ordering::SeqCst) > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(state.heartbeats_echoed.load(Ordering::SeqCst), 1);
    provider.disconnect().await.unwrap();
}

/// 동시 조회는 연결 하나를 공유.
#[tokio::test]
async fn test_concurrent_fetches_share_connection() {
    let (url, state) = spawn_server(Behavior::Serve).await;
    let provider = Arc::new(provider(&url, Duration::from_secs(5)));
    provider.connect().await.unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let provider = provider.clone();
            tokio::spawn(async move {
                provider
                    .fetch_bars(&moutai(), Timeframe::D1, FetchRange::Count(3))
                    .await
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap().len(), 3);
    }
    assert_eq!(state.connections.load(Ordering::SeqCst), 1);
}

/// 연결이 끊기면 대기 중인 조회는 ConnectionError, 다음 조회는 재연결.
#[tokio::test]
async fn test_drop_fails_pending_then_reconnects() {
    let (url, state) = spawn_server(Behavior::DropFirst).await;
    let provider = provider(&url, Duration::from_secs(5));

    let err = provider
        .fetch_bars(&moutai(), Timeframe::D1, FetchRange::Count(3))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::ConnectionError(_)), "{:?}", err);

    let bars = provider
        .fetch_bars(&moutai(), Timeframe::D1, FetchRange::Count(3))
        .await
        .unwrap();
    assert_eq!(bars.len(), 3);
    assert_eq!(state.connections.load(Ordering::SeqCst), 2);
}

/// 응답이 없으면 조회 기한 초과.
#[tokio::test]
async fn test_fetch_deadline() {
    let (url, _state) = spawn_server(Behavior::Silent).await;
    let provider = provider(&url, Duration::from_millis(200));

    let err = provider
        .fetch_bars(&moutai(), Timeframe::D1, FetchRange::Count(3))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Timeout(_)));
}

/// symbol_error는 해당 세션만 실패.
#[tokio::test]
async fn test_symbol_error() {
    let (url, _state) = spawn_server(Behavior::Serve).await;
    let provider = provider(&url, Duration::from_secs(5));

    let bad = QualifiedSymbol::new("SSE:BAD", AssetClass::ChinaEquity);
    let err = provider
        .fetch_bars(&bad, Timeframe::D1, FetchRange::Count(3))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::MalformedResponse(_)));
}

/// 서버에 연결할 수 없으면 재시도 후 ConnectionError.
#[tokio::test]
async fn test_unreachable_server() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    drop(listener);

    let provider = provider(&url, Duration::from_secs(5));
    let err = provider.connect().await.unwrap_err();
    assert!(matches!(err, ProviderError::ConnectionError(_)));
    assert!(!provider.health_check().await);
}
