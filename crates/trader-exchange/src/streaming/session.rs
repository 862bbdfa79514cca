//! 공유 WebSocket 연결과 차트 세션 다중화.
//!
//! 연결 하나에 세 개의 태스크가 붙습니다:
//! - reader: 소켓에서 텍스트 프레임을 읽어 제한된 채널로 넘김
//! - dispatcher: 프레임을 디코딩해 하트비트를 되돌려 보내고 세션별 대기 조회로 전달
//! - writer: 송신 채널의 메시지를 소켓에 씀
//!
//! 연결이 끊기면 대기 중인 모든 조회는 `ConnectionError`로 실패합니다.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};
use trader_core::Bar;

use super::protocol::{self, Packet};
use crate::{ProviderError, ProviderResult};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// 세션별 대기 중인 조회.
struct PendingFetch {
    bars: Vec<Bar>,
    done: oneshot::Sender<ProviderResult<Vec<Bar>>>,
}

type PendingMap = Arc<Mutex<HashMap<String, PendingFetch>>>;

/// 살아 있는 연결 하나.
pub(crate) struct Connection {
    provider: String,
    outgoing: mpsc::Sender<Message>,
    pending: PendingMap,
    alive: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Connection {
    /// 연결된 소켓으로 태스크를 시작합니다.
    pub(crate) fn spawn(provider: &str, ws: WsStream, channel_capacity: usize) -> Self {
        let capacity = channel_capacity.max(1);
        let (mut sink, mut stream) = ws.split();
        let (outgoing, mut outgoing_rx) = mpsc::channel::<Message>(capacity);
        let (frames_tx, mut frames_rx) = mpsc::channel::<String>(capacity);
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let alive = Arc::new(AtomicBool::new(true));

        let writer = {
            let alive = alive.clone();
            let provider = provider.to_string();
            tokio::spawn(async move {
                while let Some(message) = outgoing_rx.recv().await {
                    let closing = matches!(message, Message::Close(_));
                    if let Err(e) = sink.send(message).await {
                        warn!(provider = %provider, error = %e, "WebSocket send failed");
                        break;
                    }
                    if closing {
                        break;
                    }
                }
                alive.store(false, Ordering::SeqCst);
            })
        };

        let reader = {
            let alive = alive.clone();
            let outgoing = outgoing.clone();
            let provider = provider.to_string();
            tokio::spawn(async move {
                while let Some(message) = stream.next().await {
                    match message {
                        Ok(Message::Text(text)) => {
                            if frames_tx.send(text.to_string()).await.is_err() {
                                break;
                            }
                        }
                        Ok(Message::Ping(data)) => {
                            let _ = outgoing.send(Message::Pong(data)).await;
                        }
                        Ok(Message::Close(frame)) => {
                            info!(provider = %provider, ?frame, "Server closed connection");
                            break;
                        }
                        Err(e) => {
                            warn!(provider = %provider, error = %e, "WebSocket receive failed");
                            break;
                        }
                        Ok(_) => {}
                    }
                }
                alive.store(false, Ordering::SeqCst);
            })
        };

        let dispatcher = {
            let alive = alive.clone();
            let pending = pending.clone();
            let outgoing = outgoing.clone();
            let provider = provider.to_string();
            tokio::spawn(async move {
                while let Some(text) = frames_rx.recv().await {
                    for packet in protocol::decode_frames(&text) {
                        dispatch(&provider, packet, &pending, &outgoing).await;
                    }
                }
                alive.store(false, Ordering::SeqCst);
                fail_all(
                    &pending,
                    ProviderError::ConnectionError("connection closed".to_string()),
                );
                debug!(provider = %provider, "Dispatcher stopped");
            })
        };

        Self {
            provider: provider.to_string(),
            outgoing,
            pending,
            alive,
            tasks: vec![writer, reader, dispatcher],
        }
    }

    /// 연결이 살아 있는지 확인합니다.
    pub(crate) fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst) && !self.outgoing.is_closed()
    }

    /// 메시지 하나를 보냅니다.
    pub(crate) async fn send(&self, method: &str, params: Vec<Value>) -> ProviderResult<()> {
        let frame = protocol::encode_message(method, params);
        self.outgoing
            .send(Message::Text(frame.into()))
            .await
            .map_err(|_| ProviderError::ConnectionError("connection closed".to_string()))
    }

    /// 세션의 결과를 기다릴 수신기를 등록합니다.
    pub(crate) fn register(
        &self,
        session: &str,
    ) -> ProviderResult<oneshot::Receiver<ProviderResult<Vec<Bar>>>> {
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            pending.insert(
                session.to_string(),
                PendingFetch {
                    bars: Vec::new(),
                    done: tx,
                },
            );
        }
        // 등록 직후 끊김 확인: dispatcher가 이미 fail_all을 마쳤을 수 있음
        if !self.is_alive() {
            self.forget(session);
            return Err(ProviderError::ConnectionError(
                "connection closed".to_string(),
            ));
        }
        Ok(rx)
    }

    /// 대기 중인 세션을 제거합니다.
    pub(crate) fn forget(&self, session: &str) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.remove(session);
    }

    /// 대기 중인 세션 수.
    pub(crate) fn pending_count(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// 연결을 닫습니다. 대기 중인 조회는 실패합니다.
    pub(crate) async fn close(&self) {
        let _ = self.outgoing.send(Message::Close(None)).await;
        self.alive.store(false, Ordering::SeqCst);
        fail_all(
            &self.pending,
            ProviderError::ConnectionError("disconnected".to_string()),
        );
        info!(provider = %self.provider, "Streaming connection closed");
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn dispatch(
    provider: &str,
    packet: Packet,
    pending: &PendingMap,
    outgoing: &mpsc::Sender<Message>,
) {
    let (method, params) = match packet {
        Packet::Heartbeat(payload) => {
            let frame = protocol::encode_frame(&payload);
            let _ = outgoing.send(Message::Text(frame.into())).await;
            return;
        }
        Packet::Other(value) => {
            debug!(provider = %provider, %value, "Ignoring packet");
            return;
        }
        Packet::Message { method, params } => (method, params),
    };

    let session = params.first().and_then(Value::as_str).map(str::to_string);

    match method.as_str() {
        "timescale_update" => {
            let Some(session) = session else { return };
            let parsed = protocol::parse_timescale_update(&params);
            let mut map = pending.lock().unwrap_or_else(|e| e.into_inner());
            match parsed {
                Ok(bars) => {
                    if let Some(fetch) = map.get_mut(&session) {
                        fetch.bars.extend(bars);
                    }
                }
                Err(e) => {
                    if let Some(fetch) = map.remove(&session) {
                        let _ = fetch.done.send(Err(e));
                    }
                }
            }
        }
        "series_completed" => {
            let Some(session) = session else { return };
            let fetch = pending
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&session);
            if let Some(fetch) = fetch {
                debug!(
                    provider = %provider,
                    session = %session,
                    bars = fetch.bars.len(),
                    "Series completed"
                );
                let _ = fetch.done.send(Ok(fetch.bars));
            }
        }
        "symbol_error" | "series_error" | "critical_error" => {
            let description = protocol::describe_error(&params);
            let err = if description.to_lowercase().contains("auth") {
                ProviderError::AuthError(description)
            } else {
                ProviderError::MalformedResponse(format!("{}: {}", method, description))
            };
            warn!(provider = %provider, method = %method, error = %err, "Session error");
            match session {
                Some(session) => fail_one(pending, &session, err),
                None => fail_all(pending, err),
            }
        }
        "protocol_error" => {
            let description = protocol::describe_error(&params);
            error!(provider = %provider, error = %description, "Protocol error");
            fail_all(
                pending,
                ProviderError::MalformedResponse(format!("protocol_error: {}", description)),
            );
            let _ = outgoing.send(Message::Close(None)).await;
        }
        _ => {}
    }
}

fn fail_one(pending: &PendingMap, session: &str, err: ProviderError) {
    let fetch = pending
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .remove(session);
    if let Some(fetch) = fetch {
        let _ = fetch.done.send(Err(err));
    }
}

fn fail_all(pending: &PendingMap, err: ProviderError) {
    let drained: Vec<PendingFetch> = pending
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .drain()
        .map(|(_, fetch)| fetch)
        .collect();
    for fetch in drained {
        let _ = fetch.done.send(Err(err.clone()));
    }
}
