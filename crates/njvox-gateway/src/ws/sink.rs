use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use njvox_chat::{SinkClosed, TurnSink};
use njvox_protocol::frames::{EventFrame, ResFrame};
use tokio::sync::Mutex;

/// Drives [`TurnSink::emit`] over one half of a split WS socket. The
/// orchestrator only ever sees this trait, never the socket itself; the
/// inherent methods below are for the connection handler's own request/
/// response and heartbeat traffic.
pub struct WsSink {
    tx: Mutex<SplitSink<WebSocket, Message>>,
}

impl WsSink {
    pub fn new(tx: SplitSink<WebSocket, Message>) -> Self {
        Self { tx: Mutex::new(tx) }
    }

    pub async fn send_res(&self, res: &ResFrame) -> Result<(), SinkClosed> {
        let json = serde_json::to_string(res).map_err(|_| SinkClosed)?;
        self.tx.lock().await.send(Message::Text(json.into())).await.map_err(|_| SinkClosed)
    }

    pub async fn emit_event(&self, event: EventFrame) -> Result<(), SinkClosed> {
        TurnSink::emit(self, event).await
    }

    pub async fn send_ping(&self) -> Result<(), SinkClosed> {
        self.tx.lock().await.send(Message::Ping(Vec::new().into())).await.map_err(|_| SinkClosed)
    }
}

#[async_trait::async_trait]
impl TurnSink for WsSink {
    async fn emit(&self, event: EventFrame) -> Result<(), SinkClosed> {
        let json = serde_json::to_string(&event).map_err(|_| SinkClosed)?;
        self.tx.lock().await.send(Message::Text(json.into())).await.map_err(|_| SinkClosed)
    }
}
