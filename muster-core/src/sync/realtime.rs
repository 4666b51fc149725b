//! Server push trigger for the sync pipeline.
//!
//! The server announces row changes on a WebSocket as small JSON notices:
//!
//! ```json
//! { "table": "check_ins", "event": "INSERT" }
//! ```
//!
//! Each notice for a synced table starts a sync run. Runs are single-flight,
//! so a burst of notices collapses into the run already in progress.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::coordinator::SyncCoordinator;
use crate::backend::build_ws_url;

/// Tables whose changes trigger a sync.
pub const WATCHED_TABLES: [&str; 5] = [
    "users",
    "operations",
    "check_ins",
    "meal_logs",
    "system_settings",
];

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const INITIAL_RECONNECT_DELAY: Duration = Duration::from_secs(1);
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);

/// One change notice from the server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChangeNotice {
    pub table: String,
    #[serde(default)]
    pub event: Option<String>,
}

impl ChangeNotice {
    /// The reason passed to `sync_now` for this notice.
    pub fn reason(&self) -> String {
        format!("realtime:{}", self.table)
    }
}

/// Parses a text frame. Returns `None` for malformed frames and for tables
/// that are not synced.
pub fn parse_change(text: &str) -> Option<ChangeNotice> {
    let notice: ChangeNotice = match serde_json::from_str(text) {
        Ok(notice) => notice,
        Err(e) => {
            debug!(error = %e, "Ignoring malformed realtime frame");
            return None;
        }
    };
    if WATCHED_TABLES.contains(&notice.table.as_str()) {
        Some(notice)
    } else {
        debug!(table = %notice.table, "Ignoring change to unsynced table");
        None
    }
}

/// Delay before reconnect attempt number `attempt` (zero based).
pub fn reconnect_delay(attempt: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
    INITIAL_RECONNECT_DELAY
        .saturating_mul(factor)
        .min(MAX_RECONNECT_DELAY)
}

/// Keeps a realtime connection open and triggers syncs from it.
pub struct RealtimeListener {
    url: String,
    coordinator: Arc<SyncCoordinator>,
}

impl RealtimeListener {
    pub fn new(server_url: &str, api_key: &str, coordinator: Arc<SyncCoordinator>) -> Self {
        Self {
            url: build_ws_url(server_url, "/realtime", api_key),
            coordinator,
        }
    }

    /// Runs the listener on a background task until `token` is cancelled.
    pub fn spawn(self, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(token).await })
    }

    async fn run(self, token: CancellationToken) {
        let mut attempt = 0u32;
        loop {
            let connected = tokio::select! {
                _ = token.cancelled() => break,
                result = connect_async(self.url.as_str()) => result,
            };

            match connected {
                Ok((stream, _)) => {
                    info!("Realtime connected");
                    attempt = 0;
                    if self.listen(stream, &token).await {
                        break;
                    }
                    info!("Realtime disconnected");
                }
                Err(e) => {
                    warn!(error = %e, attempt, "Realtime connection failed");
                }
            }

            let delay = reconnect_delay(attempt);
            attempt = attempt.saturating_add(1);
            debug!(delay_ms = delay.as_millis() as u64, "Reconnecting realtime");
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        debug!("Realtime listener stopped");
    }

    /// Reads frames until the socket closes. Returns true if cancelled.
    async fn listen(&self, stream: Socket, token: &CancellationToken) -> bool {
        let (mut sender, mut receiver) = stream.split();
        loop {
            let frame = tokio::select! {
                _ = token.cancelled() => {
                    let _ = sender.send(Message::Close(None)).await;
                    return true;
                }
                frame = receiver.next() => frame,
            };

            match frame {
                Some(Ok(Message::Text(text))) => {
                    if let Some(notice) = parse_change(text.as_str()) {
                        let coordinator = self.coordinator.clone();
                        tokio::spawn(async move {
                            coordinator.sync_now(&notice.reason()).await;
                        });
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    if sender.send(Message::Pong(data)).await.is_err() {
                        return false;
                    }
                }
                Some(Ok(Message::Close(_))) | None => return false,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "Realtime socket error");
                    return false;
                }
            }
        }
    }
}
