//! WebSocket bridge from the game-server host.
//!
//! The host pushes one JSON object per text frame, tagged by `event`:
//! ```text
//!  Host ──push──▶ HostFeed (background task)
//!                   │  parses frame → HostEvent
//!                   │  folds roster/layer into ServerState
//!                   ▼
//!               EventBus::publish → plugin tasks
//! ```
//! Unknown event names are skipped quietly; malformed frames are skipped
//! with a warning. The connection is re-established forever.

use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use super::bus::EventBus;
use super::events::{EventKind, HostEvent};
use super::ServerState;

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("frame is not JSON: {0}")]
    NotJson(#[source] serde_json::Error),
    #[error("frame has no \"event\" name")]
    MissingEventName,
    #[error("malformed {kind} payload: {source}")]
    Malformed {
        kind: EventKind,
        #[source]
        source: serde_json::Error,
    },
}

/// Parse one host frame. `Ok(None)` means an event this service does not handle.
pub fn parse_host_message(text: &str) -> Result<Option<HostEvent>, FeedError> {
    let val: serde_json::Value = serde_json::from_str(text).map_err(FeedError::NotJson)?;
    let name = val
        .get("event")
        .and_then(|v| v.as_str())
        .ok_or(FeedError::MissingEventName)?;

    let Some(kind) = EventKind::from_wire(name) else {
        debug!("Ignoring host event {}", name);
        return Ok(None);
    };

    serde_json::from_value::<HostEvent>(val)
        .map(Some)
        .map_err(|source| FeedError::Malformed { kind, source })
}

/// Receives host events and hands them to the state and the bus.
pub struct HostFeed {
    url: String,
    state: ServerState,
    bus: EventBus,
}

impl HostFeed {
    pub fn new(url: &str, state: ServerState, bus: EventBus) -> Self {
        HostFeed {
            url: url.to_string(),
            state,
            bus,
        }
    }

    /// Apply and publish one raw frame.
    pub async fn dispatch(&self, text: &str) {
        match parse_host_message(text) {
            Ok(Some(event)) => {
                self.state.apply(&event).await;
                let delivered = self.bus.publish(&event).await;
                debug!("{} delivered to {} plugin(s)", event.kind(), delivered);
            }
            Ok(None) => {}
            Err(e) => warn!("[HostFeed] Ignoring host frame: {}", e),
        }
    }

    /// Persistent connection loop with exponential backoff and jitter.
    pub async fn run(self) {
        let mut backoff_secs = 1u64;
        let max_backoff = 30u64;

        loop {
            info!("[HostFeed] Connecting to host bridge: {}", self.url);

            match tokio_tungstenite::connect_async(self.url.as_str()).await {
                Ok((ws_stream, _response)) => {
                    info!("[HostFeed] Connected");
                    backoff_secs = 1;

                    let (mut write, mut read) = ws_stream.split();

                    loop {
                        match read.next().await {
                            Some(Ok(Message::Text(text))) => {
                                if text.trim() == "ping" {
                                    let _ = write.send(Message::Text("pong".to_string())).await;
                                    continue;
                                }
                                self.dispatch(&text).await;
                            }
                            Some(Ok(Message::Ping(data))) => {
                                let _ = write.send(Message::Pong(data)).await;
                            }
                            Some(Ok(Message::Close(_))) => {
                                warn!("[HostFeed] Host closed the connection");
                                break;
                            }
                            Some(Err(e)) => {
                                error!("[HostFeed] WebSocket error: {}", e);
                                break;
                            }
                            None => {
                                warn!("[HostFeed] Stream ended");
                                break;
                            }
                            _ => {}
                        }
                    }
                }
                Err(e) => {
                    error!("[HostFeed] Connection failed: {}", e);
                }
            }

            let jitter_ms = rand::thread_rng().gen_range(0..500);
            warn!("[HostFeed] Reconnecting in {}s...", backoff_secs);
            tokio::time::sleep(Duration::from_secs(backoff_secs) + Duration::from_millis(jitter_ms))
                .await;
            backoff_secs = (backoff_secs * 2).min(max_backoff);
        }
    }
}
