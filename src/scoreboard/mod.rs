//! Scoreboard publisher: when a round ends, wait for the game server to
//! finish writing its scoreboard CSV, then post it to a chat channel.

pub mod channel;
pub mod discord;
pub mod selector;
pub mod sftp;
pub mod transport;

pub use channel::{Attachment, ChatChannel};
pub use discord::DiscordChannel;
pub use selector::{ScoreboardFile, ScoreboardLocator, ScoreboardSource};
pub use sftp::{SftpConfig, SftpConnector};

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::host::{EventKind, HostEvent, Plugin, RoundEnded, ServerState};

const UNKNOWN_WINNER: &str = "Unknown";
const UNKNOWN_LAYER: &str = "Unknown Map";

/// Message posted alongside the scoreboard file.
pub fn compose_message(winner: Option<&str>, layer: Option<&str>) -> String {
    let winner = winner.filter(|w| !w.is_empty()).unwrap_or(UNKNOWN_WINNER);
    let layer = layer.filter(|l| !l.is_empty()).unwrap_or(UNKNOWN_LAYER);
    format!("**Match Scoreboard**\nWinner: **{}**\nMap: **{}**", winner, layer)
}

pub struct ScoreboardPublisher {
    channel: Arc<dyn ChatChannel>,
    locator: ScoreboardLocator,
    state: ServerState,
    /// Grace period for the game server to flush the CSV
    wait_time: Duration,
}

impl ScoreboardPublisher {
    pub fn new(
        channel: Arc<dyn ChatChannel>,
        locator: ScoreboardLocator,
        state: ServerState,
        wait_time: Duration,
    ) -> Self {
        ScoreboardPublisher {
            channel,
            locator,
            state,
            wait_time,
        }
    }

    /// Round-end handler. Never fails: every problem ends up in the log.
    pub async fn on_round_ended(&self, round: &RoundEnded) {
        info!("Round ended, looking for scoreboard CSV...");
        tokio::time::sleep(self.wait_time).await;

        let Some(file) = self.locator.find_latest().await else {
            info!("No scoreboard CSV file found");
            return;
        };
        info!("Found scoreboard file: {}", file.path.display());

        match self.publish(&file, round).await {
            Ok(()) => info!("Scoreboard posted to {} successfully", self.channel.name()),
            Err(e) => error!("Error posting scoreboard: {:#}", e),
        }
    }

    /// Post `file` with the round summary.
    pub async fn publish(&self, file: &ScoreboardFile, round: &RoundEnded) -> Result<()> {
        let layer = self.state.current_layer().await;
        let content = compose_message(round.winner.as_deref(), layer.as_deref());

        let result = self.send_file(file, &content).await;
        if let Err(e) = &result {
            error!("Error sending scoreboard to {}: {:#}", self.channel.name(), e);
        }
        result
    }

    async fn send_file(&self, file: &ScoreboardFile, content: &str) -> Result<()> {
        let name = file
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .context("Scoreboard path has no file name")?;
        let bytes = tokio::fs::read(&file.path)
            .await
            .with_context(|| format!("Failed to read {}", file.path.display()))?;
        debug!("Attaching {} ({} bytes)", name, bytes.len());

        self.channel.send(content, Attachment { name, bytes }).await
    }
}

#[async_trait]
impl Plugin for ScoreboardPublisher {
    fn name(&self) -> &str {
        "ScoreboardPublisher"
    }

    fn subscriptions(&self) -> &'static [EventKind] {
        &[EventKind::RoundEnded]
    }

    async fn mount(&mut self) -> Result<()> {
        self.channel
            .verify()
            .await
            .with_context(|| format!("Channel {} is not usable", self.channel.name()))
    }

    async fn on_event(&mut self, event: HostEvent) {
        match event {
            HostEvent::RoundEnded(round) => self.on_round_ended(&round).await,
            other => debug!("ScoreboardPublisher ignoring {}", other.kind()),
        }
    }
}
