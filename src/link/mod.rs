//! Identity linker: forwards each connected player's Steam ID and EOS ID to
//! the link API, once per session.
//!
//! A pair is remembered as soon as its submission has been attempted, whatever
//! the API answered. Roster refreshes forget players who are no longer on the
//! server, and the set is capped at [`processed::MAX_PROCESSED`] keys.

pub mod api;
pub mod processed;

pub use api::{LinkApi, LinkApiClient, PendingLink};
pub use processed::{PlayerKey, ProcessedKeys};

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

use crate::config::Config;
use crate::host::{EventKind, HostEvent, Player, Plugin, ServerState};

/// Retries after the first failed attempt, when retrying is enabled.
pub const MAX_RETRIES: u32 = 2;
/// Fixed pause between attempts.
pub const RETRY_BACKOFF: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Default)]
pub struct LinkOptions {
    pub retry_on_failure: bool,
    pub log_successful: bool,
}

impl LinkOptions {
    pub fn from_config(config: &Config) -> Self {
        LinkOptions {
            retry_on_failure: config.retry_on_failure,
            log_successful: config.log_successful,
        }
    }

    fn max_attempts(&self) -> u32 {
        if self.retry_on_failure {
            1 + MAX_RETRIES
        } else {
            1
        }
    }
}

pub struct IdentityLinker {
    api: Arc<dyn LinkApi>,
    options: LinkOptions,
    /// Source of the live roster on refresh events
    state: ServerState,
    processed: ProcessedKeys,
}

impl IdentityLinker {
    pub fn new(api: Arc<dyn LinkApi>, options: LinkOptions, state: ServerState) -> Self {
        IdentityLinker {
            api,
            options,
            state,
            processed: ProcessedKeys::new(),
        }
    }

    #[cfg(test)]
    pub fn processed(&self) -> &ProcessedKeys {
        &self.processed
    }

    /// A single player joined.
    pub async fn on_player_connected(&mut self, player: Option<&Player>) {
        let Some(player) = player else {
            warn!("Player object not available in connection event, ignoring");
            return;
        };

        let Some((steam_id, eos_id)) = player.platform_ids() else {
            warn!(
                "Missing IDs for player {} - SteamID: {}, EOSID: {}",
                player.display_name(),
                player.steam_id.as_deref().unwrap_or("N/A"),
                player.eos_id.as_deref().unwrap_or("N/A"),
            );
            return;
        };

        let key = PlayerKey::new(steam_id, eos_id);
        if self.processed.contains(&key) {
            debug!(
                "Player {} ({}) already processed, skipping API call",
                player.display_name(),
                steam_id
            );
            return;
        }

        info!(
            "Player connected - Name: {}, SteamID: {}, EOSID: {}",
            player.display_name(),
            steam_id,
            eos_id
        );
        self.submit(PendingLink::new(steam_id, eos_id, player.display_name()))
            .await;
        self.processed.insert(key);
        debug!("Processed players: {}", self.processed.len());
    }

    /// The host refreshed its full player list.
    pub async fn on_roster_update(&mut self, players: &[Player]) {
        trace!("Player list updated - {} players online", players.len());

        let mut present = HashSet::new();
        for player in players {
            let Some((steam_id, eos_id)) = player.platform_ids() else {
                continue;
            };
            let key = PlayerKey::new(steam_id, eos_id);
            present.insert(key.clone());

            if self.processed.contains(&key) {
                continue;
            }

            debug!(
                "New player found in list - Name: {}, SteamID: {}, EOSID: {}",
                player.display_name(),
                steam_id,
                eos_id
            );
            self.submit(PendingLink::new(steam_id, eos_id, player.display_name()))
                .await;
            self.processed.insert(key);
        }

        let evicted = self.processed.retain_present(&present);
        if evicted > 0 {
            trace!("Removed {} disconnected player(s) from cache", evicted);
        }
    }

    /// Send one link, retrying transport failures when enabled. Never fails.
    async fn submit(&self, mut link: PendingLink) {
        let max_attempts = self.options.max_attempts();

        loop {
            info!(
                "Sending link to API for {}: SteamID={}, EOSID={}",
                link.player_name, link.steam_id, link.eos_id
            );

            match self.api.submit(&link).await {
                Ok(resp) if resp.success => {
                    if self.options.log_successful {
                        debug!(
                            "Successfully linked player: {}",
                            resp.message.as_deref().unwrap_or("Link saved")
                        );
                        trace!("API response: {:?}", resp);
                    }
                    return;
                }
                Ok(resp) => {
                    warn!(
                        "API returned unsuccessful response for {}: {}",
                        link.player_name,
                        resp.message.as_deref().unwrap_or("no message")
                    );
                    return;
                }
                Err(e) => {
                    warn!("Failed to send link to API: {}", e);
                    if link.attempt >= max_attempts {
                        if max_attempts > 1 {
                            error!(
                                "Giving up on link for {} after {} attempts",
                                link.player_name, link.attempt
                            );
                        }
                        return;
                    }
                    link.attempt += 1;
                    info!(
                        "Retrying API call (attempt {}/{})...",
                        link.attempt, max_attempts
                    );
                    tokio::time::sleep(RETRY_BACKOFF).await;
                }
            }
        }
    }
}

#[async_trait]
impl Plugin for IdentityLinker {
    fn name(&self) -> &str {
        "IdentityLinker"
    }

    fn subscriptions(&self) -> &'static [EventKind] {
        &[EventKind::PlayerConnected, EventKind::UpdatedPlayerInformation]
    }

    async fn on_event(&mut self, event: HostEvent) {
        match event {
            HostEvent::PlayerConnected(payload) => {
                self.on_player_connected(payload.player.as_ref()).await
            }
            // The feed folds the refresh into state before dispatching it
            HostEvent::UpdatedPlayerInformation(_) => {
                let players = self.state.players().await;
                self.on_roster_update(&players).await
            }
            other => debug!("IdentityLinker ignoring {}", other.kind()),
        }
    }
}
