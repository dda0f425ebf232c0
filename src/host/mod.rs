//! Everything the service knows about the game-server host: the events it
//! emits, the shared view of server state, and the plumbing that carries
//! events from the host bridge to the plugins.

pub mod bus;
pub mod events;
pub mod feed;

pub use bus::{spawn_plugin, EventBus, Plugin};
pub use events::{EventKind, HostEvent, Player, RoundEnded};
pub use feed::HostFeed;

use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared, read-mostly view of the host's live state.
#[derive(Clone, Default)]
pub struct ServerState {
    inner: Arc<RwLock<StateInner>>,
}

#[derive(Default)]
struct StateInner {
    players: Vec<Player>,
    current_layer: Option<String>,
}

impl ServerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a host event into the state. Events that carry no state are ignored.
    pub async fn apply(&self, event: &HostEvent) {
        match event {
            HostEvent::UpdatedPlayerInformation(update) => {
                self.inner.write().await.players = update.players.clone();
            }
            HostEvent::NewGame(game) => {
                self.inner.write().await.current_layer = game.layer.clone();
            }
            HostEvent::RoundEnded(_) | HostEvent::PlayerConnected(_) => {}
        }
    }

    pub async fn players(&self) -> Vec<Player> {
        self.inner.read().await.players.clone()
    }

    pub async fn current_layer(&self) -> Option<String> {
        self.inner.read().await.current_layer.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::events::{NewGame, RosterUpdate};

    #[tokio::test]
    async fn test_apply_roster_and_layer() {
        let state = ServerState::new();
        assert!(state.current_layer().await.is_none());

        state
            .apply(&HostEvent::NewGame(NewGame {
                layer: Some("Gorodok_RAAS_v2".into()),
            }))
            .await;
        state
            .apply(&HostEvent::UpdatedPlayerInformation(RosterUpdate {
                players: vec![Player {
                    name: Some("Alice".into()),
                    steam_id: Some("1".into()),
                    eos_id: Some("a".into()),
                }],
            }))
            .await;
        state.apply(&HostEvent::RoundEnded(RoundEnded::default())).await;

        assert_eq!(state.current_layer().await.as_deref(), Some("Gorodok_RAAS_v2"));
        assert_eq!(state.players().await.len(), 1);
    }
}
