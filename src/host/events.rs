use serde::{Deserialize, Serialize};
use std::fmt;

/// Names of the host events this service understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    RoundEnded,
    PlayerConnected,
    UpdatedPlayerInformation,
    NewGame,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::RoundEnded,
        EventKind::PlayerConnected,
        EventKind::UpdatedPlayerInformation,
        EventKind::NewGame,
    ];

    /// Wire name used by the host bridge.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::RoundEnded => "ROUND_ENDED",
            EventKind::PlayerConnected => "PLAYER_CONNECTED",
            EventKind::UpdatedPlayerInformation => "UPDATED_PLAYER_INFORMATION",
            EventKind::NewGame => "NEW_GAME",
        }
    }

    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event emitted by the game-server host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum HostEvent {
    #[serde(rename = "ROUND_ENDED")]
    RoundEnded(RoundEnded),
    #[serde(rename = "PLAYER_CONNECTED")]
    PlayerConnected(PlayerConnected),
    #[serde(rename = "UPDATED_PLAYER_INFORMATION")]
    UpdatedPlayerInformation(RosterUpdate),
    #[serde(rename = "NEW_GAME")]
    NewGame(NewGame),
}

impl HostEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            HostEvent::RoundEnded(_) => EventKind::RoundEnded,
            HostEvent::PlayerConnected(_) => EventKind::PlayerConnected,
            HostEvent::UpdatedPlayerInformation(_) => EventKind::UpdatedPlayerInformation,
            HostEvent::NewGame(_) => EventKind::NewGame,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoundEnded {
    /// Winning team label, when the host knows it
    #[serde(default)]
    pub winner: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerConnected {
    #[serde(default)]
    pub player: Option<Player>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RosterUpdate {
    #[serde(default)]
    pub players: Vec<Player>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewGame {
    /// Name of the layer now being played
    #[serde(default)]
    pub layer: Option<String>,
}

/// A connected player as reported by the host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Player {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "steamID")]
    pub steam_id: Option<String>,
    #[serde(default, rename = "eosID")]
    pub eos_id: Option<String>,
}

impl Player {
    /// Both platform IDs, or `None` when either is missing or blank.
    pub fn platform_ids(&self) -> Option<(&str, &str)> {
        let steam = self.steam_id.as_deref().filter(|s| !s.is_empty())?;
        let eos = self.eos_id.as_deref().filter(|s| !s.is_empty())?;
        Some((steam, eos))
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().filter(|s| !s.is_empty()).unwrap_or("unknown")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_connected_from_wire() {
        let raw = r#"{"event":"PLAYER_CONNECTED","player":{"name":"Bob","steamID":"7656","eosID":"0002abc"}}"#;
        let ev: HostEvent = serde_json::from_str(raw).unwrap();
        let HostEvent::PlayerConnected(payload) = ev else {
            panic!("expected PlayerConnected, got {:?}", ev);
        };
        let player = payload.player.unwrap();
        assert_eq!(player.platform_ids(), Some(("7656", "0002abc")));
        assert_eq!(player.display_name(), "Bob");
    }

    #[test]
    fn test_round_ended_without_winner() {
        let ev: HostEvent = serde_json::from_str(r#"{"event":"ROUND_ENDED"}"#).unwrap();
        assert_eq!(ev, HostEvent::RoundEnded(RoundEnded { winner: None }));
        assert_eq!(ev.kind(), EventKind::RoundEnded);
    }

    #[test]
    fn test_blank_ids_are_missing() {
        let player = Player {
            name: None,
            steam_id: Some("7656".into()),
            eos_id: Some(String::new()),
        };
        assert!(player.platform_ids().is_none());
        assert_eq!(player.display_name(), "unknown");
    }

    #[test]
    fn test_kind_wire_names() {
        for kind in EventKind::ALL {
            assert_eq!(EventKind::from_wire(kind.as_str()), Some(kind));
        }
        assert_eq!(EventKind::from_wire("CHAT_MESSAGE"), None);
    }
}
