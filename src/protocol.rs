//! Wire-compatible types shared by the bootstrap fetch, the event stream and
//! the export endpoint of the match engine.
//!
//! Field names follow the engine's JSON exactly (`snake_case`). Fields the
//! observer never reads (agent memory, engine configuration, bookkeeping
//! flags) are ignored on deserialization and survive untouched only inside
//! [`ExportDocument`], which keeps the raw bytes.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

// ── Type aliases ────────────────────────────────────────────────────

/// Identifier of a match, issued by the engine when the match is created.
pub type MatchId = Uuid;

/// Stable identifier of a player within a match (e.g. `"Player_3"`).
pub type PlayerId = String;

/// Faction label announced as the winner (e.g. `"TOWN"`, `"MAFIA"`).
pub type Faction = String;

// ── Enums ───────────────────────────────────────────────────────────

/// A named stage of the match cycle.
///
/// The engine labels two phases with a space (`"Last Words"`, `"Game Over"`);
/// the compact spellings are accepted on input as well.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum Phase {
    #[default]
    Discussion,
    Voting,
    Defense,
    Judgment,
    #[serde(rename = "Last Words", alias = "LastWords")]
    LastWords,
    Night,
    #[serde(rename = "Game Over", alias = "GameOver")]
    GameOver,
}

impl Phase {
    /// The label the engine uses for this phase on the wire.
    pub fn label(self) -> &'static str {
        match self {
            Self::Discussion => "Discussion",
            Self::Voting => "Voting",
            Self::Defense => "Defense",
            Self::Judgment => "Judgment",
            Self::LastWords => "Last Words",
            Self::Night => "Night",
            Self::GameOver => "Game Over",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Outbound one-shot control commands. The observer issues them and does not
/// interpret the engine's reply beyond its status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Start (or restart) the engine's phase timer loop.
    Start,
    /// Pause the phase timer.
    Pause,
    /// Resume a paused match.
    Resume,
    /// Advance the match by one step.
    Step,
}

impl ControlCommand {
    /// Path segment appended to `/games/{id}/`.
    pub fn path_segment(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Step => "step",
        }
    }
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path_segment())
    }
}

// ── Structs ─────────────────────────────────────────────────────────

/// A participant as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    /// Role label. Observers normally learn it on death or at game end.
    #[serde(default)]
    pub role: String,
    #[serde(default = "alive_by_default")]
    pub is_alive: bool,
}

fn alive_by_default() -> bool {
    true
}

/// Full match state returned by the bootstrap fetch and carried by the
/// stream's `snapshot` message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_id: Option<MatchId>,
    pub day: u32,
    pub phase: Phase,
    pub seconds_remaining: u32,
    /// Narrative events recorded so far, kept raw so that each one goes
    /// through the stream decoder individually.
    #[serde(default)]
    pub transcript: Vec<serde_json::Value>,
    #[serde(default)]
    pub players: Vec<Player>,
    #[serde(default)]
    pub is_paused: bool,
    #[serde(default)]
    pub winner: Option<Faction>,
}

/// The engine's export document, kept byte-for-byte as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportDocument {
    match_id: MatchId,
    debug: bool,
    bytes: Vec<u8>,
}

impl ExportDocument {
    /// Wrap the raw response body of an export request.
    pub fn new(match_id: MatchId, debug: bool, bytes: Vec<u8>) -> Self {
        Self {
            match_id,
            debug,
            bytes,
        }
    }

    /// The match this document was exported from.
    pub fn match_id(&self) -> MatchId {
        self.match_id
    }

    /// Whether the export included private agent data.
    pub fn is_debug(&self) -> bool {
        self.debug
    }

    /// The document exactly as the engine sent it.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Parse the document into a generic JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`ObserverError::Serialization`](crate::ObserverError::Serialization)
    /// if the engine sent something that is not JSON.
    pub fn to_value(&self) -> Result<serde_json::Value> {
        Ok(serde_json::from_slice(&self.bytes)?)
    }

    /// File name offered for download, e.g. `match-<id>.json` or
    /// `match-<id>-debug.json`.
    pub fn file_name(&self) -> String {
        if self.debug {
            format!("match-{}-debug.json", self.match_id)
        } else {
            format!("match-{}.json", self.match_id)
        }
    }

    /// Write the unmodified document to `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ObserverError::Io`](crate::ObserverError::Io) if the file
    /// cannot be written.
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path.as_ref(), &self.bytes)?;
        tracing::info!(path = %path.as_ref().display(), bytes = self.bytes.len(), "export written");
        Ok(())
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn phase_uses_engine_labels() {
        assert_eq!(
            serde_json::to_string(&Phase::LastWords).unwrap(),
            "\"Last Words\""
        );
        assert_eq!(
            serde_json::to_string(&Phase::GameOver).unwrap(),
            "\"Game Over\""
        );
        assert_eq!(serde_json::to_string(&Phase::Night).unwrap(), "\"Night\"");
    }

    #[test]
    fn phase_accepts_compact_spellings() {
        let p: Phase = serde_json::from_str("\"GameOver\"").unwrap();
        assert_eq!(p, Phase::GameOver);
        let p: Phase = serde_json::from_str("\"LastWords\"").unwrap();
        assert_eq!(p, Phase::LastWords);
    }

    #[test]
    fn player_ignores_private_fields() {
        let json = r#"{
            "id": "Player_0",
            "name": "Player_0",
            "role": "Mafia",
            "is_alive": false,
            "private_memory": ["REVEALED: Player_2 was Villager"],
            "role_info": "Your teammates: Player_4"
        }"#;
        let p: Player = serde_json::from_str(json).unwrap();
        assert_eq!(p.id, "Player_0");
        assert_eq!(p.role, "Mafia");
        assert!(!p.is_alive);
    }

    #[test]
    fn player_defaults_to_alive_without_role() {
        let p: Player = serde_json::from_str(r#"{"id":"a","name":"A"}"#).unwrap();
        assert!(p.is_alive);
        assert!(p.role.is_empty());
    }

    #[test]
    fn match_state_ignores_engine_bookkeeping() {
        let json = r#"{
            "game_id": "00000000-0000-0000-0000-000000000007",
            "config": {"num_players": 5, "model": "x"},
            "day": 3,
            "phase": "Defense",
            "seconds_remaining": 12,
            "players": [],
            "transcript": [{"type": "chat", "payload": {"speaker": "A", "text": "hi"}}],
            "is_paused": false,
            "accused_id": "Player_1",
            "pending_kills": [],
            "winner": null,
            "voting_complete": true
        }"#;
        let s: MatchState = serde_json::from_str(json).unwrap();
        assert_eq!(s.game_id, Some(Uuid::from_u128(7)));
        assert_eq!(s.day, 3);
        assert_eq!(s.phase, Phase::Defense);
        assert_eq!(s.transcript.len(), 1);
        assert!(s.winner.is_none());
    }

    #[test]
    fn control_command_paths() {
        assert_eq!(ControlCommand::Start.path_segment(), "start");
        assert_eq!(ControlCommand::Pause.to_string(), "pause");
        assert_eq!(ControlCommand::Resume.path_segment(), "resume");
        assert_eq!(ControlCommand::Step.path_segment(), "step");
    }

    #[test]
    fn export_file_name_reflects_debug_flag() {
        let id = Uuid::from_u128(1);
        let plain = ExportDocument::new(id, false, b"{}".to_vec());
        let debug = ExportDocument::new(id, true, b"{}".to_vec());
        assert_eq!(plain.file_name(), format!("match-{id}.json"));
        assert_eq!(debug.file_name(), format!("match-{id}-debug.json"));
    }
}
