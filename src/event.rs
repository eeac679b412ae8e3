//! Decoding of inbound stream messages into typed [`MatchEvent`]s.
//!
//! Every stream message is a JSON object with a `type` discriminant and a
//! `payload` object; most kinds also carry `day` and `phase` at the top level.
//! [`decode`] never fails: unrecognised discriminants, known discriminants with
//! malformed payloads and non-JSON input all yield [`EventKind::Unknown`],
//! which every consumer treats as a no-op.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::protocol::{Faction, MatchState, Phase};

/// Wire discriminants understood by this client.
pub mod wire {
    pub const SNAPSHOT: &str = "snapshot";
    pub const PHASE_TICK: &str = "phase_tick";
    pub const PHASE_START: &str = "phase_start";
    pub const GAME_OVER: &str = "game_over";
    pub const CHAT: &str = "chat";
    pub const TRIAL_STARTED: &str = "trial_started";
    pub const TRIAL_VERDICT: &str = "trial_verdict";
    pub const EXECUTION: &str = "execution";
    pub const NIGHT_RESULT: &str = "night_result";
}

// ── Payloads ────────────────────────────────────────────────────────

/// Payload of `phase_tick`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseTickPayload {
    pub seconds_remaining: u32,
}

/// Payload of `phase_start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseStartPayload {
    pub duration_sec: u32,
}

/// Payload of `game_over`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameOverPayload {
    pub winner: Faction,
    /// Closing announcement. Older engines call this field `reason`.
    #[serde(default, alias = "reason", skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Payload of `chat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatPayload {
    pub speaker: String,
    pub text: String,
    /// Set by the engine on narration that was meant for a subset of players.
    #[serde(default)]
    pub private: bool,
}

/// Payload of `trial_started`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialStartedPayload {
    pub accused: String,
    #[serde(default)]
    pub votes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Payload of `trial_verdict`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialVerdictPayload {
    pub accused: String,
    pub verdict: String,
    /// Vote counts keyed by ballot (`guilty`, `innocent`, `abstain`).
    #[serde(default)]
    pub tally: BTreeMap<String, u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Payload of `execution`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPayload {
    pub player: String,
    pub role_revealed: String,
}

/// Payload of `night_result`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NightResultPayload {
    pub killed: String,
    pub role_revealed: String,
}

// ── Event ───────────────────────────────────────────────────────────

/// Kind-specific part of a [`MatchEvent`].
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// Complete replacement of the view (boxed to keep the enum small).
    Snapshot(Box<MatchState>),
    PhaseTick(PhaseTickPayload),
    PhaseStart(PhaseStartPayload),
    GameOver(GameOverPayload),
    Chat(ChatPayload),
    TrialStarted(TrialStartedPayload),
    TrialVerdict(TrialVerdictPayload),
    Execution(ExecutionPayload),
    NightResult(NightResultPayload),
    /// Anything this client does not understand. `kind` holds the raw
    /// discriminant when one could be read.
    Unknown { kind: Option<String> },
}

/// A decoded stream message.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchEvent {
    pub day: Option<u32>,
    pub phase: Option<Phase>,
    /// Engine timestamp in Unix seconds, when present.
    pub ts: Option<i64>,
    pub kind: EventKind,
}

impl MatchEvent {
    /// An event with no envelope metadata.
    pub fn bare(kind: EventKind) -> Self {
        Self {
            day: None,
            phase: None,
            ts: None,
            kind,
        }
    }

    /// Attach `day` and `phase` envelope fields.
    #[must_use]
    pub fn at(mut self, day: u32, phase: Phase) -> Self {
        self.day = Some(day);
        self.phase = Some(phase);
        self
    }

    /// Returns `true` for [`EventKind::Unknown`].
    pub fn is_unknown(&self) -> bool {
        matches!(self.kind, EventKind::Unknown { .. })
    }

    /// Short name of the event kind, for logging.
    pub fn kind_name(&self) -> &str {
        match &self.kind {
            EventKind::Snapshot(_) => wire::SNAPSHOT,
            EventKind::PhaseTick(_) => wire::PHASE_TICK,
            EventKind::PhaseStart(_) => wire::PHASE_START,
            EventKind::GameOver(_) => wire::GAME_OVER,
            EventKind::Chat(_) => wire::CHAT,
            EventKind::TrialStarted(_) => wire::TRIAL_STARTED,
            EventKind::TrialVerdict(_) => wire::TRIAL_VERDICT,
            EventKind::Execution(_) => wire::EXECUTION,
            EventKind::NightResult(_) => wire::NIGHT_RESULT,
            EventKind::Unknown { kind } => kind.as_deref().unwrap_or("unknown"),
        }
    }

    fn unknown(kind: Option<String>) -> Self {
        Self::bare(EventKind::Unknown { kind })
    }
}

// ── Decoding ────────────────────────────────────────────────────────

/// The envelope shared by every stream message.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    day: Option<u32>,
    /// Kept loose so an unfamiliar phase label does not hide the payload.
    #[serde(default)]
    phase: Option<serde_json::Value>,
    #[serde(default)]
    ts: Option<i64>,
    #[serde(default)]
    payload: serde_json::Value,
}

/// Decode one raw stream message.
pub fn decode(raw: &str) -> MatchEvent {
    match serde_json::from_str::<Envelope>(raw) {
        Ok(envelope) => from_envelope(envelope),
        Err(e) => {
            warn!("dropping unparseable stream message: {e}");
            MatchEvent::unknown(None)
        }
    }
}

/// Decode an event that already went through a JSON parser, such as an entry
/// of the bootstrap transcript.
pub fn decode_value(value: serde_json::Value) -> MatchEvent {
    match serde_json::from_value::<Envelope>(value) {
        Ok(envelope) => from_envelope(envelope),
        Err(e) => {
            warn!("dropping malformed event: {e}");
            MatchEvent::unknown(None)
        }
    }
}

fn from_envelope(envelope: Envelope) -> MatchEvent {
    let Envelope {
        kind,
        day,
        phase,
        ts,
        payload,
    } = envelope;

    let decoded = match kind.as_str() {
        wire::SNAPSHOT => payload_as(payload).map(|s| EventKind::Snapshot(Box::new(s))),
        wire::PHASE_TICK => payload_as(payload).map(EventKind::PhaseTick),
        wire::PHASE_START => payload_as(payload).map(EventKind::PhaseStart),
        wire::GAME_OVER => payload_as(payload).map(EventKind::GameOver),
        wire::CHAT => payload_as(payload).map(EventKind::Chat),
        wire::TRIAL_STARTED => payload_as(payload).map(EventKind::TrialStarted),
        wire::TRIAL_VERDICT => payload_as(payload).map(EventKind::TrialVerdict),
        wire::EXECUTION => payload_as(payload).map(EventKind::Execution),
        wire::NIGHT_RESULT => payload_as(payload).map(EventKind::NightResult),
        _ => {
            debug!(kind = %kind, "ignoring unrecognised event kind");
            return MatchEvent::unknown(Some(kind));
        }
    };

    match decoded {
        Ok(event_kind) => MatchEvent {
            day,
            phase: phase.and_then(|p| serde_json::from_value(p).ok()),
            ts,
            kind: event_kind,
        },
        Err(e) => {
            warn!(kind = %kind, "dropping event with malformed payload: {e}");
            MatchEvent::unknown(Some(kind))
        }
    }
}

fn payload_as<T: serde::de::DeserializeOwned>(
    payload: serde_json::Value,
) -> Result<T, serde_json::Error> {
    serde_json::from_value(payload)
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
    fn decodes_phase_tick_with_envelope() {
        let ev = decode(
            r#"{"type":"phase_tick","game_id":"g","day":1,"phase":"Discussion","payload":{"seconds_remaining":44}}"#,
        );
        assert_eq!(ev.day, Some(1));
        assert_eq!(ev.phase, Some(Phase::Discussion));
        assert_eq!(
            ev.kind,
            EventKind::PhaseTick(PhaseTickPayload {
                seconds_remaining: 44
            })
        );
    }

    #[test]
    fn unknown_discriminant_keeps_its_name() {
        let ev = decode(r#"{"type":"defense_speech","payload":{"speaker":"A","text":"b"}}"#);
        assert!(ev.is_unknown());
        assert_eq!(ev.kind_name(), "defense_speech");
    }

    #[test]
    fn malformed_known_payload_is_unknown() {
        let ev = decode(r#"{"type":"phase_start","day":2,"phase":"Night","payload":{}}"#);
        assert_eq!(
            ev.kind,
            EventKind::Unknown {
                kind: Some("phase_start".into())
            }
        );
        assert_eq!(ev.day, None);
    }

    #[test]
    fn non_json_and_missing_type_are_unknown() {
        assert!(decode("not json").is_unknown());
        assert!(decode("[1,2,3]").is_unknown());
        assert!(decode(r#"{"payload":{}}"#).is_unknown());
        assert_eq!(decode("").kind, EventKind::Unknown { kind: None });
    }

    #[test]
    fn unfamiliar_phase_label_does_not_drop_payload() {
        let ev = decode(
            r#"{"type":"chat","day":4,"phase":"Twilight","payload":{"speaker":"System","text":"hm"}}"#,
        );
        assert_eq!(ev.day, Some(4));
        assert_eq!(ev.phase, None);
        assert!(matches!(ev.kind, EventKind::Chat(_)));
    }

    #[test]
    fn game_over_accepts_reason_alias() {
        let ev = decode(r#"{"type":"game_over","payload":{"winner":"TOWN","reason":"all mafia gone"}}"#);
        assert_eq!(
            ev.kind,
            EventKind::GameOver(GameOverPayload {
                winner: "TOWN".into(),
                message: Some("all mafia gone".into()),
            })
        );
    }

    #[test]
    fn decodes_snapshot_payload() {
        let raw = serde_json::json!({
            "type": "snapshot",
            "game_id": "00000000-0000-0000-0000-000000000001",
            "payload": {
                "day": 2,
                "phase": "Voting",
                "seconds_remaining": 30,
                "players": [{"id": "p0", "name": "P0", "role": "Villager", "is_alive": true}],
                "is_paused": true,
                "winner": null
            }
        });
        let ev = decode(&raw.to_string());
        let EventKind::Snapshot(state) = ev.kind else {
            panic!("expected snapshot, got {ev:?}");
        };
        assert_eq!(state.day, 2);
        assert_eq!(state.phase, Phase::Voting);
        assert_eq!(state.players.len(), 1);
        assert!(state.is_paused);
    }

    #[test]
    fn decodes_verdict_tally() {
        let ev = decode_value(serde_json::json!({
            "type": "trial_verdict",
            "ts": 1700000000,
            "day": 2,
            "phase": "Judgment",
            "payload": {
                "accused": "Player_1",
                "verdict": "guilty",
                "tally": {"guilty": 3, "innocent": 1, "abstain": 0}
            }
        }));
        assert_eq!(ev.ts, Some(1_700_000_000));
        let EventKind::TrialVerdict(v) = ev.kind else {
            panic!("expected verdict");
        };
        assert_eq!(v.tally.get("guilty"), Some(&3));
        assert!(v.message.is_none());
    }

    #[test]
    fn kind_names_match_wire() {
        let ev = MatchEvent::bare(EventKind::NightResult(NightResultPayload {
            killed: "a".into(),
            role_revealed: "Villager".into(),
        }));
        assert_eq!(ev.kind_name(), wire::NIGHT_RESULT);
        assert_eq!(
            MatchEvent::bare(EventKind::Unknown { kind: None }).kind_name(),
            "unknown"
        );
    }
}
