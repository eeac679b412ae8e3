//! Append-only narrative log projected from display-relevant events.

use std::fmt;

use crate::event::{EventKind, MatchEvent};
use crate::protocol::Phase;

/// Speaker attributed to engine narration.
pub const SYSTEM_SPEAKER: &str = "System";

/// Which event a [`TranscriptRecord`] was projected from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    PhaseStart,
    GameOver,
    Chat,
    TrialStarted,
    TrialVerdict,
    Execution,
    NightResult,
}

/// A rendering-ready line of the match transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptRecord {
    pub kind: RecordKind,
    pub day: Option<u32>,
    pub phase: Option<Phase>,
    pub ts: Option<i64>,
    pub speaker: String,
    pub text: String,
    /// Narration the engine flagged as private.
    pub private: bool,
}

impl fmt::Display for TranscriptRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.day, self.phase) {
            (Some(day), Some(phase)) => write!(f, "[Day {day} · {phase}] ")?,
            (Some(day), None) => write!(f, "[Day {day}] ")?,
            (None, Some(phase)) => write!(f, "[{phase}] ")?,
            (None, None) => {}
        }
        write!(f, "{}: {}", self.speaker, self.text)
    }
}

/// Project an event onto a transcript record.
///
/// Returns `None` for state-only kinds (`Snapshot`, `PhaseTick`) and for
/// `Unknown`.
pub fn project(event: &MatchEvent) -> Option<TranscriptRecord> {
    let (kind, speaker, text, private) = match &event.kind {
        EventKind::Snapshot(_) | EventKind::PhaseTick(_) | EventKind::Unknown { .. } => {
            return None;
        }
        EventKind::PhaseStart(p) => {
            let phase = event
                .phase
                .map(|ph| ph.label())
                .unwrap_or("A new phase");
            (
                RecordKind::PhaseStart,
                SYSTEM_SPEAKER.to_owned(),
                format!("{phase} begins ({}s).", p.duration_sec),
                false,
            )
        }
        EventKind::GameOver(p) => {
            let text = match &p.message {
                Some(message) => format!("{} wins. {message}", p.winner),
                None => format!("{} wins.", p.winner),
            };
            (RecordKind::GameOver, SYSTEM_SPEAKER.to_owned(), text, false)
        }
        EventKind::Chat(p) => (RecordKind::Chat, p.speaker.clone(), p.text.clone(), p.private),
        EventKind::TrialStarted(p) => {
            let text = p.message.clone().unwrap_or_else(|| {
                format!("{} is on trial with {} votes.", p.accused, p.votes)
            });
            (RecordKind::TrialStarted, SYSTEM_SPEAKER.to_owned(), text, false)
        }
        EventKind::TrialVerdict(p) => {
            let text = p.message.clone().unwrap_or_else(|| {
                format!("{} has been found {}.", p.accused, p.verdict.to_uppercase())
            });
            (RecordKind::TrialVerdict, SYSTEM_SPEAKER.to_owned(), text, false)
        }
        EventKind::Execution(p) => (
            RecordKind::Execution,
            SYSTEM_SPEAKER.to_owned(),
            format!("{} was executed. They were {}.", p.player, p.role_revealed),
            false,
        ),
        EventKind::NightResult(p) => (
            RecordKind::NightResult,
            SYSTEM_SPEAKER.to_owned(),
            format!(
                "{} was killed during the night. They were {}.",
                p.killed, p.role_revealed
            ),
            false,
        ),
    };

    Some(TranscriptRecord {
        kind,
        day: event.day,
        phase: event.phase,
        ts: event.ts,
        speaker,
        text,
        private,
    })
}

/// Ordered, append-only sequence of [`TranscriptRecord`]s.
///
/// There is deliberately no way to remove, reorder or edit a record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscriptLog {
    records: Vec<TranscriptRecord>,
}

impl TranscriptLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Project `event` and append the result. Returns the appended record, if
    /// the event has a projection.
    pub fn record(&mut self, event: &MatchEvent) -> Option<&TranscriptRecord> {
        let record = project(event)?;
        self.records.push(record);
        self.records.last()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[TranscriptRecord] {
        &self.records
    }

    pub fn last(&self) -> Option<&TranscriptRecord> {
        self.records.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TranscriptRecord> {
        self.records.iter()
    }
}

impl<'a> IntoIterator for &'a TranscriptLog {
    type Item = &'a TranscriptRecord;
    type IntoIter = std::slice::Iter<'a, TranscriptRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
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
    use crate::event::{decode, ChatPayload, PhaseTickPayload};

    #[test]
    fn state_only_kinds_have_no_projection() {
        let tick = MatchEvent::bare(EventKind::PhaseTick(PhaseTickPayload {
            seconds_remaining: 3,
        }));
        assert!(project(&tick).is_none());
        assert!(project(&decode(r#"{"type":"mystery","payload":{}}"#)).is_none());
    }

    #[test]
    fn chat_keeps_speaker_and_private_flag() {
        let ev = MatchEvent::bare(EventKind::Chat(ChatPayload {
            speaker: "Player_2".into(),
            text: "I trust no one.".into(),
            private: true,
        }))
        .at(1, Phase::Discussion);
        let rec = project(&ev).unwrap();
        assert_eq!(rec.kind, RecordKind::Chat);
        assert_eq!(rec.speaker, "Player_2");
        assert!(rec.private);
        assert_eq!(rec.to_string(), "[Day 1 · Discussion] Player_2: I trust no one.");
    }

    #[test]
    fn phase_start_text_mentions_duration() {
        let ev = decode(r#"{"type":"phase_start","day":2,"phase":"Night","payload":{"duration_sec":35}}"#);
        let rec = project(&ev).unwrap();
        assert_eq!(rec.kind, RecordKind::PhaseStart);
        assert_eq!(rec.speaker, SYSTEM_SPEAKER);
        assert_eq!(rec.text, "Night begins (35s).");
    }

    #[test]
    fn execution_and_night_result_reveal_roles() {
        let exec = decode(r#"{"type":"execution","payload":{"player":"Player_1","role_revealed":"Mafia"}}"#);
        assert_eq!(
            project(&exec).unwrap().text,
            "Player_1 was executed. They were Mafia."
        );
        let night = decode(r#"{"type":"night_result","payload":{"killed":"Player_3","role_revealed":"Detective"}}"#);
        assert_eq!(
            project(&night).unwrap().text,
            "Player_3 was killed during the night. They were Detective."
        );
    }

    #[test]
    fn engine_message_wins_over_generated_text() {
        let ev = decode(
            r#"{"type":"trial_started","payload":{"accused":"Player_4","votes":3,"message":"Player_4 takes the stand"}}"#,
        );
        assert_eq!(project(&ev).unwrap().text, "Player_4 takes the stand");

        let ev = decode(r#"{"type":"trial_verdict","payload":{"accused":"Player_4","verdict":"innocent"}}"#);
        assert_eq!(
            project(&ev).unwrap().text,
            "Player_4 has been found INNOCENT."
        );
    }

    #[test]
    fn log_appends_in_arrival_order() {
        let mut log = TranscriptLog::new();
        let events = [
            r#"{"type":"chat","payload":{"speaker":"A","text":"one"}}"#,
            r#"{"type":"phase_tick","payload":{"seconds_remaining":9}}"#,
            r#"{"type":"chat","payload":{"speaker":"B","text":"two"}}"#,
            r#"{"type":"unheard_of","payload":{}}"#,
            r#"{"type":"game_over","payload":{"winner":"MAFIA"}}"#,
        ];
        for raw in events {
            log.record(&decode(raw));
        }
        assert_eq!(log.len(), 3);
        let texts: Vec<&str> = log.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, ["one", "two", "MAFIA wins."]);
        assert_eq!(log.last().unwrap().kind, RecordKind::GameOver);
    }
}
