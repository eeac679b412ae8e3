//! The state reconciler: folds bootstrap snapshots, stream events and player
//! refreshes into one canonical [`MatchView`].
//!
//! [`apply`] is a pure function of `(view, event)` and carries no transport
//! concerns, so every reconciliation rule is testable without a connection.
//! [`Reconciler`] wraps it together with the [`TranscriptLog`] and is what the
//! dispatch loop in [`observer`](crate::observer) drives.
//!
//! Two latches hold across every update path:
//!
//! - `winner` is set at most once and never cleared or replaced.
//! - a player observed dead stays dead, even if a late or stale player list
//!   says otherwise.

use tracing::{debug, warn};

use crate::event::{decode_value, EventKind, MatchEvent};
use crate::protocol::{Faction, MatchState, Phase, Player};
use crate::transcript::{TranscriptLog, TranscriptRecord};

// ── View ────────────────────────────────────────────────────────────

/// The observer's canonical view of a match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchView {
    pub day: u32,
    pub phase: Phase,
    pub seconds_remaining: u32,
    pub is_paused: bool,
    pub winner: Option<Faction>,
    pub players: Vec<Player>,
}

impl Default for MatchView {
    fn default() -> Self {
        Self {
            day: 1,
            phase: Phase::default(),
            seconds_remaining: 0,
            is_paused: false,
            winner: None,
            players: Vec::new(),
        }
    }
}

impl MatchView {
    /// Returns `true` once a winner has been announced.
    pub fn is_terminal(&self) -> bool {
        self.winner.is_some()
    }

    /// Look up a player by id.
    pub fn player(&self, id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    /// Number of players still alive.
    pub fn alive_count(&self) -> usize {
        self.players.iter().filter(|p| p.is_alive).count()
    }
}

/// Why a players refresh was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshReason {
    /// A phase transition may have killed someone and revealed a role.
    PhaseStart,
    /// The match ended; the engine reveals every role.
    GameOver,
}

/// Result of [`apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    pub view: MatchView,
    /// Set when the stream payload cannot carry the per-player state this
    /// event implies.
    pub refresh: Option<RefreshReason>,
}

// ── Pure reconciliation ─────────────────────────────────────────────

/// Apply one decoded event to `view`.
///
/// | kind | view | refresh |
/// |------|------|---------|
/// | `Snapshot` | day, phase, seconds, players, paused, winner (if present) | no |
/// | `PhaseTick` | day, phase, seconds | no |
/// | `PhaseStart` | day, phase, seconds := `duration_sec` | players |
/// | `GameOver` | phase := GameOver, winner := payload winner | players |
/// | narrative kinds | unchanged | no |
/// | `Unknown` | unchanged | no |
pub fn apply(mut view: MatchView, event: &MatchEvent) -> Applied {
    let refresh = match &event.kind {
        EventKind::Snapshot(state) => {
            view = apply_snapshot(view, state);
            None
        }
        EventKind::PhaseTick(tick) => {
            set_clock(&mut view, event);
            view.seconds_remaining = tick.seconds_remaining;
            None
        }
        EventKind::PhaseStart(start) => {
            set_clock(&mut view, event);
            view.seconds_remaining = start.duration_sec;
            Some(RefreshReason::PhaseStart)
        }
        EventKind::GameOver(over) => {
            view.phase = Phase::GameOver;
            latch_winner(&mut view.winner, Some(over.winner.clone()));
            Some(RefreshReason::GameOver)
        }
        EventKind::Chat(_)
        | EventKind::TrialStarted(_)
        | EventKind::TrialVerdict(_)
        | EventKind::Execution(_)
        | EventKind::NightResult(_) => None,
        EventKind::Unknown { .. } => None,
    };
    Applied { view, refresh }
}

/// Replace the view's fields with those of a full state document.
///
/// `winner` is only taken when present; an absent winner never clears one
/// already latched.
pub fn apply_snapshot(mut view: MatchView, state: &MatchState) -> MatchView {
    view.day = state.day;
    view.phase = state.phase;
    view.seconds_remaining = state.seconds_remaining;
    view.is_paused = state.is_paused;
    latch_winner(&mut view.winner, state.winner.clone());
    view.players = merge_players(&view.players, state.players.clone());
    view
}

/// Replace the player list wholesale, keeping the death latch.
pub fn replace_players(mut view: MatchView, players: Vec<Player>) -> MatchView {
    if !view.players.is_empty() && view.players.len() != players.len() {
        warn!(
            previous = view.players.len(),
            incoming = players.len(),
            "player list changed length mid-match"
        );
    }
    view.players = merge_players(&view.players, players);
    view
}

fn set_clock(view: &mut MatchView, event: &MatchEvent) {
    if let Some(day) = event.day {
        view.day = day;
    }
    if let Some(phase) = event.phase {
        view.phase = phase;
    }
}

fn latch_winner(current: &mut Option<Faction>, incoming: Option<Faction>) {
    match (current.as_ref(), incoming) {
        (_, None) => {}
        (None, Some(winner)) => {
            debug!(winner = %winner, "winner latched");
            *current = Some(winner);
        }
        (Some(existing), Some(winner)) => {
            if *existing != winner {
                warn!(existing = %existing, ignored = %winner, "winner already set; ignoring");
            }
        }
    }
}

fn merge_players(previous: &[Player], mut incoming: Vec<Player>) -> Vec<Player> {
    for player in &mut incoming {
        if !player.is_alive {
            continue;
        }
        let known_dead = previous
            .iter()
            .any(|p| p.id == player.id && !p.is_alive);
        if known_dead {
            warn!(player = %player.id, "incoming player list revives a dead player; keeping them dead");
            player.is_alive = false;
        }
    }
    incoming
}

// ── Reconciler ──────────────────────────────────────────────────────

/// What a single [`Reconciler::handle`] call produced.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Dispatch {
    /// The view's fields may have changed.
    pub view_changed: bool,
    /// Record appended to the transcript, if any.
    pub record: Option<TranscriptRecord>,
    /// A players refresh should be issued.
    pub refresh: Option<RefreshReason>,
    /// Set only by the event that latched the winner.
    pub winner_latched: Option<Faction>,
}

/// Owns the canonical [`MatchView`] and its [`TranscriptLog`].
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    view: MatchView,
    transcript: TranscriptLog,
}

impl Reconciler {
    /// An empty reconciler holding the default view.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the view and transcript from a bootstrap fetch.
    ///
    /// The bootstrap transcript goes through the same decoder and projection
    /// as live events, so malformed or unknown entries are skipped.
    pub fn bootstrap(&mut self, state: &MatchState) -> Option<Faction> {
        let was_terminal = self.view.is_terminal();
        self.view = apply_snapshot(std::mem::take(&mut self.view), state);
        for raw in &state.transcript {
            self.transcript.record(&decode_value(raw.clone()));
        }
        debug!(
            day = self.view.day,
            phase = %self.view.phase,
            players = self.view.players.len(),
            transcript = self.transcript.len(),
            "bootstrap applied"
        );
        if was_terminal {
            None
        } else {
            self.view.winner.clone()
        }
    }

    /// Apply one stream event and append its transcript record, if any.
    pub fn handle(&mut self, event: &MatchEvent) -> Dispatch {
        if event.is_unknown() {
            return Dispatch::default();
        }

        let was_terminal = self.view.is_terminal();
        let applied = apply(std::mem::take(&mut self.view), event);
        self.view = applied.view;

        let view_changed = matches!(
            event.kind,
            EventKind::Snapshot(_)
                | EventKind::PhaseTick(_)
                | EventKind::PhaseStart(_)
                | EventKind::GameOver(_)
        );
        let record = self.transcript.record(event).cloned();
        let winner_latched = if was_terminal {
            None
        } else {
            self.view.winner.clone()
        };

        Dispatch {
            view_changed,
            record,
            refresh: applied.refresh,
            winner_latched,
        }
    }

    /// Replace the player list with the result of a refresh.
    pub fn replace_players(&mut self, players: Vec<Player>) {
        self.view = replace_players(std::mem::take(&mut self.view), players);
    }

    pub fn view(&self) -> &MatchView {
        &self.view
    }

    pub fn transcript(&self) -> &TranscriptLog {
        &self.transcript
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
    use crate::event::{decode, GameOverPayload, PhaseStartPayload, PhaseTickPayload};

    fn player(id: &str, alive: bool) -> Player {
        Player {
            id: id.into(),
            name: id.into(),
            role: String::new(),
            is_alive: alive,
        }
    }

    fn state(day: u32, phase: Phase, seconds: u32, players: Vec<Player>) -> MatchState {
        MatchState {
            game_id: None,
            day,
            phase,
            seconds_remaining: seconds,
            transcript: Vec::new(),
            players,
            is_paused: false,
            winner: None,
        }
    }

    #[test]
    fn default_view_starts_on_day_one() {
        let view = MatchView::default();
        assert_eq!(view.day, 1);
        assert_eq!(view.phase, Phase::Discussion);
        assert!(!view.is_terminal());
    }

    #[test]
    fn phase_tick_only_touches_the_clock() {
        let view = apply_snapshot(
            MatchView::default(),
            &state(1, Phase::Discussion, 45, vec![player("a", true)]),
        );
        let before_players = view.players.clone();
        let ev = MatchEvent::bare(EventKind::PhaseTick(PhaseTickPayload {
            seconds_remaining: 44,
        }))
        .at(1, Phase::Discussion);
        let applied = apply(view, &ev);
        assert_eq!(applied.view.seconds_remaining, 44);
        assert_eq!(applied.view.players, before_players);
        assert!(applied.view.winner.is_none());
        assert!(applied.refresh.is_none());
    }

    #[test]
    fn phase_tick_without_envelope_keeps_day_and_phase() {
        let view = MatchView {
            day: 3,
            phase: Phase::Defense,
            ..MatchView::default()
        };
        let ev = MatchEvent::bare(EventKind::PhaseTick(PhaseTickPayload {
            seconds_remaining: 7,
        }));
        let applied = apply(view, &ev);
        assert_eq!(applied.view.day, 3);
        assert_eq!(applied.view.phase, Phase::Defense);
        assert_eq!(applied.view.seconds_remaining, 7);
    }

    #[test]
    fn phase_start_uses_duration_and_asks_for_refresh() {
        let ev = MatchEvent::bare(EventKind::PhaseStart(PhaseStartPayload { duration_sec: 35 }))
            .at(2, Phase::Night);
        let applied = apply(MatchView::default(), &ev);
        assert_eq!(applied.view.day, 2);
        assert_eq!(applied.view.phase, Phase::Night);
        assert_eq!(applied.view.seconds_remaining, 35);
        assert_eq!(applied.refresh, Some(RefreshReason::PhaseStart));
    }

    #[test]
    fn game_over_latches_winner_once() {
        let over = |w: &str| {
            MatchEvent::bare(EventKind::GameOver(GameOverPayload {
                winner: w.into(),
                message: None,
            }))
        };
        let applied = apply(MatchView::default(), &over("TOWN"));
        assert_eq!(applied.view.phase, Phase::GameOver);
        assert_eq!(applied.view.winner.as_deref(), Some("TOWN"));
        assert_eq!(applied.refresh, Some(RefreshReason::GameOver));

        let applied = apply(applied.view, &over("MAFIA"));
        assert_eq!(applied.view.winner.as_deref(), Some("TOWN"));
    }

    #[test]
    fn snapshot_without_winner_keeps_latched_winner() {
        let view = MatchView {
            winner: Some("MAFIA".into()),
            phase: Phase::GameOver,
            ..MatchView::default()
        };
        let view = apply_snapshot(view, &state(4, Phase::GameOver, 0, vec![]));
        assert_eq!(view.winner.as_deref(), Some("MAFIA"));
    }

    #[test]
    fn snapshot_replaces_every_field() {
        let view = MatchView {
            day: 9,
            phase: Phase::Night,
            seconds_remaining: 99,
            is_paused: true,
            winner: None,
            players: vec![player("x", true)],
        };
        let mut s = state(2, Phase::Voting, 30, vec![player("a", true), player("b", true)]);
        s.is_paused = false;
        let view = apply_snapshot(view, &s);
        assert_eq!(view.day, 2);
        assert_eq!(view.phase, Phase::Voting);
        assert_eq!(view.seconds_remaining, 30);
        assert!(!view.is_paused);
        assert_eq!(view.players, s.players);
    }

    #[test]
    fn dead_players_stay_dead() {
        let view = MatchView {
            players: vec![player("a", false), player("b", true)],
            ..MatchView::default()
        };
        let view = replace_players(view, vec![player("a", true), player("b", false)]);
        assert!(!view.player("a").unwrap().is_alive);
        assert!(!view.player("b").unwrap().is_alive);
        assert_eq!(view.alive_count(), 0);
    }

    #[test]
    fn narrative_and_unknown_events_leave_view_alone() {
        let view = apply_snapshot(
            MatchView::default(),
            &state(2, Phase::Defense, 20, vec![player("a", true)]),
        );
        for raw in [
            r#"{"type":"chat","payload":{"speaker":"a","text":"hello"}}"#,
            r#"{"type":"execution","payload":{"player":"a","role_revealed":"Mafia"}}"#,
            r#"{"type":"new_fangled","payload":{"x":1}}"#,
        ] {
            let applied = apply(view.clone(), &decode(raw));
            assert_eq!(applied.view, view);
            assert!(applied.refresh.is_none());
        }
    }

    #[test]
    fn reconciler_bootstrap_seeds_transcript() {
        let mut s = state(2, Phase::Discussion, 40, vec![player("a", true)]);
        s.transcript = vec![
            serde_json::json!({"type":"chat","day":1,"phase":"Discussion","payload":{"speaker":"a","text":"hi"}}),
            serde_json::json!({"type":"defense_speech","payload":{"speaker":"a","text":"not me"}}),
            serde_json::json!({"type":"night_result","day":2,"phase":"Discussion","payload":{"killed":"b","role_revealed":"Villager"}}),
        ];
        let mut r = Reconciler::new();
        assert!(r.bootstrap(&s).is_none());
        assert_eq!(r.transcript().len(), 2);
        assert_eq!(r.view().day, 2);
    }

    #[test]
    fn reconciler_reports_winner_latch_once() {
        let mut r = Reconciler::new();
        let raw = r#"{"type":"game_over","day":3,"phase":"Game Over","payload":{"winner":"TOWN"}}"#;
        let first = r.handle(&decode(raw));
        assert_eq!(first.winner_latched.as_deref(), Some("TOWN"));
        assert!(first.record.is_some());
        let second = r.handle(&decode(raw));
        assert!(second.winner_latched.is_none());
        assert_eq!(r.transcript().len(), 2);
    }

    #[test]
    fn reconciler_ignores_unknown() {
        let mut r = Reconciler::new();
        let d = r.handle(&decode(r#"{"type":"whatever"}"#));
        assert_eq!(d, Dispatch::default());
        assert!(r.transcript().is_empty());
    }
}
