#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for the observer integration tests.
//!
//! Provides a scripted [`MockTransport`], a recording [`MockApi`] whose player
//! refreshes can be held back and released in any order, and helpers that
//! build engine-shaped stream messages.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use deduction_observer::observer::ObserverEvent;
use deduction_observer::protocol::{
    ControlCommand, ExportDocument, MatchId, MatchState, Phase, Player,
};
use deduction_observer::{MatchApi, ObserverError, Transport};
use serde_json::json;
use tokio::sync::{mpsc, oneshot};

// ── MockTransport ───────────────────────────────────────────────────

/// A scripted stream transport.
///
/// Entries are yielded in order by `recv()`. An explicit `None` entry is a
/// clean close; once the script runs out `recv()` never resolves.
pub struct MockTransport {
    incoming: VecDeque<Option<Result<String, ObserverError>>>,
    /// Whether `close()` has been called.
    pub closed: Arc<AtomicBool>,
}

impl MockTransport {
    pub fn new(incoming: Vec<Option<Result<String, ObserverError>>>) -> (Self, Arc<AtomicBool>) {
        let closed = Arc::new(AtomicBool::new(false));
        let transport = Self {
            incoming: VecDeque::from(incoming),
            closed: Arc::clone(&closed),
        };
        (transport, closed)
    }

    /// A transport that never yields a message.
    pub fn idle() -> (Self, Arc<AtomicBool>) {
        Self::new(Vec::new())
    }

    /// Script a sequence of text messages with no close at the end.
    pub fn messages(messages: impl IntoIterator<Item = String>) -> (Self, Arc<AtomicBool>) {
        Self::new(messages.into_iter().map(|m| Some(Ok(m))).collect())
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn recv(&mut self) -> Option<Result<String, ObserverError>> {
        if let Some(item) = self.incoming.pop_front() {
            item
        } else {
            std::future::pending().await
        }
    }

    async fn close(&mut self) -> Result<(), ObserverError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

// ── MockApi ─────────────────────────────────────────────────────────

type PlayersResult = Result<Vec<Player>, ObserverError>;

enum RefreshScript {
    Ready(PlayersResult),
    Gated(oneshot::Receiver<PlayersResult>),
}

/// A [`MatchApi`] backed by in-memory state.
///
/// `fetch_players` consumes scripted responses in call order and falls back
/// to the bootstrap players once the script is empty.
pub struct MockApi {
    state: MatchState,
    fail_bootstrap: bool,
    refreshes: StdMutex<VecDeque<RefreshScript>>,
    /// Number of `fetch_players` calls so far.
    pub players_fetches: AtomicUsize,
    /// Number of `fetch_players` calls that have returned.
    pub players_returned: Arc<AtomicUsize>,
    /// Control commands received, in order.
    pub controls: StdMutex<Vec<ControlCommand>>,
}

impl MockApi {
    pub fn new(state: MatchState) -> Self {
        Self {
            state,
            fail_bootstrap: false,
            refreshes: StdMutex::new(VecDeque::new()),
            players_fetches: AtomicUsize::new(0),
            players_returned: Arc::new(AtomicUsize::new(0)),
            controls: StdMutex::new(Vec::new()),
        }
    }

    /// A backend whose bootstrap fetch answers `404`.
    pub fn unknown_match() -> Self {
        Self {
            fail_bootstrap: true,
            ..Self::new(bootstrap_state())
        }
    }

    /// Queue an immediate `fetch_players` response.
    pub fn push_refresh(&self, result: PlayersResult) {
        self.refreshes
            .lock()
            .unwrap()
            .push_back(RefreshScript::Ready(result));
    }

    /// Queue a `fetch_players` response that is held until the returned
    /// sender is used.
    pub fn push_gated_refresh(&self) -> oneshot::Sender<PlayersResult> {
        let (tx, rx) = oneshot::channel();
        self.refreshes
            .lock()
            .unwrap()
            .push_back(RefreshScript::Gated(rx));
        tx
    }
}

#[async_trait]
impl MatchApi for MockApi {
    async fn fetch_state(&self, _match_id: MatchId) -> Result<MatchState, ObserverError> {
        if self.fail_bootstrap {
            return Err(ObserverError::Status {
                status: 404,
                detail: "Not Found".into(),
            });
        }
        Ok(self.state.clone())
    }

    async fn fetch_players(&self, _match_id: MatchId) -> Result<Vec<Player>, ObserverError> {
        self.players_fetches.fetch_add(1, Ordering::SeqCst);
        let script = self.refreshes.lock().unwrap().pop_front();
        let result = match script {
            Some(RefreshScript::Ready(result)) => result,
            Some(RefreshScript::Gated(rx)) => rx.await.unwrap_or(Err(ObserverError::Timeout)),
            None => Ok(self.state.players.clone()),
        };
        self.players_returned.fetch_add(1, Ordering::SeqCst);
        result
    }

    async fn send_control(
        &self,
        _match_id: MatchId,
        command: ControlCommand,
    ) -> Result<(), ObserverError> {
        self.controls.lock().unwrap().push(command);
        Ok(())
    }

    async fn export(&self, match_id: MatchId, debug: bool) -> Result<ExportDocument, ObserverError> {
        let bytes = serde_json::to_vec_pretty(&self.state)?;
        Ok(ExportDocument::new(match_id, debug, bytes))
    }
}

// ── Fixtures ────────────────────────────────────────────────────────

pub fn match_id() -> MatchId {
    MatchId::from_u128(0x5eed)
}

pub fn player(n: usize, alive: bool, role: &str) -> Player {
    Player {
        id: format!("Player_{n}"),
        name: format!("Player_{n}"),
        role: role.into(),
        is_alive: alive,
    }
}

/// Five living players with hidden roles.
pub fn roster() -> Vec<Player> {
    (0..5).map(|n| player(n, true, "")).collect()
}

/// Day 1, Discussion, 45 seconds left, five living players, no winner.
pub fn bootstrap_state() -> MatchState {
    MatchState {
        game_id: Some(match_id()),
        day: 1,
        phase: Phase::Discussion,
        seconds_remaining: 45,
        transcript: Vec::new(),
        players: roster(),
        is_paused: false,
        winner: None,
    }
}

// ── Stream message helpers ──────────────────────────────────────────

pub fn phase_tick_json(day: u32, phase: &str, seconds_remaining: u32) -> String {
    json!({
        "type": "phase_tick",
        "game_id": match_id(),
        "ts": 1_700_000_000,
        "day": day,
        "phase": phase,
        "payload": {"seconds_remaining": seconds_remaining}
    })
    .to_string()
}

pub fn phase_start_json(day: u32, phase: &str, duration_sec: u32) -> String {
    json!({
        "type": "phase_start",
        "game_id": match_id(),
        "ts": 1_700_000_001,
        "day": day,
        "phase": phase,
        "payload": {"duration_sec": duration_sec}
    })
    .to_string()
}

pub fn game_over_json(winner: &str) -> String {
    json!({
        "type": "game_over",
        "game_id": match_id(),
        "ts": 1_700_000_002,
        "day": 3,
        "phase": "Game Over",
        "payload": {"winner": winner, "message": format!("The {winner} faction has prevailed.")}
    })
    .to_string()
}

pub fn chat_json(speaker: &str, text: &str) -> String {
    json!({
        "type": "chat",
        "game_id": match_id(),
        "ts": 1_700_000_003,
        "day": 1,
        "phase": "Discussion",
        "payload": {"speaker": speaker, "text": text}
    })
    .to_string()
}

pub fn night_result_json(killed: &str, role: &str) -> String {
    json!({
        "type": "night_result",
        "game_id": match_id(),
        "day": 2,
        "phase": "Discussion",
        "payload": {"killed": killed, "role_revealed": role}
    })
    .to_string()
}

pub fn snapshot_json(state: &MatchState) -> String {
    json!({
        "type": "snapshot",
        "game_id": match_id(),
        "payload": state
    })
    .to_string()
}

// ── Event helpers ───────────────────────────────────────────────────

/// Receive the next event or fail after two seconds.
pub async fn next_event(events: &mut mpsc::Receiver<ObserverEvent>) -> ObserverEvent {
    tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("timed out waiting for an observer event")
        .expect("event channel closed")
}

/// Receive events until one matches `pred`, returning it.
pub async fn wait_for<F>(events: &mut mpsc::Receiver<ObserverEvent>, mut pred: F) -> ObserverEvent
where
    F: FnMut(&ObserverEvent) -> bool,
{
    loop {
        let event = next_event(events).await;
        if pred(&event) {
            return event;
        }
    }
}

/// Drain the initial `Connected` and bootstrap `ViewChanged` events.
pub async fn skip_bootstrap(events: &mut mpsc::Receiver<ObserverEvent>) {
    assert_eq!(next_event(events).await, ObserverEvent::Connected);
    assert!(matches!(
        next_event(events).await,
        ObserverEvent::ViewChanged(_)
    ));
}
