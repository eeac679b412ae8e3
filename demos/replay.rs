//! # Replay Example
//!
//! Shows how to plug your own [`Transport`] and [`MatchApi`] into
//! [`MatchObserver`]. Here both are in-process: the "engine" is a channel fed
//! from a recorded list of stream messages, and the HTTP side is a fixed
//! roster. This is useful for:
//!
//! - **Testing** UI or analytics code against a known match without an engine
//! - **Replaying** a saved stream log through the same reconciliation path
//!
//! ## Running
//!
//! ```sh
//! cargo run --example replay
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use deduction_observer::protocol::{
    ControlCommand, ExportDocument, MatchId, MatchState, Phase, Player,
};
use deduction_observer::{
    MatchApi, MatchObserver, ObserverConfig, ObserverError, ObserverEvent, Transport,
};
use serde_json::json;
use tokio::sync::mpsc;

// ─────────────────────────────────────────────────────────────────────
// Step 1: A channel-backed stream transport
// ─────────────────────────────────────────────────────────────────────

/// Yields whatever is pushed into the paired sender. Dropping the sender is a
/// clean close.
struct ReplayTransport {
    rx: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl Transport for ReplayTransport {
    /// Cancel-safe because `UnboundedReceiver::recv` is.
    async fn recv(&mut self) -> Option<Result<String, ObserverError>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), ObserverError> {
        self.rx.close();
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 2: An in-memory engine API
// ─────────────────────────────────────────────────────────────────────

/// Serves the opening state for the bootstrap and the final roster for every
/// players refresh.
struct ReplayApi {
    opening: MatchState,
    final_roster: Vec<Player>,
}

#[async_trait]
impl MatchApi for ReplayApi {
    async fn fetch_state(&self, _match_id: MatchId) -> Result<MatchState, ObserverError> {
        Ok(self.opening.clone())
    }

    async fn fetch_players(&self, _match_id: MatchId) -> Result<Vec<Player>, ObserverError> {
        Ok(self.final_roster.clone())
    }

    async fn send_control(
        &self,
        _match_id: MatchId,
        command: ControlCommand,
    ) -> Result<(), ObserverError> {
        tracing::info!("Replay ignores control command {command}");
        Ok(())
    }

    async fn export(&self, match_id: MatchId, debug: bool) -> Result<ExportDocument, ObserverError> {
        let mut state = self.opening.clone();
        state.players = self.final_roster.clone();
        Ok(ExportDocument::new(
            match_id,
            debug,
            serde_json::to_vec_pretty(&state)?,
        ))
    }
}

fn player(n: usize, role: &str, is_alive: bool) -> Player {
    Player {
        id: format!("Player_{n}"),
        name: format!("Player_{n}"),
        role: role.into(),
        is_alive,
    }
}

/// A short recorded match: one day of talk, a trial, a night kill and a Town win.
fn recorded_stream() -> Vec<String> {
    [
        json!({"type": "chat", "day": 1, "phase": "Discussion",
               "payload": {"speaker": "Player_0", "text": "Player_3 was quiet all day."}}),
        json!({"type": "phase_start", "day": 1, "phase": "Voting",
               "payload": {"duration_sec": 30}}),
        json!({"type": "trial_started", "day": 1, "phase": "Defense",
               "payload": {"accused": "Player_3", "votes": 3}}),
        json!({"type": "execution", "day": 1, "phase": "Last Words",
               "payload": {"player": "Player_3", "role_revealed": "Mafia"}}),
        json!({"type": "phase_start", "day": 1, "phase": "Night",
               "payload": {"duration_sec": 35}}),
        json!({"type": "night_result", "day": 2, "phase": "Discussion",
               "payload": {"killed": "Player_1", "role_revealed": "Doctor"}}),
        json!({"type": "game_over", "day": 2, "phase": "Game Over",
               "payload": {"winner": "Town", "message": "The last Mafia member is gone."}}),
    ]
    .iter()
    .map(ToString::to_string)
    .collect()
}

// ─────────────────────────────────────────────────────────────────────
// Step 3: Observe the replay
// ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let match_id = MatchId::from_u128(1);
    let api = ReplayApi {
        opening: MatchState {
            game_id: Some(match_id),
            day: 1,
            phase: Phase::Discussion,
            seconds_remaining: 45,
            players: (0..5).map(|n| player(n, "", true)).collect(),
            ..MatchState::default()
        },
        final_roster: vec![
            player(0, "Sheriff", true),
            player(1, "Doctor", false),
            player(2, "Villager", true),
            player(3, "Mafia", false),
            player(4, "Villager", true),
        ],
    };

    let (tx, rx) = mpsc::unbounded_channel();
    let (mut observer, mut events) = MatchObserver::open(
        match_id,
        Arc::new(api),
        ReplayTransport { rx },
        ObserverConfig::default(),
    )
    .await?;

    // Feed the recording, then drop the sender to end the stream.
    for message in recorded_stream() {
        tx.send(message)?;
    }
    drop(tx);

    while let Some(event) = events.recv().await {
        match event {
            ObserverEvent::TranscriptAppended(record) => println!("{record}"),
            ObserverEvent::GameOver { winner } => println!("*** {winner} wins ***"),
            ObserverEvent::Disconnected { .. } => break,
            _ => {}
        }
    }

    // Refreshes still in flight at the end of the stream were applied before
    // `Disconnected`, so the roster shows the final roles.
    let view = observer.view().await;
    for p in &view.players {
        let status = if p.is_alive { "alive" } else { "dead" };
        println!("{:<9} {:<9} {status}", p.name, p.role);
    }

    observer.shutdown().await;
    Ok(())
}
