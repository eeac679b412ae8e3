#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Integration tests for `MatchObserver`.
//!
//! Drives the observer with a scripted `MockTransport` and a `MockApi` whose
//! refresh responses can be held and released in any order.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use deduction_observer::protocol::{ControlCommand, MatchState, Phase};
use deduction_observer::{
    MatchObserver, ObserverConfig, ObserverError, ObserverEvent, RefreshOrdering, RefreshReason,
};
use serde_json::json;
use tokio::sync::mpsc;

use common::{
    bootstrap_state, chat_json, game_over_json, match_id, next_event, night_result_json,
    phase_start_json, phase_tick_json, player, roster, skip_bootstrap, snapshot_json, wait_for,
    MockApi, MockTransport,
};

// ════════════════════════════════════════════════════════════════════
// Helper
// ════════════════════════════════════════════════════════════════════

async fn open_with(
    api: Arc<MockApi>,
    transport: MockTransport,
    config: ObserverConfig,
) -> (MatchObserver, mpsc::Receiver<ObserverEvent>) {
    MatchObserver::open(match_id(), api, transport, config)
        .await
        .unwrap()
}

async fn open(
    api: Arc<MockApi>,
    transport: MockTransport,
) -> (MatchObserver, mpsc::Receiver<ObserverEvent>) {
    open_with(api, transport, ObserverConfig::default()).await
}

fn is_refresh_settled(event: &ObserverEvent) -> bool {
    matches!(
        event,
        ObserverEvent::RefreshApplied { .. }
            | ObserverEvent::RefreshDiscarded { .. }
            | ObserverEvent::RefreshFailed { .. }
    )
}

// ════════════════════════════════════════════════════════════════════
// Bootstrap
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn bootstrap_populates_view_before_stream() {
    let api = Arc::new(MockApi::new(bootstrap_state()));
    let (transport, _closed) = MockTransport::idle();
    let (mut observer, mut events) = open(Arc::clone(&api), transport).await;

    assert_eq!(next_event(&mut events).await, ObserverEvent::Connected);
    match next_event(&mut events).await {
        ObserverEvent::ViewChanged(view) => {
            assert_eq!(view.day, 1);
            assert_eq!(view.phase, Phase::Discussion);
            assert_eq!(view.seconds_remaining, 45);
            assert_eq!(view.alive_count(), 5);
            assert!(view.winner.is_none());
        }
        other => panic!("expected ViewChanged, got {other:?}"),
    }
    assert!(observer.is_connected());
    assert_eq!(observer.transcript_len().await, 0);

    observer.shutdown().await;
}

#[tokio::test]
async fn bootstrap_failure_is_returned_from_open() {
    let api = Arc::new(MockApi::unknown_match());
    let (transport, closed) = MockTransport::messages([phase_tick_json(1, "Discussion", 1)]);

    let err = MatchObserver::open(match_id(), api, transport, ObserverConfig::default())
        .await
        .unwrap_err();

    assert!(matches!(err, ObserverError::Status { status: 404, .. }));
    assert!(closed.load(Ordering::Relaxed));
}

#[tokio::test]
async fn terminal_bootstrap_reports_winner_immediately() {
    let state = MatchState {
        phase: Phase::GameOver,
        winner: Some("Mafia".into()),
        ..bootstrap_state()
    };
    let api = Arc::new(MockApi::new(state));
    let (transport, _closed) = MockTransport::idle();
    let (mut observer, mut events) = open(api, transport).await;

    skip_bootstrap(&mut events).await;
    assert_eq!(
        next_event(&mut events).await,
        ObserverEvent::GameOver {
            winner: "Mafia".into()
        }
    );
    assert!(observer.view().await.is_terminal());

    observer.shutdown().await;
}

#[tokio::test]
async fn bootstrap_transcript_seeds_log_through_decoder() {
    let state = MatchState {
        transcript: vec![
            json!({"type": "phase_start", "day": 1, "phase": "Discussion", "payload": {"duration_sec": 45}}),
            json!({"type": "chat", "day": 1, "phase": "Discussion",
                   "payload": {"speaker": "Player_2", "text": "Morning."}}),
            json!({"type": "defense_speech", "payload": {"speaker": "Player_3", "text": "Not me."}}),
            json!({"type": "chat", "payload": {"text": "no speaker"}}),
        ],
        ..bootstrap_state()
    };
    let api = Arc::new(MockApi::new(state));
    let (transport, _closed) = MockTransport::idle();
    let (mut observer, mut events) = open(Arc::clone(&api), transport).await;
    skip_bootstrap(&mut events).await;

    let transcript = observer.transcript().await;
    assert_eq!(transcript.len(), 2);
    assert_eq!(transcript[1].to_string(), "[Day 1 · Discussion] Player_2: Morning.");
    // Seeding the transcript does not trigger refreshes.
    assert_eq!(api.players_fetches.load(Ordering::SeqCst), 0);

    observer.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Stream dispatch scenarios
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn phase_tick_updates_clock_only() {
    let api = Arc::new(MockApi::new(bootstrap_state()));
    let (transport, _closed) = MockTransport::messages([phase_tick_json(1, "Discussion", 44)]);
    let (mut observer, mut events) = open(Arc::clone(&api), transport).await;
    skip_bootstrap(&mut events).await;

    match next_event(&mut events).await {
        ObserverEvent::ViewChanged(view) => {
            assert_eq!(view.day, 1);
            assert_eq!(view.phase, Phase::Discussion);
            assert_eq!(view.seconds_remaining, 44);
            assert_eq!(view.players, roster());
            assert!(view.winner.is_none());
        }
        other => panic!("expected ViewChanged, got {other:?}"),
    }
    assert_eq!(observer.transcript_len().await, 0);
    assert_eq!(api.players_fetches.load(Ordering::SeqCst), 0);

    observer.shutdown().await;
}

#[tokio::test]
async fn phase_start_appends_and_requests_refresh() {
    let api = Arc::new(MockApi::new(bootstrap_state()));
    let (transport, _closed) = MockTransport::messages([phase_start_json(2, "Night", 35)]);
    let (mut observer, mut events) = open(Arc::clone(&api), transport).await;
    skip_bootstrap(&mut events).await;

    match next_event(&mut events).await {
        ObserverEvent::ViewChanged(view) => {
            assert_eq!(view.day, 2);
            assert_eq!(view.phase, Phase::Night);
            assert_eq!(view.seconds_remaining, 35);
        }
        other => panic!("expected ViewChanged, got {other:?}"),
    }
    match next_event(&mut events).await {
        ObserverEvent::TranscriptAppended(record) => {
            assert_eq!(record.to_string(), "[Day 2 · Night] System: Night begins (35s).");
        }
        other => panic!("expected TranscriptAppended, got {other:?}"),
    }
    assert_eq!(
        next_event(&mut events).await,
        ObserverEvent::RefreshRequested {
            seq: 1,
            reason: RefreshReason::PhaseStart
        }
    );
    assert_eq!(
        next_event(&mut events).await,
        ObserverEvent::RefreshApplied {
            seq: 1,
            out_of_order: false
        }
    );
    assert_eq!(observer.transcript_len().await, 1);
    assert_eq!(api.players_fetches.load(Ordering::SeqCst), 1);

    observer.shutdown().await;
}

#[tokio::test]
async fn game_over_latches_winner_once() {
    let mut later = bootstrap_state();
    later.winner = Some("Mafia".into());
    later.phase = Phase::GameOver;

    let api = Arc::new(MockApi::new(bootstrap_state()));
    let (transport, _closed) = MockTransport::messages([
        game_over_json("Town"),
        phase_tick_json(3, "Game Over", 0),
        snapshot_json(&later),
        game_over_json("Mafia"),
        chat_json("Player_0", "gg"),
    ]);
    let (mut observer, mut events) = open(Arc::clone(&api), transport).await;
    skip_bootstrap(&mut events).await;

    let mut game_overs = Vec::new();
    let mut appended = 0;
    loop {
        match next_event(&mut events).await {
            ObserverEvent::GameOver { winner } => game_overs.push(winner),
            ObserverEvent::TranscriptAppended(record) => {
                appended += 1;
                if record.text == "gg" {
                    break;
                }
            }
            ObserverEvent::ViewChanged(view) => {
                assert_eq!(view.winner.as_deref(), Some("Town"));
            }
            _ => {}
        }
    }

    assert_eq!(game_overs, ["Town"]);
    assert_eq!(appended, 3);
    let view = observer.view().await;
    assert_eq!(view.phase, Phase::GameOver);
    assert_eq!(view.winner.as_deref(), Some("Town"));

    observer.shutdown().await;
}

#[tokio::test]
async fn snapshot_replaces_view_fields() {
    let mut state = bootstrap_state();
    state.day = 3;
    state.phase = Phase::Voting;
    state.seconds_remaining = 20;
    state.is_paused = true;
    state.players[4].is_alive = false;
    state.players[4].role = "Sheriff".into();

    let api = Arc::new(MockApi::new(bootstrap_state()));
    let (transport, _closed) = MockTransport::messages([snapshot_json(&state)]);
    let (mut observer, mut events) = open(Arc::clone(&api), transport).await;
    skip_bootstrap(&mut events).await;

    match next_event(&mut events).await {
        ObserverEvent::ViewChanged(view) => {
            assert_eq!(view.day, 3);
            assert_eq!(view.phase, Phase::Voting);
            assert_eq!(view.seconds_remaining, 20);
            assert!(view.is_paused);
            assert_eq!(view.players, state.players);
            assert!(view.winner.is_none());
        }
        other => panic!("expected ViewChanged, got {other:?}"),
    }
    assert_eq!(observer.transcript_len().await, 0);
    assert_eq!(api.players_fetches.load(Ordering::SeqCst), 0);

    observer.shutdown().await;
}

#[tokio::test]
async fn unknown_and_malformed_messages_are_dropped() {
    let api = Arc::new(MockApi::new(bootstrap_state()));
    let (transport, _closed) = MockTransport::messages([
        "not json at all".to_string(),
        r#"{"type":"defense_speech","payload":{"speaker":"Player_1","text":"I am innocent"}}"#
            .to_string(),
        r#"{"type":"phase_tick","payload":{}}"#.to_string(),
        r#"{"payload":{"seconds_remaining":3}}"#.to_string(),
        r#"[1,2,3]"#.to_string(),
        chat_json("Player_3", "Anyone?"),
    ]);
    let (mut observer, mut events) = open(Arc::clone(&api), transport).await;
    skip_bootstrap(&mut events).await;

    match next_event(&mut events).await {
        ObserverEvent::TranscriptAppended(record) => {
            assert_eq!(record.speaker, "Player_3");
        }
        other => panic!("dropped messages must not emit events, got {other:?}"),
    }
    assert_eq!(observer.view().await.seconds_remaining, 45);
    assert!(observer.is_connected());

    observer.shutdown().await;
}

#[tokio::test]
async fn transcript_length_counts_appendable_events() {
    let messages = vec![
        phase_tick_json(1, "Discussion", 40),
        chat_json("Player_0", "hi"),
        r#"{"type":"trial_started","day":1,"phase":"Defense","payload":{"accused":"Player_2","votes":3}}"#.to_string(),
        phase_tick_json(1, "Defense", 10),
        r#"{"type":"trial_verdict","day":1,"phase":"Judgment","payload":{"accused":"Player_2","verdict":"GUILTY","tally":{"guilty":3,"innocent":1}}}"#.to_string(),
        r#"{"type":"execution","day":1,"phase":"Last Words","payload":{"player":"Player_2","role_revealed":"Mafia"}}"#.to_string(),
        r#"{"type":"mystery","payload":{}}"#.to_string(),
        night_result_json("Player_4", "Doctor"),
        chat_json("Player_1", "last"),
    ];
    let appendable = 6;

    let api = Arc::new(MockApi::new(bootstrap_state()));
    let (transport, _closed) = MockTransport::messages(messages);
    let (mut observer, mut events) = open(Arc::clone(&api), transport).await;
    skip_bootstrap(&mut events).await;

    let mut appended = Vec::new();
    while appended.len() < appendable {
        if let ObserverEvent::TranscriptAppended(record) = next_event(&mut events).await {
            appended.push(record);
        }
    }
    assert_eq!(appended.last().unwrap().text, "last");
    assert_eq!(observer.transcript_len().await, appendable);
    assert_eq!(observer.transcript().await, appended);

    observer.shutdown().await;
}

#[tokio::test]
async fn dead_players_never_revive() {
    let mut first = bootstrap_state();
    first.players[2].is_alive = false;
    first.players[2].role = "Mafia".into();
    let revived = bootstrap_state();

    let api = Arc::new(MockApi::new(bootstrap_state()));
    api.push_refresh(Ok(roster()));
    let (transport, _closed) = MockTransport::messages([
        snapshot_json(&first),
        snapshot_json(&revived),
        phase_start_json(2, "Discussion", 45),
    ]);
    let (mut observer, mut events) = open(Arc::clone(&api), transport).await;
    skip_bootstrap(&mut events).await;

    let mut saw_dead = false;
    loop {
        let event = next_event(&mut events).await;
        if let ObserverEvent::ViewChanged(view) = &event {
            let p2 = view.player("Player_2").unwrap();
            if saw_dead {
                assert!(!p2.is_alive, "Player_2 was observed alive after death");
            }
            saw_dead |= !p2.is_alive;
        }
        if is_refresh_settled(&event) {
            break;
        }
    }
    assert!(saw_dead);
    assert!(!observer.view().await.player("Player_2").unwrap().is_alive);

    observer.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Refresh ordering
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn stale_refresh_wins_when_it_arrives_last() {
    let api = Arc::new(MockApi::new(bootstrap_state()));
    let stale_gate = api.push_gated_refresh();
    let fresh_gate = api.push_gated_refresh();
    let (transport, _closed) = MockTransport::messages([
        phase_start_json(1, "Night", 35),
        phase_start_json(2, "Discussion", 45),
    ]);
    let (mut observer, mut events) = open(Arc::clone(&api), transport).await;
    skip_bootstrap(&mut events).await;

    wait_for(&mut events, |e| {
        matches!(e, ObserverEvent::RefreshRequested { seq: 2, .. })
    })
    .await;

    let mut fresh = roster();
    fresh[1] = player(1, false, "Doctor");
    fresh_gate.send(Ok(fresh)).unwrap();
    assert_eq!(
        wait_for(&mut events, is_refresh_settled).await,
        ObserverEvent::RefreshApplied {
            seq: 2,
            out_of_order: false
        }
    );

    // The response to the older request arrives last and overwrites.
    stale_gate.send(Ok(roster())).unwrap();
    assert_eq!(
        wait_for(&mut events, is_refresh_settled).await,
        ObserverEvent::RefreshApplied {
            seq: 1,
            out_of_order: true
        }
    );

    let view = observer.view().await;
    let p1 = view.player("Player_1").unwrap();
    assert_eq!(p1.role, "", "stale roster should have replaced the fresh one");
    assert!(!p1.is_alive, "the death latch still holds");
    assert_eq!(view.day, 2);

    observer.shutdown().await;
}

#[tokio::test]
async fn request_order_discards_stale_refresh() {
    let api = Arc::new(MockApi::new(bootstrap_state()));
    let stale_gate = api.push_gated_refresh();
    let fresh_gate = api.push_gated_refresh();
    let (transport, _closed) = MockTransport::messages([
        phase_start_json(1, "Night", 35),
        phase_start_json(2, "Discussion", 45),
    ]);
    let config = ObserverConfig::default().with_refresh_ordering(RefreshOrdering::RequestOrder);
    let (mut observer, mut events) = open_with(Arc::clone(&api), transport, config).await;
    skip_bootstrap(&mut events).await;

    wait_for(&mut events, |e| {
        matches!(e, ObserverEvent::RefreshRequested { seq: 2, .. })
    })
    .await;

    let mut fresh = roster();
    fresh[1] = player(1, false, "Doctor");
    fresh_gate.send(Ok(fresh.clone())).unwrap();
    wait_for(&mut events, is_refresh_settled).await;

    stale_gate.send(Ok(roster())).unwrap();
    assert_eq!(
        wait_for(&mut events, is_refresh_settled).await,
        ObserverEvent::RefreshDiscarded {
            seq: 1,
            newest_applied: 2
        }
    );
    assert_eq!(observer.view().await.players, fresh);

    observer.shutdown().await;
}

#[tokio::test]
async fn refresh_failure_is_reported_and_view_kept() {
    let api = Arc::new(MockApi::new(bootstrap_state()));
    api.push_refresh(Err(ObserverError::Status {
        status: 500,
        detail: "engine exploded".into(),
    }));
    let (transport, _closed) = MockTransport::messages([phase_start_json(1, "Voting", 30)]);
    let (mut observer, mut events) = open(Arc::clone(&api), transport).await;
    skip_bootstrap(&mut events).await;

    match wait_for(&mut events, is_refresh_settled).await {
        ObserverEvent::RefreshFailed { seq, error } => {
            assert_eq!(seq, 1);
            assert!(error.contains("engine exploded"), "error: {error}");
        }
        other => panic!("expected RefreshFailed, got {other:?}"),
    }
    let view = observer.view().await;
    assert_eq!(view.players, roster());
    assert_eq!(view.phase, Phase::Voting);
    assert!(observer.is_connected());

    observer.shutdown().await;
}

#[tokio::test]
async fn refresh_completing_after_shutdown_is_ignored() {
    let api = Arc::new(MockApi::new(bootstrap_state()));
    let gate = api.push_gated_refresh();
    let (transport, _closed) = MockTransport::messages([phase_start_json(2, "Night", 35)]);
    let (mut observer, mut events) = open(Arc::clone(&api), transport).await;
    skip_bootstrap(&mut events).await;

    wait_for(&mut events, |e| {
        matches!(e, ObserverEvent::RefreshRequested { .. })
    })
    .await;
    observer.shutdown().await;
    let before = observer.view().await;

    let all_dead: Vec<_> = (0..5).map(|n| player(n, false, "Town")).collect();
    let _ = gate.send(Ok(all_dead));

    let returned = Arc::clone(&api.players_returned);
    tokio::time::timeout(Duration::from_secs(2), async move {
        while returned.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(observer.view().await, before);
    assert_eq!(observer.view().await.alive_count(), 5);

    let rest: Vec<_> = std::iter::from_fn(|| events.try_recv().ok()).collect();
    assert!(
        rest.iter().all(|e| !is_refresh_settled(e)),
        "no refresh may be applied after shutdown: {rest:?}"
    );
}

// ════════════════════════════════════════════════════════════════════
// Connection lifecycle
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn engine_close_disconnects_without_reconnect() {
    let api = Arc::new(MockApi::new(bootstrap_state()));
    let (transport, _closed) =
        MockTransport::new(vec![Some(Ok(phase_tick_json(1, "Discussion", 44))), None]);
    let (mut observer, mut events) = open(api, transport).await;
    skip_bootstrap(&mut events).await;

    assert!(matches!(
        next_event(&mut events).await,
        ObserverEvent::ViewChanged(_)
    ));
    assert_eq!(
        next_event(&mut events).await,
        ObserverEvent::Disconnected { reason: None }
    );
    assert!(events.recv().await.is_none(), "the loop must stop after Disconnected");
    assert!(!observer.is_connected());
    // The last view stays readable.
    assert_eq!(observer.view().await.seconds_remaining, 44);

    observer.shutdown().await;
}

#[tokio::test]
async fn refresh_in_flight_at_stream_end_is_still_applied() {
    let api = Arc::new(MockApi::new(bootstrap_state()));
    let gate = api.push_gated_refresh();
    let (transport, _closed) =
        MockTransport::new(vec![Some(Ok(game_over_json("TOWN"))), None]);
    let (mut observer, mut events) = open(Arc::clone(&api), transport).await;
    skip_bootstrap(&mut events).await;

    wait_for(&mut events, |e| {
        matches!(e, ObserverEvent::RefreshRequested { .. })
    })
    .await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(
        events.try_recv().is_err(),
        "nothing may follow the request while the refresh is held"
    );
    assert!(!observer.is_connected());

    let mut revealed = roster();
    revealed[4] = player(4, true, "Mafia");
    gate.send(Ok(revealed)).unwrap();

    assert!(matches!(
        next_event(&mut events).await,
        ObserverEvent::RefreshApplied {
            seq: 1,
            out_of_order: false
        }
    ));
    assert!(matches!(
        next_event(&mut events).await,
        ObserverEvent::ViewChanged(_)
    ));
    assert_eq!(
        next_event(&mut events).await,
        ObserverEvent::Disconnected { reason: None }
    );
    assert!(events.recv().await.is_none());

    let view = observer.view().await;
    assert_eq!(view.player("Player_4").unwrap().role, "Mafia");
    assert_eq!(view.winner.as_deref(), Some("TOWN"));

    observer.shutdown().await;
}

#[tokio::test]
async fn shutdown_while_waiting_for_refresh_after_stream_end() {
    let api = Arc::new(MockApi::new(bootstrap_state()));
    let _gate = api.push_gated_refresh();
    let (transport, _closed) =
        MockTransport::new(vec![Some(Ok(phase_start_json(2, "Night", 35))), None]);
    let (mut observer, mut events) = open(Arc::clone(&api), transport).await;
    skip_bootstrap(&mut events).await;

    wait_for(&mut events, |e| {
        matches!(e, ObserverEvent::RefreshRequested { .. })
    })
    .await;
    observer.shutdown().await;

    // The stream ended first, so its reason is the one reported.
    assert_eq!(
        next_event(&mut events).await,
        ObserverEvent::Disconnected { reason: None }
    );
    assert!(events.recv().await.is_none());
    assert_eq!(observer.view().await.alive_count(), 5);
}

#[tokio::test]
async fn transport_error_disconnects_with_reason() {
    let api = Arc::new(MockApi::new(bootstrap_state()));
    let (transport, _closed) = MockTransport::new(vec![Some(Err(
        ObserverError::TransportReceive("boom".into()),
    ))]);
    let (mut observer, mut events) = open(api, transport).await;
    skip_bootstrap(&mut events).await;

    match next_event(&mut events).await {
        ObserverEvent::Disconnected { reason } => assert!(reason.unwrap().contains("boom")),
        other => panic!("expected Disconnected, got {other:?}"),
    }
    assert!(!observer.is_connected());

    observer.shutdown().await;
}

#[tokio::test]
async fn shutdown_closes_transport_and_stops_dispatch() {
    let api = Arc::new(MockApi::new(bootstrap_state()));
    let (transport, closed) = MockTransport::idle();
    let (mut observer, mut events) = open(api, transport).await;
    skip_bootstrap(&mut events).await;

    observer.shutdown().await;

    assert_eq!(
        next_event(&mut events).await,
        ObserverEvent::Disconnected {
            reason: Some("observer closed".into())
        }
    );
    assert!(events.recv().await.is_none());
    assert!(closed.load(Ordering::Relaxed));
}

#[tokio::test]
async fn double_shutdown_does_not_panic() {
    let api = Arc::new(MockApi::new(bootstrap_state()));
    let (transport, _closed) = MockTransport::idle();
    let (mut observer, mut events) = open(api, transport).await;
    skip_bootstrap(&mut events).await;

    observer.shutdown().await;
    observer.shutdown().await;
    assert!(!observer.is_connected());
}

#[tokio::test]
async fn drop_without_explicit_shutdown() {
    let api = Arc::new(MockApi::new(bootstrap_state()));
    let (transport, _closed) = MockTransport::messages([phase_tick_json(1, "Discussion", 30)]);
    let (observer, mut events) = open(api, transport).await;
    skip_bootstrap(&mut events).await;

    drop(observer);

    // The aborted loop drops its sender; the channel drains then closes.
    tokio::time::timeout(Duration::from_secs(2), async {
        while events.recv().await.is_some() {}
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn small_event_channel_drops_but_delivers_disconnected() {
    let mut incoming: Vec<_> = (0..50u32)
        .map(|n| Some(Ok(phase_tick_json(1, "Discussion", 50 - n))))
        .collect();
    incoming.push(None);

    let api = Arc::new(MockApi::new(bootstrap_state()));
    let (transport, _closed) = MockTransport::new(incoming);
    let config = ObserverConfig::default().with_event_channel_capacity(1);
    let (mut observer, mut events) = open_with(api, transport, config).await;

    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut received = Vec::new();
    while let Some(event) = events.recv().await {
        received.push(event);
    }
    assert!(received.len() < 52, "expected drops, got {}", received.len());
    assert_eq!(
        received.last(),
        Some(&ObserverEvent::Disconnected { reason: None })
    );
    // Dropped notifications do not affect the view.
    assert_eq!(observer.view().await.seconds_remaining, 1);

    observer.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Control and export
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn control_helpers_send_commands() {
    let api = Arc::new(MockApi::new(bootstrap_state()));
    let (transport, _closed) = MockTransport::idle();
    let (mut observer, mut events) = open(Arc::clone(&api), transport).await;
    skip_bootstrap(&mut events).await;

    observer.start().await.unwrap();
    observer.pause().await.unwrap();
    observer.resume().await.unwrap();
    observer.step().await.unwrap();

    assert_eq!(
        *api.controls.lock().unwrap(),
        [
            ControlCommand::Start,
            ControlCommand::Pause,
            ControlCommand::Resume,
            ControlCommand::Step
        ]
    );

    observer.shutdown().await;
}

#[tokio::test]
async fn export_round_trips_through_a_file() {
    let api = Arc::new(MockApi::new(bootstrap_state()));
    let (transport, _closed) = MockTransport::idle();
    let (mut observer, mut events) = open(Arc::clone(&api), transport).await;
    skip_bootstrap(&mut events).await;

    let doc = observer.export(true).await.unwrap();
    assert!(doc.file_name().ends_with("-debug.json"));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(doc.file_name());
    doc.write_to(&path).unwrap();

    let written = std::fs::read(&path).unwrap();
    assert_eq!(written, doc.as_bytes());
    let reparsed: serde_json::Value = serde_json::from_slice(&written).unwrap();
    assert_eq!(reparsed, doc.to_value().unwrap());
    let state: MatchState = serde_json::from_value(reparsed).unwrap();
    assert_eq!(state, bootstrap_state());

    observer.shutdown().await;
}
