//! Connection supervisor for observing one live match.
//!
//! [`MatchObserver`] is a thin handle over a background dispatch task. On
//! [`open`](MatchObserver::open) it fetches the match state once, seeds the
//! view and transcript from it, then spawns a single loop that drains the
//! stream transport and the refresh completions with `tokio::select!`.
//! Everything the loop does is reported on a bounded channel of
//! [`ObserverEvent`]s.
//!
//! A dropped stream is not reconnected. The loop finishes applying any
//! players refresh still in flight, emits one
//! [`Disconnected`](ObserverEvent::Disconnected) event and exits; the last view
//! stays readable through the handle.
//!
//! # Example
//!
//! ```rust,ignore
//! let api = Arc::new(HttpMatchApi::builder("http://localhost:8000").build()?);
//! let transport = WebSocketTransport::connect_to_match("http://localhost:8000", match_id).await?;
//! let (mut observer, mut events) =
//!     MatchObserver::open(match_id, api, transport, ObserverConfig::default()).await?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         ObserverEvent::TranscriptAppended(record) => println!("{record}"),
//!         ObserverEvent::Disconnected { .. } => break,
//!         _ => {}
//!     }
//! }
//! observer.shutdown().await;
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use crate::api::MatchApi;
use crate::error::Result;
use crate::event::decode;
use crate::protocol::{ControlCommand, ExportDocument, Faction, MatchId};
use crate::reconcile::{MatchView, Reconciler, RefreshReason};
use crate::refresh::{RefreshCompletion, RefreshCoordinator, RefreshOrdering, Resolution};
use crate::transcript::TranscriptRecord;
use crate::transport::Transport;

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

const SHUTDOWN_REASON: &str = "observer closed";

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`MatchObserver`].
///
/// ```
/// use deduction_observer::observer::ObserverConfig;
/// use deduction_observer::refresh::RefreshOrdering;
/// use std::time::Duration;
///
/// let config = ObserverConfig::default()
///     .with_event_channel_capacity(512)
///     .with_shutdown_timeout(Duration::from_secs(5))
///     .with_refresh_ordering(RefreshOrdering::RequestOrder);
/// assert_eq!(config.event_channel_capacity, 512);
/// ```
#[derive(Debug, Clone)]
pub struct ObserverConfig {
    /// Capacity of the bounded event channel.
    ///
    /// When the consumer cannot keep up, events are dropped with a warning so
    /// the dispatch loop never blocks on the display layer. The final
    /// `Disconnected` event is always delivered.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// How long [`MatchObserver::shutdown`] waits for the dispatch loop to
    /// close the transport before aborting it.
    ///
    /// Defaults to **1 second**.
    pub shutdown_timeout: Duration,
    /// How players refreshes that complete out of order are handled.
    ///
    /// Defaults to [`RefreshOrdering::ArrivalOrder`].
    pub refresh_ordering: RefreshOrdering,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            refresh_ordering: RefreshOrdering::default(),
        }
    }
}

impl ObserverConfig {
    /// Set the capacity of the bounded event channel. Values below 1 are
    /// clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// Set the timeout for the graceful shutdown. A zero timeout aborts the
    /// dispatch loop immediately.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_refresh_ordering(mut self, ordering: RefreshOrdering) -> Self {
        self.refresh_ordering = ordering;
        self
    }
}

// ── Events ──────────────────────────────────────────────────────────

/// Notifications emitted by the dispatch loop, in the order it produced them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObserverEvent {
    /// Bootstrap finished and the dispatch loop is running. Always first.
    Connected,
    /// The view after a snapshot, phase update or applied refresh.
    ViewChanged(MatchView),
    /// A record was appended to the transcript.
    TranscriptAppended(TranscriptRecord),
    /// A players refresh was issued.
    RefreshRequested { seq: u64, reason: RefreshReason },
    /// A refresh response replaced the players. `out_of_order` is set when
    /// a newer request had already been applied.
    RefreshApplied { seq: u64, out_of_order: bool },
    /// A refresh response was dropped because a newer one was applied first.
    /// Only emitted with [`RefreshOrdering::RequestOrder`].
    RefreshDiscarded { seq: u64, newest_applied: u64 },
    /// A refresh request failed; the view was left untouched.
    RefreshFailed { seq: u64, error: String },
    /// The winner was latched. Emitted at most once.
    GameOver { winner: Faction },
    /// The dispatch loop stopped. Always the last event. `reason` is `None`
    /// when the engine closed the stream cleanly. After a stream end it
    /// follows the settlement of every refresh that was still in flight.
    Disconnected { reason: Option<String> },
}

// ── Shared state ────────────────────────────────────────────────────

/// State shared between the handle and the dispatch loop. Only the loop
/// writes to the reconciler.
struct ObserverState {
    connected: AtomicBool,
    reconciler: Mutex<Reconciler>,
}

// ── Observer handle ─────────────────────────────────────────────────

/// Handle to a running match observation.
///
/// Created with [`MatchObserver::open`]. The view and transcript remain
/// readable after the stream ends or [`shutdown`](Self::shutdown) is called.
pub struct MatchObserver {
    match_id: MatchId,
    api: Arc<dyn MatchApi>,
    state: Arc<ObserverState>,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    shutdown_timeout: Duration,
}

impl MatchObserver {
    /// Bootstrap the view for `match_id` and start dispatching `transport`.
    ///
    /// The bootstrap fetch completes before any stream message is handled.
    /// A non-null bootstrap winner makes the view terminal immediately.
    ///
    /// # Errors
    ///
    /// Returns the bootstrap fetch error. The transport is closed first.
    pub async fn open(
        match_id: MatchId,
        api: Arc<dyn MatchApi>,
        mut transport: impl Transport,
        config: ObserverConfig,
    ) -> Result<(Self, mpsc::Receiver<ObserverEvent>)> {
        let bootstrap = match api.fetch_state(match_id).await {
            Ok(state) => state,
            Err(e) => {
                error!(%match_id, "bootstrap fetch failed: {e}");
                let _ = transport.close().await;
                return Err(e);
            }
        };

        let mut reconciler = Reconciler::new();
        let winner = reconciler.bootstrap(&bootstrap);
        let initial_view = reconciler.view().clone();
        info!(
            %match_id,
            day = initial_view.day,
            phase = %initial_view.phase,
            terminal = initial_view.is_terminal(),
            "match bootstrapped"
        );

        let capacity = config.event_channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel::<ObserverEvent>(capacity);
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        let (coordinator, completions) =
            RefreshCoordinator::new(Arc::clone(&api), match_id, config.refresh_ordering);

        let state = Arc::new(ObserverState {
            connected: AtomicBool::new(true),
            reconciler: Mutex::new(reconciler),
        });

        let task = tokio::spawn(dispatch_loop(DispatchLoop {
            transport,
            coordinator,
            completions,
            event_tx,
            state: Arc::clone(&state),
            shutdown_rx,
            initial_view,
            winner,
        }));

        let observer = Self {
            match_id,
            api,
            state,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout: config.shutdown_timeout,
        };
        Ok((observer, event_rx))
    }

    // ── Control ─────────────────────────────────────────────────────

    /// Send a control command to the engine.
    ///
    /// # Errors
    ///
    /// Returns the backend's error; nothing is retried.
    pub async fn control(&self, command: ControlCommand) -> Result<()> {
        debug!(match_id = %self.match_id, %command, "control requested");
        self.api.send_control(self.match_id, command).await
    }

    /// Start the match.
    ///
    /// # Errors
    ///
    /// See [`control`](Self::control).
    pub async fn start(&self) -> Result<()> {
        self.control(ControlCommand::Start).await
    }

    /// Pause the match clock.
    ///
    /// # Errors
    ///
    /// See [`control`](Self::control).
    pub async fn pause(&self) -> Result<()> {
        self.control(ControlCommand::Pause).await
    }

    /// Resume a paused match.
    ///
    /// # Errors
    ///
    /// See [`control`](Self::control).
    pub async fn resume(&self) -> Result<()> {
        self.control(ControlCommand::Resume).await
    }

    /// Advance the match by one phase.
    ///
    /// # Errors
    ///
    /// See [`control`](Self::control).
    pub async fn step(&self) -> Result<()> {
        self.control(ControlCommand::Step).await
    }

    /// Download the match export. `debug` includes private agent state.
    ///
    /// # Errors
    ///
    /// Returns the backend's error.
    pub async fn export(&self, debug: bool) -> Result<ExportDocument> {
        self.api.export(self.match_id, debug).await
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Stop dispatching and close the transport.
    ///
    /// Idempotent. Once this returns no further stream message or refresh
    /// response is applied; refreshes still in flight complete into a closed
    /// channel and are dropped.
    pub async fn shutdown(&mut self) {
        debug!(match_id = %self.match_id, "observer shutdown requested");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("dispatch loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("dispatch loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("dispatch loop aborted: {join_err}");
                    }
                }
            }
        }

        self.state.connected.store(false, Ordering::Release);
    }

    // ── State accessors ─────────────────────────────────────────────

    pub fn match_id(&self) -> MatchId {
        self.match_id
    }

    /// Returns `true` while the stream is being dispatched.
    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::Acquire)
    }

    /// A copy of the current view.
    pub async fn view(&self) -> MatchView {
        self.state.reconciler.lock().await.view().clone()
    }

    /// A copy of every transcript record so far, in arrival order.
    pub async fn transcript(&self) -> Vec<TranscriptRecord> {
        self.state
            .reconciler
            .lock()
            .await
            .transcript()
            .records()
            .to_vec()
    }

    pub async fn transcript_len(&self) -> usize {
        self.state.reconciler.lock().await.transcript().len()
    }
}

#[cfg(all(feature = "transport-websocket", feature = "http-api"))]
impl MatchObserver {
    /// Observe `match_id` on the engine at `base_url` over HTTP and WebSocket.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built, the stream cannot
    /// be opened or the bootstrap fetch fails.
    pub async fn connect(
        base_url: &str,
        match_id: MatchId,
        config: ObserverConfig,
    ) -> Result<(Self, mpsc::Receiver<ObserverEvent>)> {
        let api = crate::apis::HttpMatchApi::builder(base_url).build()?;
        let transport =
            crate::transports::WebSocketTransport::connect_to_match(base_url, match_id).await?;
        Self::open(match_id, Arc::new(api), transport, config).await
    }
}

impl std::fmt::Debug for MatchObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchObserver")
            .field("match_id", &self.match_id)
            .field("connected", &self.is_connected())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for MatchObserver {
    fn drop(&mut self) {
        // No executor to drive `transport.close()` here; abort instead.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Dispatch loop ───────────────────────────────────────────────────

struct DispatchLoop<T> {
    transport: T,
    coordinator: RefreshCoordinator,
    completions: mpsc::UnboundedReceiver<RefreshCompletion>,
    event_tx: mpsc::Sender<ObserverEvent>,
    state: Arc<ObserverState>,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
    initial_view: MatchView,
    winner: Option<Faction>,
}

/// Multiplexes the stream, refresh completions and the shutdown signal.
///
/// Exits when shutdown is requested. When the engine closes the stream or the
/// transport fails, refreshes already in flight are still applied before
/// `Disconnected` is emitted.
async fn dispatch_loop<T: Transport>(parts: DispatchLoop<T>) {
    let DispatchLoop {
        mut transport,
        mut coordinator,
        mut completions,
        event_tx,
        state,
        mut shutdown_rx,
        initial_view,
        winner,
    } = parts;

    debug!("dispatch loop started");

    emit_event(&event_tx, ObserverEvent::Connected);
    emit_event(&event_tx, ObserverEvent::ViewChanged(initial_view));
    if let Some(winner) = winner {
        emit_event(&event_tx, ObserverEvent::GameOver { winner });
    }

    let reason = loop {
        tokio::select! {
            _ = &mut shutdown_rx => {
                debug!("shutdown signal received");
                let _ = transport.close().await;
                emit_disconnected(&event_tx, &state, Some(SHUTDOWN_REASON.into())).await;
                debug!("dispatch loop exited");
                return;
            }

            Some(completion) = completions.recv() => {
                apply_completion(completion, &mut coordinator, &state, &event_tx).await;
            }

            incoming = transport.recv() => {
                match incoming {
                    Some(Ok(text)) => {
                        dispatch_message(&text, &mut coordinator, &state, &event_tx).await;
                    }
                    Some(Err(e)) => {
                        error!("match stream receive error: {e}");
                        break Some(format!("transport receive error: {e}"));
                    }
                    None => {
                        info!("match stream closed by engine");
                        break None;
                    }
                }
            }
        }
    };

    // The stream is gone but the view is still live.
    state.connected.store(false, Ordering::Release);
    while coordinator.in_flight() > 0 {
        debug!(in_flight = coordinator.in_flight(), "waiting for refreshes after stream end");
        tokio::select! {
            _ = &mut shutdown_rx => {
                debug!("shutdown signal received while refreshes were in flight");
                break;
            }

            Some(completion) = completions.recv() => {
                apply_completion(completion, &mut coordinator, &state, &event_tx).await;
            }
        }
    }

    emit_disconnected(&event_tx, &state, reason).await;
    debug!("dispatch loop exited");
}

/// Decode one stream message and apply it to the view.
async fn dispatch_message(
    text: &str,
    coordinator: &mut RefreshCoordinator,
    state: &ObserverState,
    event_tx: &mpsc::Sender<ObserverEvent>,
) {
    let event = decode(text);
    if event.is_unknown() {
        return;
    }
    debug!(kind = event.kind_name(), day = ?event.day, "dispatching event");

    let (dispatch, view) = {
        let mut reconciler = state.reconciler.lock().await;
        let dispatch = reconciler.handle(&event);
        let view = dispatch.view_changed.then(|| reconciler.view().clone());
        (dispatch, view)
    };

    if let Some(view) = view {
        emit_event(event_tx, ObserverEvent::ViewChanged(view));
    }
    if let Some(record) = dispatch.record {
        emit_event(event_tx, ObserverEvent::TranscriptAppended(record));
    }
    if let Some(winner) = dispatch.winner_latched {
        info!(winner = %winner, "match over");
        emit_event(event_tx, ObserverEvent::GameOver { winner });
    }
    if let Some(reason) = dispatch.refresh {
        let seq = coordinator.request(reason);
        emit_event(event_tx, ObserverEvent::RefreshRequested { seq, reason });
    }
}

/// Apply or discard one refresh response.
async fn apply_completion(
    completion: RefreshCompletion,
    coordinator: &mut RefreshCoordinator,
    state: &ObserverState,
    event_tx: &mpsc::Sender<ObserverEvent>,
) {
    let RefreshCompletion { seq, reason, result } = completion;
    coordinator.settle();
    let players = match result {
        Ok(players) => players,
        Err(e) => {
            warn!(seq, ?reason, "players refresh failed: {e}");
            emit_event(
                event_tx,
                ObserverEvent::RefreshFailed {
                    seq,
                    error: e.to_string(),
                },
            );
            return;
        }
    };

    match coordinator.resolve(seq) {
        Resolution::Apply { out_of_order } => {
            let view = {
                let mut reconciler = state.reconciler.lock().await;
                reconciler.replace_players(players);
                reconciler.view().clone()
            };
            debug!(seq, out_of_order, alive = view.alive_count(), "refresh applied");
            emit_event(event_tx, ObserverEvent::RefreshApplied { seq, out_of_order });
            emit_event(event_tx, ObserverEvent::ViewChanged(view));
        }
        Resolution::Discard { newest_applied } => {
            emit_event(
                event_tx,
                ObserverEvent::RefreshDiscarded {
                    seq,
                    newest_applied,
                },
            );
        }
    }
}

/// Emit an event without blocking. A full channel drops the event with a
/// warning.
fn emit_event(event_tx: &mpsc::Sender<ObserverEvent>, event: ObserverEvent) {
    match event_tx.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            warn!(
                "event channel full, dropping event: {:?}",
                std::mem::discriminant(&dropped)
            );
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("event channel closed, receiver dropped");
        }
    }
}

/// Emit the final [`Disconnected`](ObserverEvent::Disconnected) event.
///
/// Waits for channel capacity: this is the last event and must not be dropped.
async fn emit_disconnected(
    event_tx: &mpsc::Sender<ObserverEvent>,
    state: &ObserverState,
    reason: Option<String>,
) {
    state.connected.store(false, Ordering::Release);
    let event = ObserverEvent::Disconnected { reason };
    if event_tx.send(event).await.is_err() {
        debug!("event channel closed, receiver dropped");
    }
}

// ── Tests ───────────────────────────────────────────────────────────

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
    use crate::error::ObserverError;
    use crate::protocol::{MatchState, Phase, Player};
    use async_trait::async_trait;

    struct StaticApi {
        state: MatchState,
    }

    #[async_trait]
    impl MatchApi for StaticApi {
        async fn fetch_state(&self, _match_id: MatchId) -> Result<MatchState> {
            Ok(self.state.clone())
        }

        async fn send_control(&self, _match_id: MatchId, _command: ControlCommand) -> Result<()> {
            Ok(())
        }

        async fn export(&self, match_id: MatchId, debug: bool) -> Result<ExportDocument> {
            Ok(ExportDocument::new(match_id, debug, b"{}".to_vec()))
        }
    }

    struct FailingApi;

    #[async_trait]
    impl MatchApi for FailingApi {
        async fn fetch_state(&self, _match_id: MatchId) -> Result<MatchState> {
            Err(ObserverError::Status {
                status: 404,
                detail: "Not Found".into(),
            })
        }

        async fn send_control(&self, _match_id: MatchId, _command: ControlCommand) -> Result<()> {
            Err(ObserverError::Request("not scripted".into()))
        }

        async fn export(&self, _match_id: MatchId, _debug: bool) -> Result<ExportDocument> {
            Err(ObserverError::Request("not scripted".into()))
        }
    }

    fn static_api() -> Arc<dyn MatchApi> {
        Arc::new(StaticApi {
            state: MatchState {
                day: 1,
                phase: Phase::Discussion,
                seconds_remaining: 45,
                players: vec![Player {
                    id: "Player_0".into(),
                    name: "Player_0".into(),
                    role: String::new(),
                    is_alive: true,
                }],
                ..MatchState::default()
            },
        })
    }

    /// Never yields; records whether `close()` ran.
    struct IdleTransport {
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Transport for IdleTransport {
        async fn recv(&mut self) -> Option<std::result::Result<String, ObserverError>> {
            std::future::pending().await
        }

        async fn close(&mut self) -> std::result::Result<(), ObserverError> {
            self.closed.store(true, Ordering::Release);
            Ok(())
        }
    }

    /// Transport that hangs forever in `close()` so the shutdown abort path runs.
    struct HangingCloseTransport {
        dropped: Arc<AtomicBool>,
    }

    impl Drop for HangingCloseTransport {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::Release);
        }
    }

    #[async_trait]
    impl Transport for HangingCloseTransport {
        async fn recv(&mut self) -> Option<std::result::Result<String, ObserverError>> {
            std::future::pending().await
        }

        async fn close(&mut self) -> std::result::Result<(), ObserverError> {
            std::future::pending().await
        }
    }

    #[test]
    fn config_defaults() {
        let config = ObserverConfig::default();
        assert_eq!(config.event_channel_capacity, 256);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
        assert_eq!(config.refresh_ordering, RefreshOrdering::ArrivalOrder);
    }

    #[test]
    fn event_channel_capacity_is_clamped_to_one() {
        let config = ObserverConfig::default().with_event_channel_capacity(0);
        assert_eq!(config.event_channel_capacity, 1);
    }

    #[tokio::test]
    async fn bootstrap_failure_fails_open_and_closes_transport() {
        let closed = Arc::new(AtomicBool::new(false));
        let transport = IdleTransport {
            closed: Arc::clone(&closed),
        };
        let err = MatchObserver::open(
            MatchId::nil(),
            Arc::new(FailingApi),
            transport,
            ObserverConfig::default(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ObserverError::Status { status: 404, .. }));
        assert!(closed.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn first_events_are_connected_then_bootstrap_view() {
        let closed = Arc::new(AtomicBool::new(false));
        let transport = IdleTransport {
            closed: Arc::clone(&closed),
        };
        let (mut observer, mut events) =
            MatchObserver::open(MatchId::nil(), static_api(), transport, ObserverConfig::default())
                .await
                .unwrap();

        assert_eq!(events.recv().await.unwrap(), ObserverEvent::Connected);
        match events.recv().await.unwrap() {
            ObserverEvent::ViewChanged(view) => {
                assert_eq!(view.seconds_remaining, 45);
                assert_eq!(view.alive_count(), 1);
            }
            other => panic!("expected ViewChanged, got {other:?}"),
        }

        observer.shutdown().await;
        assert_eq!(
            events.recv().await.unwrap(),
            ObserverEvent::Disconnected {
                reason: Some(SHUTDOWN_REASON.into())
            }
        );
        assert!(closed.load(Ordering::Acquire));
        assert!(!observer.is_connected());
    }

    #[tokio::test]
    async fn zero_capacity_does_not_panic() {
        let transport = IdleTransport {
            closed: Arc::default(),
        };
        let config = ObserverConfig {
            event_channel_capacity: 0,
            ..ObserverConfig::default()
        };
        let (mut observer, mut events) =
            MatchObserver::open(MatchId::nil(), static_api(), transport, config)
                .await
                .unwrap();

        assert_eq!(events.recv().await.unwrap(), ObserverEvent::Connected);
        observer.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_timeout_aborts_stuck_dispatch_loop() {
        let dropped = Arc::new(AtomicBool::new(false));
        let transport = HangingCloseTransport {
            dropped: Arc::clone(&dropped),
        };
        let config = ObserverConfig::default().with_shutdown_timeout(Duration::from_millis(20));
        let (mut observer, _events) =
            MatchObserver::open(MatchId::nil(), static_api(), transport, config)
                .await
                .unwrap();

        observer.shutdown().await;

        assert!(
            dropped.load(Ordering::Acquire),
            "timed-out shutdown should abort and drop the dispatch loop"
        );
        assert!(!observer.is_connected());
    }

    #[tokio::test]
    async fn control_and_export_go_to_the_api() {
        let transport = IdleTransport {
            closed: Arc::default(),
        };
        let (mut observer, _events) = MatchObserver::open(
            MatchId::from_u128(7),
            static_api(),
            transport,
            ObserverConfig::default(),
        )
        .await
        .unwrap();

        observer.pause().await.unwrap();
        let doc = observer.export(false).await.unwrap();
        assert_eq!(doc.match_id(), MatchId::from_u128(7));
        assert!(!doc.is_debug());

        observer.shutdown().await;
        // Control does not depend on the stream.
        observer.resume().await.unwrap();
    }

    #[tokio::test]
    async fn debug_impl_for_observer() {
        let transport = IdleTransport {
            closed: Arc::default(),
        };
        let (mut observer, _events) =
            MatchObserver::open(MatchId::nil(), static_api(), transport, ObserverConfig::default())
                .await
                .unwrap();

        let debug_str = format!("{observer:?}");
        assert!(debug_str.contains("MatchObserver"));
        assert!(debug_str.contains("connected"));

        observer.shutdown().await;
    }
}
