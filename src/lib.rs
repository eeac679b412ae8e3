//! # Deduction Observer
//!
//! Client-side state reconciliation for watching a live social-deduction match.
//!
//! The match engine exposes a full-state HTTP endpoint and a per-match event
//! stream. This crate keeps one canonical [`MatchView`] consistent with both:
//! it bootstraps from a full fetch, applies each stream event in arrival order,
//! appends narrative events to a [`TranscriptLog`](transcript::TranscriptLog),
//! and issues supplementary player refreshes when an event implies roster
//! changes the stream does not carry.
//!
//! ## Features
//!
//! - **Pluggable I/O**: implement [`Transport`] for the stream and [`MatchApi`]
//!   for the HTTP surface
//! - **WebSocket built-in**: default `transport-websocket` feature provides [`WebSocketTransport`]
//! - **HTTP built-in**: default `http-api` feature provides [`HttpMatchApi`]
//! - **Event-driven**: receive typed [`ObserverEvent`]s via a channel
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # #[cfg(all(feature = "transport-websocket", feature = "http-api"))]
//! # async fn example() -> Result<(), deduction_observer::ObserverError> {
//! use deduction_observer::{MatchObserver, ObserverConfig, ObserverEvent};
//! use deduction_observer::protocol::MatchId;
//!
//! let match_id: MatchId = "6f1c0c3e-5a51-4a3e-9b0e-0d6f0a1c2b3d".parse().unwrap();
//! let (mut observer, mut events) =
//!     MatchObserver::connect("http://localhost:8000", match_id, ObserverConfig::default()).await?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         ObserverEvent::TranscriptAppended(record) => println!("{record}"),
//!         ObserverEvent::GameOver { winner } => println!("{winner} wins"),
//!         ObserverEvent::Disconnected { .. } => break,
//!         _ => {}
//!     }
//! }
//! observer.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod apis;
pub mod error;
pub mod event;
pub mod observer;
pub mod protocol;
pub mod reconcile;
pub mod refresh;
pub mod transcript;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use api::MatchApi;
pub use error::ObserverError;
pub use event::{EventKind, MatchEvent};
pub use observer::{MatchObserver, ObserverConfig, ObserverEvent};
pub use protocol::{ControlCommand, ExportDocument, MatchState, Phase, Player};
pub use reconcile::{MatchView, Reconciler, RefreshReason};
pub use refresh::RefreshOrdering;
pub use transcript::TranscriptRecord;
pub use transport::Transport;

#[cfg(feature = "http-api")]
pub use apis::HttpMatchApi;
#[cfg(feature = "transport-websocket")]
pub use transports::WebSocketTransport;
