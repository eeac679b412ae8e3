//! Request/response abstraction over the match engine's HTTP surface.
//!
//! The [`MatchApi`] trait covers every call the observer makes outside the
//! event stream: the bootstrap fetch, supplementary player refreshes, control
//! commands and the export download. Like [`Transport`](crate::Transport), it
//! is object-safe so tests and alternative backends can stand in for the
//! built-in `HttpMatchApi`.
//!
//! Every method returns an explicit [`Result`]; nothing is retried here and the
//! caller decides whether to ignore, retry or surface a failure.
//!
//! # Implementing a Custom Backend
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use deduction_observer::api::MatchApi;
//! use deduction_observer::error::Result;
//! use deduction_observer::protocol::{ControlCommand, ExportDocument, MatchId, MatchState};
//!
//! struct Replay { state: MatchState }
//!
//! #[async_trait]
//! impl MatchApi for Replay {
//!     async fn fetch_state(&self, _match_id: MatchId) -> Result<MatchState> {
//!         Ok(self.state.clone())
//!     }
//!
//!     async fn send_control(&self, _match_id: MatchId, _command: ControlCommand) -> Result<()> {
//!         Ok(())
//!     }
//!
//!     async fn export(&self, match_id: MatchId, debug: bool) -> Result<ExportDocument> {
//!         let bytes = serde_json::to_vec(&self.state)?;
//!         Ok(ExportDocument::new(match_id, debug, bytes))
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::Result;
use crate::protocol::{ControlCommand, ExportDocument, MatchId, MatchState, Player};

/// The match engine's request/response endpoints.
#[async_trait]
pub trait MatchApi: Send + Sync + 'static {
    /// Fetch the full state of a match.
    ///
    /// # Errors
    ///
    /// Any transport or decoding failure, or a non-success status from the
    /// engine (e.g. [`ObserverError::Status`](crate::ObserverError::Status)
    /// with `404` for an unknown match).
    async fn fetch_state(&self, match_id: MatchId) -> Result<MatchState>;

    /// Fetch the current player list.
    ///
    /// The engine has no dedicated roster endpoint, so the default
    /// implementation takes the players out of a full state fetch.
    ///
    /// # Errors
    ///
    /// Same as [`fetch_state`](MatchApi::fetch_state).
    async fn fetch_players(&self, match_id: MatchId) -> Result<Vec<Player>> {
        Ok(self.fetch_state(match_id).await?.players)
    }

    /// Issue a one-shot control command.
    ///
    /// # Errors
    ///
    /// Any transport failure or non-success status.
    async fn send_control(&self, match_id: MatchId, command: ControlCommand) -> Result<()>;

    /// Download the export document, optionally including private agent data.
    ///
    /// # Errors
    ///
    /// Any transport failure or non-success status.
    async fn export(&self, match_id: MatchId, debug: bool) -> Result<ExportDocument>;
}
