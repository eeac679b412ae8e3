//! Transport abstraction for the match event stream.
//!
//! The [`Transport`] trait is an inbound text message channel from the match
//! engine to the observer. The stream carries one JSON object per message, so
//! every implementation must handle message framing internally (WebSocket
//! frames, server-sent events, a replay file, ...).
//!
//! # Connection Setup
//!
//! Connection setup is intentionally NOT part of this trait. Construct a
//! connected transport externally, then pass it to `MatchObserver::open`.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use deduction_observer::error::ObserverError;
//! use deduction_observer::transport::Transport;
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn recv(&mut self) -> Option<Result<String, ObserverError>> {
//!         // Receive the next JSON text message
//!         // Return None when the connection is closed cleanly
//!         todo!()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), ObserverError> {
//!         // Gracefully shut down the connection
//!         todo!()
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::ObserverError;

/// An inbound text message stream from the match engine.
///
/// Each call to [`recv`](Transport::recv) returns one complete JSON message.
///
/// # Object Safety
///
/// This trait is object-safe, so `Box<dyn Transport>` works for dynamic dispatch.
///
/// # Cancel Safety
///
/// The [`recv`](Transport::recv) method **MUST** be cancel-safe because it is used
/// inside `tokio::select!`. If `recv` is cancelled before completion, calling it
/// again must not lose data. Channel-based implementations (e.g., wrapping
/// `mpsc::Receiver`) are naturally cancel-safe.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Receive the next JSON text message from the engine.
    ///
    /// Returns:
    /// - `Some(Ok(text))`: a complete message was received
    /// - `Some(Err(e))`: a transport error occurred (e.g., [`ObserverError::TransportReceive`])
    /// - `None`: the engine closed the stream cleanly
    ///
    /// # Cancel Safety
    ///
    /// This method **MUST** be cancel-safe (see [trait documentation](Transport)).
    async fn recv(&mut self) -> Option<Result<String, ObserverError>>;

    /// Close the stream gracefully.
    ///
    /// Must be idempotent. After calling this method, [`recv`](Transport::recv)
    /// may return an error or `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the graceful shutdown fails. Implementations should
    /// still release resources even if the close handshake fails.
    async fn close(&mut self) -> Result<(), ObserverError>;
}
