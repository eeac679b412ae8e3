//! # Observe Example
//!
//! Watches a live match and prints its transcript as it happens:
//!
//! 1. Bootstrap the match view over HTTP
//! 2. Open the match's WebSocket event stream
//! 3. Print transcript records, phase changes and the winner
//! 4. Optionally save the match export once it ends
//! 5. Shut down on Ctrl+C or when the engine closes the stream
//!
//! ## Running
//!
//! ```sh
//! # Start the match engine on localhost:8000, create a match, then:
//! OBSERVER_MATCH_ID=<uuid> cargo run --example observe
//!
//! # Point at another engine and save the export when the match ends:
//! OBSERVER_BASE_URL=https://engine.example OBSERVER_MATCH_ID=<uuid> \
//!     OBSERVER_EXPORT_DIR=/tmp cargo run --example observe
//! ```

use deduction_observer::protocol::MatchId;
use deduction_observer::{MatchObserver, ObserverConfig, ObserverEvent};

/// Default engine URL when `OBSERVER_BASE_URL` is not set.
const DEFAULT_BASE_URL: &str = "http://localhost:8000";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Set `RUST_LOG=debug` for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let base_url =
        std::env::var("OBSERVER_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
    let match_id: MatchId = std::env::var("OBSERVER_MATCH_ID")
        .map_err(|_| "OBSERVER_MATCH_ID must be set to the match UUID")?
        .parse()?;
    let export_dir = std::env::var_os("OBSERVER_EXPORT_DIR").map(std::path::PathBuf::from);
    tracing::info!("Observing match {match_id} on {base_url}");

    // ── Connect ─────────────────────────────────────────────────────
    let (mut observer, mut event_rx) =
        MatchObserver::connect(&base_url, match_id, ObserverConfig::default()).await?;

    let view = observer.view().await;
    println!(
        "Day {} · {} · {}s left · {} of {} alive",
        view.day,
        view.phase,
        view.seconds_remaining,
        view.alive_count(),
        view.players.len()
    );
    for record in observer.transcript().await {
        println!("{record}");
    }

    // ── Event loop ──────────────────────────────────────────────────
    let mut last_phase = (view.day, view.phase);
    let mut finished = view.is_terminal();
    loop {
        tokio::select! {
            event = event_rx.recv() => {
                let Some(event) = event else {
                    tracing::info!("Event channel closed, exiting");
                    break;
                };

                match event {
                    ObserverEvent::TranscriptAppended(record) => println!("{record}"),

                    ObserverEvent::ViewChanged(view) => {
                        if (view.day, view.phase) != last_phase {
                            last_phase = (view.day, view.phase);
                            tracing::info!(
                                "Day {} · {} ({} alive)",
                                view.day,
                                view.phase,
                                view.alive_count()
                            );
                        }
                    }

                    ObserverEvent::GameOver { winner } => {
                        println!("*** {winner} wins ***");
                        finished = true;
                    }

                    ObserverEvent::RefreshFailed { seq, error } => {
                        tracing::warn!("Player refresh #{seq} failed: {error}");
                    }

                    ObserverEvent::Disconnected { reason } => {
                        tracing::warn!(
                            "Stream ended: {}",
                            reason.as_deref().unwrap_or("closed by engine")
                        );
                        break;
                    }

                    other => tracing::debug!("Event: {other:?}"),
                }
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, shutting down…");
                break;
            }
        }
    }

    // ── Export ──────────────────────────────────────────────────────
    if let (true, Some(dir)) = (finished, export_dir) {
        let doc = observer.export(false).await?;
        let path = dir.join(doc.file_name());
        doc.write_to(&path)?;
        println!("Export saved to {}", path.display());
    }

    // ── Cleanup ─────────────────────────────────────────────────────
    observer.shutdown().await;
    tracing::info!("Observer shut down. Goodbye!");
    Ok(())
}
