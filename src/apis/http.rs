//! HTTP backend for [`MatchApi`] using `reqwest`.
//!
//! | Call | Request |
//! |------|---------|
//! | [`fetch_state`](MatchApi::fetch_state) | `GET {base}/games/{id}` |
//! | [`send_control`](MatchApi::send_control) | `POST {base}/games/{id}/{start,pause,resume,step}` |
//! | [`export`](MatchApi::export) | `GET {base}/games/{id}/export?debug={bool}` |
//!
//! No timeout is applied unless one is configured on the builder.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::api::MatchApi;
use crate::error::{ObserverError, Result};
use crate::protocol::{ControlCommand, ExportDocument, MatchId, MatchState};

/// Builder for [`HttpMatchApi`].
///
/// ```
/// use deduction_observer::apis::HttpMatchApi;
/// use std::time::Duration;
///
/// let api = HttpMatchApi::builder("http://localhost:8000")
///     .with_timeout(Duration::from_secs(10))
///     .build()
///     .unwrap();
/// assert_eq!(api.base_url(), "http://localhost:8000");
/// ```
#[derive(Debug, Clone)]
pub struct HttpMatchApiBuilder {
    base_url: String,
    timeout: Option<Duration>,
}

impl HttpMatchApiBuilder {
    /// Apply a per-request timeout. Defaults to none.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the backend.
    ///
    /// # Errors
    ///
    /// Returns [`ObserverError::Request`] if the HTTP client cannot be
    /// initialised (e.g. the TLS backend fails to load).
    pub fn build(self) -> Result<HttpMatchApi> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(request_error)?;
        Ok(HttpMatchApi::with_client(self.base_url, client))
    }
}

/// [`MatchApi`] over the engine's HTTP endpoints.
#[derive(Debug, Clone)]
pub struct HttpMatchApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpMatchApi {
    /// Start building a backend for the engine at `base_url`
    /// (e.g. `http://localhost:8000`).
    pub fn builder(base_url: impl Into<String>) -> HttpMatchApiBuilder {
        HttpMatchApiBuilder {
            base_url: base_url.into(),
            timeout: None,
        }
    }

    /// Use an existing `reqwest` client (shared connection pool, proxies, ...).
    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Self { client, base_url }
    }

    /// The engine base URL, without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn match_url(&self, match_id: MatchId) -> String {
        format!("{}/games/{match_id}", self.base_url)
    }
}

#[async_trait]
impl MatchApi for HttpMatchApi {
    async fn fetch_state(&self, match_id: MatchId) -> Result<MatchState> {
        let url = self.match_url(match_id);
        debug!(url = %url, "fetching match state");
        let response = self.client.get(&url).send().await.map_err(request_error)?;
        let body = success_body(response).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn send_control(&self, match_id: MatchId, command: ControlCommand) -> Result<()> {
        let url = format!("{}/{}", self.match_url(match_id), command.path_segment());
        debug!(url = %url, %command, "sending control command");
        let response = self.client.post(&url).send().await.map_err(request_error)?;
        success_body(response).await?;
        Ok(())
    }

    async fn export(&self, match_id: MatchId, include_debug: bool) -> Result<ExportDocument> {
        let url = format!("{}/export", self.match_url(match_id));
        debug!(url = %url, include_debug, "requesting export");
        let response = self
            .client
            .get(&url)
            .query(&[("debug", include_debug)])
            .send()
            .await
            .map_err(request_error)?;
        let body = success_body(response).await?;
        Ok(ExportDocument::new(match_id, include_debug, body))
    }
}

/// The engine's error body (`{"detail": ...}`).
#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

async fn success_body(response: reqwest::Response) -> Result<Vec<u8>> {
    let status = response.status();
    let body = response.bytes().await.map_err(request_error)?;
    if status.is_success() {
        return Ok(body.to_vec());
    }

    let detail = match serde_json::from_slice::<ErrorBody>(&body) {
        Ok(ErrorBody {
            detail: serde_json::Value::String(detail),
        }) => detail,
        Ok(ErrorBody { detail }) => detail.to_string(),
        Err(_) => String::from_utf8_lossy(&body).into_owned(),
    };
    warn!(status = status.as_u16(), detail = %detail, "match engine rejected request");
    Err(ObserverError::Status {
        status: status.as_u16(),
        detail,
    })
}

fn request_error(e: reqwest::Error) -> ObserverError {
    if e.is_timeout() {
        ObserverError::Timeout
    } else {
        ObserverError::Request(e.to_string())
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
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex as StdMutex};

    use axum::extract::{Path, Query};
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;

    const EXPORT_BODY: &str = "{\"game_id\": \"x\",  \"players\": [], \"transcript\": []}";
    const DEBUG_EXPORT_BODY: &str =
        "{\"game_id\": \"x\",  \"players\": [], \"transcript\": [], \"mafia_transcript\": []}";

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn engine(controls: Arc<StdMutex<Vec<String>>>) -> Router {
        Router::new()
            .route(
                "/games/:id",
                get(|Path(id): Path<String>| async move {
                    if id == MatchId::nil().to_string() {
                        return (StatusCode::NOT_FOUND, Json(json!({"detail": "Not Found"})));
                    }
                    (
                        StatusCode::OK,
                        Json(json!({
                            "game_id": id,
                            "day": 2,
                            "phase": "Last Words",
                            "seconds_remaining": 5,
                            "players": [
                                {"id": "Player_0", "name": "Player_0", "role": "Mafia", "is_alive": true,
                                 "private_memory": [], "role_info": ""}
                            ],
                            "transcript": [],
                            "is_paused": false,
                            "winner": null
                        })),
                    )
                }),
            )
            .route(
                "/games/:id/:command",
                post(move |Path((_, command)): Path<(String, String)>| {
                    let controls = Arc::clone(&controls);
                    async move {
                        controls.lock().unwrap().push(command.clone());
                        Json(json!({"status": command}))
                    }
                }),
            )
            .route(
                "/games/:id/export",
                get(|Query(q): Query<HashMap<String, String>>| async move {
                    match q.get("debug").map(String::as_str) {
                        Some("true") => (StatusCode::OK, DEBUG_EXPORT_BODY),
                        Some("false") => (StatusCode::OK, EXPORT_BODY),
                        _ => (StatusCode::UNPROCESSABLE_ENTITY, "{\"detail\": \"debug flag missing\"}"),
                    }
                }),
            )
    }

    #[tokio::test]
    async fn fetch_state_parses_engine_document() {
        let base = serve(engine(Arc::default())).await;
        let api = HttpMatchApi::builder(&base).build().unwrap();
        let id = MatchId::from_u128(3);

        let state = api.fetch_state(id).await.unwrap();
        assert_eq!(state.game_id, Some(id));
        assert_eq!(state.phase, crate::protocol::Phase::LastWords);
        assert_eq!(state.players.len(), 1);

        let players = api.fetch_players(id).await.unwrap();
        assert_eq!(players[0].role, "Mafia");
    }

    #[tokio::test]
    async fn not_found_surfaces_detail() {
        let base = serve(engine(Arc::default())).await;
        let api = HttpMatchApi::builder(&base).build().unwrap();

        let err = api.fetch_state(MatchId::nil()).await.unwrap_err();
        match err {
            ObserverError::Status { status, detail } => {
                assert_eq!(status, 404);
                assert_eq!(detail, "Not Found");
            }
            other => panic!("expected Status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn control_commands_hit_their_paths() {
        let controls = Arc::new(StdMutex::new(Vec::new()));
        let base = serve(engine(Arc::clone(&controls))).await;
        let api = HttpMatchApi::builder(format!("{base}/")).build().unwrap();
        let id = MatchId::from_u128(9);

        for cmd in [
            ControlCommand::Start,
            ControlCommand::Pause,
            ControlCommand::Resume,
            ControlCommand::Step,
        ] {
            api.send_control(id, cmd).await.unwrap();
        }
        assert_eq!(
            *controls.lock().unwrap(),
            ["start", "pause", "resume", "step"]
        );
    }

    #[tokio::test]
    async fn export_keeps_bytes_verbatim() {
        let base = serve(engine(Arc::default())).await;
        let api = HttpMatchApi::builder(&base).build().unwrap();
        let id = MatchId::from_u128(4);

        let doc = api.export(id, false).await.unwrap();
        assert_eq!(doc.as_bytes(), EXPORT_BODY.as_bytes());
        assert!(!doc.is_debug());
        assert_eq!(doc.match_id(), id);
    }

    #[tokio::test]
    async fn export_passes_the_debug_flag_through() {
        let base = serve(engine(Arc::default())).await;
        let api = HttpMatchApi::builder(&base).build().unwrap();

        let doc = api.export(MatchId::from_u128(4), true).await.unwrap();
        assert!(doc.is_debug());
        assert_eq!(doc.as_bytes(), DEBUG_EXPORT_BODY.as_bytes());
    }

    #[tokio::test]
    async fn unreachable_engine_is_a_request_error() {
        let api = HttpMatchApi::builder("http://127.0.0.1:1").build().unwrap();
        let err = api.fetch_state(MatchId::from_u128(1)).await.unwrap_err();
        assert!(matches!(err, ObserverError::Request(_)));
    }
}
