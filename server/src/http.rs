//! HTTP boundary: the `/ws` socket endpoint plus the setup and status routes.
//!
//! Handlers are thin. Anything that touches the session goes through the
//! [`ServerHandle`] so the actor stays the only writer.

use crate::error::GameError;
use crate::media::MediaController;
use crate::network::{ServerHandle, ServerMessage, StartGameRequest, StartGameResponse};
use crate::playlist::PlaylistLibrary;
use axum::{
    extract::{
        rejection::JsonRejection,
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::json;
use shared::{
    GameConfig, MAX_BET_MULTIPLIER, MAX_NAME_LENGTH, MAX_PLAYBACK_RETRIES, MAX_POINTS,
    MAX_ROUNDS, MAX_THRESHOLD, MAX_TIMER_SECONDS, MAX_YEAR, MIN_BET_PENALTY, MIN_TIMER_SECONDS,
    MIN_YEAR,
};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

pub struct AppState {
    pub handle: ServerHandle,
    pub library: Arc<PlaylistLibrary>,
    pub media: Arc<dyn MediaController>,
    /// Offered to the setup screen by `GET /config`
    pub defaults: GameConfig,
}

#[derive(Debug, Serialize)]
struct ConfigLimits {
    timer_duration: (u32, u32),
    year_range: (i32, i32),
    max_points: i32,
    max_threshold: u32,
    max_bet_multiplier: i32,
    min_bet_penalty: i32,
    max_rounds: u32,
    max_playback_retries: u32,
    max_name_length: usize,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/config", get(get_config))
        .route("/media_players", get(list_media_players))
        .route("/playlists", get(list_playlists))
        .route("/start_game", post(start_game))
        .route("/game_status", get(game_status))
        .with_state(state)
}

/// Serves the router until `shutdown` resolves, then drains open requests
pub async fn serve<F>(listener: TcpListener, state: Arc<AppState>, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("HTTP server stopped");
    Ok(())
}

impl IntoResponse for GameError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = json!({
            "success": false,
            "error": { "code": self.code(), "message": self.to_string() },
        });
        (status, Json(body)).into_response()
    }
}

async fn get_config(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let limits = ConfigLimits {
        timer_duration: (MIN_TIMER_SECONDS, MAX_TIMER_SECONDS),
        year_range: (MIN_YEAR, MAX_YEAR),
        max_points: MAX_POINTS,
        max_threshold: MAX_THRESHOLD,
        max_bet_multiplier: MAX_BET_MULTIPLIER,
        min_bet_penalty: MIN_BET_PENALTY,
        max_rounds: MAX_ROUNDS,
        max_playback_retries: MAX_PLAYBACK_RETRIES,
        max_name_length: MAX_NAME_LENGTH,
    };
    Json(json!({ "defaults": state.defaults, "limits": limits }))
}

async fn list_media_players(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, GameError> {
    let players = state
        .media
        .list_players()
        .await
        .map_err(|e| GameError::MediaUnavailable(e.to_string()))?;
    Ok(Json(json!({ "media_players": players })))
}

async fn list_playlists(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({ "playlists": state.library.summaries() }))
}

async fn start_game(
    State(state): State<Arc<AppState>>,
    body: Result<Json<StartGameRequest>, JsonRejection>,
) -> Result<Json<StartGameResponse>, GameError> {
    let Json(request) = body.map_err(|e| GameError::ValidationFailed(e.body_text()))?;

    let media_players = state
        .media
        .list_players()
        .await
        .map_err(|e| GameError::MediaUnavailable(e.to_string()))?
        .into_iter()
        .map(|p| p.entity_id)
        .collect();

    let response = state.handle.start_game(request, media_players).await?;
    Ok(Json(response))
}

async fn game_status(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, GameError> {
    let status = state
        .handle
        .status()
        .await
        .ok_or_else(|| GameError::InvalidMessage("server is shutting down".into()))?;
    Ok(Json(status))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    let handle = state.handle.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, handle))
}

/// Pumps one websocket: frames in go to the actor, queued frames go out.
async fn handle_socket(socket: WebSocket, handle: ServerHandle) {
    let conn_id = handle.next_connection_id();
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    if !handle.send(ServerMessage::ClientConnected { conn_id, sender: tx }) {
        return;
    }
    info!("Connection {} accepted", conn_id);

    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if ws_tx.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    let reader = handle.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                Message::Text(text) => {
                    if !reader.send(ServerMessage::TextReceived {
                        conn_id,
                        text: text.to_string(),
                    }) {
                        break;
                    }
                }
                Message::Close(_) => break,
                Message::Binary(_) => warn!("Ignoring binary frame from connection {}", conn_id),
                Message::Ping(_) | Message::Pong(_) => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    debug!("Connection {} finished", conn_id);
    handle.send(ServerMessage::ClientDisconnected { conn_id });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::GameSession;
    use crate::media::LoggingMediaController;
    use crate::network::{Server, ServerSettings};
    use crate::registry::DEFAULT_SESSION_TTL;
    use axum::body::to_bytes;
    use serde_json::Value;
    use std::time::Duration;
    use tokio::sync::oneshot;
    use tokio::time::timeout;

    async fn body_of(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_error_response_shape() {
        let response = GameError::PlaylistNotFound("disco".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = body_of(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "playlist_not_found");
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let cases = [
            (GameError::ValidationFailed("x".into()), StatusCode::BAD_REQUEST),
            (GameError::GameAlreadyStarted, StatusCode::CONFLICT),
            (GameError::Unauthorized, StatusCode::FORBIDDEN),
            (GameError::MediaUnavailable("down".into()), StatusCode::BAD_GATEWAY),
        ];

        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[tokio::test]
    async fn test_serve_stops_on_shutdown_signal() {
        let library = Arc::new(PlaylistLibrary::new());
        let media: Arc<dyn MediaController> =
            Arc::new(LoggingMediaController::new(["media_player.den"]));
        let (game_server, handle) = Server::new(
            GameSession::new(4, DEFAULT_SESSION_TTL),
            Arc::clone(&library),
            Arc::clone(&media),
            ServerSettings::default(),
        );
        tokio::spawn(game_server.run());

        let state = Arc::new(AppState {
            handle: handle.clone(),
            library,
            media,
            defaults: GameConfig::default(),
        });
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (stop, stopped) = oneshot::channel::<()>();
        let server = tokio::spawn(serve(listener, state, async {
            let _ = stopped.await;
        }));

        let response = reqwest::get(format!("http://{}/playlists", addr)).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);

        stop.send(()).unwrap();
        let finished = timeout(Duration::from_secs(2), server)
            .await
            .expect("server did not stop");
        assert!(finished.unwrap().is_ok());
        assert!(reqwest::get(format!("http://{}/playlists", addr)).await.is_err());
        handle.shutdown();
    }
}
