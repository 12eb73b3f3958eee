//! The session actor: the single writer for all game state.
//!
//! Socket tasks and HTTP handlers never touch the session directly. They send
//! [`ServerMessage`]s to the actor, which processes them one at a time,
//! applies the mutation, and only then queues the resulting event on every
//! socket. A tick interval drives round expiry from the server clock, and
//! media calls run on their own tasks and re-enter the actor as messages.

use crate::broadcast::BroadcastHub;
use crate::error::GameError;
use crate::game::{GameSession, GameStatus, RoundAdvance};
use crate::media::{MediaCommand, MediaController, MediaError};
use crate::playlist::{PlaylistLibrary, Track};
use crate::reconnect;
use crate::timer::DEFAULT_POLL_INTERVAL;
use crate::utils::get_timestamp;
use log::{debug, error, info, warn};
use serde::Serialize;
use serde_json::{json, Value};
use shared::{
    ClientCommand, CommandEnvelope, CommandReply, ErrorCode, GameConfig, GameEvent, GameState,
    JoinResult, MediaAction, OutboundMessage,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};

/// Messages sent from socket tasks, HTTP handlers and media tasks to the actor
#[derive(Debug)]
pub enum ServerMessage {
    ClientConnected {
        conn_id: u32,
        sender: mpsc::UnboundedSender<String>,
    },
    TextReceived {
        conn_id: u32,
        text: String,
    },
    ClientDisconnected {
        conn_id: u32,
    },
    StartGame {
        request: StartGameRequest,
        media_players: Vec<String>,
        respond_to: oneshot::Sender<Result<StartGameResponse, GameError>>,
    },
    GameStatus {
        respond_to: oneshot::Sender<GameStatus>,
    },
    MediaFinished {
        ticket: u64,
        result: Result<(), MediaError>,
    },
    Shutdown,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct StartGameRequest {
    #[serde(default)]
    pub config: GameConfig,
    /// Replace a game that is already running
    #[serde(default)]
    pub force: bool,
    /// Required together with `force`
    #[serde(default)]
    pub admin_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StartGameResponse {
    pub success: bool,
    pub admin_key: String,
    pub state: GameState,
    pub tracks_available: usize,
}

/// Cloneable entry point into the actor
#[derive(Clone)]
pub struct ServerHandle {
    tx: mpsc::UnboundedSender<ServerMessage>,
    next_conn_id: Arc<AtomicU32>,
}

impl ServerHandle {
    pub fn next_connection_id(&self) -> u32 {
        self.next_conn_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Returns false once the actor has stopped
    pub fn send(&self, message: ServerMessage) -> bool {
        self.tx.send(message).is_ok()
    }

    pub async fn start_game(
        &self,
        request: StartGameRequest,
        media_players: Vec<String>,
    ) -> Result<StartGameResponse, GameError> {
        let (respond_to, response) = oneshot::channel();
        if !self.send(ServerMessage::StartGame {
            request,
            media_players,
            respond_to,
        }) {
            return Err(GameError::InvalidMessage("server is shutting down".into()));
        }
        response
            .await
            .map_err(|_| GameError::InvalidMessage("server is shutting down".into()))?
    }

    pub async fn status(&self) -> Option<GameStatus> {
        let (respond_to, response) = oneshot::channel();
        if !self.send(ServerMessage::GameStatus { respond_to }) {
            return None;
        }
        response.await.ok()
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(ServerMessage::Shutdown);
    }
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// How often round expiry is checked
    pub tick_interval: Duration,
    pub max_connections: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_POLL_INTERVAL,
            max_connections: crate::broadcast::DEFAULT_MAX_CONNECTIONS,
        }
    }
}

/// Who is waiting on a media call
#[derive(Debug)]
struct PendingMedia {
    generation: u64,
    round_number: Option<u32>,
    is_play: bool,
    reply: Option<(u32, Value, MediaAction)>,
}

/// Main server coordinating sockets, timers and the game session
pub struct Server {
    session: GameSession,
    hub: BroadcastHub,
    library: Arc<PlaylistLibrary>,
    media: Arc<dyn MediaController>,
    tick_interval: Duration,

    pending_media: HashMap<u64, PendingMedia>,
    next_ticket: u64,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl Server {
    pub fn new(
        session: GameSession,
        library: Arc<PlaylistLibrary>,
        media: Arc<dyn MediaController>,
        settings: ServerSettings,
    ) -> (Self, ServerHandle) {
        let (server_tx, server_rx) = mpsc::unbounded_channel();

        let handle = ServerHandle {
            tx: server_tx.clone(),
            next_conn_id: Arc::new(AtomicU32::new(1)),
        };

        let server = Server {
            session,
            hub: BroadcastHub::new(settings.max_connections),
            library,
            media,
            tick_interval: settings.tick_interval,
            pending_media: HashMap::new(),
            next_ticket: 1,
            server_tx,
            server_rx,
        };

        (server, handle)
    }

    /// Main actor loop. Runs until a `Shutdown` message arrives.
    pub async fn run(mut self) {
        let mut tick = interval(self.tick_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Game server started");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Game server shutting down");
                            break;
                        }
                        Some(message) => self.handle_message(message),
                    }
                },

                _ = tick.tick() => {
                    self.check_round_timer(get_timestamp());
                },
            }
        }
    }

    fn handle_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::ClientConnected { conn_id, sender } => {
                if !self.hub.add_connection(conn_id, sender.clone()) {
                    warn!("Rejecting connection {}: server full", conn_id);
                    let reply =
                        CommandReply::err(Value::Null, ErrorCode::GameFull, "Too many open connections");
                    if let Ok(frame) = serde_json::to_string(&OutboundMessage::Result(reply)) {
                        let _ = sender.send(frame);
                    }
                }
            }
            ServerMessage::TextReceived { conn_id, text } => {
                self.handle_text(conn_id, &text, get_timestamp());
            }
            ServerMessage::ClientDisconnected { conn_id } => {
                self.handle_disconnect(conn_id, get_timestamp());
            }
            ServerMessage::StartGame {
                request,
                media_players,
                respond_to,
            } => {
                let result = self.handle_start_game(request, &media_players);
                let _ = respond_to.send(result);
            }
            ServerMessage::GameStatus { respond_to } => {
                self.check_round_timer(get_timestamp());
                let _ = respond_to.send(self.session.status());
            }
            ServerMessage::MediaFinished { ticket, result } => {
                self.handle_media_finished(ticket, result);
            }
            ServerMessage::Shutdown => {}
        }
    }

    /// Settles the running round if the server clock says it is over
    fn check_round_timer(&mut self, now: u64) {
        if let Some(event) = self.session.expire_round_if_due(now) {
            self.hub.broadcast(&event);
        }
    }

    fn handle_text(&mut self, conn_id: u32, text: &str, now: u64) {
        // Refused or already closed sockets must not touch the session
        if !self.hub.contains(conn_id) {
            debug!("Dropping message from unregistered connection {}", conn_id);
            return;
        }

        // Decide expiry before looking at the command
        self.check_round_timer(now);

        let envelope: CommandEnvelope = match serde_json::from_str(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Invalid message from connection {}: {}", conn_id, e);
                let id = serde_json::from_str::<Value>(text)
                    .ok()
                    .and_then(|v| v.get("id").cloned())
                    .unwrap_or(Value::Null);
                let err = GameError::InvalidMessage(e.to_string());
                self.hub.reply(conn_id, CommandReply::err(id, err.code(), err.to_string()));
                return;
            }
        };

        if let Some(name) = self.hub.player_of(conn_id).map(String::from) {
            self.session.registry.touch(&name, now);
        }

        let name = envelope.command.name();
        debug!("Connection {} -> {}", conn_id, name);

        let id = envelope.id.clone();
        let is_reconnect = matches!(envelope.command, ClientCommand::Reconnect { .. });

        match self.dispatch(conn_id, id.clone(), envelope.command, now) {
            Ok(Some(result)) => self.hub.reply(conn_id, CommandReply::ok(id, result)),
            // Answered later, once the media service responds
            Ok(None) => {}
            Err(err) => {
                warn!("{} from connection {} rejected: {}", name, conn_id, err);
                let mut reply = CommandReply::err(id, err.code(), err.to_string());
                if is_reconnect {
                    reply.result = Some(json!({ "success": false, "reason": err.code() }));
                }
                self.hub.reply(conn_id, reply);
            }
        }
    }

    fn dispatch(
        &mut self,
        conn_id: u32,
        id: Value,
        command: ClientCommand,
        now: u64,
    ) -> Result<Option<Value>, GameError> {
        match command {
            ClientCommand::JoinGame { name, is_admin } => {
                let (outcome, event) = self.session.join(&name, is_admin, now)?;
                self.rebind(conn_id, &outcome.player_name, now);
                self.hub.broadcast(&event);

                let result = JoinResult {
                    success: true,
                    session_id: outcome.session_token,
                    player_name: outcome.player_name,
                    name_adjusted: outcome.name_adjusted,
                    original_name: outcome.original_name,
                    is_admin: outcome.is_admin,
                    players: self.session.registry.views(),
                };
                Ok(Some(to_value(&result)))
            }

            ClientCommand::Reconnect {
                session_id,
                player_name,
            } => {
                let already_bound = self.hub.player_of(conn_id) == Some(player_name.as_str());
                let resumed = reconnect::resume(
                    &mut self.session,
                    &session_id,
                    &player_name,
                    now,
                    !already_bound,
                )?;

                if !already_bound {
                    self.rebind(conn_id, &player_name, now);
                }
                info!("Player '{}' reconnected on connection {}", player_name, conn_id);

                if resumed.came_online {
                    self.hub.broadcast(&GameEvent::PlayerStatus {
                        player_name: player_name.clone(),
                        connected: true,
                        total_players: self.session.registry.len(),
                    });
                }
                Ok(Some(to_value(&resumed.result)))
            }

            ClientCommand::SubmitGuess {
                player_name,
                year_guess,
                bet_placed,
                submitted_at,
            } => {
                self.require_player(conn_id, &player_name)?;
                let event = self.session.submit_guess(
                    &player_name,
                    year_guess,
                    bet_placed,
                    submitted_at,
                    now,
                )?;
                self.hub.broadcast(&event);
                Ok(Some(json!({ "success": true })))
            }

            ClientCommand::PlaceBet {
                player_name,
                bet_active,
            } => {
                self.require_player(conn_id, &player_name)?;
                let event = self.session.place_bet(&player_name, bet_active, now)?;
                self.hub.broadcast(&event);
                Ok(Some(json!({ "success": true, "bet_active": bet_active })))
            }

            ClientCommand::NextSong { admin_key } => {
                self.require_admin(conn_id, admin_key.as_deref(), None)?;
                let advance = self.session.next_round(now)?;
                self.apply_advance(advance).map(Some)
            }

            ClientCommand::SkipSong { admin_key } => {
                self.require_admin(conn_id, admin_key.as_deref(), None)?;
                let (ended, advance) = self.session.skip_round(now)?;
                if let Some(event) = ended {
                    self.hub.broadcast(&event);
                }
                self.apply_advance(advance).map(Some)
            }

            ClientCommand::ResetGame { admin_key } => {
                self.require_admin(conn_id, admin_key.as_deref(), None)?;
                self.reset_game();
                Ok(Some(json!({ "success": true })))
            }

            ClientCommand::ControlMedia {
                action,
                session_id,
                admin_key,
            } => {
                self.require_admin(conn_id, admin_key.as_deref(), session_id.as_deref())?;
                let command = match action {
                    MediaAction::Play | MediaAction::Retry => {
                        let track = self.session.retry_playback()?;
                        play_command(&track)
                    }
                    MediaAction::Pause => MediaCommand::Pause,
                    MediaAction::Resume => MediaCommand::Resume,
                    MediaAction::Stop => MediaCommand::Stop,
                };
                self.dispatch_media(command, Some((conn_id, id, action)));
                Ok(None)
            }
        }
    }

    /// Broadcasts the outcome of a round advance and starts or stops playback
    fn apply_advance(&mut self, advance: RoundAdvance) -> Result<Value, GameError> {
        self.hub.broadcast(advance.event());

        match advance {
            RoundAdvance::Started {
                round_number,
                track,
                ..
            } => {
                self.dispatch_media(play_command(&track), None);
                Ok(json!({ "round_number": round_number }))
            }
            RoundAdvance::Ended { .. } => {
                self.dispatch_media(MediaCommand::Stop, None);
                Err(GameError::PlaylistExhausted)
            }
        }
    }

    fn reset_game(&mut self) {
        self.dispatch_media(MediaCommand::Stop, None);
        let event = self.session.reset();
        self.hub.unbind_all();
        self.hub.broadcast(&event);
    }

    /// Binds the socket to a player, releasing any player it spoke for before
    fn rebind(&mut self, conn_id: u32, player_name: &str, now: u64) {
        if let Some(previous) = self.hub.bind(conn_id, player_name) {
            if previous != player_name {
                self.release_player(&previous, now);
            }
        }
    }

    fn release_player(&mut self, player_name: &str, now: u64) {
        if self.session.registry.detach(player_name, now) {
            info!("Player '{}' went offline", player_name);
            self.hub.broadcast(&GameEvent::PlayerStatus {
                player_name: player_name.to_string(),
                connected: false,
                total_players: self.session.registry.len(),
            });
        }
    }

    fn handle_disconnect(&mut self, conn_id: u32, now: u64) {
        if let Some(conn) = self.hub.remove_connection(conn_id) {
            if let Some(player_name) = conn.player {
                self.release_player(&player_name, now);
            }
        }
    }

    /// The socket must speak for the named player
    fn require_player(&self, conn_id: u32, player_name: &str) -> Result<(), GameError> {
        if self.session.state() == GameState::Setup {
            return Err(GameError::GameNotStarted);
        }
        self.session.registry.get(player_name)?;

        if self.hub.player_of(conn_id) != Some(player_name) {
            return Err(GameError::Unauthorized);
        }
        Ok(())
    }

    fn require_admin(
        &self,
        conn_id: u32,
        admin_key: Option<&str>,
        session_id: Option<&str>,
    ) -> Result<(), GameError> {
        if self.session.state() == GameState::Setup {
            return Err(GameError::GameNotStarted);
        }

        let bound = self.hub.player_of(conn_id);
        if self.session.is_authorized_admin(bound, admin_key, session_id) {
            Ok(())
        } else {
            Err(GameError::Unauthorized)
        }
    }

    fn handle_start_game(
        &mut self,
        request: StartGameRequest,
        media_players: &[String],
    ) -> Result<StartGameResponse, GameError> {
        if self.session.state() != GameState::Setup {
            if !request.force {
                return Err(GameError::GameAlreadyStarted);
            }
            if !self.session.admin_key_matches(request.admin_key.as_deref()) {
                return Err(GameError::Unauthorized);
            }
            info!("Replacing running game on request");
            self.reset_game();
        }

        let playlist = self.library.get(&request.config.playlist);
        let (admin_key, event) = self
            .session
            .start_game(request.config, playlist, media_players)?;
        self.hub.broadcast(&event);

        Ok(StartGameResponse {
            success: true,
            admin_key,
            state: self.session.state(),
            tracks_available: self.session.tracks_remaining(),
        })
    }

    /// Runs a media call on its own task; the result comes back as a message
    fn dispatch_media(&mut self, command: MediaCommand, reply: Option<(u32, Value, MediaAction)>) {
        let Some(player) = self.session.media_player().map(String::from) else {
            if let Some((conn_id, id, _)) = reply {
                let err = GameError::GameNotStarted;
                self.hub.reply(conn_id, CommandReply::err(id, err.code(), err.to_string()));
            }
            return;
        };

        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.pending_media.insert(
            ticket,
            PendingMedia {
                generation: self.session.generation(),
                round_number: self.session.current_round().map(|r| r.round_number),
                is_play: matches!(command, MediaCommand::Play { .. }),
                reply,
            },
        );

        let media = Arc::clone(&self.media);
        let server_tx = self.server_tx.clone();
        tokio::spawn(async move {
            let result = media.execute(&player, &command).await;
            if let Err(e) = server_tx.send(ServerMessage::MediaFinished { ticket, result }) {
                error!("Failed to report media result: {}", e);
            }
        });
    }

    fn handle_media_finished(&mut self, ticket: u64, result: Result<(), MediaError>) {
        let Some(pending) = self.pending_media.remove(&ticket) else {
            return;
        };

        match result {
            Ok(()) => {
                if let Some((conn_id, id, action)) = pending.reply {
                    self.hub
                        .reply(conn_id, CommandReply::ok(id, json!({ "action_executed": action })));
                }
            }
            Err(e) => {
                warn!("Media command failed: {}", e);

                if pending.is_play {
                    let message = e.to_string();
                    if let Some(event) = self.session.record_playback_failure(
                        pending.generation,
                        pending.round_number,
                        &message,
                    ) {
                        self.hub.broadcast(&event);
                    }
                }

                if let Some((conn_id, id, _)) = pending.reply {
                    let err = GameError::MediaUnavailable(e.to_string());
                    self.hub
                        .reply(conn_id, CommandReply::err(id, err.code(), err.to_string()));
                }
            }
        }
    }
}

fn play_command(track: &Track) -> MediaCommand {
    MediaCommand::Play {
        uri: track.uri.clone(),
        title: track.title.clone(),
        artist: track.artist.clone(),
    }
}

fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}
