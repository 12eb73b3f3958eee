//! Control of the external media player service.
//!
//! The game never decodes or plays audio itself. It issues control intents
//! to a [`MediaController`] and reacts to success or failure. Calls may take
//! real time, so the session actor always runs them on a separate task.

use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum MediaCommand {
    Play {
        uri: String,
        title: String,
        artist: String,
    },
    Pause,
    Resume,
    Stop,
}

impl MediaCommand {
    pub fn name(&self) -> &'static str {
        match self {
            MediaCommand::Play { .. } => "play",
            MediaCommand::Pause => "pause",
            MediaCommand::Resume => "resume",
            MediaCommand::Stop => "stop",
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MediaError {
    #[error("Media player '{0}' not found")]
    PlayerNotFound(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },
}

impl From<reqwest::Error> for MediaError {
    fn from(err: reqwest::Error) -> Self {
        MediaError::Network(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaPlayerInfo {
    pub entity_id: String,
    pub name: String,
    pub state: Option<String>,
}

#[async_trait]
pub trait MediaController: Send + Sync {
    async fn list_players(&self) -> Result<Vec<MediaPlayerInfo>, MediaError>;

    async fn execute(&self, player: &str, command: &MediaCommand) -> Result<(), MediaError>;
}

/// Backend that only logs intents. Used when no media service is configured.
pub struct LoggingMediaController {
    players: Vec<MediaPlayerInfo>,
}

impl LoggingMediaController {
    pub fn new<I, S>(player_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let players = player_ids
            .into_iter()
            .map(|id| {
                let entity_id: String = id.into();
                MediaPlayerInfo {
                    name: entity_id.clone(),
                    entity_id,
                    state: Some("idle".to_string()),
                }
            })
            .collect();

        Self { players }
    }
}

#[async_trait]
impl MediaController for LoggingMediaController {
    async fn list_players(&self) -> Result<Vec<MediaPlayerInfo>, MediaError> {
        Ok(self.players.clone())
    }

    async fn execute(&self, player: &str, command: &MediaCommand) -> Result<(), MediaError> {
        if !self.players.iter().any(|p| p.entity_id == player) {
            return Err(MediaError::PlayerNotFound(player.to_string()));
        }

        match command {
            MediaCommand::Play { title, artist, uri } => {
                info!("[{}] play '{}' by {} ({})", player, title, artist, uri)
            }
            other => info!("[{}] {}", player, other.name()),
        }
        Ok(())
    }
}

/// Home Assistant style REST backend: `GET /api/states` and
/// `POST /api/services/media_player/<service>`.
pub struct HttpMediaController {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpMediaController {
    pub fn new(base_url: &str, token: Option<&str>) -> Result<Self, MediaError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(String::from),
        })
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn service_call(player: &str, command: &MediaCommand) -> (&'static str, Value) {
        match command {
            MediaCommand::Play { uri, .. } => (
                "play_media",
                json!({
                    "entity_id": player,
                    "media_content_id": uri,
                    "media_content_type": "music",
                }),
            ),
            MediaCommand::Pause => ("media_pause", json!({ "entity_id": player })),
            MediaCommand::Resume => ("media_play", json!({ "entity_id": player })),
            MediaCommand::Stop => ("media_stop", json!({ "entity_id": player })),
        }
    }
}

#[derive(Debug, Deserialize)]
struct EntityState {
    entity_id: String,
    state: Option<String>,
    #[serde(default)]
    attributes: Value,
}

#[async_trait]
impl MediaController for HttpMediaController {
    async fn list_players(&self) -> Result<Vec<MediaPlayerInfo>, MediaError> {
        let endpoint = format!("{}/api/states", self.base_url);
        let resp = self.authorized(self.client.get(&endpoint)).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(MediaError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let states: Vec<EntityState> = resp.json().await?;
        Ok(states
            .into_iter()
            .filter(|s| s.entity_id.starts_with("media_player."))
            .map(|s| MediaPlayerInfo {
                name: s
                    .attributes
                    .get("friendly_name")
                    .and_then(Value::as_str)
                    .unwrap_or(&s.entity_id)
                    .to_string(),
                entity_id: s.entity_id,
                state: s.state,
            })
            .collect())
    }

    async fn execute(&self, player: &str, command: &MediaCommand) -> Result<(), MediaError> {
        let (service, body) = Self::service_call(player, command);
        let endpoint = format!("{}/api/services/media_player/{}", self.base_url, service);
        debug!("POST {} {}", endpoint, body);

        let resp = self
            .authorized(self.client.post(&endpoint))
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if status.as_u16() == 404 {
            return Err(MediaError::PlayerNotFound(player.to_string()));
        }
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(MediaError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(())
    }
}
