use clap::Parser;
use log::{error, info, warn};
use server::game::GameSession;
use server::http::{self, AppState};
use server::media::{HttpMediaController, LoggingMediaController, MediaController};
use server::network::{Server, ServerSettings};
use server::playlist::PlaylistLibrary;
use server::registry::{DEFAULT_MAX_PLAYERS, DEFAULT_SESSION_TTL};
use shared::GameConfig;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Main-method of the application.
/// Parses command-line arguments, loads playlists, then runs the game actor and the HTTP server.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, default_value = "127.0.0.1")]
        host: String,
        /// Server port to listen on
        #[clap(short, long, default_value = "8080")]
        port: u16,
        /// How often the round timer is checked, in milliseconds
        #[clap(long, default_value = "250")]
        tick_ms: u64,
        /// Seconds a disconnected player's session stays resumable
        #[clap(long, default_value_t = DEFAULT_SESSION_TTL.as_secs())]
        session_ttl: u64,
        /// Maximum number of players in one game
        #[clap(long, default_value_t = DEFAULT_MAX_PLAYERS)]
        max_players: usize,
        /// Maximum number of open websockets
        #[clap(long, default_value_t = server::broadcast::DEFAULT_MAX_CONNECTIONS)]
        max_connections: usize,
        /// Directory of playlist JSON files
        #[clap(long, default_value = "playlists")]
        playlists_dir: PathBuf,
        /// Media player ids offered by the built-in logging backend
        #[clap(long = "media-player", default_value = "media_player.living_room")]
        media_players: Vec<String>,
        /// Base URL of a Home Assistant style media service
        #[clap(long)]
        media_url: Option<String>,
        /// Bearer token for the media service
        #[clap(long)]
        media_token: Option<String>,
    }

    // Parse command line arguments
    let args = Args::parse();

    let library = PlaylistLibrary::load_dir(&args.playlists_dir)?;
    if library.is_empty() {
        warn!("No playlists found in {}", args.playlists_dir.display());
    } else {
        info!("Loaded {} playlists from {}", library.len(), args.playlists_dir.display());
    }

    let media: Arc<dyn MediaController> = match &args.media_url {
        Some(url) => {
            info!("Using media service at {}", url);
            Arc::new(HttpMediaController::new(url, args.media_token.as_deref())?)
        }
        None => {
            info!("Using logging media backend: {:?}", args.media_players);
            Arc::new(LoggingMediaController::new(args.media_players.iter()))
        }
    };

    let library = Arc::new(library);
    let session = GameSession::new(args.max_players, Duration::from_secs(args.session_ttl));
    let (game_server, handle) = Server::new(
        session,
        Arc::clone(&library),
        Arc::clone(&media),
        ServerSettings {
            tick_interval: Duration::from_millis(args.tick_ms.max(1)),
            max_connections: args.max_connections,
        },
    );

    let state = Arc::new(AppState {
        handle: handle.clone(),
        library,
        media,
        defaults: GameConfig::default(),
    });

    let address = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!("Listening on {}", address);

    let (stop_http, http_stopped) = tokio::sync::oneshot::channel::<()>();
    let mut game_handle = tokio::spawn(game_server.run());
    let mut http_handle = tokio::spawn(async move {
        let shutdown = async {
            let _ = http_stopped.await;
        };
        if let Err(e) = http::serve(listener, state, shutdown).await {
            error!("HTTP server failed: {}", e);
        }
    });

    // Handle shutdown gracefully
    tokio::select! {
        result = &mut game_handle => {
            if let Err(e) = result {
                error!("Game server task panicked: {}", e);
            }
        }
        result = &mut http_handle => {
            if let Err(e) = result {
                error!("HTTP task panicked: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    // Stop accepting requests, let in-flight ones finish, then stop the actor
    let _ = stop_http.send(());
    if !http_handle.is_finished() {
        if let Err(e) = http_handle.await {
            error!("HTTP task panicked: {}", e);
        }
    }
    handle.shutdown();
    if !game_handle.is_finished() {
        if let Err(e) = game_handle.await {
            error!("Game server task panicked: {}", e);
        }
    }
    info!("Shutdown complete");

    Ok(())
}
