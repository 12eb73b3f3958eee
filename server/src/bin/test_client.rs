use clap::Parser;
use futures::{SinkExt, StreamExt};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Scripted player: joins, guesses a random year every round, and optionally
/// drives the game as host.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Websocket endpoint of the game server
    #[clap(long, default_value = "ws://127.0.0.1:8080/ws")]
    url: String,
    /// Name to join with
    #[clap(short, long, default_value = "Bot")]
    name: String,
    /// Rounds to play before leaving
    #[clap(short, long, default_value = "3")]
    rounds: u32,
    /// Admin key from POST /start_game; makes this client the host
    #[clap(long)]
    admin_key: Option<String>,
    /// Seed for reproducible guesses
    #[clap(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    println!("Connecting to {}", args.url);
    let (ws, _) = connect_async(args.url.as_str()).await?;
    let (mut ws_tx, mut ws_rx) = ws.split();

    let mut next_id = 1u64;
    let mut command = |mut body: Value| {
        body["id"] = json!(next_id);
        next_id += 1;
        Message::Text(body.to_string().into())
    };

    let is_host = args.admin_key.is_some();
    ws_tx
        .send(command(json!({"type": "join_game", "name": args.name, "is_admin": is_host})))
        .await?;

    let mut player_name = args.name.clone();
    let mut rounds_played = 0;

    while let Some(frame) = ws_rx.next().await {
        let text = match frame? {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let message: Value = serde_json::from_str(text.as_str())?;

        if message["type"] == "result" {
            if message["success"] == false {
                println!("Command {} failed: {}", message["id"], message["error"]);
                continue;
            }
            let result = &message["result"];
            if let Some(session_id) = result["session_id"].as_str() {
                player_name = result["player_name"].as_str().unwrap_or(&args.name).to_string();
                println!("Joined as '{}' (session {})", player_name, session_id);

                if let Some(key) = &args.admin_key {
                    ws_tx
                        .send(command(json!({"type": "next_song", "admin_key": key})))
                        .await?;
                }
            }
            continue;
        }

        let data = &message["data"];
        match message["event_type"].as_str() {
            Some("round_started") => {
                let start = data["year_range"][0].as_i64().unwrap_or(1950) as i32;
                let end = data["year_range"][1].as_i64().unwrap_or(2029) as i32;
                let guess = rng.gen_range(start..=end.max(start));
                let bet = rng.gen_bool(0.25);

                println!(
                    "Round {}: '{}' by {}; guessing {}{}",
                    data["round_number"],
                    data["song"]["title"].as_str().unwrap_or("?"),
                    data["song"]["artist"].as_str().unwrap_or("?"),
                    guess,
                    if bet { " with a bet" } else { "" }
                );

                sleep(Duration::from_millis(rng.gen_range(500..2_000))).await;
                ws_tx
                    .send(command(json!({
                        "type": "submit_guess",
                        "player_name": player_name,
                        "year_guess": guess,
                        "bet_placed": bet,
                    })))
                    .await?;
            }
            Some("round_ended") => {
                rounds_played += 1;
                println!("Round {} over, correct year {}", data["round_number"], data["correct_year"]);
                for entry in data["leaderboard"].as_array().into_iter().flatten() {
                    println!("  #{} {} ({})", entry["rank"], entry["player_name"], entry["total_points"]);
                }

                if rounds_played >= args.rounds {
                    break;
                }
                if let Some(key) = &args.admin_key {
                    sleep(Duration::from_secs(3)).await;
                    ws_tx
                        .send(command(json!({"type": "next_song", "admin_key": key})))
                        .await?;
                }
            }
            Some("game_ended") | Some("game_reset") => {
                println!("Game over: {}", data);
                break;
            }
            Some(other) => println!("Event {}: {}", other, data),
            None => println!("Unexpected frame: {}", message),
        }
    }

    ws_tx.send(Message::Close(None)).await?;
    println!("Test client finished after {} rounds", rounds_played);
    Ok(())
}
