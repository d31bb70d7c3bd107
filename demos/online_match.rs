//! # Online Match Example
//!
//! Demonstrates a complete live match view:
//!
//! 1. Resolve configuration and the caller's identity
//! 2. Load the match snapshot over REST
//! 3. Open the game stream over WebSocket
//! 4. Play moves typed on stdin as `row col`
//! 5. Unmount on game over, disconnect or Ctrl+C
//!
//! ## Running
//!
//! ```sh
//! # Start the game API on localhost:8000, then:
//! CARO_MATCH_ID=42 CARO_TOKEN=abc123 CARO_USER_ID=7 cargo run --example online_match
//!
//! # Point at another deployment:
//! CARO_API_URL=https://caro.test/api CARO_MATCH_ID=42 ... cargo run --example online_match
//! ```

use caro_client::auth::{TOKEN_KEY, USER_KEY};
use caro_client::{
    AuthContext, CaroConfig, Coord, HttpProfileSource, HttpSnapshotSource, LiveMatch,
    MatchStreamConfig, MatchUpdate, MemoryStore, SessionStore, SessionUpdate,
};
use tokio::io::{AsyncBufReadExt, BufReader};

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
    let config = CaroConfig::from_env();
    let match_id: u64 = std::env::var("CARO_MATCH_ID")?.parse()?;

    // A real app persists these after login; the demo takes them from the
    // environment.
    let store = MemoryStore::new();
    if let (Ok(token), Ok(user_id)) = (std::env::var("CARO_TOKEN"), std::env::var("CARO_USER_ID")) {
        store.set(TOKEN_KEY, token);
        store.set(USER_KEY, format!(r#"{{"id":"{user_id}","username":"demo"}}"#));
    }
    let auth = AuthContext::resolve(&store, config.oidc_settings().as_ref());
    if let Err(e) = auth
        .load_profile(&HttpProfileSource::new(&config.api_base_url))
        .await
    {
        tracing::warn!("profile unavailable, joining as observer: {e}");
    }
    let identity = auth.current();
    tracing::info!(authenticated = identity.is_authenticated(), "identity resolved");

    // ── Mount ───────────────────────────────────────────────────────
    let source = HttpSnapshotSource::new(&config.api_base_url, identity.authorization_header());
    let mut live = LiveMatch::new(match_id, identity.user_id().cloned());
    live.load(&source).await?;
    tracing::info!(
        seat = ?live.session().seat(),
        turn = %live.session().turn(),
        "snapshot loaded\n{:?}",
        live.session().board()
    );

    live.connect_websocket(&config, &identity, MatchStreamConfig::default())
        .await?;

    // ── Event loop ──────────────────────────────────────────────────
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            update = live.next_update() => {
                let Some(update) = update else {
                    tracing::info!("stream finished");
                    break;
                };
                match update {
                    MatchUpdate::Connected => tracing::info!("game stream connected"),
                    MatchUpdate::Session(SessionUpdate::MoveRejected { reason, .. }) => {
                        tracing::warn!(?reason, "move rejected by server");
                    }
                    MatchUpdate::Session(change) => {
                        tracing::info!(?change, "\n{:?}", live.session().board());
                    }
                    MatchUpdate::Disconnected { reason } => {
                        tracing::warn!(?reason, "game stream closed");
                        break;
                    }
                }
                if live.session().is_over() {
                    tracing::info!(
                        result = ?live.session().result(),
                        line = ?live.session().winning_line(),
                        "game over"
                    );
                    break;
                }
            }

            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let mut parts = line.split_whitespace().map(str::parse::<usize>);
                let (Some(Ok(row)), Some(Ok(col))) = (parts.next(), parts.next()) else {
                    tracing::warn!("enter a move as `row col`");
                    continue;
                };
                if let Err(e) = live.play(Coord::new(row, col)) {
                    tracing::warn!("{e}");
                    if let Some(notice) = live.session().notice() {
                        tracing::warn!("{notice}");
                    }
                }
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received");
                break;
            }
        }
    }

    // ── Teardown ────────────────────────────────────────────────────
    live.unmount().await;
    if let Some(status) = live.session().status_message() {
        tracing::info!("{status}");
    }
    Ok(())
}
