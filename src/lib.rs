//! # Caro Client
//!
//! Async client core for live Caro (five-in-a-row, 15×15) matches.
//!
//! The crate reconciles the board a player sees with the authoritative game
//! server: it loads a match snapshot over REST, opens a JSON game stream,
//! applies optimistic local moves, merges the server's echo of those moves,
//! and detects the end of the game.
//!
//! ## Features
//!
//! - **Transport-agnostic**: implement the [`Transport`] trait for any backend
//! - **WebSocket built-in**: the default `transport-websocket` feature provides
//!   [`WebSocketTransport`]
//! - **REST snapshots**: the default `snapshot-http` feature provides
//!   [`HttpSnapshotSource`] and [`HttpProfileSource`]
//! - **Offline play**: local two-player and computer-opponent sessions share
//!   the same [`MatchSession`] and win detection
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use caro_client::{
//!     AuthContext, CaroConfig, Coord, HttpProfileSource, HttpSnapshotSource, LiveMatch,
//!     MatchStreamConfig, MemoryStore,
//! };
//!
//! # async fn run() -> caro_client::Result<()> {
//! let config = CaroConfig::from_env();
//! let auth = AuthContext::resolve(&MemoryStore::new(), config.oidc_settings().as_ref());
//! // Federated sessions learn their game API user id here.
//! auth.load_profile(&HttpProfileSource::new(&config.api_base_url)).await?;
//! let identity = auth.current();
//!
//! let source = HttpSnapshotSource::new(&config.api_base_url, identity.authorization_header());
//! let mut live = LiveMatch::new(42, identity.user_id().cloned());
//! live.load(&source).await?;
//! live.connect_websocket(&config, &identity, MatchStreamConfig::default()).await?;
//!
//! live.play(Coord::new(7, 7))?;
//! while let Some(update) = live.next_update().await {
//!     println!("{update:?}");
//! }
//! live.unmount().await;
//! # Ok(())
//! # }
//! ```

pub mod ai;
pub mod auth;
pub mod board;
pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod live;
pub mod poll;
pub mod protocol;
pub mod rejection;
pub mod session;
pub mod snapshot;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use ai::{AiOpponent, Difficulty, MoveStrategy, RandomStrategy, ThreatStrategy};
pub use auth::{
    AuthContext, AuthIdentity, MemoryStore, OidcSettings, ProfileSource, SessionStore, UserProfile,
};
pub use board::{evaluate, Board, Cell, Coord, Evaluation, Symbol, BOARD_SIZE, WIN_LENGTH};
pub use client::{MatchStream, MatchStreamConfig};
pub use config::{CaroConfig, Environment};
pub use error::{CaroError, Result};
pub use event::StreamEvent;
pub use live::{LiveMatch, MatchUpdate};
pub use poll::PollTask;
pub use protocol::{ClientMessage, GameResult, MatchId, MatchSnapshot, ServerMessage, UserId};
pub use rejection::MoveRejection;
pub use session::{LocalMove, MatchSession, MoveIntent, Phase, SessionUpdate};
#[cfg(feature = "snapshot-http")]
pub use snapshot::{HttpProfileSource, HttpSnapshotSource};
pub use snapshot::SnapshotSource;
pub use transport::Transport;
#[cfg(feature = "transport-websocket")]
pub use transports::WebSocketTransport;
