#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for Caro client integration tests.
//!
//! Provides a scripted [`MockTransport`], an interactive [`ServerHandle`] for
//! tests that need to answer the client's moves, a fixture snapshot source,
//! and helpers for building the server's JSON messages.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use caro_client::protocol::{MatchMode, MatchSnapshot, MatchStatus, MatchId, UserId};
use caro_client::{
    AuthIdentity, Board, CaroError, Coord, ProfileSource, SnapshotSource, Symbol, Transport,
    UserProfile,
};
use tokio::sync::mpsc;

pub const BLACK_USER: u64 = 10;
pub const WHITE_USER: u64 = 20;

// ── MockTransport ───────────────────────────────────────────────────

/// Scripted server responses are consumed in order by `recv()`.
/// All messages sent by the client are recorded in `sent`.
pub struct MockTransport {
    incoming: VecDeque<Option<Result<String, CaroError>>>,
    pub sent: Arc<StdMutex<Vec<String>>>,
    pub closed: Arc<AtomicBool>,
}

impl MockTransport {
    /// Returns the transport plus shared handles for inspecting sent messages
    /// and whether close was called.
    pub fn new(
        incoming: Vec<Option<Result<String, CaroError>>>,
    ) -> (Self, Arc<StdMutex<Vec<String>>>, Arc<AtomicBool>) {
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let transport = Self {
            incoming: VecDeque::from(incoming),
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
        };
        (transport, sent, closed)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<(), CaroError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, CaroError>> {
        if let Some(item) = self.incoming.pop_front() {
            item
        } else {
            // Hang so the stream loop stays alive until shutdown.
            std::future::pending().await
        }
    }

    async fn close(&mut self) -> Result<(), CaroError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

// ── Interactive transport ───────────────────────────────────────────

/// Client half of an in-memory game stream.
pub struct ChannelTransport {
    incoming: mpsc::UnboundedReceiver<String>,
    outgoing: mpsc::UnboundedSender<String>,
}

/// Server half: push messages to the client and read what it sent.
pub struct ServerHandle {
    pub to_client: mpsc::UnboundedSender<String>,
    pub from_client: mpsc::UnboundedReceiver<String>,
}

impl ServerHandle {
    pub fn push(&self, json: String) {
        self.to_client.send(json).expect("client transport dropped");
    }

    /// Next `make_move` from the client as `(row, col, player)`.
    pub async fn next_move(&mut self) -> (usize, usize, String) {
        let text = self.from_client.recv().await.expect("client sent nothing");
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "make_move", "unexpected client message {text}");
        (
            value["row"].as_u64().unwrap() as usize,
            value["col"].as_u64().unwrap() as usize,
            value["player"].as_str().unwrap().to_string(),
        )
    }

    /// Broadcast the client's next move back as accepted, like the server
    /// does for every participant.
    pub async fn echo_next_move(&mut self) -> (usize, usize, String) {
        let (row, col, player) = self.next_move().await;
        self.push(move_json(row, col, &player));
        (row, col, player)
    }
}

pub fn channel_transport() -> (ChannelTransport, ServerHandle) {
    let (to_client, incoming) = mpsc::unbounded_channel();
    let (outgoing, from_client) = mpsc::unbounded_channel();
    (
        ChannelTransport { incoming, outgoing },
        ServerHandle {
            to_client,
            from_client,
        },
    )
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&mut self, message: String) -> Result<(), CaroError> {
        self.outgoing
            .send(message)
            .map_err(|e| CaroError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, CaroError>> {
        self.incoming.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), CaroError> {
        self.incoming.close();
        Ok(())
    }
}

// ── Snapshots ───────────────────────────────────────────────────────

/// Serves one fixed snapshot, or one fixed failure.
pub struct FixtureSource {
    snapshot: Option<MatchSnapshot>,
    failure: fn(MatchId) -> CaroError,
}

impl FixtureSource {
    pub fn ok(snapshot: MatchSnapshot) -> Self {
        Self {
            snapshot: Some(snapshot),
            failure: CaroError::MatchNotFound,
        }
    }

    pub fn failing(failure: fn(MatchId) -> CaroError) -> Self {
        Self {
            snapshot: None,
            failure,
        }
    }
}

#[async_trait]
impl SnapshotSource for FixtureSource {
    async fn fetch(&self, match_id: MatchId) -> Result<MatchSnapshot, CaroError> {
        match &self.snapshot {
            Some(snapshot) => Ok(snapshot.clone()),
            None => Err((self.failure)(match_id)),
        }
    }
}

/// Answers every profile request with one account.
pub struct FixtureProfile(pub UserProfile);

impl FixtureProfile {
    pub fn user(id: u64, username: &str) -> Self {
        Self(UserProfile {
            id: UserId::from(id),
            username: username.to_string(),
            elo_rating: None,
        })
    }
}

#[async_trait]
impl ProfileSource for FixtureProfile {
    async fn fetch_profile(&self, identity: &AuthIdentity) -> Result<UserProfile, CaroError> {
        match identity.authorization_header() {
            Some(_) => Ok(self.0.clone()),
            None => Err(CaroError::Unauthorized),
        }
    }
}

/// An in-progress online match between [`BLACK_USER`] and [`WHITE_USER`].
pub fn snapshot(id: MatchId) -> MatchSnapshot {
    MatchSnapshot {
        id,
        mode: MatchMode::Online,
        status: MatchStatus::InProgress,
        result: None,
        black_player: Some(UserId::from(BLACK_USER)),
        white_player: Some(UserId::from(WHITE_USER)),
        board_state: Board::new(),
        move_history: Vec::new(),
        current_turn: Symbol::Black,
        winning_line: None,
    }
}

/// [`snapshot`] with `stones` already on the board.
pub fn snapshot_with(id: MatchId, stones: &[(usize, usize, Symbol)], turn: Symbol) -> MatchSnapshot {
    let mut snap = snapshot(id);
    for &(r, c, s) in stones {
        snap.board_state.place(Coord::new(r, c), s).unwrap();
    }
    snap.current_turn = turn;
    snap
}

// ── JSON helper functions ───────────────────────────────────────────

/// An accepted move broadcast.
pub fn move_json(row: usize, col: usize, player: &str) -> String {
    serde_json::json!({
        "type": "move",
        "row": row,
        "col": col,
        "player": player,
        "result": {"status": "success"},
    })
    .to_string()
}

/// A move broadcast without any result object.
pub fn bare_move_json(row: usize, col: usize, player: &str) -> String {
    serde_json::json!({"type": "move", "row": row, "col": col, "player": player}).to_string()
}

/// A move broadcast that ended the game.
pub fn game_over_json(
    row: usize,
    col: usize,
    player: &str,
    result: &str,
    line: &[(usize, usize)],
) -> String {
    serde_json::json!({
        "type": "move",
        "row": row,
        "col": col,
        "player": player,
        "result": {"status": "game_over", "result": result, "winning_line": line},
    })
    .to_string()
}

/// A move the server refused.
pub fn rejected_move_json(row: usize, col: usize, player: &str, message: &str) -> String {
    serde_json::json!({
        "type": "move",
        "row": row,
        "col": col,
        "player": player,
        "result": {"status": "error", "message": message},
    })
    .to_string()
}

/// A `game_state` push for `board` with `turn` to move.
pub fn game_state_json(board: &Board, turn: &str) -> String {
    serde_json::json!({
        "type": "game_state",
        "data": {"board": board.to_rows(), "current_turn": turn},
    })
    .to_string()
}
