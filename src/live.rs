//! One mounted online match.
//!
//! [`LiveMatch`] ties the pieces together for the lifetime of a match view:
//! it loads the snapshot once, opens the game stream once, folds stream events
//! into its [`MatchSession`], sends local plays, and tears everything down on
//! [`unmount`](LiveMatch::unmount). After teardown no further update is
//! applied, even if events were still queued.
//!
//! # Example
//!
//! ```rust,ignore
//! let config = CaroConfig::from_env();
//! let identity = auth.current();
//! let source = HttpSnapshotSource::new(&config.api_base_url, identity.authorization_header());
//!
//! let mut live = LiveMatch::new(42, identity.user_id().cloned());
//! live.load(&source).await?;
//! live.connect_websocket(&config, &identity, MatchStreamConfig::default()).await?;
//!
//! live.play(Coord::new(7, 7))?;
//! while let Some(update) = live.next_update().await {
//!     // redraw
//! }
//! live.unmount().await;
//! ```

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::board::Coord;
use crate::client::{MatchStream, MatchStreamConfig};
use crate::error::{CaroError, Result};
use crate::event::StreamEvent;
use crate::protocol::{MatchId, UserId};
use crate::session::{LocalMove, MatchSession, Phase, SessionUpdate};
use crate::snapshot::{failure_message, resolve_seat, SnapshotSource};
use crate::transport::Transport;

/// Something the view should react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchUpdate {
    /// The game stream is open.
    Connected,
    /// The session changed.
    Session(SessionUpdate),
    /// The game stream ended; the reason is also recorded as the session's
    /// status message.
    Disconnected { reason: Option<String> },
}

/// Snapshot, stream and session of one mounted online match.
pub struct LiveMatch {
    match_id: MatchId,
    caller: Option<UserId>,
    session: MatchSession,
    stream: Option<MatchStream>,
    events: Option<mpsc::Receiver<StreamEvent>>,
    /// Set once a stream has been opened; never cleared.
    stream_initialized: bool,
    torn_down: bool,
}

impl LiveMatch {
    /// Mount a view for `match_id`. `caller` is the signed-in user, used to
    /// decide which seat (if any) this client plays.
    pub fn new(match_id: MatchId, caller: Option<UserId>) -> Self {
        Self {
            match_id,
            caller,
            session: MatchSession::online(),
            stream: None,
            events: None,
            stream_initialized: false,
            torn_down: false,
        }
    }

    /// Fetch and apply the snapshot. Runs at most once per mount.
    ///
    /// # Errors
    ///
    /// Whatever the source returned. The failure is also recorded as the
    /// session's status message and the match stays unplayable.
    /// [`CaroError::NotConnected`] after [`unmount`](Self::unmount), without
    /// fetching.
    pub async fn load(&mut self, source: &dyn SnapshotSource) -> Result<()> {
        if self.torn_down {
            return Err(CaroError::NotConnected);
        }
        if !self.session.begin_snapshot() {
            debug!(match_id = self.match_id, "snapshot already requested");
            return Ok(());
        }
        match source.fetch(self.match_id).await {
            Ok(snapshot) => {
                let seat = resolve_seat(&snapshot, self.caller.as_ref());
                self.session.load_snapshot(snapshot, seat);
                Ok(())
            }
            Err(e) => {
                self.session.snapshot_failed(failure_message(&e));
                Err(e)
            }
        }
    }

    /// Start the game stream over an already connected transport.
    ///
    /// # Errors
    ///
    /// - [`CaroError::StreamAlreadyOpen`] on any second call
    /// - [`CaroError::SnapshotPending`] before [`load`](Self::load) succeeded
    /// - [`CaroError::NotConnected`] after [`unmount`](Self::unmount)
    pub fn open_stream(&mut self, transport: impl Transport, config: MatchStreamConfig) -> Result<()> {
        self.check_can_open()?;
        let (stream, events) = MatchStream::start(transport, config);
        self.stream = Some(stream);
        self.events = Some(events);
        self.stream_initialized = true;
        info!(match_id = self.match_id, "game stream opened");
        Ok(())
    }

    /// Dial the game stream over WebSocket and [`open_stream`](Self::open_stream).
    ///
    /// # Errors
    ///
    /// The guards of `open_stream`, [`CaroError::Unauthorized`] for an
    /// anonymous identity, or the connection error.
    #[cfg(feature = "transport-websocket")]
    pub async fn connect_websocket(
        &mut self,
        config: &crate::config::CaroConfig,
        identity: &crate::auth::AuthIdentity,
        stream_config: MatchStreamConfig,
    ) -> Result<()> {
        self.check_can_open()?;
        let token = identity.stream_token().ok_or(CaroError::Unauthorized)?;
        let url = config.stream_url(self.match_id, token);
        let transport = match crate::transports::WebSocketTransport::connect(&url).await {
            Ok(transport) => transport,
            Err(e) => {
                self.session.set_status(format!("Connection failed: {e}"));
                return Err(e);
            }
        };
        self.open_stream(transport, stream_config)
    }

    /// Wait for the next stream event and fold it into the session.
    ///
    /// Events that change nothing (duplicates, conflicts, anything after the
    /// game ended) are skipped. Returns `None` once the stream has ended and
    /// every event was consumed, when no stream was opened, or after
    /// [`unmount`](Self::unmount).
    pub async fn next_update(&mut self) -> Option<MatchUpdate> {
        loop {
            if self.torn_down {
                return None;
            }
            let event = self.events.as_mut()?.recv().await?;
            if let Some(update) = self.apply_event(event) {
                return Some(update);
            }
        }
    }

    /// Attempt a move at `coord`; online moves are sent to the server.
    ///
    /// # Errors
    ///
    /// [`CaroError::IllegalMove`] when the session refuses the move, or
    /// [`CaroError::NotConnected`] when the stream is not open. In both cases
    /// the board is unchanged.
    pub fn play(&mut self, coord: Coord) -> Result<LocalMove> {
        if self.torn_down {
            return Err(CaroError::NotConnected);
        }
        let local = self.session.try_local_move(coord)?;
        if let LocalMove::Sent(intent) = &local {
            let sent = match &self.stream {
                Some(stream) => stream.send_move(intent),
                None => Err(CaroError::NotConnected),
            };
            if let Err(e) = sent {
                warn!(intent_id = %intent.id, "move could not be sent: {e}");
                self.session.withdraw_intent(intent.id);
                return Err(e);
            }
            debug!(intent_id = %intent.id, %coord, "move sent");
        }
        Ok(local)
    }

    /// Close the stream and stop applying updates. Safe to call twice.
    pub async fn unmount(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        self.events = None;
        if let Some(mut stream) = self.stream.take() {
            stream.shutdown().await;
        }
        debug!(match_id = self.match_id, "match view unmounted");
    }

    pub fn match_id(&self) -> MatchId {
        self.match_id
    }

    pub fn session(&self) -> &MatchSession {
        &self.session
    }

    /// Whether the game stream is currently open.
    pub fn is_connected(&self) -> bool {
        self.stream.as_ref().is_some_and(MatchStream::is_connected)
    }

    pub fn is_unmounted(&self) -> bool {
        self.torn_down
    }

    fn check_can_open(&self) -> Result<()> {
        if self.torn_down {
            return Err(CaroError::NotConnected);
        }
        if self.stream_initialized {
            return Err(CaroError::StreamAlreadyOpen);
        }
        if matches!(self.session.phase(), Phase::Idle | Phase::AwaitingSnapshot) {
            return Err(CaroError::SnapshotPending);
        }
        Ok(())
    }

    fn apply_event(&mut self, event: StreamEvent) -> Option<MatchUpdate> {
        match event {
            StreamEvent::Connected => Some(MatchUpdate::Connected),
            StreamEvent::StateSync(state) => {
                self.session.apply_state_sync(state).map(MatchUpdate::Session)
            }
            StreamEvent::MoveApplied(mv) => {
                self.session.apply_remote_move(mv).map(MatchUpdate::Session)
            }
            StreamEvent::Disconnected { reason } => {
                let status = match &reason {
                    Some(reason) => format!("Connection lost: {reason}"),
                    None => "Connection closed by server".to_string(),
                };
                info!(match_id = self.match_id, %status, "game stream ended");
                self.session.set_status(status);
                Some(MatchUpdate::Disconnected { reason })
            }
        }
    }
}

impl std::fmt::Debug for LiveMatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveMatch")
            .field("match_id", &self.match_id)
            .field("phase", &self.session.phase())
            .field("connected", &self.is_connected())
            .field("torn_down", &self.torn_down)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::board::{Board, Symbol};
    use crate::protocol::{MatchMode, MatchSnapshot, MatchStatus};
    use crate::rejection::MoveRejection;
    use async_trait::async_trait;

    struct FixtureSource(std::result::Result<MatchSnapshot, fn(MatchId) -> CaroError>);

    #[async_trait]
    impl SnapshotSource for FixtureSource {
        async fn fetch(&self, match_id: MatchId) -> Result<MatchSnapshot> {
            match &self.0 {
                Ok(snapshot) => Ok(snapshot.clone()),
                Err(make) => Err(make(match_id)),
            }
        }
    }

    /// Server side of an in-memory stream.
    struct Server {
        to_client: mpsc::UnboundedSender<String>,
        from_client: mpsc::UnboundedReceiver<String>,
    }

    struct PipeTransport {
        incoming: mpsc::UnboundedReceiver<String>,
        outgoing: mpsc::UnboundedSender<String>,
    }

    #[async_trait]
    impl Transport for PipeTransport {
        async fn send(&mut self, message: String) -> Result<()> {
            self.outgoing.send(message).map_err(|_| CaroError::TransportClosed)
        }

        async fn recv(&mut self) -> Option<Result<String>> {
            self.incoming.recv().await.map(Ok)
        }

        async fn close(&mut self) -> Result<()> {
            self.incoming.close();
            Ok(())
        }
    }

    fn pipe() -> (PipeTransport, Server) {
        let (to_client, incoming) = mpsc::unbounded_channel();
        let (outgoing, from_client) = mpsc::unbounded_channel();
        (
            PipeTransport { incoming, outgoing },
            Server {
                to_client,
                from_client,
            },
        )
    }

    fn in_progress() -> MatchSnapshot {
        MatchSnapshot {
            id: 5,
            mode: MatchMode::Online,
            status: MatchStatus::InProgress,
            result: None,
            black_player: Some(UserId::from(1)),
            white_player: Some(UserId::from(2)),
            board_state: Board::new(),
            move_history: Vec::new(),
            current_turn: Symbol::Black,
            winning_line: None,
        }
    }

    async fn mounted(caller: u64) -> (LiveMatch, Server) {
        let mut live = LiveMatch::new(5, Some(UserId::from(caller)));
        live.load(&FixtureSource(Ok(in_progress()))).await.unwrap();
        let (transport, server) = pipe();
        live.open_stream(transport, MatchStreamConfig::default()).unwrap();
        assert_eq!(live.next_update().await, Some(MatchUpdate::Connected));
        (live, server)
    }

    #[tokio::test]
    async fn load_resolves_seat() {
        let mut live = LiveMatch::new(5, Some(UserId::from(2)));
        live.load(&FixtureSource(Ok(in_progress()))).await.unwrap();
        assert_eq!(live.session().seat(), Some(Symbol::White));
        assert_eq!(live.session().phase(), Phase::Active);
    }

    #[tokio::test]
    async fn load_failure_records_status_and_blocks_stream() {
        let mut live = LiveMatch::new(9, None);
        let err = live
            .load(&FixtureSource(Err(CaroError::MatchNotFound)))
            .await
            .unwrap_err();
        assert!(matches!(err, CaroError::MatchNotFound(9)));
        assert!(live.session().status_message().unwrap().contains("access"));

        let (transport, _server) = pipe();
        assert!(matches!(
            live.open_stream(transport, MatchStreamConfig::default()),
            Err(CaroError::SnapshotPending)
        ));
    }

    #[tokio::test]
    async fn stream_opens_only_once() {
        let (mut live, _server) = mounted(1).await;
        let (again, _s) = pipe();
        assert!(matches!(
            live.open_stream(again, MatchStreamConfig::default()),
            Err(CaroError::StreamAlreadyOpen)
        ));
        live.unmount().await;
    }

    #[tokio::test]
    async fn play_sends_make_move_and_merges_echo() {
        let (mut live, mut server) = mounted(1).await;

        let LocalMove::Sent(intent) = live.play(Coord::new(7, 7)).unwrap() else {
            panic!("online moves are sent");
        };
        let sent = server.from_client.recv().await.unwrap();
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&sent).unwrap(),
            serde_json::json!({"type": "make_move", "row": 7, "col": 7, "player": "X"})
        );

        server
            .to_client
            .send(r#"{"type":"move","row":7,"col":7,"player":"X","result":{"status":"success"}}"#.into())
            .unwrap();
        let Some(MatchUpdate::Session(SessionUpdate::MoveApplied { confirmed, .. })) =
            live.next_update().await
        else {
            panic!("expected the echo");
        };
        assert_eq!(confirmed, Some(intent.id));
        assert_eq!(live.session().turn(), Symbol::White);
        assert_eq!(live.session().board().stone_count(), 1);
        live.unmount().await;
    }

    #[tokio::test]
    async fn wrong_turn_is_refused_without_sending() {
        let (mut live, mut server) = mounted(2).await;
        let err = live.play(Coord::new(0, 0)).unwrap_err();
        assert!(matches!(err, CaroError::IllegalMove(MoveRejection::NotYourTurn)));
        assert_eq!(live.session().notice(), Some("Not your turn!"));
        assert!(server.from_client.try_recv().is_err());
        live.unmount().await;
    }

    #[tokio::test]
    async fn server_close_sets_status() {
        let (mut live, server) = mounted(1).await;
        drop(server);
        assert_eq!(
            live.next_update().await,
            Some(MatchUpdate::Disconnected { reason: None })
        );
        assert_eq!(
            live.session().status_message(),
            Some("Connection closed by server")
        );
        assert!(live.next_update().await.is_none());
        assert!(!live.is_connected());

        let err = live.play(Coord::new(7, 7)).unwrap_err();
        assert!(matches!(err, CaroError::NotConnected));
        assert!(live.session().board().is_empty_at(Coord::new(7, 7)));
    }

    #[tokio::test]
    async fn unmount_stops_updates() {
        let (mut live, server) = mounted(1).await;
        server
            .to_client
            .send(r#"{"type":"move","row":1,"col":1,"player":"X"}"#.into())
            .unwrap();
        live.unmount().await;
        live.unmount().await;

        assert!(live.is_unmounted());
        assert!(live.next_update().await.is_none());
        assert!(live.session().board().is_empty_at(Coord::new(1, 1)));
        assert!(matches!(live.play(Coord::new(2, 2)), Err(CaroError::NotConnected)));
    }

    #[tokio::test]
    async fn load_after_unmount_fetches_nothing() {
        let mut live = LiveMatch::new(5, Some(UserId::from(1)));
        live.unmount().await;
        let err = live
            .load(&FixtureSource(Ok(in_progress())))
            .await
            .unwrap_err();
        assert!(matches!(err, CaroError::NotConnected));
        assert_eq!(live.session().phase(), Phase::Idle);
        assert_eq!(live.session().seat(), None);
    }
}
