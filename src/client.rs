//! Game stream lifecycle.
//!
//! [`MatchStream`] is a thin handle over a background stream loop task that
//! owns the [`Transport`]. Outgoing moves travel to the loop over an unbounded
//! MPSC channel; decoded server messages come back as [`StreamEvent`]s on a
//! bounded channel returned from [`MatchStream::start`].
//!
//! One `MatchStream` is one connection. It is never reopened: once the loop
//! exits (server close, transport error, or [`MatchStream::shutdown`]) the
//! handle stays disconnected and a fresh match view must build a new one.
//!
//! # Example
//!
//! ```rust,ignore
//! let transport = WebSocketTransport::connect(&config.stream_url(42, token)).await?;
//! let (mut stream, mut events) = MatchStream::start(transport, MatchStreamConfig::default());
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         StreamEvent::MoveApplied(mv) => { /* … */ }
//!         StreamEvent::Disconnected { .. } => break,
//!         _ => {}
//!     }
//! }
//! stream.shutdown().await;
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::error::{CaroError, Result};
use crate::event::StreamEvent;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::session::MoveIntent;
use crate::transport::Transport;

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

// ── Configuration ───────────────────────────────────────────────────

/// Tuning for a [`MatchStream`].
///
/// # Example
///
/// ```
/// use caro_client::client::MatchStreamConfig;
/// use std::time::Duration;
///
/// let config = MatchStreamConfig::default()
///     .with_event_channel_capacity(64)
///     .with_shutdown_timeout(Duration::from_millis(250));
/// assert_eq!(config.event_channel_capacity, 64);
/// ```
#[derive(Debug, Clone)]
pub struct MatchStreamConfig {
    /// Capacity of the bounded event channel.
    ///
    /// When the channel is full the stream loop waits for the consumer before
    /// reading the next server message, so no event is ever lost.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// How long [`MatchStream::shutdown`] waits for a graceful close before
    /// aborting the loop. Defaults to **1 second**.
    pub shutdown_timeout: Duration,
}

impl Default for MatchStreamConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl MatchStreamConfig {
    /// Set the capacity of the bounded event channel (clamped to at least 1).
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// Set the timeout for the graceful shutdown.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

// ── Stream handle ───────────────────────────────────────────────────

/// Handle to one open game stream.
pub struct MatchStream {
    /// Sender half of the command channel to the stream loop.
    cmd_tx: mpsc::UnboundedSender<ClientMessage>,
    /// Cleared by the loop when it exits.
    connected: Arc<AtomicBool>,
    /// Handle to the background stream loop task.
    task: Option<tokio::task::JoinHandle<()>>,
    /// Oneshot sender to signal the loop to shut down gracefully.
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    shutdown_timeout: Duration,
}

impl MatchStream {
    /// Spawn the stream loop over a connected transport.
    ///
    /// Returns the handle together with the event receiver. The receiver
    /// yields [`StreamEvent`]s until the loop exits.
    #[must_use = "the event receiver must be used to receive events"]
    pub fn start(
        transport: impl Transport,
        config: MatchStreamConfig,
    ) -> (Self, mpsc::Receiver<StreamEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<ClientMessage>();
        // tokio panics on a zero-capacity channel.
        let capacity = config.event_channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel::<StreamEvent>(capacity);
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let connected = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(stream_loop(
            transport,
            cmd_rx,
            event_tx,
            Arc::clone(&connected),
            shutdown_rx,
        ));

        let stream = Self {
            cmd_tx,
            connected,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout: config.shutdown_timeout,
        };
        (stream, event_rx)
    }

    /// Queue a `make_move` message for `intent`.
    ///
    /// # Errors
    ///
    /// Returns [`CaroError::NotConnected`] once the stream has closed.
    pub fn send_move(&self, intent: &MoveIntent) -> Result<()> {
        self.send(intent.to_message())
    }

    /// Close the stream and stop the background task.
    ///
    /// Safe to call more than once; only the first call does any work.
    pub async fn shutdown(&mut self) {
        debug!("MatchStream: shutdown requested");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("stream loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("stream loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("stream loop aborted: {join_err}");
                    }
                }
            }
        }

        self.connected.store(false, Ordering::Release);
    }

    /// Returns `true` while the stream loop is running.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn send(&self, msg: ClientMessage) -> Result<()> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(CaroError::NotConnected);
        }
        self.cmd_tx
            .send(msg)
            .map_err(|_| CaroError::NotConnected)
    }
}

impl std::fmt::Debug for MatchStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchStream")
            .field("connected", &self.is_connected())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for MatchStream {
    fn drop(&mut self) {
        // No executor is available to await a graceful close here, so the
        // only safe action is to abort the loop.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Stream loop ─────────────────────────────────────────────────────

/// Multiplexes outgoing commands, the shutdown signal and incoming messages.
///
/// Exits when the command channel closes, shutdown is signalled, the server
/// closes the connection, or the transport fails.
async fn stream_loop(
    mut transport: impl Transport,
    mut cmd_rx: mpsc::UnboundedReceiver<ClientMessage>,
    event_tx: mpsc::Sender<StreamEvent>,
    connected: Arc<AtomicBool>,
    mut shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) {
    debug!("stream loop started");
    if event_tx.send(StreamEvent::Connected).await.is_err() {
        debug!("event channel closed, receiver dropped");
    }

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(msg) => {
                        match serde_json::to_string(&msg) {
                            Ok(json) => {
                                debug!(%json, "sending client message");
                                if let Err(e) = transport.send(json).await {
                                    error!("transport send error: {e}");
                                    emit_disconnected(
                                        &event_tx,
                                        &connected,
                                        Some(format!("transport send error: {e}")),
                                    ).await;
                                    break;
                                }
                            }
                            Err(e) => {
                                error!("failed to serialize ClientMessage: {e}");
                            }
                        }
                    }
                    None => {
                        debug!("command channel closed, shutting down stream loop");
                        let _ = transport.close().await;
                        emit_disconnected(&event_tx, &connected, Some("client shut down".into())).await;
                        break;
                    }
                }
            }

            _ = &mut shutdown_rx => {
                debug!("shutdown signal received");
                let _ = transport.close().await;
                emit_disconnected(&event_tx, &connected, Some("client shut down".into())).await;
                break;
            }

            incoming = transport.recv() => {
                match incoming {
                    Some(Ok(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                        Ok(msg) => match StreamEvent::from_server(msg) {
                            // Board events must all reach the session, so wait
                            // for capacity while still honouring shutdown.
                            Some(event) => tokio::select! {
                                sent = event_tx.send(event) => {
                                    if sent.is_err() {
                                        debug!("event channel closed, receiver dropped");
                                    }
                                }
                                _ = &mut shutdown_rx => {
                                    debug!("shutdown signal received while delivering event");
                                    let _ = transport.close().await;
                                    emit_disconnected(&event_tx, &connected, Some("client shut down".into())).await;
                                    break;
                                }
                            },
                            None => warn!("game_state without data, dropping"),
                        },
                        Err(e) => {
                            warn!("failed to deserialize server message: {e} (raw: {text})");
                        }
                    },
                    Some(Err(e)) => {
                        error!("transport receive error: {e}");
                        emit_disconnected(
                            &event_tx,
                            &connected,
                            Some(format!("transport receive error: {e}")),
                        ).await;
                        break;
                    }
                    None => {
                        debug!("stream closed by server");
                        emit_disconnected(&event_tx, &connected, None).await;
                        break;
                    }
                }
            }
        }
    }

    debug!("stream loop exited");
}

/// Emit the final [`StreamEvent::Disconnected`] and mark the stream closed.
///
/// This event is always last and the consumer relies on it.
async fn emit_disconnected(
    event_tx: &mpsc::Sender<StreamEvent>,
    connected: &AtomicBool,
    reason: Option<String>,
) {
    connected.store(false, Ordering::Release);
    if event_tx
        .send(StreamEvent::Disconnected { reason })
        .await
        .is_err()
    {
        debug!("event channel closed, receiver dropped");
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
    use crate::board::{Coord, Symbol};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    struct MockTransport {
        incoming: VecDeque<Option<std::result::Result<String, CaroError>>>,
        sent: Arc<StdMutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
    }

    impl MockTransport {
        fn new(
            incoming: Vec<Option<std::result::Result<String, CaroError>>>,
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
        async fn send(&mut self, message: String) -> std::result::Result<(), CaroError> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn recv(&mut self) -> Option<std::result::Result<String, CaroError>> {
            match self.incoming.pop_front() {
                Some(item) => item,
                // Hang so the loop stays alive until shutdown.
                None => std::future::pending().await,
            }
        }

        async fn close(&mut self) -> std::result::Result<(), CaroError> {
            self.closed.store(true, Ordering::Relaxed);
            Ok(())
        }
    }

    fn move_json(row: usize, col: usize, player: &str) -> String {
        format!(r#"{{"type":"move","row":{row},"col":{col},"player":"{player}","result":{{"status":"success"}}}}"#)
    }

    #[tokio::test]
    async fn first_event_is_connected() {
        let (transport, _sent, _closed) = MockTransport::new(vec![]);
        let (mut stream, mut events) = MatchStream::start(transport, MatchStreamConfig::default());
        assert!(matches!(events.recv().await.unwrap(), StreamEvent::Connected));
        assert!(stream.is_connected());
        stream.shutdown().await;
    }

    #[tokio::test]
    async fn malformed_messages_are_dropped() {
        let (transport, _sent, _closed) = MockTransport::new(vec![
            Some(Ok("not json".into())),
            Some(Ok(r#"{"type":"chat","text":"hi"}"#.into())),
            Some(Ok(r#"{"type":"game_state","data":null}"#.into())),
            Some(Ok(move_json(3, 4, "X"))),
        ]);
        let (mut stream, mut events) = MatchStream::start(transport, MatchStreamConfig::default());
        let _ = events.recv().await; // Connected
        let StreamEvent::MoveApplied(mv) = events.recv().await.unwrap() else {
            panic!("expected the only valid message to come through");
        };
        assert_eq!(mv.coord(), Coord::new(3, 4));
        stream.shutdown().await;
    }

    #[tokio::test]
    async fn send_move_writes_make_move() {
        let (transport, sent, _closed) = MockTransport::new(vec![]);
        let (mut stream, mut events) = MatchStream::start(transport, MatchStreamConfig::default());
        let _ = events.recv().await;

        let mut session = crate::session::MatchSession::online();
        session.begin_snapshot();
        session.load_snapshot(
            serde_json::from_str(r#"{"id":1,"status":"in_progress","board_state":[]}"#).unwrap(),
            Some(Symbol::Black),
        );
        let crate::session::LocalMove::Sent(intent) =
            session.try_local_move(Coord::new(7, 7)).unwrap()
        else {
            panic!("expected an intent");
        };
        stream.send_move(&intent).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        {
            let messages = sent.lock().unwrap();
            let msg: ClientMessage = serde_json::from_str(&messages[0]).unwrap();
            assert_eq!(
                msg,
                ClientMessage::MakeMove {
                    row: 7,
                    col: 7,
                    player: Symbol::Black
                }
            );
        }
        stream.shutdown().await;
    }

    #[tokio::test]
    async fn server_close_emits_disconnected_without_reason() {
        let (transport, _sent, _closed) = MockTransport::new(vec![None]);
        let (mut stream, mut events) = MatchStream::start(transport, MatchStreamConfig::default());
        let _ = events.recv().await;
        let event = events.recv().await.unwrap();
        assert!(matches!(event, StreamEvent::Disconnected { reason: None }));
        assert!(!stream.is_connected());
        stream.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_closes_transport_and_blocks_sends() {
        let (transport, _sent, closed) = MockTransport::new(vec![]);
        let (mut stream, mut events) = MatchStream::start(transport, MatchStreamConfig::default());
        let _ = events.recv().await;

        stream.shutdown().await;
        assert!(closed.load(Ordering::Relaxed));
        let event = events.recv().await.unwrap();
        assert!(matches!(event, StreamEvent::Disconnected { reason: Some(_) }));
        assert!(events.recv().await.is_none());

        let intent = MoveIntent {
            id: uuid::Uuid::nil(),
            coord: Coord::new(0, 0),
            symbol: Symbol::White,
        };
        assert!(matches!(
            stream.send_move(&intent),
            Err(CaroError::NotConnected)
        ));
        // Second shutdown is a no-op.
        stream.shutdown().await;
    }

    #[tokio::test]
    async fn receive_error_reports_reason() {
        let (transport, _sent, _closed) = MockTransport::new(vec![Some(Err(
            CaroError::TransportReceive("reset by peer".into()),
        ))]);
        let (mut stream, mut events) = MatchStream::start(transport, MatchStreamConfig::default());
        let _ = events.recv().await;
        let StreamEvent::Disconnected { reason: Some(reason) } = events.recv().await.unwrap()
        else {
            panic!("expected Disconnected with a reason");
        };
        assert!(reason.contains("reset by peer"));
        stream.shutdown().await;
    }

    #[tokio::test]
    async fn full_channel_holds_moves_until_consumed() {
        let incoming = (0..4)
            .map(|col| Some(Ok(move_json(2, col, if col % 2 == 0 { "X" } else { "O" }))))
            .collect();
        let (transport, _sent, _closed) = MockTransport::new(incoming);
        let config = MatchStreamConfig::default().with_event_channel_capacity(1);
        let (mut stream, mut events) = MatchStream::start(transport, config);

        // Let the loop run into the full channel before anything is read.
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(matches!(events.recv().await.unwrap(), StreamEvent::Connected));
        for col in 0..4 {
            let StreamEvent::MoveApplied(mv) = events.recv().await.unwrap() else {
                panic!("expected move {col}");
            };
            assert_eq!(mv.coord(), Coord::new(2, col));
        }
        stream.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_is_honoured_while_channel_is_full() {
        let incoming = (0..3).map(|col| Some(Ok(move_json(0, col, "X")))).collect();
        let (transport, _sent, closed) = MockTransport::new(incoming);
        let config = MatchStreamConfig::default()
            .with_event_channel_capacity(1)
            .with_shutdown_timeout(Duration::from_secs(5));
        let (mut stream, mut events) = MatchStream::start(transport, config);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let reader = tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Some(event) = events.recv().await {
                seen.push(event);
            }
            seen
        });
        stream.shutdown().await;
        assert!(closed.load(Ordering::Relaxed));
        let seen = reader.await.unwrap();
        assert!(matches!(seen.last(), Some(StreamEvent::Disconnected { .. })));
    }

    #[test]
    fn config_defaults_and_clamping() {
        let config = MatchStreamConfig::default();
        assert_eq!(config.event_channel_capacity, 256);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
        assert_eq!(
            MatchStreamConfig::default()
                .with_event_channel_capacity(0)
                .event_channel_capacity,
            1
        );
    }
}
