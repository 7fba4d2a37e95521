#![expect(
    clippy::module_name_repetitions,
    reason = "Connection types expose their domain in the name for clarity"
)]

//! Per-connection lifecycle management.
//!
//! Each [`Connection`] is driven by a single control task that owns all
//! mutable lifecycle state. Transport sessions run in their own tasks and
//! report back over an event channel; every event carries the epoch of the
//! session that produced it, so events from a session that has already been
//! replaced are dropped instead of corrupting the current one.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use futures::{SinkExt as _, StreamExt as _};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior, interval, sleep, sleep_until, timeout};
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use crate::config::Config;
use crate::error::Error;
use crate::listener::{Callbacks, LifecycleListener, Notifier};
use crate::policy;
use crate::target::Target;
use crate::transport::Transport;

/// Process-wide monotone connection identifier. Never reused, even after a
/// connection is closed.
pub type ConnectionId = u64;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// WebSocket close code signalling a deliberate, clean shutdown.
const NORMAL_CLOSURE: u16 = 1000;

/// Connection state tracking.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected, and no recovery in progress
    Disconnected,
    /// A session open is in flight
    Connecting,
    /// An open session is live
    Connected,
    /// A reconnection attempt is scheduled or in flight
    Reconnecting,
    /// Terminal failure; only an explicit reconnect leaves this state
    Failed,
}

impl ConnectionState {
    /// Check if the connection is currently active.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// Caller-issued lifecycle commands.
#[derive(Debug)]
enum Command {
    Connect,
    Reconnect,
    Shutdown,
}

/// What a session task reports back to its control task.
#[derive(Debug)]
enum SessionEvent {
    Opened,
    Message(String),
    Closed { code: u16, reason: String },
    Error(Error),
}

#[derive(Debug)]
struct EpochEvent {
    epoch: u64,
    event: SessionEvent,
}

/// Control-side handle to a spawned session task.
struct SessionHandle {
    epoch: u64,
    close_tx: mpsc::UnboundedSender<u16>,
}

impl SessionHandle {
    fn close(&self, code: u16) {
        // The session may already be gone; a send error means exactly that.
        _ = self.close_tx.send(code);
    }
}

/// A scheduled reconnection attempt.
struct RetryTimer {
    deadline: Instant,
    attempt: u32,
}

/// Handle to a managed WebSocket connection.
///
/// Cloning the handle does not clone the connection; all clones drive the
/// same control task. Dropping the last handle shuts the connection down.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    target: Target,
    cmd_tx: mpsc::UnboundedSender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
    attempts: Arc<AtomicU32>,
}

impl Connection {
    /// Create a connection and start its control task.
    ///
    /// The connection starts out [`ConnectionState::Disconnected`]; call
    /// [`connect`](Self::connect) to open the first session.
    #[must_use]
    pub fn new(
        target: Target,
        config: Config,
        transport: Arc<dyn Transport>,
        callbacks: Callbacks,
        listener: Option<Arc<dyn LifecycleListener>>,
    ) -> Self {
        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let attempts = Arc::new(AtomicU32::new(0));

        let task = ControlTask {
            id,
            target: target.clone(),
            config,
            transport,
            notifier: Notifier::new(callbacks, listener),
            state_tx,
            attempts: Arc::clone(&attempts),
            events_tx,
            session: None,
            next_epoch: 0,
            retry: None,
            last_message: Instant::now(),
        };
        tokio::spawn(task.run(cmd_rx, events_rx));

        Self {
            id,
            target,
            cmd_tx,
            state_rx,
            attempts,
        }
    }

    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    #[must_use]
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Subscribe to state changes.
    ///
    /// Useful for awaiting a specific transition without polling.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Reconnection attempts made since the last successful open.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Open the first session. Ignored if a session is already open or
    /// opening.
    pub fn connect(&self) {
        _ = self.cmd_tx.send(Command::Connect);
    }

    /// Force a reconnect, replacing any live session. Resets the attempt
    /// counter, so the full reconnection budget is available again; this is
    /// also the way out of [`ConnectionState::Failed`].
    pub fn reconnect(&self) {
        _ = self.cmd_tx.send(Command::Reconnect);
    }

    /// Shut the connection down with a normal closure and cancel any pending
    /// reconnection attempt.
    pub fn close(&self) {
        _ = self.cmd_tx.send(Command::Shutdown);
    }
}

/// Owns all mutable lifecycle state; runs until shutdown.
struct ControlTask {
    id: ConnectionId,
    target: Target,
    config: Config,
    transport: Arc<dyn Transport>,
    notifier: Notifier,
    state_tx: watch::Sender<ConnectionState>,
    attempts: Arc<AtomicU32>,
    events_tx: mpsc::UnboundedSender<EpochEvent>,
    session: Option<SessionHandle>,
    next_epoch: u64,
    retry: Option<RetryTimer>,
    last_message: Instant,
}

impl ControlTask {
    async fn run(
        mut self,
        mut cmd_rx: mpsc::UnboundedReceiver<Command>,
        mut events_rx: mpsc::UnboundedReceiver<EpochEvent>,
    ) {
        let mut heartbeat = interval(self.config.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let retry_deadline = self.retry.as_ref().map(|r| r.deadline);
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(Command::Connect) => self.handle_connect(),
                        Some(Command::Reconnect) => self.handle_manual_reconnect(),
                        // All handles dropped: same as an explicit shutdown.
                        Some(Command::Shutdown) | None => {
                            self.shutdown();
                            break;
                        }
                    }
                }
                Some(event) = events_rx.recv() => self.handle_event(event),
                () = maybe_sleep(retry_deadline), if retry_deadline.is_some() => {
                    self.fire_retry().await;
                }
                _ = heartbeat.tick() => self.check_liveness(),
            }
        }
    }

    fn handle_connect(&mut self) {
        if self.session.is_some() {
            tracing::debug!(connection = self.id, "connect ignored, session already open");
            return;
        }
        self.retry = None;
        self.set_state(ConnectionState::Connecting);
        self.open_session();
    }

    fn handle_manual_reconnect(&mut self) {
        self.attempts.store(0, Ordering::SeqCst);
        if let Some(session) = self.session.take() {
            session.close(NORMAL_CLOSURE);
        }
        self.begin_reconnect();
    }

    fn shutdown(&mut self) {
        self.retry = None;
        if let Some(session) = self.session.take() {
            session.close(NORMAL_CLOSURE);
        }
        self.set_state(ConnectionState::Disconnected);
        tracing::debug!(connection = self.id, "connection shut down");
    }

    fn handle_event(&mut self, event: EpochEvent) {
        if self.session.as_ref().map(|s| s.epoch) != Some(event.epoch) {
            tracing::trace!(
                connection = self.id,
                epoch = event.epoch,
                "dropping event from replaced session"
            );
            return;
        }

        match event.event {
            SessionEvent::Opened => {
                self.retry = None;
                self.last_message = Instant::now();
                self.set_state(ConnectionState::Connected);
                let previous_attempts = self.attempts.swap(0, Ordering::SeqCst);
                tracing::info!(
                    connection = self.id,
                    stream = %self.target.stream_label(),
                    previous_attempts,
                    "session open"
                );
                self.notifier.opened(previous_attempts);
            }
            SessionEvent::Message(text) => {
                self.last_message = Instant::now();
                self.notifier.message(&text);
            }
            SessionEvent::Closed { code, reason } => {
                self.session = None;
                tracing::info!(connection = self.id, code, %reason, "server closed session");
                self.notifier.disconnected(code, &reason);
                if code == NORMAL_CLOSURE {
                    self.set_state(ConnectionState::Disconnected);
                } else {
                    self.begin_reconnect();
                }
            }
            SessionEvent::Error(error) => {
                self.session = None;
                let response = handshake_response(&error);
                tracing::warn!(connection = self.id, %error, "session failed");
                self.notifier.failure(&error, response.as_deref());

                let attempts = self.attempts.load(Ordering::SeqCst);
                if self.config.reconnect.should_retry(&error, attempts) {
                    self.begin_reconnect();
                } else {
                    self.retry = None;
                    self.set_state(ConnectionState::Failed);
                    if policy::retryable(&error) {
                        // Budget exhausted rather than a terminal error class.
                        self.notifier
                            .reconnect_failed(self.config.reconnect.max_attempts);
                    }
                }
            }
        }
    }

    /// Count one more attempt and either schedule it or give up.
    fn begin_reconnect(&mut self) {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let max_attempts = self.config.reconnect.max_attempts;
        if attempt > max_attempts {
            self.retry = None;
            tracing::warn!(
                connection = self.id,
                max_attempts,
                "reconnection budget exhausted, giving up"
            );
            self.set_state(ConnectionState::Failed);
            self.notifier.reconnect_failed(max_attempts);
            return;
        }

        let delay = self.config.reconnect.delay_for(attempt);
        tracing::info!(connection = self.id, attempt, ?delay, "scheduling reconnect");
        self.set_state(ConnectionState::Reconnecting);
        self.notifier.reconnecting(attempt);
        self.retry = Some(RetryTimer {
            deadline: Instant::now() + delay,
            attempt,
        });
    }

    async fn fire_retry(&mut self) {
        let Some(retry) = self.retry.take() else {
            return;
        };
        // A close issued while the timer was pending cancels the attempt.
        if *self.state_tx.borrow() != ConnectionState::Reconnecting {
            tracing::debug!(
                connection = self.id,
                attempt = retry.attempt,
                "reconnect cancelled"
            );
            return;
        }
        if let Some(session) = self.session.take() {
            session.close(NORMAL_CLOSURE);
        }
        if !self.config.teardown_pause.is_zero() {
            sleep(self.config.teardown_pause).await;
        }
        self.set_state(ConnectionState::Connecting);
        self.open_session();
    }

    fn check_liveness(&mut self) {
        if *self.state_tx.borrow() != ConnectionState::Connected {
            return;
        }
        let silence = self.last_message.elapsed();
        if silence > self.config.liveness_timeout {
            tracing::warn!(
                connection = self.id,
                ?silence,
                "no traffic within liveness window, replacing session"
            );
            if let Some(session) = self.session.take() {
                session.close(NORMAL_CLOSURE);
            }
            self.begin_reconnect();
        }
    }

    fn open_session(&mut self) {
        self.next_epoch += 1;
        let handle = spawn_session(
            Arc::clone(&self.transport),
            self.target.clone(),
            self.config.connect_timeout,
            self.next_epoch,
            self.events_tx.clone(),
        );
        self.session = Some(handle);
    }

    fn set_state(&self, new_state: ConnectionState) {
        let previous = self.state_tx.send_replace(new_state);
        if previous != new_state {
            tracing::debug!(connection = self.id, ?previous, ?new_state, "state change");
            self.notifier.state_changed(new_state);
        }
    }
}

/// Dial and run one session; every outcome is reported as an epoch-tagged
/// event. The task ends silently on a commanded close, including one issued
/// while the dial is still in flight.
fn spawn_session(
    transport: Arc<dyn Transport>,
    target: Target,
    connect_timeout: Duration,
    epoch: u64,
    events_tx: mpsc::UnboundedSender<EpochEvent>,
) -> SessionHandle {
    let (close_tx, mut close_rx) = mpsc::unbounded_channel::<u16>();

    tokio::spawn(async move {
        let emit = |event: SessionEvent| {
            _ = events_tx.send(EpochEvent { epoch, event });
        };

        let stream = tokio::select! {
            _ = close_rx.recv() => return,
            dialed = timeout(connect_timeout, transport.open(&target)) => match dialed {
                Ok(Ok(stream)) => stream,
                Ok(Err(error)) => {
                    emit(SessionEvent::Error(error));
                    return;
                }
                // A black-holed endpoint must feed the retry path.
                Err(_elapsed) => {
                    let error = std::io::Error::from(std::io::ErrorKind::TimedOut);
                    emit(SessionEvent::Error(error.into()));
                    return;
                }
            }
        };
        emit(SessionEvent::Opened);

        let (mut write, mut read) = stream.split();
        loop {
            tokio::select! {
                code = close_rx.recv() => {
                    let frame = CloseFrame {
                        code: CloseCode::from(code.unwrap_or(NORMAL_CLOSURE)),
                        reason: "".into(),
                    };
                    _ = write.send(Message::Close(Some(frame))).await;
                    return;
                }
                frame = read.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            emit(SessionEvent::Message(text.to_string()));
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            _ = write.send(Message::Pong(payload)).await;
                        }
                        Some(Ok(Message::Close(close))) => {
                            let (code, reason) = close.map_or(
                                (NORMAL_CLOSURE, String::new()),
                                |f| (u16::from(f.code), f.reason.to_string()),
                            );
                            // Completes the close handshake from our side.
                            _ = write.close().await;
                            emit(SessionEvent::Closed { code, reason });
                            return;
                        }
                        Some(Ok(_)) => {
                            // Binary frames and unsolicited PONGs are ignored.
                        }
                        Some(Err(e)) => {
                            emit(SessionEvent::Error(e.into()));
                            return;
                        }
                        None => {
                            emit(SessionEvent::Error(WsError::ConnectionClosed.into()));
                            return;
                        }
                    }
                }
            }
        }
    });

    SessionHandle { epoch, close_tx }
}

/// The server's handshake status when the failure carries one.
fn handshake_response(error: &Error) -> Option<String> {
    match error.downcast_ref::<WsError>()? {
        WsError::Http(response) => Some(response.status().to_string()),
        _ => None,
    }
}

async fn maybe_sleep(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
