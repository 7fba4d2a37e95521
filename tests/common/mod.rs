#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests"
)]
#![allow(
    unused,
    reason = "Not every helper is used by every test binary"
)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt as _, StreamExt as _};
use streamkeeper::connection::{Connection, ConnectionState};
use streamkeeper::error::Error;
use streamkeeper::listener::LifecycleListener;
use streamkeeper::target::Target;
use streamkeeper::transport::{Transport, TransportProvider, WsStream, WsTransport};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::time::{Instant, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

/// Instructions the test can issue to every connected mock client handler.
#[derive(Debug, Clone)]
pub enum ServerCommand {
    /// Send a close frame with the given code, then end the connection.
    Close { code: u16 },
    /// Sever the TCP stream without a close handshake.
    Sever,
}

/// Mock WebSocket server.
pub struct MockWsServer {
    addr: SocketAddr,
    /// Broadcast messages to ALL connected clients
    message_tx: broadcast::Sender<String>,
    command_tx: broadcast::Sender<ServerCommand>,
    opened: Arc<AtomicUsize>,
}

/// Route crate logs through the test harness, honoring `RUST_LOG`.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        drop(
            tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::from_default_env())
                .with_test_writer()
                .try_init(),
        );
    });
}

impl MockWsServer {
    /// Start a mock WebSocket server on a random port.
    pub async fn start() -> Self {
        init_tracing();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (message_tx, _) = broadcast::channel::<String>(100);
        let (command_tx, _) = broadcast::channel::<ServerCommand>(16);
        let opened = Arc::new(AtomicUsize::new(0));

        let broadcast_tx = message_tx.clone();
        let commands = command_tx.clone();
        let handshakes = Arc::clone(&opened);

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let Ok(ws_stream) = tokio_tungstenite::accept_async(stream).await else {
                    continue;
                };
                handshakes.fetch_add(1, Ordering::SeqCst);

                let (mut write, mut read) = ws_stream.split();
                let mut msg_rx = broadcast_tx.subscribe();
                let mut cmd_rx = commands.subscribe();

                tokio::spawn(async move {
                    loop {
                        tokio::select! {
                            msg = read.next() => {
                                match msg {
                                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                                    Some(Ok(_)) => {}
                                }
                            }
                            msg = msg_rx.recv() => {
                                match msg {
                                    Ok(text) => {
                                        if write.send(Message::Text(text.into())).await.is_err() {
                                            break;
                                        }
                                    }
                                    Err(_) => break,
                                }
                            }
                            cmd = cmd_rx.recv() => {
                                match cmd {
                                    Ok(ServerCommand::Close { code }) => {
                                        let frame = CloseFrame {
                                            code: CloseCode::from(code),
                                            reason: "bye".into(),
                                        };
                                        let _ = write.send(Message::Close(Some(frame))).await;
                                        break;
                                    }
                                    Ok(ServerCommand::Sever) | Err(_) => break,
                                }
                            }
                        }
                    }
                });
            }
        });

        Self {
            addr,
            message_tx,
            command_tx,
            opened,
        }
    }

    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }

    pub fn target(&self) -> Target {
        Target::parse(&self.ws_url("/ws/test")).unwrap()
    }

    /// Send a message to all connected clients.
    pub fn send(&self, message: &str) {
        drop(self.message_tx.send(message.to_owned()));
    }

    /// Close every connected client with the given close code.
    pub fn close_clients(&self, code: u16) {
        drop(self.command_tx.send(ServerCommand::Close { code }));
    }

    /// Drop every connected client without a close handshake.
    pub fn sever_clients(&self) {
        drop(self.command_tx.send(ServerCommand::Sever));
    }

    /// How many WebSocket handshakes the server has completed.
    pub fn handshakes(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

/// One recorded lifecycle notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Connected,
    Message(String),
    Disconnected { code: u16, reason: String },
    Failure,
    Reconnecting(u32),
    Reconnected(u32),
    ReconnectFailed(u32),
    StateChanged(ConnectionState),
}

/// Listener that records every notification with the instant it arrived.
#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<(Event, Instant)>>,
}

impl RecordingListener {
    fn record(&self, event: Event) {
        self.events.lock().unwrap().push((event, Instant::now()));
    }

    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(event, _)| event.clone())
            .collect()
    }

    pub fn stamped(&self) -> Vec<(Event, Instant)> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events().iter().filter(|event| pred(event)).count()
    }

    /// Poll until the recorded events satisfy `pred` or `deadline` passes.
    pub async fn wait_until(&self, deadline: Duration, pred: impl Fn(&[Event]) -> bool) -> bool {
        let give_up = Instant::now() + deadline;
        loop {
            if pred(&self.events()) {
                return true;
            }
            if Instant::now() >= give_up {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl LifecycleListener for RecordingListener {
    fn on_message(&self, message: &str) {
        self.record(Event::Message(message.to_owned()));
    }

    fn on_connected(&self) {
        self.record(Event::Connected);
    }

    fn on_disconnected(&self, code: u16, reason: &str) {
        self.record(Event::Disconnected {
            code,
            reason: reason.to_owned(),
        });
    }

    fn on_error(&self, _error: &Error, _response: Option<&str>) {
        self.record(Event::Failure);
    }

    fn on_reconnecting(&self, attempt: u32) {
        self.record(Event::Reconnecting(attempt));
    }

    fn on_reconnected(&self, attempt: u32) {
        self.record(Event::Reconnected(attempt));
    }

    fn on_reconnect_failed(&self, max_attempts: u32) {
        self.record(Event::ReconnectFailed(max_attempts));
    }

    fn on_connection_state_changed(&self, new_state: ConnectionState) {
        self.record(Event::StateChanged(new_state));
    }
}

/// Block until `connection` reaches `state`.
pub async fn wait_for_state(connection: &Connection, state: ConnectionState, deadline: Duration) {
    let mut rx = connection.state_receiver();
    timeout(deadline, async {
        while *rx.borrow_and_update() != state {
            rx.changed().await.unwrap();
        }
    })
    .await
    .unwrap_or_else(|_| panic!("connection never reached {state:?}"));
}

/// Transport whose every dial fails with a connection reset.
pub struct FailingTransport;

#[async_trait]
impl Transport for FailingTransport {
    async fn open(&self, _target: &Target) -> streamkeeper::Result<WsStream> {
        Err(std::io::Error::from(std::io::ErrorKind::ConnectionReset).into())
    }
}

/// Transport whose dials never complete.
pub struct PendingTransport;

#[async_trait]
impl Transport for PendingTransport {
    async fn open(&self, _target: &Target) -> streamkeeper::Result<WsStream> {
        futures_util::future::pending().await
    }
}

/// Real transport that fails the next `failures` dials before delegating.
pub struct FlakyTransport {
    inner: WsTransport,
    failures: Arc<AtomicUsize>,
}

impl FlakyTransport {
    pub fn new(failures: Arc<AtomicUsize>) -> Self {
        Self {
            inner: WsTransport::default(),
            failures,
        }
    }
}

#[async_trait]
impl Transport for FlakyTransport {
    async fn open(&self, target: &Target) -> streamkeeper::Result<WsStream> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(std::io::Error::from(std::io::ErrorKind::ConnectionRefused).into());
        }
        self.inner.open(target).await
    }
}

/// Transport that refuses every dial and reports its own release on drop.
pub struct CountingTransport {
    released: Arc<AtomicUsize>,
}

#[async_trait]
impl Transport for CountingTransport {
    async fn open(&self, _target: &Target) -> streamkeeper::Result<WsStream> {
        Err(std::io::Error::from(std::io::ErrorKind::ConnectionRefused).into())
    }
}

impl Drop for CountingTransport {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Provider that counts how many transports it created and how many were
/// released again.
#[derive(Default)]
pub struct CountingProvider {
    pub created: Arc<AtomicUsize>,
    pub released: Arc<AtomicUsize>,
}

impl TransportProvider for CountingProvider {
    fn provide(&self) -> Arc<dyn Transport> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Arc::new(CountingTransport {
            released: Arc::clone(&self.released),
        })
    }
}

/// Provider that hands every connection a never-completing transport.
pub struct PendingProvider;

impl TransportProvider for PendingProvider {
    fn provide(&self) -> Arc<dyn Transport> {
        Arc::new(PendingTransport)
    }
}
