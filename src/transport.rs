#![expect(
    clippy::module_name_repetitions,
    reason = "Transport types expose their domain in the name for clarity"
)]

//! Transport provisioning.
//!
//! Every connection owns its own transport client: its own dialer
//! configuration and its own session task, so one stream's backlog or
//! failure cannot starve another stream's I/O. The [`TransportProvider`]
//! seam exists so tests can inject failing or counting transports.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, client_async_tls, connect_async};

use crate::Result;
use crate::error::{Error, ProxyRefused};
use crate::target::Target;

/// The concrete stream type produced by a transport.
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens transport sessions for one connection.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Dial `target` and complete the WebSocket handshake.
    async fn open(&self, target: &Target) -> Result<WsStream>;
}

/// Produces one isolated [`Transport`] per connection.
pub trait TransportProvider: Send + Sync {
    fn provide(&self) -> Arc<dyn Transport>;
}

/// Optional forward proxy for outbound sessions, tunneled via HTTP CONNECT.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    host: String,
    port: u16,
    credentials: Option<(String, String)>,
}

impl ProxyConfig {
    #[must_use]
    pub fn new<S: Into<String>>(host: S, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            credentials: None,
        }
    }

    #[must_use]
    pub fn with_basic_auth<U: Into<String>, P: Into<String>>(
        mut self,
        username: U,
        password: P,
    ) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    fn authorization(&self) -> Option<String> {
        let (username, password) = self.credentials.as_ref()?;
        let token = base64::engine::general_purpose::STANDARD
            .encode(format!("{username}:{password}"));
        Some(format!("Basic {token}"))
    }
}

/// Default transport over tokio-tungstenite, optionally via a proxy.
#[derive(Debug, Default)]
pub struct WsTransport {
    proxy: Option<ProxyConfig>,
}

impl WsTransport {
    #[must_use]
    pub fn new(proxy: Option<ProxyConfig>) -> Self {
        Self { proxy }
    }

    async fn open_tunnel(&self, proxy: &ProxyConfig, target: &Target) -> Result<TcpStream> {
        let host = target
            .url()
            .host_str()
            .ok_or_else(|| Error::validation("target has no host"))?
            .to_owned();
        let port = target
            .url()
            .port_or_known_default()
            .ok_or_else(|| Error::validation("target has no port"))?;

        let mut stream = TcpStream::connect((proxy.host.as_str(), proxy.port)).await?;

        let mut request = format!("CONNECT {host}:{port} HTTP/1.1\r\nHost: {host}:{port}\r\n");
        if let Some(authorization) = proxy.authorization() {
            request.push_str(&format!("Proxy-Authorization: {authorization}\r\n"));
        }
        request.push_str("\r\n");
        stream.write_all(request.as_bytes()).await?;

        let status_line = read_connect_status(&mut stream).await?;
        let granted = status_line
            .split_whitespace()
            .nth(1)
            .is_some_and(|code| code == "200");
        if granted {
            Ok(stream)
        } else {
            Err(ProxyRefused { status_line }.into())
        }
    }
}

/// Read the proxy's response headers and return the status line.
async fn read_connect_status(stream: &mut TcpStream) -> Result<String> {
    const MAX_RESPONSE: usize = 8 * 1024;

    let mut response = Vec::new();
    let mut byte = [0_u8; 1];
    while !response.ends_with(b"\r\n\r\n") {
        if response.len() >= MAX_RESPONSE {
            return Err(Error::validation("proxy CONNECT response too large"));
        }
        let read = stream.read(&mut byte).await?;
        if read == 0 {
            return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
        }
        response.push(byte[0]);
    }

    let text = String::from_utf8_lossy(&response);
    Ok(text.lines().next().unwrap_or_default().to_owned())
}

#[async_trait]
impl Transport for WsTransport {
    async fn open(&self, target: &Target) -> Result<WsStream> {
        match &self.proxy {
            None => {
                let (stream, _response) = connect_async(target.url().as_str()).await?;
                Ok(stream)
            }
            Some(proxy) => {
                let tunnel = self.open_tunnel(proxy, target).await?;
                let (stream, _response) =
                    client_async_tls(target.url().as_str(), tunnel).await?;
                Ok(stream)
            }
        }
    }
}

/// Provider handing each connection a fresh [`WsTransport`].
#[derive(Debug, Default)]
pub struct WsTransportProvider {
    proxy: Option<ProxyConfig>,
}

impl WsTransportProvider {
    #[must_use]
    pub fn new(proxy: Option<ProxyConfig>) -> Self {
        Self { proxy }
    }
}

impl TransportProvider for WsTransportProvider {
    fn provide(&self) -> Arc<dyn Transport> {
        Arc::new(WsTransport::new(self.proxy.clone()))
    }
}
