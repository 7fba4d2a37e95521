use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::fmt;

#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// I/O-level failure on an open or active transport session
    Transport,
    /// The server rejected the WebSocket handshake
    Handshake,
    /// The session ended without a close handshake
    Closed,
    /// Error related to invalid input supplied by the caller
    Validation,
    /// Internal error from dependencies
    Internal,
}

#[derive(Debug)]
pub struct Error {
    kind: Kind,
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    backtrace: Backtrace,
}

impl Error {
    pub fn with_source<S: StdError + Send + Sync + 'static>(kind: Kind, source: S) -> Self {
        Self {
            kind,
            source: Some(Box::new(source)),
            backtrace: Backtrace::capture(),
        }
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    pub fn inner(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        let e = self.source.as_deref()?;
        e.downcast_ref::<E>()
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        Validation {
            reason: message.into(),
        }
        .into()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(src) => write!(f, "{:?}: {}", self.kind, src),
            None => write!(f, "{:?}", self.kind),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn StdError + 'static))
    }
}

#[non_exhaustive]
#[derive(Debug)]
pub struct Validation {
    pub reason: String,
}

impl fmt::Display for Validation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid: {}", self.reason)
    }
}

impl StdError for Validation {}

impl From<Validation> for Error {
    fn from(err: Validation) -> Self {
        Error::with_source(Kind::Validation, err)
    }
}

/// Proxy tunnel establishment failure, carrying the proxy's status line.
#[non_exhaustive]
#[derive(Debug)]
pub struct ProxyRefused {
    pub status_line: String,
}

impl fmt::Display for ProxyRefused {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "proxy refused CONNECT tunnel: {}", self.status_line)
    }
}

impl StdError for ProxyRefused {}

impl From<ProxyRefused> for Error {
    fn from(err: ProxyRefused) -> Self {
        Error::with_source(Kind::Handshake, err)
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        use tokio_tungstenite::tungstenite::error::ProtocolError;

        let kind = match &e {
            WsError::ConnectionClosed | WsError::AlreadyClosed => Kind::Closed,
            WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => Kind::Closed,
            WsError::Io(_) | WsError::WriteBufferFull(_) => Kind::Transport,
            WsError::Http(_) | WsError::HttpFormat(_) | WsError::Tls(_) => Kind::Handshake,
            WsError::Url(_) => Kind::Validation,
            _ => Kind::Internal,
        };
        Error::with_source(kind, e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::with_source(Kind::Transport, e)
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Error::with_source(Kind::Validation, e)
    }
}
