use std::fmt;

use url::Url;

use crate::error::Error;
use crate::{Result, streams};

/// Opaque, validated endpoint descriptor for one logical stream.
///
/// A `Target` is produced once by URL-building code and consumed unchanged
/// by the connection for the whole of its life, including reconnects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    url: Url,
}

impl Target {
    /// Parse and validate a WebSocket endpoint.
    pub fn parse(endpoint: &str) -> Result<Self> {
        let url = Url::parse(endpoint)?;
        match url.scheme() {
            "ws" | "wss" => Ok(Self { url }),
            other => Err(Error::validation(format!(
                "endpoint scheme must be ws or wss, got {other}"
            ))),
        }
    }

    /// Build a target for a single named stream under `base_url`,
    /// e.g. `wss://fstream.example.com` + `btcusdt@aggTrade`.
    pub fn stream(base_url: &str, stream_name: &str) -> Result<Self> {
        Self::parse(&format!("{base_url}/ws/{stream_name}"))
    }

    /// Build a target multiplexing several named streams over one socket.
    pub fn combined_streams(base_url: &str, stream_names: &[String]) -> Result<Self> {
        if stream_names.is_empty() {
            return Err(Error::validation("combined stream list must not be empty"));
        }
        let joined = streams::combined(stream_names);
        Self::parse(&format!("{base_url}/stream?streams={joined}"))
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Host and path, used to label a connection in logs.
    #[must_use]
    pub fn stream_label(&self) -> String {
        let host = self.url.host_str().unwrap_or_default();
        format!("{host}{}", self.url.path())
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}
