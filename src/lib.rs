#![cfg_attr(doc, doc = include_str!("../README.md"))]

pub mod config;
pub mod connection;
pub mod error;
pub mod listener;
pub mod policy;
pub mod registry;
pub mod streams;
pub mod target;
pub mod transport;

pub use crate::config::{Config, ReconnectConfig};
pub use crate::connection::{Connection, ConnectionId, ConnectionState};
pub use crate::error::Error;
pub use crate::listener::{Callback, Callbacks, LifecycleListener, NoopListener};
pub use crate::registry::Registry;
pub use crate::target::Target;
pub use crate::transport::{
    ProxyConfig, Transport, TransportProvider, WsStream, WsTransport, WsTransportProvider,
};

pub type Result<T> = std::result::Result<T, Error>;
