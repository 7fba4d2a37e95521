//! Registry of live connections.
//!
//! The registry hands out one [`Connection`] per subscription, each with its
//! own transport client from the configured [`TransportProvider`], and keeps
//! them addressable by id for closing, inspection, and forced reconnects.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;

use crate::config::Config;
use crate::connection::{Connection, ConnectionId, ConnectionState};
use crate::listener::{Callbacks, LifecycleListener};
use crate::target::Target;
use crate::transport::{ProxyConfig, TransportProvider, WsTransportProvider};

pub struct Registry {
    connections: DashMap<ConnectionId, Connection>,
    provider: Arc<dyn TransportProvider>,
    config: Config,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl Registry {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self::with_provider(config, Arc::new(WsTransportProvider::default()))
    }

    /// Route every connection's sessions through a forward proxy.
    #[must_use]
    pub fn with_proxy(config: Config, proxy: ProxyConfig) -> Self {
        Self::with_provider(config, Arc::new(WsTransportProvider::new(Some(proxy))))
    }

    /// Use a custom transport provider. Each subscription still gets its own
    /// transport instance from `provider`.
    #[must_use]
    pub fn with_provider(config: Config, provider: Arc<dyn TransportProvider>) -> Self {
        Self {
            connections: DashMap::new(),
            provider,
            config,
        }
    }

    /// Open a connection to `target` and start delivering its events to the
    /// given sinks. Returns the connection's id.
    pub fn subscribe(
        &self,
        target: Target,
        callbacks: Callbacks,
        listener: Option<Arc<dyn LifecycleListener>>,
    ) -> ConnectionId {
        let transport = self.provider.provide();
        let connection = Connection::new(
            target,
            self.config.clone(),
            transport,
            callbacks,
            listener,
        );
        let id = connection.id();
        connection.connect();
        tracing::info!(connection = id, stream = %connection.target().stream_label(), "subscribed");
        self.connections.insert(id, connection);
        id
    }

    /// Close one connection and drop it from the registry. Closing an id
    /// that is absent or already closed is a no-op.
    pub fn close(&self, id: ConnectionId) {
        match self.connections.remove(&id) {
            Some((_, connection)) => connection.close(),
            None => tracing::debug!(connection = id, "close ignored, no such connection"),
        }
    }

    /// Close every connection in the registry. Safe to call repeatedly.
    pub fn close_all(&self) {
        let ids: Vec<ConnectionId> = self.connections.iter().map(|entry| *entry.key()).collect();
        tracing::info!(count = ids.len(), "closing all connections");
        for id in ids {
            if let Some((_, connection)) = self.connections.remove(&id) {
                connection.close();
            }
        }
    }

    /// Snapshot of the lifecycle state of every registered connection.
    #[must_use]
    pub fn states(&self) -> HashMap<ConnectionId, ConnectionState> {
        self.connections
            .iter()
            .map(|entry| (*entry.key(), entry.value().state()))
            .collect()
    }

    /// Handle to one connection, for state or attempt introspection.
    #[must_use]
    pub fn connection(&self, id: ConnectionId) -> Option<Connection> {
        self.connections.get(&id).map(|entry| entry.value().clone())
    }

    /// Number of connections currently registered.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.connections.len()
    }

    /// Force the connection to drop its session and reconnect. Returns
    /// whether the id was known.
    pub fn trigger_reconnect(&self, id: ConnectionId) -> bool {
        match self.connections.get(&id) {
            Some(connection) => {
                connection.reconnect();
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("connections", &self.connections.len())
            .finish_non_exhaustive()
    }
}
