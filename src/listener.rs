#![expect(
    clippy::module_name_repetitions,
    reason = "Listener types expose their domain in the name for clarity"
)]

//! Notification sinks for connection lifecycle events.
//!
//! Two independent sinks exist side by side: the four simple callbacks kept
//! for compatibility with callback-style consumers, and the richer
//! [`LifecycleListener`] for consumers that want the full lifecycle. Both are
//! always present; absent ones default to no-ops. Every invocation is
//! notify-then-continue: a panicking sink is caught and logged, and never
//! reaches the connection's own control flow.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::connection::ConnectionState;
use crate::error::Error;

/// A simple single-argument sink. Receives the raw text payload for message
/// events, the close reason for closing events, and `None` for open and
/// failure events.
pub type Callback = Arc<dyn Fn(Option<&str>) + Send + Sync>;

/// The four compatibility callbacks: open, message, closing, failure.
#[derive(Clone)]
pub struct Callbacks {
    on_open: Callback,
    on_message: Callback,
    on_closing: Callback,
    on_failure: Callback,
}

fn noop() -> Callback {
    Arc::new(|_| {})
}

impl Default for Callbacks {
    fn default() -> Self {
        Self {
            on_open: noop(),
            on_message: noop(),
            on_closing: noop(),
            on_failure: noop(),
        }
    }
}

impl Callbacks {
    #[must_use]
    pub fn on_open<F: Fn(Option<&str>) + Send + Sync + 'static>(mut self, f: F) -> Self {
        self.on_open = Arc::new(f);
        self
    }

    #[must_use]
    pub fn on_message<F: Fn(Option<&str>) + Send + Sync + 'static>(mut self, f: F) -> Self {
        self.on_message = Arc::new(f);
        self
    }

    #[must_use]
    pub fn on_closing<F: Fn(Option<&str>) + Send + Sync + 'static>(mut self, f: F) -> Self {
        self.on_closing = Arc::new(f);
        self
    }

    #[must_use]
    pub fn on_failure<F: Fn(Option<&str>) + Send + Sync + 'static>(mut self, f: F) -> Self {
        self.on_failure = Arc::new(f);
        self
    }
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks").finish_non_exhaustive()
    }
}

/// Rich lifecycle listener. Only message receipt is mandatory; every other
/// event defaults to a no-op.
pub trait LifecycleListener: Send + Sync {
    /// A text payload arrived on the stream.
    fn on_message(&self, message: &str);

    /// The connection was established for the first time (no reconnection
    /// attempts preceded this open).
    fn on_connected(&self) {}

    /// The server initiated a close handshake.
    fn on_disconnected(&self, _code: u16, _reason: &str) {}

    /// A transport failure occurred. `response` carries the server's
    /// handshake status when one was received.
    fn on_error(&self, _error: &Error, _response: Option<&str>) {}

    /// A reconnection attempt was scheduled. Attempts count from 1.
    fn on_reconnecting(&self, _attempt: u32) {}

    /// The connection was re-established after `attempt` attempts.
    fn on_reconnected(&self, _attempt: u32) {}

    /// Automatic reconnection was abandoned after exhausting the budget.
    fn on_reconnect_failed(&self, _max_attempts: u32) {}

    /// The connection state changed. Fires once per distinct transition,
    /// never for a state re-entered as the same value.
    fn on_connection_state_changed(&self, _new_state: ConnectionState) {}
}

/// Listener used when the caller supplies none.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl LifecycleListener for NoopListener {
    fn on_message(&self, _message: &str) {}
}

/// Fans one lifecycle event out to both sinks, isolating sink panics.
pub(crate) struct Notifier {
    callbacks: Callbacks,
    listener: Arc<dyn LifecycleListener>,
}

impl Notifier {
    pub(crate) fn new(callbacks: Callbacks, listener: Option<Arc<dyn LifecycleListener>>) -> Self {
        Self {
            callbacks,
            listener: listener.unwrap_or_else(|| Arc::new(NoopListener)),
        }
    }

    fn guard(&self, sink: &'static str, f: impl FnOnce()) {
        if panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
            tracing::warn!(sink, "notification sink panicked; ignoring");
        }
    }

    pub(crate) fn opened(&self, previous_attempts: u32) {
        self.guard("listener", || {
            if previous_attempts > 0 {
                self.listener.on_reconnected(previous_attempts);
            } else {
                self.listener.on_connected();
            }
        });
        self.guard("on_open", || (self.callbacks.on_open)(None));
    }

    pub(crate) fn message(&self, text: &str) {
        self.guard("listener", || self.listener.on_message(text));
        self.guard("on_message", || (self.callbacks.on_message)(Some(text)));
    }

    pub(crate) fn disconnected(&self, code: u16, reason: &str) {
        self.guard("listener", || self.listener.on_disconnected(code, reason));
        self.guard("on_closing", || (self.callbacks.on_closing)(Some(reason)));
    }

    pub(crate) fn failure(&self, error: &Error, response: Option<&str>) {
        self.guard("listener", || self.listener.on_error(error, response));
        self.guard("on_failure", || (self.callbacks.on_failure)(None));
    }

    pub(crate) fn reconnecting(&self, attempt: u32) {
        self.guard("listener", || self.listener.on_reconnecting(attempt));
    }

    pub(crate) fn reconnect_failed(&self, max_attempts: u32) {
        self.guard("listener", || self.listener.on_reconnect_failed(max_attempts));
    }

    pub(crate) fn state_changed(&self, new_state: ConnectionState) {
        self.guard("listener", || {
            self.listener.on_connection_state_changed(new_state);
        });
    }
}
