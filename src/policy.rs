//! Reconnect policy: the retry/no-retry decision and the delay schedule.

use std::io;
use std::time::Duration;

use tokio_tungstenite::tungstenite::Error as WsError;

use crate::config::ReconnectConfig;
use crate::error::{Error, Kind};

impl ReconnectConfig {
    /// Delay before reconnection attempt `attempt` (1-based).
    ///
    /// Attempt 1 waits `initial_delay`; each further attempt doubles the
    /// delay, saturating at `initial_delay * 2^cap_exponent` and never
    /// exceeding `max_delay`. The schedule is deterministic so a given
    /// attempt number always maps to the same delay.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return self.initial_delay;
        }
        // The shift bound keeps an oversized cap_exponent from overflowing;
        // max_delay already clamps anything that large.
        let exponent = (attempt - 1).min(self.cap_exponent).min(31);
        let delay = self.initial_delay.saturating_mul(1_u32 << exponent);
        delay.min(self.max_delay)
    }

    /// Whether `error` warrants another automatic reconnection attempt given
    /// `attempts` already made.
    #[must_use]
    pub fn should_retry(&self, error: &Error, attempts: u32) -> bool {
        attempts < self.max_attempts && retryable(error)
    }
}

/// Classify a failure as retryable or terminal.
///
/// Retryable: the session ended without a close handshake, I/O conditions
/// that clear up on their own (reset, refused, timed out, broken pipe,
/// unexpected EOF), and transport write-queue exhaustion. Handshake
/// rejections and validation errors are never retried.
#[must_use]
pub fn retryable(error: &Error) -> bool {
    match error.kind() {
        Kind::Closed => true,
        Kind::Handshake | Kind::Validation | Kind::Internal => false,
        Kind::Transport => {
            if let Some(ws) = error.downcast_ref::<WsError>() {
                match ws {
                    WsError::Io(e) => retryable_io(e.kind()),
                    WsError::WriteBufferFull(_) => true,
                    _ => false,
                }
            } else if let Some(e) = error.downcast_ref::<io::Error>() {
                retryable_io(e.kind())
            } else {
                false
            }
        }
    }
}

fn retryable_io(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::TimedOut
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::NotConnected
    )
}
