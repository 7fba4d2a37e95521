#![expect(
    clippy::module_name_repetitions,
    reason = "Configuration types intentionally mirror the module name for clarity"
)]

use std::time::Duration;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_LIVENESS_TIMEOUT: Duration = Duration::from_secs(600);
const DEFAULT_TEARDOWN_PAUSE: Duration = Duration::from_millis(500);
const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(300);
const DEFAULT_CAP_EXPONENT: u32 = 8;
const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Per-connection behavior configuration.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct Config {
    /// Ceiling on how long a dial may take; expiry is a retryable
    /// transport failure
    pub connect_timeout: Duration,
    /// How often the liveness monitor wakes up while connected
    pub heartbeat_interval: Duration,
    /// Maximum silence tolerated before the stream is considered dead.
    /// Deliberately long by default to tolerate naturally sparse streams.
    pub liveness_timeout: Duration,
    /// Bounded pause between closing a stale session and opening its
    /// replacement, to let lower-level resources release
    pub teardown_pause: Duration,
    /// Reconnection strategy configuration
    pub reconnect: ReconnectConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            liveness_timeout: DEFAULT_LIVENESS_TIMEOUT,
            teardown_pause: DEFAULT_TEARDOWN_PAUSE,
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Configuration for automatic reconnection behavior.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Maximum number of reconnection attempts before giving up
    pub max_attempts: u32,
    /// Delay before the first reconnection attempt
    pub initial_delay: Duration,
    /// Ceiling on the delay between attempts
    pub max_delay: Duration,
    /// The doubling saturates at `initial_delay * 2^cap_exponent`
    pub cap_exponent: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            cap_exponent: DEFAULT_CAP_EXPONENT,
        }
    }
}
