//! Server configuration and the timing knobs sessions depend on.

use super::BoxedFuture;
use serde::Deserialize;
use std::time::Duration;

/// Configuration for a [`Server`](super::Server) and the sessions it creates.
///
/// Deserializable so it can be embedded in an application's own config file;
/// every field except `name` and `version` has a default.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerOptions {
    pub name: String,
    pub version: String,
    pub instructions: Option<String>,
    /// How many times `connect` checks for the client's capabilities.
    pub handshake_attempts: u32,
    pub handshake_interval_ms: u64,
    /// Keep-alive ping period. `None` disables pinging.
    pub ping_interval_ms: Option<u64>,
    /// Deadline for server-initiated requests (pings, `roots/list`).
    pub request_timeout_ms: u64,
    /// Maximum number of values returned by one `completion/complete`.
    pub completion_page_size: usize,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            instructions: None,
            handshake_attempts: 10,
            handshake_interval_ms: 100,
            ping_interval_ms: Some(1000),
            request_timeout_ms: 10_000,
            completion_page_size: 100,
        }
    }
}

impl ServerOptions {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ..Self::default()
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn with_ping_interval(mut self, interval: Option<Duration>) -> Self {
        self.ping_interval_ms = interval.map(|d| d.as_millis() as u64);
        self
    }

    pub fn handshake_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.handshake_attempts.max(1),
            interval: Duration::from_millis(self.handshake_interval_ms),
        }
    }

    pub fn ping_interval(&self) -> Option<Duration> {
        self.ping_interval_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Bounded polling: check up to `max_attempts` times, sleeping `interval`
/// between checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

/// Source of delays for handshake polling and keep-alive pings.
///
/// Swapping the implementation lets tests run the timing logic without
/// waiting on the wall clock.
pub trait Sleeper: Send + Sync + 'static {
    fn sleep(&self, duration: Duration) -> BoxedFuture<()>;
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> BoxedFuture<()> {
        Box::pin(tokio::time::sleep(duration))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = ServerOptions::new("demo", "1.2.3");
        assert_eq!(options.name, "demo");
        assert_eq!(
            options.handshake_policy(),
            RetryPolicy {
                max_attempts: 10,
                interval: Duration::from_millis(100)
            }
        );
        assert_eq!(options.ping_interval(), Some(Duration::from_secs(1)));
        assert_eq!(options.completion_page_size, 100);
    }

    #[test]
    fn partial_config_fills_in_defaults() {
        let options: ServerOptions = serde_json::from_str(
            r#"{
                "name": "cfg",
                "version": "0.1.0",
                "ping_interval_ms": null,
                "handshake_attempts": 3
            }"#,
        )
        .unwrap();
        assert_eq!(options.ping_interval(), None);
        assert_eq!(options.handshake_policy().max_attempts, 3);
        assert_eq!(options.request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn zero_ping_interval_disables_pinging() {
        let mut options = ServerOptions::default();
        options.ping_interval_ms = Some(0);
        assert_eq!(options.ping_interval(), None);
    }
}
