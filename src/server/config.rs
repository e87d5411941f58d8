//! Server configuration.

use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::server::error::Error;

/// HTTP server configuration.
///
/// Every field has a default, so a JSON document only needs to name the
/// values it changes:
///
/// ```
/// use filehttp_rs::ServerConfig;
///
/// let config = ServerConfig::from_json(r#"{ "max_workers": 4 }"#).unwrap();
/// assert_eq!(config.max_workers, 4);
/// assert_eq!(config.max_connections, 100);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// The address to bind to. The port is supplied to `start`.
    pub bind_addr: IpAddr,
    /// Listen backlog of the accepting socket.
    pub backlog: u32,
    /// Open connections at which new ones are turned away with `503`.
    pub max_connections: usize,
    /// Maximum number of connections served at the same time.
    pub max_workers: usize,
    /// How long an idle runtime thread lingers before it is reclaimed.
    pub worker_idle_timeout_ms: u64,
    /// Upper bound of a single wait for inbound connections.
    pub accept_poll_interval_ms: u64,
    /// How long a connection may stay silent before it is closed.
    pub receive_timeout_ms: u64,
    /// How long `stop` waits for in-flight connections.
    pub drain_timeout_ms: u64,
    /// The read buffer size.
    pub read_buffer_size: usize,
    /// Largest request (headers and body) a connection will buffer.
    pub max_request_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            backlog: 30,
            max_connections: 100,
            max_workers: 20,
            worker_idle_timeout_ms: 30_000,
            accept_poll_interval_ms: 1_000,
            receive_timeout_ms: 30_000,
            drain_timeout_ms: 1_000,
            read_buffer_size: 8192,
            max_request_size: 1024 * 1024,
        }
    }
}

impl ServerConfig {
    /// Parse a configuration from a JSON document and validate it.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file and validate it.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> Result<(), Error> {
        let limits = [
            ("max_connections", self.max_connections as u64),
            ("max_workers", self.max_workers as u64),
            ("accept_poll_interval_ms", self.accept_poll_interval_ms),
            ("receive_timeout_ms", self.receive_timeout_ms),
            ("read_buffer_size", self.read_buffer_size as u64),
            ("max_request_size", self.max_request_size as u64),
        ];
        for (name, value) in limits {
            if value == 0 {
                return Err(Error::InvalidConfig(format!("{name} must be greater than zero")));
            }
        }
        Ok(())
    }

    pub fn worker_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.worker_idle_timeout_ms)
    }

    pub fn accept_poll_interval(&self) -> Duration {
        Duration::from_millis(self.accept_poll_interval_ms)
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    /// Build a multi-threaded runtime suited to this configuration.
    ///
    /// Blocking threads (used for file reads) are capped at `max_workers`
    /// and exit after `worker_idle_timeout` without work.
    pub fn build_runtime(&self) -> std::io::Result<tokio::runtime::Runtime> {
        tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .max_blocking_threads(self.max_workers.max(1))
            .thread_keep_alive(self.worker_idle_timeout())
            .thread_name("filehttp-worker")
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.max_connections, 100);
        assert_eq!(config.max_workers, 20);
        assert_eq!(config.accept_poll_interval(), Duration::from_secs(1));
        assert_eq!(config.receive_timeout(), Duration::from_secs(30));
        assert_eq!(config.drain_timeout(), Duration::from_millis(1000));
        assert_eq!(config.worker_idle_timeout(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = ServerConfig::from_json(
            r#"{ "bind_addr": "127.0.0.1", "receive_timeout_ms": 250 }"#,
        )
        .unwrap();
        assert_eq!(config.bind_addr, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(config.receive_timeout(), Duration::from_millis(250));
        assert_eq!(config.backlog, 30);
    }

    #[test]
    fn test_zero_limit_is_rejected() {
        let result = ServerConfig::from_json(r#"{ "max_workers": 0 }"#);
        assert!(matches!(result, Err(Error::InvalidConfig(ref msg)) if msg.contains("max_workers")));
    }

    #[test]
    fn test_invalid_json_is_reported() {
        let result = ServerConfig::from_json("{ not json");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.json");
        std::fs::write(&path, r#"{ "max_connections": 7 }"#).unwrap();

        let config = ServerConfig::from_file(&path).unwrap();
        assert_eq!(config.max_connections, 7);
    }

    #[test]
    fn test_build_runtime() {
        let runtime = ServerConfig::default().build_runtime().unwrap();
        let answer = runtime.block_on(async { tokio::task::spawn_blocking(|| 42).await.unwrap() });
        assert_eq!(answer, 42);
    }
}
