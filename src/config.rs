//! Server configuration.
//!
//! Loaded from YAML at startup, the same way `kill-ux-01-server`'s
//! `AppConfig`/`RouteConfig` pair is loaded via `serde_yaml`. Every field here
//! corresponds to a collaborator spec.md §6 lists as "Consumed from
//! Configuration".

use std::net::SocketAddr;

use serde::Deserialize;

use crate::error::{ConnectionError, Result};

/// Per-pool throttling defaults, applied to every `ThrottlePool` a worker
/// participates in (see `throttle::ThrottlePool`).
#[derive(Debug, Clone, Deserialize)]
pub struct ThrottleConfig {
    /// Aggregate bytes/second budget for the pool.
    pub rate: i64,
    /// Initial per-refill magazine handed to the pool, in bytes.
    pub magazine: i64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        ThrottleConfig {
            rate: 10 * 1024 * 1024,
            magazine: 1024 * 1024,
        }
    }
}

/// Top level server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Whether to emit `tracing::debug!` events for every connection state
    /// transition. Corresponds to lighttpd2's `DEBUG_REQUEST_HANDLING` option.
    pub debug_request_handling: bool,
    /// Maximum number of requests served on one kept-alive connection before
    /// it is forced closed. `0` means "unlimited".
    pub max_keep_alive_requests: u64,
    /// Seconds a connection may sit idle, waiting for the next request,
    /// before being released. `0` disables keep-alive entirely.
    pub max_keep_alive_idle: u64,
    /// Seconds an idle connection may wait in a worker's shared keep-alive
    /// queue once a queue timeout policy is in effect (see
    /// `keepalive::KeepAliveQueue`).
    pub keep_alive_queue_timeout: u64,
    /// Addresses to bind listening sockets on.
    pub listen: Vec<SocketAddr>,
    /// Number of worker threads; each owns its own event loop, listener
    /// clone, and connection slab.
    pub worker_threads: usize,
    /// Throttling pool defaults, if throttling is enabled.
    pub throttle: Option<ThrottleConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            debug_request_handling: false,
            max_keep_alive_requests: u64::MAX,
            max_keep_alive_idle: 5,
            keep_alive_queue_timeout: 4,
            listen: Vec::new(),
            worker_threads: 1,
            throttle: None,
        }
    }
}

impl ServerConfig {
    /// Parses a configuration from a YAML document.
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        serde_yaml::from_str(contents).map_err(|e| ConnectionError::Config(e.to_string()))
    }

    /// Loads and parses a configuration file from disk.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_config_disables_throttling_and_enables_keep_alive() {
        let cfg = ServerConfig::default();
        assert!(cfg.throttle.is_none());
        assert_eq!(5, cfg.max_keep_alive_idle);
        assert_eq!(u64::MAX, cfg.max_keep_alive_requests);
    }

    #[test]
    fn parses_minimal_yaml() {
        let yaml = "listen:\n  - \"127.0.0.1:8080\"\nworker_threads: 4\n";
        let cfg = ServerConfig::from_yaml_str(yaml).expect("valid config");
        assert_eq!(4, cfg.worker_threads);
        assert_eq!(1, cfg.listen.len());
    }

    #[test]
    fn rejects_malformed_yaml() {
        let yaml = "worker_threads: [this is not a number]\n";
        assert!(ServerConfig::from_yaml_str(yaml).is_err());
    }
}
