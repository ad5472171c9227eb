//! Configuration for courier
//!
//! `TransportConfig` is what the library needs; `Args` is the CLI surface of
//! the `courier` binary (clap, with environment variable fallbacks).

use clap::Parser;
use std::time::Duration;

use crate::error::{Result, TransportError};

/// Default cap on concurrently outstanding socket requests
pub const DEFAULT_MAX_IN_FLIGHT: usize = 30;

/// Transport configuration
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// WebSocket endpoint for the persistent channel (e.g. "ws://localhost:8000")
    pub endpoint: String,
    /// Base URL the fallback channel prefixes to resource keys
    pub fallback_base_url: String,
    /// Origin header sent on the WebSocket handshake
    pub origin: String,
    /// Maximum socket requests transmitted and not yet answered
    pub max_in_flight: usize,
    /// Initial delay before reconnecting after a failed connect
    pub reconnect_delay: Duration,
    /// Upper bound for the reconnect back-off
    pub max_reconnect_delay: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://localhost:8000".to_string(),
            fallback_base_url: "http://localhost:8000".to_string(),
            origin: "http://localhost".to_string(),
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            reconnect_delay: Duration::from_millis(100),
            max_reconnect_delay: Duration::from_secs(30),
        }
    }
}

impl TransportConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("COURIER_ENDPOINT") {
            config.endpoint = val;
        }

        if let Ok(val) = std::env::var("COURIER_FALLBACK_URL") {
            config.fallback_base_url = val;
        }

        if let Ok(val) = std::env::var("COURIER_MAX_IN_FLIGHT") {
            if let Ok(n) = val.parse::<usize>() {
                config.max_in_flight = n;
            }
        }

        config
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_in_flight == 0 {
            return Err(TransportError::Config(
                "max_in_flight must be at least 1".to_string(),
            ));
        }

        if !self.endpoint.starts_with("ws://") && !self.endpoint.starts_with("wss://") {
            return Err(TransportError::Config(format!(
                "endpoint must be a ws:// or wss:// URL, got {}",
                self.endpoint
            )));
        }

        if self.reconnect_delay > self.max_reconnect_delay {
            return Err(TransportError::Config(
                "reconnect_delay must not exceed max_reconnect_delay".to_string(),
            ));
        }

        Ok(())
    }
}

/// courier - fetch resources through a multiplexed WebSocket transport
#[derive(Parser, Debug, Clone)]
#[command(name = "courier")]
#[command(about = "Fetch resources over a shared WebSocket with caching and fallback to HTTP")]
pub struct Args {
    /// WebSocket endpoint of the server
    #[arg(long, env = "COURIER_ENDPOINT", default_value = "ws://localhost:8000")]
    pub endpoint: String,

    /// Base URL used for requests that carry a method or body
    #[arg(long, env = "COURIER_FALLBACK_URL", default_value = "http://localhost:8000")]
    pub fallback_url: String,

    /// Maximum concurrently outstanding socket requests
    #[arg(long, env = "COURIER_MAX_IN_FLIGHT", default_value_t = DEFAULT_MAX_IN_FLIGHT)]
    pub max_in_flight: usize,

    /// Cache tier for the requests (uncached, session, transient)
    #[arg(long, default_value = "session")]
    pub cache: String,

    /// HTTP method; forces the fallback channel
    #[arg(long)]
    pub method: Option<String>,

    /// Request body; forces the fallback channel
    #[arg(long)]
    pub body: Option<String>,

    /// Print out-of-band notifications until interrupted
    #[arg(long, default_value = "false")]
    pub listen: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,

    /// Resource keys to request
    pub keys: Vec<String>,
}

impl Args {
    /// Build the transport configuration these arguments describe
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            endpoint: self.endpoint.clone(),
            fallback_base_url: self.fallback_url.clone(),
            max_in_flight: self.max_in_flight,
            ..TransportConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TransportConfig::default();
        assert_eq!(config.max_in_flight, 30);
        assert_eq!(config.endpoint, "ws://localhost:8000");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let config = TransportConfig {
            max_in_flight: 0,
            ..TransportConfig::default()
        };
        assert!(matches!(config.validate(), Err(TransportError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_http_endpoint() {
        let config = TransportConfig {
            endpoint: "http://localhost:8000".to_string(),
            ..TransportConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_args_to_config() {
        let args = Args::parse_from([
            "courier",
            "--endpoint",
            "ws://example.com:9000",
            "--max-in-flight",
            "4",
            "a",
            "b",
        ]);
        let config = args.transport_config();
        assert_eq!(config.endpoint, "ws://example.com:9000");
        assert_eq!(config.max_in_flight, 4);
        assert_eq!(args.keys, vec!["a", "b"]);
    }
}
