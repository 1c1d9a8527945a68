//! Engine configuration
//!
//! This module contains all configuration options for the download engine.

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};

/// Main configuration for the download engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Segment count used by callers that have no preference of their own
    pub default_segments: usize,

    /// Upper bound on segments per job (larger requests are clamped)
    pub max_segments: usize,

    /// Size of the buffers workers write to disk, in bytes
    pub chunk_size: usize,

    /// How often the controller publishes a progress snapshot, in milliseconds
    pub progress_interval_ms: u64,

    /// User agent sent with every request
    pub user_agent: String,

    /// HTTP configuration
    pub http: HttpConfig,
}

/// HTTP-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Connection timeout in seconds
    pub connect_timeout: u64,

    /// Read timeout in seconds
    pub read_timeout: u64,

    /// Maximum redirects to follow
    pub max_redirects: usize,

    /// Whether to accept invalid TLS certificates (dangerous!)
    pub accept_invalid_certs: bool,

    /// Proxy URL (e.g., "http://proxy:8080")
    pub proxy_url: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_segments: 4,
            max_segments: 32,
            chunk_size: 64 * 1024, // 64 KiB
            progress_interval_ms: 250,
            user_agent: format!("rangedl/{}", env!("CARGO_PKG_VERSION")),
            http: HttpConfig::default(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: 30,
            read_timeout: 30,
            max_redirects: 10,
            accept_invalid_certs: false,
            proxy_url: None,
        }
    }
}

impl EngineConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default segment count
    pub fn default_segments(mut self, segments: usize) -> Self {
        self.default_segments = segments;
        self
    }

    /// Set the maximum segments per job
    pub fn max_segments(mut self, max: usize) -> Self {
        self.max_segments = max;
        self
    }

    /// Set the write buffer size
    pub fn chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size = bytes;
        self
    }

    /// Set the progress publishing interval
    pub fn progress_interval_ms(mut self, ms: u64) -> Self {
        self.progress_interval_ms = ms;
        self
    }

    /// Set the user agent
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = ua.into();
        self
    }

    /// Set connect and read timeouts, in seconds
    pub fn timeouts(mut self, connect: u64, read: u64) -> Self {
        self.http.connect_timeout = connect;
        self.http.read_timeout = read;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_segments == 0 {
            return Err(EngineError::invalid_input(
                "max_segments",
                "Must be at least 1",
            ));
        }

        if self.default_segments == 0 || self.default_segments > self.max_segments {
            return Err(EngineError::invalid_input(
                "default_segments",
                format!("Must be between 1 and {}", self.max_segments),
            ));
        }

        if self.chunk_size == 0 {
            return Err(EngineError::invalid_input("chunk_size", "Must be at least 1"));
        }

        if self.progress_interval_ms == 0 {
            return Err(EngineError::invalid_input(
                "progress_interval_ms",
                "Must be at least 1",
            ));
        }

        if self.http.connect_timeout == 0 || self.http.read_timeout == 0 {
            return Err(EngineError::invalid_input(
                "http.timeouts",
                "Timeouts must be at least one second",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.default_segments, 4);
        assert_eq!(config.chunk_size, 64 * 1024);
        assert_eq!(config.http.read_timeout, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = EngineConfig::new()
            .default_segments(8)
            .max_segments(16)
            .chunk_size(1024)
            .timeouts(5, 10);

        assert_eq!(config.default_segments, 8);
        assert_eq!(config.max_segments, 16);
        assert_eq!(config.chunk_size, 1024);
        assert_eq!(config.http.connect_timeout, 5);
        assert_eq!(config.http.read_timeout, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_configs() {
        assert!(EngineConfig::new().chunk_size(0).validate().is_err());
        assert!(EngineConfig::new().max_segments(0).validate().is_err());
        assert!(EngineConfig::new().default_segments(64).validate().is_err());
        assert!(EngineConfig::new().progress_interval_ms(0).validate().is_err());
        assert!(EngineConfig::new().timeouts(0, 30).validate().is_err());
    }
}
