//! Connection Pool Management
//!
//! Owns the configured HTTP client shared by every job of an engine and
//! keeps engine-wide transfer counters.

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use reqwest::Client;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// HTTP client plus engine-wide counters
#[derive(Debug)]
pub struct ConnectionPool {
    /// HTTP client (reqwest handles its own connection pool)
    client: Client,
    /// User agent sent with every request
    user_agent: String,
    /// Total bytes downloaded
    total_downloaded: AtomicU64,
    /// Active connection count
    active_connections: AtomicU64,
}

impl ConnectionPool {
    /// Create a new connection pool
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let http = &config.http;
        let mut builder = Client::builder()
            .connect_timeout(Duration::from_secs(http.connect_timeout))
            .read_timeout(Duration::from_secs(http.read_timeout))
            .redirect(reqwest::redirect::Policy::limited(http.max_redirects))
            .danger_accept_invalid_certs(http.accept_invalid_certs)
            .pool_max_idle_per_host(32)
            .pool_idle_timeout(Duration::from_secs(90));

        if let Some(ref proxy_url) = http.proxy_url {
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| EngineError::invalid_input("http.proxy_url", e.to_string()))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| EngineError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            user_agent: config.user_agent.clone(),
            total_downloaded: AtomicU64::new(0),
            active_connections: AtomicU64::new(0),
        })
    }

    /// Get the underlying HTTP client
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// User agent for outgoing requests
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Record downloaded bytes
    pub fn record_download(&self, bytes: u64) {
        self.total_downloaded.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Get total downloaded bytes
    pub fn total_downloaded(&self) -> u64 {
        self.total_downloaded.load(Ordering::Relaxed)
    }

    /// Increment active connection count
    pub fn connection_started(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrement active connection count
    pub fn connection_finished(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    /// Get active connection count
    pub fn active_connections(&self) -> u64 {
        self.active_connections.load(Ordering::Relaxed)
    }
}
