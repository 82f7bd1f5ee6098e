//! Connection settings for the CPX bridge.

use std::time::Duration;

use tokio::net::TcpStream;

use super::Transport;
use crate::error::Result;

/// Address of the AI-deck when it runs as a WiFi access point.
pub const DEFAULT_HOST: &str = "192.168.4.1";

/// TCP port of the CPX bridge.
pub const DEFAULT_PORT: u16 = 5000;

/// Default TCP connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Where and how to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    /// Bounds the TCP handshake. `None` uses the OS default.
    pub connect_timeout: Option<Duration>,
}

impl ConnectionConfig {
    /// Create a configuration for `host:port` with the default timeout.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
        }
    }

    /// Set the connect timeout.
    pub fn connect_timeout(mut self, connect_timeout: Option<Duration>) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// `host:port` string.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Open a transport to the configured address.
    pub async fn connect(&self) -> Result<Transport<TcpStream>> {
        tracing::info!("Connecting to socket on {}...", self.address());
        let transport = Transport::connect(self.address(), self.connect_timeout).await?;
        tracing::info!("Socket connected");
        Ok(transport)
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT)
    }
}
