//! Control-session configuration
//!
//! Timeouts for the transport and the command used to start the login exchange.

use std::time::Duration;

use crate::config::{CONNECTION_TIMEOUT_SECS, DEFAULT_PROBE};

/// Control session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Bound on establishing the TCP connection
    pub connect_timeout: Duration,

    /// Bound on waiting for a server line (None = wait forever)
    pub read_timeout: Option<Duration>,

    /// Line sent to provoke the login challenge
    pub probe: String,
}

impl SessionConfig {
    /// Create a configuration with default timeouts and probe
    pub fn new() -> Self {
        Self {
            connect_timeout: Duration::from_secs(CONNECTION_TIMEOUT_SECS),
            read_timeout: None,
            probe: DEFAULT_PROBE.to_string(),
        }
    }

    /// Set the connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the read timeout
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the session-initiation probe
    pub fn with_probe(mut self, probe: impl Into<String>) -> Self {
        self.probe = probe.into();
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_config_builder() {
        let config = SessionConfig::new()
            .with_connect_timeout(Duration::from_secs(5))
            .with_read_timeout(Some(Duration::from_secs(2)))
            .with_probe("NOOP");

        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.read_timeout, Some(Duration::from_secs(2)));
        assert_eq!(config.probe, "NOOP");
    }

    #[test]
    fn test_session_config_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(CONNECTION_TIMEOUT_SECS));
        assert!(config.read_timeout.is_none());
        assert_eq!(config.probe, DEFAULT_PROBE);
    }
}
