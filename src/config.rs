//! Configuration and CLI argument parsing for the FTP login client

use std::time::Duration;

use clap::Parser;

use crate::error::{FtpLoginError, Result};
use crate::ftp::SessionConfig;

/// Connection timeout in seconds
pub const CONNECTION_TIMEOUT_SECS: u64 = 30;

/// Command sent to start the login exchange; servers answer it with 530 before login
pub const DEFAULT_PROBE: &str = "PWD";

/// FTP login client CLI arguments
#[derive(Parser, Debug, Clone)]
#[command(name = "ftp-login")]
#[command(version)]
#[command(about = "Connect to an FTP server and log in over the control channel")]
pub struct Args {
    /// Server host; asked interactively when omitted
    #[arg(long, env = "FTP_LOGIN_HOST")]
    pub host: Option<String>,

    /// Server port; asked interactively when omitted
    #[arg(long, env = "FTP_LOGIN_PORT")]
    pub port: Option<String>,

    /// Connection timeout in seconds
    #[arg(long, default_value = "30", env = "FTP_LOGIN_CONNECT_TIMEOUT")]
    pub connect_timeout: u64,

    /// Read timeout in seconds for each server line.
    /// 0 waits forever.
    #[arg(long, default_value = "0", env = "FTP_LOGIN_READ_TIMEOUT")]
    pub read_timeout: u64,

    /// Command sent to start the login exchange
    #[arg(long, default_value = DEFAULT_PROBE, env = "FTP_LOGIN_PROBE")]
    pub probe: String,

    /// Enable debug logging
    #[arg(short, long, default_value = "false", env = "FTP_LOGIN_VERBOSE")]
    pub verbose: bool,
}

/// Parsed and validated configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Host and port given up front, answered instead of prompting
    pub target: Option<(String, String)>,

    /// Connection timeout
    pub connect_timeout: Duration,

    /// Read timeout (None = wait forever)
    pub read_timeout: Option<Duration>,

    /// Session-initiation probe
    pub probe: String,

    /// Debug logging
    pub verbose: bool,
}

impl Config {
    /// Create Config from CLI Args
    pub fn from_args(args: Args) -> Result<Self> {
        validate_args(&args)?;

        let target = match (args.host, args.port) {
            (Some(host), Some(port)) => Some((host, port)),
            _ => None,
        };

        Ok(Config {
            target,
            connect_timeout: Duration::from_secs(args.connect_timeout),
            read_timeout: parse_read_timeout(args.read_timeout),
            probe: args.probe,
            verbose: args.verbose,
        })
    }

    /// Session settings derived from this configuration
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::new()
            .with_connect_timeout(self.connect_timeout)
            .with_read_timeout(self.read_timeout)
            .with_probe(self.probe.clone())
    }
}

/// Validate CLI arguments
fn validate_args(args: &Args) -> Result<()> {
    let mut errors = Vec::new();

    if args.host.is_some() != args.port.is_some() {
        errors.push("--host and --port must be given together".to_string());
    }

    if args.host.as_deref().is_some_and(|h| h.trim().is_empty()) {
        errors.push("--host cannot be empty".to_string());
    }

    if args.probe.trim().is_empty() {
        errors.push("--probe cannot be empty".to_string());
    }

    if args.probe.contains(['\r', '\n']) {
        errors.push("--probe must be a single line".to_string());
    }

    if args.connect_timeout == 0 {
        errors.push("--connect-timeout must be at least 1 second".to_string());
    }

    if !errors.is_empty() {
        return Err(FtpLoginError::config(errors.join("\n")));
    }

    Ok(())
}

/// Parse read_timeout argument
///
/// - 0 → None (wait forever)
/// - positive → Some(seconds)
pub fn parse_read_timeout(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}
