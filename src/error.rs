//! Error types for the FTP login client

use std::io;

use thiserror::Error;

/// Failure to establish the control connection
#[derive(Debug, Error)]
pub enum ConnectError {
    /// Port is not an integer in the TCP port range; raised before any network attempt
    #[error("the port has to be an integer, got '{0}'")]
    InvalidPort(String),

    /// Host could not be resolved, or it refused the connection
    #[error("could not find or reach {target}: {source}")]
    UnreachableHost {
        target: String,
        #[source]
        source: io::Error,
    },

    /// Any other transport-level failure while opening the connection
    #[error("I/O error while opening the connection: {0}")]
    IoFailure(#[source] io::Error),
}

/// Failure to write a line to the server
#[derive(Debug, Error)]
pub enum SendError {
    #[error("connection lost while sending: {0}")]
    ConnectionLost(String),
}

/// A server line that does not honour the reply format
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    /// Line shorter than the 3-character status code
    #[error("reply line too short for a status code: {0:?}")]
    TooShort(String),

    /// First 3 characters are not all ASCII digits
    #[error("reply line does not start with a numeric status code: {0:?}")]
    NonNumericCode(String),

    /// Line longer than the accepted maximum, terminator included
    #[error("reply line longer than {0} bytes")]
    LineTooLong(usize),

    /// Multi-line reply never reached its terminating line
    #[error("multi-line reply not terminated after {0} lines")]
    UnterminatedReply(usize),
}

/// Failure to read a line or a reply from the server
#[derive(Debug, Error)]
pub enum ReceiveError {
    #[error("connection lost while receiving: {0}")]
    ConnectionLost(String),

    #[error("protocol violation: {0}")]
    ProtocolViolation(#[from] ProtocolViolation),
}

/// Main error type for the FTP login client
#[derive(Debug, Error)]
pub enum FtpLoginError {
    #[error("connect failed: {0}")]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    Send(#[from] SendError),

    #[error(transparent)]
    Receive(#[from] ReceiveError),

    /// Not connected (no session, or the session was closed)
    #[error("not connected: {0}")]
    NotConnected(String),

    /// Credential prompter could not supply an answer
    #[error("input error: {0}")]
    Prompt(#[source] anyhow::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias using FtpLoginError
pub type Result<T> = std::result::Result<T, FtpLoginError>;

impl FtpLoginError {
    /// Create a not-connected error from a string
    pub fn not_connected(msg: impl Into<String>) -> Self {
        FtpLoginError::NotConnected(msg.into())
    }

    /// Create a config error from a string
    pub fn config(msg: impl Into<String>) -> Self {
        FtpLoginError::Config(msg.into())
    }

    /// True for errors that mean the control connection is gone or unusable
    pub fn is_connection_lost(&self) -> bool {
        matches!(
            self,
            FtpLoginError::Send(_) | FtpLoginError::Receive(_) | FtpLoginError::NotConnected(_)
        )
    }
}

impl SendError {
    pub fn connection_lost(msg: impl Into<String>) -> Self {
        SendError::ConnectionLost(msg.into())
    }
}

impl ReceiveError {
    pub fn connection_lost(msg: impl Into<String>) -> Self {
        ReceiveError::ConnectionLost(msg.into())
    }
}
