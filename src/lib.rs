//! FTP login client - connect to an FTP server and authenticate
//!
//! This crate implements the control-channel handshake of FTP: open a TCP
//! connection, read the `220` greeting, then walk the server through
//! `USER`/`PASS` driven purely by the three-digit status code at the start of
//! every reply line.
//!
//! # Features
//!
//! - Line-framed control session with one-way close on any I/O failure
//! - Fixed-width status code parsing that never panics on short lines
//! - Multi-line replies (`220-...` continued until `220 ...`)
//! - Unlimited retry on a wrong password, each retry re-prompting
//! - Optional connect and read timeouts
//!
//! # Example Usage (CLI)
//!
//! ```bash
//! ftp-login --host=192.168.1.100 --port=21
//! ```

pub mod config;
pub mod console;
pub mod error;
pub mod ftp;

// Re-exports for convenience
pub use config::{Args, Config};
pub use console::{ConsolePresenter, ConsolePrompter, CredentialPrompter, Presenter};
pub use error::{ConnectError, FtpLoginError, ProtocolViolation, ReceiveError, Result, SendError};
pub use ftp::{
    extract_code, ConnectionTarget, HandshakeController, HandshakeState, LoginOutcome, Reply,
    ReplyCode, Session, SessionConfig,
};
