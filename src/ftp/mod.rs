//! FTP control-channel module
//!
//! Line framing over a TCP control connection, reply parsing, and the
//! connect/login state machine built on top of them.

pub mod config;
pub mod handshake;
pub mod reply;
pub mod session;

// Re-exports
pub use config::SessionConfig;
pub use handshake::{Credentials, HandshakeController, HandshakeState, LoginOutcome};
pub use reply::{extract_code, Reply, ReplyCode};
pub use session::{open, ConnectionTarget, Session, SessionState};
