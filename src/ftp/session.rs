//! Control connection transport
//!
//! Owns one bidirectional byte stream and frames it into CRLF-terminated lines.
//! Any I/O failure closes the session for good; the socket is released when the
//! session is closed or dropped.

use std::fmt;
use std::io;
use std::time::Duration;

use tokio::io::{
    split, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
    ReadHalf, WriteHalf,
};
use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::config::SessionConfig;
use crate::error::{ConnectError, ProtocolViolation, ReceiveError, SendError};

/// Line terminator written after every command
pub const LINE_TERMINATOR: &str = "\r\n";

/// Longest server line accepted, terminator included
pub const MAX_LINE_LENGTH: usize = 8192;

/// Host and port of the server, validated before any socket is opened
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    pub host: String,
    pub port: u16,
}

impl ConnectionTarget {
    /// Build a target from user-supplied strings
    ///
    /// Fails with `InvalidPort` when `port` is not an integer in `0..=65535`.
    pub fn parse(host: &str, port: &str) -> Result<Self, ConnectError> {
        let port = port
            .trim()
            .parse::<u16>()
            .map_err(|_| ConnectError::InvalidPort(port.to_string()))?;

        Ok(Self {
            host: host.trim().to_string(),
            port,
        })
    }
}

impl fmt::Display for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Lifecycle of a session; `Closed` is terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    Closed,
}

/// A live control connection with line framing
pub struct Session<S = TcpStream> {
    reader: Option<BufReader<ReadHalf<S>>>,
    writer: Option<WriteHalf<S>>,
    state: SessionState,
    read_timeout: Option<Duration>,
}

/// Open a session to `host:port`, validating the port first
pub async fn open(host: &str, port: &str, config: &SessionConfig) -> Result<Session, ConnectError> {
    let target = ConnectionTarget::parse(host, port)?;
    Session::connect(&target, config).await
}

impl Session<TcpStream> {
    /// Establish a TCP connection to `target`
    pub async fn connect(
        target: &ConnectionTarget,
        config: &SessionConfig,
    ) -> Result<Self, ConnectError> {
        info!("Connecting to FTP server {}...", target);

        let unreachable = |source: io::Error| ConnectError::UnreachableHost {
            target: target.to_string(),
            source,
        };

        let addrs: Vec<_> = lookup_host((target.host.as_str(), target.port))
            .await
            .map_err(unreachable)?
            .collect();
        if addrs.is_empty() {
            return Err(unreachable(io::Error::new(
                io::ErrorKind::NotFound,
                "host resolved to no addresses",
            )));
        }

        let stream = match timeout(config.connect_timeout, TcpStream::connect(&addrs[..])).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(classify_connect_error(target, e)),
            Err(_) => {
                return Err(ConnectError::IoFailure(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!(
                        "connection timeout after {}s",
                        config.connect_timeout.as_secs()
                    ),
                )))
            }
        };

        // A socket without a peer address never really connected.
        let peer = stream.peer_addr().map_err(ConnectError::IoFailure)?;
        info!("Connected to {} ({})", target, peer);

        Ok(Session::from_stream(stream).with_read_timeout(config.read_timeout))
    }
}

fn classify_connect_error(target: &ConnectionTarget, e: io::Error) -> ConnectError {
    match e.kind() {
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::NotFound
        | io::ErrorKind::AddrNotAvailable => ConnectError::UnreachableHost {
            target: target.to_string(),
            source: e,
        },
        _ => ConnectError::IoFailure(e),
    }
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin,
{
    /// Wrap an already connected stream
    pub fn from_stream(stream: S) -> Self {
        let (read_half, write_half) = split(stream);
        Self {
            reader: Some(BufReader::new(read_half)),
            writer: Some(write_half),
            state: SessionState::Connected,
            read_timeout: None,
        }
    }

    /// Bound every `receive_line` call
    pub fn with_read_timeout(mut self, read_timeout: Option<Duration>) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the session still holds a connected stream; performs no I/O
    pub fn is_alive(&self) -> bool {
        self.state == SessionState::Connected && self.reader.is_some() && self.writer.is_some()
    }

    /// Write `text` followed by the line terminator
    ///
    /// Does nothing and fails when the session is not alive. A write failure
    /// closes the session.
    pub async fn send_line(&mut self, text: &str) -> Result<(), SendError> {
        let writer = match self.writer.as_mut() {
            Some(writer) if self.state == SessionState::Connected => writer,
            _ => return Err(SendError::connection_lost("session is not connected")),
        };

        let mut line = String::with_capacity(text.len() + LINE_TERMINATOR.len());
        line.push_str(text);
        line.push_str(LINE_TERMINATOR);

        let result = match writer.write_all(line.as_bytes()).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                debug!("--> {}", mask_secret(text));
                Ok(())
            }
            Err(e) => {
                warn!("Write to server failed: {}", e);
                self.close().await;
                Err(SendError::connection_lost(e.to_string()))
            }
        }
    }

    /// Read one line, without its terminator
    ///
    /// Accepts `\n` or `\r\n`; other whitespace is kept. End of stream, an I/O
    /// error, a read timeout or a line longer than [`MAX_LINE_LENGTH`] closes
    /// the session.
    pub async fn receive_line(&mut self) -> Result<String, ReceiveError> {
        let reader = match self.reader.as_mut() {
            Some(reader) if self.state == SessionState::Connected => reader,
            _ => return Err(ReceiveError::connection_lost("session is not connected")),
        };

        let mut buf = Vec::new();
        let mut limited = AsyncReadExt::take(reader, MAX_LINE_LENGTH as u64);
        let read = limited.read_until(b'\n', &mut buf);
        let result = match self.read_timeout {
            Some(limit) => match timeout(limit, read).await {
                Ok(result) => result,
                Err(_) => Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("no reply within {}s", limit.as_secs()),
                )),
            },
            None => read.await,
        };

        if result.is_ok() && !buf.ends_with(b"\n") && buf.len() >= MAX_LINE_LENGTH {
            warn!("Server line exceeds {} bytes", MAX_LINE_LENGTH);
            self.close().await;
            return Err(ProtocolViolation::LineTooLong(MAX_LINE_LENGTH).into());
        }

        let failure = match result {
            Ok(_) if buf.ends_with(b"\n") => None,
            Ok(0) => Some("server closed the connection".to_string()),
            Ok(_) => Some("server closed the connection mid-line".to_string()),
            Err(e) => Some(e.to_string()),
        };
        if let Some(reason) = failure {
            warn!("Read from server failed: {}", reason);
            self.close().await;
            return Err(ReceiveError::ConnectionLost(reason));
        }

        buf.pop();
        if buf.ends_with(b"\r") {
            buf.pop();
        }
        let line = String::from_utf8_lossy(&buf).into_owned();
        debug!("<-- {}", line);
        Ok(line)
    }

    /// Shut the stream down and release it; safe to call more than once
    pub async fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.state = SessionState::Closed;
        self.reader = None;

        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.shutdown().await {
                warn!("Failed to shut down control connection: {}", e);
            }
        }

        info!("FTP control connection closed");
    }
}

impl<S> fmt::Debug for Session<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("read_timeout", &self.read_timeout)
            .finish()
    }
}

/// Hide the argument of `PASS` in logs
pub fn mask_secret(line: &str) -> std::borrow::Cow<'_, str> {
    match line.get(..5) {
        Some(prefix) if prefix.eq_ignore_ascii_case("PASS ") => "PASS ****".into(),
        _ => line.into(),
    }
}
