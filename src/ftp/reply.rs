//! Server reply parsing
//!
//! Every server line starts with a 3-digit status code in its first three
//! characters, followed by free text. The code is cut out by position, never by
//! searching for a delimiter.
//!
//! # Example
//! ```
//! use ftp_login::ftp::reply::{Reply, ReplyCode};
//!
//! let reply = Reply::parse("220 Service ready").unwrap();
//! assert_eq!(reply.code, ReplyCode::ServiceReady);
//! assert_eq!(reply.text, " Service ready");
//! assert_eq!(reply.to_string(), "220 Service ready");
//! ```

use std::fmt;

use crate::error::ProtocolViolation;

/// Width of the status code prefix
pub const CODE_LEN: usize = 3;

/// Upper bound on the lines of one multi-line reply
pub const MAX_REPLY_LINES: usize = 512;

/// Status codes the login handshake acts on
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReplyCode {
    /// 220 - service ready for new user
    ServiceReady,
    /// 221 - service closing control connection
    ClosingControl,
    /// 230 - user logged in
    LoggedIn,
    /// 331 - user name okay, need password
    NeedPassword,
    /// 530 - not logged in
    NotLoggedIn,
    /// Any other three-digit code
    Other(String),
}

impl ReplyCode {
    /// Build a code from exactly three ASCII digits
    pub fn from_digits(digits: &str) -> Option<Self> {
        if digits.len() != CODE_LEN || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }

        Some(match digits {
            "220" => ReplyCode::ServiceReady,
            "221" => ReplyCode::ClosingControl,
            "230" => ReplyCode::LoggedIn,
            "331" => ReplyCode::NeedPassword,
            "530" => ReplyCode::NotLoggedIn,
            other => ReplyCode::Other(other.to_string()),
        })
    }

    /// The three digits as sent by the server
    pub fn as_str(&self) -> &str {
        match self {
            ReplyCode::ServiceReady => "220",
            ReplyCode::ClosingControl => "221",
            ReplyCode::LoggedIn => "230",
            ReplyCode::NeedPassword => "331",
            ReplyCode::NotLoggedIn => "530",
            ReplyCode::Other(digits) => digits,
        }
    }
}

impl fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Take the status code prefix of a line
///
/// Fails instead of panicking when the line is shorter than three characters
/// or the prefix is not numeric.
pub fn extract_code(line: &str) -> Result<&str, ProtocolViolation> {
    // `get` also rejects a multi-byte character straddling the prefix.
    let prefix = match line.get(..CODE_LEN) {
        Some(prefix) => prefix,
        None if line.chars().count() < CODE_LEN => {
            return Err(ProtocolViolation::TooShort(line.to_string()))
        }
        None => return Err(ProtocolViolation::NonNumericCode(line.to_string())),
    };

    if !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ProtocolViolation::NonNumericCode(line.to_string()));
    }

    Ok(prefix)
}

/// One server reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Status code
    pub code: ReplyCode,

    /// Rest of the first line, plus any continuation lines joined by `\n`
    pub text: String,
}

impl Reply {
    /// Parse a single server line
    pub fn parse(line: &str) -> Result<Self, ProtocolViolation> {
        let digits = extract_code(line)?;
        let code = ReplyCode::from_digits(digits)
            .ok_or_else(|| ProtocolViolation::NonNumericCode(line.to_string()))?;

        Ok(Self {
            code,
            text: line[CODE_LEN..].to_string(),
        })
    }

    /// Whether the first line opens a multi-line reply (`123-text`)
    pub fn is_continued(&self) -> bool {
        self.text.starts_with('-')
    }

    /// Whether `line` ends the multi-line reply opened with this code
    pub fn is_final_line(&self, line: &str) -> bool {
        line.len() > CODE_LEN
            && line.starts_with(self.code.as_str())
            && line.as_bytes()[CODE_LEN] == b' '
    }

    /// Append a continuation line to the reply text
    pub fn push_line(&mut self, line: &str) {
        self.text.push('\n');
        self.text.push_str(line);
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.code, self.text)
    }
}
