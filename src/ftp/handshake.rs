//! Connect and login state machine
//!
//! Drives the control connection from the greeting through `USER`/`PASS`.
//! Only the exact expected status code advances a step; any other code takes
//! that step's failure branch. A wrong password restarts the whole login
//! sequence with fresh credentials, as often as the user keeps trying. Lost
//! connections and protocol violations abort without retrying.

use std::fmt;

use tracing::{debug, error, info, warn};

use super::config::SessionConfig;
use super::reply::{Reply, ReplyCode, MAX_REPLY_LINES};
use super::session::{open, Session};
use crate::console::{CredentialPrompter, Presenter};
use crate::error::{FtpLoginError, ProtocolViolation, ReceiveError, Result};

/// Label used when asking for the username
pub const USERNAME_PROMPT: &str = "Username";

/// Label used when asking for the password
pub const PASSWORD_PROMPT: &str = "Password";

/// Position of the controller in the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Start,
    Connecting,
    Greeted,
    AwaitingLoginPrompt,
    AwaitingUsernameAck,
    AwaitingPasswordAck,
    LoggedIn,
    Rejected,
    ConnectionLost,
    Closed,
}

/// Result of one `authenticate` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    LoggedIn,
    Rejected(String),
    ConnectionLost,
}

impl LoginOutcome {
    pub fn is_logged_in(&self) -> bool {
        matches!(self, LoginOutcome::LoggedIn)
    }
}

/// Username and password for a single login attempt
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"****")
            .finish()
    }
}

/// Outcome of one pass through the login sequence
enum Attempt {
    LoggedIn(Reply),
    WrongPassword(Reply),
    Rejected(String),
}

/// Connect/login controller
///
/// Owns the session; the prompter and presenter are the only ways it talks to
/// the user.
pub struct HandshakeController<P, R> {
    prompter: P,
    presenter: R,
    config: SessionConfig,
    session: Option<Session>,
    state: HandshakeState,
}

impl<P, R> HandshakeController<P, R>
where
    P: CredentialPrompter,
    R: Presenter,
{
    pub fn new(prompter: P, presenter: R, config: SessionConfig) -> Self {
        Self {
            prompter,
            presenter,
            config,
            session: None,
            state: HandshakeState::Start,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Whether a live control connection is held
    pub fn is_connected(&self) -> bool {
        self.session.as_ref().is_some_and(Session::is_alive)
    }

    pub fn prompter(&self) -> &P {
        &self.prompter
    }

    pub fn presenter(&self) -> &R {
        &self.presenter
    }

    /// Ask for the server address, connect and read the greeting
    ///
    /// Returns `false` after presenting the reason when no connection could be
    /// made or the greeting could not be read.
    pub async fn connect(&mut self) -> bool {
        match self.try_connect().await {
            Ok(connected) => connected,
            Err(e) => {
                error!("Connect failed: {}", e);
                self.presenter
                    .present(&format!("Could not connect to the FTP server: {}", e));
                let next = if e.is_connection_lost() {
                    HandshakeState::ConnectionLost
                } else {
                    HandshakeState::Start
                };
                self.release_session().await;
                self.set_state(next);
                false
            }
        }
    }

    async fn try_connect(&mut self) -> Result<bool> {
        self.release_session().await;
        self.set_state(HandshakeState::Connecting);

        let (host, port) = self
            .prompter
            .connection_target()
            .await
            .map_err(FtpLoginError::Prompt)?;

        let session = open(&host, &port, &self.config).await?;
        // `open` only hands out connected sessions today; the check keeps the
        // greeting read off a stream that reports itself disconnected.
        if !session.is_alive() {
            self.presenter.present("Could not connect to the FTP server");
            self.set_state(HandshakeState::Start);
            return Ok(false);
        }
        self.session = Some(session);

        let greeting = self.read_reply().await?;
        if greeting.code == ReplyCode::ServiceReady {
            self.presenter.present(&greeting.to_string());
        } else {
            warn!("Server greeted with {} instead of 220", greeting.code);
        }

        self.set_state(HandshakeState::Greeted);
        Ok(true)
    }

    /// Log in, retrying on a wrong password; `true` once logged in
    pub async fn login(&mut self) -> bool {
        self.authenticate().await.is_logged_in()
    }

    /// Log in, retrying on a wrong password, and report how it ended
    pub async fn authenticate(&mut self) -> LoginOutcome {
        loop {
            match self.login_attempt().await {
                Ok(Attempt::LoggedIn(reply)) => {
                    info!("Logged in");
                    self.presenter.present(&reply.to_string());
                    self.set_state(HandshakeState::LoggedIn);
                    return LoginOutcome::LoggedIn;
                }
                Ok(Attempt::WrongPassword(reply)) => {
                    info!("Login refused with {}, retrying", reply.code);
                    self.presenter
                        .present(&format!("Wrong password, please retry ({})", reply));
                }
                Ok(Attempt::Rejected(reason)) => {
                    warn!("Login rejected: {}", reason);
                    self.presenter.present(&reason);
                    self.set_state(HandshakeState::Rejected);
                    return LoginOutcome::Rejected(reason);
                }
                Err(e) if e.is_connection_lost() => {
                    error!("Login aborted: {}", e);
                    self.presenter
                        .present(&format!("Connection to the FTP server lost: {}", e));
                    self.release_session().await;
                    self.set_state(HandshakeState::ConnectionLost);
                    return LoginOutcome::ConnectionLost;
                }
                Err(e) => {
                    error!("Login aborted: {}", e);
                    let reason = format!("Login aborted: {}", e);
                    self.presenter.present(&reason);
                    self.set_state(HandshakeState::Rejected);
                    return LoginOutcome::Rejected(reason);
                }
            }
        }
    }

    async fn login_attempt(&mut self) -> Result<Attempt> {
        self.set_state(HandshakeState::AwaitingLoginPrompt);
        let probe = self.config.probe.clone();
        self.send(&probe).await?;

        let reply = self.read_reply().await?;
        if reply.code != ReplyCode::NotLoggedIn {
            return Ok(Attempt::Rejected(format!(
                "Unexpected reply to {}: {}",
                probe, reply
            )));
        }

        let username = self.ask(USERNAME_PROMPT).await?;
        self.set_state(HandshakeState::AwaitingUsernameAck);
        self.send(&format!("USER {}", username)).await?;

        let reply = self.read_reply().await?;
        if reply.code != ReplyCode::NeedPassword {
            return Ok(Attempt::Rejected(format!("No such user: {}", reply)));
        }

        let password = self.ask(PASSWORD_PROMPT).await?;
        let credentials = Credentials { username, password };
        debug!("Sending password for {:?}", credentials);
        self.set_state(HandshakeState::AwaitingPasswordAck);
        self.send(&format!("PASS {}", credentials.password)).await?;

        let reply = self.read_reply().await?;
        if reply.code == ReplyCode::LoggedIn {
            Ok(Attempt::LoggedIn(reply))
        } else {
            Ok(Attempt::WrongPassword(reply))
        }
    }

    /// Send `QUIT`, present the reply and release the connection
    ///
    /// Returns `true` when the server acknowledged with 221.
    pub async fn quit(&mut self) -> bool {
        if self.session.is_none() {
            return false;
        }

        let result = match self.send("QUIT").await {
            Ok(()) => self.read_reply().await,
            Err(e) => Err(e),
        };
        self.release_session().await;
        self.set_state(HandshakeState::Closed);

        match result {
            Ok(reply) => {
                self.presenter.present(&reply.to_string());
                reply.code == ReplyCode::ClosingControl
            }
            Err(e) => {
                warn!("QUIT failed: {}", e);
                self.presenter
                    .present(&format!("Connection to the FTP server lost: {}", e));
                false
            }
        }
    }

    /// Ask the prompter for one value; line breaks would smuggle in extra commands
    async fn ask(&mut self, label: &str) -> Result<String> {
        let answer = self.prompter.ask(label).await.map_err(FtpLoginError::Prompt)?;
        if answer.contains(['\r', '\n']) {
            return Err(FtpLoginError::Prompt(anyhow::anyhow!(
                "{} must not contain line breaks",
                label
            )));
        }
        Ok(answer)
    }

    fn session_mut(&mut self) -> Result<&mut Session> {
        self.session
            .as_mut()
            .filter(|session| session.is_alive())
            .ok_or_else(|| FtpLoginError::not_connected("no open control connection"))
    }

    async fn send(&mut self, line: &str) -> Result<()> {
        self.session_mut()?.send_line(line).await?;
        Ok(())
    }

    /// Read one reply, following multi-line continuations
    async fn read_reply(&mut self) -> Result<Reply> {
        let session = self.session_mut()?;

        let first = session.receive_line().await?;
        let mut reply = Reply::parse(&first).map_err(ReceiveError::from)?;

        if reply.is_continued() {
            let mut lines = 1;
            loop {
                if lines >= MAX_REPLY_LINES {
                    return Err(ReceiveError::from(ProtocolViolation::UnterminatedReply(lines)).into());
                }
                let line = session.receive_line().await?;
                lines += 1;

                let last = reply.is_final_line(&line);
                reply.push_line(&line);
                if last {
                    break;
                }
            }
        }

        Ok(reply)
    }

    async fn release_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close().await;
        }
    }

    fn set_state(&mut self, next: HandshakeState) {
        if self.state != next {
            debug!("Handshake state: {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }
}

impl<P, R> fmt::Debug for HandshakeController<P, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandshakeController")
            .field("state", &self.state)
            .field("session", &self.session)
            .field("probe", &self.config.probe)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use anyhow::anyhow;
    use async_trait::async_trait;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    use super::*;

    struct ScriptedPrompter {
        target: (String, String),
        answers: VecDeque<String>,
        asked: Vec<String>,
    }

    impl ScriptedPrompter {
        fn new(host: &str, port: &str, answers: &[&str]) -> Self {
            Self {
                target: (host.to_string(), port.to_string()),
                answers: answers.iter().map(|a| a.to_string()).collect(),
                asked: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl CredentialPrompter for ScriptedPrompter {
        async fn connection_target(&mut self) -> anyhow::Result<(String, String)> {
            Ok(self.target.clone())
        }

        async fn ask(&mut self, label: &str) -> anyhow::Result<String> {
            self.asked.push(label.to_string());
            self.answers
                .pop_front()
                .ok_or_else(|| anyhow!("no answer scripted for {}", label))
        }
    }

    #[derive(Default)]
    struct RecordingPresenter {
        messages: Vec<String>,
    }

    impl Presenter for RecordingPresenter {
        fn present(&mut self, message: &str) {
            self.messages.push(message.to_string());
        }
    }

    impl RecordingPresenter {
        fn saw(&self, needle: &str) -> bool {
            self.messages.iter().any(|m| m.contains(needle))
        }
    }

    /// Serve `greeting`, then answer each client line with the next reply.
    /// Hangs up once the replies run out; yields the lines it received.
    async fn scripted_server(
        greeting: &'static str,
        replies: Vec<&'static str>,
    ) -> (u16, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut lines = BufReader::new(read_half).lines();

            write_half
                .write_all(format!("{}\r\n", greeting).as_bytes())
                .await
                .unwrap();

            let mut received = Vec::new();
            for reply in replies {
                match lines.next_line().await.unwrap() {
                    Some(line) => received.push(line),
                    None => break,
                }
                write_half
                    .write_all(format!("{}\r\n", reply).as_bytes())
                    .await
                    .unwrap();
            }
            received
        });

        (port, handle)
    }

    fn controller(
        port: u16,
        answers: &[&str],
    ) -> HandshakeController<ScriptedPrompter, RecordingPresenter> {
        HandshakeController::new(
            ScriptedPrompter::new("127.0.0.1", &port.to_string(), answers),
            RecordingPresenter::default(),
            SessionConfig::new(),
        )
    }

    #[tokio::test]
    async fn test_connect_presents_greeting() {
        let (port, server) = scripted_server("220 ready", vec![]).await;
        let mut ctl = controller(port, &[]);

        assert!(ctl.connect().await);
        assert!(ctl.presenter().saw("220"));
        assert_eq!(ctl.state(), HandshakeState::Greeted);
        assert!(server.await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_connect_other_greeting_not_presented() {
        let (port, server) = scripted_server("120 ready in 5 minutes", vec![]).await;
        let mut ctl = controller(port, &[]);

        assert!(ctl.connect().await);
        assert!(ctl.presenter().messages.is_empty());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_multiline_greeting() {
        let (port, server) =
            scripted_server("220-Welcome\r\n220-Be nice\r\n220 ready", vec![]).await;
        let mut ctl = controller(port, &[]);

        assert!(ctl.connect().await);
        assert_eq!(
            ctl.presenter().messages,
            vec!["220-Welcome\n220-Be nice\n220 ready".to_string()]
        );
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut ctl = controller(port, &[]);
        assert!(!ctl.connect().await);
        assert!(!ctl.is_connected());
        assert_eq!(ctl.state(), HandshakeState::Start);
        assert_eq!(ctl.presenter().messages.len(), 1);
        assert!(ctl.presenter().saw("Could not connect"));
    }

    #[tokio::test]
    async fn test_connect_invalid_port() {
        let mut ctl = HandshakeController::new(
            ScriptedPrompter::new("127.0.0.1", "ftp", &[]),
            RecordingPresenter::default(),
            SessionConfig::new(),
        );

        assert!(!ctl.connect().await);
        assert!(ctl.presenter().saw("port has to be an integer"));
        assert_eq!(ctl.state(), HandshakeState::Start);
    }

    #[tokio::test]
    async fn test_connect_short_greeting_is_violation() {
        let (port, server) = scripted_server("22", vec![]).await;
        let mut ctl = controller(port, &[]);

        assert!(!ctl.connect().await);
        assert!(ctl.presenter().saw("protocol violation"));
        assert_eq!(ctl.state(), HandshakeState::ConnectionLost);
        assert!(!ctl.is_connected());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_login_first_pass() {
        let (port, server) = scripted_server(
            "220 ready",
            vec!["530 Please login", "331 Password required", "230 Logged in"],
        )
        .await;
        let mut ctl = controller(port, &["alice", "secret"]);

        assert!(ctl.connect().await);
        assert!(ctl.login().await);
        assert_eq!(ctl.state(), HandshakeState::LoggedIn);
        assert_eq!(ctl.prompter().asked, vec![USERNAME_PROMPT, PASSWORD_PROMPT]);
        assert!(ctl.presenter().saw("230 Logged in"));
        assert!(!ctl.presenter().saw("retry"));

        assert_eq!(
            server.await.unwrap(),
            vec!["PWD", "USER alice", "PASS secret"]
        );
    }

    #[tokio::test]
    async fn test_login_retries_after_wrong_password() {
        let (port, server) = scripted_server(
            "220 ready",
            vec![
                "530 Please login",
                "331 Password required",
                "530 Login incorrect",
                "530 Please login",
                "331 Password required",
                "230 Logged in",
            ],
        )
        .await;
        let mut ctl = controller(port, &["alice", "wrong", "alice", "secret"]);

        assert!(ctl.connect().await);
        assert_eq!(ctl.authenticate().await, LoginOutcome::LoggedIn);
        assert_eq!(
            ctl.prompter().asked,
            vec![USERNAME_PROMPT, PASSWORD_PROMPT, USERNAME_PROMPT, PASSWORD_PROMPT]
        );
        assert_eq!(
            ctl.presenter()
                .messages
                .iter()
                .filter(|m| m.contains("Wrong password"))
                .count(),
            1
        );

        assert_eq!(
            server.await.unwrap(),
            vec!["PWD", "USER alice", "PASS wrong", "PWD", "USER alice", "PASS secret"]
        );
    }

    #[tokio::test]
    async fn test_login_unexpected_probe_reply() {
        let (port, server) = scripted_server("220 ready", vec!["500 Unknown command"]).await;
        let mut ctl = controller(port, &["alice", "secret"]);

        assert!(ctl.connect().await);
        assert!(matches!(ctl.authenticate().await, LoginOutcome::Rejected(_)));
        assert!(ctl.prompter().asked.is_empty());
        assert!(ctl.presenter().saw("500 Unknown command"));
        assert_eq!(ctl.state(), HandshakeState::Rejected);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_login_other_success_code_is_not_login_prompt() {
        // 230 right after the probe is not the 530 this step waits for.
        let (port, server) = scripted_server("220 ready", vec!["230 Already in"]).await;
        let mut ctl = controller(port, &["alice", "secret"]);

        assert!(ctl.connect().await);
        assert!(!ctl.login().await);
        assert!(ctl.prompter().asked.is_empty());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_login_no_such_user() {
        let (port, server) =
            scripted_server("220 ready", vec!["530 Please login", "530 Unknown user"]).await;
        let mut ctl = controller(port, &["mallory", "secret"]);

        assert!(ctl.connect().await);
        assert!(!ctl.login().await);
        assert_eq!(ctl.prompter().asked, vec![USERNAME_PROMPT]);
        assert!(ctl.presenter().saw("No such user"));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_login_connection_lost_before_password_ack() {
        let (port, server) =
            scripted_server("220 ready", vec!["530 Please login", "331 Password required"]).await;
        let mut ctl = controller(port, &["alice", "secret", "alice", "secret"]);

        assert!(ctl.connect().await);
        assert_eq!(ctl.authenticate().await, LoginOutcome::ConnectionLost);
        assert_eq!(ctl.prompter().asked, vec![USERNAME_PROMPT, PASSWORD_PROMPT]);
        assert!(!ctl.presenter().saw("Wrong password"));
        assert!(!ctl.is_connected());
        assert_eq!(ctl.state(), HandshakeState::ConnectionLost);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_login_connection_lost_during_retry() {
        let (port, server) = scripted_server(
            "220 ready",
            vec!["530 Please login", "331 Password required", "530 Login incorrect"],
        )
        .await;
        let mut ctl = controller(port, &["alice", "wrong", "alice", "secret"]);

        assert!(ctl.connect().await);
        assert!(!ctl.login().await);
        assert_eq!(ctl.prompter().asked.len(), 2);
        assert_eq!(ctl.state(), HandshakeState::ConnectionLost);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_login_without_connection() {
        let mut ctl = controller(21, &["alice", "secret"]);

        assert_eq!(ctl.authenticate().await, LoginOutcome::ConnectionLost);
        assert!(ctl.prompter().asked.is_empty());
    }

    #[tokio::test]
    async fn test_login_prompter_failure_aborts() {
        let (port, server) = scripted_server("220 ready", vec!["530 Please login"]).await;
        let mut ctl = controller(port, &[]);

        assert!(ctl.connect().await);
        assert!(matches!(ctl.authenticate().await, LoginOutcome::Rejected(_)));
        assert!(ctl.presenter().saw("no answer scripted"));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_login_rejects_line_break_in_answer() {
        let (port, server) = scripted_server("220 ready", vec!["530 Please login"]).await;
        let mut ctl = controller(port, &["alice\r\nDELE important.txt", "secret"]);

        assert!(ctl.connect().await);
        assert!(matches!(ctl.authenticate().await, LoginOutcome::Rejected(_)));
        assert!(ctl.presenter().saw("must not contain line breaks"));
        assert_eq!(ctl.prompter().asked, vec![USERNAME_PROMPT]);

        // Only the probe reached the server; no USER or DELE line was sent.
        assert_eq!(server.await.unwrap(), vec!["PWD"]);
    }

    #[tokio::test]
    async fn test_quit_after_login() {
        let (port, server) = scripted_server(
            "220 ready",
            vec![
                "530 Please login",
                "331 Password required",
                "230 Logged in",
                "221 Goodbye",
            ],
        )
        .await;
        let mut ctl = controller(port, &["alice", "secret"]);

        assert!(ctl.connect().await);
        assert!(ctl.login().await);
        assert!(ctl.quit().await);
        assert!(!ctl.is_connected());
        assert_eq!(ctl.state(), HandshakeState::Closed);
        assert!(ctl.presenter().saw("221 Goodbye"));

        assert_eq!(server.await.unwrap().last().map(String::as_str), Some("QUIT"));
    }

    #[tokio::test]
    async fn test_quit_without_connection() {
        let mut ctl = controller(21, &[]);
        assert!(!ctl.quit().await);
        assert!(ctl.presenter().messages.is_empty());
    }

    #[test]
    fn test_credentials_debug_masks_password() {
        let credentials = Credentials {
            username: "alice".to_string(),
            password: "secret".to_string(),
        };
        let shown = format!("{:?}", credentials);
        assert!(shown.contains("alice"));
        assert!(!shown.contains("secret"));
    }
}
