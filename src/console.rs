//! Interactive collaborators of the handshake
//!
//! The controller asks a [`CredentialPrompter`] for the server address and the
//! credentials, and hands every message meant for the user to a [`Presenter`].
//! The console implementations here back the binary; tests supply their own.

use std::io::BufRead;
use std::thread;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use tokio::io::{AsyncWriteExt, Stdout};
use tokio::sync::mpsc;
use tracing::debug;

/// Prompt for the server host
pub const HOST_PROMPT: &str = "Please enter the IP of the FTP-server that you wish to connect to: ";

/// Prompt for the server port
pub const PORT_PROMPT: &str = "Please enter the port of the FTP-server that you wish to connect to: ";

/// Supplies the connection target and credentials on demand
#[async_trait]
pub trait CredentialPrompter: Send {
    /// Ask for the server host and port, as typed
    async fn connection_target(&mut self) -> anyhow::Result<(String, String)>;

    /// Ask for a single value, e.g. the username or password
    async fn ask(&mut self, label: &str) -> anyhow::Result<String>;
}

/// Displays status and reply text to the user
pub trait Presenter: Send {
    fn present(&mut self, message: &str);
}

/// Prompter reading answers line by line from stdin
///
/// Lines are read on a dedicated thread and handed over through a channel, so
/// a pending prompt can be abandoned (e.g. on Ctrl+C) without a blocked read
/// holding up runtime shutdown.
pub struct ConsolePrompter {
    input: mpsc::Receiver<std::io::Result<String>>,
    output: Stdout,
    /// Answer to the host/port question given up front (e.g. from the command line)
    preset_target: Option<(String, String)>,
}

impl ConsolePrompter {
    pub fn new(preset_target: Option<(String, String)>) -> Self {
        Self::with_input(std::io::BufReader::new(std::io::stdin()), preset_target)
    }

    /// Read answers from `input` instead of stdin
    pub fn with_input<I>(input: I, preset_target: Option<(String, String)>) -> Self
    where
        I: BufRead + Send + 'static,
    {
        Self {
            input: spawn_line_reader(input),
            output: tokio::io::stdout(),
            preset_target,
        }
    }

    async fn read_answer(&mut self, label: &str) -> anyhow::Result<String> {
        self.output.write_all(label.as_bytes()).await?;
        self.output.flush().await?;

        let line = self
            .input
            .recv()
            .await
            .ok_or_else(|| anyhow!("stdin closed while waiting for input"))?
            .context("failed to read from stdin")?;

        Ok(strip_line_terminator(&line).to_string())
    }
}

/// Forward lines from `input` to a channel until EOF, a read error, or the
/// receiving prompter is dropped
fn spawn_line_reader<I>(mut input: I) -> mpsc::Receiver<std::io::Result<String>>
where
    I: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel(1);

    thread::spawn(move || loop {
        let mut line = String::new();
        let message = match input.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => Ok(line),
            Err(e) => Err(e),
        };
        let failed = message.is_err();
        if tx.blocking_send(message).is_err() || failed {
            debug!("Console input reader stopped");
            break;
        }
    });

    rx
}

#[async_trait]
impl CredentialPrompter for ConsolePrompter {
    async fn connection_target(&mut self) -> anyhow::Result<(String, String)> {
        if let Some(target) = self.preset_target.take() {
            return Ok(target);
        }

        let host = self.read_answer(HOST_PROMPT).await?;
        let port = self.read_answer(PORT_PROMPT).await?;
        Ok((host, port))
    }

    async fn ask(&mut self, label: &str) -> anyhow::Result<String> {
        self.read_answer(&format!("{}: ", label)).await
    }
}

/// Presenter printing each message on its own stdout line
#[derive(Debug, Default)]
pub struct ConsolePresenter;

impl Presenter for ConsolePresenter {
    fn present(&mut self, message: &str) {
        println!("{}", message);
    }
}

/// Drop a trailing `\n` or `\r\n`, keeping any other whitespace
pub fn strip_line_terminator(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}
