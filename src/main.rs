//! FTP login client - Entry point
//!
//! Parses CLI arguments, then connects, logs in and quits, talking to the user
//! on stdin/stdout. Exits with status 0 only when the login succeeded.

use std::process::ExitCode;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ftp_login::config::{Args, Config};
use ftp_login::console::{ConsolePresenter, ConsolePrompter, CredentialPrompter, Presenter};
use ftp_login::error::Result;
use ftp_login::ftp::HandshakeController;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments
    let args = Args::parse();

    // Validate and create config
    let config = Config::from_args(args)?;

    // Logs go to stderr; stdout carries prompts and server replies
    let default_filter = if config.verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    info!("FTP login client v{} starting...", env!("CARGO_PKG_VERSION"));
    info!(
        "Connect timeout: {}s, read timeout: {}, probe: {}",
        config.connect_timeout.as_secs(),
        config
            .read_timeout
            .map_or("none".to_string(), |t| format!("{}s", t.as_secs())),
        config.probe
    );

    let mut controller = HandshakeController::new(
        ConsolePrompter::new(config.target.clone()),
        ConsolePresenter,
        config.session_config(),
    );

    let logged_in = tokio::select! {
        logged_in = run(&mut controller) => logged_in,
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT (Ctrl+C), shutting down...");
            false
        }
    };

    if logged_in {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

async fn run<P, R>(controller: &mut HandshakeController<P, R>) -> bool
where
    P: CredentialPrompter,
    R: Presenter,
{
    if !controller.connect().await {
        return false;
    }

    let logged_in = controller.login().await;

    if controller.is_connected() && !controller.quit().await {
        warn!("Server did not acknowledge QUIT");
    }

    logged_in
}
