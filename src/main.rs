//! windybot: captures the Windy.com weather radar and publishes it to X.
//!
//! Each subcommand is independently invokable: `capture` drives one
//! orchestrator run, `publish` posts the latest capture, `auth` checks the
//! configured credentials, and `serve` runs the local control server.

mod capture;
mod config;
mod paths;
mod publish;
mod server;

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{CaptureConfig, TwitterConfig};
use crate::publish::TwitterPublisher;

#[derive(Parser)]
#[command(name = "windybot", version, about = "Windy.com radar capture and publishing bot")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Capture the radar map once and validate the result
    Capture,
    /// Publish the most recent capture to X
    Publish,
    /// Verify the configured X API credentials
    Auth,
    /// Run the local control server
    Serve {
        #[arg(long, env = "PORT", default_value_t = 3000)]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    spawn_signal_handlers();

    match run(Cli::parse()).await {
        Ok(code) => code,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Command::Capture => {
            let config = CaptureConfig::from_env()?;
            let result = capture::run(&config).await?;
            info!(
                file = %result.file_path.display(),
                size = result.file_size,
                method = ?result.method,
                "capture finished"
            );

            if let Err(err) = paths::clean_old_captures(&config.captures_dir, config.keep_last) {
                warn!("could not prune old captures: {err:#}");
            }

            if result.is_valid() {
                Ok(ExitCode::SUCCESS)
            } else {
                warn!("capture failed size validation, exiting with error");
                Ok(ExitCode::FAILURE)
            }
        }
        Command::Publish => {
            let capture_config = CaptureConfig::from_env()?;
            let twitter_config = TwitterConfig::from_env()?;
            let result = publish::publish_latest(&twitter_config, &capture_config).await?;
            info!(
                tweet = result.tweet_id.as_deref().unwrap_or("?"),
                url = result.tweet_url.as_deref().unwrap_or("?"),
                "published"
            );
            Ok(ExitCode::SUCCESS)
        }
        Command::Auth => {
            let twitter_config = TwitterConfig::from_env()?;
            let publisher = TwitterPublisher::new(twitter_config);
            let user = publisher.verify_credentials().await?;
            info!(username = %user.username, id = %user.id, "credentials valid");
            Ok(ExitCode::SUCCESS)
        }
        Command::Serve { port } => {
            let config = CaptureConfig::from_env()?;
            server::serve(config, port).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Interrupt and terminate force an immediate non-zero exit. The browser, if
/// any, is reclaimed by the OS with the process.
fn spawn_signal_handlers() {
    tokio::spawn(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, exiting");
            std::process::exit(1);
        }
    });

    #[cfg(unix)]
    tokio::spawn(async {
        use tokio::signal::unix::{SignalKind, signal};
        if let Ok(mut term) = signal(SignalKind::terminate()) {
            term.recv().await;
            warn!("terminated, exiting");
            std::process::exit(1);
        }
    });
}
