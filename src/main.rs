//! parcel: keep a folder's archive in sync with an S3 bucket.

mod cli;
mod commands;
mod error;
mod logging;

use crate::cli::{Cli, Command};
use crate::error::{ErrorKind, Result};
use clap::Parser;
use parcel_config::ConfigLoader;
use std::process::ExitCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Conventional exit status for a process stopped by SIGINT.
const EXIT_CANCELLED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted; cancelling");
                cancel.cancel();
            }
        }
    });
    if let Some(seconds) = cli.timeout {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(seconds)).await;
            tracing::warn!(seconds, "Timed out; cancelling");
            cancel.cancel();
        });
    }

    let verbose = cli.verbose;
    match run(cli, &cancel).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match verbose {
                true => eprintln!("error: {err:?}"),
                false => eprintln!("error: {}", error::summary(&err)),
            }
            match &*err {
                ErrorKind::Cancelled => ExitCode::from(EXIT_CANCELLED),
                _ => ExitCode::FAILURE,
            }
        },
    }
}

async fn run(cli: Cli, cancel: &CancellationToken) -> Result<()> {
    let mut loader = ConfigLoader::new().overrides(cli.overrides());
    if let Some(path) = &cli.config {
        loader = loader.file(path);
    }
    let config = loader.load().map_err(ErrorKind::config)?;

    match &cli.command {
        Command::Push(args) => commands::push(&config, args, cancel).await,
        Command::Status { folder, force } => commands::status(&config, folder, *force).await,
        Command::Pull { key, output } => commands::pull(&config, key, output, cancel).await,
        Command::List { filter } => commands::list(&config, filter.as_deref(), cancel).await,
    }
}
