use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracker_client::status_service::{self, StatusError};
use tracker_client::{HistoryStore, Tracker, TransportError};

mod config;
mod observability;

#[derive(Parser)]
#[command(version, about = "Reports this deployment once and serves the tracking status")]
struct Cli {
    /// YAML config file. Built-in defaults are used when omitted.
    #[arg(long, global = true)]
    config_file: Option<PathBuf>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Submit a tracking request and print the outcome.
    Track(TrackArgs),
    /// Submit a tracking request at startup, then serve the status page.
    Serve(TrackArgs),
}

#[derive(Args)]
struct TrackArgs {
    /// Send the tracking request to this URL instead of the configured one.
    #[arg(long)]
    tracker_url: Option<String>,
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error("could not create the tracker: {0}")]
    Transport(#[from] TransportError),
    #[error("status service failed: {0}")]
    Status(#[from] StatusError),
    #[error("could not start the runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match &cli.config_file {
        Some(path) => match config::Config::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("{}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => config::Config::default(),
    };

    let _sentry = observability::init_logging(config.common.logging.as_ref());
    if let Some(metrics) = &config.common.metrics {
        if let Err(e) = observability::init_metrics(metrics) {
            tracing::warn!(error = %e, "metrics disabled");
        }
    }

    match run(cli.command, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "exiting");
            ExitCode::FAILURE
        }
    }
}

fn run(command: CliCommand, config: config::Config) -> Result<(), CliError> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    rt.block_on(run_async(command, config))
}

async fn run_async(command: CliCommand, config: config::Config) -> Result<(), CliError> {
    let store = Arc::new(HistoryStore::new());
    let tracker = Arc::new(Tracker::new(&config.tracker, store)?);

    match command {
        CliCommand::Track(args) => {
            tracker.track_with_url(args.tracker_url.as_deref()).await;
            for request in tracker.list_requests() {
                println!(
                    "{} {} -> {} (status {})",
                    request.application_name(),
                    request.application_version(),
                    request.tracking_url(),
                    request.request_status()
                );
            }
            Ok(())
        }
        CliCommand::Serve(args) => {
            let server = status_service::serve(
                &config.listener.host,
                config.listener.port,
                tracker.clone(),
                &config.tracker.status_path,
            );
            let startup = async {
                tracker.track_with_url(args.tracker_url.as_deref()).await;
                Ok::<(), StatusError>(())
            };

            tokio::try_join!(server, startup)?;
            Ok(())
        }
    }
}
