//! alertmanager-matrix - Alertmanager to Matrix bridge
//!
//! Parses flags, sets up logging and runs the application until it stops.

use alertmanager_matrix::{
    app::App,
    cli::{Cli, LogFormat},
    config,
    settings::Settings,
};
use clap::Parser;
use std::io::IsTerminal;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the global subscriber. `RUST_LOG` wins over `--log.level`.
fn init_logging(settings: &Settings) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_level))?;
    let registry = tracing_subscriber::registry().with(filter);

    match settings.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()?,
        LogFormat::Logfmt => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_ansi(std::io::stdout().is_terminal()),
            )
            .try_init()?,
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match Settings::load(&cli) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{e:#}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(&settings) {
        eprintln!("Failed to initialise logging: {e:#}");
        return ExitCode::FAILURE;
    }

    info!(version = env!("CARGO_PKG_VERSION"), "Starting alertmanager_matrix");

    if cli.config_check {
        return match config::load(&settings.config_file) {
            Ok(_) => {
                info!(path = %settings.config_file.display(), "Config file is ok exiting...");
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!(path = %settings.config_file.display(), error = %e, "Error loading config");
                ExitCode::FAILURE
            }
        };
    }

    let app = match App::builder(settings).build().await {
        Ok(app) => app,
        Err(e) => {
            error!(error = %format!("{e:#}"), "Failed to start");
            return ExitCode::FAILURE;
        }
    };

    app.run().await.exit_code()
}
