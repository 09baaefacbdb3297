//! # Songtrax
//!
//! Command line front end for Songtrax: follow your position to find music
//! shared nearby, and play samples through a small built-in synth.

mod cli;
mod commands;
mod services;

use anyhow::Result;
use clap::Parser;
use cli::{Args, Command};
use commands::track::TrackOptions;
use services::AppServices;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "songtrax=debug,songtrax_core=info,songtrax_api=info,songtrax_audio=info".into()
            }),
        )
        .init();

    let args = Args::parse();
    info!("Starting Songtrax v{}", env!("CARGO_PKG_VERSION"));

    let services = AppServices::new(args.api_config())?;

    let outcome = match args.command {
        Command::Track {
            json,
            autoplay,
            min_distance,
            interval_ms,
            fastest_ms,
        } => {
            let options = TrackOptions {
                json,
                autoplay,
                watch: cli::watch_options(min_distance, interval_ms, fastest_ms),
            };
            commands::track::run(&services, options).await
        }
        Command::Play { sample_id } => commands::play::play(&services, sample_id).await,
        Command::Preview { file, instrument } => {
            commands::play::preview(&services, &file, instrument).await
        }
    };

    services.shutdown();

    if let Err(e) = &outcome {
        error!("{e:#}");
    }
    outcome
}
