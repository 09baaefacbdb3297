//! Command line arguments.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use songtrax_api::ApiConfig;
use songtrax_core::InstrumentKind;
use songtrax_proximity::WatchOptions;

/// Share music samples at the places they were made.
#[derive(Parser, Debug)]
#[command(name = "songtrax", version)]
#[command(about = "Location-aware music sample sharing")]
pub struct Args {
    /// Backend root URL (overrides SONGTRAX_API_URL)
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Backend API key (overrides SONGTRAX_API_KEY)
    #[arg(long, global = true)]
    pub api_key: Option<String>,

    /// Request timeout in seconds (overrides SONGTRAX_API_TIMEOUT_SECS)
    #[arg(long, global = true)]
    pub timeout_secs: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Follow `lat,lon` lines from stdin and report nearby locations
    Track {
        /// Print every update as a JSON line
        #[arg(long)]
        json: bool,

        /// Play the first sample shared at a location on arrival
        #[arg(long)]
        autoplay: bool,

        /// Ignore movements shorter than this many metres
        #[arg(long, default_value = "10")]
        min_distance: f64,

        /// Time between readings fed from stdin, in milliseconds
        #[arg(long, default_value = "1000")]
        interval_ms: u64,

        /// Minimum time between readings, in milliseconds
        #[arg(long, default_value = "500")]
        fastest_ms: u64,
    },

    /// Fetch a sample from the backend and play it
    Play {
        /// Sample id
        sample_id: u64,
    },

    /// Play a grid stored in a local file
    Preview {
        /// File holding the grid in its JSON wire format
        file: PathBuf,

        /// Piano, Guitar, "French Horn" or Drums
        #[arg(short, long, default_value = "Guitar")]
        instrument: InstrumentKind,
    },
}

impl Args {
    /// Backend settings: environment first, then explicit flags.
    pub fn api_config(&self) -> ApiConfig {
        self.apply_overrides(ApiConfig::from_env())
    }

    fn apply_overrides(&self, mut config: ApiConfig) -> ApiConfig {
        if let Some(url) = &self.api_url {
            config = config.with_base_url(url.clone());
        }
        if let Some(key) = &self.api_key {
            config = config.with_api_key(key.clone());
        }
        if let Some(secs) = self.timeout_secs.filter(|&s| s > 0) {
            config = config.with_timeout(Duration::from_secs(secs));
        }
        config
    }
}

/// Watch settings for the `track` command.
pub fn watch_options(min_distance: f64, interval_ms: u64, fastest_ms: u64) -> WatchOptions {
    WatchOptions {
        min_distance_metres: min_distance.max(0.0),
        interval: Duration::from_millis(interval_ms),
        fastest_interval: Duration::from_millis(fastest_ms),
    }
}
