//! `track`: proximity tracking driven by stdin.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use songtrax_core::{
    InstrumentKind, Location, LocationId, Sample, SampleDirectory, SampleId, SampleRating,
};
use songtrax_proximity::{
    ChannelPositionSource, PositionSource, ProximitySignal, ProximityTracker, ProximityUpdate,
    WatchOptions,
};
use tokio::io::BufReader;
use tracing::{error, info, warn};

use crate::commands::play::start_sample;
use crate::services::position::feed_positions;
use crate::services::AppServices;

pub struct TrackOptions {
    pub json: bool,
    pub autoplay: bool,
    pub watch: WatchOptions,
}

/// A sample shared at a location the user just reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbySample {
    pub location_id: LocationId,
    pub sample_id: SampleId,
    pub name: String,
    pub instrument: InstrumentKind,
    pub created_at: Option<DateTime<Utc>>,
    /// 0 until someone rates it.
    pub rating: u8,
    pub notes: usize,
}

impl NearbySample {
    pub fn new(location_id: LocationId, sample: &Sample, rating: Option<SampleRating>) -> Self {
        Self {
            location_id,
            sample_id: sample.id,
            name: sample.name.clone(),
            instrument: sample.instrument,
            created_at: sample.created_at,
            rating: rating.map_or(0, |r| r.rating),
            notes: sample.grid.active_count(),
        }
    }

    fn describe(&self) -> String {
        let created = self
            .created_at
            .map_or_else(|| "unknown date".to_string(), |at| at.format("%Y-%m-%d").to_string());
        format!(
            "\"{}\" (#{}, {}, {} notes) shared {created}, rated {}/5",
            self.name, self.sample_id, self.instrument, self.notes, self.rating
        )
    }
}

/// One line of `--json` output.
#[derive(Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
enum TrackEvent<'a> {
    Update(&'a ProximityUpdate),
    Sample(&'a NearbySample),
}

pub async fn run(services: &AppServices, options: TrackOptions) -> Result<()> {
    let locations = services
        .client()
        .get_locations()
        .await
        .context("Failed to load locations")?;
    if locations.is_empty() {
        warn!("The backend has no locations; nothing will ever be nearby");
    }
    info!("Loaded {} locations", locations.len());

    let source = Arc::new(ChannelPositionSource::default());
    let directory: Arc<dyn SampleDirectory> = Arc::new(services.client().clone());
    let positions: Arc<dyn PositionSource> = source.clone();
    let tracker = ProximityTracker::new(positions, directory).with_options(options.watch);

    let mut events = tracker.start(locations.clone()).await?;

    let feeder = {
        let source = Arc::clone(&source);
        let pace = options
            .watch
            .interval
            .max(options.watch.fastest_interval)
            .max(Duration::from_millis(1));
        tokio::spawn(async move {
            feed_positions(BufReader::new(tokio::io::stdin()), &source, pace).await;
        })
    };

    let mut last = ProximitySignal::NotNearby;
    loop {
        tokio::select! {
            update = events.recv() => {
                let Some(update) = update else { break };
                report_update(&options, &locations, &update);
                if update.signal != last {
                    on_change(services, &options, &locations, update.signal).await?;
                    last = update.signal;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    tracker.stop().await;
    feeder.abort();

    let snapshot = tracker.snapshot();
    info!(
        "Tracking ended: {:?}, selected location {:?}",
        snapshot.signal, snapshot.selected_location
    );
    Ok(())
}

fn emit_json(event: &TrackEvent<'_>) {
    match serde_json::to_string(event) {
        Ok(line) => println!("{line}"),
        Err(e) => error!("Failed to encode event: {e}"),
    }
}

fn report_update(options: &TrackOptions, locations: &[Location], update: &ProximityUpdate) {
    if options.json {
        emit_json(&TrackEvent::Update(update));
        return;
    }

    match update.result {
        Some(nearest) => info!(
            "At {}: nearest is {} ({:.0} m)",
            update.position,
            location_name(locations, nearest.location_id),
            nearest.metres
        ),
        None => info!("At {}: no locations", update.position),
    }
}

async fn on_change(
    services: &AppServices,
    options: &TrackOptions,
    locations: &[Location],
    signal: ProximitySignal,
) -> Result<()> {
    match signal {
        ProximitySignal::Nearby(id) => {
            info!("Music nearby at {}", location_name(locations, id));
            let samples = match services.client().get_samples_at(id).await {
                Ok(samples) => samples,
                Err(e) if !e.is_recoverable() => return Err(e.into()),
                Err(e) => {
                    warn!("Could not list samples at location {id}: {e}");
                    return Ok(());
                }
            };

            for sample in &samples {
                let listing = NearbySample::new(id, sample, rating_of(services, sample.id).await);
                if options.json {
                    emit_json(&TrackEvent::Sample(&listing));
                } else {
                    info!("  {}", listing.describe());
                }
            }

            if options.autoplay {
                autoplay(services, id, &samples)?;
            }
        }
        ProximitySignal::NotNearby => {
            info!("No music nearby");
            if options.autoplay {
                services.session().stop();
            }
        }
    }
    Ok(())
}

async fn rating_of(services: &AppServices, sample: SampleId) -> Option<SampleRating> {
    match services.client().get_sample_rating(sample).await {
        Ok(rating) => rating,
        Err(e) => {
            warn!("Could not load rating of sample {sample}: {e}");
            None
        }
    }
}

fn autoplay(services: &AppServices, location: LocationId, samples: &[Sample]) -> Result<()> {
    let Some(sample) = samples.first() else {
        warn!("Location {location} reported samples but none could be loaded");
        return Ok(());
    };
    if let Err(e) = start_sample(services, sample) {
        match e.downcast_ref::<songtrax_core::Error>() {
            Some(inner) if !inner.is_recoverable() => return Err(e),
            _ => warn!("Autoplay failed: {e:#}"),
        }
    }
    Ok(())
}

fn location_name(locations: &[Location], id: LocationId) -> String {
    locations
        .iter()
        .find(|l| l.id == id)
        .and_then(|l| l.name.clone())
        .unwrap_or_else(|| format!("location {id}"))
}
