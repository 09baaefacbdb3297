//! `play` and `preview`.

use std::path::Path;

use anyhow::{Context, Result};
use songtrax_audio::build_timeline;
use songtrax_core::{InstrumentKind, NoteGrid, Sample, SampleId};
use tracing::{info, warn};

use crate::services::AppServices;

/// Fetch a sample and play it to the end.
pub async fn play(services: &AppServices, id: u64) -> Result<()> {
    let sample = services
        .client()
        .get_sample(SampleId(id))
        .await
        .with_context(|| format!("Failed to load sample {id}"))?;

    match services.client().get_sample_rating(sample.id).await {
        Ok(Some(rating)) => info!("\"{}\" is rated {}/5", sample.name, rating.rating),
        Ok(None) => info!("\"{}\" has no rating yet", sample.name),
        Err(e) => warn!("Could not load rating: {e}"),
    }

    start_sample(services, &sample)?;
    wait_for_playback(services).await;
    Ok(())
}

/// Play a grid stored in a local wire-format file.
pub async fn preview(services: &AppServices, file: &Path, kind: InstrumentKind) -> Result<()> {
    let data = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let grid = NoteGrid::from_wire(&data)
        .with_context(|| format!("{} does not hold a valid grid", file.display()))?;

    let timeline = build_timeline(&grid);
    services
        .session()
        .play(&timeline, services.instrument(kind)?)?;
    info!(
        "Previewing {} on {kind} ({} notes)",
        file.display(),
        timeline.note_count()
    );

    wait_for_playback(services).await;
    Ok(())
}

/// Start `sample` on the shared session without waiting for it.
pub fn start_sample(services: &AppServices, sample: &Sample) -> Result<()> {
    let timeline = build_timeline(&sample.grid);
    let instrument = services.instrument(sample.instrument)?;
    services.session().play(&timeline, instrument)?;
    info!(
        "Playing \"{}\" on {} ({} notes)",
        sample.name,
        sample.instrument,
        timeline.note_count()
    );
    Ok(())
}

/// Wait for the session to stop by itself, or for Ctrl-C.
async fn wait_for_playback(services: &AppServices) {
    let session = services.session();
    tokio::select! {
        () = session.finished() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
            session.stop();
        }
    }
}
