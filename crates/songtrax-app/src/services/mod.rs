//! Process-wide services shared by every command.
//!
//! - Backend client
//! - The single playback session (and the synth behind it)
//! - Position input for proximity tracking

pub mod position;

use std::sync::Arc;

use parking_lot::Mutex;
use songtrax_api::{ApiConfig, SongtraxClient};
use songtrax_audio::{ClockTransport, Instrument, PlaybackSession, Synth, SynthInstrument};
use songtrax_core::{InstrumentKind, Result};
use tracing::{debug, info, warn};

/// Everything a command needs, built once in `main`.
pub struct AppServices {
    client: SongtraxClient,
    session: PlaybackSession,
    /// Opened on first use; tracking alone never touches the audio device.
    synth: Mutex<Option<Arc<Synth>>>,
}

impl AppServices {
    pub fn new(config: ApiConfig) -> Result<Self> {
        info!("Using backend at {}", config.base_url);
        let client = SongtraxClient::with_config(config)?;
        let session = PlaybackSession::new(Arc::new(ClockTransport::new()));

        Ok(Self {
            client,
            session,
            synth: Mutex::new(None),
        })
    }

    pub const fn client(&self) -> &SongtraxClient {
        &self.client
    }

    /// A handle to the one playback session of this process.
    pub fn session(&self) -> PlaybackSession {
        self.session.clone()
    }

    /// An instrument of `kind` voiced by the shared synth.
    pub fn instrument(&self, kind: InstrumentKind) -> Result<Arc<dyn Instrument>> {
        let mut slot = self.synth.lock();
        let synth = match slot.as_ref().filter(|synth| synth.is_alive()) {
            Some(synth) => Arc::clone(synth),
            None => {
                let synth = Arc::new(Synth::new()?);
                info!("Playing through {}", synth.device_name());
                *slot = Some(Arc::clone(&synth));
                synth
            }
        };
        Ok(Arc::new(SynthInstrument::new(synth, kind)))
    }

    /// Stop playback and release the audio device.
    pub fn shutdown(&self) {
        self.session.stop();
        if let Some(synth) = self.synth.lock().take() {
            if let Err(e) = synth.all_notes_off() {
                warn!("Failed to silence synth: {e}");
            }
            debug!("Synth released");
        }
    }
}
