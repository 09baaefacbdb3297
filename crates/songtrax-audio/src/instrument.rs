//! Sound sources the playback session drives.

use songtrax_core::{Pitch, Result};

/// Something that can sound a note.
pub trait Instrument: Send + Sync {
    fn name(&self) -> &str;

    /// Make sure the instrument can play. Called before every session run.
    fn ensure_ready(&self) -> Result<()>;

    /// Sound `pitch` for `duration` seconds. `at` is the transport offset
    /// the note was scheduled for.
    fn trigger_note(&self, pitch: Pitch, duration: f64, at: f64) -> Result<()>;
}
