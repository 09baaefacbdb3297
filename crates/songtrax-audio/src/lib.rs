//! # songtrax-audio
//!
//! Turns a recorded note grid into a timed sequence and plays it.
//!
//! - [`timeline`] converts a [`songtrax_core::NoteGrid`] into step events
//! - [`transport`] is the shared clock callbacks are scheduled on
//! - [`session`] runs at most one preview at a time
//! - [`synth`] renders notes through cpal

pub mod instrument;
pub mod session;
pub mod synth;
pub mod timeline;
pub mod transport;

pub use instrument::Instrument;
pub use session::{PlaybackSession, SessionHandles, SessionState};
pub use synth::{Synth, SynthInstrument};
pub use timeline::{build_timeline, Timeline, TimelineConfig, TimelineEvent, NOTE_DURATION};
pub use transport::{ClockTransport, ScheduleId, ScheduledJob, Transport};
