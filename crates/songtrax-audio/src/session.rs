//! Preview playback.
//!
//! A [`PlaybackSession`] plays one timeline at a time on a shared
//! [`Transport`]. Starting a new run tears the previous one down first, and
//! every scheduled job checks that the run which created it is still the
//! live one before doing anything.
//!
//! The session is a cheap handle: clones share the same state, so an
//! application builds one and hands clones to whoever needs playback.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use songtrax_core::{Error, Pitch, Result};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::instrument::Instrument;
use crate::timeline::{Timeline, NOTE_DURATION};
use crate::transport::{ScheduleId, Transport};

/// Playback state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Playing,
}

/// Handles a session currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionHandles {
    /// Live timeline handles (0 or 1).
    pub timeline: usize,
    /// Scheduled stop callbacks that have not fired (0 or 1).
    pub stop: usize,
}

/// Note jobs scheduled for one run.
#[derive(Debug)]
struct TimelineHandle {
    jobs: Vec<ScheduleId>,
}

#[derive(Debug)]
struct ActiveRun {
    token: u64,
    instrument: String,
    timeline: TimelineHandle,
    stop: Option<ScheduleId>,
}

struct SessionInner {
    run: Option<ActiveRun>,
    next_token: u64,
    state_tx: watch::Sender<SessionState>,
}

impl SessionInner {
    fn is_live(&self, token: u64) -> bool {
        self.run.as_ref().is_some_and(|run| run.token == token)
    }

    fn set_state(&self, state: SessionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!("Session state changed: {previous:?} -> {state:?}");
        }
    }

    /// Release every handle of the live run, if any.
    fn teardown(&mut self, transport: &dyn Transport) -> bool {
        let Some(run) = self.run.take() else {
            return false;
        };
        for id in run.timeline.jobs {
            transport.cancel(id);
        }
        if let Some(id) = run.stop {
            transport.cancel(id);
        }
        transport.stop();
        self.set_state(SessionState::Idle);
        true
    }
}

/// At-most-one-at-a-time player for timelines.
#[derive(Clone)]
pub struct PlaybackSession {
    transport: Arc<dyn Transport>,
    inner: Arc<Mutex<SessionInner>>,
}

impl PlaybackSession {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Idle);
        Self {
            transport,
            inner: Arc::new(Mutex::new(SessionInner {
                run: None,
                next_token: 0,
                state_tx,
            })),
        }
    }

    /// Play `timeline` on `instrument`, replacing whatever is playing.
    ///
    /// Fails with [`Error::PlaybackUnavailable`] if the instrument or the
    /// transport cannot start; the session is then left idle.
    pub fn play(&self, timeline: &Timeline, instrument: Arc<dyn Instrument>) -> Result<()> {
        let mut inner = self.inner.lock();

        if inner.teardown(self.transport.as_ref()) {
            debug!("Replaced running session");
        }

        instrument.ensure_ready().map_err(unavailable)?;
        self.transport.start().map_err(unavailable)?;

        inner.next_token += 1;
        let token = inner.next_token;

        let jobs = match self.schedule_notes(timeline, &instrument, token) {
            Ok(jobs) => jobs,
            Err(e) => {
                self.transport.stop();
                return Err(unavailable(e));
            }
        };

        let stop = match self.schedule_stop(timeline.total_duration(), token) {
            Ok(id) => id,
            Err(e) => {
                for id in jobs {
                    self.transport.cancel(id);
                }
                self.transport.stop();
                return Err(unavailable(e));
            }
        };

        info!(
            "Playing {} notes on {} ({:.2}s)",
            timeline.note_count(),
            instrument.name(),
            timeline.total_duration()
        );

        inner.run = Some(ActiveRun {
            token,
            instrument: instrument.name().to_string(),
            timeline: TimelineHandle { jobs },
            stop: Some(stop),
        });
        inner.set_state(SessionState::Playing);

        Ok(())
    }

    /// Stop playback. Does nothing when idle.
    pub fn stop(&self) {
        if self.inner.lock().teardown(self.transport.as_ref()) {
            info!("Playback stopped");
        }
    }

    /// Stop if playing, otherwise play. Returns the resulting state.
    pub fn toggle(
        &self,
        timeline: &Timeline,
        instrument: Arc<dyn Instrument>,
    ) -> Result<SessionState> {
        if self.is_playing() {
            self.stop();
            Ok(SessionState::Idle)
        } else {
            self.play(timeline, instrument)?;
            Ok(SessionState::Playing)
        }
    }

    pub fn state(&self) -> SessionState {
        if self.inner.lock().run.is_some() {
            SessionState::Playing
        } else {
            SessionState::Idle
        }
    }

    pub fn is_playing(&self) -> bool {
        self.state() == SessionState::Playing
    }

    /// Name of the instrument of the current run.
    pub fn instrument(&self) -> Option<String> {
        self.inner.lock().run.as_ref().map(|run| run.instrument.clone())
    }

    pub fn live_handles(&self) -> SessionHandles {
        self.inner
            .lock()
            .run
            .as_ref()
            .map_or_else(SessionHandles::default, |run| SessionHandles {
                timeline: 1,
                stop: usize::from(run.stop.is_some()),
            })
    }

    /// Watch state changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.lock().state_tx.subscribe()
    }

    /// Wait until the session is idle.
    pub async fn finished(&self) {
        let mut rx = self.subscribe();
        if rx.wait_for(|state| *state == SessionState::Idle).await.is_err() {
            warn!("Session state channel closed");
        }
    }

    fn schedule_notes(
        &self,
        timeline: &Timeline,
        instrument: &Arc<dyn Instrument>,
        token: u64,
    ) -> Result<Vec<ScheduleId>> {
        let mut jobs = Vec::new();

        for event in timeline.audible_events() {
            let weak = Arc::downgrade(&self.inner);
            let instrument = Arc::clone(instrument);
            let pitches: Vec<Pitch> = event.active_pitches.clone();

            let scheduled = self.transport.schedule(
                event.offset,
                Box::new(move |at| {
                    for pitch in pitches {
                        // A trigger may stop the session; later pitches must see it.
                        if !still_live(&weak, token) {
                            return;
                        }
                        if let Err(e) = instrument.trigger_note(pitch, NOTE_DURATION, at) {
                            warn!("Failed to trigger {}: {e}", pitch.note_name());
                        }
                    }
                }),
            );

            match scheduled {
                Ok(id) => jobs.push(id),
                Err(e) => {
                    for id in jobs {
                        self.transport.cancel(id);
                    }
                    return Err(e);
                }
            }
        }

        Ok(jobs)
    }

    fn schedule_stop(&self, at: f64, token: u64) -> Result<ScheduleId> {
        let inner: Weak<Mutex<SessionInner>> = Arc::downgrade(&self.inner);
        let transport: Weak<dyn Transport> = Arc::downgrade(&self.transport);

        self.transport.schedule(
            at,
            Box::new(move |_| {
                let (Some(inner), Some(transport)) = (inner.upgrade(), transport.upgrade()) else {
                    return;
                };
                let mut inner = inner.lock();
                if !inner.is_live(token) {
                    return;
                }
                // This job has already fired; nothing left to cancel for it.
                if let Some(run) = inner.run.as_mut() {
                    run.stop = None;
                }
                inner.teardown(transport.as_ref());
                info!("Playback finished");
            }),
        )
    }
}

fn still_live(inner: &Weak<Mutex<SessionInner>>, token: u64) -> bool {
    inner
        .upgrade()
        .is_some_and(|inner| inner.lock().is_live(token))
}

fn unavailable(e: Error) -> Error {
    match e {
        Error::PlaybackUnavailable(_) => e,
        other => Error::PlaybackUnavailable(other.to_string()),
    }
}
