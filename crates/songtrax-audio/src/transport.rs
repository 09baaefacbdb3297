//! The shared playback clock.
//!
//! A [`Transport`] runs jobs at offsets (in seconds) from the moment it was
//! started. Stopping the transport drops every job that has not fired yet.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use songtrax_core::{Error, Result};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

/// A job run by the transport. Receives the offset it was scheduled at.
pub type ScheduledJob = Box<dyn FnOnce(f64) + Send + 'static>;

/// Identity of a scheduled job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScheduleId(pub u64);

pub trait Transport: Send + Sync {
    /// Start the clock. Starting a running transport keeps its origin.
    fn start(&self) -> Result<()>;

    /// Halt the clock and drop all pending jobs.
    fn stop(&self);

    /// Run `job` once, `at` seconds after the clock started.
    fn schedule(&self, at: f64, job: ScheduledJob) -> Result<ScheduleId>;

    /// Drop a pending job. Unknown or already fired ids are ignored.
    fn cancel(&self, id: ScheduleId);

    fn is_running(&self) -> bool;
}

struct Clock {
    origin: Instant,
    runtime: Handle,
}

#[derive(Default)]
struct ClockState {
    clock: Option<Clock>,
    pending: HashMap<ScheduleId, JoinHandle<()>>,
}

/// Transport driven by tokio timers.
#[derive(Default)]
pub struct ClockTransport {
    state: Arc<Mutex<ClockState>>,
    next_id: AtomicU64,
}

impl ClockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Jobs scheduled but not yet fired or cancelled.
    pub fn pending_jobs(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Seconds since the clock started.
    pub fn elapsed(&self) -> Option<f64> {
        self.state
            .lock()
            .clock
            .as_ref()
            .map(|clock| clock.origin.elapsed().as_secs_f64())
    }
}

impl Transport for ClockTransport {
    fn start(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.clock.is_some() {
            return Ok(());
        }

        let runtime = Handle::try_current()
            .map_err(|e| Error::PlaybackUnavailable(format!("no async runtime: {e}")))?;
        state.clock = Some(Clock {
            origin: Instant::now(),
            runtime,
        });
        debug!("Transport started");
        Ok(())
    }

    fn stop(&self) {
        let mut state = self.state.lock();
        let pending = state.pending.len();
        for (_, task) in state.pending.drain() {
            task.abort();
        }
        if state.clock.take().is_some() {
            debug!("Transport stopped, {pending} pending jobs dropped");
        }
    }

    fn schedule(&self, at: f64, job: ScheduledJob) -> Result<ScheduleId> {
        let delay = Duration::try_from_secs_f64(at)
            .map_err(|e| Error::InvalidArgument(format!("bad schedule offset {at}: {e}")))?;

        // Hold the lock across spawn and insert so the job cannot fire
        // before it is registered.
        let mut state = self.state.lock();
        let Some(clock) = state.clock.as_ref() else {
            return Err(Error::PlaybackUnavailable(
                "transport is not running".to_string(),
            ));
        };

        let id = ScheduleId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let deadline = clock.origin + delay;
        let shared = Arc::clone(&self.state);

        let task = clock.runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let live = shared.lock().pending.remove(&id).is_some();
            if live {
                trace!("Firing job {id:?} at {at:.3}s");
                job(at);
            }
        });
        state.pending.insert(id, task);

        Ok(id)
    }

    fn cancel(&self, id: ScheduleId) {
        if let Some(task) = self.state.lock().pending.remove(&id) {
            task.abort();
            trace!("Cancelled job {id:?}");
        }
    }

    fn is_running(&self) -> bool {
        self.state.lock().clock.is_some()
    }
}

impl Drop for ClockTransport {
    fn drop(&mut self) {
        for (_, task) in self.state.lock().pending.drain() {
            task.abort();
        }
    }
}
