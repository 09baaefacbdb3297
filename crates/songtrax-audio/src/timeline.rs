//! Grid to timeline conversion.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use serde::Serialize;
use songtrax_core::{NoteGrid, Pitch, STEPS};

/// Length of every triggered note, in seconds.
pub const NOTE_DURATION: f64 = 0.25;

/// Timing of a built timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimelineConfig {
    /// Seconds per step.
    pub unit_duration: f64,
    /// Steps read from the grid. Clamped to the grid width.
    pub steps: usize,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            unit_duration: 0.25,
            steps: STEPS,
        }
    }
}

/// Notes that start on one step.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEvent {
    pub step: usize,
    /// Seconds from the start of the sequence.
    pub offset: f64,
    /// Active pitches, lowest first.
    pub active_pitches: Vec<Pitch>,
}

impl TimelineEvent {
    pub fn is_silent(&self) -> bool {
        self.active_pitches.is_empty()
    }
}

/// One event per step, in step order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Timeline {
    events: Vec<TimelineEvent>,
    unit_duration: f64,
}

impl Timeline {
    pub fn events(&self) -> &[TimelineEvent] {
        &self.events
    }

    /// Events with at least one pitch.
    pub fn audible_events(&self) -> impl Iterator<Item = &TimelineEvent> + '_ {
        self.events.iter().filter(|event| !event.is_silent())
    }

    pub const fn unit_duration(&self) -> f64 {
        self.unit_duration
    }

    /// Length of the whole sequence, silent steps included.
    pub fn total_duration(&self) -> f64 {
        self.events.len() as f64 * self.unit_duration
    }

    /// Number of note triggers the timeline produces.
    pub fn note_count(&self) -> usize {
        self.events.iter().map(|e| e.active_pitches.len()).sum()
    }

    pub fn is_silent(&self) -> bool {
        self.audible_events().next().is_none()
    }
}

/// Build a timeline with the default timing (16 steps of 0.25 s).
pub fn build_timeline(grid: &NoteGrid) -> Timeline {
    build_timeline_with(grid, &TimelineConfig::default())
}

pub fn build_timeline_with(grid: &NoteGrid, config: &TimelineConfig) -> Timeline {
    let events = (0..config.steps.min(STEPS))
        .map(|step| TimelineEvent {
            step,
            offset: step as f64 * config.unit_duration,
            active_pitches: grid.pitches_at(step).collect(),
        })
        .collect();

    Timeline {
        events,
        unit_duration: config.unit_duration,
    }
}
