//! Core domain types for Songtrax.

pub mod geo;
pub mod grid;
pub mod sample;

pub use geo::{
    is_within_threshold, DistanceResult, Location, LocationId, Position, EARTH_RADIUS_METRES,
    PROXIMITY_THRESHOLD_METRES,
};
pub use grid::{NoteGrid, Pitch, PITCHES, STEPS};
pub use sample::{InstrumentKind, Sample, SampleId, SampleLink, SampleRating};
