//! Nearest-location resolution.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::cmp::Ordering;

use crate::types::{DistanceResult, Location, Position};

/// Distance from `position` to every location, nearest first.
///
/// Equal distances are ordered by ascending location id.
pub fn distances(position: &Position, locations: &[Location]) -> Vec<DistanceResult> {
    let mut results: Vec<DistanceResult> = locations
        .iter()
        .map(|location| DistanceResult::new(location.id, position.distance_to(&location.coordinates)))
        .collect();
    results.sort_by(compare);
    results
}

/// The location nearest to `position`.
///
/// Returns `None` only when `locations` is empty. When two locations are
/// exactly equidistant the one with the lowest id wins.
pub fn nearest_location(position: &Position, locations: &[Location]) -> Option<DistanceResult> {
    locations
        .iter()
        .map(|location| DistanceResult::new(location.id, position.distance_to(&location.coordinates)))
        .min_by(compare)
}

fn compare(a: &DistanceResult, b: &DistanceResult) -> Ordering {
    a.metres
        .total_cmp(&b.metres)
        .then_with(|| a.location_id.cmp(&b.location_id))
}
