//! Geographic types: positions, tagged locations, and distances between them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Radius around a location inside which a user counts as nearby.
pub const PROXIMITY_THRESHOLD_METRES: f64 = 100.0;

/// Mean equatorial radius used for great-circle distances.
pub const EARTH_RADIUS_METRES: f64 = 6_378_137.0;

/// A point on the globe in decimal degrees.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

impl Position {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Returns true if both coordinates are finite and inside their valid ranges.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Great-circle (haversine) distance to `other` in metres.
    pub fn distance_to(&self, other: &Self) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let d_lat = (other.latitude - self.latitude).to_radians();
        let d_lon = (other.longitude - self.longitude).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        EARTH_RADIUS_METRES * c
    }

    /// Position reached by travelling `metres` due north.
    ///
    /// Inverse of [`Position::distance_to`] along a meridian.
    pub fn offset_north(&self, metres: f64) -> Self {
        let d_lat = (metres / EARTH_RADIUS_METRES).to_degrees();
        Self::new(self.latitude + d_lat, self.longitude)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.latitude, self.longitude)
    }
}

/// Backend identifier of a tagged location.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
#[serde(transparent)]
pub struct LocationId(pub u64);

impl fmt::Display for LocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u64> for LocationId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// A geo-tagged location that samples can be shared to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Location {
    pub id: LocationId,
    pub coordinates: Position,
    /// Display name, when the backend provided one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Location {
    pub const fn new(id: LocationId, coordinates: Position) -> Self {
        Self {
            id,
            coordinates,
            name: None,
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Distance from the user to one location.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DistanceResult {
    pub location_id: LocationId,
    pub metres: f64,
    /// Always equal to `metres <= PROXIMITY_THRESHOLD_METRES`.
    pub within_threshold: bool,
}

impl DistanceResult {
    pub fn new(location_id: LocationId, metres: f64) -> Self {
        Self {
            location_id,
            metres,
            within_threshold: is_within_threshold(metres),
        }
    }
}

/// Returns true if `metres` is inside the proximity radius (inclusive).
pub fn is_within_threshold(metres: f64) -> bool {
    metres <= PROXIMITY_THRESHOLD_METRES
}
