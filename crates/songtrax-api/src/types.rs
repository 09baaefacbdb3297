//! Raw backend records and their conversion into core types.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use songtrax_core::{
    Error, InstrumentKind, Location, LocationId, NoteGrid, Position, Result, Sample, SampleId,
    SampleLink, SampleRating,
};
use tracing::debug;

/// A coordinate as the backend sends it: usually a decimal string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawCoordinate {
    Number(f64),
    Text(String),
}

impl RawCoordinate {
    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
        }
        .filter(|v: &f64| v.is_finite())
    }
}

/// `location/` row.
#[derive(Debug, Clone, Deserialize)]
pub struct RawLocation {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    pub latitude: RawCoordinate,
    pub longitude: RawCoordinate,
}

impl TryFrom<RawLocation> for Location {
    type Error = Error;

    fn try_from(raw: RawLocation) -> Result<Self> {
        let (Some(latitude), Some(longitude)) = (raw.latitude.value(), raw.longitude.value())
        else {
            return Err(Error::Parse(format!(
                "location {} has unparseable coordinates",
                raw.id
            )));
        };

        let position = Position::new(latitude, longitude);
        if !position.is_valid() {
            return Err(Error::Parse(format!(
                "location {} has out-of-range coordinates {position}",
                raw.id
            )));
        }

        let location = Self::new(LocationId(raw.id), position);
        Ok(match raw.name {
            Some(name) => location.with_name(name),
            None => location,
        })
    }
}

/// `sample/` row.
#[derive(Debug, Clone, Deserialize)]
pub struct RawSample {
    pub id: u64,
    pub name: String,
    #[serde(rename = "type")]
    pub instrument: String,
    /// Grid in wire format, itself JSON-encoded as a string.
    pub recording_data: String,
    #[serde(default)]
    pub datetime: Option<String>,
}

impl TryFrom<RawSample> for Sample {
    type Error = Error;

    fn try_from(raw: RawSample) -> Result<Self> {
        let instrument: InstrumentKind = raw.instrument.parse()?;
        let grid = NoteGrid::from_wire(&raw.recording_data)?;
        let created_at = raw.datetime.as_deref().and_then(parse_datetime);

        Ok(Self {
            id: SampleId(raw.id),
            name: raw.name,
            instrument,
            grid,
            created_at,
        })
    }
}

/// `sampletolocation/` row.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RawSampleLink {
    pub id: u64,
    pub sample_id: u64,
    pub location_id: u64,
}

impl From<RawSampleLink> for SampleLink {
    fn from(raw: RawSampleLink) -> Self {
        Self {
            id: raw.id,
            sample_id: SampleId(raw.sample_id),
            location_id: LocationId(raw.location_id),
        }
    }
}

/// `samplerating/` row.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RawRating {
    pub id: u64,
    pub sample_id: u64,
    pub rating: f64,
}

impl From<RawRating> for SampleRating {
    fn from(raw: RawRating) -> Self {
        Self {
            id: raw.id,
            sample_id: SampleId(raw.sample_id),
            rating: raw.rating.round().clamp(0.0, 5.0) as u8,
        }
    }
}

/// Backend timestamps are RFC 3339, sometimes without an offset (read as UTC).
fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    debug!("Unrecognised sample datetime {raw:?}");
    None
}
