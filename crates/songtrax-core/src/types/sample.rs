//! Recorded samples and the instruments they are played with.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{LocationId, NoteGrid};
use crate::error::Error;

/// Backend identifier of a sample.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
#[serde(transparent)]
pub struct SampleId(pub u64);

impl fmt::Display for SampleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u64> for SampleId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// The instrument a sample was recorded for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum InstrumentKind {
    Piano,
    #[default]
    Guitar,
    #[serde(rename = "French Horn")]
    FrenchHorn,
    Drums,
}

impl InstrumentKind {
    pub const ALL: [Self; 4] = [Self::Piano, Self::Guitar, Self::FrenchHorn, Self::Drums];

    /// Name as stored by the backend.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Piano => "Piano",
            Self::Guitar => "Guitar",
            Self::FrenchHorn => "French Horn",
            Self::Drums => "Drums",
        }
    }
}

impl fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstrumentKind {
    type Err = Error;

    /// Case-insensitive; accepts `french-horn` and `frenchhorn` as well.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '_'))
            .flat_map(char::to_lowercase)
            .collect();
        match normalized.as_str() {
            "piano" => Ok(Self::Piano),
            "guitar" => Ok(Self::Guitar),
            "frenchhorn" => Ok(Self::FrenchHorn),
            "drums" => Ok(Self::Drums),
            _ => Err(Error::UnknownInstrument(s.to_string())),
        }
    }
}

/// A recorded sample.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Sample {
    pub id: SampleId,
    pub name: String,
    pub instrument: InstrumentKind,
    pub grid: NoteGrid,
    /// When the sample was created, if the backend reported it.
    pub created_at: Option<DateTime<Utc>>,
}

impl Sample {
    pub fn new(id: SampleId, name: impl Into<String>, instrument: InstrumentKind) -> Self {
        Self {
            id,
            name: name.into(),
            instrument,
            grid: NoteGrid::new(),
            created_at: None,
        }
    }

    #[must_use]
    pub const fn with_grid(mut self, grid: NoteGrid) -> Self {
        self.grid = grid;
        self
    }
}

/// A user's rating of a sample.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SampleRating {
    pub id: u64,
    pub sample_id: SampleId,
    /// Star rating, 0 to 5.
    pub rating: u8,
}

/// Link between a sample and a location it was shared to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SampleLink {
    pub id: u64,
    pub sample_id: SampleId,
    pub location_id: LocationId,
}
