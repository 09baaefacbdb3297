//! The 7×16 note grid a sample is recorded into, and its wire format.
//!
//! On the wire a grid is a JSON array of seven single-key objects, one per
//! pitch, each mapping the pitch letter to sixteen booleans:
//!
//! ```json
//! [{"B":[false, ...]},{"A":[...]},{"G":[...]},{"F":[...]},{"E":[...]},{"D":[...]},{"C":[...]}]
//! ```
//!
//! Rows are always written in that order (highest pitch first). Reading
//! accepts any row order as long as every pitch appears exactly once.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Number of time steps in a grid row.
pub const STEPS: usize = 16;

/// Number of pitch rows in a grid.
pub const PITCHES: usize = 7;

/// A natural pitch class. All pitches sound in octave 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Pitch {
    C,
    D,
    E,
    F,
    G,
    A,
    B,
}

impl Pitch {
    /// All pitches, lowest first.
    pub const ALL: [Self; PITCHES] = [
        Self::C,
        Self::D,
        Self::E,
        Self::F,
        Self::G,
        Self::A,
        Self::B,
    ];

    /// Row order used by the wire format, highest first.
    pub const WIRE_ORDER: [Self; PITCHES] = [
        Self::B,
        Self::A,
        Self::G,
        Self::F,
        Self::E,
        Self::D,
        Self::C,
    ];

    pub const fn letter(self) -> &'static str {
        match self {
            Self::C => "C",
            Self::D => "D",
            Self::E => "E",
            Self::F => "F",
            Self::G => "G",
            Self::A => "A",
            Self::B => "B",
        }
    }

    /// Scientific pitch name, e.g. `C3`.
    pub const fn note_name(self) -> &'static str {
        match self {
            Self::C => "C3",
            Self::D => "D3",
            Self::E => "E3",
            Self::F => "F3",
            Self::G => "G3",
            Self::A => "A3",
            Self::B => "B3",
        }
    }

    /// MIDI note number of the pitch in octave 3.
    pub const fn midi_note(self) -> u8 {
        match self {
            Self::C => 48,
            Self::D => 50,
            Self::E => 52,
            Self::F => 53,
            Self::G => 55,
            Self::A => 57,
            Self::B => 59,
        }
    }

    /// Frequency in Hz (equal temperament, A4 = 440 Hz).
    pub fn frequency(self) -> f32 {
        440.0 * 2.0_f32.powf((f32::from(self.midi_note()) - 69.0) / 12.0)
    }

    const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Pitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.letter())
    }
}

impl FromStr for Pitch {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "C" => Ok(Self::C),
            "D" => Ok(Self::D),
            "E" => Ok(Self::E),
            "F" => Ok(Self::F),
            "G" => Ok(Self::G),
            "A" => Ok(Self::A),
            "B" => Ok(Self::B),
            other => Err(Error::MalformedGridData(format!("unknown pitch '{other}'"))),
        }
    }
}

/// A 7×16 toggle matrix of pitch × time step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "WireGrid", into = "WireGrid")]
pub struct NoteGrid {
    rows: [[bool; STEPS]; PITCHES],
}

impl NoteGrid {
    /// An empty grid.
    pub const fn new() -> Self {
        Self {
            rows: [[false; STEPS]; PITCHES],
        }
    }

    /// Whether `pitch` is toggled on at `step`. Out-of-range steps read as off.
    pub fn get(&self, pitch: Pitch, step: usize) -> bool {
        self.rows[pitch.index()].get(step).copied().unwrap_or(false)
    }

    /// Set a cell. Out-of-range steps are ignored.
    pub fn set(&mut self, pitch: Pitch, step: usize, value: bool) {
        if let Some(cell) = self.rows[pitch.index()].get_mut(step) {
            *cell = value;
        }
    }

    pub fn toggle(&mut self, pitch: Pitch, step: usize) {
        let current = self.get(pitch, step);
        self.set(pitch, step, !current);
    }

    /// The sixteen steps of one pitch row.
    pub const fn row(&self, pitch: Pitch) -> &[bool; STEPS] {
        &self.rows[pitch.index()]
    }

    /// Pitches toggled on at `step`, lowest first.
    pub fn pitches_at(&self, step: usize) -> impl Iterator<Item = Pitch> + '_ {
        Pitch::ALL
            .into_iter()
            .filter(move |&pitch| self.get(pitch, step))
    }

    /// Number of cells toggled on.
    pub fn active_count(&self) -> usize {
        self.rows.iter().flatten().filter(|&&on| on).count()
    }

    pub fn is_empty(&self) -> bool {
        self.active_count() == 0
    }

    /// Parse the wire representation stored in a sample's `recording_data`.
    pub fn from_wire(data: &str) -> Result<Self> {
        let wire: WireGrid = serde_json::from_str(data)
            .map_err(|e| Error::MalformedGridData(format!("invalid grid JSON: {e}")))?;
        Self::try_from(wire)
    }

    /// Render the wire representation.
    pub fn to_wire(&self) -> Result<String> {
        Ok(serde_json::to_string(&WireGrid::from(*self))?)
    }
}

/// Serde mirror of the wire format: a list of single-key rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
struct WireGrid(Vec<BTreeMap<String, Vec<bool>>>);

impl From<NoteGrid> for WireGrid {
    fn from(grid: NoteGrid) -> Self {
        Self(
            Pitch::WIRE_ORDER
                .iter()
                .map(|&pitch| {
                    let mut row = BTreeMap::new();
                    row.insert(pitch.letter().to_string(), grid.row(pitch).to_vec());
                    row
                })
                .collect(),
        )
    }
}

impl TryFrom<WireGrid> for NoteGrid {
    type Error = Error;

    fn try_from(wire: WireGrid) -> Result<Self> {
        if wire.0.len() != PITCHES {
            return Err(Error::MalformedGridData(format!(
                "expected {PITCHES} rows, found {}",
                wire.0.len()
            )));
        }

        let mut grid = Self::new();
        let mut seen = [false; PITCHES];

        for (index, row) in wire.0.into_iter().enumerate() {
            let mut entries = row.into_iter();
            let (Some((letter, steps)), None) = (entries.next(), entries.next()) else {
                return Err(Error::MalformedGridData(format!(
                    "row {index} must have exactly one pitch key"
                )));
            };

            let pitch: Pitch = letter.parse()?;
            if std::mem::replace(&mut seen[pitch.index()], true) {
                return Err(Error::MalformedGridData(format!(
                    "pitch {pitch} appears more than once"
                )));
            }

            let steps: [bool; STEPS] = steps.try_into().map_err(|steps: Vec<bool>| {
                Error::MalformedGridData(format!(
                    "row {pitch} has {} steps, expected {STEPS}",
                    steps.len()
                ))
            })?;
            grid.rows[pitch.index()] = steps;
        }

        Ok(grid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn empty_row_json(letter: &str) -> String {
        format!("{{\"{letter}\":{}}}", serde_json::to_string(&[false; STEPS]).unwrap())
    }

    #[test]
    fn test_toggle_and_get() {
        let mut grid = NoteGrid::new();
        assert!(grid.is_empty());

        grid.toggle(Pitch::C, 0);
        grid.toggle(Pitch::C, 4);
        assert!(grid.get(Pitch::C, 0));
        assert!(grid.get(Pitch::C, 4));
        assert!(!grid.get(Pitch::D, 0));
        assert_eq!(grid.active_count(), 2);

        grid.toggle(Pitch::C, 4);
        assert!(!grid.get(Pitch::C, 4));
    }

    #[test]
    fn test_out_of_range_steps_are_ignored() {
        let mut grid = NoteGrid::new();
        grid.set(Pitch::A, STEPS, true);
        assert!(!grid.get(Pitch::A, STEPS));
        assert!(grid.is_empty());
    }

    #[test]
    fn test_wire_rows_are_highest_pitch_first() {
        let mut grid = NoteGrid::new();
        grid.set(Pitch::B, 15, true);
        let wire = grid.to_wire().unwrap();

        let value: serde_json::Value = serde_json::from_str(&wire).unwrap();
        let rows = value.as_array().unwrap();
        assert_eq!(rows.len(), 7);
        let letters: Vec<&str> = rows
            .iter()
            .map(|row| row.as_object().unwrap().keys().next().unwrap().as_str())
            .collect();
        assert_eq!(letters, ["B", "A", "G", "F", "E", "D", "C"]);
        assert_eq!(rows[0]["B"][15], serde_json::Value::Bool(true));
    }

    #[test]
    fn test_from_wire_accepts_any_row_order() {
        let rows: Vec<String> = ["C", "D", "E", "F", "G", "A", "B"]
            .iter()
            .map(|l| empty_row_json(l))
            .collect();
        let grid = NoteGrid::from_wire(&format!("[{}]", rows.join(","))).unwrap();
        assert!(grid.is_empty());
    }

    #[test]
    fn test_from_wire_rejects_missing_row() {
        let rows: Vec<String> = ["B", "A", "G", "F", "E", "D"]
            .iter()
            .map(|l| empty_row_json(l))
            .collect();
        let err = NoteGrid::from_wire(&format!("[{}]", rows.join(","))).unwrap_err();
        assert!(matches!(err, Error::MalformedGridData(_)));
    }

    #[test]
    fn test_from_wire_rejects_duplicate_pitch() {
        let rows: Vec<String> = ["B", "B", "G", "F", "E", "D", "C"]
            .iter()
            .map(|l| empty_row_json(l))
            .collect();
        let err = NoteGrid::from_wire(&format!("[{}]", rows.join(","))).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_from_wire_rejects_short_row() {
        let mut rows: Vec<String> = ["B", "A", "G", "F", "E", "D"]
            .iter()
            .map(|l| empty_row_json(l))
            .collect();
        rows.push("{\"C\":[true,false]}".to_string());
        let err = NoteGrid::from_wire(&format!("[{}]", rows.join(","))).unwrap_err();
        assert!(err.to_string().contains("has 2 steps"));
    }

    #[test]
    fn test_from_wire_rejects_multi_key_row_and_garbage() {
        let mut rows: Vec<String> = ["B", "A", "G", "F", "E", "D"]
            .iter()
            .map(|l| empty_row_json(l))
            .collect();
        rows.push(format!(
            "{{\"C\":{0},\"X\":{0}}}",
            serde_json::to_string(&[false; STEPS]).unwrap()
        ));
        assert!(NoteGrid::from_wire(&format!("[{}]", rows.join(","))).is_err());
        assert!(matches!(
            NoteGrid::from_wire("not json"),
            Err(Error::MalformedGridData(_))
        ));
        assert!(matches!(
            NoteGrid::from_wire("{\"B\":[]}"),
            Err(Error::MalformedGridData(_))
        ));
    }

    #[test]
    fn test_unknown_pitch_letter() {
        let mut rows: Vec<String> = ["B", "A", "G", "F", "E", "D"]
            .iter()
            .map(|l| empty_row_json(l))
            .collect();
        rows.push(empty_row_json("H"));
        let err = NoteGrid::from_wire(&format!("[{}]", rows.join(","))).unwrap_err();
        assert!(err.to_string().contains("unknown pitch 'H'"));
    }

    #[test]
    fn test_pitch_frequencies() {
        assert!((Pitch::A.frequency() - 220.0).abs() < 0.01);
        assert!((Pitch::C.frequency() - 130.81).abs() < 0.01);
        assert_eq!(Pitch::G.note_name(), "G3");
    }

    fn arb_grid() -> impl Strategy<Value = NoteGrid> {
        proptest::collection::vec(any::<bool>(), STEPS * PITCHES).prop_map(|cells| {
            let mut grid = NoteGrid::new();
            for (i, on) in cells.into_iter().enumerate() {
                grid.set(Pitch::ALL[i / STEPS], i % STEPS, on);
            }
            grid
        })
    }

    proptest! {
        #[test]
        fn prop_wire_format_is_lossless(grid in arb_grid()) {
            let wire = grid.to_wire().unwrap();
            prop_assert_eq!(NoteGrid::from_wire(&wire).unwrap(), grid);
        }
    }
}
