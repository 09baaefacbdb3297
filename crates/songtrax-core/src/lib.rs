//! # songtrax-core
//!
//! Core types, traits, and error handling for Songtrax, the location-aware
//! music sharing app.

pub mod directory;
pub mod distance;
pub mod error;
pub mod types;

pub use directory::SampleDirectory;
pub use distance::{distances, nearest_location};
pub use error::{Error, HttpError, Result};
pub use types::*;
