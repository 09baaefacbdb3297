//! Endpoint implementations, one module per backend resource.

pub mod locations;
pub mod ratings;
pub mod samples;
