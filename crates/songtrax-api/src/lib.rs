//! # songtrax-api
//!
//! Client for the Songtrax REST backend.
//!
//! Only the read side the app needs is covered: locations, samples, the
//! links between them, and ratings. The client also implements
//! [`songtrax_core::SampleDirectory`] so it can feed the proximity tracker.

pub mod client;
pub mod config;
pub mod endpoints;
pub mod types;

pub use client::SongtraxClient;
pub use config::ApiConfig;
