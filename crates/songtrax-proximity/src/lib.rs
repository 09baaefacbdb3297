//! # songtrax-proximity
//!
//! Tracks the user's position and reports whether they are standing near a
//! tagged location that has samples shared to it.
//!
//! Positions come from a [`PositionSource`]; sample existence is checked
//! through a [`songtrax_core::SampleDirectory`]. The [`ProximityTracker`]
//! ties the two together and processes readings strictly in arrival order.

pub mod source;
pub mod tracker;

pub use source::{
    ChannelPositionSource, Permission, PositionSource, Subscription, SubscriptionId, WatchOptions,
};
pub use tracker::{
    ProximityEvents, ProximitySignal, ProximitySnapshot, ProximityTracker, ProximityUpdate,
};
