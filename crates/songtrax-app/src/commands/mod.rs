//! Subcommand implementations.

pub mod play;
pub mod track;
