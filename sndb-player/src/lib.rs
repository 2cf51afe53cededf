//! # Soundboard Player Library (sndb-player)
//!
//! Playback engine for a soundboard: each sound is driven by an
//! [`Orchestrator`] that owns one primary playback unit and any number of
//! short-lived parallel units, so a sound can overlap with itself.
//!
//! **Architecture:** explicit per-unit state machine over a native player
//! trait; all native calls serialized on one command thread; state,
//! position and errors exposed as read-only streams. The bundled native
//! player uses symphonia + rubato + cpal.

pub mod audio;
pub mod error;
pub mod playback;
pub mod policy;

pub use error::{Error, Result};
pub use playback::{Orchestrator, PlaybackUnit};
pub use policy::RepressPolicy;
