//! # Soundboard Common Library
//!
//! Shared code for the soundboard playback crates:
//! - Player state vocabulary (`PlayerState`, `RepressMode`)
//! - Sound descriptors handed to the playback engine
//! - Engine configuration loading
//! - Common error type

pub mod config;
pub mod error;
pub mod events;
pub mod sound;

pub use config::EngineConfig;
pub use error::{Error, Result};
pub use events::{PlayerState, RepressMode};
pub use sound::SoundDescriptor;
