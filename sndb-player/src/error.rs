//! Error types for sndb-player
//!
//! Defines the engine's error type using thiserror. Every failure that a
//! playback unit surfaces on its error stream is rendered from one of these
//! variants, so the `Display` text doubles as the user-facing message.

use crate::playback::native::{EngineFault, NativeError};
use crate::playback::state::InvalidTransition;
use thiserror::Error;

/// Main error type for the playback engine
#[derive(Error, Debug)]
pub enum Error {
    /// A command was issued from a state that does not permit it
    #[error("Invalid transition: {0}")]
    InvalidTransition(#[from] InvalidTransition),

    /// Loading or preparing the source failed; the unit keeps its state
    #[error("Source error during {stage}: {source}")]
    Source {
        stage: &'static str,
        #[source]
        source: NativeError,
    },

    /// A start/pause/stop call was rejected by the native player
    #[error("Playback error during {stage}: {source}")]
    Playback {
        stage: &'static str,
        #[source]
        source: NativeError,
    },

    /// Asynchronous fault reported by the native engine
    #[error("{0}")]
    Engine(EngineFault),

    /// No data source configured when one was needed
    #[error("No sound file configured")]
    NoSource,

    /// The unit has reached END and accepts no further commands
    #[error("Player already released")]
    Released,

    /// Creating a native player failed
    #[error("Native player unavailable: {0}")]
    Native(#[from] NativeError),

    /// The serialized command thread could not be started or has gone away
    #[error("Command thread error: {0}")]
    CommandThread(String),
}

/// Result type alias for sndb-player
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::native::{MEDIA_ERROR_IO, MEDIA_ERROR_UNKNOWN};
    use crate::playback::state::UnitCommand;
    use sndb_common::PlayerState;
    use std::path::PathBuf;

    #[test]
    fn test_source_error_names_missing_file() {
        let err = Error::Source {
            stage: "set_data_source",
            source: NativeError::NotFound(PathBuf::from("/sounds/airhorn.mp3")),
        };
        let message = err.to_string();
        assert!(message.contains("set_data_source"));
        assert!(message.contains("airhorn.mp3"));
    }

    #[test]
    fn test_engine_error_uses_fault_description() {
        let err = Error::Engine(EngineFault::new(MEDIA_ERROR_UNKNOWN, MEDIA_ERROR_IO));
        assert_eq!(
            err.to_string(),
            "Unspecified media player error: File or network related operation error"
        );
    }

    #[test]
    fn test_invalid_transition_message() {
        let err: Error = InvalidTransition {
            command: UnitCommand::Prepare,
            from: PlayerState::Idle,
        }
        .into();
        assert_eq!(err.to_string(), "Invalid transition: cannot prepare from state idle");
    }
}
