//! Player state vocabulary
//!
//! Types shared between the playback engine and the layers that observe it.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// State of one native player handle, or the aggregated state of a sound.
///
/// `End` is terminal: once a handle reaches it no further transition is
/// permitted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlayerState {
    #[default]
    Idle,
    Initialized,
    Prepared,
    Started,
    Paused,
    Stopped,
    Completed,
    Error,
    End,
}

impl PlayerState {
    /// All states, in declaration order.
    pub const ALL: [PlayerState; 9] = [
        PlayerState::Idle,
        PlayerState::Initialized,
        PlayerState::Prepared,
        PlayerState::Started,
        PlayerState::Paused,
        PlayerState::Stopped,
        PlayerState::Completed,
        PlayerState::Error,
        PlayerState::End,
    ];

    /// True only for `Started`.
    pub fn is_playing(self) -> bool {
        self == PlayerState::Started
    }

    /// True only for `End`.
    pub fn is_terminal(self) -> bool {
        self == PlayerState::End
    }
}

impl std::fmt::Display for PlayerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PlayerState::Idle => "idle",
            PlayerState::Initialized => "initialized",
            PlayerState::Prepared => "prepared",
            PlayerState::Started => "started",
            PlayerState::Paused => "paused",
            PlayerState::Stopped => "stopped",
            PlayerState::Completed => "completed",
            PlayerState::Error => "error",
            PlayerState::End => "end",
        };
        f.write_str(name)
    }
}

/// What a press on an already-sounding sound should do.
///
/// The index is the value persisted by the settings store and must stay stable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum RepressMode {
    /// Stop the sound.
    #[default]
    Stop,
    /// Restart the sound from the beginning.
    Restart,
    /// Start another overlapping instance of the sound.
    Overlap,
    /// Pause the sound.
    Pause,
}

impl RepressMode {
    /// Stable persisted index.
    pub fn index(self) -> u8 {
        match self {
            RepressMode::Stop => 0,
            RepressMode::Restart => 1,
            RepressMode::Overlap => 2,
            RepressMode::Pause => 3,
        }
    }

    /// Inverse of [`RepressMode::index`].
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(RepressMode::Stop),
            1 => Some(RepressMode::Restart),
            2 => Some(RepressMode::Overlap),
            3 => Some(RepressMode::Pause),
            _ => None,
        }
    }
}

impl std::fmt::Display for RepressMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RepressMode::Stop => write!(f, "stop"),
            RepressMode::Restart => write!(f, "restart"),
            RepressMode::Overlap => write!(f, "overlap"),
            RepressMode::Pause => write!(f, "pause"),
        }
    }
}

impl FromStr for RepressMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stop" => Ok(RepressMode::Stop),
            "restart" => Ok(RepressMode::Restart),
            "overlap" => Ok(RepressMode::Overlap),
            "pause" => Ok(RepressMode::Pause),
            other => Err(Error::InvalidInput(format!(
                "unknown repress mode '{}' (expected stop, restart, overlap or pause)",
                other
            ))),
        }
    }
}
