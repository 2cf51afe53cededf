//! Sound descriptors handed to the playback engine

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Maximum volume percentage
pub const MAX_VOLUME: u8 = 100;

/// What the engine needs to know about a sound: where it lives and how loud
/// to play it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoundDescriptor {
    pub path: PathBuf,
    /// Linear volume, 0-100
    pub volume: u8,
}

impl SoundDescriptor {
    /// Create a descriptor, rejecting volumes above 100.
    pub fn new(path: impl Into<PathBuf>, volume: u8) -> Result<Self> {
        if volume > MAX_VOLUME {
            return Err(Error::InvalidInput(format!(
                "volume {} out of range 0-{}",
                volume, MAX_VOLUME
            )));
        }
        Ok(Self {
            path: path.into(),
            volume,
        })
    }

    /// Volume as a gain factor in [0.0, 1.0].
    pub fn gain(&self) -> f32 {
        volume_to_gain(self.volume)
    }
}

/// Convert a 0-100 volume percentage into a linear gain factor.
pub fn volume_to_gain(volume: u8) -> f32 {
    f32::from(volume.min(MAX_VOLUME)) / f32::from(MAX_VOLUME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_rejects_loud_volume() {
        assert!(SoundDescriptor::new("a.mp3", 100).is_ok());
        assert!(matches!(
            SoundDescriptor::new("a.mp3", 101),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_gain() {
        assert_eq!(volume_to_gain(0), 0.0);
        assert_eq!(volume_to_gain(50), 0.5);
        assert_eq!(volume_to_gain(100), 1.0);
        assert_eq!(volume_to_gain(250), 1.0);
    }
}
