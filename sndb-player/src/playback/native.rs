//! Native player boundary
//!
//! The playback unit drives an engine through [`NativePlayer`]. The engine
//! may report completion and faults asynchronously through an installed
//! [`NativeEventSink`], from whatever thread it runs its callbacks on.
//! Position is exposed separately through a [`ProgressProbe`] so that
//! observers can sample it without going through the command thread.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Unspecified engine failure.
pub const MEDIA_ERROR_UNKNOWN: i32 = 1;
/// The engine process went away.
pub const MEDIA_ERROR_SERVER_DIED: i32 = 100;
/// File or network related operation error.
pub const MEDIA_ERROR_IO: i32 = -1004;
/// Bitstream does not conform to its coding standard.
pub const MEDIA_ERROR_MALFORMED: i32 = -1007;
/// Bitstream is valid but uses an unsupported feature.
pub const MEDIA_ERROR_UNSUPPORTED: i32 = -1010;
/// An operation took too long.
pub const MEDIA_ERROR_TIMED_OUT: i32 = -110;

/// Engine fault signal pair, as delivered through [`NativeEvent::Failed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EngineFault {
    pub what: i32,
    pub extra: i32,
}

impl EngineFault {
    pub fn new(what: i32, extra: i32) -> Self {
        Self { what, extra }
    }

    /// Human readable `"<what>: <extra>"` text.
    pub fn describe(&self) -> String {
        format!("{}: {}", describe_what(self.what), describe_extra(self.extra))
    }
}

impl fmt::Display for EngineFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

fn describe_what(what: i32) -> String {
    match what {
        MEDIA_ERROR_UNKNOWN => "Unspecified media player error".to_string(),
        MEDIA_ERROR_SERVER_DIED => "Media server died".to_string(),
        other => format!("Other ({})", other),
    }
}

fn describe_extra(extra: i32) -> String {
    match extra {
        MEDIA_ERROR_IO => "File or network related operation error".to_string(),
        MEDIA_ERROR_MALFORMED => {
            "Bitstream is not conforming to the related coding standard or file spec".to_string()
        }
        MEDIA_ERROR_UNSUPPORTED => "Bitstream is conforming to the related coding standard or file spec, but the media framework does not support the feature".to_string(),
        MEDIA_ERROR_TIMED_OUT => {
            "Some operation takes too long to complete, usually more than 3-5 seconds".to_string()
        }
        other => format!("Other ({})", other),
    }
}

/// Asynchronous notification from a native player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeEvent {
    /// Playback ran to the end of the source.
    Completed,
    /// The engine failed while playing.
    Failed(EngineFault),
}

/// Callback installed on a native player; may be invoked from any thread.
pub type NativeEventSink = Arc<dyn Fn(NativeEvent) + Send + Sync>;

/// Synchronous failure of a native player call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NativeError {
    #[error("File not found: {}", file_label(.0))]
    NotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Unsupported format: {0}")]
    Unsupported(String),

    #[error("Malformed file: {0}")]
    Malformed(String),

    #[error("Audio device error: {0}")]
    Device(String),

    #[error("Illegal state: {0}")]
    IllegalState(String),
}

impl NativeError {
    /// Whether retrying the same source can never succeed.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            NativeError::NotFound(_) | NativeError::Unsupported(_) | NativeError::Malformed(_)
        )
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Read-only view of a native player's progress.
pub trait ProgressProbe: Send + Sync {
    /// Current playback position in milliseconds.
    fn position_ms(&self) -> u64;

    /// Source duration in milliseconds, once known.
    fn duration_ms(&self) -> Option<u64>;

    /// Position as a whole percentage of the duration.
    fn percent(&self) -> u8 {
        percent_of(self.position_ms(), self.duration_ms())
    }
}

/// `min(round(position / duration * 100), 100)`, or 0 without a duration.
pub fn percent_of(position_ms: u64, duration_ms: Option<u64>) -> u8 {
    match duration_ms {
        Some(duration) if duration > 0 => {
            let percent = (position_ms as f64 / duration as f64 * 100.0).round();
            percent.min(100.0) as u8
        }
        _ => 0,
    }
}

/// A platform decoder/player.
///
/// Not `Send`: a native player is created on the command thread and never
/// leaves it. Calls mirror the engine's own state machine; the playback unit
/// only issues them from states where they are valid.
pub trait NativePlayer {
    fn set_event_sink(&mut self, sink: Option<NativeEventSink>);
    fn reset(&mut self);
    fn set_data_source(&mut self, path: &Path) -> Result<(), NativeError>;
    fn prepare(&mut self) -> Result<(), NativeError>;
    fn start(&mut self) -> Result<(), NativeError>;
    fn pause(&mut self) -> Result<(), NativeError>;
    fn stop(&mut self) -> Result<(), NativeError>;
    fn set_volume(&mut self, left: f32, right: f32);
    /// Probe shared with observers; stays valid for the player's lifetime.
    fn progress(&self) -> Arc<dyn ProgressProbe>;
    fn release(&mut self);
}

/// Creates native players on the command thread.
pub trait NativePlayerFactory: Send {
    fn create(&mut self) -> Result<Box<dyn NativePlayer>, NativeError>;
}

impl<F> NativePlayerFactory for F
where
    F: FnMut() -> Result<Box<dyn NativePlayer>, NativeError> + Send,
{
    fn create(&mut self) -> Result<Box<dyn NativePlayer>, NativeError> {
        self()
    }
}
