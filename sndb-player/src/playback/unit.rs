//! Playback unit
//!
//! One native player handle wrapped in an explicit state machine. Each
//! command is checked against the transition table before the native player
//! is called, so an out-of-order request is turned into an error event (and
//! usually the `Error` state) instead of reaching the engine.
//!
//! Failures never escape as panics. Commands return `Result` so callers can
//! short-circuit, and every failure is also surfaced on the error stream and
//! to the installed [`UnitListener`].

use super::listener::{ErrorBus, ErrorHandler, UnitListener};
use super::native::{NativeError, NativeEvent, NativeEventSink, NativePlayer, ProgressProbe};
use super::position::{position_stream, DEFAULT_POSITION_INTERVAL};
use super::state::{transition, InvalidTransition, UnitCommand};
use crate::error::{Error, Result};
use futures::Stream;
use serde::Serialize;
use sndb_common::sound::{volume_to_gain, MAX_VOLUME};
use sndb_common::PlayerState;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio_stream::wrappers::{BroadcastStream, WatchStream};
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Identity of a playback unit, used in logs and to route native events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct UnitId(Uuid);

impl UnitId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for UnitId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let simple = self.0.simple().to_string();
        f.write_str(&simple[..8])
    }
}

/// A native event stamped with the playback run it was fired in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitEvent {
    pub generation: u64,
    pub event: NativeEvent,
}

/// Callback receiving a unit's stamped native events.
pub type UnitEventSink = Arc<dyn Fn(UnitEvent) + Send + Sync>;

pub struct PlaybackUnit {
    id: UnitId,
    native: Option<Box<dyn NativePlayer>>,
    probe: Arc<dyn ProgressProbe>,
    state: PlayerState,
    last_error: Option<String>,
    has_permanent_error: bool,
    path: Option<PathBuf>,
    loaded_path: Option<PathBuf>,
    volume: u8,
    state_tx: watch::Sender<PlayerState>,
    errors: ErrorBus,
    listener: Option<Box<dyn UnitListener>>,
    error_handler: Option<ErrorHandler>,
    position_interval: Duration,
    /// Advanced whenever the native player is stopped, prepared or reset
    generation: Arc<AtomicU64>,
}

impl PlaybackUnit {
    /// Wrap `native`, installing `sink` for its asynchronous events.
    ///
    /// Each event is stamped with the generation current when the native
    /// player fires it. The sink is expected to hand it back to
    /// [`handle_event`](Self::handle_event) on the thread that owns this unit,
    /// which drops events from a run that has since been stopped or rewound.
    pub fn new(id: UnitId, mut native: Box<dyn NativePlayer>, sink: UnitEventSink) -> Self {
        let generation = Arc::new(AtomicU64::new(0));
        let stamp = Arc::clone(&generation);
        let forward: NativeEventSink = Arc::new(move |event| {
            sink(UnitEvent {
                generation: stamp.load(Ordering::Acquire),
                event,
            })
        });
        native.set_event_sink(Some(forward));
        let probe = native.progress();
        let (state_tx, _) = watch::channel(PlayerState::Idle);

        debug!(unit = %id, "Playback unit created");

        Self {
            id,
            native: Some(native),
            probe,
            state: PlayerState::Idle,
            last_error: None,
            has_permanent_error: false,
            path: None,
            loaded_path: None,
            volume: MAX_VOLUME,
            state_tx,
            errors: ErrorBus::default(),
            listener: None,
            error_handler: None,
            position_interval: DEFAULT_POSITION_INTERVAL,
            generation,
        }
    }

    pub fn with_position_interval(mut self, interval: Duration) -> Self {
        self.position_interval = interval;
        self
    }

    pub fn id(&self) -> UnitId {
        self.id
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn has_permanent_error(&self) -> bool {
        self.has_permanent_error
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    pub fn progress(&self) -> Arc<dyn ProgressProbe> {
        Arc::clone(&self.probe)
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.probe.duration_ms()
    }

    /// Current position, only while playing.
    pub fn position_percent(&self) -> Option<u8> {
        self.state.is_playing().then(|| self.probe.percent())
    }

    /// Configure the source for the next `play()`.
    pub fn set_path(&mut self, path: Option<PathBuf>) {
        self.path = path;
    }

    /// Cache a 0-100 volume, applied on the next `play()`.
    pub fn set_volume(&mut self, volume: u8) {
        self.volume = volume.min(MAX_VOLUME);
    }

    pub fn set_listener(&mut self, listener: Box<dyn UnitListener>) {
        if !self.state.is_terminal() {
            self.listener = Some(listener);
        }
    }

    pub fn set_error_handler(&mut self, handler: ErrorHandler) {
        if !self.state.is_terminal() {
            self.error_handler = Some(handler);
        }
    }

    pub fn subscribe_state(&self) -> watch::Receiver<PlayerState> {
        self.state_tx.subscribe()
    }

    /// Current state followed by every change.
    pub fn state_stream(&self) -> impl Stream<Item = PlayerState> + Send + 'static {
        WatchStream::new(self.state_tx.subscribe())
    }

    pub fn position_stream(&self) -> impl Stream<Item = Option<u8>> + Send + 'static {
        let probe = Arc::clone(&self.probe);
        position_stream(self.state_tx.subscribe(), self.position_interval, move |_| {
            Some(probe.percent())
        })
    }

    pub fn subscribe_errors(&self) -> broadcast::Receiver<String> {
        self.errors.subscribe()
    }

    pub fn error_stream(&self) -> impl Stream<Item = String> + Send + 'static {
        BroadcastStream::new(self.errors.subscribe()).filter_map(|message| message.ok())
    }

    /// Return to `Idle` from any live state.
    pub fn reset(&mut self) {
        let Ok(next) = transition(self.state, UnitCommand::Reset) else {
            return;
        };
        debug!(unit = %self.id, from = %self.state, "reset");
        if let Some(native) = self.native.as_mut() {
            native.reset();
        }
        self.advance_generation();
        self.loaded_path = None;
        self.change_state(next);
    }

    pub fn set_data_source(&mut self, path: &Path) -> Result<()> {
        self.ensure_live()?;
        let next = match transition(self.state, UnitCommand::SetDataSource) {
            Ok(next) => next,
            Err(invalid) => return Err(self.reject(invalid, false)),
        };

        debug!(unit = %self.id, path = %path.display(), "set_data_source");
        match self.with_native(|native| native.set_data_source(path))? {
            Ok(()) => {
                self.loaded_path = Some(path.to_path_buf());
                self.has_permanent_error = false;
                self.change_state(next);
                Ok(())
            }
            Err(source) => Err(self.source_failure("set_data_source", source)),
        }
    }

    pub fn prepare(&mut self) -> Result<()> {
        self.ensure_live()?;
        let next = match transition(self.state, UnitCommand::Prepare) {
            Ok(next) => next,
            Err(invalid) => return Err(self.reject(invalid, true)),
        };

        debug!(unit = %self.id, "prepare");
        let result = self.with_native(|native| native.prepare())?;
        self.advance_generation();
        match result {
            Ok(()) => {
                self.change_state(next);
                Ok(())
            }
            Err(source) => Err(self.source_failure("prepare", source)),
        }
    }

    pub fn start(&mut self) -> Result<()> {
        self.ensure_live()?;
        let next = match transition(self.state, UnitCommand::Start) {
            Ok(next) => next,
            Err(invalid) => return Err(self.reject(invalid, true)),
        };

        debug!(unit = %self.id, "start");
        match self.with_native(|native| native.start())? {
            Ok(()) => {
                self.change_state(next);
                Ok(())
            }
            Err(source) => Err(self.playback_failure("start", source)),
        }
    }

    /// Pause playback.
    ///
    /// From any state other than `Started` the error is surfaced and the
    /// native pause is still attempted before the unit enters `Error`.
    pub fn pause(&mut self) -> Result<()> {
        self.ensure_live()?;
        match transition(self.state, UnitCommand::Pause) {
            Ok(next) => {
                debug!(unit = %self.id, "pause");
                match self.with_native(|native| native.pause())? {
                    Ok(()) => {
                        self.change_state(next);
                        Ok(())
                    }
                    Err(source) => Err(self.playback_failure("pause", source)),
                }
            }
            Err(invalid) => {
                let error = self.reject(invalid, false);
                if let Some(Err(e)) = self.native.as_mut().map(|native| native.pause()) {
                    debug!(unit = %self.id, "native pause from invalid state also failed: {}", e);
                }
                self.change_state(PlayerState::Error);
                Err(error)
            }
        }
    }

    /// Stop playback. Failures are surfaced but not returned.
    pub fn stop(&mut self) {
        if let Err(e) = self.try_stop() {
            debug!(unit = %self.id, "stop failed: {}", e);
        }
    }

    fn try_stop(&mut self) -> Result<()> {
        self.ensure_live()?;
        let next = match transition(self.state, UnitCommand::Stop) {
            Ok(next) => next,
            Err(invalid) => return Err(self.reject(invalid, true)),
        };

        debug!(unit = %self.id, "stop");
        let result = self.with_native(|native| native.stop())?;
        self.advance_generation();
        match result {
            Ok(()) => {
                self.change_state(next);
                Ok(())
            }
            Err(source) => Err(self.playback_failure("stop", source)),
        }
    }

    /// Release the native player. Idempotent.
    ///
    /// Listener and error handler are detached and the native event sink is
    /// cleared before the native player is released, so nothing can call
    /// back into this unit afterwards.
    pub fn release(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        let Ok(next) = transition(self.state, UnitCommand::Release) else {
            return;
        };

        self.listener = None;
        self.error_handler = None;
        if let Some(mut native) = self.native.take() {
            native.set_event_sink(None);
            native.release();
        }

        self.state = next;
        self.state_tx.send_replace(next);
        info!(unit = %self.id, "Playback unit released");
    }

    /// Start playback from whatever state the unit is in.
    ///
    /// Reloads the source when the configured path changed, recovers from
    /// `Error`, and restarts from the beginning when already playing.
    pub fn play(&mut self) -> Result<()> {
        self.ensure_live()?;
        debug!(unit = %self.id, state = %self.state, "play");

        if self.loaded_path.is_some() && self.loaded_path != self.path {
            debug!(unit = %self.id, "source changed, reloading");
            self.reset();
        }

        if self.state == PlayerState::Error {
            self.reset();
        }

        if self.state == PlayerState::Idle {
            let Some(path) = self.path.clone() else {
                let error = Error::NoSource;
                self.surface(&error);
                return Err(error);
            };
            self.set_data_source(&path)?;
        }

        if self.state == PlayerState::Started {
            self.try_stop()?;
        }

        if matches!(self.state, PlayerState::Stopped | PlayerState::Initialized) {
            self.prepare()?;
        }

        let gain = volume_to_gain(self.volume);
        self.with_native(|native| native.set_volume(gain, gain))?;

        self.start()
    }

    /// Current playback generation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Apply a stamped event, unless it belongs to an earlier run.
    pub fn handle_event(&mut self, stamped: UnitEvent) {
        let current = self.generation();
        if stamped.generation != current {
            debug!(
                unit = %self.id,
                event = ?stamped.event,
                stale = stamped.generation,
                current,
                "stale native event dropped"
            );
            return;
        }
        self.handle_native_event(stamped.event);
    }

    /// Apply an event reported by the native player for the current run.
    pub fn handle_native_event(&mut self, event: NativeEvent) {
        if self.native.is_none() {
            debug!(unit = %self.id, ?event, "native event after release ignored");
            return;
        }

        match event {
            NativeEvent::Completed => match transition(self.state, UnitCommand::Complete) {
                Ok(next) => {
                    info!(unit = %self.id, "Playback completed");
                    self.change_state(next);
                }
                Err(invalid) => debug!(unit = %self.id, "completion ignored: {}", invalid),
            },
            NativeEvent::Failed(fault) => {
                let Ok(next) = transition(self.state, UnitCommand::Fail) else {
                    return;
                };
                error!(unit = %self.id, what = fault.what, extra = fault.extra, "Engine fault: {}", fault);
                self.change_state(next);
                self.surface(&Error::Engine(fault));

                let id = self.id;
                let handled = match self.error_handler.as_mut() {
                    Some(handler) => handler(id, &fault),
                    None => false,
                };
                if handled {
                    self.reset();
                } else {
                    warn!(unit = %self.id, "Engine fault not handled, unit left in error state");
                }
            }
        }
    }

    fn advance_generation(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    fn ensure_live(&self) -> Result<()> {
        if self.state.is_terminal() {
            Err(Error::Released)
        } else {
            Ok(())
        }
    }

    fn with_native<R>(&mut self, call: impl FnOnce(&mut dyn NativePlayer) -> R) -> Result<R> {
        match self.native.as_mut() {
            Some(native) => Ok(call(native.as_mut())),
            None => Err(Error::Released),
        }
    }

    fn reject(&mut self, invalid: InvalidTransition, enter_error: bool) -> Error {
        warn!(unit = %self.id, "Rejected command: {}", invalid);
        if enter_error {
            self.change_state(PlayerState::Error);
        }
        let error = Error::InvalidTransition(invalid);
        self.surface(&error);
        error
    }

    fn source_failure(&mut self, stage: &'static str, source: NativeError) -> Error {
        warn!(unit = %self.id, "{} failed: {}", stage, source);
        if source.is_permanent() {
            self.has_permanent_error = true;
        }
        let error = Error::Source { stage, source };
        self.surface(&error);
        error
    }

    fn playback_failure(&mut self, stage: &'static str, source: NativeError) -> Error {
        warn!(unit = %self.id, "{} failed: {}", stage, source);
        self.change_state(PlayerState::Error);
        let error = Error::Playback { stage, source };
        self.surface(&error);
        error
    }

    fn surface(&mut self, error: &Error) {
        let message = error.to_string();
        self.errors.emit_lossy(message.clone());
        if let Some(listener) = self.listener.as_mut() {
            listener.on_error(self.id, &message);
        }
        self.last_error = Some(message);
    }

    fn change_state(&mut self, next: PlayerState) {
        if next == self.state {
            return;
        }
        debug!(unit = %self.id, from = %self.state, to = %next, "state change");
        self.state = next;
        self.state_tx.send_replace(next);
        if let Some(listener) = self.listener.as_mut() {
            listener.on_state_change(self.id, next);
        }
    }
}

impl fmt::Debug for PlaybackUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackUnit")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("path", &self.path)
            .field("volume", &self.volume)
            .field("last_error", &self.last_error)
            .finish_non_exhaustive()
    }
}

impl Drop for PlaybackUnit {
    fn drop(&mut self) {
        self.release();
    }
}
