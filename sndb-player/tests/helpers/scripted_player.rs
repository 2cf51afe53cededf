//! Scripted native player for engine tests
//!
//! Records every native call in a shared log, fails the calls it is told
//! to fail, and exposes a handle per created player so tests can fire
//! completion/fault events and move the playback position. An event can
//! also be scripted to fire from inside a native call, which is how the
//! engine races end of stream against a stop.

use sndb_player::playback::native::{
    EngineFault, NativeError, NativeEvent, NativeEventSink, NativePlayer, NativePlayerFactory,
    ProgressProbe,
};
use sndb_player::playback::{UnitEvent, UnitEventSink};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Duration every scripted source reports once prepared.
pub const SCRIPTED_DURATION_MS: u64 = 1000;

/// Progress values the test controls directly.
#[derive(Default)]
pub struct ScriptedProbe {
    position_ms: AtomicU64,
    duration_ms: AtomicU64,
}

impl ScriptedProbe {
    pub fn set_position(&self, ms: u64) {
        self.position_ms.store(ms, Ordering::SeqCst);
    }

    fn set_duration(&self, ms: u64) {
        self.duration_ms.store(ms, Ordering::SeqCst);
    }
}

impl ProgressProbe for ScriptedProbe {
    fn position_ms(&self) -> u64 {
        self.position_ms.load(Ordering::SeqCst)
    }

    fn duration_ms(&self) -> Option<u64> {
        match self.duration_ms.load(Ordering::SeqCst) {
            0 => None,
            ms => Some(ms),
        }
    }
}

/// Test-side view of one scripted player.
#[derive(Clone)]
pub struct PlayerHandle {
    pub index: usize,
    sink: Arc<Mutex<Option<NativeEventSink>>>,
    probe: Arc<ScriptedProbe>,
    released: Arc<AtomicBool>,
}

impl PlayerHandle {
    /// Fire a completion, as the engine would at end of stream.
    pub fn complete(&self) -> bool {
        self.fire(NativeEvent::Completed)
    }

    /// Fire an engine fault.
    pub fn fail(&self, what: i32, extra: i32) -> bool {
        self.fire(NativeEvent::Failed(EngineFault::new(what, extra)))
    }

    /// Returns false when no sink is installed.
    pub fn fire(&self, event: NativeEvent) -> bool {
        let sink = self.sink.lock().unwrap().clone();
        match sink {
            Some(sink) => {
                sink(event);
                true
            }
            None => false,
        }
    }

    pub fn has_sink(&self) -> bool {
        self.sink.lock().unwrap().is_some()
    }

    pub fn set_position(&self, ms: u64) {
        self.probe.set_position(ms);
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct ScriptState {
    calls: Vec<String>,
    failures: HashMap<&'static str, NativeError>,
    fire_during: HashMap<&'static str, NativeEvent>,
    fail_create: bool,
    players: Vec<PlayerHandle>,
}

/// Shared script: call log, failure plan and player handles.
#[derive(Clone, Default)]
pub struct Script {
    state: Arc<Mutex<ScriptState>>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every future `op` call fail with `error` until cleared.
    pub fn fail(&self, op: &'static str, error: NativeError) {
        self.state.lock().unwrap().failures.insert(op, error);
    }

    pub fn clear_failures(&self) {
        self.state.lock().unwrap().failures.clear();
    }

    /// Fire `event` from inside every future `op` call until cleared.
    pub fn fire_during(&self, op: &'static str, event: NativeEvent) {
        self.state.lock().unwrap().fire_during.insert(op, event);
    }

    pub fn clear_fire_during(&self) {
        self.state.lock().unwrap().fire_during.clear();
    }

    pub fn fail_create(&self, fail: bool) {
        self.state.lock().unwrap().fail_create = fail;
    }

    /// Every recorded call, formatted `"<player index>:<op>"`.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Recorded ops of one player, without the index prefix.
    pub fn calls_of(&self, index: usize) -> Vec<String> {
        let prefix = format!("{}:", index);
        self.calls()
            .into_iter()
            .filter_map(|call| call.strip_prefix(&prefix).map(str::to_string))
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn player(&self, index: usize) -> PlayerHandle {
        self.state.lock().unwrap().players[index].clone()
    }

    pub fn player_count(&self) -> usize {
        self.state.lock().unwrap().players.len()
    }

    /// A standalone player, for driving a `PlaybackUnit` directly.
    pub fn new_player(&self) -> Box<dyn NativePlayer> {
        let mut state = self.state.lock().unwrap();
        let index = state.players.len();
        let handle = PlayerHandle {
            index,
            sink: Arc::new(Mutex::new(None)),
            probe: Arc::new(ScriptedProbe::default()),
            released: Arc::new(AtomicBool::new(false)),
        };
        state.players.push(handle.clone());
        Box::new(ScriptedPlayer {
            handle,
            script: self.clone(),
        })
    }

    pub fn factory(&self) -> ScriptedFactory {
        ScriptedFactory {
            script: self.clone(),
        }
    }

    fn record(&self, index: usize, op: &str) -> Result<(), NativeError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("{}:{}", index, op));
        match state.failures.get(op) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn event_during(&self, op: &str) -> Option<NativeEvent> {
        self.state.lock().unwrap().fire_during.get(op).copied()
    }
}

pub struct ScriptedPlayer {
    handle: PlayerHandle,
    script: Script,
}

impl ScriptedPlayer {
    fn fire_scripted(&self, op: &str) {
        if let Some(event) = self.script.event_during(op) {
            self.handle.fire(event);
        }
    }
}

impl NativePlayer for ScriptedPlayer {
    fn set_event_sink(&mut self, sink: Option<NativeEventSink>) {
        *self.handle.sink.lock().unwrap() = sink;
    }

    fn reset(&mut self) {
        let _ = self.script.record(self.handle.index, "reset");
        self.handle.probe.set_position(0);
        self.handle.probe.set_duration(0);
    }

    fn set_data_source(&mut self, path: &Path) -> Result<(), NativeError> {
        self.script
            .record(self.handle.index, "set_data_source")
            .map_err(|error| match error {
                NativeError::NotFound(_) => NativeError::NotFound(path.to_path_buf()),
                other => other,
            })
    }

    fn prepare(&mut self) -> Result<(), NativeError> {
        self.script.record(self.handle.index, "prepare")?;
        self.handle.probe.set_duration(SCRIPTED_DURATION_MS);
        self.fire_scripted("prepare");
        Ok(())
    }

    fn start(&mut self) -> Result<(), NativeError> {
        self.script.record(self.handle.index, "start")
    }

    fn pause(&mut self) -> Result<(), NativeError> {
        self.script.record(self.handle.index, "pause")
    }

    fn stop(&mut self) -> Result<(), NativeError> {
        self.script.record(self.handle.index, "stop")?;
        self.fire_scripted("stop");
        self.handle.probe.set_position(0);
        Ok(())
    }

    fn set_volume(&mut self, left: f32, right: f32) {
        let _ = self
            .script
            .record(self.handle.index, &format!("set_volume({:.2},{:.2})", left, right));
    }

    fn progress(&self) -> Arc<dyn ProgressProbe> {
        self.handle.probe.clone()
    }

    fn release(&mut self) {
        let _ = self.script.record(self.handle.index, "release");
        self.handle.released.store(true, Ordering::SeqCst);
    }
}

pub struct ScriptedFactory {
    script: Script,
}

impl NativePlayerFactory for ScriptedFactory {
    fn create(&mut self) -> Result<Box<dyn NativePlayer>, NativeError> {
        if self.script.state.lock().unwrap().fail_create {
            return Err(NativeError::Device("no output device".to_string()));
        }
        Ok(self.script.new_player())
    }
}

/// A sink that queues stamped events for the test to hand back to the unit.
pub fn recording_sink() -> (UnitEventSink, Arc<Mutex<Vec<UnitEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&events);
    let sink: UnitEventSink = Arc::new(move |event: UnitEvent| {
        recorded.lock().unwrap().push(event);
    });
    (sink, events)
}
