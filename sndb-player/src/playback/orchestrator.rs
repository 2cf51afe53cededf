//! Orchestrator
//!
//! Owns one primary playback unit plus any number of short-lived parallel
//! units that let a sound overlap with itself. Every command is posted to a
//! dedicated command thread which owns all units; callers only ever see the
//! aggregated state, position and error streams.
//!
//! **Threading:**
//! - Commands are fire-and-forget messages on an unbounded channel.
//! - Native events and parallel evictions are posted to the same channel,
//!   so they are serialized with caller commands.
//! - After each message the command thread republishes the aggregate view.

use super::aggregate::{aggregate_state, AggregateView};
use super::command_thread;
use super::listener::{ErrorBus, UnitListener, ERROR_BUS_CAPACITY};
use super::native::NativePlayerFactory;
use super::position::position_stream;
use super::unit::{PlaybackUnit, UnitEvent, UnitEventSink, UnitId};
use crate::error::{Error, Result};
use futures::Stream;
use serde::Serialize;
use sndb_common::sound::MAX_VOLUME;
use sndb_common::{EngineConfig, PlayerState, SoundDescriptor};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio_stream::wrappers::{BroadcastStream, WatchStream};
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

/// Role of a unit inside an orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Primary,
    Parallel,
}

/// Diagnostic snapshot of one member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberInfo {
    pub unit: UnitId,
    pub role: Role,
    pub state: PlayerState,
    pub position: Option<u8>,
    pub last_error: Option<String>,
}

enum Query {
    ParallelCount(oneshot::Sender<usize>),
    Members(oneshot::Sender<Vec<MemberInfo>>),
    Flush(oneshot::Sender<()>),
}

enum Message {
    SetPath(Option<PathBuf>),
    SetVolume(u8),
    Start { allow_parallel: bool },
    Pause,
    Restart,
    Stop { only_paused: bool },
    Release,
    Native { unit: UnitId, event: UnitEvent },
    ParallelSettled { unit: UnitId, state: PlayerState },
    Query(Query),
    Shutdown,
}

/// Handle to a sound's playback. Cheap to query, never blocks on audio work.
pub struct Orchestrator {
    tx: mpsc::UnboundedSender<Message>,
    state_rx: watch::Receiver<PlayerState>,
    view_rx: watch::Receiver<AggregateView>,
    duration_rx: watch::Receiver<Option<u64>>,
    errors: ErrorBus,
    position_interval: Duration,
    thread: Option<JoinHandle<()>>,
}

impl Orchestrator {
    /// Spawn the command thread and create the primary unit on it.
    ///
    /// Fails if the thread cannot be started or the factory cannot create
    /// the primary native player.
    pub fn new<F>(factory: F, config: &EngineConfig) -> Result<Self>
    where
        F: NativePlayerFactory + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(PlayerState::Idle);
        let (view_tx, view_rx) = watch::channel(AggregateView::default());
        let (duration_tx, duration_rx) = watch::channel(None);
        let errors = ErrorBus::new(ERROR_BUS_CAPACITY);
        let position_interval = config.position_interval();

        let outputs = Outputs {
            state_tx,
            view_tx,
            duration_tx,
            errors: errors.clone(),
        };
        let settings = CoreSettings {
            auto_reset_primary: config.auto_reset_primary,
            position_interval,
        };

        let (init_tx, init_rx) = std::sync::mpsc::sync_channel::<Result<()>>(1);
        let core_tx = tx.clone();
        let thread = command_thread::spawn(config.command_thread_nice, move || {
            let core = match OrchestratorCore::new(Box::new(factory), core_tx, outputs, settings) {
                Ok(core) => {
                    let _ = init_tx.send(Ok(()));
                    core
                }
                Err(e) => {
                    error!("Failed to initialize orchestrator: {}", e);
                    let _ = init_tx.send(Err(e));
                    return;
                }
            };
            core.run(rx);
        })?;

        match init_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(Error::CommandThread(
                    "command thread exited during initialization".to_string(),
                ));
            }
        }

        info!("Orchestrator started");

        Ok(Self {
            tx,
            state_rx,
            view_rx,
            duration_rx,
            errors,
            position_interval,
            thread: Some(thread),
        })
    }

    /// Configure path and volume in one step.
    pub fn set_sound(&self, sound: &SoundDescriptor) {
        self.set_path(Some(sound.path.clone()));
        self.set_volume(sound.volume);
    }

    pub fn set_path(&self, path: Option<PathBuf>) {
        self.send(Message::SetPath(path));
    }

    /// Volume 0-100; larger values are clamped.
    pub fn set_volume(&self, volume: u8) {
        self.send(Message::SetVolume(volume.min(MAX_VOLUME)));
    }

    /// Play the primary, or overlap with a new parallel unit when the
    /// primary is already playing and `allow_parallel` is set.
    pub fn start(&self, allow_parallel: bool) {
        self.send(Message::Start { allow_parallel });
    }

    pub fn pause(&self) {
        self.send(Message::Pause);
    }

    pub fn restart(&self) {
        self.send(Message::Restart);
    }

    /// Stop playback. With `only_paused`, members that are still playing
    /// keep playing.
    pub fn stop(&self, only_paused: bool) {
        self.send(Message::Stop { only_paused });
    }

    /// Reset and release every member. Safe to call repeatedly.
    pub fn release(&self) {
        self.send(Message::Release);
    }

    pub fn state(&self) -> PlayerState {
        *self.state_rx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<PlayerState> {
        self.state_rx.clone()
    }

    pub fn state_stream(&self) -> impl Stream<Item = PlayerState> + Send + 'static {
        WatchStream::new(self.state_rx.clone())
    }

    /// Maximum position across playing members.
    pub fn position(&self) -> Option<u8> {
        self.view_rx.borrow().position()
    }

    pub fn position_stream(&self) -> impl Stream<Item = Option<u8>> + Send + 'static {
        position_stream(self.view_rx.clone(), self.position_interval, |view| {
            view.position()
        })
    }

    pub fn subscribe_errors(&self) -> broadcast::Receiver<String> {
        self.errors.subscribe()
    }

    /// Every member's errors, merged.
    pub fn error_stream(&self) -> impl Stream<Item = String> + Send + 'static {
        BroadcastStream::new(self.errors.subscribe()).filter_map(|message| message.ok())
    }

    /// Duration of the primary's source, once known.
    pub fn duration_ms(&self) -> Option<u64> {
        *self.duration_rx.borrow()
    }

    pub fn subscribe_duration(&self) -> watch::Receiver<Option<u64>> {
        self.duration_rx.clone()
    }

    pub async fn parallel_count(&self) -> Result<usize> {
        self.query(Query::ParallelCount).await
    }

    /// Primary first, then parallels in spawn order.
    pub async fn members(&self) -> Result<Vec<MemberInfo>> {
        self.query(Query::Members).await
    }

    /// Wait until every message posted so far has been processed.
    pub async fn flush(&self) -> Result<()> {
        self.query(Query::Flush).await
    }

    fn send(&self, message: Message) {
        if self.tx.send(message).is_err() {
            warn!("Audio command thread has stopped; command dropped");
        }
    }

    async fn query<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Query) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Message::Query(make(reply_tx)))
            .map_err(|_| Error::CommandThread("command thread has stopped".to_string()))?;
        reply_rx
            .await
            .map_err(|_| Error::CommandThread("query dropped without reply".to_string()))
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.send(Message::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Audio command thread panicked");
            }
        }
        debug!("Orchestrator dropped");
    }
}

struct Outputs {
    state_tx: watch::Sender<PlayerState>,
    view_tx: watch::Sender<AggregateView>,
    duration_tx: watch::Sender<Option<u64>>,
    errors: ErrorBus,
}

struct CoreSettings {
    auto_reset_primary: bool,
    position_interval: Duration,
}

/// Forwards a member's errors to the aggregate bus; parallels also request
/// their own eviction once they settle.
struct MemberListener {
    role: Role,
    tx: mpsc::UnboundedSender<Message>,
    errors: ErrorBus,
}

impl UnitListener for MemberListener {
    fn on_state_change(&mut self, unit: UnitId, state: PlayerState) {
        let settled = matches!(
            state,
            PlayerState::Error | PlayerState::Stopped | PlayerState::Paused | PlayerState::Completed
        );
        if self.role == Role::Parallel && settled {
            let _ = self.tx.send(Message::ParallelSettled { unit, state });
        }
    }

    fn on_error(&mut self, _unit: UnitId, message: &str) {
        self.errors.emit_lossy(message);
    }
}

/// State owned by the command thread.
struct OrchestratorCore {
    factory: Box<dyn NativePlayerFactory>,
    primary: PlaybackUnit,
    parallels: Vec<PlaybackUnit>,
    path: Option<PathBuf>,
    volume: u8,
    tx: mpsc::UnboundedSender<Message>,
    outputs: Outputs,
    settings: CoreSettings,
}

impl OrchestratorCore {
    fn new(
        mut factory: Box<dyn NativePlayerFactory>,
        tx: mpsc::UnboundedSender<Message>,
        outputs: Outputs,
        settings: CoreSettings,
    ) -> Result<Self> {
        let mut primary = build_unit(
            factory.as_mut(),
            Role::Primary,
            &tx,
            &outputs.errors,
            settings.position_interval,
        )?;

        let auto_reset = settings.auto_reset_primary;
        primary.set_error_handler(Box::new(move |unit, fault| {
            debug!(%unit, auto_reset, "Primary engine fault: {}", fault);
            auto_reset
        }));

        Ok(Self {
            factory,
            primary,
            parallels: Vec::new(),
            path: None,
            volume: MAX_VOLUME,
            tx,
            outputs,
            settings,
        })
    }

    fn run(mut self, mut rx: mpsc::UnboundedReceiver<Message>) {
        info!("Audio command thread running");
        while let Some(message) = rx.blocking_recv() {
            if matches!(message, Message::Shutdown) {
                break;
            }
            self.handle(message);
            self.publish();
        }
        self.release();
        self.publish();
        info!("Audio command thread stopped");
    }

    fn handle(&mut self, message: Message) {
        match message {
            Message::SetPath(path) => {
                debug!(path = ?path, "set_path");
                self.path = path;
            }
            Message::SetVolume(volume) => {
                debug!(volume, "set_volume");
                self.volume = volume;
            }
            Message::Start { allow_parallel } => self.start(allow_parallel),
            Message::Pause => self.pause(),
            Message::Restart => self.restart(),
            Message::Stop { only_paused } => self.stop(only_paused),
            Message::Release => self.release(),
            Message::Native { unit, event } => self.dispatch_native(unit, event),
            Message::ParallelSettled { unit, state } => {
                debug!(%unit, %state, "Parallel unit settled");
                self.evict(unit);
            }
            Message::Query(query) => self.answer(query),
            Message::Shutdown => {}
        }
    }

    fn start(&mut self, allow_parallel: bool) {
        if allow_parallel && self.primary.state().is_playing() {
            self.spawn_parallel();
        } else {
            self.play_primary();
        }
    }

    fn play_primary(&mut self) {
        self.primary.set_path(self.path.clone());
        self.primary.set_volume(self.volume);
        if let Err(e) = self.primary.play() {
            warn!(unit = %self.primary.id(), "Primary failed to play: {}", e);
            if self.settings.auto_reset_primary {
                self.primary.reset();
            }
        }
    }

    fn spawn_parallel(&mut self) {
        let mut unit = match build_unit(
            self.factory.as_mut(),
            Role::Parallel,
            &self.tx,
            &self.outputs.errors,
            self.settings.position_interval,
        ) {
            Ok(unit) => unit,
            Err(e) => {
                error!("Failed to create parallel unit: {}", e);
                self.outputs.errors.emit_lossy(e.to_string());
                return;
            }
        };

        let id = unit.id();
        unit.set_path(self.path.clone());
        unit.set_volume(self.volume);
        self.parallels.push(unit);
        info!(unit = %id, parallels = self.parallels.len(), "Spawned parallel unit");

        let result = match self.parallels.last_mut() {
            Some(unit) => unit.play(),
            None => return,
        };
        if let Err(e) = result {
            warn!(unit = %id, "Parallel unit failed to play: {}", e);
            self.evict(id);
        }
    }

    fn pause(&mut self) {
        self.stop_parallels(false);
        if self.primary.state().is_playing() {
            if let Err(e) = self.primary.pause() {
                warn!(unit = %self.primary.id(), "Primary failed to pause: {}", e);
            }
        }
    }

    fn restart(&mut self) {
        self.stop_parallels(false);
        if self.primary.state().is_playing() {
            self.primary.stop();
        }
        self.start(false);
    }

    fn stop(&mut self, only_paused: bool) {
        self.stop_parallels(only_paused);
        match self.primary.state() {
            PlayerState::Paused => self.primary.stop(),
            PlayerState::Started if !only_paused => self.primary.stop(),
            _ => {}
        }
    }

    /// Parallels that already settled are waiting for eviction and are left
    /// alone.
    fn stop_parallels(&mut self, only_paused: bool) {
        for unit in &mut self.parallels {
            match unit.state() {
                PlayerState::Paused => unit.stop(),
                PlayerState::Started if !only_paused => unit.stop(),
                _ => {}
            }
        }
    }

    fn release(&mut self) {
        for mut unit in self.parallels.drain(..) {
            unit.reset();
            unit.release();
        }
        self.primary.reset();
        self.primary.release();
    }

    fn evict(&mut self, id: UnitId) {
        let Some(index) = self.parallels.iter().position(|unit| unit.id() == id) else {
            return;
        };
        let mut unit = self.parallels.remove(index);
        unit.reset();
        unit.release();
        debug!(unit = %id, parallels = self.parallels.len(), "Evicted parallel unit");
    }

    fn dispatch_native(&mut self, id: UnitId, event: UnitEvent) {
        if self.primary.id() == id {
            self.primary.handle_event(event);
            return;
        }
        match self.parallels.iter_mut().find(|unit| unit.id() == id) {
            Some(unit) => unit.handle_event(event),
            None => debug!(unit = %id, ?event, "Event for evicted unit dropped"),
        }
    }

    fn answer(&self, query: Query) {
        match query {
            Query::ParallelCount(reply) => {
                let _ = reply.send(self.parallels.len());
            }
            Query::Members(reply) => {
                let _ = reply.send(self.members());
            }
            Query::Flush(reply) => {
                let _ = reply.send(());
            }
        }
    }

    fn members(&self) -> Vec<MemberInfo> {
        std::iter::once((&self.primary, Role::Primary))
            .chain(self.parallels.iter().map(|unit| (unit, Role::Parallel)))
            .map(|(unit, role)| MemberInfo {
                unit: unit.id(),
                role,
                state: unit.state(),
                position: unit.position_percent(),
                last_error: unit.last_error().map(str::to_string),
            })
            .collect()
    }

    fn publish(&self) {
        let units = || std::iter::once(&self.primary).chain(self.parallels.iter());

        let state = aggregate_state(units().map(PlaybackUnit::state));
        self.outputs.state_tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            debug!(from = %current, to = %state, "Aggregate state change");
            *current = state;
            true
        });

        let active = units()
            .filter(|unit| unit.state().is_playing())
            .map(|unit| (unit.id(), unit.progress()))
            .collect();
        let view = AggregateView::new(state, active);
        self.outputs.view_tx.send_if_modified(|current| {
            if *current == view {
                return false;
            }
            *current = view;
            true
        });

        let duration = self.primary.duration_ms();
        self.outputs.duration_tx.send_if_modified(|current| {
            if *current == duration {
                return false;
            }
            *current = duration;
            true
        });
    }
}

fn build_unit(
    factory: &mut dyn NativePlayerFactory,
    role: Role,
    tx: &mpsc::UnboundedSender<Message>,
    errors: &ErrorBus,
    position_interval: Duration,
) -> Result<PlaybackUnit> {
    let id = UnitId::new();
    let native = factory.create()?;
    let mut unit = PlaybackUnit::new(id, native, native_sink(tx.clone(), id))
        .with_position_interval(position_interval);
    unit.set_listener(Box::new(MemberListener {
        role,
        tx: tx.clone(),
        errors: errors.clone(),
    }));
    Ok(unit)
}

fn native_sink(tx: mpsc::UnboundedSender<Message>, unit: UnitId) -> UnitEventSink {
    Arc::new(move |event| {
        let _ = tx.send(Message::Native { unit, event });
    })
}
