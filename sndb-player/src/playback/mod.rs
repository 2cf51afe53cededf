//! Playback units, their orchestration, and the native player boundary

pub mod aggregate;
pub mod command_thread;
pub mod listener;
pub mod native;
pub mod orchestrator;
pub mod position;
pub mod state;
pub mod unit;

pub use aggregate::AggregateView;
pub use listener::{ErrorBus, ErrorHandler, UnitListener};
pub use native::{
    EngineFault, NativeError, NativeEvent, NativeEventSink, NativePlayer, NativePlayerFactory,
    ProgressProbe,
};
pub use orchestrator::{MemberInfo, Orchestrator, Role};
pub use state::{transition, InvalidTransition, UnitCommand};
pub use unit::{PlaybackUnit, UnitEvent, UnitEventSink, UnitId};
