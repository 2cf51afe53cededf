//! Playback unit transition table
//!
//! The native engine's lifecycle, made explicit. Every command a playback
//! unit accepts is checked here before the engine is touched.

use sndb_common::PlayerState;
use std::fmt;
use thiserror::Error;

/// Commands that move a playback unit between states.
///
/// `Complete` and `Fail` originate from the native engine rather than from
/// a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitCommand {
    Reset,
    SetDataSource,
    Prepare,
    Start,
    Pause,
    Stop,
    Release,
    Complete,
    Fail,
}

impl fmt::Display for UnitCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UnitCommand::Reset => "reset",
            UnitCommand::SetDataSource => "set data source",
            UnitCommand::Prepare => "prepare",
            UnitCommand::Start => "start",
            UnitCommand::Pause => "pause",
            UnitCommand::Stop => "stop",
            UnitCommand::Release => "release",
            UnitCommand::Complete => "complete",
            UnitCommand::Fail => "fail",
        };
        f.write_str(name)
    }
}

/// A command was issued from a state that does not accept it.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("cannot {command} from state {from}")]
pub struct InvalidTransition {
    pub command: UnitCommand,
    pub from: PlayerState,
}

/// Resolve the state `command` leads to from `from`.
pub fn transition(
    from: PlayerState,
    command: UnitCommand,
) -> Result<PlayerState, InvalidTransition> {
    use PlayerState::*;

    let next = match (command, from) {
        (UnitCommand::Release, _) => Some(End),
        (_, End) => None,
        (UnitCommand::Reset, _) => Some(Idle),
        (UnitCommand::SetDataSource, Idle) => Some(Initialized),
        (UnitCommand::Prepare, Initialized | Stopped) => Some(Prepared),
        (UnitCommand::Start, Prepared | Paused | Completed) => Some(Started),
        (UnitCommand::Pause, Started) => Some(Paused),
        (UnitCommand::Stop, Started | Paused) => Some(Stopped),
        (UnitCommand::Complete, Started) => Some(Completed),
        (UnitCommand::Fail, _) => Some(Error),
        _ => None,
    };

    next.ok_or(InvalidTransition { command, from })
}
