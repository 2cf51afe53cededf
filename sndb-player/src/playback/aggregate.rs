//! Reduction of an orchestrator's members into one observable view

use super::native::ProgressProbe;
use super::position::StateSource;
use super::unit::UnitId;
use sndb_common::PlayerState;
use std::fmt;
use std::sync::Arc;

/// `Started` if any member is started, else `Paused` if any is paused,
/// else `Idle`.
pub fn aggregate_state(states: impl IntoIterator<Item = PlayerState>) -> PlayerState {
    let mut any_paused = false;
    for state in states {
        match state {
            PlayerState::Started => return PlayerState::Started,
            PlayerState::Paused => any_paused = true,
            _ => {}
        }
    }
    if any_paused {
        PlayerState::Paused
    } else {
        PlayerState::Idle
    }
}

/// Largest of the members' positions, or `None` when no member reports one.
pub fn aggregate_position(positions: impl IntoIterator<Item = Option<u8>>) -> Option<u8> {
    positions.into_iter().flatten().max()
}

/// Snapshot published by the command thread after every command.
///
/// Holds the aggregate state plus the progress probes of the members that
/// are currently playing, so position can be sampled without a round trip
/// to the command thread.
#[derive(Clone, Default)]
pub struct AggregateView {
    pub state: PlayerState,
    active: Vec<(UnitId, Arc<dyn ProgressProbe>)>,
}

impl AggregateView {
    pub fn new(state: PlayerState, active: Vec<(UnitId, Arc<dyn ProgressProbe>)>) -> Self {
        Self { state, active }
    }

    fn active_units(&self) -> impl Iterator<Item = UnitId> + '_ {
        self.active.iter().map(|(id, _)| *id)
    }

    pub fn position(&self) -> Option<u8> {
        aggregate_position(self.active.iter().map(|(_, probe)| Some(probe.percent())))
    }
}

impl PartialEq for AggregateView {
    fn eq(&self, other: &Self) -> bool {
        self.state == other.state && self.active_units().eq(other.active_units())
    }
}

impl StateSource for AggregateView {
    fn player_state(&self) -> PlayerState {
        self.state
    }
}

impl fmt::Debug for AggregateView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateView")
            .field("state", &self.state)
            .field("active", &self.active_units().collect::<Vec<_>>())
            .finish()
    }
}
