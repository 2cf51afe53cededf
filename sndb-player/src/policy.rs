//! Repress policy
//!
//! Decides what a press on a sound does, given its aggregate state and the
//! configured [`RepressMode`]. Lives outside the orchestrator, which only
//! offers the primitive operations.

use crate::playback::Orchestrator;
use sndb_common::{PlayerState, RepressMode};
use tracing::debug;

/// The operation a press resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressAction {
    Start { allow_parallel: bool },
    Stop,
    Restart,
    Pause,
}

/// Map a press in `state` under `mode` to an orchestrator operation.
pub fn press_action(state: PlayerState, mode: RepressMode) -> PressAction {
    if !state.is_playing() {
        return PressAction::Start {
            allow_parallel: false,
        };
    }
    match mode {
        RepressMode::Stop => PressAction::Stop,
        RepressMode::Restart => PressAction::Restart,
        RepressMode::Overlap => PressAction::Start {
            allow_parallel: true,
        },
        RepressMode::Pause => PressAction::Pause,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepressPolicy {
    mode: RepressMode,
}

impl RepressPolicy {
    pub fn new(mode: RepressMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> RepressMode {
        self.mode
    }

    /// Switch modes. Leaving `Pause` stops anything left paused.
    pub fn set_mode(&mut self, mode: RepressMode, orchestrator: &Orchestrator) {
        if self.mode == mode {
            return;
        }
        debug!(from = %self.mode, to = %mode, "Repress mode changed");
        if self.mode == RepressMode::Pause {
            orchestrator.stop(true);
        }
        self.mode = mode;
    }

    /// Apply one press to `orchestrator`.
    pub fn press(&self, orchestrator: &Orchestrator) -> PressAction {
        let state = orchestrator.state();
        let action = press_action(state, self.mode);
        debug!(%state, mode = %self.mode, ?action, "Press");
        match action {
            PressAction::Start { allow_parallel } => orchestrator.start(allow_parallel),
            PressAction::Stop => orchestrator.stop(false),
            PressAction::Restart => orchestrator.restart(),
            PressAction::Pause => orchestrator.pause(),
        }
        action
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_like_states_start() {
        for state in [PlayerState::Idle, PlayerState::Error, PlayerState::Paused] {
            for mode in [
                RepressMode::Stop,
                RepressMode::Restart,
                RepressMode::Overlap,
                RepressMode::Pause,
            ] {
                assert_eq!(
                    press_action(state, mode),
                    PressAction::Start {
                        allow_parallel: false
                    }
                );
            }
        }
    }

    #[test]
    fn test_started_follows_mode() {
        let started = PlayerState::Started;
        assert_eq!(press_action(started, RepressMode::Stop), PressAction::Stop);
        assert_eq!(press_action(started, RepressMode::Restart), PressAction::Restart);
        assert_eq!(
            press_action(started, RepressMode::Overlap),
            PressAction::Start {
                allow_parallel: true
            }
        );
        assert_eq!(press_action(started, RepressMode::Pause), PressAction::Pause);
    }
}
