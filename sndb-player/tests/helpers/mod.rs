//! Shared helpers for sndb-player integration tests

#![allow(dead_code)]

pub mod scripted_player;

pub use scripted_player::{recording_sink, PlayerHandle, Script, SCRIPTED_DURATION_MS};

use sndb_common::EngineConfig;
use sndb_player::Orchestrator;
use tokio::sync::broadcast;

/// Engine configuration suitable for tests: fast polling and no priority
/// change on the command thread.
pub fn test_config() -> EngineConfig {
    EngineConfig {
        position_interval_ms: 20,
        command_thread_nice: None,
        ..EngineConfig::default()
    }
}

/// Orchestrator over a scripted factory. The primary is player 0.
pub fn scripted_orchestrator(config: &EngineConfig) -> (Orchestrator, Script) {
    let script = Script::new();
    let orchestrator =
        Orchestrator::new(script.factory(), config).expect("orchestrator should start");
    (orchestrator, script)
}

/// Wait for every queued command plus the evictions they trigger.
///
/// A settling parallel posts its own eviction, which lands behind the
/// first flush, so two round trips are needed.
pub async fn settle(orchestrator: &Orchestrator) {
    orchestrator.flush().await.expect("flush");
    orchestrator.flush().await.expect("flush");
}

/// Drain everything currently buffered on an error receiver.
pub fn drain_errors(rx: &mut broadcast::Receiver<String>) -> Vec<String> {
    let mut messages = Vec::new();
    while let Ok(message) = rx.try_recv() {
        messages.push(message);
    }
    messages
}
