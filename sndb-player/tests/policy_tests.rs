//! Repress policy tests against a live orchestrator

mod helpers;

use helpers::{scripted_orchestrator, settle, test_config, Script};
use sndb_common::{PlayerState, RepressMode};
use sndb_player::policy::PressAction;
use sndb_player::{Orchestrator, RepressPolicy};
use std::path::PathBuf;

async fn pressed_once(mode: RepressMode) -> (Orchestrator, Script, RepressPolicy) {
    let (orchestrator, script) = scripted_orchestrator(&test_config());
    orchestrator.set_path(Some(PathBuf::from("a.mp3")));
    let policy = RepressPolicy::new(mode);

    let action = policy.press(&orchestrator);
    settle(&orchestrator).await;

    assert_eq!(
        action,
        PressAction::Start {
            allow_parallel: false
        }
    );
    assert_eq!(orchestrator.state(), PlayerState::Started);
    (orchestrator, script, policy)
}

#[tokio::test]
async fn test_stop_mode_second_press_stops() {
    let (orchestrator, _script, policy) = pressed_once(RepressMode::Stop).await;

    assert_eq!(policy.press(&orchestrator), PressAction::Stop);
    settle(&orchestrator).await;
    assert_eq!(orchestrator.state(), PlayerState::Idle);

    // Third press plays again.
    policy.press(&orchestrator);
    settle(&orchestrator).await;
    assert_eq!(orchestrator.state(), PlayerState::Started);
}

#[tokio::test]
async fn test_restart_mode_replays_from_beginning() {
    let (orchestrator, script, policy) = pressed_once(RepressMode::Restart).await;
    script.player(0).set_position(600);

    assert_eq!(policy.press(&orchestrator), PressAction::Restart);
    settle(&orchestrator).await;

    assert_eq!(orchestrator.state(), PlayerState::Started);
    assert_eq!(orchestrator.position(), Some(0));
}

#[tokio::test]
async fn test_overlap_mode_adds_parallels() {
    let (orchestrator, _script, policy) = pressed_once(RepressMode::Overlap).await;

    for _ in 0..2 {
        assert_eq!(
            policy.press(&orchestrator),
            PressAction::Start {
                allow_parallel: true
            }
        );
        settle(&orchestrator).await;
    }

    assert_eq!(orchestrator.parallel_count().await.unwrap(), 2);
    assert_eq!(orchestrator.state(), PlayerState::Started);
}

#[tokio::test]
async fn test_pause_mode_toggles() {
    let (orchestrator, script, policy) = pressed_once(RepressMode::Pause).await;

    assert_eq!(policy.press(&orchestrator), PressAction::Pause);
    settle(&orchestrator).await;
    assert_eq!(orchestrator.state(), PlayerState::Paused);

    script.clear_calls();
    policy.press(&orchestrator);
    settle(&orchestrator).await;
    assert_eq!(orchestrator.state(), PlayerState::Started);
    assert_eq!(script.calls_of(0), vec!["set_volume(1.00,1.00)", "start"]);
}

/// **Given:** A sound left PAUSED under pause mode
/// **When:** The mode changes to something else
/// **Then:** The paused sound is stopped
#[tokio::test]
async fn test_leaving_pause_mode_stops_paused_sound() {
    let (orchestrator, _script, mut policy) = pressed_once(RepressMode::Pause).await;
    policy.press(&orchestrator);
    settle(&orchestrator).await;
    assert_eq!(orchestrator.state(), PlayerState::Paused);

    policy.set_mode(RepressMode::Overlap, &orchestrator);
    settle(&orchestrator).await;

    assert_eq!(policy.mode(), RepressMode::Overlap);
    assert_eq!(orchestrator.state(), PlayerState::Idle);
    let members = orchestrator.members().await.unwrap();
    assert_eq!(members[0].state, PlayerState::Stopped);
}

#[tokio::test]
async fn test_mode_change_keeps_playing_sound() {
    let (orchestrator, script, mut policy) = pressed_once(RepressMode::Pause).await;
    script.clear_calls();

    policy.set_mode(RepressMode::Stop, &orchestrator);
    settle(&orchestrator).await;

    assert_eq!(orchestrator.state(), PlayerState::Started);
    assert!(script.calls().is_empty());
}
