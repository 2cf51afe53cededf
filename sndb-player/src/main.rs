//! Soundboard Player (sndb-player) - demo entry point
//!
//! Plays one sound file through the playback engine, pressing it one or
//! more times under a repress mode, and logs the aggregate state, position
//! and error streams until playback settles or Ctrl+C is received.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;
use sndb_common::{EngineConfig, PlayerState, RepressMode, SoundDescriptor};
use sndb_player::audio::{OutputDevice, SymphoniaPlayerFactory};
use sndb_player::{Orchestrator, RepressPolicy};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for sndb-player
#[derive(Parser, Debug)]
#[command(name = "sndb-player")]
#[command(about = "Soundboard playback engine demo")]
#[command(version)]
struct Args {
    /// Sound file to play
    #[arg(required_unless_present = "list_devices")]
    file: Option<PathBuf>,

    /// Volume, 0-100
    #[arg(short, long, default_value_t = 100)]
    volume: u8,

    /// What a press does while the sound is playing (stop, restart, overlap, pause)
    #[arg(short, long, default_value = "stop")]
    mode: RepressMode,

    /// Number of presses to simulate
    #[arg(short, long, default_value_t = 1)]
    presses: u32,

    /// Delay between presses in milliseconds
    #[arg(long, default_value_t = 500)]
    press_interval_ms: u64,

    /// Configuration file (overrides SNDB_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// List output devices and exit
    #[arg(long)]
    list_devices: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = EngineConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    let default_filter = format!(
        "sndb_player={level},sndb_common={level}",
        level = config.logging.level
    );
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_thread_names(true))
        .init();

    info!(
        "Starting sndb-player {} ({}, {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_PROFILE")
    );

    if args.list_devices {
        for name in OutputDevice::list_devices().context("Failed to list output devices")? {
            println!("{}", name);
        }
        return Ok(());
    }

    let file = args.file.context("No sound file given")?;
    let sound = SoundDescriptor::new(file, args.volume).context("Invalid sound")?;
    info!("Sound: {} at volume {}", sound.path.display(), sound.volume);

    let factory = SymphoniaPlayerFactory::new(config.output_device.clone());
    let orchestrator =
        Orchestrator::new(factory, &config).context("Failed to initialize playback engine")?;
    orchestrator.set_sound(&sound);

    let observers = spawn_observers(&orchestrator);

    let policy = RepressPolicy::new(args.mode);
    for press in 1..=args.presses {
        let action = policy.press(&orchestrator);
        info!("Press {}/{}: {:?}", press, args.presses, action);
        orchestrator.flush().await?;
        if press < args.presses {
            tokio::time::sleep(Duration::from_millis(args.press_interval_ms)).await;
        }
    }

    tokio::select! {
        _ = wait_until_settled(&orchestrator) => info!("Playback settled"),
        _ = shutdown_signal() => {},
    }

    let members = orchestrator.members().await?;
    info!("Members: {}", serde_json::to_string(&members)?);

    orchestrator.release();
    orchestrator.flush().await?;
    drop(orchestrator);

    for observer in observers {
        if let Err(e) = observer.await {
            warn!("Observer task failed: {}", e);
        }
    }

    info!("Shutdown complete");
    Ok(())
}

/// Log the aggregate streams until the orchestrator goes away.
fn spawn_observers(orchestrator: &Orchestrator) -> Vec<tokio::task::JoinHandle<()>> {
    let mut states = orchestrator.state_stream();
    let mut positions = Box::pin(orchestrator.position_stream());
    let mut errors = orchestrator.error_stream();
    let mut durations = orchestrator.subscribe_duration();

    vec![
        tokio::spawn(async move {
            while let Some(state) = states.next().await {
                info!("State: {}", state);
            }
        }),
        tokio::spawn(async move {
            while let Some(position) = positions.next().await {
                if let Some(percent) = position {
                    info!("Position: {}%", percent);
                }
            }
        }),
        tokio::spawn(async move {
            while let Some(message) = errors.next().await {
                error!("Playback error: {}", message);
            }
        }),
        tokio::spawn(async move {
            while durations.changed().await.is_ok() {
                if let Some(ms) = *durations.borrow() {
                    info!("Duration: {}ms", ms);
                }
            }
        }),
    ]
}

/// Resolve once the aggregate state is no longer started.
async fn wait_until_settled(orchestrator: &Orchestrator) {
    let mut state = orchestrator.subscribe_state();
    loop {
        if *state.borrow_and_update() != PlayerState::Started {
            return;
        }
        if state.changed().await.is_err() {
            return;
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
