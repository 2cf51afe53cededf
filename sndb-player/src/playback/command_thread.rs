//! Dedicated audio command thread
//!
//! Native player calls are serialized onto one named OS thread. On unix the
//! thread lowers its nice value so audio work is not starved by the thread
//! that drives the caller's UI.

use crate::error::{Error, Result};
use std::thread::JoinHandle;
use tracing::debug;
#[cfg(unix)]
use tracing::warn;

/// Name given to every orchestrator's command thread.
pub const COMMAND_THREAD_NAME: &str = "sndb-audio-cmd";

/// Spawn `body` on a named thread, applying `nice` first when given.
pub(crate) fn spawn<F>(nice: Option<i32>, body: F) -> Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    std::thread::Builder::new()
        .name(COMMAND_THREAD_NAME.to_string())
        .spawn(move || {
            if let Some(nice) = nice {
                raise_priority(nice);
            }
            body();
        })
        .map_err(|e| Error::CommandThread(format!("Failed to spawn {}: {}", COMMAND_THREAD_NAME, e)))
}

#[cfg(unix)]
fn raise_priority(nice: i32) {
    // On Linux `who = 0` targets the calling thread; other unixes apply it
    // to the whole process.
    let rc = unsafe { libc::setpriority(libc::PRIO_PROCESS, 0, nice) };
    if rc == 0 {
        debug!(nice, "Audio command thread priority raised");
    } else {
        warn!(
            "Could not set audio command thread nice value {}: {}",
            nice,
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(unix))]
fn raise_priority(nice: i32) {
    debug!(nice, "Thread priority adjustment not supported on this platform");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_thread_is_named() {
        let (tx, rx) = mpsc::channel();
        let handle = spawn(None, move || {
            let name = std::thread::current().name().map(str::to_string);
            tx.send(name).unwrap();
        })
        .unwrap();

        assert_eq!(rx.recv().unwrap().as_deref(), Some(COMMAND_THREAD_NAME));
        handle.join().unwrap();
    }

    #[test]
    fn test_unprivileged_priority_request_still_runs_body() {
        let (tx, rx) = mpsc::channel();
        let handle = spawn(Some(-20), move || tx.send(()).unwrap()).unwrap();

        assert!(rx.recv().is_ok());
        handle.join().unwrap();
    }
}
