//! Position polling
//!
//! A position stream samples a percentage while the observed state is
//! `Started`: once on entry, then on a fixed delay. Leaving `Started`
//! cancels the timer; re-entering starts a fresh polling window. The
//! stream ends when the state reaches `End` or its publisher goes away.

use futures::Stream;
use sndb_common::PlayerState;
use std::time::Duration;
use tokio::sync::watch;

/// Default delay between position samples.
pub const DEFAULT_POSITION_INTERVAL: Duration = Duration::from_millis(200);

/// Anything a position stream can be driven by.
pub trait StateSource {
    fn player_state(&self) -> PlayerState;
}

impl StateSource for PlayerState {
    fn player_state(&self) -> PlayerState {
        *self
    }
}

enum Wake {
    Tick,
    Changed,
    Closed,
}

/// Build a position stream over a state watch.
///
/// Yields `sample(value)` while the state is `Started`, and a single `None`
/// each time the state settles somewhere else.
pub fn position_stream<T, S>(
    mut rx: watch::Receiver<T>,
    interval: Duration,
    sample: S,
) -> impl Stream<Item = Option<u8>> + Send + 'static
where
    T: StateSource + Send + Sync + 'static,
    S: Fn(&T) -> Option<u8> + Send + 'static,
{
    async_stream::stream! {
        'window: loop {
            let (state, sampled) = {
                let current = rx.borrow_and_update();
                let state = current.player_state();
                let sampled = if state.is_playing() { sample(&*current) } else { None };
                (state, sampled)
            };

            if state.is_terminal() {
                break 'window;
            }

            yield sampled;

            if !state.is_playing() {
                if rx.changed().await.is_err() {
                    break 'window;
                }
                continue 'window;
            }

            loop {
                let wake = tokio::select! {
                    _ = tokio::time::sleep(interval) => Wake::Tick,
                    changed = rx.changed() => match changed {
                        Ok(()) => Wake::Changed,
                        Err(_) => Wake::Closed,
                    },
                };

                match wake {
                    Wake::Tick => {
                        let (playing, sampled) = {
                            let current = rx.borrow();
                            (current.player_state().is_playing(), sample(&*current))
                        };
                        if !playing {
                            continue 'window;
                        }
                        yield sampled;
                    }
                    Wake::Changed => continue 'window,
                    Wake::Closed => break 'window,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test(start_paused = true)]
    async fn test_samples_while_started() {
        let (tx, rx) = watch::channel(PlayerState::Started);
        let stream = position_stream(rx, Duration::from_millis(200), |_| Some(42));
        futures::pin_mut!(stream);

        assert_eq!(stream.next().await, Some(Some(42)));
        assert_eq!(stream.next().await, Some(Some(42)));

        tx.send_replace(PlayerState::Paused);
        assert_eq!(stream.next().await, Some(None));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restarts_when_started_again() {
        let (tx, rx) = watch::channel(PlayerState::Idle);
        let stream = position_stream(rx, Duration::from_millis(200), |_| Some(7));
        futures::pin_mut!(stream);

        assert_eq!(stream.next().await, Some(None));
        tx.send_replace(PlayerState::Started);
        assert_eq!(stream.next().await, Some(Some(7)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ends_on_release() {
        let (tx, rx) = watch::channel(PlayerState::Started);
        let stream = position_stream(rx, Duration::from_millis(200), |_| Some(0));
        futures::pin_mut!(stream);

        assert_eq!(stream.next().await, Some(Some(0)));
        tx.send_replace(PlayerState::End);
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ends_when_publisher_dropped() {
        let (tx, rx) = watch::channel(PlayerState::Stopped);
        let stream = position_stream(rx, Duration::from_millis(200), |_| Some(0));
        futures::pin_mut!(stream);

        assert_eq!(stream.next().await, Some(None));
        drop(tx);
        assert_eq!(stream.next().await, None);
    }
}
