//! Observer hooks and the error bus
//!
//! A playback unit reports to at most one [`UnitListener`] and one
//! [`ErrorHandler`]; both are dropped when the unit is released, before the
//! native player goes away. Error messages fan out to any number of
//! subscribers through an [`ErrorBus`].

use super::native::EngineFault;
use super::unit::UnitId;
use sndb_common::PlayerState;
use tokio::sync::broadcast;

/// Receives a unit's state changes and surfaced errors, in order.
pub trait UnitListener {
    fn on_state_change(&mut self, unit: UnitId, state: PlayerState);
    fn on_error(&mut self, unit: UnitId, message: &str);
}

/// Called when the native engine reports a fault. Returning `true` marks
/// the fault as handled and the unit resets itself.
pub type ErrorHandler = Box<dyn FnMut(UnitId, &EngineFault) -> bool + Send>;

/// Default buffer for error subscribers that fall behind.
pub const ERROR_BUS_CAPACITY: usize = 64;

/// Broadcast channel of error messages.
///
/// Every occurrence is delivered, including repeats of the same message.
/// A subscriber that lags more than the capacity loses the oldest messages.
#[derive(Clone)]
pub struct ErrorBus {
    tx: broadcast::Sender<String>,
}

impl ErrorBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to errors emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    /// Emit a message, ignoring the absence of subscribers.
    pub fn emit_lossy(&self, message: impl Into<String>) {
        let _ = self.tx.send(message.into());
    }
}

impl Default for ErrorBus {
    fn default() -> Self {
        Self::new(ERROR_BUS_CAPACITY)
    }
}
