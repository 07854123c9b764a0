//! Cooperative cancellation for background tasks.
//!
//! A task holds a [`ShutdownSignal`] and checks it before every scheduled
//! continuation. Triggering, or dropping the [`ShutdownTrigger`], cancels it.

use tokio::sync::watch;

/// Owner side. Dropping it cancels every signal.
#[derive(Debug)]
pub struct ShutdownTrigger {
    sender: watch::Sender<bool>,
}

/// Task side.
#[derive(Clone, Debug)]
pub struct ShutdownSignal {
    receiver: watch::Receiver<bool>,
}

/// Creates a connected trigger/signal pair.
#[must_use]
pub fn channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (sender, receiver) = watch::channel(false);
    (ShutdownTrigger { sender }, ShutdownSignal { receiver })
}

impl ShutdownTrigger {
    /// Cancels every signal of this pair. Idempotent.
    pub fn trigger(&self) {
        self.sender.send_replace(true);
    }
}

impl ShutdownSignal {
    /// Returns true once the trigger fired or was dropped.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow() || self.receiver.has_changed().is_err()
    }

    /// Resolves once the trigger fires or is dropped.
    pub async fn cancelled(&mut self) {
        // An error means the trigger is gone, which also counts.
        let _ = self.receiver.wait_for(|stopped| *stopped).await;
    }
}
