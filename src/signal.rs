//! Single-slot coalescing signal
//!
//! Built on a `sync_channel(1)`: a send while the slot is full is dropped, so a
//! burst of notifications collapses into one wakeup. A notification sent after
//! the slot was drained is never lost.

use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};

/// Creates a connected sender/receiver pair.
pub fn signal() -> (SignalSender, SignalReceiver) {
    let (tx, rx) = mpsc::sync_channel(1);
    (SignalSender(tx), SignalReceiver(rx))
}

#[derive(Debug, Clone)]
pub struct SignalSender(SyncSender<()>);

impl SignalSender {
    /// Raises the signal without blocking.
    ///
    /// Returns `false` when the slot was already full (coalesced) or the
    /// receiver is gone.
    pub fn notify(&self) -> bool {
        match self.0.try_send(()) {
            Ok(()) => true,
            Err(TrySendError::Full(())) | Err(TrySendError::Disconnected(())) => false,
        }
    }
}

#[derive(Debug)]
pub struct SignalReceiver(Receiver<()>);

impl SignalReceiver {
    /// Blocks until the signal is raised. Returns `false` once every sender is gone.
    pub fn wait(&self) -> bool {
        self.0.recv().is_ok()
    }

    /// Consumes the signal if it is raised.
    #[cfg(test)]
    pub(crate) fn take(&self) -> bool {
        match self.0.try_recv() {
            Ok(()) => true,
            Err(mpsc::TryRecvError::Empty) | Err(mpsc::TryRecvError::Disconnected) => false,
        }
    }
}
