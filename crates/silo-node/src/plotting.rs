//! One-shot plotting-completion signals keyed by state id.
//!
//! After the ledger seals a state the farming loop must not search for the
//! next solution until the state's piece set is actually plotted, or it
//! would prove storage it does not hold yet. Each state gets exactly one
//! waiter and one signal.

use parking_lot::Mutex;
use silo_core_primitives::StateHash;
use std::collections::HashMap;

/// Registry of pending plotting completions.
#[derive(Debug, Default)]
pub struct PlottingSignals {
    waiters: Mutex<HashMap<StateHash, async_oneshot::Sender<()>>>,
}

impl PlottingSignals {
    /// New empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in `state_hash` being plotted. Consumes the signal
    /// exactly once; a second registration for the same state replaces the
    /// first, whose receiver resolves to closed.
    pub fn plotted_receiver(&self, state_hash: StateHash) -> async_oneshot::Receiver<()> {
        let (sender, receiver) = async_oneshot::oneshot();
        self.waiters.lock().insert(state_hash, sender);
        receiver
    }

    /// Signal that `state_hash`'s piece set is fully plotted. Unknown
    /// states are a no-op.
    pub fn plotted(&self, state_hash: &StateHash) {
        if let Some(mut sender) = self.waiters.lock().remove(state_hash) {
            let _ = sender.send(());
        }
    }

    /// Give up on `state_hash` ever being plotted. Dropping the sender
    /// closes the channel, so the waiter resolves to an error instead of
    /// hanging. Unknown states are a no-op.
    pub fn abandoned(&self, state_hash: &StateHash) {
        drop(self.waiters.lock().remove(state_hash));
    }
}
