//! Admission gate throttling first-time acquirers.
//!
//! When a group exhausts its restart budget it closes the gate; groups that
//! have not yet begun their first lock acquisition then wait here until
//! every closer has finished its acquisition phase. Groups already
//! mid-acquisition are unaffected, so the gate can never hold back a thread
//! that owns a class lock some closer is waiting for.

use parking_lot::{Condvar, Mutex};

/// Process-wide (per [`World`](crate::World)) admission latch.
///
/// The gate counts outstanding closers. Admission blocks while the count is
/// non-zero; every closer reopens its own closure when its acquisition
/// phase completes, and the last reopen wakes all admission waiters.
#[derive(Debug, Default)]
pub(crate) struct AdmissionGate {
    state: Mutex<GateState>,
    reopened: Condvar,
}

#[derive(Debug, Default)]
struct GateState {
    /// Groups that closed the gate and have not completed acquisition yet.
    closers: usize,
}

impl AdmissionGate {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Blocks until no closer is outstanding.
    pub(crate) fn admit(&self) {
        let mut state = self.state.lock();
        while state.closers > 0 {
            self.reopened.wait(&mut state);
        }
    }

    /// Registers the calling group as a closer.
    pub(crate) fn close(&self) {
        let mut state = self.state.lock();
        state.closers += 1;
        tracing::debug!(closers = state.closers, "admission gate closed");
    }

    /// Retires one closer, reopening the gate if it was the last.
    ///
    /// # Panics
    ///
    /// Panics if no closer is outstanding.
    pub(crate) fn reopen(&self) {
        let last = {
            let mut state = self.state.lock();
            assert!(state.closers > 0, "gate reopened with no outstanding closer");
            state.closers -= 1;
            state.closers == 0
        };
        if last {
            tracing::debug!("admission gate reopened");
            self.reopened.notify_all();
        }
    }

    #[cfg(test)]
    pub(crate) fn is_closed(&self) -> bool {
        self.state.lock().closers > 0
    }
}
