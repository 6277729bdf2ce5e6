//! Binary semaphore with any-thread release.

use parking_lot::{Condvar, Mutex};

/// A binary semaphore guarding one connectivity class.
///
/// Unlike a mutex, the release side carries no thread affinity: the permit
/// may be released by a different thread than the one that acquired it.
/// The internal mutex/condvar pair provides acquire-release ordering, so
/// everything written before a `release` is visible after the matching
/// `acquire`.
///
/// Waiting is the only blocking operation in this crate besides gate
/// admission; there is no timeout or cancellation path.
#[derive(Debug, Default)]
pub struct ClassSemaphore {
    state: Mutex<SemaphoreState>,
    available: Condvar,
}

#[derive(Debug, Default)]
struct SemaphoreState {
    /// Whether the single permit is currently taken.
    taken: bool,
    /// Number of threads blocked in `acquire`.
    waiters: usize,
}

impl ClassSemaphore {
    /// Creates a new semaphore with its permit available.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the permit, blocking until it is available.
    pub fn acquire(&self) {
        let mut state = self.state.lock();
        if state.taken {
            state.waiters += 1;
            while state.taken {
                self.available.wait(&mut state);
            }
            state.waiters -= 1;
        }
        state.taken = true;
    }

    /// Returns the permit.
    ///
    /// # Panics
    ///
    /// Panics if the permit is not currently taken; a double release means
    /// the forest bookkeeping is corrupted.
    pub fn release(&self) {
        let had_waiters = {
            let mut state = self.state.lock();
            assert!(state.taken, "release of a class semaphore that is not taken");
            state.taken = false;
            state.waiters > 0
        };
        // Notify outside the lock so the woken thread does not immediately
        // block on the state mutex we still hold.
        if had_waiters {
            self.available.notify_one();
        }
    }

    /// Returns true if the permit is currently taken.
    #[must_use]
    pub fn is_taken(&self) -> bool {
        self.state.lock().taken
    }

    /// Returns the number of threads currently blocked in [`acquire`].
    ///
    /// [`acquire`]: Self::acquire
    #[must_use]
    pub fn waiters(&self) -> usize {
        self.state.lock().waiters
    }
}
