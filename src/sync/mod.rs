//! Synchronization primitives backing the class locks.
//!
//! The only primitive here is [`ClassSemaphore`], the binary semaphore that
//! guards one connectivity class. It deliberately has semaphore (not mutex)
//! semantics: release may be performed by any thread, because a class lock
//! acquired during a group's construction is released by whichever thread
//! ends up freeing or dropping the group.

mod semaphore;

pub use semaphore::ClassSemaphore;
