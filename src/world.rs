//! The explicit process-wide state: key mint, admission gate, config.
//!
//! Nothing in this crate lives in a true global. A [`World`] owns the
//! monotonic key counter and the admission gate; resources and groups carry
//! a handle to the world they were created in. Tests instantiate private
//! worlds, and two worlds never interact.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::WorldConfig;
use crate::gate::AdmissionGate;
use crate::group::ResourceGroup;
use crate::ident::{IdentKey, ResourceIdent};
use crate::resource::SharedResource;

/// Shared state behind a [`World`] and every resource created in it.
pub(crate) struct WorldState {
    next_key: AtomicU64,
    gate: AdmissionGate,
    config: WorldConfig,
}

impl WorldState {
    /// Mints the next ident key; strictly monotonic, never reused.
    pub(crate) fn mint_key(&self) -> IdentKey {
        IdentKey::new(self.next_key.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    pub(crate) const fn config(&self) -> &WorldConfig {
        &self.config
    }
}

impl fmt::Debug for WorldState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorldState")
            .field("next_key", &self.next_key)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// An isolated universe of resources, groups, and their admission gate.
#[derive(Debug, Clone)]
pub struct World {
    state: Arc<WorldState>,
}

impl World {
    /// Creates a world with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(WorldConfig::default())
    }

    /// Creates a world with the given configuration.
    ///
    /// The configuration is taken as-is; call
    /// [`WorldConfig::validate`] first to catch tuning mistakes.
    #[must_use]
    pub fn with_config(config: WorldConfig) -> Self {
        Self {
            state: Arc::new(WorldState {
                next_key: AtomicU64::new(0),
                gate: AdmissionGate::new(),
                config,
            }),
        }
    }

    /// Returns the world's configuration.
    #[must_use]
    pub fn config(&self) -> &WorldConfig {
        self.state.config()
    }

    /// Creates a fresh resource: disconnected from everything and not
    /// acquired by anyone.
    #[must_use]
    pub fn create_resource(&self) -> SharedResource {
        SharedResource::create(
            Arc::clone(&self.state),
            ResourceIdent::new(self.state.mint_key()),
        )
    }

    /// Creates a resource connected to every resource in `others`.
    ///
    /// Acquires all of `others`, creates the new resource pre-acquired,
    /// connects it to each, and frees. Blocks while any involved class is
    /// held elsewhere. With an empty `others` this is
    /// [`create_resource`](Self::create_resource) with extra steps.
    #[must_use]
    pub fn create_connected(&self, others: &[SharedResource]) -> SharedResource {
        create_connected_from(Arc::clone(&self.state), others)
    }

    pub(crate) fn shared_state(&self) -> Arc<WorldState> {
        Arc::clone(&self.state)
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

/// Acquire `others`, create-and-acquire a fresh resource, connect it to
/// each of `others`, free.
pub(crate) fn create_connected_from(
    state: Arc<WorldState>,
    others: &[SharedResource],
) -> SharedResource {
    let mut group = ResourceGroup::acquiring_state(state, others);
    let fresh = group
        .create_and_acquire_resource()
        .expect("freshly constructed group is active");
    for other in others {
        group
            .connect(&fresh, other)
            .expect("both roots acquired by this group");
    }
    group.free().expect("freshly constructed group is active");
    fresh
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_strictly_monotonic() {
        let world = World::new();
        let mut previous = world.create_resource().key();
        for _ in 0..64 {
            let next = world.create_resource().key();
            assert!(next > previous, "{next:?} must exceed {previous:?}");
            previous = next;
        }
    }

    #[test]
    fn fresh_resource_is_a_singleton_class() {
        let world = World::new();
        let a = world.create_resource();
        let b = world.create_resource();
        assert_eq!(a.class_key(), a.key());
        assert_ne!(a.class_key(), b.class_key());
    }

    #[test]
    fn create_connected_receiver_form_joins_the_class() {
        let world = World::new();
        let a = world.create_resource();
        let b = a.create_connected();
        assert_eq!(a.class_key(), b.class_key());
        // Nothing is left locked behind.
        assert!(!a.current_root().class_lock().is_taken());
    }

    #[test]
    fn create_connected_variadic_joins_every_input() {
        let world = World::new();
        let a = world.create_resource();
        let b = world.create_resource();
        let c = world.create_connected(&[a.clone(), b.clone()]);

        assert_eq!(a.class_key(), c.class_key());
        assert_eq!(b.class_key(), c.class_key());
        assert!(!c.current_root().class_lock().is_taken());
    }

    #[test]
    fn create_connected_with_no_inputs_is_a_fresh_singleton() {
        let world = World::new();
        let a = world.create_connected(&[]);
        assert_eq!(a.class_key(), a.key());
        assert!(!a.current_root().class_lock().is_taken());
    }

    #[test]
    fn worlds_are_independent() {
        let one = World::new();
        let two = World::with_config(crate::WorldConfig::default().restart_budget(3));
        assert_eq!(two.config().restart_budget, 3);
        // Both worlds mint from their own counter.
        assert_eq!(one.create_resource().key(), two.create_resource().key());
    }
}
