//! Resource groups: the acquisition protocol and all graph mutation.
//!
//! A group is a transient, thread-owned holder of acquired connectivity
//! classes. It is created empty or by acquiring a set of resources, may
//! then create pre-acquired resources and connect or disconnect resources
//! whose classes it holds, and is consumed by [`free`](ResourceGroup::free).
//!
//! # Acquisition protocol
//!
//! Acquiring a set of resources repeats the following pass until done:
//! snapshot each resource's current class root, sort the roots not yet held
//! by ascending key, lock the smallest, and re-validate. If, after the
//! blocking wait, the locked ident is still the current root of at least
//! one requested resource, it joins the held set; otherwise the class was
//! merged away while we waited, the stale lock is released, and the pass
//! restarts. Every merge or split mints roots with strictly greater keys,
//! so lock order follows one global partial order and cycles cannot form.
//!
//! A group that restarts too often closes the world's admission gate,
//! which holds back groups that have not yet started acquiring until the
//! closer finishes its acquisition phase. This bounds how much connect and
//! disconnect interference one acquisition can suffer.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::GroupError;
use crate::ident::{IdentKey, ResourceIdent};
use crate::resource::SharedResource;
use crate::world::{World, WorldState};

/// A transient, single-thread holder of acquired connectivity classes.
///
/// Groups go through three states: fresh (under construction), active, and
/// freed. Every operation except [`free`](Self::free) requires the group to
/// be active; operations on a freed group report
/// [`GroupError::UsageAfterFree`]. Usage errors never release locks the
/// group holds.
///
/// Dropping an active group releases its held class locks and logs a
/// warning; calling `free` explicitly is the contract, the drop path is a
/// leak backstop.
#[derive(Debug)]
pub struct ResourceGroup {
    world: Arc<WorldState>,
    /// Held class roots, unique and ordered by key.
    held: BTreeMap<IdentKey, Arc<ResourceIdent>>,
    state: GroupState,
    /// Whether this group closed the admission gate and has not yet
    /// reopened its closure.
    closed_gate: bool,
    /// Stale-lock restarts suffered during acquisition.
    restarts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GroupState {
    Fresh,
    Active,
    Freed,
}

impl ResourceGroup {
    /// Creates an empty group holding no classes.
    #[must_use]
    pub fn new(world: &World) -> Self {
        let mut group = Self::fresh(world.shared_state());
        group.state = GroupState::Active;
        group
    }

    /// Creates a group holding the classes of every given resource.
    ///
    /// Blocks until every class containing any of the resources is
    /// exclusively held. Duplicates, and resources already connected to
    /// each other, collapse to a single class lock.
    #[must_use]
    pub fn acquiring(world: &World, resources: &[SharedResource]) -> Self {
        let mut group = Self::fresh(world.shared_state());
        group.acquire_all(resources);
        group.state = GroupState::Active;
        group
    }

    pub(crate) fn acquiring_state(
        world: Arc<WorldState>,
        resources: &[SharedResource],
    ) -> Self {
        let mut group = Self::fresh(world);
        group.acquire_all(resources);
        group.state = GroupState::Active;
        group
    }

    fn fresh(world: Arc<WorldState>) -> Self {
        Self {
            world,
            held: BTreeMap::new(),
            state: GroupState::Fresh,
            closed_gate: false,
            restarts: 0,
        }
    }

    /// Creates a fresh resource whose class is already held by this group.
    ///
    /// The resource starts in a singleton class, disconnected from
    /// everything; its new root lock is created taken.
    pub fn create_and_acquire_resource(&mut self) -> Result<SharedResource, GroupError> {
        self.ensure_active()?;
        let root = self.mint_taken_root();
        let resource = SharedResource::create(Arc::clone(&self.world), Arc::clone(&root));
        self.insert_held(root);
        Ok(resource)
    }

    /// Connects two resources whose classes this group holds.
    ///
    /// If the resources already share a class, only the adjacency edge is
    /// recorded (idempotent). Otherwise the two classes merge under a
    /// freshly minted root whose lock this group holds in place of the two
    /// old ones.
    pub fn connect(&mut self, a: &SharedResource, b: &SharedResource) -> Result<(), GroupError> {
        self.ensure_active()?;
        let root_a = self.require_held(a)?;
        let root_b = self.require_held(b)?;

        if !Arc::ptr_eq(&root_a, &root_b) {
            let merged = self.mint_taken_root();
            tracing::debug!(
                merged = ?merged.key(),
                left = ?root_a.key(),
                right = ?root_b.key(),
                "merging connectivity classes",
            );
            root_a.set_parent(&merged);
            root_b.set_parent(&merged);
            self.held.remove(&root_a.key());
            self.held.remove(&root_b.key());
            self.insert_held(merged);
            // The abandoned roots are no longer reachable through any
            // forest walk; release them so a contender that was already
            // blocked on one can acquire, fail revalidation, and move on.
            root_a.class_lock().release();
            root_b.class_lock().release();
        }
        a.link(b);
        Ok(())
    }

    /// Disconnects two resources whose classes this group holds.
    ///
    /// Removes the direct edge. If the endpoints remain transitively
    /// connected the class is unchanged. Otherwise the class splits into
    /// two, each under a freshly minted root held by this group in place
    /// of the old one. Splitting is linear in the size of the class.
    pub fn disconnect(&mut self, a: &SharedResource, b: &SharedResource) -> Result<(), GroupError> {
        self.ensure_active()?;
        if a == b {
            return Err(GroupError::SelfDisconnect);
        }
        let root_a = self.require_held(a)?;
        let root_b = self.require_held(b)?;

        a.unlink(b);
        if !Arc::ptr_eq(&root_a, &root_b) {
            // Distinct classes cannot carry an edge; nothing to split.
            return Ok(());
        }

        let side_a = a.closure_snapshot();
        if side_a.contains(b) {
            // Still connected through another path; the class stands.
            return Ok(());
        }

        let side_b = b.closure_snapshot();
        let root_1 = self.mint_taken_root();
        let root_2 = self.mint_taken_root();
        tracing::debug!(
            split = ?root_a.key(),
            into = ?(root_1.key(), root_2.key()),
            left_size = side_a.len(),
            right_size = side_b.len(),
            "splitting connectivity class",
        );
        for resource in &side_a {
            resource.reset_root(&root_1);
        }
        for resource in &side_b {
            resource.reset_root(&root_2);
        }
        self.held.remove(&root_a.key());
        self.insert_held(root_1);
        self.insert_held(root_2);
        // The old root is abandoned in the released state; no live
        // resource reaches it through a forest walk anymore.
        root_a.class_lock().release();
        Ok(())
    }

    /// Returns the resources directly connected to `r`, `r` itself
    /// included.
    ///
    /// Requires `r`'s class to be held by this group.
    pub fn directly_connected_to(
        &self,
        r: &SharedResource,
    ) -> Result<Vec<SharedResource>, GroupError> {
        self.ensure_active()?;
        self.require_held(r)?;
        Ok(r.neighbors_snapshot())
    }

    /// Returns every resource transitively connected to `r`, `r` itself
    /// included.
    ///
    /// Requires `r`'s class to be held by this group.
    pub fn connected_to(&self, r: &SharedResource) -> Result<Vec<SharedResource>, GroupError> {
        self.ensure_active()?;
        self.require_held(r)?;
        Ok(r.closure_snapshot())
    }

    /// Releases every held class lock and consumes the group.
    ///
    /// Any further operation on the group reports
    /// [`GroupError::UsageAfterFree`]. Release may happen on a different
    /// thread than acquisition.
    pub fn free(&mut self) -> Result<(), GroupError> {
        self.ensure_active()?;
        self.release_held();
        self.state = GroupState::Freed;
        Ok(())
    }

    /// Number of stale-lock restarts the acquisition phase went through.
    #[must_use]
    pub const fn restarts(&self) -> u32 {
        self.restarts
    }

    /// Number of class locks currently held.
    #[must_use]
    pub fn held_classes(&self) -> usize {
        self.held.len()
    }

    // ------------------------------------------------------------------
    // Acquisition protocol
    // ------------------------------------------------------------------

    fn acquire_all(&mut self, resources: &[SharedResource]) {
        // First-acquisition admission; groups already past this point are
        // never gated.
        self.world.gate().admit();
        let mut budget = self.world.config().restart_budget;

        loop {
            // Snapshot: the current roots we still need, ascending by key.
            let mut targets: BTreeMap<IdentKey, Arc<ResourceIdent>> = BTreeMap::new();
            for resource in resources {
                let root = resource.current_root();
                if !self.held.contains_key(&root.key()) {
                    targets.entry(root.key()).or_insert(root);
                }
            }
            let Some((_, candidate)) = targets.into_iter().next() else {
                break;
            };

            candidate.class_lock().acquire();

            // Re-validate: while we blocked, classes may have merged or
            // split. The lock is worth keeping only if it still roots one
            // of the requested resources.
            let confirmed = resources
                .iter()
                .any(|resource| Arc::ptr_eq(&resource.current_root(), &candidate));
            if confirmed {
                self.insert_held(candidate);
            } else {
                candidate.class_lock().release();
                self.restarts += 1;
                tracing::trace!(
                    stale = ?candidate.key(),
                    restarts = self.restarts,
                    "released stale class lock; restarting acquisition pass",
                );
                if budget > 0 {
                    budget -= 1;
                    if budget == 0 && !self.closed_gate {
                        self.world.gate().close();
                        self.closed_gate = true;
                    }
                }
            }
        }

        if self.closed_gate {
            self.world.gate().reopen();
            self.closed_gate = false;
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    const fn ensure_active(&self) -> Result<(), GroupError> {
        match self.state {
            GroupState::Active => Ok(()),
            GroupState::Freed => Err(GroupError::UsageAfterFree),
            GroupState::Fresh => unreachable!(),
        }
    }

    /// Looks up `resource`'s current root and checks it is held.
    fn require_held(&self, resource: &SharedResource) -> Result<Arc<ResourceIdent>, GroupError> {
        let root = resource.current_root();
        if self.held.contains_key(&root.key()) {
            Ok(root)
        } else {
            Err(GroupError::ResourceNotHeld { key: root.key() })
        }
    }

    /// Mints a fresh root ident with its class lock already taken.
    fn mint_taken_root(&self) -> Arc<ResourceIdent> {
        let root = ResourceIdent::new(self.world.mint_key());
        root.class_lock().acquire();
        root
    }

    fn insert_held(&mut self, root: Arc<ResourceIdent>) {
        let key = root.key();
        let previous = self.held.insert(key, root);
        assert!(previous.is_none(), "duplicate root {key:?} in held set");
    }

    fn release_held(&mut self) {
        for (_, root) in std::mem::take(&mut self.held) {
            root.class_lock().release();
        }
    }
}

impl Drop for ResourceGroup {
    fn drop(&mut self) {
        // A panic during acquisition can drop a fresh group that closed
        // the gate; retire the closure so admission is not wedged forever.
        if self.closed_gate {
            self.world.gate().reopen();
        }
        if self.state != GroupState::Freed && !self.held.is_empty() {
            tracing::warn!(
                held = self.held.len(),
                "resource group dropped while active; releasing held class locks",
            );
            self.release_held();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::init_test_logging;
    use crate::World;

    #[test]
    fn empty_group_holds_nothing() {
        let world = World::new();
        let mut group = ResourceGroup::new(&world);
        assert_eq!(group.held_classes(), 0);
        group.free().expect("free succeeds");
    }

    #[test]
    fn create_and_acquire_holds_a_singleton_class() {
        let world = World::new();
        let mut group = ResourceGroup::new(&world);
        let r = group.create_and_acquire_resource().expect("group active");
        assert_eq!(group.held_classes(), 1);
        assert!(r.current_root().class_lock().is_taken());
        group.free().expect("free succeeds");
        assert!(!r.current_root().class_lock().is_taken());
    }

    #[test]
    fn acquiring_collapses_duplicates_and_connected_inputs() {
        let world = World::new();
        let a = world.create_resource();
        let b = world.create_resource();
        let mut setup = ResourceGroup::acquiring(&world, &[a.clone(), b.clone()]);
        setup.connect(&a, &b).expect("roots held");
        setup.free().expect("free succeeds");

        let mut group =
            ResourceGroup::acquiring(&world, &[a.clone(), a.clone(), b.clone()]);
        assert_eq!(group.held_classes(), 1);
        group.free().expect("free succeeds");
    }

    #[test]
    fn connect_merges_roots_under_a_fresh_key() {
        let world = World::new();
        let a = world.create_resource();
        let b = world.create_resource();
        let before = a.class_key().max(b.class_key());

        let mut group = ResourceGroup::acquiring(&world, &[a.clone(), b.clone()]);
        assert_eq!(group.held_classes(), 2);
        group.connect(&a, &b).expect("roots held");
        assert_eq!(group.held_classes(), 1);
        group.free().expect("free succeeds");

        assert_eq!(a.class_key(), b.class_key());
        assert!(a.class_key() > before);
    }

    #[test]
    fn connect_is_idempotent() {
        let world = World::new();
        let a = world.create_resource();
        let b = world.create_resource();

        let mut group = ResourceGroup::acquiring(&world, &[a.clone(), b.clone()]);
        group.connect(&a, &b).expect("first connect");
        let root_after_first = a.class_key();
        let neighbors_after_first = group.directly_connected_to(&a).expect("held").len();

        group.connect(&a, &b).expect("second connect");
        assert_eq!(a.class_key(), root_after_first);
        assert_eq!(
            group.directly_connected_to(&a).expect("held").len(),
            neighbors_after_first,
        );
        group.free().expect("free succeeds");
    }

    #[test]
    fn disconnect_without_split_keeps_the_root() {
        let world = World::new();
        let a = world.create_resource();
        let b = world.create_resource();
        let c = world.create_resource();

        let mut group =
            ResourceGroup::acquiring(&world, &[a.clone(), b.clone(), c.clone()]);
        group.connect(&a, &b).expect("connect a-b");
        group.connect(&b, &c).expect("connect b-c");
        group.connect(&c, &a).expect("connect c-a");
        let triangle_root = a.class_key();

        group.disconnect(&a, &b).expect("disconnect a-b");
        assert_eq!(a.class_key(), triangle_root);
        assert_eq!(b.class_key(), triangle_root);
        assert_eq!(group.held_classes(), 1);
        group.free().expect("free succeeds");
    }

    #[test]
    fn disconnect_with_split_mints_two_fresh_roots() {
        let world = World::new();
        let a = world.create_resource();
        let b = world.create_resource();

        let mut group = ResourceGroup::acquiring(&world, &[a.clone(), b.clone()]);
        group.connect(&a, &b).expect("connect");
        let merged = a.class_key();

        group.disconnect(&a, &b).expect("disconnect");
        assert_eq!(group.held_classes(), 2);
        assert_ne!(a.class_key(), b.class_key());
        assert!(a.class_key() > merged);
        assert!(b.class_key() > merged);
        group.free().expect("free succeeds");
    }

    #[test]
    fn self_disconnect_is_rejected_and_group_stays_usable() {
        let world = World::new();
        let a = world.create_resource();
        let mut group = ResourceGroup::acquiring(&world, &[a.clone()]);

        assert_eq!(group.disconnect(&a, &a), Err(GroupError::SelfDisconnect));
        assert_eq!(group.held_classes(), 1);
        // The group is still active and still holds a.
        assert!(group.directly_connected_to(&a).is_ok());
        group.free().expect("free succeeds");
    }

    #[test]
    fn operations_after_free_report_usage_errors() {
        let world = World::new();
        let a = world.create_resource();
        let mut group = ResourceGroup::acquiring(&world, &[a.clone()]);
        group.free().expect("free succeeds");

        assert_eq!(group.free(), Err(GroupError::UsageAfterFree));
        assert_eq!(
            group.create_and_acquire_resource().unwrap_err(),
            GroupError::UsageAfterFree,
        );
        assert_eq!(
            group.connect(&a, &a).unwrap_err(),
            GroupError::UsageAfterFree,
        );
        assert_eq!(
            group.directly_connected_to(&a).unwrap_err(),
            GroupError::UsageAfterFree,
        );
    }

    #[test]
    fn unheld_resource_is_rejected_without_dropping_locks() {
        let world = World::new();
        let a = world.create_resource();
        let b = world.create_resource();
        let mut group = ResourceGroup::acquiring(&world, &[a.clone()]);

        let err = group.connect(&a, &b).unwrap_err();
        assert!(matches!(err, GroupError::ResourceNotHeld { .. }));
        assert_eq!(group.held_classes(), 1);
        group.free().expect("free succeeds");
    }

    #[test]
    fn dropping_an_active_group_releases_its_locks() {
        init_test_logging();
        let world = World::new();
        let a = world.create_resource();
        {
            let group = ResourceGroup::acquiring(&world, &[a.clone()]);
            assert!(a.current_root().class_lock().is_taken());
            drop(group);
        }
        assert!(!a.current_root().class_lock().is_taken());
        // A later acquisition goes straight through.
        let mut group = ResourceGroup::acquiring(&world, &[a.clone()]);
        group.free().expect("free succeeds");
    }

    #[test]
    fn directly_connected_includes_self_and_neighbors() {
        let world = World::new();
        let a = world.create_resource();
        let b = world.create_resource();
        let mut group = ResourceGroup::acquiring(&world, &[a.clone(), b.clone()]);
        group.connect(&a, &b).expect("connect");

        let direct = group.directly_connected_to(&a).expect("held");
        assert!(direct.contains(&a));
        assert!(direct.contains(&b));

        let closure = group.connected_to(&a).expect("held");
        assert_eq!(closure.len(), 2);
        group.free().expect("free succeeds");
    }
}
