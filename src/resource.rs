//! User-visible resource handles and the connectivity graph.
//!
//! A [`SharedResource`] is a cheap-clone handle (`Arc` inner) with pointer
//! identity. It owns one forest ident for life, an undirected adjacency
//! list of directly connected resources, and a cached transitive closure.
//! All adjacency and closure state is touched only while the resource's
//! class lock is held by the operating group; the structures themselves sit
//! behind a plain mutex so that handle cloning and inspection stay safe.

use parking_lot::Mutex;
use smallvec::SmallVec;
use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::ident::{IdentKey, ResourceIdent};
use crate::world::{create_connected_from, WorldState};

/// Opaque user payload attached to a resource.
pub type AssociatedObject = Arc<dyn Any + Send + Sync>;

/// A logical unit of mutual exclusion.
///
/// Handles are reference-typed: clones refer to the same resource, and
/// equality/hashing use pointer identity. Callers keep handles after the
/// group that created the resource is freed.
///
/// Connected resources hold strong handles to each other, so a
/// connectivity class stays alive as a whole until it is disconnected;
/// dropping every external handle to a still-connected resource does not
/// tear it out of its class.
#[derive(Clone)]
pub struct SharedResource {
    inner: Arc<ResourceInner>,
}

struct ResourceInner {
    world: Arc<WorldState>,
    /// The forest leaf owned by this resource for its whole lifetime.
    ident: Arc<ResourceIdent>,
    links: Mutex<LinkState>,
    payload: Mutex<Option<AssociatedObject>>,
}

struct LinkState {
    /// Directly connected resources other than this one. The adjacency
    /// convention is self-inclusive; the self entry is synthesized in
    /// every read so that the resource does not hold a strong handle to
    /// itself.
    neighbors: SmallVec<[SharedResource; 4]>,
    /// Cached transitive closure over adjacency.
    closure: Vec<SharedResource>,
    closure_dirty: bool,
}

impl SharedResource {
    pub(crate) fn create(world: Arc<WorldState>, ident: Arc<ResourceIdent>) -> Self {
        Self {
            inner: Arc::new(ResourceInner {
                world,
                ident,
                links: Mutex::new(LinkState {
                    neighbors: SmallVec::new(),
                    closure: Vec::new(),
                    closure_dirty: true,
                }),
                payload: Mutex::new(None),
            }),
        }
    }

    /// Returns the key of this resource's own ident.
    ///
    /// Stable for the resource's lifetime; useful as a debugging identity.
    #[must_use]
    pub fn key(&self) -> IdentKey {
        self.inner.ident.key()
    }

    /// Returns the key of this resource's current class root.
    ///
    /// This is a momentary snapshot: unless the caller's group holds the
    /// class, a concurrent connect or disconnect may re-root the class at
    /// any time. Two resources are in the same class iff their class keys
    /// are equal at a quiescent point.
    #[must_use]
    pub fn class_key(&self) -> IdentKey {
        self.current_root().key()
    }

    /// Returns the associated object, if any.
    ///
    /// The slot is a plain user payload: it is *not* guarded by the class
    /// lock, and the crate never touches it. Callers that mutate shared
    /// state behind it are responsible for their own synchronization.
    #[must_use]
    pub fn associated_object(&self) -> Option<AssociatedObject> {
        self.inner.payload.lock().clone()
    }

    /// Replaces the associated object, returning the previous one.
    pub fn set_associated_object(
        &self,
        object: Option<AssociatedObject>,
    ) -> Option<AssociatedObject> {
        std::mem::replace(&mut *self.inner.payload.lock(), object)
    }

    /// Creates a new resource already connected to this one.
    ///
    /// Internally: acquire the receiver, create-and-acquire the new
    /// resource, connect the two, free. Blocks while the receiver's class
    /// is held elsewhere.
    #[must_use]
    pub fn create_connected(&self) -> Self {
        create_connected_from(Arc::clone(&self.inner.world), std::slice::from_ref(self))
    }

    pub(crate) fn current_root(&self) -> Arc<ResourceIdent> {
        ResourceIdent::current_root(&self.inner.ident)
    }

    /// Re-points this resource's own ident at `root`.
    pub(crate) fn reset_root(&self, root: &Arc<ResourceIdent>) {
        self.inner.ident.set_parent(root);
    }

    /// Records the undirected edge between `self` and `other`, if absent,
    /// and marks both closure caches dirty. Idempotent; the self-edge is
    /// implicit and never stored.
    pub(crate) fn link(&self, other: &Self) {
        if self == other {
            self.inner.links.lock().closure_dirty = true;
            return;
        }
        {
            let mut links = self.inner.links.lock();
            if !links.neighbors.contains(other) {
                links.neighbors.push(other.clone());
            }
            links.closure_dirty = true;
        }
        {
            let mut links = other.inner.links.lock();
            if !links.neighbors.contains(self) {
                links.neighbors.push(self.clone());
            }
            links.closure_dirty = true;
        }
    }

    /// Removes the undirected edge between `self` and `other` (both
    /// directions, if present) and marks both closure caches dirty.
    ///
    /// # Panics
    ///
    /// Panics if exactly one direction of the edge exists; adjacency must
    /// stay symmetric.
    pub(crate) fn unlink(&self, other: &Self) {
        let removed_here = {
            let mut links = self.inner.links.lock();
            links.closure_dirty = true;
            remove_neighbor(&mut links.neighbors, other)
        };
        let removed_there = {
            let mut links = other.inner.links.lock();
            links.closure_dirty = true;
            remove_neighbor(&mut links.neighbors, self)
        };
        assert!(
            removed_here == removed_there,
            "asymmetric adjacency between {:?} and {:?}",
            self.key(),
            other.key(),
        );
    }

    /// Snapshot of the direct neighbors, self included.
    pub(crate) fn neighbors_snapshot(&self) -> Vec<Self> {
        let links = self.inner.links.lock();
        let mut neighbors = Vec::with_capacity(links.neighbors.len() + 1);
        neighbors.push(self.clone());
        neighbors.extend(links.neighbors.iter().cloned());
        neighbors
    }

    /// Transitive closure over adjacency, self included.
    ///
    /// Recomputes by depth-first flood and refreshes the cache when the
    /// cache is dirty; otherwise returns the cached list. Like the
    /// adjacency list, the cache stores everything but the implicit self
    /// entry.
    pub(crate) fn closure_snapshot(&self) -> Vec<Self> {
        {
            let links = self.inner.links.lock();
            if !links.closure_dirty {
                let mut closure = Vec::with_capacity(links.closure.len() + 1);
                closure.push(self.clone());
                closure.extend(links.closure.iter().cloned());
                return closure;
            }
        }
        let closure = self.flood();
        {
            let mut links = self.inner.links.lock();
            links.closure = closure.iter().filter(|r| *r != self).cloned().collect();
            links.closure_dirty = false;
        }
        closure
    }

    /// Depth-first flood over live adjacency starting at `self`.
    fn flood(&self) -> Vec<Self> {
        let hint = self.inner.world.config().closure_capacity_hint;
        let mut seen: HashSet<Self> = HashSet::with_capacity(hint);
        let mut stack: Vec<Self> = Vec::with_capacity(hint);
        let mut closure: Vec<Self> = Vec::with_capacity(hint);

        seen.insert(self.clone());
        stack.push(self.clone());
        while let Some(resource) = stack.pop() {
            for neighbor in resource.neighbors_snapshot() {
                if seen.insert(neighbor.clone()) {
                    stack.push(neighbor);
                }
            }
            closure.push(resource);
        }
        closure
    }
}

fn remove_neighbor(neighbors: &mut SmallVec<[SharedResource; 4]>, target: &SharedResource) -> bool {
    if let Some(pos) = neighbors.iter().position(|n| n == target) {
        neighbors.swap_remove(pos);
        true
    } else {
        false
    }
}

impl PartialEq for SharedResource {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for SharedResource {}

impl Hash for SharedResource {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(Arc::as_ptr(&self.inner), state);
    }
}

impl fmt::Debug for SharedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedResource")
            .field("key", &self.key())
            .finish_non_exhaustive()
    }
}
