//! Identifiers in the disjoint-set forest of connectivity classes.
//!
//! Every resource owns one [`ResourceIdent`] for its whole lifetime, the
//! leaf of a parent chain. The root of a chain (the node with no parent)
//! represents one connectivity class and carries the class lock. Merging
//! two classes re-points both old roots at a freshly minted ident;
//! splitting a class re-points every member's own ident at one of two
//! fresh idents. Fresh idents always carry strictly greater keys than
//! anything minted before, which is what makes ascending-key lock ordering
//! deadlock free.
//!
//! # Concurrency
//!
//! Parent pointers sit behind an `RwLock`, so publication of a re-root is
//! release-ordered and parent chasing is acquire-ordered. Path compression
//! may race with a re-root performed by the class owner; the compressed
//! pointer then lands on a former root, which is still an ancestor of the
//! true root, so chains stay valid and later walks finish the job.

use parking_lot::RwLock;
use smallvec::SmallVec;
use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::sync::ClassSemaphore;

/// Totally ordered key of a [`ResourceIdent`].
///
/// Keys are minted by a [`World`](crate::World) from a monotonic counter:
/// strictly increasing in creation order and never reused for the lifetime
/// of the process.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IdentKey(u64);

impl IdentKey {
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw key value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for IdentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IdentKey({})", self.0)
    }
}

/// A node in the disjoint-set forest.
///
/// Idents outlive the resources that mint them: a merged-away root stays
/// reachable (and its semaphore alive) through `Arc` references held by
/// stale contenders until the last one drops it.
pub(crate) struct ResourceIdent {
    key: IdentKey,
    /// Forest pointer; `None` marks a root.
    parent: RwLock<Option<Arc<ResourceIdent>>>,
    /// Class lock, created lazily the first time this ident is locked as a
    /// root.
    lock: OnceLock<ClassSemaphore>,
}

impl ResourceIdent {
    pub(crate) fn new(key: IdentKey) -> Arc<Self> {
        Arc::new(Self {
            key,
            parent: RwLock::new(None),
            lock: OnceLock::new(),
        })
    }

    pub(crate) const fn key(&self) -> IdentKey {
        self.key
    }

    pub(crate) fn is_root(&self) -> bool {
        self.parent.read().is_none()
    }

    /// Returns the class lock, creating it on first use.
    pub(crate) fn class_lock(&self) -> &ClassSemaphore {
        self.lock.get_or_init(ClassSemaphore::new)
    }

    /// Walks parent pointers to the root of `this` chain, then re-points
    /// the walked nodes directly at it (path compression).
    pub(crate) fn current_root(this: &Arc<Self>) -> Arc<Self> {
        let mut walked: SmallVec<[Arc<Self>; 8]> = SmallVec::new();
        let mut cursor = Arc::clone(this);
        loop {
            let next = cursor.parent.read().clone();
            match next {
                None => break,
                Some(parent) => {
                    walked.push(cursor);
                    cursor = parent;
                }
            }
        }
        // The last walked node already points at the root; everything
        // before it gets the shortcut.
        if walked.len() > 1 {
            for node in &walked[..walked.len() - 1] {
                *node.parent.write() = Some(Arc::clone(&cursor));
            }
        }
        cursor
    }

    /// Unconditionally overwrites the parent pointer.
    ///
    /// Only called while the caller holds the class locks covering every
    /// affected class, during a merge or split.
    ///
    /// # Panics
    ///
    /// Panics if the new parent's key is not strictly greater; parent
    /// edges must increase the key, which is what keeps the forest acyclic.
    pub(crate) fn set_parent(&self, parent: &Arc<Self>) {
        assert!(
            parent.key > self.key,
            "parent edge must increase the key: {:?} -> {:?}",
            self.key,
            parent.key,
        );
        *self.parent.write() = Some(Arc::clone(parent));
    }
}

impl fmt::Debug for ResourceIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceIdent")
            .field("key", &self.key)
            .field("root", &self.is_root())
            .finish_non_exhaustive()
    }
}
