//! Multi-resource mutual exclusion over dynamic connectivity classes.
//!
//! Lockforest lets concurrent programs synchronize over *groups* of logical
//! resources: exclusive access to any one resource implies exclusive access
//! to every resource that has been declared connected to it, directly or
//! transitively. Unrelated components can each guard a single resource and
//! stay oblivious to one another while the manager enforces the coarser
//! joint exclusion demanded by higher-level invariants.
//!
//! # Model
//!
//! - A [`SharedResource`] is a cheap-clone handle to one unit of mutual
//!   exclusion. Resources form an undirected *connectivity graph*; each
//!   maximal connected component (a *class*) is protected by exactly one
//!   lock.
//! - Classes are tracked by a mutable disjoint-set forest of identifiers.
//!   The root identifier of a class carries the class lock, a binary
//!   semaphore whose release may be performed by any thread.
//! - A [`ResourceGroup`] is a short-lived, thread-owned holder of acquired
//!   classes. It is the only surface through which resources are created,
//!   connected, disconnected, acquired, or freed.
//! - A [`World`] holds the process-wide pieces: the monotonic key mint for
//!   identifiers and the admission gate that keeps fresh contenders from
//!   starving a group that has repeatedly restarted its acquisition.
//!
//! # Deadlock freedom
//!
//! Acquisition locks class roots in strictly ascending key order and
//! re-validates after every blocking wait. Merging or splitting classes
//! always mints identifiers with strictly greater keys than anything that
//! existed before, so every thread participates in one global partial order
//! on class locks and cycles are impossible. A lock that turns out stale is
//! released and the pass restarts; see [`ResourceGroup`] for the protocol.
//!
//! # Example
//!
//! ```
//! use lockforest::{ResourceGroup, World};
//!
//! let world = World::new();
//! let a = world.create_resource();
//! let b = world.create_resource();
//!
//! // Tie a and b together: from now on, locking either locks both.
//! let mut group = ResourceGroup::acquiring(&world, &[a.clone(), b.clone()]);
//! group.connect(&a, &b).unwrap();
//! group.free().unwrap();
//!
//! // A later group sees one class.
//! let group = ResourceGroup::acquiring(&world, &[a.clone()]);
//! assert_eq!(a.class_key(), b.class_key());
//! drop(group);
//! ```

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
mod gate;
pub mod ident;
mod group;
mod resource;
pub mod sync;
pub mod util;
mod world;

#[cfg(test)]
pub mod test_utils;

pub use config::{ConfigError, WorldConfig};
pub use error::GroupError;
pub use group::ResourceGroup;
pub use ident::IdentKey;
pub use resource::{AssociatedObject, SharedResource};
pub use world::World;
