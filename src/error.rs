//! Error types for group operations.
//!
//! Errors are explicit and typed, in line with the rest of the crate:
//!
//! - Usage errors ([`GroupError`]) are reported to the caller synchronously.
//!   They never release locks the group already holds; the group stays
//!   active and `free` remains the caller's responsibility.
//! - Internal invariant violations (a duplicate root in a held set, a
//!   parent edge that does not increase the key, asymmetric adjacency)
//!   are bugs in this crate and panic with a diagnostic message. There is
//!   no meaningful recovery from a corrupted forest.
//!
//! The crate never retries on the caller's behalf; the acquisition
//! protocol's internal restarts are not errors.

use core::fmt;

use crate::ident::IdentKey;

/// Error returned by [`ResourceGroup`](crate::ResourceGroup) operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupError {
    /// The group was already consumed by `free`.
    UsageAfterFree,
    /// The operation requires a resource whose current class root is held
    /// by this group, and it is not.
    ResourceNotHeld {
        /// Key of the class root that would have to be held.
        key: IdentKey,
    },
    /// A resource cannot be disconnected from itself.
    SelfDisconnect,
}

impl GroupError {
    /// Returns true if the error is a lifecycle error (the group can no
    /// longer be used) rather than a per-call precondition failure.
    #[must_use]
    pub const fn is_lifecycle(&self) -> bool {
        matches!(self, Self::UsageAfterFree)
    }
}

impl fmt::Display for GroupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UsageAfterFree => write!(f, "resource group used after free"),
            Self::ResourceNotHeld { key } => {
                write!(f, "class root {key:?} is not held by this group")
            }
            Self::SelfDisconnect => write!(f, "cannot disconnect a resource from itself"),
        }
    }
}

impl std::error::Error for GroupError {}
