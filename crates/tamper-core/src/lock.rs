//! # Advisory Resource Locks
//!
//! Optional capability offered by backends that can pin a physical resource
//! while handles on it are open. Locks are advisory: holders cooperate,
//! nothing stops a third party from writing underneath.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::LocatorError;

/// Identity of a lock holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LockOwner(u64);

impl LockOwner {
    /// Allocate a process-unique owner id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw id.
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for LockOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "owner#{}", self.0)
    }
}

/// How a lock is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    /// Any number of shared holders may coexist.
    Shared,
    /// A single holder, excluding all others.
    Exclusive,
}

/// An advisory lock over one physical resource.
pub trait ResourceLock: Send + Sync {
    /// Acquire the lock for `owner`. May block briefly.
    fn acquire(&self, owner: LockOwner, mode: LockMode) -> Result<(), LocatorError>;

    /// Release the lock held by `owner`.
    fn release(&self, owner: LockOwner) -> Result<(), LocatorError>;
}

/// Backends that can hand out a [`ResourceLock`] for their resource.
pub trait LockCapability: Send + Sync {
    /// The lock guarding this resource.
    fn lock(&self) -> Result<Arc<dyn ResourceLock>, LocatorError>;
}
