//! # tamper-core: Foundational Types for Tamper-Evident Resource Access
//!
//! Leaf crate of the workspace. It defines the contracts that the
//! tamper-evident layer decorates and the values it records:
//!
//! 1. **`ResourceLocator`.** Object-safe handle on a named resource: streams,
//!    random access, structural navigation, metadata. Optional capabilities
//!    (advisory locking, tamper evidence) are queried explicitly instead of
//!    probed by downcasting.
//!
//! 2. **`TamperEvident`.** The contract added by decorating locators:
//!    `checkpoint()` and `ensure_equal()` over a stored `ContentDigest`.
//!
//! 3. **`LocatorError`.** Integrity failures stay distinguishable from
//!    infrastructure I/O failures in every signature.
//!
//! 4. **Reference backends.** `MemoryStore` (shared in-memory tree with
//!    advisory locks and fault injection) and `FsLocator` (`std::fs`).
//!
//! ## Crate Policy
//!
//! - No dependencies on other `tamper-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod digest;
pub mod error;
pub mod fs;
pub mod lock;
pub mod locator;
pub mod memory;

// Re-export primary types for ergonomic imports.
pub use digest::{ContentDigest, DigestAlgorithm};
pub use error::LocatorError;
pub use fs::FsLocator;
pub use lock::{LockCapability, LockMode, LockOwner, ResourceLock};
pub use locator::{
    validate_name, NameFilter, RandomAccess, RandomAccessHandle, ReadStream, ResourceLocator,
    TamperEvident, WriteStream,
};
pub use memory::{MemoryLock, MemoryLocator, MemoryStore};
