//! # Resource Locator Contracts
//!
//! A `ResourceLocator` names one addressable resource (file-like or not) and
//! offers stream, random-access and structural operations over it.
//! `TamperEvident` is the extra contract implemented by locators that keep a
//! digest snapshot of the content and can prove it has not changed.
//!
//! Both traits are object safe; locators travel as `Arc<dyn ResourceLocator>`
//! so that decorators can wrap any backend, including another decorator.

use std::fmt;
use std::io::{self, Read, Seek, Write};
use std::sync::Arc;

use crate::digest::ContentDigest;
use crate::error::LocatorError;
use crate::lock::LockCapability;

/// A readable byte stream handed out by a locator.
pub type ReadStream = Box<dyn Read + Send>;

/// A writable byte stream handed out by a locator. Content is committed on
/// `flush()` and, at the latest, when the stream is dropped.
pub type WriteStream = Box<dyn Write + Send>;

/// A random-access handle handed out by a locator.
pub type RandomAccessHandle = Box<dyn RandomAccess>;

/// Filter applied to child names by [`ResourceLocator::list_children`].
pub type NameFilter<'a> = &'a dyn Fn(&str) -> bool;

/// Seekable read/write access to a resource.
pub trait RandomAccess: Read + Write + Seek + Send {
    /// Current length of the resource in bytes.
    fn len(&mut self) -> io::Result<u64>;

    /// Whether the resource is empty.
    fn is_empty(&mut self) -> io::Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Truncate or zero-extend the resource to `len` bytes.
    fn set_len(&mut self, len: u64) -> io::Result<()>;
}

impl RandomAccess for std::fs::File {
    fn len(&mut self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn set_len(&mut self, len: u64) -> io::Result<()> {
        std::fs::File::set_len(self, len)
    }
}

/// A named, addressable resource.
pub trait ResourceLocator: Send + Sync + fmt::Debug {
    /// The physical address of the resource. Locator identity is defined
    /// by this value alone.
    fn path(&self) -> &str;

    /// The last path segment.
    fn name(&self) -> &str;

    /// Open the resource for reading.
    fn open_read(&self) -> Result<ReadStream, LocatorError>;

    /// Open the resource for writing, replacing its content.
    fn open_write(&self) -> Result<WriteStream, LocatorError>;

    /// Open the resource for seekable read/write access, creating it if absent.
    fn open_random_access(&self) -> Result<RandomAccessHandle, LocatorError>;

    /// Locator for a named child. `None` if this resource cannot have children.
    fn child(&self, name: &str) -> Result<Option<Arc<dyn ResourceLocator>>, LocatorError>;

    /// Locator for the parent. `None` at the root.
    fn parent(&self) -> Option<Arc<dyn ResourceLocator>>;

    /// Existing children whose name passes `filter`.
    fn list_children(
        &self,
        filter: NameFilter<'_>,
    ) -> Result<Vec<Arc<dyn ResourceLocator>>, LocatorError>;

    /// Whether the resource currently exists.
    fn exists(&self) -> bool;

    /// Content length in bytes.
    fn len(&self) -> Result<u64, LocatorError>;

    /// Whether the content is empty.
    fn is_empty(&self) -> Result<bool, LocatorError> {
        Ok(self.len()? == 0)
    }

    /// Remove the resource.
    fn delete(&self) -> Result<(), LocatorError>;

    /// Rename the resource within its parent and return the locator for
    /// the new name.
    fn rename(&self, new_name: &str) -> Result<Arc<dyn ResourceLocator>, LocatorError>;

    /// Whether writes are refused.
    fn is_read_only(&self) -> bool;

    /// Mark the resource read-only or writable.
    fn set_read_only(&self, read_only: bool) -> Result<(), LocatorError>;

    /// Advisory lock capability, if the backend offers one.
    fn lock_capability(&self) -> Option<&dyn LockCapability> {
        None
    }

    /// The tamper-evident view of this locator, if it implements one.
    fn as_tamper_evident(&self) -> Option<&dyn TamperEvident> {
        None
    }
}

/// A locator that detects unauthorized change of its resource's content.
pub trait TamperEvident: ResourceLocator {
    /// The last known good fingerprint, `None` if never checkpointed.
    fn snapshot(&self) -> Option<ContentDigest>;

    /// Establish a snapshot if none exists, otherwise verify the current
    /// content against it.
    fn checkpoint(&self) -> Result<(), LocatorError>;

    /// Verify that `other` is tamper-evident and holds the same snapshot.
    fn ensure_equal(&self, other: &dyn ResourceLocator) -> Result<(), LocatorError>;

    /// Tamper-evident locator for a named child.
    fn guarded_child(&self, name: &str) -> Result<Option<Arc<dyn TamperEvident>>, LocatorError>;

    /// View this locator through the plain locator contract.
    fn into_locator(self: Arc<Self>) -> Arc<dyn ResourceLocator>;
}

/// Validate a single path segment used as a child name.
pub fn validate_name(name: &str) -> Result<&str, LocatorError> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0')
    {
        return Err(LocatorError::InvalidName(name.to_string()));
    }
    Ok(name)
}
