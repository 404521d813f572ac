//! # Passthrough Tamper-Evident Locator
//!
//! Alternate strategy for resources too large to buffer. Streams and
//! random-access handles go straight to the wrapped locator and reads are
//! not verified per call; protection comes from the construction-time
//! snapshot plus explicit `checkpoint()` / `ensure_equal()` calls.
//!
//! Writes made through this locator still move the snapshot forward on
//! every successful flush: write streams hash the bytes as they pass
//! through, and a mutated random-access handle re-digests the resource.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use tamper_core::{
    ContentDigest, LockCapability, LocatorError, NameFilter, RandomAccess, RandomAccessHandle,
    ReadStream, ResourceLocator, TamperEvident, WriteStream,
};

use crate::engine::DigestEngine;
use crate::factory::DigestingFactory;
use crate::guard::GuardCore;

/// Tamper-evident locator that forwards content access unbuffered.
pub struct PassthroughLocator {
    core: Arc<GuardCore>,
}

impl PassthroughLocator {
    /// Wrap `wrapped`, taking the initial snapshot.
    pub fn new(wrapped: Arc<dyn ResourceLocator>, factory: Arc<DigestingFactory>) -> Arc<Self> {
        Arc::new(Self {
            core: Arc::new(GuardCore::new(wrapped, factory)),
        })
    }
}

impl fmt::Debug for PassthroughLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PassthroughLocator")
            .field("wrapped", self.core.wrapped())
            .field("snapshot", &self.core.snapshot())
            .finish()
    }
}

impl PartialEq for PassthroughLocator {
    fn eq(&self, other: &Self) -> bool {
        self.core.path() == other.core.path()
    }
}

impl Eq for PassthroughLocator {}

impl Hash for PassthroughLocator {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.core.path().hash(state);
    }
}

impl ResourceLocator for PassthroughLocator {
    fn path(&self) -> &str {
        self.core.path()
    }

    fn name(&self) -> &str {
        self.core.wrapped().name()
    }

    fn open_read(&self) -> Result<ReadStream, LocatorError> {
        self.core.check_deferred()?;
        self.core.wrapped().open_read()
    }

    fn open_write(&self) -> Result<WriteStream, LocatorError> {
        self.core.check_deferred()?;
        let inner = self.core.wrapped().open_write()?;
        Ok(Box::new(HashingWriter {
            inner: Some(inner),
            engine: self.core.factory().detached_engine(),
            written: false,
            core: Arc::clone(&self.core),
        }))
    }

    fn open_random_access(&self) -> Result<RandomAccessHandle, LocatorError> {
        self.core.check_deferred()?;
        let inner = self.core.wrapped().open_random_access()?;
        Ok(Box::new(TrackingRandomAccess {
            inner: Some(inner),
            changed: false,
            core: Arc::clone(&self.core),
        }))
    }

    fn child(&self, name: &str) -> Result<Option<Arc<dyn ResourceLocator>>, LocatorError> {
        self.core.child(name)
    }

    fn parent(&self) -> Option<Arc<dyn ResourceLocator>> {
        self.core.parent()
    }

    fn list_children(
        &self,
        filter: NameFilter<'_>,
    ) -> Result<Vec<Arc<dyn ResourceLocator>>, LocatorError> {
        self.core.list_children(filter)
    }

    fn exists(&self) -> bool {
        self.core.wrapped().exists()
    }

    fn len(&self) -> Result<u64, LocatorError> {
        self.core.wrapped().len()
    }

    fn delete(&self) -> Result<(), LocatorError> {
        self.core.wrapped().delete()
    }

    fn rename(&self, new_name: &str) -> Result<Arc<dyn ResourceLocator>, LocatorError> {
        self.core.rename(new_name)
    }

    fn is_read_only(&self) -> bool {
        self.core.wrapped().is_read_only()
    }

    fn set_read_only(&self, read_only: bool) -> Result<(), LocatorError> {
        self.core.wrapped().set_read_only(read_only)
    }

    fn lock_capability(&self) -> Option<&dyn LockCapability> {
        self.core.wrapped().lock_capability()
    }

    fn as_tamper_evident(&self) -> Option<&dyn TamperEvident> {
        Some(self)
    }
}

impl TamperEvident for PassthroughLocator {
    fn snapshot(&self) -> Option<ContentDigest> {
        self.core.snapshot()
    }

    fn checkpoint(&self) -> Result<(), LocatorError> {
        self.core.checkpoint()
    }

    fn ensure_equal(&self, other: &dyn ResourceLocator) -> Result<(), LocatorError> {
        self.core.ensure_equal(other)
    }

    fn guarded_child(&self, name: &str) -> Result<Option<Arc<dyn TamperEvident>>, LocatorError> {
        self.core.guarded_child(name)
    }

    fn into_locator(self: Arc<Self>) -> Arc<dyn ResourceLocator> {
        self
    }
}

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

/// Forwards writes and hashes them on the way through. Every successful
/// flush refreshes the snapshot from the bytes hashed so far.
struct HashingWriter {
    inner: Option<WriteStream>,
    engine: Box<dyn DigestEngine>,
    written: bool,
    core: Arc<GuardCore>,
}

impl HashingWriter {
    fn inner(&mut self) -> io::Result<&mut WriteStream> {
        self.inner
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "write stream closed"))
    }
}

impl Write for HashingWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let n = self.inner()?.write(data)?;
        self.engine.update(&data[..n]);
        self.written = true;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner()?.flush()?;
        if self.written {
            let digest = self.engine.peek()?;
            self.core.refresh_snapshot(digest);
        } else {
            // Whether opening alone truncated depends on the backend.
            redigest(&self.core)?;
        }
        Ok(())
    }
}

impl Drop for HashingWriter {
    fn drop(&mut self) {
        if self.inner.is_none() {
            return;
        }
        if let Err(e) = self.flush() {
            tracing::warn!(path = self.core.path(), "passthrough write failed to flush, snapshot kept: {e}");
        }
        self.inner = None;
    }
}

/// Forwards random access. A flush after any mutation re-digests the
/// resource and refreshes the snapshot.
struct TrackingRandomAccess {
    inner: Option<RandomAccessHandle>,
    changed: bool,
    core: Arc<GuardCore>,
}

impl TrackingRandomAccess {
    fn inner(&mut self) -> io::Result<&mut RandomAccessHandle> {
        self.inner
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "handle closed"))
    }
}

impl Read for TrackingRandomAccess {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        self.inner()?.read(out)
    }
}

impl Write for TrackingRandomAccess {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.changed = true;
        self.inner()?.write(data)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner()?.flush()?;
        if self.changed {
            redigest(&self.core)?;
            self.changed = false;
        }
        Ok(())
    }
}

impl Seek for TrackingRandomAccess {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner()?.seek(pos)
    }
}

impl RandomAccess for TrackingRandomAccess {
    fn len(&mut self) -> io::Result<u64> {
        self.inner()?.len()
    }

    fn set_len(&mut self, len: u64) -> io::Result<()> {
        self.changed = true;
        self.inner()?.set_len(len)
    }
}

impl Drop for TrackingRandomAccess {
    fn drop(&mut self) {
        if self.inner.is_none() {
            return;
        }
        if let Err(e) = self.flush() {
            tracing::warn!(path = self.core.path(), "passthrough handle failed to flush, snapshot kept: {e}");
        }
        self.inner = None;
    }
}

/// Re-read the wrapped resource and take its digest as the new snapshot.
fn redigest(core: &GuardCore) -> io::Result<()> {
    match core.factory().digest_locator(core.wrapped().as_ref())? {
        Some(digest) => core.refresh_snapshot(digest),
        None => tracing::warn!(path = core.path(), "resource vanished after passthrough write"),
    }
    Ok(())
}
