//! # Buffered Tamper-Evident Locator
//!
//! Default strategy. The full content of the resource is held in a cached
//! buffer and every handle works against it; the wrapped locator is only
//! touched to load the buffer and to write complete new content.
//!
//! ## Committed Reads
//!
//! A read handle gets its own reference to the buffer that was current when
//! it opened. Flushing a write never mutates that buffer in place: a new
//! buffer is swapped in under the instance mutex. Readers therefore see
//! either the complete old content or the complete new content, never a
//! partial write.
//!
//! ## Reference Counting
//!
//! ```text
//! unacquired(0) --acquire--> acquired(1) --acquire--> acquired(n+1)
//! acquired(n)   --release--> acquired(n-1)  ...  acquired(1) --release--> unacquired(0)
//! ```
//!
//! The wrapped resource's advisory lock is taken on 0→1 and released on
//! 1→0. Failing to take it is logged and ignored.
//!
//! ## Cache Entry
//!
//! The buffer is `Empty`, `Strong` or `Weak`. With `retain_buffer` off it is
//! demoted to `Weak` when the last handle closes, and `evict_buffer()`
//! demotes it on demand. Any reload is verified against the snapshot; a
//! mismatch is an integrity error, and so is the resource vanishing.
//!
//! ## Write Window
//!
//! The snapshot is computed from the bytes just written, not from a second
//! read. A third party writing between the physical write and the snapshot
//! update is not detected; the backend is not transactional.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tamper_core::{
    ContentDigest, LockCapability, LockMode, LockOwner, LocatorError, NameFilter, RandomAccess,
    RandomAccessHandle, ReadStream, ResourceLock, ResourceLocator, TamperEvident, WriteStream,
};

use crate::factory::DigestingFactory;
use crate::guard::GuardCore;

#[derive(Debug, Default)]
enum CachedBuffer {
    #[default]
    Empty,
    Strong(Arc<[u8]>),
    Weak(Weak<[u8]>),
}

impl CachedBuffer {
    fn get(&self) -> Option<Arc<[u8]>> {
        match self {
            Self::Empty => None,
            Self::Strong(buf) => Some(Arc::clone(buf)),
            Self::Weak(buf) => buf.upgrade(),
        }
    }

    fn demote(&mut self) {
        if let Self::Strong(buf) = self {
            *self = Self::Weak(Arc::downgrade(buf));
        }
    }
}

#[derive(Default)]
struct BufferState {
    buffer: CachedBuffer,
    lock: Option<Arc<dyn ResourceLock>>,
    ref_count: u32,
}

/// Tamper-evident locator that buffers full content in memory.
pub struct BufferedLocator {
    core: GuardCore,
    state: Mutex<BufferState>,
    owner: LockOwner,
    self_ref: Weak<BufferedLocator>,
}

impl BufferedLocator {
    /// Wrap `wrapped`, taking the initial snapshot.
    pub fn new(wrapped: Arc<dyn ResourceLocator>, factory: Arc<DigestingFactory>) -> Arc<Self> {
        let core = GuardCore::new(wrapped, factory);
        Arc::new_cyclic(|self_ref| Self {
            core,
            state: Mutex::new(BufferState::default()),
            owner: LockOwner::next(),
            self_ref: self_ref.clone(),
        })
    }

    /// Number of open handles.
    pub fn ref_count(&self) -> u32 {
        self.state.lock().ref_count
    }

    /// Whether a buffer is currently reachable without a reload.
    pub fn is_buffered(&self) -> bool {
        self.state.lock().buffer.get().is_some()
    }

    /// Drop the strong reference to the buffer. Open handles keep their
    /// copies; the next open reloads and verifies.
    pub fn evict_buffer(&self) {
        self.state.lock().buffer.demote();
    }

    fn this(&self) -> Result<Arc<Self>, LocatorError> {
        self.self_ref.upgrade().ok_or_else(|| {
            LocatorError::Io(io::Error::new(
                io::ErrorKind::Other,
                format!("locator for {} is being dropped", self.core.path()),
            ))
        })
    }

    fn retain_buffer(&self) -> bool {
        self.core.factory().config().retain_buffer
    }

    /// Return the cached buffer, reloading and verifying it if needed.
    fn load_locked(&self, state: &mut BufferState) -> Result<Arc<[u8]>, LocatorError> {
        if let Some(buf) = state.buffer.get() {
            return Ok(buf);
        }
        self.core.check_deferred()?;

        let wrapped = self.core.wrapped();
        let bytes = match wrapped.open_read() {
            Ok(mut stream) => {
                let mut bytes = Vec::new();
                match stream.read_to_end(&mut bytes) {
                    Ok(_) => Some(bytes),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => None,
                    Err(e) => return Err(e.into()),
                }
            }
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };

        let Some(bytes) = bytes else {
            // Absent content is compared as empty: a snapshot of anything
            // else means the content disappeared.
            self.core.verify(None)?;
            return Err(LocatorError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no resource at {}", self.core.path()),
            )));
        };

        // With no snapshot yet, the loaded bytes become it, so a cached
        // buffer always matches the snapshot.
        let actual = self.core.factory().digest_bytes(&bytes)?;
        if !self.core.establish_snapshot(actual.clone(), "load") {
            self.core.verify(Some(&actual))?;
        }

        let buf: Arc<[u8]> = Arc::from(bytes);
        tracing::debug!(path = self.core.path(), len = buf.len(), "buffer loaded");
        state.buffer = CachedBuffer::Strong(Arc::clone(&buf));
        Ok(buf)
    }

    fn acquire_locked(&self, state: &mut BufferState) {
        state.ref_count = state.ref_count.saturating_add(1);
        if state.ref_count != 1 || !self.core.factory().config().lock_while_open {
            return;
        }
        let Some(capability) = self.core.wrapped().lock_capability() else {
            return;
        };
        match capability
            .lock()
            .and_then(|lock| lock.acquire(self.owner, LockMode::Shared).map(|()| lock))
        {
            Ok(lock) => {
                tracing::debug!(path = self.core.path(), owner = %self.owner, "resource lock acquired");
                state.lock = Some(lock);
            }
            Err(e) => {
                tracing::warn!(path = self.core.path(), "resource lock not acquired, continuing: {e}");
            }
        }
    }

    fn acquire(&self) {
        let mut state = self.state.lock();
        self.acquire_locked(&mut state);
    }

    fn release(&self) {
        let mut state = self.state.lock();
        if state.ref_count == 0 {
            tracing::warn!(path = self.core.path(), "release without matching acquire");
            return;
        }
        state.ref_count -= 1;
        if state.ref_count > 0 {
            return;
        }
        if let Some(lock) = state.lock.take() {
            match lock.release(self.owner) {
                Ok(()) => {
                    tracing::debug!(path = self.core.path(), owner = %self.owner, "resource lock released");
                }
                Err(e) => tracing::warn!(path = self.core.path(), "resource lock release failed: {e}"),
            }
        }
        if !self.retain_buffer() {
            state.buffer.demote();
        }
    }

    /// Replace the content: swap in the new buffer, write it through, and
    /// snapshot the bytes just written. One critical section.
    fn dump_bytes(&self, bytes: Vec<u8>) -> Result<(), LocatorError> {
        let mut state = self.state.lock();
        self.core.check_deferred()?;

        let buf: Arc<[u8]> = Arc::from(bytes);
        state.buffer = CachedBuffer::Strong(Arc::clone(&buf));
        if let Err(e) = write_through(self.core.wrapped().as_ref(), &buf) {
            state.buffer = CachedBuffer::Empty;
            return Err(e);
        }
        let digest = self.core.factory().digest_bytes(&buf)?;
        self.core.refresh_snapshot(digest);
        Ok(())
    }
}

fn write_through(wrapped: &dyn ResourceLocator, bytes: &[u8]) -> Result<(), LocatorError> {
    let mut stream = wrapped.open_write()?;
    stream.write_all(bytes)?;
    stream.flush()?;
    Ok(())
}

impl fmt::Debug for BufferedLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferedLocator")
            .field("wrapped", self.core.wrapped())
            .field("snapshot", &self.core.snapshot())
            .finish_non_exhaustive()
    }
}

impl PartialEq for BufferedLocator {
    fn eq(&self, other: &Self) -> bool {
        self.core.path() == other.core.path()
    }
}

impl Eq for BufferedLocator {}

impl Hash for BufferedLocator {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.core.path().hash(state);
    }
}

impl ResourceLocator for BufferedLocator {
    fn path(&self) -> &str {
        self.core.path()
    }

    fn name(&self) -> &str {
        self.core.wrapped().name()
    }

    fn open_read(&self) -> Result<ReadStream, LocatorError> {
        let owner = self.this()?;
        let mut state = self.state.lock();
        let buf = self.load_locked(&mut state)?;
        self.acquire_locked(&mut state);
        Ok(Box::new(BufferedReader {
            cursor: Cursor::new(buf),
            owner,
        }))
    }

    fn open_write(&self) -> Result<WriteStream, LocatorError> {
        self.core.check_deferred()?;
        if self.core.wrapped().is_read_only() {
            return Err(LocatorError::ReadOnly(self.path().to_string()));
        }
        let owner = self.this()?;
        self.acquire();
        Ok(Box::new(BufferedWriter {
            buf: Vec::new(),
            pending: true,
            owner,
        }))
    }

    fn open_random_access(&self) -> Result<RandomAccessHandle, LocatorError> {
        if self.core.wrapped().is_read_only() {
            return Err(LocatorError::ReadOnly(self.path().to_string()));
        }
        let owner = self.this()?;
        let mut state = self.state.lock();
        let content = match self.load_locked(&mut state) {
            Ok(buf) => buf.to_vec(),
            Err(e) if e.is_not_found() => Vec::new(),
            Err(e) => return Err(e),
        };
        self.acquire_locked(&mut state);
        Ok(Box::new(BufferedRandomAccess {
            cursor: Cursor::new(content),
            changed: false,
            owner,
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
        let mut state = self.state.lock();
        self.core.wrapped().delete()?;
        state.buffer = CachedBuffer::Empty;
        Ok(())
    }

    fn rename(&self, new_name: &str) -> Result<Arc<dyn ResourceLocator>, LocatorError> {
        let renamed = {
            let mut state = self.state.lock();
            let renamed = self.core.wrapped().rename(new_name)?;
            state.buffer = CachedBuffer::Empty;
            renamed
        };
        Ok(self.core.factory().create(renamed).into_locator())
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

impl TamperEvident for BufferedLocator {
    fn snapshot(&self) -> Option<ContentDigest> {
        self.core.snapshot()
    }

    fn checkpoint(&self) -> Result<(), LocatorError> {
        // Serialized with dump_bytes so a flush in progress is never observed.
        let _state = self.state.lock();
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

struct BufferedReader {
    cursor: Cursor<Arc<[u8]>>,
    owner: Arc<BufferedLocator>,
}

impl Read for BufferedReader {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        self.cursor.read(out)
    }
}

impl Drop for BufferedReader {
    fn drop(&mut self) {
        self.owner.release();
    }
}

struct BufferedWriter {
    buf: Vec<u8>,
    // Create semantics: the first flush replaces content even if empty.
    pending: bool,
    owner: Arc<BufferedLocator>,
}

impl Write for BufferedWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        self.pending = true;
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.pending {
            self.owner.dump_bytes(self.buf.clone())?;
            self.pending = false;
        }
        Ok(())
    }
}

impl Drop for BufferedWriter {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            tracing::warn!(path = self.owner.path(), "write stream closed without flushing: {e}");
        }
        self.owner.release();
    }
}

struct BufferedRandomAccess {
    cursor: Cursor<Vec<u8>>,
    changed: bool,
    owner: Arc<BufferedLocator>,
}

impl Read for BufferedRandomAccess {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        self.cursor.read(out)
    }
}

impl Write for BufferedRandomAccess {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.changed = true;
        self.cursor.write(data)
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.changed {
            self.owner.dump_bytes(self.cursor.get_ref().clone())?;
            self.changed = false;
        }
        Ok(())
    }
}

impl Seek for BufferedRandomAccess {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.cursor.seek(pos)
    }
}

impl RandomAccess for BufferedRandomAccess {
    fn len(&mut self) -> io::Result<u64> {
        Ok(self.cursor.get_ref().len() as u64)
    }

    fn set_len(&mut self, len: u64) -> io::Result<()> {
        let len = usize::try_from(len)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "length overflows usize"))?;
        if len != self.cursor.get_ref().len() {
            self.cursor.get_mut().resize(len, 0);
            self.changed = true;
        }
        Ok(())
    }
}

impl Drop for BufferedRandomAccess {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            tracing::warn!(path = self.owner.path(), "random-access handle closed without flushing: {e}");
        }
        self.owner.release();
    }
}
