//! # In-Memory Locator Backend
//!
//! A path-keyed tree of byte blobs shared behind an `Arc<MemoryStore>`.
//! Directories are implicit: a path exists if it holds content or if any
//! descendant does. Every path has a [`MemoryLock`] so the advisory-lock
//! capability can be observed, and faults can be injected per path to
//! simulate a backend that fails for reasons other than absence.
//!
//! Write streams follow create semantics: opening one truncates the
//! resource, each `flush()` publishes the bytes written so far, and drop
//! flushes.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::LocatorError;
use crate::lock::{LockCapability, LockMode, LockOwner, ResourceLock};
use crate::locator::{
    validate_name, NameFilter, RandomAccess, RandomAccessHandle, ReadStream, ResourceLocator,
    WriteStream,
};

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

fn normalize(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    format!("/{}", segments.join("/"))
}

fn join(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

fn parent_of(path: &str) -> Option<String> {
    if path == "/" {
        return None;
    }
    match path.rsplit_once('/') {
        Some(("", _)) => Some("/".to_string()),
        Some((parent, _)) => Some(parent.to_string()),
        None => None,
    }
}

fn is_descendant(candidate: &str, ancestor: &str) -> bool {
    if ancestor == "/" {
        return candidate != "/";
    }
    candidate
        .strip_prefix(ancestor)
        .is_some_and(|rest| rest.starts_with('/'))
}

fn injected_fault(path: &str) -> LocatorError {
    LocatorError::Io(io::Error::new(
        io::ErrorKind::Other,
        format!("injected fault at {path}"),
    ))
}

fn not_found(path: &str) -> LocatorError {
    LocatorError::Io(io::Error::new(
        io::ErrorKind::NotFound,
        format!("no resource at {path}"),
    ))
}

// ---------------------------------------------------------------------------
// MemoryLock
// ---------------------------------------------------------------------------

/// Advisory lock over one in-memory path.
///
/// Exclusive requests conflicting with current holders fail immediately
/// with `WouldBlock` instead of waiting.
#[derive(Debug, Default)]
pub struct MemoryLock {
    holders: Mutex<HashMap<LockOwner, LockMode>>,
    acquisitions: AtomicUsize,
    releases: AtomicUsize,
    failing: AtomicBool,
}

impl MemoryLock {
    /// Number of owners currently holding the lock.
    pub fn holder_count(&self) -> usize {
        self.holders.lock().len()
    }

    /// Whether the lock is held by anyone.
    pub fn is_held(&self) -> bool {
        self.holder_count() > 0
    }

    /// Successful acquisitions so far.
    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }

    /// Successful releases so far.
    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    /// Make every subsequent `acquire` fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl ResourceLock for MemoryLock {
    fn acquire(&self, owner: LockOwner, mode: LockMode) -> Result<(), LocatorError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(LocatorError::Io(io::Error::new(
                io::ErrorKind::Other,
                "lock acquisition refused",
            )));
        }
        let mut holders = self.holders.lock();
        let conflict = holders
            .iter()
            .any(|(o, m)| *o != owner && (mode == LockMode::Exclusive || *m == LockMode::Exclusive));
        if conflict {
            return Err(LocatorError::Io(io::Error::new(
                io::ErrorKind::WouldBlock,
                format!("lock contended, requested by {owner}"),
            )));
        }
        holders.insert(owner, mode);
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn release(&self, owner: LockOwner) -> Result<(), LocatorError> {
        if self.holders.lock().remove(&owner).is_none() {
            return Err(LocatorError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{owner} does not hold the lock"),
            )));
        }
        self.releases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Entry {
    data: Vec<u8>,
    read_only: bool,
}

#[derive(Debug, Default)]
struct StoreState {
    files: BTreeMap<String, Entry>,
    faults: HashSet<String>,
}

/// Shared in-memory resource tree.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<StoreState>,
    locks: Mutex<HashMap<String, Arc<MemoryLock>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Locator for `path` (normalized, rooted at `/`).
    pub fn locator(self: &Arc<Self>, path: &str) -> Arc<MemoryLocator> {
        Arc::new(MemoryLocator::new(Arc::clone(self), normalize(path)))
    }

    /// Locator for the root.
    pub fn root(self: &Arc<Self>) -> Arc<MemoryLocator> {
        self.locator("/")
    }

    /// Raw content at `path`, bypassing every locator.
    pub fn read(&self, path: &str) -> Option<Vec<u8>> {
        self.state
            .read()
            .files
            .get(&normalize(path))
            .map(|e| e.data.clone())
    }

    /// Replace content at `path`, bypassing every locator.
    pub fn write(&self, path: &str, data: impl Into<Vec<u8>>) {
        let mut state = self.state.write();
        let entry = state.files.entry(normalize(path)).or_default();
        entry.data = data.into();
    }

    /// Remove content at `path`, bypassing every locator.
    pub fn remove(&self, path: &str) -> bool {
        self.state.write().files.remove(&normalize(path)).is_some()
    }

    /// Make every content access at `path` fail with a non-NotFound error.
    pub fn inject_fault(&self, path: &str) {
        self.state.write().faults.insert(normalize(path));
    }

    /// Undo [`inject_fault`](MemoryStore::inject_fault).
    pub fn clear_fault(&self, path: &str) {
        self.state.write().faults.remove(&normalize(path));
    }

    /// The advisory lock for `path`.
    pub fn lock_for(&self, path: &str) -> Arc<MemoryLock> {
        Arc::clone(self.locks.lock().entry(normalize(path)).or_default())
    }

    fn check_fault(&self, path: &str) -> Result<(), LocatorError> {
        if self.state.read().faults.contains(path) {
            return Err(injected_fault(path));
        }
        Ok(())
    }

    fn check_writable(&self, path: &str) -> Result<(), LocatorError> {
        let state = self.state.read();
        if state.faults.contains(path) {
            return Err(injected_fault(path));
        }
        if state.files.get(path).is_some_and(|e| e.read_only) {
            return Err(LocatorError::ReadOnly(path.to_string()));
        }
        Ok(())
    }

    fn publish(&self, path: &str, data: &[u8]) -> io::Result<()> {
        self.check_writable(path).map_err(io::Error::from)?;
        let mut state = self.state.write();
        let entry = state.files.entry(path.to_string()).or_default();
        entry.data.clear();
        entry.data.extend_from_slice(data);
        Ok(())
    }

    fn exists(&self, path: &str) -> bool {
        if path == "/" {
            return true;
        }
        let state = self.state.read();
        state.files.contains_key(path) || state.files.keys().any(|k| is_descendant(k, path))
    }
}

// ---------------------------------------------------------------------------
// MemoryLocator
// ---------------------------------------------------------------------------

/// Locator for one path inside a [`MemoryStore`].
#[derive(Debug, Clone)]
pub struct MemoryLocator {
    store: Arc<MemoryStore>,
    path: String,
    name_start: usize,
}

impl MemoryLocator {
    fn new(store: Arc<MemoryStore>, path: String) -> Self {
        let name_start = path.rfind('/').map(|i| i + 1).unwrap_or(0);
        Self {
            store,
            path,
            name_start,
        }
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    fn sibling(&self, path: String) -> Arc<dyn ResourceLocator> {
        Arc::new(Self::new(Arc::clone(&self.store), path))
    }
}

impl PartialEq for MemoryLocator {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.store, &other.store) && self.path == other.path
    }
}

impl Eq for MemoryLocator {}

impl ResourceLocator for MemoryLocator {
    fn path(&self) -> &str {
        &self.path
    }

    fn name(&self) -> &str {
        &self.path[self.name_start..]
    }

    fn open_read(&self) -> Result<ReadStream, LocatorError> {
        self.store.check_fault(&self.path)?;
        let data = self.store.read(&self.path).ok_or_else(|| not_found(&self.path))?;
        Ok(Box::new(Cursor::new(data)))
    }

    fn open_write(&self) -> Result<WriteStream, LocatorError> {
        self.store.check_writable(&self.path)?;
        self.store.publish(&self.path, &[])?;
        Ok(Box::new(MemoryWriter {
            store: Arc::clone(&self.store),
            path: self.path.clone(),
            buf: Vec::new(),
            dirty: false,
        }))
    }

    fn open_random_access(&self) -> Result<RandomAccessHandle, LocatorError> {
        self.store.check_writable(&self.path)?;
        let existing = self.store.read(&self.path);
        let created = existing.is_none();
        if created {
            self.store.publish(&self.path, &[])?;
        }
        Ok(Box::new(MemoryRandomAccess {
            store: Arc::clone(&self.store),
            path: self.path.clone(),
            cursor: Cursor::new(existing.unwrap_or_default()),
            dirty: false,
        }))
    }

    fn child(&self, name: &str) -> Result<Option<Arc<dyn ResourceLocator>>, LocatorError> {
        let name = validate_name(name)?;
        Ok(Some(self.sibling(join(&self.path, name))))
    }

    fn parent(&self) -> Option<Arc<dyn ResourceLocator>> {
        parent_of(&self.path).map(|p| self.sibling(p))
    }

    fn list_children(
        &self,
        filter: NameFilter<'_>,
    ) -> Result<Vec<Arc<dyn ResourceLocator>>, LocatorError> {
        let names: BTreeSet<String> = {
            let state = self.store.state.read();
            state
                .files
                .keys()
                .filter(|k| is_descendant(k, &self.path))
                .filter_map(|k| {
                    let rest = if self.path == "/" {
                        &k[1..]
                    } else {
                        &k[self.path.len() + 1..]
                    };
                    rest.split('/').next().map(str::to_string)
                })
                .filter(|n| filter(n.as_str()))
                .collect()
        };
        Ok(names
            .into_iter()
            .map(|n| self.sibling(join(&self.path, &n)))
            .collect())
    }

    fn exists(&self) -> bool {
        self.store.exists(&self.path)
    }

    fn len(&self) -> Result<u64, LocatorError> {
        self.store.check_fault(&self.path)?;
        let state = self.store.state.read();
        match state.files.get(&self.path) {
            Some(entry) => Ok(entry.data.len() as u64),
            None if state.files.keys().any(|k| is_descendant(k, &self.path)) => Ok(0),
            None => Err(not_found(&self.path)),
        }
    }

    fn delete(&self) -> Result<(), LocatorError> {
        self.store.check_writable(&self.path)?;
        let mut state = self.store.state.write();
        let before = state.files.len();
        let path = self.path.clone();
        state
            .files
            .retain(|k, _| *k != path && !is_descendant(k, &path));
        if state.files.len() == before {
            return Err(not_found(&self.path));
        }
        Ok(())
    }

    fn rename(&self, new_name: &str) -> Result<Arc<dyn ResourceLocator>, LocatorError> {
        let new_name = validate_name(new_name)?;
        let parent = parent_of(&self.path).ok_or_else(|| LocatorError::InvalidName("/".into()))?;
        let target = join(&parent, new_name);
        self.store.check_writable(&self.path)?;
        {
            let mut state = self.store.state.write();
            let moved: Vec<String> = state
                .files
                .keys()
                .filter(|k| **k == self.path || is_descendant(k, &self.path))
                .cloned()
                .collect();
            if moved.is_empty() {
                return Err(not_found(&self.path));
            }
            for old in moved {
                if let Some(entry) = state.files.remove(&old) {
                    let new_key = format!("{target}{}", &old[self.path.len()..]);
                    state.files.insert(new_key, entry);
                }
            }
        }
        Ok(self.sibling(target))
    }

    fn is_read_only(&self) -> bool {
        self.store
            .state
            .read()
            .files
            .get(&self.path)
            .is_some_and(|e| e.read_only)
    }

    fn set_read_only(&self, read_only: bool) -> Result<(), LocatorError> {
        let mut state = self.store.state.write();
        let entry = state
            .files
            .get_mut(&self.path)
            .ok_or_else(|| not_found(&self.path))?;
        entry.read_only = read_only;
        Ok(())
    }

    fn lock_capability(&self) -> Option<&dyn LockCapability> {
        Some(self)
    }
}

impl LockCapability for MemoryLocator {
    fn lock(&self) -> Result<Arc<dyn ResourceLock>, LocatorError> {
        Ok(self.store.lock_for(&self.path))
    }
}

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

struct MemoryWriter {
    store: Arc<MemoryStore>,
    path: String,
    buf: Vec<u8>,
    dirty: bool,
}

impl Write for MemoryWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        self.dirty = true;
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.dirty {
            self.store.publish(&self.path, &self.buf)?;
            self.dirty = false;
        }
        Ok(())
    }
}

impl Drop for MemoryWriter {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            tracing::warn!(path = %self.path, "memory write stream dropped unflushed: {e}");
        }
    }
}

struct MemoryRandomAccess {
    store: Arc<MemoryStore>,
    path: String,
    cursor: Cursor<Vec<u8>>,
    dirty: bool,
}

impl Read for MemoryRandomAccess {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        self.cursor.read(out)
    }
}

impl Write for MemoryRandomAccess {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.dirty = true;
        self.cursor.write(data)
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.dirty {
            self.store.publish(&self.path, self.cursor.get_ref())?;
            self.dirty = false;
        }
        Ok(())
    }
}

impl Seek for MemoryRandomAccess {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.cursor.seek(pos)
    }
}

impl RandomAccess for MemoryRandomAccess {
    fn len(&mut self) -> io::Result<u64> {
        Ok(self.cursor.get_ref().len() as u64)
    }

    fn set_len(&mut self, len: u64) -> io::Result<()> {
        let len = usize::try_from(len)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "length overflows usize"))?;
        self.cursor.get_mut().resize(len, 0);
        self.dirty = true;
        Ok(())
    }
}

impl Drop for MemoryRandomAccess {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            tracing::warn!(path = %self.path, "memory random-access handle dropped unflushed: {e}");
        }
    }
}
