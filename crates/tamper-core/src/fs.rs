//! # Filesystem Locator Backend
//!
//! `std::fs` backed locators. Writes use create semantics (the file is
//! truncated when the stream opens) and parent directories are created on
//! demand. This backend offers no advisory lock capability.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::LocatorError;
use crate::locator::{
    validate_name, NameFilter, RandomAccessHandle, ReadStream, ResourceLocator, WriteStream,
};

/// Locator for one filesystem path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FsLocator {
    path: PathBuf,
    display: String,
    name: String,
}

impl FsLocator {
    /// Locator for `path`. The path need not exist.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let display = path.to_string_lossy().into_owned();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            path,
            display,
            name,
        }
    }

    /// The underlying filesystem path.
    pub fn fs_path(&self) -> &Path {
        &self.path
    }

    fn ensure_parent(&self) -> io::Result<()> {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
            _ => Ok(()),
        }
    }

    fn wrap(path: PathBuf) -> Arc<dyn ResourceLocator> {
        Arc::new(Self::new(path))
    }
}

impl ResourceLocator for FsLocator {
    fn path(&self) -> &str {
        &self.display
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn open_read(&self) -> Result<ReadStream, LocatorError> {
        Ok(Box::new(fs::File::open(&self.path)?))
    }

    fn open_write(&self) -> Result<WriteStream, LocatorError> {
        if self.is_read_only() {
            return Err(LocatorError::ReadOnly(self.display.clone()));
        }
        self.ensure_parent()?;
        Ok(Box::new(fs::File::create(&self.path)?))
    }

    fn open_random_access(&self) -> Result<RandomAccessHandle, LocatorError> {
        if self.is_read_only() {
            return Err(LocatorError::ReadOnly(self.display.clone()));
        }
        self.ensure_parent()?;
        let file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)?;
        Ok(Box::new(file))
    }

    fn child(&self, name: &str) -> Result<Option<Arc<dyn ResourceLocator>>, LocatorError> {
        let name = validate_name(name)?;
        if self.path.is_file() {
            return Ok(None);
        }
        Ok(Some(Self::wrap(self.path.join(name))))
    }

    fn parent(&self) -> Option<Arc<dyn ResourceLocator>> {
        self.path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| Self::wrap(p.to_path_buf()))
    }

    fn list_children(
        &self,
        filter: NameFilter<'_>,
    ) -> Result<Vec<Arc<dyn ResourceLocator>>, LocatorError> {
        if !self.path.is_dir() {
            return Ok(Vec::new());
        }
        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            let name = entry.file_name();
            if filter(name.to_string_lossy().as_ref()) {
                paths.push(entry.path());
            }
        }
        paths.sort();
        Ok(paths.into_iter().map(Self::wrap).collect())
    }

    fn exists(&self) -> bool {
        self.path.exists()
    }

    fn len(&self) -> Result<u64, LocatorError> {
        Ok(fs::metadata(&self.path)?.len())
    }

    fn delete(&self) -> Result<(), LocatorError> {
        if self.path.is_dir() {
            fs::remove_dir_all(&self.path)?;
        } else {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    fn rename(&self, new_name: &str) -> Result<Arc<dyn ResourceLocator>, LocatorError> {
        let new_name = validate_name(new_name)?;
        let target = self.path.with_file_name(new_name);
        fs::rename(&self.path, &target)?;
        Ok(Self::wrap(target))
    }

    fn is_read_only(&self) -> bool {
        fs::metadata(&self.path)
            .map(|m| m.permissions().readonly())
            .unwrap_or(false)
    }

    fn set_read_only(&self, read_only: bool) -> Result<(), LocatorError> {
        let mut perms = fs::metadata(&self.path)?.permissions();
        #[allow(clippy::permissions_set_readonly_false)]
        perms.set_readonly(read_only);
        fs::set_permissions(&self.path, perms)?;
        Ok(())
    }
}
