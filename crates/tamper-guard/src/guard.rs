//! # Shared Tamper-Evident Core
//!
//! State and behavior common to every tamper-evident strategy: the wrapped
//! locator, the snapshot, the deferred construction error, `checkpoint`,
//! `ensure_equal`, and structural pass-through that re-wraps every returned
//! locator through the same factory.
//!
//! ## Construction Outcomes
//!
//! Exactly one of these holds after construction:
//!
//! - the resource existed and was digested: `snapshot` is set;
//! - the resource did not exist: neither field is set;
//! - digesting failed for another reason: `deferred` holds the error, and
//!   every content-accessing call raises it.

use std::io;
use std::sync::Arc;

use parking_lot::Mutex;
use tamper_core::{ContentDigest, LocatorError, NameFilter, ResourceLocator, TamperEvident};

use crate::factory::DigestingFactory;

#[derive(Debug, Default)]
struct IntegrityState {
    snapshot: Option<ContentDigest>,
    deferred: Option<Arc<io::Error>>,
}

/// Wrapped locator plus integrity state, embedded by each strategy.
pub(crate) struct GuardCore {
    wrapped: Arc<dyn ResourceLocator>,
    factory: Arc<DigestingFactory>,
    integrity: Mutex<IntegrityState>,
}

impl GuardCore {
    /// Take the initial snapshot of `wrapped`.
    pub(crate) fn new(wrapped: Arc<dyn ResourceLocator>, factory: Arc<DigestingFactory>) -> Self {
        let mut state = IntegrityState::default();
        match factory.digest_locator(wrapped.as_ref()) {
            Ok(Some(digest)) => {
                tracing::debug!(path = wrapped.path(), %digest, "initial snapshot taken");
                state.snapshot = Some(digest);
            }
            Ok(None) => {
                tracing::debug!(path = wrapped.path(), "resource absent, no initial snapshot");
            }
            Err(e) => {
                tracing::warn!(path = wrapped.path(), "initial digest failed, deferring: {e}");
                state.deferred = Some(Arc::new(io::Error::from(e)));
            }
        }
        Self {
            wrapped,
            factory,
            integrity: Mutex::new(state),
        }
    }

    pub(crate) fn wrapped(&self) -> &Arc<dyn ResourceLocator> {
        &self.wrapped
    }

    pub(crate) fn factory(&self) -> &Arc<DigestingFactory> {
        &self.factory
    }

    pub(crate) fn path(&self) -> &str {
        self.wrapped.path()
    }

    pub(crate) fn snapshot(&self) -> Option<ContentDigest> {
        self.integrity.lock().snapshot.clone()
    }

    /// Record the digest of content this instance just wrote.
    pub(crate) fn refresh_snapshot(&self, digest: ContentDigest) {
        tracing::debug!(path = self.path(), %digest, "snapshot refreshed");
        self.integrity.lock().snapshot = Some(digest);
    }

    /// Raise the stored construction failure, if any.
    pub(crate) fn check_deferred(&self) -> Result<(), LocatorError> {
        match &self.integrity.lock().deferred {
            Some(source) => Err(LocatorError::DeferredConstruction {
                locator: self.path().to_string(),
                source: Arc::clone(source),
            }),
            None => Ok(()),
        }
    }

    /// Verify `observed` against the snapshot. `None` means the resource
    /// is absent, which is compared as empty content.
    pub(crate) fn verify(&self, observed: Option<&ContentDigest>) -> Result<(), LocatorError> {
        let Some(expected) = self.snapshot() else {
            return Ok(());
        };
        let matches = match observed {
            Some(actual) => *actual == expected,
            None => self.factory.empty_digest()? == expected,
        };
        if matches {
            return Ok(());
        }
        let actual = observed.map_or_else(|| "absent".to_string(), ToString::to_string);
        tracing::warn!(path = self.path(), %expected, %actual, "integrity violation");
        Err(LocatorError::integrity(self.path(), expected, actual))
    }

    pub(crate) fn checkpoint(&self) -> Result<(), LocatorError> {
        self.check_deferred()?;
        let observed = self.factory.digest_locator(self.wrapped.as_ref())?;
        if self.snapshot().is_none() {
            let digest = match observed {
                Some(digest) => digest,
                None => self.factory.empty_digest()?,
            };
            self.establish_snapshot(digest, "checkpoint");
            return Ok(());
        }
        self.verify(observed.as_ref())
    }

    /// Set the snapshot unless one appeared meanwhile; an existing one wins.
    /// Returns whether `digest` was taken.
    pub(crate) fn establish_snapshot(&self, digest: ContentDigest, by: &str) -> bool {
        let mut state = self.integrity.lock();
        if state.snapshot.is_some() {
            return false;
        }
        tracing::debug!(path = self.path(), %digest, by, "snapshot established");
        state.snapshot = Some(digest);
        true
    }

    pub(crate) fn ensure_equal(&self, other: &dyn ResourceLocator) -> Result<(), LocatorError> {
        self.check_deferred()?;
        let peer = other
            .as_tamper_evident()
            .ok_or_else(|| LocatorError::Incomparable {
                locator: self.path().to_string(),
                reason: format!("{} is not tamper-evident", other.path()),
            })?;
        if peer.snapshot().is_none() {
            peer.checkpoint()?;
        }
        let (Some(mine), Some(theirs)) = (self.snapshot(), peer.snapshot()) else {
            return Ok(());
        };
        if mine.algorithm != theirs.algorithm {
            return Err(LocatorError::Incomparable {
                locator: self.path().to_string(),
                reason: format!(
                    "{} uses {}, this locator uses {}",
                    other.path(),
                    theirs.algorithm,
                    mine.algorithm
                ),
            });
        }
        if mine != theirs {
            tracing::warn!(path = self.path(), peer = other.path(), "snapshots differ");
            return Err(LocatorError::integrity(self.path(), mine, theirs));
        }
        Ok(())
    }

    // -- structural pass-through ------------------------------------------

    fn wrap(&self, location: Arc<dyn ResourceLocator>) -> Arc<dyn ResourceLocator> {
        self.factory.create(location).into_locator()
    }

    pub(crate) fn child(&self, name: &str) -> Result<Option<Arc<dyn ResourceLocator>>, LocatorError> {
        Ok(self.wrapped.child(name)?.map(|c| self.wrap(c)))
    }

    pub(crate) fn guarded_child(
        &self,
        name: &str,
    ) -> Result<Option<Arc<dyn TamperEvident>>, LocatorError> {
        Ok(self.wrapped.child(name)?.map(|c| self.factory.create(c)))
    }

    pub(crate) fn parent(&self) -> Option<Arc<dyn ResourceLocator>> {
        self.wrapped.parent().map(|p| self.wrap(p))
    }

    pub(crate) fn list_children(
        &self,
        filter: NameFilter<'_>,
    ) -> Result<Vec<Arc<dyn ResourceLocator>>, LocatorError> {
        Ok(self
            .wrapped
            .list_children(filter)?
            .into_iter()
            .map(|c| self.wrap(c))
            .collect())
    }

    pub(crate) fn rename(&self, new_name: &str) -> Result<Arc<dyn ResourceLocator>, LocatorError> {
        let renamed = self.wrapped.rename(new_name)?;
        Ok(self.wrap(renamed))
    }
}
