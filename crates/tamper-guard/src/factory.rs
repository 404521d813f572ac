//! # Digesting Factory
//!
//! Owns the shared digest engine and produces tamper-evident locators.
//!
//! ## Engine Exclusion
//!
//! Digest engines keep running state and are not safe for concurrent
//! reuse. Every digest computed through the factory runs as one
//! reset-then-digest unit under the engine mutex.
//!
//! ## Instance Registry
//!
//! While a tamper-evident locator is alive, every route to the same
//! physical path (`create`, `child`, `parent`, `list_children`, `rename`)
//! yields that same instance, so its snapshot is the only snapshot for the
//! path. The registry holds weak references; dropped instances are
//! recreated (and re-digested) on next use. A factory serves one resource
//! tree: paths from unrelated backends must not share a factory.

use std::fmt;
use std::io::{self, Read};
use std::sync::{Arc, Weak};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tamper_core::{ContentDigest, DigestAlgorithm, LocatorError, ResourceLocator, TamperEvident};

use crate::buffered::BufferedLocator;
use crate::config::{GuardConfig, Strategy};
use crate::engine::{engine_for, DigestEngine};
use crate::passthrough::PassthroughLocator;

/// Stale registry entries are pruned once the registry grows past this.
const REGISTRY_PRUNE_THRESHOLD: usize = 1024;

/// Creates tamper-evident locators and computes digests for them.
pub struct DigestingFactory {
    config: GuardConfig,
    algorithm: DigestAlgorithm,
    engine: Mutex<Box<dyn DigestEngine>>,
    registry: DashMap<String, Weak<dyn TamperEvident>>,
}

impl fmt::Debug for DigestingFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DigestingFactory")
            .field("algorithm", &self.algorithm)
            .field("strategy", &self.config.strategy)
            .field("live_locators", &self.registry.len())
            .finish()
    }
}

impl DigestingFactory {
    /// Create a factory using the engine selected by `config.algorithm`.
    pub fn new(config: GuardConfig) -> Arc<Self> {
        let engine = engine_for(config.algorithm, config.read_chunk_size);
        Self::with_engine(config, engine)
    }

    /// Create a factory around a caller-supplied engine. The engine's
    /// algorithm overrides `config.algorithm`.
    pub fn with_engine(mut config: GuardConfig, engine: Box<dyn DigestEngine>) -> Arc<Self> {
        let algorithm = engine.algorithm();
        config.algorithm = algorithm;
        Arc::new(Self {
            config,
            algorithm,
            engine: Mutex::new(engine),
            registry: DashMap::new(),
        })
    }

    /// The factory configuration.
    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Digest algorithm used for every snapshot.
    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// Wrap `location` in a tamper-evident locator using the configured
    /// strategy, reusing the live instance for its path if there is one.
    ///
    /// Construction never fails: a resource that does not exist yet gets
    /// no snapshot, and any other I/O failure is stored and raised by the
    /// locator's first content access.
    pub fn create(self: &Arc<Self>, location: Arc<dyn ResourceLocator>) -> Arc<dyn TamperEvident> {
        // A decorator shares its path with what it wraps; nesting bypasses
        // the registry so the inner instance is not returned in its place.
        if location.as_tamper_evident().is_some() {
            return self.construct(location);
        }

        let key = location.path().to_string();
        if let Some(live) = self.registry.get(&key).and_then(|entry| entry.value().upgrade()) {
            return live;
        }

        // Constructing digests the resource, so it runs outside the shard
        // lock. If another thread registered an instance meanwhile, adopt it.
        let created = self.construct(location);
        let created = match self.registry.entry(key) {
            Entry::Occupied(mut entry) => {
                let live = entry.get().upgrade();
                match live {
                    Some(live) => live,
                    None => {
                        entry.insert(Arc::downgrade(&created));
                        created
                    }
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(Arc::downgrade(&created));
                created
            }
        };

        if self.registry.len() > REGISTRY_PRUNE_THRESHOLD {
            self.registry.retain(|_, weak| weak.strong_count() > 0);
        }
        created
    }

    /// Wrap `location` using an explicit strategy, bypassing the registry.
    pub fn create_with(
        self: &Arc<Self>,
        location: Arc<dyn ResourceLocator>,
        strategy: Strategy,
    ) -> Arc<dyn TamperEvident> {
        match strategy {
            Strategy::Buffered => BufferedLocator::new(location, Arc::clone(self)),
            Strategy::Passthrough => PassthroughLocator::new(location, Arc::clone(self)),
        }
    }

    fn construct(self: &Arc<Self>, location: Arc<dyn ResourceLocator>) -> Arc<dyn TamperEvident> {
        self.create_with(location, self.config.strategy)
    }

    /// Digest a byte stream as one atomic reset-then-digest unit.
    ///
    /// The stream is dropped (closed) before returning. A NotFound error
    /// while reading yields `Ok(None)`.
    pub fn create_digest(
        &self,
        mut stream: impl Read,
    ) -> Result<Option<ContentDigest>, LocatorError> {
        let result = {
            let mut engine = self.engine.lock();
            engine.reset();
            engine.digest(&mut stream)
        };
        drop(stream);
        match result {
            Ok(digest) => Ok(Some(digest)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Open and digest `location`. `Ok(None)` if it does not exist.
    pub fn digest_locator(
        &self,
        location: &dyn ResourceLocator,
    ) -> Result<Option<ContentDigest>, LocatorError> {
        match location.open_read() {
            Ok(stream) => self.create_digest(stream),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Digest an in-memory buffer.
    pub fn digest_bytes(&self, bytes: &[u8]) -> Result<ContentDigest, LocatorError> {
        let mut engine = self.engine.lock();
        engine.reset();
        Ok(engine.digest_slice(bytes)?)
    }

    /// Digest of empty content, used as the fingerprint of an absent resource.
    pub fn empty_digest(&self) -> Result<ContentDigest, LocatorError> {
        self.digest_bytes(&[])
    }

    /// A fresh engine of the factory's algorithm for incremental hashing
    /// outside the shared engine's critical section.
    pub(crate) fn detached_engine(&self) -> Box<dyn DigestEngine> {
        engine_for(self.algorithm, self.config.read_chunk_size)
    }

    /// Number of live tamper-evident locators known to the registry.
    pub fn live_locators(&self) -> usize {
        self.registry
            .iter()
            .filter(|entry| entry.value().strong_count() > 0)
            .count()
    }
}
