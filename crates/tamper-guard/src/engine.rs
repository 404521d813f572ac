//! # Digest Engines
//!
//! A `DigestEngine` is a resettable, reusable one-way hash over a byte
//! stream. Engines hold internal state and are not safe for concurrent
//! reuse; the [`DigestingFactory`](crate::DigestingFactory) serializes
//! access so that reset-then-digest is one atomic unit.
//!
//! Streams are consumed in fixed-size chunks so that large resources are
//! hashed without being loaded into memory.

use std::io::{self, Read};

use sha1::Sha1;
use sha2::digest::FixedOutputReset;
use sha2::{Digest, Sha256};
use tamper_core::{ContentDigest, DigestAlgorithm};

/// Default number of bytes read per chunk while digesting.
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

/// A resettable one-way hash over byte streams.
pub trait DigestEngine: Send {
    /// The algorithm this engine computes.
    fn algorithm(&self) -> DigestAlgorithm;

    /// Discard any partially accumulated state.
    fn reset(&mut self);

    /// Feed more bytes into the running hash.
    fn update(&mut self, bytes: &[u8]);

    /// Finalize the running hash and reset the engine for reuse.
    fn finish(&mut self) -> io::Result<ContentDigest>;

    /// Digest of the bytes fed so far, leaving the running hash untouched.
    fn peek(&self) -> io::Result<ContentDigest>;

    /// Bytes read per chunk by [`digest`](DigestEngine::digest).
    fn chunk_size(&self) -> usize {
        DEFAULT_CHUNK_SIZE
    }

    /// Consume `stream` to the end and return its digest.
    fn digest(&mut self, stream: &mut dyn Read) -> io::Result<ContentDigest> {
        let mut buf = vec![0u8; self.chunk_size().max(1)];
        loop {
            let n = match stream.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            self.update(&buf[..n]);
        }
        self.finish()
    }

    /// Digest an in-memory byte slice.
    fn digest_slice(&mut self, bytes: &[u8]) -> io::Result<ContentDigest> {
        self.update(bytes);
        self.finish()
    }
}

/// [`DigestEngine`] over any RustCrypto `Digest` implementation.
#[derive(Debug, Clone)]
pub struct HashEngine<D> {
    algorithm: DigestAlgorithm,
    hasher: D,
    chunk_size: usize,
}

impl<D: Digest + Default> HashEngine<D> {
    fn with_algorithm(algorithm: DigestAlgorithm, chunk_size: usize) -> Self {
        Self {
            algorithm,
            hasher: D::default(),
            chunk_size: chunk_size.max(1),
        }
    }
}

impl<D> HashEngine<D> {
    fn wrap(&self, bytes: Vec<u8>) -> io::Result<ContentDigest> {
        ContentDigest::new(self.algorithm, bytes).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::Other,
                format!("{} produced a digest of unexpected length", self.algorithm),
            )
        })
    }
}

/// SHA-1 engine (160-bit, the default).
pub type Sha1Engine = HashEngine<Sha1>;

/// SHA-256 engine.
pub type Sha256Engine = HashEngine<Sha256>;

impl Sha1Engine {
    /// Create a SHA-1 engine reading `chunk_size` bytes at a time.
    pub fn new(chunk_size: usize) -> Self {
        Self::with_algorithm(DigestAlgorithm::Sha1, chunk_size)
    }
}

impl Sha256Engine {
    /// Create a SHA-256 engine reading `chunk_size` bytes at a time.
    pub fn new(chunk_size: usize) -> Self {
        Self::with_algorithm(DigestAlgorithm::Sha256, chunk_size)
    }
}

impl<D: Digest + FixedOutputReset + Clone + Default + Send> DigestEngine for HashEngine<D> {
    fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    fn reset(&mut self) {
        Digest::reset(&mut self.hasher);
    }

    fn update(&mut self, bytes: &[u8]) {
        Digest::update(&mut self.hasher, bytes);
    }

    fn finish(&mut self) -> io::Result<ContentDigest> {
        let out = self.hasher.finalize_reset();
        self.wrap(out.to_vec())
    }

    fn peek(&self) -> io::Result<ContentDigest> {
        let out = self.hasher.clone().finalize();
        self.wrap(out.to_vec())
    }

    fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

/// Build the engine for `algorithm`.
pub fn engine_for(algorithm: DigestAlgorithm, chunk_size: usize) -> Box<dyn DigestEngine> {
    match algorithm {
        DigestAlgorithm::Sha1 => Box::new(Sha1Engine::new(chunk_size)),
        DigestAlgorithm::Sha256 => Box::new(Sha256Engine::new(chunk_size)),
    }
}
