//! # Error Types: Locator Error Taxonomy
//!
//! Integrity failures, incomparable peers, deferred construction failures
//! and plain infrastructure I/O errors are distinct variants. Callers must
//! be able to tell tampering apart from a flaky disk, so the variants are
//! never folded into one another.

use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Errors raised by resource locators and the tamper-evident layer.
#[derive(Error, Debug)]
pub enum LocatorError {
    /// Content no longer matches the stored snapshot.
    #[error("integrity violation at {locator}: expected {expected}, found {actual}")]
    Integrity {
        /// Physical address of the resource.
        locator: String,
        /// The snapshot digest that was expected.
        expected: String,
        /// What was actually observed (a digest or `absent`).
        actual: String,
    },

    /// The peer passed to `ensure_equal` cannot be compared.
    #[error("cannot compare {locator} with peer: {reason}")]
    Incomparable {
        /// Physical address of the resource.
        locator: String,
        /// Why the comparison is impossible.
        reason: String,
    },

    /// The construction-time digest failed with a real I/O error.
    #[error("locator {locator} failed at construction: {source}")]
    DeferredConstruction {
        /// Physical address of the resource.
        locator: String,
        /// The stored construction failure.
        #[source]
        source: Arc<io::Error>,
    },

    /// A child name was rejected by the backend.
    #[error("invalid resource name {0:?}")]
    InvalidName(String),

    /// The resource is marked read-only.
    #[error("resource {0} is read-only")]
    ReadOnly(String),

    /// Infrastructure I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl LocatorError {
    /// Build an integrity error.
    pub fn integrity(
        locator: impl Into<String>,
        expected: impl ToString,
        actual: impl ToString,
    ) -> Self {
        Self::Integrity {
            locator: locator.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Whether this error reports tampering.
    pub fn is_integrity(&self) -> bool {
        matches!(self, Self::Integrity { .. })
    }

    /// Whether this error is a plain "resource does not exist" I/O error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == io::ErrorKind::NotFound)
    }
}

impl From<LocatorError> for io::Error {
    fn from(err: LocatorError) -> Self {
        match err {
            LocatorError::Io(e) => e,
            LocatorError::ReadOnly(_) => io::Error::new(io::ErrorKind::PermissionDenied, err),
            LocatorError::InvalidName(_) => io::Error::new(io::ErrorKind::InvalidInput, err),
            LocatorError::Integrity { .. } => io::Error::new(io::ErrorKind::InvalidData, err),
            other => io::Error::new(io::ErrorKind::Other, other),
        }
    }
}
