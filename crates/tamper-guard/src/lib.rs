//! # tamper-guard: Tamper-Evident Locator Decorators
//!
//! Wraps any [`ResourceLocator`](tamper_core::ResourceLocator) so that
//! modifications made behind its back are detected. Each wrapper takes a
//! digest snapshot of the content when it is created and keeps that
//! snapshot current for writes it performs itself.
//!
//! ## Strategies
//!
//! - [`BufferedLocator`] (default): whole content cached in memory,
//!   committed-read semantics, every reload verified against the snapshot,
//!   advisory lock held while any handle is open.
//! - [`PassthroughLocator`]: streams forwarded unbuffered; integrity is
//!   checked only by explicit `checkpoint()` and `ensure_equal()`.
//!
//! Both are produced by a [`DigestingFactory`], which owns the digest
//! engine and a registry that keeps one live instance per path.
//!
//! ## Lock Order
//!
//! buffer state → factory engine → integrity state. `ensure_equal` never
//! takes a buffer state lock, so comparing two locators cannot deadlock.

pub mod buffered;
pub mod config;
pub mod engine;
pub mod factory;
mod guard;
pub mod passthrough;

pub use buffered::BufferedLocator;
pub use config::{ConfigError, GuardConfig, Strategy};
pub use engine::{engine_for, DigestEngine, HashEngine, Sha1Engine, Sha256Engine, DEFAULT_CHUNK_SIZE};
pub use factory::DigestingFactory;
pub use passthrough::PassthroughLocator;
