//! # tamper-cli: Command-Line Interface for Tamper-Evident Access
//!
//! Provides the `tamper` binary: digest filesystem resources, check them
//! against a recorded fingerprint, compare two of them, and copy through
//! the committed-read layer.
//!
//! ## Subcommands
//!
//! - `tamper digest`: Print the snapshot of one or more files.
//! - `tamper check`: Verify a file against an expected `algorithm:hex`.
//! - `tamper compare`: `ensure_equal` between two files.
//! - `tamper copy`: Verified copy with a post-copy equality check.
//!
//! ## Crate Policy
//!
//! - Argument parsing lives beside each handler; behavior lives in
//!   `tamper-guard`.
//! - Handlers return an exit code; errors are reported by `main`.

pub mod check;
pub mod compare;
pub mod copy;
pub mod digest;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;

use tamper_core::{DigestAlgorithm, FsLocator, ResourceLocator, TamperEvident};
use tamper_guard::{DigestingFactory, GuardConfig, Strategy};

/// Options shared by every subcommand that shape the digesting factory.
#[derive(Args, Debug, Default, Clone)]
pub struct GuardOptions {
    /// Path to a YAML guard configuration.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Digest algorithm (sha1, sha256). Overrides the configuration.
    #[arg(long, global = true)]
    pub algorithm: Option<DigestAlgorithm>,

    /// Locator strategy (buffered, passthrough). Overrides the configuration.
    #[arg(long, global = true)]
    pub strategy: Option<Strategy>,
}

impl GuardOptions {
    /// Load the configuration file, if any, and apply the overrides.
    pub fn load_config(&self) -> Result<GuardConfig> {
        let mut config = match &self.config {
            Some(path) => GuardConfig::from_path(path)
                .with_context(|| format!("loading guard config {}", path.display()))?,
            None => GuardConfig::default(),
        };
        if let Some(algorithm) = self.algorithm {
            config.algorithm = algorithm;
        }
        if let Some(strategy) = self.strategy {
            config.strategy = strategy;
        }
        Ok(config)
    }

    /// Build the factory every handler works through.
    pub fn factory(&self) -> Result<Arc<DigestingFactory>> {
        let config = self.load_config()?;
        tracing::debug!(algorithm = %config.algorithm, strategy = %config.strategy, "factory configured");
        Ok(DigestingFactory::new(config))
    }
}

/// Wrap a filesystem path in a tamper-evident locator.
pub fn guard_file(factory: &Arc<DigestingFactory>, path: &Path) -> Arc<dyn TamperEvident> {
    let location: Arc<dyn ResourceLocator> = Arc::new(FsLocator::new(path));
    factory.create(location)
}
