//! # Check Subcommand
//!
//! Verifies a file against a previously recorded fingerprint.
//!
//! ```bash
//! tamper check release.tar --expect sha1:2fd4e1c67a2d28fced849ee1bb76e7391b93eb12
//! ```
//!
//! Exit codes: 0 when the content matches, 2 on mismatch.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::Args;

use tamper_core::ContentDigest;
use tamper_guard::DigestingFactory;

use crate::digest::digest_file;

/// Exit code reported when the content does not match.
pub const MISMATCH_EXIT: u8 = 2;

/// Arguments for the `tamper check` subcommand.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// File to verify.
    pub path: PathBuf,

    /// Expected digest in `algorithm:hex` form.
    #[arg(long)]
    pub expect: ContentDigest,
}

/// Execute the check subcommand.
pub fn run_check(args: &CheckArgs, factory: &Arc<DigestingFactory>) -> Result<u8> {
    if args.expect.algorithm != factory.algorithm() {
        bail!(
            "expected digest uses {}, but the factory digests with {}; pass --algorithm {}",
            args.expect.algorithm,
            factory.algorithm(),
            args.expect.algorithm
        );
    }
    let actual = digest_file(factory, &args.path)?;
    if actual == args.expect {
        println!("OK  {}", args.path.display());
        return Ok(0);
    }
    tracing::warn!(path = %args.path.display(), expected = %args.expect, %actual, "content mismatch");
    println!(
        "MISMATCH  {}: expected {}, found {}",
        args.path.display(),
        args.expect,
        actual
    );
    Ok(MISMATCH_EXIT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tamper_core::DigestAlgorithm;
    use tamper_guard::GuardConfig;

    fn args(path: PathBuf, expect: &str) -> CheckArgs {
        CheckArgs {
            path,
            expect: expect.parse().unwrap(),
        }
    }

    #[test]
    fn matching_content_exits_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, b"abc").unwrap();
        let factory = DigestingFactory::new(GuardConfig::default());
        let code = run_check(
            &args(path, "sha1:a9993e364706816aba3e25717850c26c9cd0d89d"),
            &factory,
        )
        .unwrap();
        assert_eq!(code, 0);
    }

    #[test]
    fn mismatch_exits_two() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, b"abd").unwrap();
        let factory = DigestingFactory::new(GuardConfig::default());
        let code = run_check(
            &args(path, "sha1:a9993e364706816aba3e25717850c26c9cd0d89d"),
            &factory,
        )
        .unwrap();
        assert_eq!(code, MISMATCH_EXIT);
    }

    #[test]
    fn algorithm_disagreement_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, b"abc").unwrap();
        let config = GuardConfig {
            algorithm: DigestAlgorithm::Sha256,
            ..GuardConfig::default()
        };
        let factory = DigestingFactory::new(config);
        assert!(run_check(
            &args(path, "sha1:a9993e364706816aba3e25717850c26c9cd0d89d"),
            &factory
        )
        .is_err());
    }
}
