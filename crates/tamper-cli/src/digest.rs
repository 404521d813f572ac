//! # Digest Subcommand
//!
//! Prints the snapshot each file receives when it is wrapped by the
//! factory.
//!
//! ```bash
//! tamper digest Cargo.toml src/main.rs
//! tamper --algorithm sha256 digest --json data.bin
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use serde::Serialize;

use tamper_core::ContentDigest;
use tamper_guard::DigestingFactory;

use crate::guard_file;

/// Arguments for the `tamper digest` subcommand.
#[derive(Args, Debug)]
pub struct DigestArgs {
    /// Files to digest.
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Emit a JSON array instead of text lines.
    #[arg(long)]
    pub json: bool,
}

/// One digested file.
#[derive(Debug, Clone, Serialize)]
pub struct DigestRecord {
    pub path: String,
    pub digest: String,
}

/// Digest a single file through a guard.
pub fn digest_file(factory: &Arc<DigestingFactory>, path: &Path) -> Result<ContentDigest> {
    let guard = guard_file(factory, path);
    // Surfaces a deferred construction failure and establishes the
    // snapshot for files created since the guard was built.
    guard
        .checkpoint()
        .with_context(|| format!("digesting {}", path.display()))?;
    if !guard.exists() {
        bail!("{}: no such file", path.display());
    }
    guard
        .snapshot()
        .with_context(|| format!("{}: no snapshot after checkpoint", path.display()))
}

/// Digest every path in order.
pub fn collect(args: &DigestArgs, factory: &Arc<DigestingFactory>) -> Result<Vec<DigestRecord>> {
    args.paths
        .iter()
        .map(|path| {
            let digest = digest_file(factory, path)?;
            Ok(DigestRecord {
                path: path.display().to_string(),
                digest: digest.to_string(),
            })
        })
        .collect()
}

/// Execute the digest subcommand.
pub fn run_digest(args: &DigestArgs, factory: &Arc<DigestingFactory>) -> Result<u8> {
    let records = collect(args, factory)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else {
        for record in &records {
            println!("{}  {}", record.digest, record.path);
        }
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tamper_guard::GuardConfig;

    #[test]
    fn digests_files_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        std::fs::write(&a, b"abc").unwrap();
        std::fs::write(&b, b"").unwrap();

        let factory = DigestingFactory::new(GuardConfig::default());
        let args = DigestArgs {
            paths: vec![a.clone(), b],
            json: false,
        };
        let records = collect(&args, &factory).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].path, a.display().to_string());
        assert_eq!(records[0].digest, "sha1:a9993e364706816aba3e25717850c26c9cd0d89d");
        assert_eq!(records[1].digest, "sha1:da39a3ee5e6b4b0d3255bfef95601890afd80709");
    }

    #[test]
    fn missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let factory = DigestingFactory::new(GuardConfig::default());
        assert!(digest_file(&factory, &dir.path().join("missing")).is_err());
    }

    #[test]
    fn records_serialize_as_json() {
        let record = DigestRecord {
            path: "x".into(),
            digest: "sha1:00".into(),
        };
        let json = serde_json::to_value([record]).unwrap();
        assert_eq!(json[0]["path"], "x");
        assert_eq!(json[0]["digest"], "sha1:00");
    }
}
