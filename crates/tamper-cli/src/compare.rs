//! # Compare Subcommand
//!
//! Runs `ensure_equal` between two guarded files.
//!
//! Exit codes: 0 when the snapshots agree, 1 when they differ.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;

use tamper_core::TamperEvident;
use tamper_guard::DigestingFactory;

use crate::guard_file;

/// Exit code reported when the files differ.
pub const DIFFER_EXIT: u8 = 1;

/// Arguments for the `tamper compare` subcommand.
#[derive(Args, Debug)]
pub struct CompareArgs {
    /// First file.
    pub left: PathBuf,

    /// Second file.
    pub right: PathBuf,
}

/// Execute the compare subcommand.
pub fn run_compare(args: &CompareArgs, factory: &Arc<DigestingFactory>) -> Result<u8> {
    let left = guard_file(factory, &args.left);
    let right = guard_file(factory, &args.right);
    left.checkpoint()
        .with_context(|| format!("reading {}", args.left.display()))?;
    let peer = Arc::clone(&right).into_locator();

    match left.ensure_equal(peer.as_ref()) {
        Ok(()) => {
            println!("identical  {}  {}", args.left.display(), args.right.display());
            Ok(0)
        }
        Err(e) if e.is_integrity() => {
            println!("differ  {}  {}", args.left.display(), args.right.display());
            Ok(DIFFER_EXIT)
        }
        Err(e) => Err(e).with_context(|| {
            format!("comparing {} with {}", args.left.display(), args.right.display())
        }),
    }
}

/// Snapshot string for display, `-` when none was taken.
pub fn describe(guard: &dyn TamperEvident) -> String {
    guard
        .snapshot()
        .map_or_else(|| "-".to_string(), |d| d.to_string())
}
