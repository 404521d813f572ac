//! # Copy Subcommand
//!
//! Copies a file through the tamper-evident layer: the source is read with
//! a verified committed read, the destination is written through its own
//! guard, and the two snapshots are compared afterwards.
//!
//! ```bash
//! tamper copy release.tar /mnt/backup/release.tar
//! ```

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;

use tamper_guard::DigestingFactory;

use crate::compare::describe;
use crate::guard_file;

/// Arguments for the `tamper copy` subcommand.
#[derive(Args, Debug)]
pub struct CopyArgs {
    /// File to copy.
    pub source: PathBuf,

    /// Destination file. Parent directories are created as needed.
    pub destination: PathBuf,
}

/// Execute the copy subcommand.
pub fn run_copy(args: &CopyArgs, factory: &Arc<DigestingFactory>) -> Result<u8> {
    let source = guard_file(factory, &args.source);
    let destination = guard_file(factory, &args.destination);

    let copied = {
        let mut reader = source
            .open_read()
            .with_context(|| format!("opening {}", args.source.display()))?;
        let mut writer = destination
            .open_write()
            .with_context(|| format!("creating {}", args.destination.display()))?;
        let copied = io::copy(&mut reader, &mut writer)
            .with_context(|| format!("copying to {}", args.destination.display()))?;
        writer
            .flush()
            .with_context(|| format!("writing {}", args.destination.display()))?;
        copied
    };

    let peer = Arc::clone(&source).into_locator();
    destination
        .ensure_equal(peer.as_ref())
        .context("copy does not match its source")?;

    tracing::info!(
        source = %args.source.display(),
        destination = %args.destination.display(),
        bytes = copied,
        "copy verified"
    );
    println!(
        "{}  {} -> {}",
        describe(destination.as_ref()),
        args.source.display(),
        args.destination.display()
    );
    Ok(0)
}
