//! # tamper CLI entry point
//!
//! Parses command-line arguments, builds the digesting factory from the
//! global guard options, and dispatches to subcommand handlers.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tamper_cli::check::{run_check, CheckArgs};
use tamper_cli::compare::{run_compare, CompareArgs};
use tamper_cli::copy::{run_copy, CopyArgs};
use tamper_cli::digest::{run_digest, DigestArgs};
use tamper_cli::GuardOptions;

/// Tamper-evident resource access.
///
/// Digests files, verifies them against recorded fingerprints, compares
/// them, and copies them with post-copy verification.
#[derive(Parser, Debug)]
#[command(name = "tamper", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(flatten)]
    guard: GuardOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the digest of one or more files.
    Digest(DigestArgs),

    /// Verify a file against an expected digest.
    Check(CheckArgs),

    /// Check whether two files have identical content.
    Compare(CompareArgs),

    /// Copy a file and verify the copy against its source.
    Copy(CopyArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise the verbosity flag picks the level.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = cli.guard.factory().and_then(|factory| match &cli.command {
        Commands::Digest(args) => run_digest(args, &factory),
        Commands::Check(args) => run_check(args, &factory),
        Commands::Compare(args) => run_compare(args, &factory),
        Commands::Copy(args) => run_copy(args, &factory),
    });

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}
