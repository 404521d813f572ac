//! # Content Digest: Fingerprints of Resource Content
//!
//! Defines `ContentDigest` and `DigestAlgorithm`, the immutable fingerprint
//! values that tamper-evident locators store as their "last known good"
//! snapshot.
//!
//! ## Security Invariant
//!
//! Two digests only compare equal when both the algorithm tag and the raw
//! bytes match. Byte comparison runs in constant time so that repeated
//! checkpoint probing does not leak how many leading bytes agree.

use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

/// The hash algorithm used to produce a content digest.
///
/// SHA-1 is the default: a 160-bit general-purpose hash that is cheap to
/// compute over whole resources. SHA-256 is available where a stronger
/// collision bound is required.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    /// SHA-1, 20-byte output.
    #[default]
    Sha1,
    /// SHA-256, 32-byte output.
    Sha256,
}

impl DigestAlgorithm {
    /// Returns the algorithm identifier string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
        }
    }

    /// Length in bytes of a digest produced by this algorithm.
    pub fn output_len(&self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha256 => 32,
        }
    }
}

impl std::fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DigestAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sha1" | "sha-1" => Ok(Self::Sha1),
            "sha256" | "sha-256" => Ok(Self::Sha256),
            other => Err(format!("unknown digest algorithm: {other:?}")),
        }
    }
}

/// A content fingerprint with its algorithm tag.
#[derive(Debug, Clone, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDigest {
    /// The hash algorithm that produced this digest.
    pub algorithm: DigestAlgorithm,
    bytes: Vec<u8>,
}

impl ContentDigest {
    /// Create a digest from raw output bytes.
    ///
    /// Returns `None` if the byte length does not match the algorithm's
    /// output length.
    pub fn new(algorithm: DigestAlgorithm, bytes: impl Into<Vec<u8>>) -> Option<Self> {
        let bytes = bytes.into();
        if bytes.len() != algorithm.output_len() {
            return None;
        }
        Some(Self { algorithm, bytes })
    }

    /// Parse a lowercase or uppercase hex string into a digest.
    pub fn from_hex(algorithm: DigestAlgorithm, hex: &str) -> Option<Self> {
        let hex = hex.trim();
        if hex.len() % 2 != 0 || !hex.is_ascii() {
            return None;
        }
        let bytes = (0..hex.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
            .collect::<Option<Vec<u8>>>()?;
        Self::new(algorithm, bytes)
    }

    /// The raw digest bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Render the digest as a lowercase hex string.
    pub fn to_hex(&self) -> String {
        self.bytes.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl PartialEq for ContentDigest {
    fn eq(&self, other: &Self) -> bool {
        self.algorithm == other.algorithm && bool::from(self.bytes.ct_eq(&other.bytes))
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.to_hex())
    }
}

impl std::str::FromStr for ContentDigest {
    type Err = String;

    /// Parse the `algorithm:hex` form produced by `Display`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (algorithm, hex) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| format!("expected <algorithm>:<hex>, got {s:?}"))?;
        let algorithm: DigestAlgorithm = algorithm.parse()?;
        Self::from_hex(algorithm, hex)
            .ok_or_else(|| format!("not a {algorithm} digest: {hex:?}"))
    }
}
