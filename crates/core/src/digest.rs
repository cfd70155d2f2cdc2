//! Content digests.
//!
//! A digest is stored in backends and sent over the wire in its canonical
//! string form, `<algorithm>:<lowercase hex>`, e.g. `sha256:2c26b4...`.

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::fmt;
use std::str::FromStr;

/// Supported digest algorithms.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DigestAlgorithm {
    Sha256,
}

impl DigestAlgorithm {
    /// Algorithm prefix used in the canonical string form.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
        }
    }

    /// Length of the hex-encoded hash for this algorithm.
    pub fn hex_len(self) -> usize {
        match self {
            Self::Sha256 => 64,
        }
    }
}

impl FromStr for DigestAlgorithm {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "sha256" => Ok(Self::Sha256),
            other => Err(crate::Error::InvalidDigest(format!(
                "unsupported algorithm: {other}"
            ))),
        }
    }
}

/// A content-addressable identifier of a blob.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest {
    algorithm: DigestAlgorithm,
    hex: String,
}

impl Digest {
    /// Compute the sha256 digest of data.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        let hex = hasher
            .finalize()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect();
        Self {
            algorithm: DigestAlgorithm::Sha256,
            hex,
        }
    }

    /// Build a digest from an algorithm and hex hash, validating the hash.
    pub fn new(algorithm: DigestAlgorithm, hex: &str) -> crate::Result<Self> {
        if hex.len() != algorithm.hex_len() {
            return Err(crate::Error::InvalidDigest(format!(
                "expected {} hex chars, got {}",
                algorithm.hex_len(),
                hex.len()
            )));
        }
        if !hex.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return Err(crate::Error::InvalidDigest(format!(
                "hash must be lowercase hex: {hex}"
            )));
        }
        Ok(Self {
            algorithm,
            hex: hex.to_string(),
        })
    }

    /// Parse the canonical `<algorithm>:<hex>` form.
    pub fn parse(s: &str) -> crate::Result<Self> {
        let (algorithm, hex) = s
            .split_once(':')
            .ok_or_else(|| crate::Error::InvalidDigest(format!("missing algorithm prefix: {s}")))?;
        Self::new(algorithm.parse()?, hex)
    }

    /// Parse the canonical form from raw bytes, as downloaded from a backend.
    pub fn from_bytes(data: &[u8]) -> crate::Result<Self> {
        let s = std::str::from_utf8(data)
            .map_err(|e| crate::Error::InvalidDigest(format!("not utf-8: {e}")))?;
        Self::parse(s.trim())
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// The hex-encoded hash without the algorithm prefix.
    pub fn hex(&self) -> &str {
        &self.hex
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({}:{})", self.algorithm.as_str(), &self.hex[..12])
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm.as_str(), self.hex)
    }
}

impl FromStr for Digest {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Digest {
    type Error = crate::Error;

    fn try_from(s: String) -> crate::Result<Self> {
        Self::parse(&s)
    }
}

impl From<Digest> for String {
    fn from(d: Digest) -> Self {
        d.to_string()
    }
}
