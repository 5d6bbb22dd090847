use blake2::digest::consts::U20;
use blake2::{Blake2b, Digest as _};
use std::fmt;
use std::str::FromStr;

use crate::error::PackbloomError;

type Blake2b160 = Blake2b<U20>;

/// Width of a digest in bytes.
pub const DIGEST_LEN: usize = 20;

/// A 20-byte content object identifier.
///
/// Digests are produced upstream by the chunker; the ordering is plain
/// bytewise comparison, which is also the order pack indexes are sorted in.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest(pub [u8; DIGEST_LEN]);

impl Digest {
    /// Compute a digest as unkeyed BLAKE2b-160 over `data`.
    pub fn compute(data: &[u8]) -> Self {
        let result = Blake2b160::digest(data);
        let mut out = [0u8; DIGEST_LEN];
        out.copy_from_slice(&result);
        Digest(out)
    }

    /// Build a digest from a slice that must be exactly 20 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; DIGEST_LEN] = bytes.try_into().ok()?;
        Some(Digest(arr))
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Hex-encode the full digest.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a digest from a 40-character hex string.
    pub fn from_hex(hex_str: &str) -> Result<Self, PackbloomError> {
        let bytes = hex::decode(hex_str)
            .map_err(|e| PackbloomError::InvalidDigest(format!("'{hex_str}': {e}")))?;
        Self::from_slice(&bytes).ok_or_else(|| {
            PackbloomError::InvalidDigest(format!(
                "'{hex_str}': expected {} bytes, got {}",
                DIGEST_LEN,
                bytes.len()
            ))
        })
    }
}

impl FromStr for Digest {
    type Err = PackbloomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}
