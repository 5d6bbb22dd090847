//! On-disk layout of a bloom filter file.
//!
//! ```text
//! [0..8)    magic "PBLOOM\0\0"
//! [8..12)   version (u32 LE)
//! [12]      k, the number of probes per digest
//! [13]      bits, log2 of the bit-array size in bytes
//! [14..16)  reserved
//! [16..24)  entry count (u64 LE)
//! [24..24+2^bits)  bit array
//! trailer:  name count (u32 LE), then per name: length (u16 LE) + UTF-8 bytes
//! ```
//!
//! The covered-index names live after the bit array so that appending names
//! never moves the bit array.

use packbloom_types::error::{PackbloomError, Result};

/// Magic bytes at the start of every bloom filter file.
pub const BLOOM_MAGIC: &[u8; 8] = b"PBLOOM\0\0";

/// Current bloom filter format version.
pub const BLOOM_VERSION: u32 = 1;

/// Size of the fixed header in bytes.
pub const BLOOM_HEADER_SIZE: usize = 24;

/// Largest `bits` value a header may declare before we refuse to map it.
/// Anything above the k=4 maximum is already invalid; this only guards shifts.
pub(super) const BITS_SANITY_LIMIT: u8 = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct Header {
    pub k: u8,
    pub bits: u8,
    pub entries: u64,
}

impl Header {
    pub fn encode_into(&self, out: &mut [u8]) {
        out[0..8].copy_from_slice(BLOOM_MAGIC);
        out[8..12].copy_from_slice(&BLOOM_VERSION.to_le_bytes());
        out[12] = self.k;
        out[13] = self.bits;
        out[14..16].copy_from_slice(&[0, 0]);
        out[16..24].copy_from_slice(&self.entries.to_le_bytes());
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < BLOOM_HEADER_SIZE {
            return Err(PackbloomError::InvalidFilter(format!(
                "file too small for header ({} bytes)",
                bytes.len()
            )));
        }
        if &bytes[0..8] != BLOOM_MAGIC {
            return Err(PackbloomError::InvalidFilter("bad magic".into()));
        }
        let mut version = [0u8; 4];
        version.copy_from_slice(&bytes[8..12]);
        let version = u32::from_le_bytes(version);
        if version != BLOOM_VERSION {
            return Err(PackbloomError::InvalidFilter(format!(
                "unsupported version {version}"
            )));
        }
        let bits = bytes[13];
        if bits > BITS_SANITY_LIMIT {
            return Err(PackbloomError::InvalidFilter(format!(
                "bit-array exponent {bits} out of range"
            )));
        }
        let mut entries = [0u8; 8];
        entries.copy_from_slice(&bytes[16..24]);
        Ok(Self {
            k: bytes[12],
            bits,
            entries: u64::from_le_bytes(entries),
        })
    }

    /// Size of the bit array in bytes.
    pub fn bitmap_len(&self) -> u64 {
        1u64 << self.bits
    }

    /// Offset of the first trailer byte.
    pub fn trailer_offset(&self) -> u64 {
        BLOOM_HEADER_SIZE as u64 + self.bitmap_len()
    }
}

pub(super) fn encode_trailer(names: &[String]) -> Result<Vec<u8>> {
    let total: usize = names.iter().map(|n| 2 + n.len()).sum();
    let mut out = Vec::with_capacity(4 + total);
    let count = u32::try_from(names.len())
        .map_err(|_| PackbloomError::InvalidFilter("too many covered indexes".into()))?;
    out.extend_from_slice(&count.to_le_bytes());
    for name in names {
        let len = u16::try_from(name.len()).map_err(|_| {
            PackbloomError::InvalidFilter(format!("index name too long: {name}"))
        })?;
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(name.as_bytes());
    }
    Ok(out)
}

/// Decode the trailer. Returns the names and the number of bytes consumed,
/// or `None` if the bytes do not form a complete trailer.
pub(super) fn decode_trailer(bytes: &[u8]) -> Option<(Vec<String>, usize)> {
    let count = u32::from_le_bytes(bytes.get(0..4)?.try_into().ok()?) as usize;
    let mut pos = 4;
    let mut names = Vec::with_capacity(count.min(1 << 16));
    for _ in 0..count {
        let len = u16::from_le_bytes(bytes.get(pos..pos + 2)?.try_into().ok()?) as usize;
        pos += 2;
        let raw = bytes.get(pos..pos + len)?;
        names.push(std::str::from_utf8(raw).ok()?.to_string());
        pos += len;
    }
    Some((names, pos))
}
