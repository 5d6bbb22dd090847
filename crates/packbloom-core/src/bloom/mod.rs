pub mod format;

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use memmap2::{Mmap, MmapMut};
use tracing::{debug, warn};

use packbloom_types::error::{PackbloomError, Result};
use packbloom_types::Digest;

use crate::index::PackIndex;

use self::format::{decode_trailer, encode_trailer, Header, BLOOM_HEADER_SIZE};

/// Projected false-positive probability above which a filter is considered full.
pub const MAX_PFALSE_POSITIVE: f64 = 0.01;

/// Initial sizing guess in bits of bit array per expected entry.
pub const BITS_PER_ENTRY: u64 = 10;

/// Smallest bit array we ever create: 2^8 bytes.
pub const MIN_BLOOM_BITS: u8 = 8;

/// Probe counts with a defined digest slicing.
pub const SUPPORTED_K: [u8; 2] = [4, 5];

/// Largest `bits` supported for a given `k`.
///
/// k=5 slices the digest into five 32-bit probes, k=4 into four 40-bit
/// probes. A probe addresses a bit, so the byte-array exponent is the probe
/// width minus 3.
pub fn max_bloom_bits(k: u8) -> u8 {
    match k {
        4 => 37,
        5 => 29,
        _ => 0,
    }
}

/// Reject any `k` we cannot derive probes for.
pub fn check_k(k: u8) -> Result<u8> {
    if SUPPORTED_K.contains(&k) {
        Ok(k)
    } else {
        Err(PackbloomError::UnsupportedK(k))
    }
}

/// False-positive probability `(1 - (1 - 1/m)^(k*n))^k` for a filter of
/// `2^bits` bytes holding `entries` digests.
pub fn pfalse_positive(k: u8, bits: u8, entries: u64) -> f64 {
    if entries == 0 {
        return 0.0;
    }
    let m = (1u64 << (u32::from(bits) + 3)) as f64;
    let kn = f64::from(k) * entries as f64;
    // (1 - 1/m)^(kn) computed as exp(kn * ln(1 - 1/m)) to stay accurate for large m.
    let p_unset = (kn * (-1.0 / m).ln_1p()).exp();
    (1.0 - p_unset).powi(i32::from(k))
}

fn ceil_log2(n: u64) -> u8 {
    if n <= 1 {
        0
    } else {
        (64 - (n - 1).leading_zeros()) as u8
    }
}

/// Smallest `bits` keeping `expected` entries under the threshold.
/// May exceed `max_bloom_bits(k)`; callers clamp.
fn required_bits(k: u8, expected: u64) -> u8 {
    let bytes = expected.saturating_mul(BITS_PER_ENTRY) / 8;
    let mut bits = ceil_log2(bytes).max(MIN_BLOOM_BITS);
    let limit = max_bloom_bits(k);
    while bits <= limit && pfalse_positive(k, bits, expected) > MAX_PFALSE_POSITIVE {
        bits += 1;
    }
    bits
}

/// Bit positions for `digest`: `k` non-overlapping big-endian slices of the
/// digest, each masked to the bit-array width. The digest is already uniformly
/// distributed, so no further hashing is applied.
fn probes(digest: &Digest, k: u8, bits: u8) -> impl Iterator<Item = u64> + '_ {
    let width = if k == 4 { 5 } else { 4 };
    let mask = (1u64 << (u32::from(bits) + 3)) - 1;
    digest
        .as_bytes()
        .chunks_exact(width)
        .take(usize::from(k))
        .map(move |chunk| chunk.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b)) & mask)
}

fn set_probes(bitmap: &mut [u8], digest: &Digest, k: u8, bits: u8) {
    for bit in probes(digest, k, bits) {
        bitmap[(bit >> 3) as usize] |= 1 << (bit & 7);
    }
}

enum Backing {
    ReadOnly(Mmap),
    Writable { file: File, map: MmapMut },
}

impl Backing {
    fn bytes(&self) -> &[u8] {
        match self {
            Backing::ReadOnly(map) => map,
            Backing::Writable { map, .. } => map,
        }
    }
}

/// A persisted bloom filter over the digests of a directory's pack indexes.
///
/// The filter records which pack indexes it covers; the sum of their digest
/// counts must equal the entry counter in the header.
pub struct BloomFilter {
    path: PathBuf,
    backing: Backing,
    header: Header,
    index_names: Vec<String>,
    covered: HashSet<String>,
    trailer_consistent: bool,
}

/// Header, names, and whether the trailer exactly fills the rest of the file.
fn parse(bytes: &[u8]) -> Result<(Header, Vec<String>, bool)> {
    let header = Header::decode(bytes)?;
    let trailer_offset = header.trailer_offset();
    if (bytes.len() as u64) < trailer_offset {
        return Err(PackbloomError::InvalidFilter(format!(
            "file length {} shorter than declared bit array ({} bytes)",
            bytes.len(),
            header.bitmap_len()
        )));
    }
    let rest = &bytes[trailer_offset as usize..];
    let (names, consistent) = match decode_trailer(rest) {
        Some((names, used)) => (names, used == rest.len()),
        None => (Vec::new(), false),
    };
    Ok((header, names, consistent))
}

impl BloomFilter {
    /// Create a new, empty filter at `path` sized for `expected` entries.
    ///
    /// Without an explicit `k`, 5 probes are used while the required size fits
    /// k=5's maximum, otherwise 4. The size is clamped to the maximum for `k`.
    pub fn create(path: &Path, expected: u64, k: Option<u8>) -> Result<Self> {
        let expected = expected.max(1);
        let k = match k {
            Some(k) => check_k(k)?,
            None if required_bits(5, expected) <= max_bloom_bits(5) => 5,
            None => 4,
        };
        let mut bits = required_bits(k, expected);
        if bits > max_bloom_bits(k) {
            bits = max_bloom_bits(k);
            warn!(
                k,
                bits,
                expected,
                pfalse = pfalse_positive(k, bits, expected),
                "bloom: too many entries for maximum filter size"
            );
        }

        let header = Header {
            k,
            bits,
            entries: 0,
        };
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(header.trailer_offset())?;

        // SAFETY: the file was just created by us and is not yet published;
        // nothing else maps or truncates it while we hold the mapping.
        let mut map = unsafe { MmapMut::map_mut(&file) }?;
        header.encode_into(&mut map[..BLOOM_HEADER_SIZE]);

        debug!(k, bits, expected, path = %path.display(), "bloom: created filter");

        Ok(Self {
            path: path.to_path_buf(),
            backing: Backing::Writable { file, map },
            header,
            index_names: Vec::new(),
            covered: HashSet::new(),
            trailer_consistent: true,
        })
    }

    /// Open an existing filter read-only.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;

        // SAFETY: full rebuilds publish by atomic rename, so the inode we map
        // is never a filter under construction.
        let map = unsafe { Mmap::map(&file) }?;
        let (header, index_names, trailer_consistent) = parse(&map)?;
        let covered = index_names.iter().cloned().collect();

        Ok(Self {
            path: path.to_path_buf(),
            backing: Backing::ReadOnly(map),
            header,
            index_names,
            covered,
            trailer_consistent,
        })
    }

    /// Open an existing filter for in-place extension by `expected_additional`
    /// more entries. The bit-array size never changes here; a warning is
    /// logged if the extended filter would exceed the false-positive threshold.
    pub fn open_rw(path: &Path, expected_additional: u64) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;

        // SAFETY: concurrent writers to one directory's filter are not
        // coordinated (see `reconcile`); within this process we are the only
        // holder of a writable mapping.
        let map = unsafe { MmapMut::map_mut(&file) }?;
        let (header, index_names, trailer_consistent) = parse(&map)?;
        let covered = index_names.iter().cloned().collect();

        let filter = Self {
            path: path.to_path_buf(),
            backing: Backing::Writable { file, map },
            header,
            index_names,
            covered,
            trailer_consistent,
        };

        let pfalse = filter.pfalse_positive(expected_additional);
        if pfalse > MAX_PFALSE_POSITIVE {
            warn!(
                entries = filter.len(),
                additional = expected_additional,
                pfalse_pct = pfalse * 100.0,
                "bloom: filter will exceed the false-positive threshold"
            );
        }
        Ok(filter)
    }

    fn bitmap(&self) -> &[u8] {
        let end = BLOOM_HEADER_SIZE + self.header.bitmap_len() as usize;
        &self.backing.bytes()[BLOOM_HEADER_SIZE..end]
    }

    fn bitmap_mut(&mut self) -> Result<&mut [u8]> {
        let end = BLOOM_HEADER_SIZE + self.header.bitmap_len() as usize;
        match &mut self.backing {
            Backing::Writable { map, .. } => Ok(&mut map[BLOOM_HEADER_SIZE..end]),
            Backing::ReadOnly(_) => Err(PackbloomError::Other(format!(
                "bloom filter {} is opened read-only",
                self.path.display()
            ))),
        }
    }

    /// Fold every digest of `index` into the filter and record the index as covered.
    pub fn add_index(&mut self, index: &PackIndex) -> Result<()> {
        if self.covered.contains(index.name()) {
            return Err(PackbloomError::InvalidFilter(format!(
                "{} already covers {}",
                self.path.display(),
                index.name()
            )));
        }
        let Header { k, bits, .. } = self.header;
        let bitmap = self.bitmap_mut()?;
        for digest in index.iter() {
            set_probes(bitmap, &digest, k, bits);
        }
        self.header.entries += index.len();
        self.covered.insert(index.name().to_string());
        self.index_names.push(index.name().to_string());
        Ok(())
    }

    /// `false` means the digest was definitely never added.
    pub fn exists(&self, digest: &Digest) -> bool {
        let bitmap = self.bitmap();
        probes(digest, self.header.k, self.header.bits)
            .all(|bit| (bitmap[(bit >> 3) as usize] & (1 << (bit & 7))) != 0)
    }

    /// Projected false-positive probability after `additional` more entries.
    pub fn pfalse_positive(&self, additional: u64) -> f64 {
        pfalse_positive(
            self.header.k,
            self.header.bits,
            self.header.entries.saturating_add(additional),
        )
    }

    /// Structural sanity check: supported `k`, `bits` in range for that `k`,
    /// and the file length matching header + bit array + trailer exactly.
    pub fn valid(&self) -> bool {
        let Header { k, bits, .. } = self.header;
        SUPPORTED_K.contains(&k)
            && (MIN_BLOOM_BITS..=max_bloom_bits(k)).contains(&bits)
            && self.trailer_consistent
    }

    /// Zero the bit array, keeping header and covered list. The result is
    /// structurally valid but denies everything; used to exercise `check`.
    pub fn ruin(&mut self) -> Result<()> {
        self.bitmap_mut()?.fill(0);
        Ok(())
    }

    /// Flush all writes: bit array, header, and covered-index trailer.
    /// Must be called before a temp file is renamed into place.
    pub fn close(self) -> Result<()> {
        let BloomFilter {
            path,
            backing,
            header,
            index_names,
            ..
        } = self;
        let (mut file, mut map) = match backing {
            Backing::ReadOnly(_) => return Ok(()),
            Backing::Writable { file, map } => (file, map),
        };

        let trailer = encode_trailer(&index_names)?;
        header.encode_into(&mut map[..BLOOM_HEADER_SIZE]);
        map.flush()?;
        drop(map);

        // Trailer first, then trim: the file never ends before a complete trailer.
        let offset = header.trailer_offset();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&trailer)?;
        file.set_len(offset + trailer.len() as u64)?;
        file.sync_all()?;

        debug!(
            entries = header.entries,
            indexes = index_names.len(),
            path = %path.display(),
            "bloom: flushed filter"
        );
        Ok(())
    }

    /// Number of digests added, as recorded in the header.
    pub fn len(&self) -> u64 {
        self.header.entries
    }

    pub fn is_empty(&self) -> bool {
        self.header.entries == 0
    }

    pub fn k(&self) -> u8 {
        self.header.k
    }

    pub fn bits(&self) -> u8 {
        self.header.bits
    }

    /// Covered pack index names, in the order they were added.
    pub fn index_names(&self) -> &[String] {
        &self.index_names
    }

    pub fn covers_index(&self, name: &str) -> bool {
        self.covered.contains(name)
    }
}

impl std::fmt::Debug for BloomFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BloomFilter")
            .field("path", &self.path)
            .field("k", &self.header.k)
            .field("bits", &self.header.bits)
            .field("entries", &self.header.entries)
            .field("indexes", &self.index_names.len())
            .field("writable", &matches!(self.backing, Backing::Writable { .. }))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pfalse_positive_grows_with_entries() {
        let a = pfalse_positive(5, 10, 100);
        let b = pfalse_positive(5, 10, 1000);
        assert!(a < b);
        assert_eq!(pfalse_positive(5, 10, 0), 0.0);
    }

    #[test]
    fn pfalse_positive_matches_closed_form() {
        let (k, bits, n) = (4u8, 8u8, 150u64);
        let m = f64::from(1u32 << (bits + 3));
        let expected = (1.0 - (1.0 - 1.0 / m).powf(f64::from(k) * n as f64)).powi(i32::from(k));
        assert!((pfalse_positive(k, bits, n) - expected).abs() < 1e-12);
    }

    #[test]
    fn required_bits_respects_threshold() {
        for &n in &[1u64, 150, 10_000, 1_000_000] {
            let bits = required_bits(4, n);
            assert!(pfalse_positive(4, bits, n) <= MAX_PFALSE_POSITIVE);
            assert!(bits >= MIN_BLOOM_BITS);
            if bits > MIN_BLOOM_BITS {
                assert!(pfalse_positive(4, bits - 1, n) > MAX_PFALSE_POSITIVE);
            }
        }
    }

    #[test]
    fn probes_are_masked_to_bitmap() {
        let digest = Digest([0xFF; 20]);
        for &(k, bits) in &[(4u8, 8u8), (5, 8), (4, 37), (5, 29)] {
            let limit = 1u64 << (u32::from(bits) + 3);
            let all: Vec<u64> = probes(&digest, k, bits).collect();
            assert_eq!(all.len(), usize::from(k));
            assert!(all.iter().all(|&p| p < limit));
        }
    }

    #[test]
    fn probes_use_disjoint_slices() {
        let mut bytes = [0u8; 20];
        bytes[3] = 1; // last byte of first k=5 slice
        bytes[9] = 2; // last byte of second k=4 slice
        let d = Digest(bytes);
        let k5: Vec<u64> = probes(&d, 5, 29).collect();
        assert_eq!(k5, vec![1, 0, 2 << 16, 0, 0]);
        let k4: Vec<u64> = probes(&d, 4, 37).collect();
        assert_eq!(k4, vec![1 << 8, 2, 0, 0]);
    }

    #[test]
    fn check_k_rejects_other_values() {
        assert!(check_k(4).is_ok());
        assert!(check_k(5).is_ok());
        assert!(matches!(check_k(3), Err(PackbloomError::UnsupportedK(3))));
        assert!(check_k(6).is_err());
    }
}
