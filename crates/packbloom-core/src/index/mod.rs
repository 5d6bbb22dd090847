use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use tracing::debug;

use packbloom_types::error::{PackbloomError, Result};
use packbloom_types::{Digest, DIGEST_LEN};

/// Magic bytes at the start of every pack index file.
pub const INDEX_MAGIC: &[u8; 8] = b"PBIDX\0\0\0";

/// Current pack index format version.
pub const INDEX_VERSION: u32 = 1;

/// Size of the fixed header: magic + version + reserved + digest count.
pub const INDEX_HEADER_SIZE: usize = 24;

/// File extension of pack index files inside a pack directory.
pub const INDEX_EXTENSION: &str = "idx";

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Memory-mapped, read-only view of one pack's sorted digest index.
///
/// The file is immutable once published, so a single mapping can be iterated
/// any number of times.
pub struct PackIndex {
    name: String,
    path: PathBuf,
    mmap: Mmap,
    count: u64,
}

impl PackIndex {
    /// Open and validate the index file at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                PackbloomError::InvalidIndex(format!("unusable file name: {}", path.display()))
            })?
            .to_string();

        let file = std::fs::File::open(path)?;

        // SAFETY: pack indexes are never modified after publication (they are
        // written to a temp file and renamed into place).
        let mmap = unsafe { Mmap::map(&file) }?;

        if mmap.len() < INDEX_HEADER_SIZE {
            return Err(PackbloomError::InvalidIndex(format!(
                "{name}: file too small for header ({} bytes)",
                mmap.len()
            )));
        }
        if &mmap[0..8] != INDEX_MAGIC {
            return Err(PackbloomError::InvalidIndex(format!("{name}: bad magic")));
        }
        let version = read_u32(&mmap[8..12]);
        if version != INDEX_VERSION {
            return Err(PackbloomError::InvalidIndex(format!(
                "{name}: unsupported version {version}"
            )));
        }
        let count = read_u64(&mmap[16..24]);

        let expected_size = (count as u128) * (DIGEST_LEN as u128) + INDEX_HEADER_SIZE as u128;
        if mmap.len() as u128 != expected_size {
            return Err(PackbloomError::InvalidIndex(format!(
                "{name}: size {} does not match {count} digests",
                mmap.len()
            )));
        }

        Ok(Self {
            name,
            path: path.to_path_buf(),
            mmap,
            count,
        })
    }

    /// Base file name, the key under which a bloom filter records coverage.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of digests in the index.
    pub fn len(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Iterate every digest in ascending order. Each call starts from the beginning.
    pub fn iter(&self) -> impl Iterator<Item = Digest> + '_ {
        self.mmap[INDEX_HEADER_SIZE..]
            .chunks_exact(DIGEST_LEN)
            .filter_map(Digest::from_slice)
    }

    /// Binary search for `digest`.
    pub fn contains(&self, digest: &Digest) -> bool {
        let data = &self.mmap[INDEX_HEADER_SIZE..];
        let target = digest.as_bytes().as_slice();

        let mut lo: usize = 0;
        let mut hi: usize = self.count as usize;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let offset = mid * DIGEST_LEN;
            match data[offset..offset + DIGEST_LEN].cmp(target) {
                std::cmp::Ordering::Equal => return true,
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
            }
        }
        false
    }
}

impl std::fmt::Debug for PackIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackIndex")
            .field("name", &self.name)
            .field("count", &self.count)
            .finish()
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[..4]);
    u32::from_le_bytes(buf)
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(buf)
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Write a pack index containing `digests` (sorted and deduplicated) to `path`.
/// Writes atomically via temp-file + rename. Returns the number of digests written.
pub fn write_pack_index<I>(path: &Path, digests: I) -> Result<u64>
where
    I: IntoIterator<Item = Digest>,
{
    let mut sorted: Vec<Digest> = digests.into_iter().collect();
    sorted.sort_unstable();
    sorted.dedup();
    write_sorted(path, &sorted)
}

/// Write a pack index into `dir`, named after the hash of its contents
/// (`pack-<hex>.idx`). Returns the path of the new file.
pub fn write_pack_index_in<I>(dir: &Path, digests: I) -> Result<PathBuf>
where
    I: IntoIterator<Item = Digest>,
{
    let mut sorted: Vec<Digest> = digests.into_iter().collect();
    sorted.sort_unstable();
    sorted.dedup();

    let mut concat = Vec::with_capacity(sorted.len() * DIGEST_LEN);
    for d in &sorted {
        concat.extend_from_slice(d.as_bytes());
    }
    let name = format!("pack-{}.{INDEX_EXTENSION}", Digest::compute(&concat).to_hex());
    let path = dir.join(name);
    write_sorted(&path, &sorted)?;
    Ok(path)
}

fn write_sorted(path: &Path, sorted: &[Digest]) -> Result<u64> {
    let count = sorted.len() as u64;

    // Temp name must not end in `.idx`, or a concurrent scan would pick it up.
    let tmp_path = path.with_extension("tmp");
    let file = std::fs::File::create(&tmp_path)?;
    let mut w = BufWriter::new(file);

    w.write_all(INDEX_MAGIC)?;
    w.write_all(&INDEX_VERSION.to_le_bytes())?;
    w.write_all(&0u32.to_le_bytes())?; // reserved
    w.write_all(&count.to_le_bytes())?;
    for digest in sorted {
        w.write_all(digest.as_bytes())?;
    }

    let file = w.into_inner().map_err(|e| PackbloomError::Io(e.into_error()))?;
    file.sync_all()?;
    drop(file);

    std::fs::rename(&tmp_path, path)?;

    debug!(entries = count, path = %path.display(), "wrote pack index");
    Ok(count)
}
