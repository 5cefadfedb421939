//! Snapshot format: persist and restore a cache in recency order
//!
//! Frame layout (all integers little-endian):
//! ```text
//! LRUSNAP\n                      8-byte magic
//! [version: u32]                 format version, currently 1
//! [capacity: u64]
//! [size: u64]
//! size x {
//!   [key_len: u32][key bytes]    bincode-encoded key
//!   [value_len: u32][value bytes] bincode-encoded value
//! }
//! ```
//!
//! Records are written most-recently-used first. Statistics, the lock and
//! the modification counter are never written; a loaded cache starts with
//! zeroed counters.

use std::fs::{self, File};
use std::hash::Hash;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use nom::{
    bytes::complete::{tag, take},
    number::complete::{le_u32, le_u64},
    IResult,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, warn};

use crate::cache::LruCache;
use crate::error::{Error, Result};

/// Magic header for snapshot files
pub const SNAPSHOT_MAGIC: &[u8] = b"LRUSNAP\n";

/// Current snapshot format version
pub const SNAPSHOT_VERSION: u32 = 1;

/// Records reserved up front while decoding, regardless of the header
const MAX_PREALLOC_RECORDS: usize = 1024;

/// Snapshot header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SnapshotHeader {
    version: u32,
    capacity: u64,
    size: u64,
}

fn parse_header(input: &[u8]) -> IResult<&[u8], SnapshotHeader> {
    let (input, _) = tag(SNAPSHOT_MAGIC)(input)?;
    let (input, version) = le_u32(input)?;
    let (input, capacity) = le_u64(input)?;
    let (input, size) = le_u64(input)?;
    Ok((
        input,
        SnapshotHeader {
            version,
            capacity,
            size,
        },
    ))
}

fn parse_blob(input: &[u8]) -> IResult<&[u8], &[u8]> {
    let (input, len) = le_u32(input)?;
    take(len)(input)
}

fn parse_record(input: &[u8]) -> IResult<&[u8], (&[u8], &[u8])> {
    let (input, key) = parse_blob(input)?;
    let (input, value) = parse_blob(input)?;
    Ok((input, (key, value)))
}

fn write_blob<W: Write>(writer: &mut W, bytes: &[u8]) -> Result<()> {
    let len = u32::try_from(bytes.len()).map_err(|_| {
        Error::Snapshot(format!("Record too large: {} bytes", bytes.len()))
    })?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(bytes)?;
    Ok(())
}

fn to_usize(value: u64, field: &str) -> Result<usize> {
    usize::try_from(value)
        .map_err(|_| Error::Snapshot(format!("{} {} does not fit in usize", field, value)))
}

/// Decode a full frame into capacity + MRU -> LRU entries
fn decode_frame<K, V>(bytes: &[u8]) -> Result<(usize, Vec<(K, V)>)>
where
    K: DeserializeOwned,
    V: DeserializeOwned,
{
    let (mut input, header) = parse_header(bytes)?;

    if header.version != SNAPSHOT_VERSION {
        return Err(Error::Snapshot(format!(
            "Unsupported snapshot version: {}",
            header.version
        )));
    }
    if header.capacity == 0 {
        return Err(Error::Snapshot("Snapshot capacity is 0".to_string()));
    }
    if header.size > header.capacity {
        return Err(Error::Snapshot(format!(
            "Snapshot size {} exceeds capacity {}",
            header.size, header.capacity
        )));
    }

    let capacity = to_usize(header.capacity, "capacity")?;
    let size = to_usize(header.size, "size")?;

    let mut entries = Vec::with_capacity(size.min(MAX_PREALLOC_RECORDS));
    for _ in 0..size {
        let (rest, (key, value)) = parse_record(input)?;
        entries.push((bincode::deserialize(key)?, bincode::deserialize(value)?));
        input = rest;
    }

    if !input.is_empty() {
        return Err(Error::Snapshot(format!(
            "{} trailing bytes after {} records",
            input.len(),
            size
        )));
    }

    Ok((capacity, entries))
}

impl<K, V> LruCache<K, V>
where
    K: Hash + Eq + Clone + Serialize,
    V: Clone + Serialize,
{
    /// Write a snapshot of the cache to `writer`
    ///
    /// Entries are copied under the lock first; encoding and I/O happen
    /// after it is released.
    pub fn save<W: Write>(&self, mut writer: W) -> Result<()> {
        let (capacity, entries) = self.capture();

        writer.write_all(SNAPSHOT_MAGIC)?;
        writer.write_all(&SNAPSHOT_VERSION.to_le_bytes())?;
        writer.write_all(&(capacity as u64).to_le_bytes())?;
        writer.write_all(&(entries.len() as u64).to_le_bytes())?;

        for (key, value) in &entries {
            write_blob(&mut writer, &bincode::serialize(key)?)?;
            write_blob(&mut writer, &bincode::serialize(value)?)?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Encode a snapshot into memory
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.save(&mut buf)?;
        Ok(buf)
    }

    /// Write a snapshot file.
    ///
    /// The snapshot goes to `<path>.tmp`, which is synced and then renamed
    /// over `path`, so a crash never leaves a half-written file at the
    /// target path.
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        let file = File::create(&tmp_path)?;
        if let Err(e) = self.write_and_replace(file, &tmp_path, path) {
            // The temp file is ours; a failed cleanup must not mask `e`
            if let Err(cleanup) = fs::remove_file(&tmp_path) {
                warn!(path = ?tmp_path, error = %cleanup, "Failed to remove temp snapshot");
            }
            return Err(e);
        }

        info!(path = ?path, entries = self.len(), "Saved cache snapshot");
        Ok(())
    }

    fn write_and_replace(&self, file: File, tmp_path: &Path, path: &Path) -> Result<()> {
        let mut writer = BufWriter::new(file);
        self.save(&mut writer)?;
        writer
            .into_inner()
            .map_err(|e| Error::Io(e.into_error()))?
            .sync_all()?;
        fs::rename(tmp_path, path)?;
        Ok(())
    }
}

impl<K, V> LruCache<K, V>
where
    K: Hash + Eq + Clone + DeserializeOwned,
    V: Clone + DeserializeOwned,
{
    /// Decode a snapshot from memory
    ///
    /// Either the whole frame is valid and a new cache is returned, or an
    /// error is returned and nothing is built.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let result = decode_frame(bytes)
            .and_then(|(capacity, entries)| Self::restore(capacity, entries));
        if let Err(e) = &result {
            warn!(error = %e, "Rejected cache snapshot");
        }
        result
    }

    /// Read a snapshot from `reader`
    pub fn load<R: Read>(mut reader: R) -> Result<Self> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        Self::from_bytes(&buf)
    }

    /// Read a snapshot file written by [`save_to_path`](Self::save_to_path)
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let cache = Self::load(File::open(path)?)?;
        info!(path = ?path, entries = cache.len(), "Loaded cache snapshot");
        Ok(cache)
    }
}
