//! Pack index reading and lookup.
//!
//! Two on-disk formats exist, distinguished by the first four bytes:
//!
//! ```text
//! v1:  fanout[256] | N × (u32 offset, 20-byte OID) | pack cksum | idx cksum
//! v2:  \xff tOc | version=2 | fanout[256] | N × 20-byte OID (sorted)
//!      | N × u32 CRC32 | N × u32 offset (MSB ⇒ 64-bit table index)
//!      | K × u64 offset | pack cksum | idx cksum
//! ```
//!
//! All integers are big-endian; `N = fanout[255]`. The index may be
//! memory-mapped ([`PackIndex::open`]) or fully loaded through the
//! filesystem abstraction ([`PackIndex::from_bytes`]); lookups are
//! lock-free either way.

use std::ops::Deref;
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use rodb_hash::{FanoutTable, ObjectId};

use crate::{PackError, IDX_SIGNATURE, IDX_VERSION};

const OID_LEN: usize = 20;
const TRAILER_LEN: usize = 2 * OID_LEN;
const FANOUT_LEN: usize = 1024;
/// v1 record: 4-byte offset then the OID.
const V1_RECORD_LEN: usize = 4 + OID_LEN;

#[derive(Debug)]
enum IndexData {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl Deref for IndexData {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        match self {
            Self::Mapped(map) => map,
            Self::Owned(vec) => vec,
        }
    }
}

/// Format of a loaded index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexVersion {
    V1,
    V2,
}

/// An immutable, loaded pack index mapping OIDs to in-pack offsets.
#[derive(Debug)]
pub struct PackIndex {
    data: IndexData,
    version: IndexVersion,
    fanout: FanoutTable,
    num_objects: u32,
    /// v2 table offsets; unused for v1.
    oid_offset: usize,
    crc_offset: usize,
    offset32_offset: usize,
    offset64_offset: usize,
    path: PathBuf,
}

impl PackIndex {
    /// Memory-map and parse an index file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PackError> {
        let path = path.as_ref().to_path_buf();
        let file = std::fs::File::open(&path)?;
        let data = unsafe { Mmap::map(&file)? };
        Self::parse(IndexData::Mapped(data), path)
    }

    /// Parse an index already loaded into memory (used when index files
    /// are read through the filesystem abstraction).
    pub fn from_bytes(data: Vec<u8>, path: PathBuf) -> Result<Self, PackError> {
        Self::parse(IndexData::Owned(data), path)
    }

    fn parse(data: IndexData, path: PathBuf) -> Result<Self, PackError> {
        let is_v2 = data.len() >= 8 && data[..4] == IDX_SIGNATURE;
        if is_v2 {
            Self::parse_v2(data, path)
        } else {
            Self::parse_v1(data, path)
        }
    }

    fn parse_v2(data: IndexData, path: PathBuf) -> Result<Self, PackError> {
        let version = be32(&data, 4);
        if version != IDX_VERSION {
            return Err(PackError::InvalidIndex(format!(
                "unsupported index version {version}, expected {IDX_VERSION}"
            )));
        }
        if data.len() < 8 + FANOUT_LEN + TRAILER_LEN {
            return Err(PackError::InvalidIndex("file too small".into()));
        }

        let fanout = FanoutTable::from_bytes(&data[8..8 + FANOUT_LEN])
            .map_err(|e| PackError::InvalidIndex(e.to_string()))?;
        let num_objects = fanout.total();
        let n = num_objects as usize;

        let oid_offset = 8 + FANOUT_LEN;
        let crc_offset = oid_offset + n * OID_LEN;
        let offset32_offset = crc_offset + n * 4;
        let offset64_offset = offset32_offset + n * 4;

        let min_size = offset64_offset + TRAILER_LEN;
        if data.len() < min_size {
            return Err(PackError::InvalidIndex(format!(
                "file too small: {} < {min_size}",
                data.len()
            )));
        }

        let index = Self {
            data,
            version: IndexVersion::V2,
            fanout,
            num_objects,
            oid_offset,
            crc_offset,
            offset32_offset,
            offset64_offset,
            path,
        };
        index.validate_sorted()?;
        index.validate_offset64_table()?;
        Ok(index)
    }

    fn parse_v1(data: IndexData, path: PathBuf) -> Result<Self, PackError> {
        if data.len() < FANOUT_LEN + TRAILER_LEN {
            return Err(PackError::InvalidIndex("file too small".into()));
        }
        let fanout = FanoutTable::from_bytes(&data[..FANOUT_LEN])
            .map_err(|e| PackError::InvalidIndex(e.to_string()))?;
        let num_objects = fanout.total();
        let n = num_objects as usize;

        let min_size = FANOUT_LEN + n * V1_RECORD_LEN + TRAILER_LEN;
        if data.len() < min_size {
            return Err(PackError::InvalidIndex(format!(
                "file too small: {} < {min_size}",
                data.len()
            )));
        }

        let index = Self {
            data,
            version: IndexVersion::V1,
            fanout,
            num_objects,
            oid_offset: 0,
            crc_offset: 0,
            offset32_offset: 0,
            offset64_offset: 0,
            path,
        };
        index.validate_sorted()?;
        Ok(index)
    }

    /// OIDs must be strictly ascending.
    fn validate_sorted(&self) -> Result<(), PackError> {
        for i in 1..self.num_objects as usize {
            if self.oid_bytes_at(i - 1) >= self.oid_bytes_at(i) {
                return Err(PackError::InvalidIndex(format!(
                    "OID table not strictly ascending at entry {i}"
                )));
            }
        }
        Ok(())
    }

    /// Every 32-bit entry with its MSB set must point inside the 64-bit
    /// table, so that later lookups cannot run off the mapping.
    fn validate_offset64_table(&self) -> Result<(), PackError> {
        let table_len = self.data.len() - TRAILER_LEN - self.offset64_offset;
        for i in 0..self.num_objects as usize {
            let raw = be32(&self.data, self.offset32_offset + i * 4);
            if raw & 0x8000_0000 != 0 {
                let idx64 = (raw & 0x7fff_ffff) as usize;
                if (idx64 + 1) * 8 > table_len {
                    return Err(PackError::InvalidIndex(format!(
                        "entry {i} references 64-bit offset {idx64} beyond table"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Look up an OID, returning its offset in the pack file.
    pub fn lookup(&self, oid: &ObjectId) -> Option<u64> {
        let range = self.fanout.range(oid.first_byte());
        let target = oid.as_bytes();

        let mut low = range.start;
        let mut high = range.end;
        while low < high {
            let mid = low + (high - low) / 2;
            match self.oid_bytes_at(mid).cmp(target) {
                std::cmp::Ordering::Less => low = mid + 1,
                std::cmp::Ordering::Greater => high = mid,
                std::cmp::Ordering::Equal => return Some(self.offset_at(mid as u32)),
            }
        }
        None
    }

    /// All entries whose OID starts with `prefix`, for upper layers that
    /// resolve abbreviations.
    pub fn lookup_prefix(&self, prefix: &[u8]) -> Vec<(ObjectId, u64)> {
        if prefix.is_empty() {
            return Vec::new();
        }
        self.fanout
            .range(prefix[0])
            .filter(|&i| self.oid_bytes_at(i).starts_with(prefix))
            .map(|i| (self.oid_at(i as u32), self.offset_at(i as u32)))
            .collect()
    }

    /// The OID at the given sorted position.
    pub fn oid_at(&self, index: u32) -> ObjectId {
        ObjectId::from_bytes(self.oid_bytes_at(index as usize)).expect("index data is 20 bytes")
    }

    /// The pack offset at the given sorted position.
    pub fn offset_at(&self, index: u32) -> u64 {
        let i = index as usize;
        match self.version {
            IndexVersion::V1 => be32(&self.data, FANOUT_LEN + i * V1_RECORD_LEN) as u64,
            IndexVersion::V2 => {
                let raw = be32(&self.data, self.offset32_offset + i * 4);
                if raw & 0x8000_0000 != 0 {
                    let idx64 = (raw & 0x7fff_ffff) as usize;
                    be64(&self.data, self.offset64_offset + idx64 * 8)
                } else {
                    raw as u64
                }
            }
        }
    }

    /// The CRC32 of the entry's packed bytes (v2 only; parsed, never
    /// verified here).
    pub fn crc32_at(&self, index: u32) -> Option<u32> {
        match self.version {
            IndexVersion::V1 => None,
            IndexVersion::V2 => Some(be32(&self.data, self.crc_offset + index as usize * 4)),
        }
    }

    /// Number of objects in this index.
    pub fn num_objects(&self) -> u32 {
        self.num_objects
    }

    /// On-disk format of this index.
    pub fn version(&self) -> IndexVersion {
        self.version
    }

    /// Path of the `.idx` file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The pack checksum recorded in the trailer.
    pub fn pack_checksum(&self) -> ObjectId {
        let start = self.data.len() - TRAILER_LEN;
        ObjectId::from_bytes(&self.data[start..start + OID_LEN]).expect("trailer is 20 bytes")
    }

    /// The checksum of the index file itself.
    pub fn index_checksum(&self) -> ObjectId {
        let start = self.data.len() - OID_LEN;
        ObjectId::from_bytes(&self.data[start..]).expect("trailer is 20 bytes")
    }

    /// Iterate over `(OID, offset)` pairs in OID order.
    pub fn iter(&self) -> PackIndexIter<'_> {
        PackIndexIter {
            index: self,
            pos: 0,
        }
    }

    fn oid_bytes_at(&self, index: usize) -> &[u8] {
        let start = match self.version {
            IndexVersion::V1 => FANOUT_LEN + index * V1_RECORD_LEN + 4,
            IndexVersion::V2 => self.oid_offset + index * OID_LEN,
        };
        &self.data[start..start + OID_LEN]
    }
}

fn be32(data: &[u8], pos: usize) -> u32 {
    u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]])
}

fn be64(data: &[u8], pos: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[pos..pos + 8]);
    u64::from_be_bytes(bytes)
}

/// Iterator over `(OID, offset)` pairs in a pack index.
pub struct PackIndexIter<'a> {
    index: &'a PackIndex,
    pos: u32,
}

impl Iterator for PackIndexIter<'_> {
    type Item = (ObjectId, u64);

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.index.num_objects {
            return None;
        }
        let item = (self.index.oid_at(self.pos), self.index.offset_at(self.pos));
        self.pos += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.index.num_objects - self.pos) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for PackIndexIter<'_> {}
