//! Pack file access.
//!
//! A [`PackFile`] couples a loaded [`PackIndex`] with the path of its
//! `.pack` file; open handles are borrowed from the handle cache per
//! lookup, not held for the pack's life, so a repository may carry far
//! more packs than the cache admits handles. Within one lookup all entry
//! streams share a single borrowed handle through [`SharedFile`] cursors.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rodb_hash::ObjectId;
use rodb_stream::{HandleCache, InflateStream, RangeStream, SharedCursor, SharedFile};

use crate::entry::{read_entry_header, EntryHeader};
use crate::index::PackIndex;
use crate::{PackError, PACK_HEADER_SIZE, PACK_SIGNATURE};

/// The payload stream of a single pack entry: inflated, bounded to the
/// header's uncompressed size.
pub type EntryPayload = RangeStream<InflateStream<SharedCursor>>;

/// An open pack file plus its index.
#[derive(Debug)]
pub struct PackFile {
    path: PathBuf,
    index: PackIndex,
    cache: Arc<HandleCache>,
    version: u32,
    num_objects: u32,
}

impl PackFile {
    /// Open a pack, memory-mapping its sibling `.idx` file.
    pub fn open(pack_path: impl AsRef<Path>, cache: &Arc<HandleCache>) -> Result<Self, PackError> {
        let pack_path = pack_path.as_ref();
        let index = PackIndex::open(pack_path.with_extension("idx"))?;
        Self::with_index(pack_path, index, cache)
    }

    /// Open a pack against an already-loaded index.
    ///
    /// The pack header is validated here with a transiently borrowed
    /// handle; the handle goes straight back to the cache.
    pub fn with_index(
        pack_path: impl AsRef<Path>,
        index: PackIndex,
        cache: &Arc<HandleCache>,
    ) -> Result<Self, PackError> {
        let path = pack_path.as_ref().to_path_buf();

        let mut header = [0u8; PACK_HEADER_SIZE];
        {
            let mut handle = cache.acquire(&path)?;
            handle.read_exact(&mut header).map_err(|e| {
                if e.kind() == std::io::ErrorKind::UnexpectedEof {
                    PackError::InvalidHeader("file too small".into())
                } else {
                    PackError::Io(e)
                }
            })?;
        }

        if &header[0..4] != PACK_SIGNATURE {
            return Err(PackError::InvalidHeader("bad PACK signature".into()));
        }
        let version = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
        // Version 3 shares version 2's layout.
        if !matches!(version, 2 | 3) {
            return Err(PackError::UnsupportedVersion(version));
        }
        let num_objects = u32::from_be_bytes([header[8], header[9], header[10], header[11]]);
        if index.num_objects() != num_objects {
            return Err(PackError::InvalidHeader(format!(
                "pack has {num_objects} objects but index has {}",
                index.num_objects()
            )));
        }

        tracing::debug!(
            path = %path.display(),
            version,
            objects = num_objects,
            "opened pack"
        );
        Ok(Self {
            path,
            index,
            cache: Arc::clone(cache),
            version,
            num_objects,
        })
    }

    /// Borrow a handle from the cache and wrap it for shared cursors.
    ///
    /// One lookup acquires this once per pack and derives every entry
    /// stream of the chain from it; the handle returns to the cache when
    /// the last cursor drops.
    pub fn shared(&self) -> Result<SharedFile, PackError> {
        Ok(SharedFile::new(self.cache.acquire(&self.path)?))
    }

    /// Decode the entry at `offset` through an existing shared view.
    ///
    /// For delta entries the payload is the delta instruction stream; the
    /// caller resolves the base and applies it.
    pub fn entry_at_shared(
        &self,
        shared: &SharedFile,
        offset: u64,
    ) -> Result<(EntryHeader, EntryPayload), PackError> {
        if offset < PACK_HEADER_SIZE as u64 {
            return Err(PackError::CorruptEntry(offset));
        }
        let mut cursor = shared.cursor(offset);
        let header = read_entry_header(&mut cursor, offset)?;
        // The cursor now sits on the first compressed payload byte.
        let inflate = InflateStream::new(cursor)?;
        let payload = RangeStream::new(inflate, header.size);
        Ok((header, payload))
    }

    /// Decode the entry at `offset` with a freshly borrowed handle.
    pub fn entry_at(&self, offset: u64) -> Result<(EntryHeader, EntryPayload), PackError> {
        let shared = self.shared()?;
        self.entry_at_shared(&shared, offset)
    }

    /// Look up an OID in this pack's index.
    pub fn lookup(&self, oid: &ObjectId) -> Option<u64> {
        self.index.lookup(oid)
    }

    /// Whether this pack contains the OID.
    pub fn contains(&self, oid: &ObjectId) -> bool {
        self.index.lookup(oid).is_some()
    }

    pub fn index(&self) -> &PackIndex {
        &self.index
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn num_objects(&self) -> u32 {
        self.num_objects
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{build_idx_v2, write_pack_pair, PackBuilder};
    use crate::EntryKind;
    use rodb_object::ObjectType;
    use rodb_utils::StdFs;

    fn new_cache() -> Arc<HandleCache> {
        HandleCache::new(Arc::new(StdFs), 4)
    }

    fn single_blob_pack(dir: &Path, content: &[u8]) -> (PathBuf, ObjectId) {
        let mut builder = PackBuilder::new(1);
        let (oid, _) = builder.add_object(ObjectType::Blob, content);
        let (pack, entries, checksum) = builder.finish();
        let idx = build_idx_v2(&entries, &checksum);
        (write_pack_pair(dir, "test", &pack, &idx), oid)
    }

    #[test]
    fn open_and_read_single_blob() {
        let dir = tempfile::tempdir().unwrap();
        let content = b"Hello, packfile world!";
        let (pack_path, oid) = single_blob_pack(dir.path(), content);

        let pack = PackFile::open(&pack_path, &new_cache()).unwrap();
        assert_eq!(pack.num_objects(), 1);
        assert_eq!(pack.version(), 2);
        assert!(pack.contains(&oid));

        let offset = pack.lookup(&oid).unwrap();
        let (header, mut payload) = pack.entry_at(offset).unwrap();
        assert_eq!(header.kind, EntryKind::Blob);
        assert_eq!(header.size, content.len() as u64);

        let mut out = Vec::new();
        payload.read_to_end(&mut out).unwrap();
        assert_eq!(out, content);
    }

    #[test]
    fn read_multiple_objects_through_one_shared_view() {
        let dir = tempfile::tempdir().unwrap();
        let objects: Vec<(ObjectType, &[u8])> = vec![
            (ObjectType::Blob, b"blob content"),
            (ObjectType::Blob, b"another blob"),
            (ObjectType::Commit, b"tree 0000000000000000000000000000000000000000\nauthor T <t@t> 0 +0000\ncommitter T <t@t> 0 +0000\n\ntest commit\n"),
        ];

        let mut builder = PackBuilder::new(objects.len() as u32);
        let mut oids = Vec::new();
        for (ty, content) in &objects {
            let (oid, _) = builder.add_object(*ty, content);
            oids.push(oid);
        }
        let (pack_bytes, entries, checksum) = builder.finish();
        let idx = build_idx_v2(&entries, &checksum);
        let pack_path = write_pack_pair(dir.path(), "multi", &pack_bytes, &idx);

        let cache = new_cache();
        let pack = PackFile::open(&pack_path, &cache).unwrap();
        assert_eq!(pack.num_objects(), 3);

        let shared = pack.shared().unwrap();
        assert_eq!(cache.borrowed(), 1);

        for (i, (ty, content)) in objects.iter().enumerate() {
            let offset = pack.lookup(&oids[i]).unwrap();
            let (header, mut payload) = pack.entry_at_shared(&shared, offset).unwrap();
            assert_eq!(header.kind.object_type(), Some(*ty));
            let mut out = Vec::new();
            payload.read_to_end(&mut out).unwrap();
            assert_eq!(&out, content);
        }

        // Still the one borrowed handle, shared by every stream above.
        assert_eq!(cache.borrowed(), 1);
    }

    #[test]
    fn missing_oid_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let (pack_path, _) = single_blob_pack(dir.path(), b"data");
        let pack = PackFile::open(&pack_path, &new_cache()).unwrap();

        let missing = ObjectId::from_hex("0000000000000000000000000000000000000001").unwrap();
        assert!(!pack.contains(&missing));
        assert_eq!(pack.lookup(&missing), None);
    }

    #[test]
    fn delta_entry_exposes_base_reference() {
        let dir = tempfile::tempdir().unwrap();
        let base_content = b"the base object for delta testing";

        let mut builder = PackBuilder::new(2);
        let (_base_oid, base_offset) = builder.add_object(ObjectType::Blob, base_content);
        let delta = crate::testutil::build_delta(
            base_content.len() as u64,
            5,
            &crate::testutil::encode_copy(0, 5),
        );
        let target_oid = crate::testutil::make_oid(0xaa, 0x01);
        let delta_offset = builder.add_ofs_delta(target_oid, base_offset, &delta);
        let (pack_bytes, entries, checksum) = builder.finish();
        let idx = build_idx_v2(&entries, &checksum);
        let pack_path = write_pack_pair(dir.path(), "delta", &pack_bytes, &idx);

        let pack = PackFile::open(&pack_path, &new_cache()).unwrap();
        let (header, mut payload) = pack.entry_at(delta_offset).unwrap();
        assert_eq!(header.kind, EntryKind::OfsDelta { base_offset });
        assert!(header.kind.is_delta());
        assert_eq!(header.kind.object_type(), None);

        // The payload is the raw delta instruction stream.
        let mut out = Vec::new();
        payload.read_to_end(&mut out).unwrap();
        assert_eq!(out, delta);
    }

    #[test]
    fn version_3_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let mut builder = PackBuilder::new(1);
        let (oid, offset) = builder.add_object(ObjectType::Blob, b"v3 pack");
        let (mut pack_bytes, entries, checksum) = builder.finish();
        pack_bytes[7] = 3; // rewrite the version field
        let idx = build_idx_v2(&entries, &checksum);
        let pack_path = write_pack_pair(dir.path(), "v3", &pack_bytes, &idx);

        let pack = PackFile::open(&pack_path, &new_cache()).unwrap();
        assert_eq!(pack.version(), 3);
        assert_eq!(pack.lookup(&oid), Some(offset));
    }

    #[test]
    fn unsupported_version_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let builder = PackBuilder::new(0);
        let (mut pack_bytes, entries, checksum) = builder.finish();
        pack_bytes[7] = 4;
        let idx = build_idx_v2(&entries, &checksum);
        let pack_path = write_pack_pair(dir.path(), "v4", &pack_bytes, &idx);

        let err = PackFile::open(&pack_path, &new_cache()).unwrap_err();
        assert!(matches!(err, PackError::UnsupportedVersion(4)));
    }

    #[test]
    fn bad_signature_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let builder = PackBuilder::new(0);
        let (mut pack_bytes, entries, checksum) = builder.finish();
        pack_bytes[0] = b'K';
        let idx = build_idx_v2(&entries, &checksum);
        let pack_path = write_pack_pair(dir.path(), "bad", &pack_bytes, &idx);

        let err = PackFile::open(&pack_path, &new_cache()).unwrap_err();
        assert!(matches!(err, PackError::InvalidHeader(_)));
    }

    #[test]
    fn object_count_mismatch_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut builder = PackBuilder::new(1);
        let _ = builder.add_object(ObjectType::Blob, b"x");
        let (pack_bytes, _entries, checksum) = builder.finish();
        // Index claims zero objects.
        let idx = build_idx_v2(&[], &checksum);
        let pack_path = write_pack_pair(dir.path(), "mismatch", &pack_bytes, &idx);

        let err = PackFile::open(&pack_path, &new_cache()).unwrap_err();
        assert!(matches!(err, PackError::InvalidHeader(_)));
    }

    #[test]
    fn offset_before_entries_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let (pack_path, _) = single_blob_pack(dir.path(), b"x");
        let pack = PackFile::open(&pack_path, &new_cache()).unwrap();
        let err = pack.entry_at(3).unwrap_err();
        assert!(matches!(err, PackError::CorruptEntry(3)));
    }

    #[test]
    fn open_does_not_pin_a_handle() {
        let dir = tempfile::tempdir().unwrap();
        let (pack_path, oid) = single_blob_pack(dir.path(), b"x");
        let cache = new_cache();
        let pack = PackFile::open(&pack_path, &cache).unwrap();

        // Validation borrowed a handle and gave it straight back.
        assert_eq!(cache.borrowed(), 0);
        assert_eq!(cache.idle(), 1);

        let offset = pack.lookup(&oid).unwrap();
        let (_, payload) = pack.entry_at(offset).unwrap();
        assert_eq!(cache.borrowed(), 1);
        drop(payload);
        assert_eq!(cache.borrowed(), 0);
        assert_eq!(cache.idle(), 1);
    }
}
