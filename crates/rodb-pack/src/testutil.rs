//! Fixture builders for synthetic packs and indexes.
//!
//! Reading is the crate's whole surface, so the write-side codecs needed to
//! manufacture test data live here, compiled for tests only.

use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::write::ZlibEncoder;
use flate2::Compression;
use rodb_hash::hasher::Hasher;
use rodb_hash::{FanoutTable, ObjectId};
use rodb_object::ObjectType;

use crate::entry::write_entry_header;
use crate::varint::{write_offset_varint, write_size_varint};
use crate::{IDX_SIGNATURE, IDX_VERSION, PACK_SIGNATURE};

/// An OID distinguished by its first and last bytes.
pub fn make_oid(first_byte: u8, suffix: u8) -> ObjectId {
    let mut bytes = [0u8; 20];
    bytes[0] = first_byte;
    bytes[19] = suffix;
    ObjectId::from_bytes(&bytes).unwrap()
}

pub fn compress(data: &[u8]) -> Vec<u8> {
    let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

/// Build a v2 `.idx` from `(oid, offset, crc)` entries. Offsets past the
/// 31-bit line go through the 64-bit extension table.
pub fn build_idx_v2(entries: &[(ObjectId, u64, u32)], pack_checksum: &[u8; 20]) -> Vec<u8> {
    let mut sorted: Vec<_> = entries.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let mut buf = Vec::new();
    buf.extend_from_slice(&IDX_SIGNATURE);
    buf.extend_from_slice(&IDX_VERSION.to_be_bytes());

    let oids: Vec<ObjectId> = sorted.iter().map(|(oid, _, _)| *oid).collect();
    buf.extend_from_slice(&FanoutTable::build(&oids).to_bytes());

    for (oid, _, _) in &sorted {
        buf.extend_from_slice(oid.as_bytes());
    }
    for (_, _, crc) in &sorted {
        buf.extend_from_slice(&crc.to_be_bytes());
    }

    let mut table64: Vec<u64> = Vec::new();
    for (_, offset, _) in &sorted {
        if *offset < 0x8000_0000 {
            buf.extend_from_slice(&(*offset as u32).to_be_bytes());
        } else {
            let idx = table64.len() as u32;
            buf.extend_from_slice(&(0x8000_0000 | idx).to_be_bytes());
            table64.push(*offset);
        }
    }
    for offset in table64 {
        buf.extend_from_slice(&offset.to_be_bytes());
    }

    buf.extend_from_slice(pack_checksum);
    let idx_checksum = Hasher::digest(&buf).unwrap();
    buf.extend_from_slice(idx_checksum.as_bytes());
    buf
}

/// Build a v1 `.idx` (fanout, then interleaved offset/OID records).
pub fn build_idx_v1(entries: &[(ObjectId, u64, u32)], pack_checksum: &[u8; 20]) -> Vec<u8> {
    let mut sorted: Vec<_> = entries.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let mut buf = Vec::new();
    let oids: Vec<ObjectId> = sorted.iter().map(|(oid, _, _)| *oid).collect();
    buf.extend_from_slice(&FanoutTable::build(&oids).to_bytes());

    for (oid, offset, _) in &sorted {
        buf.extend_from_slice(&(*offset as u32).to_be_bytes());
        buf.extend_from_slice(oid.as_bytes());
    }

    buf.extend_from_slice(pack_checksum);
    let idx_checksum = Hasher::digest(&buf).unwrap();
    buf.extend_from_slice(idx_checksum.as_bytes());
    buf
}

/// Incrementally assembles a pack and the entries for its index.
pub struct PackBuilder {
    data: Vec<u8>,
    entries: Vec<(ObjectId, u64, u32)>,
}

impl PackBuilder {
    pub fn new(num_entries: u32) -> Self {
        let mut data = Vec::new();
        data.extend_from_slice(PACK_SIGNATURE);
        data.extend_from_slice(&2u32.to_be_bytes());
        data.extend_from_slice(&num_entries.to_be_bytes());
        Self {
            data,
            entries: Vec::new(),
        }
    }

    fn push_entry(&mut self, oid: ObjectId, raw: &[u8]) -> u64 {
        let offset = self.data.len() as u64;
        let mut crc = crc32fast::Hasher::new();
        crc.update(raw);
        self.entries.push((oid, offset, crc.finalize()));
        self.data.extend_from_slice(raw);
        offset
    }

    /// Append a non-delta object; returns its OID and entry offset.
    pub fn add_object(&mut self, ty: ObjectType, content: &[u8]) -> (ObjectId, u64) {
        let oid = Hasher::hash_object(ty.as_str(), content).unwrap();
        let mut raw = write_entry_header(ty.pack_kind(), content.len() as u64);
        raw.extend_from_slice(&compress(content));
        let offset = self.push_entry(oid, &raw);
        (oid, offset)
    }

    /// Append an OFS_DELTA entry whose base starts at `base_offset`.
    pub fn add_ofs_delta(&mut self, result_oid: ObjectId, base_offset: u64, delta: &[u8]) -> u64 {
        let mut raw = write_entry_header(6, delta.len() as u64);
        let here = self.data.len() as u64;
        raw.extend_from_slice(&write_offset_varint(here - base_offset));
        raw.extend_from_slice(&compress(delta));
        self.push_entry(result_oid, &raw)
    }

    /// Append a REF_DELTA entry naming its base by OID.
    pub fn add_ref_delta(&mut self, result_oid: ObjectId, base: ObjectId, delta: &[u8]) -> u64 {
        let mut raw = write_entry_header(7, delta.len() as u64);
        raw.extend_from_slice(base.as_bytes());
        raw.extend_from_slice(&compress(delta));
        self.push_entry(result_oid, &raw)
    }

    /// Finish the pack: returns `(pack bytes, index entries, pack checksum)`.
    pub fn finish(mut self) -> (Vec<u8>, Vec<(ObjectId, u64, u32)>, [u8; 20]) {
        let checksum = Hasher::digest(&self.data).unwrap();
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(checksum.as_bytes());
        self.data.extend_from_slice(&bytes);
        (self.data, self.entries, bytes)
    }
}

/// Write a `.pack`/`.idx` pair under `dir`; returns the `.pack` path.
pub fn write_pack_pair(dir: &Path, stem: &str, pack: &[u8], idx: &[u8]) -> PathBuf {
    let pack_path = dir.join(format!("{stem}.pack"));
    std::fs::write(&pack_path, pack).unwrap();
    std::fs::write(dir.join(format!("{stem}.idx")), idx).unwrap();
    pack_path
}

/// Build a delta instruction stream from a header and instruction bytes.
pub fn build_delta(base_size: u64, result_size: u64, instructions: &[u8]) -> Vec<u8> {
    let mut delta = write_size_varint(base_size);
    delta.extend_from_slice(&write_size_varint(result_size));
    delta.extend_from_slice(instructions);
    delta
}

/// Encode a delta copy instruction.
pub fn encode_copy(offset: u64, size: usize) -> Vec<u8> {
    let mut cmd: u8 = 0x80;
    let mut extra = Vec::new();

    let off = offset as u32;
    for (i, flag) in [0x01u8, 0x02, 0x04, 0x08].into_iter().enumerate() {
        let byte = ((off >> (8 * i)) & 0xff) as u8;
        if byte != 0 {
            cmd |= flag;
            extra.push(byte);
        }
    }

    let sz = if size == 0x10000 { 0 } else { size as u32 };
    for (i, flag) in [0x10u8, 0x20, 0x40].into_iter().enumerate() {
        let byte = ((sz >> (8 * i)) & 0xff) as u8;
        if byte != 0 {
            cmd |= flag;
            extra.push(byte);
        }
    }

    let mut buf = vec![cmd];
    buf.extend_from_slice(&extra);
    buf
}

/// Encode a delta insert instruction. `data` must be 1..=127 bytes.
pub fn encode_insert(data: &[u8]) -> Vec<u8> {
    assert!(!data.is_empty() && data.len() <= 127);
    let mut buf = vec![data.len() as u8];
    buf.extend_from_slice(data);
    buf
}
