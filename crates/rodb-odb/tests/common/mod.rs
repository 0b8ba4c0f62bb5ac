//! Shared fixtures: synthetic repositories with packed and loose objects.
#![allow(dead_code)]

use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::write::ZlibEncoder;
use flate2::Compression;
use rodb_hash::hasher::Hasher;
use rodb_hash::{FanoutTable, ObjectId};
use rodb_object::{header, ObjectType};
use rodb_pack::entry::write_entry_header;
use rodb_pack::varint::{write_offset_varint, write_size_varint};

pub fn compress(data: &[u8]) -> Vec<u8> {
    let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

pub fn make_oid(first_byte: u8, suffix: u8) -> ObjectId {
    let mut bytes = [0u8; 20];
    bytes[0] = first_byte;
    bytes[19] = suffix;
    ObjectId::from_bytes(&bytes).unwrap()
}

/// Build a v2 `.idx` from `(oid, offset, crc)` entries.
pub fn build_idx_v2(entries: &[(ObjectId, u64, u32)], pack_checksum: &[u8; 20]) -> Vec<u8> {
    let mut sorted: Vec<_> = entries.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let mut buf = Vec::new();
    buf.extend_from_slice(&[0xff, 0x74, 0x4f, 0x63]);
    buf.extend_from_slice(&2u32.to_be_bytes());

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

/// Build a delta stream: header varints plus instruction bytes.
pub fn build_delta(base_size: u64, result_size: u64, instructions: &[u8]) -> Vec<u8> {
    let mut delta = write_size_varint(base_size);
    delta.extend_from_slice(&write_size_varint(result_size));
    delta.extend_from_slice(instructions);
    delta
}

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

pub fn encode_insert(data: &[u8]) -> Vec<u8> {
    assert!(!data.is_empty() && data.len() <= 127);
    let mut buf = vec![data.len() as u8];
    buf.extend_from_slice(data);
    buf
}

/// Incrementally assembles a pack and its index entries.
pub struct PackBuilder {
    data: Vec<u8>,
    entries: Vec<(ObjectId, u64, u32)>,
}

impl PackBuilder {
    pub fn new(num_entries: u32) -> Self {
        let mut data = Vec::new();
        data.extend_from_slice(b"PACK");
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

    pub fn add_object(&mut self, ty: ObjectType, content: &[u8]) -> (ObjectId, u64) {
        let oid = Hasher::hash_object(ty.as_str(), content).unwrap();
        let mut raw = write_entry_header(ty.pack_kind(), content.len() as u64);
        raw.extend_from_slice(&compress(content));
        let offset = self.push_entry(oid, &raw);
        (oid, offset)
    }

    pub fn add_ofs_delta(&mut self, result_oid: ObjectId, base_offset: u64, delta: &[u8]) -> u64 {
        let mut raw = write_entry_header(6, delta.len() as u64);
        let here = self.data.len() as u64;
        raw.extend_from_slice(&write_offset_varint(here - base_offset));
        raw.extend_from_slice(&compress(delta));
        self.push_entry(result_oid, &raw)
    }

    pub fn add_ref_delta(&mut self, result_oid: ObjectId, base: ObjectId, delta: &[u8]) -> u64 {
        let mut raw = write_entry_header(7, delta.len() as u64);
        raw.extend_from_slice(base.as_bytes());
        raw.extend_from_slice(&compress(delta));
        self.push_entry(result_oid, &raw)
    }

    pub fn finish(mut self) -> (Vec<u8>, Vec<(ObjectId, u64, u32)>, [u8; 20]) {
        let checksum = Hasher::digest(&self.data).unwrap();
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(checksum.as_bytes());
        self.data.extend_from_slice(&bytes);
        (self.data, self.entries, bytes)
    }
}

/// A throwaway repository layout: `<admin>/objects/{pack,XX}/...`.
pub struct TestRepo {
    _dir: tempfile::TempDir,
    admin: PathBuf,
}

impl TestRepo {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let admin = dir.path().join("repo");
        std::fs::create_dir_all(admin.join("objects/pack")).unwrap();
        Self { _dir: dir, admin }
    }

    pub fn admin_dir(&self) -> &Path {
        &self.admin
    }

    /// Install a `.pack`/`.idx` pair under `objects/pack/`.
    pub fn add_pack(&self, stem: &str, pack: &[u8], idx: &[u8]) {
        let pack_dir = self.admin.join("objects/pack");
        std::fs::write(pack_dir.join(format!("{stem}.pack")), pack).unwrap();
        std::fs::write(pack_dir.join(format!("{stem}.idx")), idx).unwrap();
    }

    /// Install a finished [`PackBuilder`] with a v2 index.
    pub fn add_pack_v2(&self, stem: &str, builder: PackBuilder) {
        let (pack, entries, checksum) = builder.finish();
        let idx = build_idx_v2(&entries, &checksum);
        self.add_pack(stem, &pack, &idx);
    }

    /// Write a loose object; returns its OID.
    pub fn write_loose(&self, ty: ObjectType, payload: &[u8]) -> ObjectId {
        let oid = Hasher::hash_object(ty.as_str(), payload).unwrap();
        let mut raw = header::write_header(ty, payload.len() as u64);
        raw.extend_from_slice(payload);

        let path = self.admin.join("objects").join(oid.loose_path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, compress(&raw)).unwrap();
        oid
    }

    /// Write raw (possibly corrupt) bytes at a loose object's path.
    pub fn write_loose_raw(&self, oid: &ObjectId, bytes: &[u8]) {
        let path = self.admin.join("objects").join(oid.loose_path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, bytes).unwrap();
    }
}
