//! Pack entry header decoding.

use std::io::{self, Read};

use rodb_hash::ObjectId;

use crate::varint::read_offset_varint;
use crate::{EntryKind, PackError};

/// A decoded entry header: what the entry is and how large it inflates to.
///
/// `header_len` is the number of pack bytes the header occupied (including
/// the OFS_DELTA offset varint or REF_DELTA base id); the zlib payload
/// starts immediately after.
#[derive(Debug, Clone)]
pub struct EntryHeader {
    pub kind: EntryKind,
    /// Uncompressed size of the payload that follows. For delta entries
    /// this is the size of the delta instruction stream, not the result.
    pub size: u64,
    pub header_len: u64,
}

/// Counts bytes consumed from the wrapped reader.
struct CountingReader<'a, R> {
    inner: &'a mut R,
    count: u64,
}

impl<R: Read> Read for CountingReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count += n as u64;
        Ok(n)
    }
}

/// Decode the entry header found at `entry_offset`.
///
/// `r` must be positioned at the first header byte; on success it is left
/// positioned at the first payload byte. A header that ends prematurely or
/// names an unknown kind is reported as a corrupt entry.
pub fn read_entry_header(r: &mut impl Read, entry_offset: u64) -> Result<EntryHeader, PackError> {
    let mut r = CountingReader { inner: r, count: 0 };
    let corrupt = |e: PackError| match e {
        PackError::InvalidVarint(_) => PackError::CorruptEntry(entry_offset),
        other => other,
    };

    let mut byte = read_byte(&mut r, entry_offset)?;
    let kind_number = (byte >> 4) & 0x07;
    let mut size: u64 = (byte & 0x0f) as u64;
    let mut shift = 4u32;
    while byte & 0x80 != 0 {
        byte = read_byte(&mut r, entry_offset)?;
        if shift >= 64 || (shift == 60 && byte & 0x70 != 0) {
            return Err(PackError::CorruptEntry(entry_offset));
        }
        size |= ((byte & 0x7f) as u64) << shift;
        shift += 7;
    }

    let kind = match kind_number {
        1 => EntryKind::Commit,
        2 => EntryKind::Tree,
        3 => EntryKind::Blob,
        4 => EntryKind::Tag,
        6 => {
            let distance = read_offset_varint(&mut r).map_err(corrupt)?;
            // A zero distance would make the entry its own base.
            if distance == 0 || distance > entry_offset {
                return Err(PackError::CorruptEntry(entry_offset));
            }
            EntryKind::OfsDelta {
                base_offset: entry_offset - distance,
            }
        }
        7 => {
            let mut oid = [0u8; 20];
            r.read_exact(&mut oid)
                .map_err(|_| PackError::CorruptEntry(entry_offset))?;
            EntryKind::RefDelta {
                base: ObjectId::from(oid),
            }
        }
        _ => return Err(PackError::CorruptEntry(entry_offset)),
    };

    Ok(EntryHeader {
        kind,
        size,
        header_len: r.count,
    })
}

fn read_byte<R: Read>(r: &mut CountingReader<'_, R>, entry_offset: u64) -> Result<u8, PackError> {
    let mut byte = [0u8; 1];
    r.read_exact(&mut byte).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            PackError::CorruptEntry(entry_offset)
        } else {
            PackError::Io(e)
        }
    })?;
    Ok(byte[0])
}

/// Encode an entry header. Fixture counterpart of [`read_entry_header`];
/// OFS_DELTA offsets and REF_DELTA base ids are appended by the caller.
pub fn write_entry_header(kind_number: u8, size: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(10);
    let mut s = size;
    let mut byte = (kind_number << 4) | (s & 0x0f) as u8;
    s >>= 4;
    while s > 0 {
        buf.push(byte | 0x80);
        byte = (s & 0x7f) as u8;
        s >>= 7;
    }
    buf.push(byte);
    buf
}
