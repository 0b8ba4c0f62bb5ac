//! Unified read-only object accessor.
//!
//! [`Accessor`] is the public entry point of the workspace: open it on a
//! repository's administrative directory and ask for objects by id. Packed
//! storage is probed first (indexes are held for the accessor's life),
//! delta chains are resolved across packs and the loose store, and the
//! caller receives the object's concrete type, its size, and a lazy stream
//! of the fully reconstructed payload.

mod accessor;
mod resolve;

pub use accessor::{Accessor, AccessorOptions};

use std::io::Read;

use rodb_hash::ObjectId;
use rodb_loose::LooseError;
use rodb_object::ObjectType;
use rodb_pack::PackError;
use rodb_stream::ByteStream;

/// Errors surfaced by the accessor. Component errors pass through
/// unchanged; a missing object is `Ok(None)`, never an error.
#[derive(Debug, thiserror::Error)]
pub enum OdbError {
    #[error("accessor used after close")]
    Closed,

    #[error("operation cancelled")]
    Cancelled(#[from] rodb_utils::Cancelled),

    #[error(transparent)]
    Loose(#[from] LooseError),

    #[error(transparent)]
    Pack(#[from] PackError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A successfully located object: concrete type, uncompressed length, and
/// a lazy, single-pass payload stream.
///
/// The stream owns everything it needs (cached file handles, memo spill
/// files, pooled buffers); dropping it releases all of them. Reading it to
/// completion yields exactly [`size`](Self::size) bytes.
pub struct ObjectStream {
    kind: ObjectType,
    size: u64,
    reader: ByteStream,
}

impl ObjectStream {
    /// The object's concrete type. Delta kinds never appear here.
    pub fn kind(&self) -> ObjectType {
        self.kind
    }

    /// Uncompressed payload length in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Unwrap into the raw payload stream.
    pub fn into_reader(self) -> ByteStream {
        self.reader
    }

    /// Materialize the remaining payload.
    pub fn read_to_vec(mut self) -> std::io::Result<Vec<u8>> {
        let mut data = Vec::with_capacity(self.size.min(1 << 20) as usize);
        self.reader.read_to_end(&mut data)?;
        Ok(data)
    }
}

impl Read for ObjectStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.reader.read(buf)
    }
}

impl std::fmt::Debug for ObjectStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStream")
            .field("kind", &self.kind)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

pub(crate) fn object_stream(kind: ObjectType, size: u64, reader: ByteStream) -> ObjectStream {
    ObjectStream { kind, size, reader }
}

/// Convenience re-export: the id type objects are addressed by.
pub type Oid = ObjectId;
