//! Pack storage: index lookup, entry decoding, and streaming delta
//! reconstruction.
//!
//! A pack pairs a `.pack` file (compressed, possibly deltified entries)
//! with an `.idx` file mapping object ids to byte offsets. This crate reads
//! both; chain resolution across packs and the loose store is orchestrated
//! by the object-database façade.

pub mod delta;
pub mod entry;
pub mod index;
pub mod pack;
pub mod varint;

#[cfg(test)]
pub(crate) mod testutil;

use rodb_hash::ObjectId;
use rodb_object::ObjectType;
use rodb_stream::StreamError;

/// Errors that can occur while reading packs.
#[derive(Debug, thiserror::Error)]
pub enum PackError {
    #[error("invalid pack header: {0}")]
    InvalidHeader(String),

    #[error("invalid pack index: {0}")]
    InvalidIndex(String),

    #[error("invalid delta: {0}")]
    InvalidDelta(String),

    #[error("invalid varint: {0}")]
    InvalidVarint(&'static str),

    #[error("delta base not found: {0}")]
    MissingBase(ObjectId),

    #[error("delta chain deeper than {max_depth} at offset {offset}")]
    DeltaChainTooDeep { offset: u64, max_depth: usize },

    #[error("delta chain cycle at offset {offset}")]
    DeltaCycle { offset: u64 },

    #[error("corrupt pack entry at offset {0}")]
    CorruptEntry(u64),

    #[error("unsupported pack version: {0}")]
    UnsupportedVersion(u32),

    #[error("operation cancelled")]
    Cancelled(#[from] rodb_utils::Cancelled),

    #[error(transparent)]
    Stream(StreamError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<StreamError> for PackError {
    fn from(e: StreamError) -> Self {
        match e {
            StreamError::Cancelled(c) => Self::Cancelled(c),
            StreamError::Io(io) => Self::Io(io),
            other => Self::Stream(other),
        }
    }
}

/// Kind of a pack entry, straight from its header.
///
/// The two delta kinds are transient: resolution rewrites them to the base
/// object's concrete type before anything reaches a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Commit,
    Tree,
    Blob,
    Tag,
    /// Delta whose base lives `base_offset` bytes into the same pack.
    OfsDelta { base_offset: u64 },
    /// Delta whose base is named by id and may live anywhere.
    RefDelta { base: ObjectId },
}

impl EntryKind {
    /// The concrete object type, for non-delta kinds.
    pub fn object_type(self) -> Option<ObjectType> {
        match self {
            Self::Commit => Some(ObjectType::Commit),
            Self::Tree => Some(ObjectType::Tree),
            Self::Blob => Some(ObjectType::Blob),
            Self::Tag => Some(ObjectType::Tag),
            Self::OfsDelta { .. } | Self::RefDelta { .. } => None,
        }
    }

    /// Whether this entry must be resolved against a base.
    pub fn is_delta(self) -> bool {
        matches!(self, Self::OfsDelta { .. } | Self::RefDelta { .. })
    }

    /// The kind number used in entry headers.
    pub fn kind_number(self) -> u8 {
        match self {
            Self::Commit => 1,
            Self::Tree => 2,
            Self::Blob => 3,
            Self::Tag => 4,
            Self::OfsDelta { .. } => 6,
            Self::RefDelta { .. } => 7,
        }
    }
}

/// Pack file constants.
pub const PACK_SIGNATURE: &[u8; 4] = b"PACK";
pub const PACK_HEADER_SIZE: usize = 12;

/// Pack index v2 constants.
pub const IDX_SIGNATURE: [u8; 4] = [0xff, 0x74, 0x4f, 0x63]; // "\377tOc"
pub const IDX_VERSION: u32 = 2;

/// Default bound on delta chain depth.
pub const DEFAULT_MAX_DELTA_DEPTH: usize = 1024;
