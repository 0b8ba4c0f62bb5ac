//! Loose object reading.
//!
//! Each loose object lives at `objects/XX/YYYY...` where `XX` is the first
//! OID byte in hex and `YYYY...` the rest. The file is a zlib stream whose
//! decompressed form is `"<type> <size>\0<payload>"`.

mod read;

pub use read::LooseStore;

use rodb_object::ObjectError;
use rodb_stream::StreamError;

/// Errors from loose object operations.
#[derive(Debug, thiserror::Error)]
pub enum LooseError {
    #[error("corrupt loose object {oid}: {reason}")]
    Corrupt { oid: String, reason: String },

    #[error("loose object {oid}: {source}")]
    Header {
        oid: String,
        #[source]
        source: ObjectError,
    },

    #[error("operation cancelled")]
    Cancelled(#[from] rodb_utils::Cancelled),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl LooseError {
    fn from_stream(oid: &rodb_hash::ObjectId, e: StreamError) -> Self {
        match e {
            StreamError::Io(io) => Self::Io(io),
            StreamError::Cancelled(c) => Self::Cancelled(c),
            other => Self::Corrupt {
                oid: oid.to_hex(),
                reason: other.to_string(),
            },
        }
    }
}
