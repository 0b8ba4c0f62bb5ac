//! Stream primitives and the bounded file-handle cache.
//!
//! Deltified object reconstruction needs random-access reads into
//! compressed blobs without quadratic cost; this crate provides the
//! composable byte streams that make that possible: concatenation, range
//! limiting, preloaded replay, shared seekable parents, header-validating
//! zlib inflation, and memoized random access. All primitives speak
//! [`std::io::Read`] and surface structured failures through
//! [`StreamError`] / tagged [`std::io::Error`] values.

mod cache;
mod chain;
mod inflate;
mod memo;
mod preload;
mod range;
mod shared;

pub use cache::{CachedHandle, HandleCache};
pub use chain::ChainStream;
pub use inflate::InflateStream;
pub use memo::{MemoStream, DEFAULT_SPILL_THRESHOLD};
pub use preload::PreloadStream;
pub use range::RangeStream;
pub use shared::{SharedCursor, SharedFile};

use std::io;

use rodb_utils::Cancelled;

/// A boxed forward-only byte stream.
pub type ByteStream = Box<dyn io::Read + Send>;

/// Errors surfaced by stream construction and composition.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("invalid stream data: {0}")]
    InvalidData(String),

    #[error("stream used after close")]
    InvalidState,

    #[error("operation cancelled")]
    Cancelled(#[from] Cancelled),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Tag an `io::Error` as invalid-data with a message.
pub(crate) fn invalid_data(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

/// An `io::Error` carrying [`Cancelled`], recognizable via [`is_cancelled`].
///
/// `ErrorKind::Interrupted` is deliberately avoided: `read_to_end` and
/// friends retry interrupted reads, which would turn cancellation into a
/// busy loop.
pub fn cancelled_error() -> io::Error {
    io::Error::other(Cancelled)
}

/// Whether an `io::Error` was produced by a fired cancellation token.
pub fn is_cancelled(err: &io::Error) -> bool {
    err.get_ref().is_some_and(|inner| inner.is::<Cancelled>())
}
