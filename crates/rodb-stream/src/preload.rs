use std::io::{self, Read};
use std::sync::Arc;

use rodb_utils::{BufferPool, PooledBuf};

/// Replays bytes that were already read from somewhere else.
///
/// Owns a buffer detached from the pool; the buffer goes back to the pool
/// when the stream is dropped. Forward-only. Used when header parsing
/// over-reads into payload bytes that must still be delivered.
pub struct PreloadStream {
    buf: PooledBuf,
    filled: usize,
    pos: usize,
}

impl PreloadStream {
    /// Wrap a pooled buffer whose first `filled` bytes are valid.
    pub fn new(buf: PooledBuf, filled: usize) -> Self {
        debug_assert!(filled <= buf.len());
        Self {
            buf,
            filled,
            pos: 0,
        }
    }

    /// Copy `bytes` into a freshly pooled buffer and wrap it.
    pub fn copied_from(pool: &Arc<BufferPool>, bytes: &[u8]) -> Self {
        let mut buf = pool.take(bytes.len());
        buf[..bytes.len()].copy_from_slice(bytes);
        Self::new(buf, bytes.len())
    }

    /// Bytes left to replay.
    pub fn remaining(&self) -> usize {
        self.filled - self.pos
    }
}

impl Read for PreloadStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.remaining());
        buf[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}
