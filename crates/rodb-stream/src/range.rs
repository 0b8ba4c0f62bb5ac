use std::io::{self, Read};

/// Limits a parent stream to at most `limit` bytes.
///
/// Returns EOF once the limit is delivered and never consumes beyond it
/// from the parent.
#[derive(Debug)]
pub struct RangeStream<R> {
    inner: R,
    remaining: u64,
}

impl<R: Read> RangeStream<R> {
    pub fn new(inner: R, limit: u64) -> Self {
        Self {
            inner,
            remaining: limit,
        }
    }

    /// Bytes still deliverable before the limit.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Give back the parent stream.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for RangeStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            return Ok(0);
        }
        let cap = buf.len().min(self.remaining.min(usize::MAX as u64) as usize);
        let n = self.inner.read(&mut buf[..cap])?;
        self.remaining -= n as u64;
        Ok(n)
    }
}
