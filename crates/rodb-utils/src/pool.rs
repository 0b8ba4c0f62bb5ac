//! Fixed-class buffer pool.
//!
//! Streams in this workspace copy through 64 KiB scratch buffers, and the
//! memoizing stream fills through 1 MiB ones. Recycling them avoids
//! re-zeroing and re-allocating on every object read.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Weak};

use crossbeam::queue::ArrayQueue;

/// Default scratch buffer size.
pub const SMALL_BUFFER: usize = 64 * 1024;

/// Buffer size used for memoization fills.
pub const LARGE_BUFFER: usize = 1024 * 1024;

const SMALL_SLOTS: usize = 32;
const LARGE_SLOTS: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Class {
    Small,
    Large,
    /// Larger than any pooled class; allocated and dropped normally.
    Unpooled,
}

/// Pool of reusable fixed-size byte buffers.
///
/// Buffers are handed out as [`PooledBuf`] guards which return themselves
/// on drop. Moving a guard into a long-lived owner (a preloaded stream,
/// say) detaches it from the scope that acquired it; the buffer still comes
/// back to the pool when that owner drops.
pub struct BufferPool {
    small: ArrayQueue<Vec<u8>>,
    large: ArrayQueue<Vec<u8>>,
}

impl BufferPool {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            small: ArrayQueue::new(SMALL_SLOTS),
            large: ArrayQueue::new(LARGE_SLOTS),
        })
    }

    /// Take a buffer of at least `min` bytes: the smallest pooled class
    /// that fits, or a plain allocation for oversize requests.
    pub fn take(self: &Arc<Self>, min: usize) -> PooledBuf {
        let (class, len) = if min <= SMALL_BUFFER {
            (Class::Small, SMALL_BUFFER)
        } else if min <= LARGE_BUFFER {
            (Class::Large, LARGE_BUFFER)
        } else {
            (Class::Unpooled, min)
        };

        let mut buf = match class {
            Class::Small => self.small.pop(),
            Class::Large => self.large.pop(),
            Class::Unpooled => None,
        }
        .unwrap_or_default();
        buf.resize(len, 0);

        PooledBuf {
            buf,
            class,
            pool: Arc::downgrade(self),
        }
    }

    fn put_back(&self, class: Class, buf: Vec<u8>) {
        // A full queue just drops the buffer.
        let _ = match class {
            Class::Small => self.small.push(buf),
            Class::Large => self.large.push(buf),
            Class::Unpooled => Ok(()),
        };
    }

    /// Number of buffers currently resting in the pool.
    pub fn idle(&self) -> usize {
        self.small.len() + self.large.len()
    }
}

/// A buffer borrowed from a [`BufferPool`]; returns itself on drop.
pub struct PooledBuf {
    buf: Vec<u8>,
    class: Class,
    pool: Weak<BufferPool>,
}

impl Deref for PooledBuf {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        &self.buf
    }
}

impl DerefMut for PooledBuf {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }
}

impl Drop for PooledBuf {
    fn drop(&mut self) {
        // If the pool is already gone the buffer just deallocates.
        if let Some(pool) = self.pool.upgrade() {
            pool.put_back(self.class, std::mem::take(&mut self.buf));
        }
    }
}
