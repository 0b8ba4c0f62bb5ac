use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use rodb_utils::{BufferPool, CancelToken, Fs, PooledBuf, TempFile};

use crate::{cancelled_error, invalid_data, ByteStream};

/// Default spill threshold: bases up to 1 MiB stay in memory.
pub const DEFAULT_SPILL_THRESHOLD: usize = 1024 * 1024;

enum Store {
    Memory(Vec<u8>),
    Spilled(Box<dyn TempFile>),
}

/// Adapts a forward-only parent of known length to random access.
///
/// Bytes are pulled from the parent on demand and memoized into a backing
/// store (pooled memory below the spill threshold, an anonymous temp file
/// above it), so previously produced regions can be re-read without
/// re-decoding. This is what makes delta copy instructions that reference
/// earlier regions of a base affordable.
///
/// Not thread-safe; a memo stream belongs to exactly one consumer.
pub struct MemoStream {
    parent: Option<ByteStream>,
    store: Store,
    len: u64,
    /// Bytes memoized so far; always ≤ `len`.
    filled: u64,
    pos: u64,
    scratch: PooledBuf,
    fs: Arc<dyn Fs>,
    spill_threshold: usize,
    token: CancelToken,
}

impl std::fmt::Debug for MemoStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoStream")
            .field("len", &self.len)
            .field("filled", &self.filled)
            .field("pos", &self.pos)
            .finish_non_exhaustive()
    }
}

impl MemoStream {
    /// Wrap `parent`, which must produce exactly `len` bytes.
    ///
    /// Parents of unknown length are unrepresentable by design: every
    /// caller in this workspace knows the decoded size up front from an
    /// entry or object header.
    pub fn new(
        parent: ByteStream,
        len: u64,
        fs: Arc<dyn Fs>,
        pool: &Arc<BufferPool>,
        spill_threshold: usize,
        token: CancelToken,
    ) -> Self {
        let initial = len.min(spill_threshold as u64) as usize;
        Self {
            parent: Some(parent),
            store: Store::Memory(Vec::with_capacity(initial)),
            len,
            filled: 0,
            pos: 0,
            scratch: pool.take(len.min(DEFAULT_SPILL_THRESHOLD as u64) as usize),
            fs,
            spill_threshold,
            token,
        }
    }

    /// Total number of bytes this stream produces.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The current read position.
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Whether the backing store has spilled to a temp file.
    pub fn spilled(&self) -> bool {
        matches!(self.store, Store::Spilled(_))
    }

    /// Pull one chunk from the parent into the backing store.
    fn fill_chunk(&mut self) -> io::Result<()> {
        if self.token.is_cancelled() {
            return Err(cancelled_error());
        }
        let want = (self.len - self.filled).min(self.scratch.len() as u64) as usize;
        let parent = self
            .parent
            .as_mut()
            .expect("parent kept until fully drained");
        let n = parent.read(&mut self.scratch[..want])?;
        if n == 0 {
            return Err(invalid_data(format!(
                "source ended at {} of {} expected bytes",
                self.filled, self.len
            )));
        }

        let fresh = &self.scratch[..n];
        match &mut self.store {
            Store::Memory(buf) if buf.len() + n > self.spill_threshold => {
                let mut file = self.fs.create_temp()?;
                file.write_all(buf)?;
                file.write_all(fresh)?;
                self.store = Store::Spilled(file);
            }
            Store::Memory(buf) => buf.extend_from_slice(fresh),
            Store::Spilled(file) => {
                file.seek(SeekFrom::Start(self.filled))?;
                file.write_all(fresh)?;
            }
        }
        self.filled += n as u64;
        if self.filled == self.len {
            // Parent fully consumed; release it (and whatever it holds).
            self.parent = None;
        }
        Ok(())
    }

    /// Copy memoized bytes at `pos` into `buf`.
    fn read_memoized(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = (self.filled - self.pos).min(buf.len() as u64) as usize;
        match &mut self.store {
            Store::Memory(data) => {
                let start = self.pos as usize;
                buf[..available].copy_from_slice(&data[start..start + available]);
            }
            Store::Spilled(file) => {
                file.seek(SeekFrom::Start(self.pos))?;
                file.read_exact(&mut buf[..available])?;
            }
        }
        self.pos += available as u64;
        Ok(available)
    }
}

impl Read for MemoStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.pos >= self.len {
            return Ok(0);
        }
        // A forward seek may have left pos beyond the memoized region;
        // catch the store up first.
        while self.filled <= self.pos {
            self.fill_chunk()?;
        }
        self.read_memoized(buf)
    }
}

impl Seek for MemoStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(p) => Some(p),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
            SeekFrom::End(delta) => self.len.checked_add_signed(delta),
        }
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "seek before start"))?;
        if target > self.len {
            return Err(invalid_data(format!(
                "seek to {target} past stream length {}",
                self.len
            )));
        }
        self.pos = target;
        Ok(target)
    }
}
