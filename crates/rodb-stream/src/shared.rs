use std::io::{self, Read, Seek, SeekFrom};
use std::sync::{Arc, Mutex};

use crate::cache::CachedHandle;

/// A seekable parent shared by many independent logical streams.
///
/// Each [`SharedCursor`] keeps its own virtual position; a read seeks the
/// parent, reads, and advances the virtual position inside one critical
/// section, so interleaved cursors never observe each other's seeks.
/// The parent handle returns to its cache when the last cursor and the
/// `SharedFile` itself are gone.
#[derive(Clone)]
pub struct SharedFile {
    inner: Arc<Mutex<CachedHandle>>,
}

impl SharedFile {
    pub fn new(handle: CachedHandle) -> Self {
        Self {
            inner: Arc::new(Mutex::new(handle)),
        }
    }

    /// A new logical stream starting at `pos`.
    pub fn cursor(&self, pos: u64) -> SharedCursor {
        SharedCursor {
            file: Arc::clone(&self.inner),
            pos,
        }
    }

    /// Total length of the underlying file.
    pub fn len(&self) -> io::Result<u64> {
        self.inner.lock().unwrap().seek(SeekFrom::End(0))
    }

    pub fn is_empty(&self) -> io::Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// A logical stream over a [`SharedFile`] with its own virtual position.
#[derive(Clone)]
pub struct SharedCursor {
    file: Arc<Mutex<CachedHandle>>,
    pos: u64,
}

impl SharedCursor {
    /// The current virtual position.
    pub fn position(&self) -> u64 {
        self.pos
    }
}

impl std::fmt::Debug for SharedCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedCursor").field("pos", &self.pos).finish_non_exhaustive()
    }
}

impl Read for SharedCursor {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start(self.pos))?;
        let n = file.read(buf)?;
        drop(file);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for SharedCursor {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let new_pos = match pos {
            SeekFrom::Start(p) => p,
            SeekFrom::Current(delta) => {
                self.pos.checked_add_signed(delta).ok_or_else(|| {
                    io::Error::new(io::ErrorKind::InvalidInput, "seek before start")
                })?
            }
            SeekFrom::End(delta) => {
                let end = self.file.lock().unwrap().seek(SeekFrom::End(0))?;
                end.checked_add_signed(delta).ok_or_else(|| {
                    io::Error::new(io::ErrorKind::InvalidInput, "seek before start")
                })?
            }
        };
        self.pos = new_pos;
        Ok(new_pos)
    }
}
