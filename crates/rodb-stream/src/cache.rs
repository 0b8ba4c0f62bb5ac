use std::io::{self, Read, Seek, SeekFrom};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use lru::LruCache;
use rodb_utils::{FileRead, Fs};

/// Bounded LRU of open read-only file handles, keyed by path.
///
/// Handles handed out as [`CachedHandle`] guards are *borrowed*: dropping a
/// guard releases the handle back to the free list (rewound to position 0)
/// instead of closing it. Only eviction, or the cache itself being dropped,
/// closes the underlying OS handle.
pub struct HandleCache {
    fs: Arc<dyn Fs>,
    capacity: usize,
    free: Mutex<LruCache<PathBuf, Box<dyn FileRead>>>,
    borrowed: AtomicUsize,
}

impl std::fmt::Debug for HandleCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandleCache")
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl HandleCache {
    /// Create a cache bounded to `capacity` handles (≥ 1).
    pub fn new(fs: Arc<dyn Fs>, capacity: usize) -> Arc<Self> {
        let capacity = capacity.max(1);
        Arc::new(Self {
            fs,
            capacity,
            free: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).expect("capacity is at least 1"),
            )),
            borrowed: AtomicUsize::new(0),
        })
    }

    /// Create a cache with the default bound of `2 × CPU` handles.
    pub fn with_default_capacity(fs: Arc<dyn Fs>) -> Arc<Self> {
        let cpus = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(2);
        Self::new(fs, cpus * 2)
    }

    /// Borrow a handle for `path`, reusing a cached one when available.
    ///
    /// On a miss, least-recently-used free handles are evicted until the
    /// open-handle bound has room, then a fresh handle is opened.
    pub fn acquire(self: &Arc<Self>, path: &Path) -> io::Result<CachedHandle> {
        let cached = {
            let mut free = self.free.lock().unwrap();
            match free.pop(path) {
                Some(handle) => Some(handle),
                None => {
                    // Make room for the handle we are about to open.
                    let borrowed = self.borrowed.load(Ordering::SeqCst);
                    while free.len() + borrowed + 1 > self.capacity && !free.is_empty() {
                        if let Some((evicted, _)) = free.pop_lru() {
                            tracing::debug!(path = %evicted.display(), "evicting pack handle");
                        }
                    }
                    None
                }
            }
        };

        let handle = match cached {
            Some(handle) => handle,
            None => self.fs.open(path)?,
        };
        self.borrowed.fetch_add(1, Ordering::SeqCst);
        Ok(CachedHandle {
            path: path.to_path_buf(),
            handle: Some(handle),
            cache: Arc::downgrade(self),
        })
    }

    /// The configured handle bound.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Handles currently resting in the free list.
    pub fn idle(&self) -> usize {
        self.free.lock().unwrap().len()
    }

    /// Handles currently borrowed by callers.
    pub fn borrowed(&self) -> usize {
        self.borrowed.load(Ordering::SeqCst)
    }

    /// Close every free handle. Borrowed handles close directly on drop
    /// once their guards notice the cleared list cannot take them back.
    pub fn clear(&self) {
        self.free.lock().unwrap().clear();
    }

    fn release(&self, path: PathBuf, mut handle: Box<dyn FileRead>) {
        self.borrowed.fetch_sub(1, Ordering::SeqCst);
        // A handle that cannot rewind is broken; close it instead.
        if handle.seek(SeekFrom::Start(0)).is_err() {
            return;
        }
        let mut free = self.free.lock().unwrap();
        while free.len() + self.borrowed.load(Ordering::SeqCst) >= self.capacity && !free.is_empty() {
            free.pop_lru();
        }
        free.push(path, handle);
    }
}

/// A borrowed read-only handle from a [`HandleCache`].
///
/// Implements `Read`/`Seek` by delegation. Dropping the guard is a
/// pseudo-close: the handle is returned to the cache's free list. If the
/// cache has already been dropped, the handle closes for real, which is the
/// safety net that guarantees eventual OS-handle release.
pub struct CachedHandle {
    path: PathBuf,
    handle: Option<Box<dyn FileRead>>,
    cache: Weak<HandleCache>,
}

impl std::fmt::Debug for CachedHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedHandle")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl CachedHandle {
    /// The path this handle was opened for.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn inner(&mut self) -> &mut Box<dyn FileRead> {
        self.handle.as_mut().expect("handle present until drop")
    }
}

impl Read for CachedHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner().read(buf)
    }
}

impl Seek for CachedHandle {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner().seek(pos)
    }
}

impl Drop for CachedHandle {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            match self.cache.upgrade() {
                Some(cache) => cache.release(std::mem::take(&mut self.path), handle),
                // Cache gone: dropping the boxed handle closes it.
                None => drop(handle),
            }
        }
    }
}
