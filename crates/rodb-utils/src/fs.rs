//! Filesystem capability trait.
//!
//! Every disk access in the workspace routes through [`Fs`] so the object
//! store can be exercised against an in-memory implementation in tests.
//! [`StdFs`] is the production implementation over `std::fs`.

use std::collections::HashMap;
use std::io::{self, Cursor, Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// A read-only, seekable file handle.
pub trait FileRead: Read + Seek + Send {}
impl<T: Read + Seek + Send> FileRead for T {}

/// An anonymous read/write temporary file, deleted when dropped.
pub trait TempFile: Read + Write + Seek + Send {}
impl<T: Read + Write + Seek + Send> TempFile for T {}

/// The narrow set of filesystem operations the object store needs.
pub trait Fs: Send + Sync {
    /// Whether `path` names a regular file.
    fn is_file(&self, path: &Path) -> bool;

    /// Whether `path` names a directory.
    fn is_dir(&self, path: &Path) -> bool;

    /// Regular files directly under `dir` whose extension is `ext`,
    /// sorted by file name.
    fn list_files(&self, dir: &Path, ext: &str) -> io::Result<Vec<PathBuf>>;

    /// Open a file for seekable reading.
    fn open(&self, path: &Path) -> io::Result<Box<dyn FileRead>>;

    /// Read a whole file into memory.
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        let mut handle = self.open(path)?;
        let mut buf = Vec::new();
        handle.read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Create an anonymous temporary file (deleted once dropped).
    fn create_temp(&self) -> io::Result<Box<dyn TempFile>>;
}

/// Production filesystem over `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdFs;

impl Fs for StdFs {
    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn list_files(&self, dir: &Path, ext: &str) -> io::Result<Vec<PathBuf>> {
        let mut found = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|e| e == ext) {
                found.push(path);
            }
        }
        found.sort();
        Ok(found)
    }

    fn open(&self, path: &Path) -> io::Result<Box<dyn FileRead>> {
        Ok(Box::new(std::fs::File::open(path)?))
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn create_temp(&self) -> io::Result<Box<dyn TempFile>> {
        // tempfile() unlinks the file immediately; the OS reclaims it when
        // the handle drops, even on abnormal exit.
        Ok(Box::new(tempfile::tempfile()?))
    }
}

/// In-memory filesystem for tests.
///
/// Paths are matched exactly as inserted; directories exist implicitly as
/// prefixes of inserted files.
#[derive(Default)]
pub struct MemFs {
    files: RwLock<HashMap<PathBuf, Vec<u8>>>,
}

impl MemFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert (or replace) a file.
    pub fn insert(&self, path: impl Into<PathBuf>, data: Vec<u8>) {
        self.files.write().unwrap().insert(path.into(), data);
    }

    /// Remove a file, returning whether it existed.
    pub fn remove(&self, path: &Path) -> bool {
        self.files.write().unwrap().remove(path).is_some()
    }
}

impl Fs for MemFs {
    fn is_file(&self, path: &Path) -> bool {
        self.files.read().unwrap().contains_key(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        let files = self.files.read().unwrap();
        files.keys().any(|p| p.starts_with(path) && p != path)
    }

    fn list_files(&self, dir: &Path, ext: &str) -> io::Result<Vec<PathBuf>> {
        let files = self.files.read().unwrap();
        let mut found: Vec<PathBuf> = files
            .keys()
            .filter(|p| p.parent() == Some(dir) && p.extension().is_some_and(|e| e == ext))
            .cloned()
            .collect();
        found.sort();
        Ok(found)
    }

    fn open(&self, path: &Path) -> io::Result<Box<dyn FileRead>> {
        let files = self.files.read().unwrap();
        let data = files.get(path).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no such file: {}", path.display()))
        })?;
        Ok(Box::new(Cursor::new(data.clone())))
    }

    fn create_temp(&self) -> io::Result<Box<dyn TempFile>> {
        Ok(Box::new(Cursor::new(Vec::new())))
    }
}
