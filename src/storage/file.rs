//! Positional file I/O and a bounded LRU of open file descriptors.
//!
//! The teacher's `os::unix`/`os::vfs` layer wraps raw `libc` open/seek/read
//! calls behind a `Vfs`/`VfsFile` trait pair built for SQLite's full
//! lock/mmap/shm feature set. None of that applies to a single-process
//! storage core, so this module keeps only the part `spec.md` §4.C asks
//! for — positional read/write/extend over plain files — built on
//! `std::os::unix::fs::FileExt` instead of raw syscalls.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use crate::error::{Error, ErrorKind, Result};

/// One cached open file plus its cache-recency stamp.
struct Entry {
    file: File,
    touched: u64,
}

/// Bounded LRU of open [`File`] descriptors keyed by path.
///
/// `open` returns the cached handle or opens and inserts one; when the
/// cache is full the least-recently-touched entry is synced and closed
/// before a new one is admitted, matching `spec.md` §4.C.
pub struct FileCache {
    capacity: usize,
    entries: HashMap<PathBuf, Entry>,
    clock: u64,
}

impl FileCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            clock: 0,
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn evict_one(&mut self) -> Result<()> {
        let victim = self
            .entries
            .iter()
            .min_by_key(|(_, e)| e.touched)
            .map(|(p, _)| p.clone());
        if let Some(path) = victim {
            if let Some(entry) = self.entries.remove(&path) {
                entry.file.sync_all()?;
            }
        }
        Ok(())
    }

    /// Open (or reuse) the file at `path`, creating it if absent.
    pub fn open(&mut self, path: &Path) -> Result<()> {
        if self.entries.contains_key(path) {
            let touched = self.tick();
            self.entries.get_mut(path).unwrap().touched = touched;
            return Ok(());
        }
        while self.entries.len() >= self.capacity {
            self.evict_one()?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .map_err(|e| Error::with_message(ErrorKind::CantOpen, e.to_string()))?;
        let touched = self.tick();
        self.entries.insert(path.to_path_buf(), Entry { file, touched });
        Ok(())
    }

    /// Close and fsync the file at `path`, if cached. Idempotent.
    pub fn close(&mut self, path: &Path) -> Result<()> {
        if let Some(entry) = self.entries.remove(path) {
            entry.file.sync_all()?;
        }
        Ok(())
    }

    fn reopen_if_closed(&mut self, path: &Path) -> Result<()> {
        if !self.entries.contains_key(path) {
            self.open(path)?;
        }
        Ok(())
    }

    fn entry(&mut self, path: &Path) -> Result<&mut Entry> {
        self.reopen_if_closed(path)?;
        let touched = self.tick();
        let entry = self.entries.get_mut(path).expect("just reopened");
        entry.touched = touched;
        Ok(entry)
    }

    pub fn read_at(&mut self, path: &Path, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        let entry = self.entry(path)?;
        entry
            .file
            .read_exact_at(&mut buf, offset)
            .map_err(|e| Error::with_message(ErrorKind::IoErr, e.to_string()))?;
        Ok(buf)
    }

    pub fn write_at(&mut self, path: &Path, offset: u64, data: &[u8]) -> Result<()> {
        let entry = self.entry(path)?;
        entry
            .file
            .write_all_at(data, offset)
            .map_err(|e| Error::with_message(ErrorKind::IoErr, e.to_string()))
    }

    pub fn size(&mut self, path: &Path) -> Result<u64> {
        let entry = self.entry(path)?;
        Ok(entry.file.metadata()?.len())
    }

    /// Append `n` zero bytes to the end of the file. Used to pre-allocate
    /// WAL segments and to grow relation files by whole pages.
    pub fn extend(&mut self, path: &Path, n: u64) -> Result<()> {
        let size = self.size(path)?;
        let zeros = vec![0u8; n as usize];
        self.write_at(path, size, &zeros)
    }

    pub fn flush(&mut self, path: &Path) -> Result<()> {
        if let Some(entry) = self.entries.get(path) {
            entry.file.sync_all()?;
        }
        Ok(())
    }

    pub fn remove(&mut self, path: &Path) -> Result<()> {
        self.close(path)?;
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::with_message(ErrorKind::IoErr, e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rel.0");
        let mut cache = FileCache::new(2);
        cache.open(&path).unwrap();
        cache.write_at(&path, 0, b"hello world").unwrap();
        let back = cache.read_at(&path, 0, 11).unwrap();
        assert_eq!(back, b"hello world");
    }

    #[test]
    fn extend_appends_zero_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rel.0");
        let mut cache = FileCache::new(2);
        cache.open(&path).unwrap();
        cache.write_at(&path, 0, b"abc").unwrap();
        cache.extend(&path, 5).unwrap();
        assert_eq!(cache.size(&path).unwrap(), 8);
        let tail = cache.read_at(&path, 3, 5).unwrap();
        assert_eq!(tail, vec![0u8; 5]);
    }

    #[test]
    fn lru_eviction_flushes_before_dropping_handle() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        let c = dir.path().join("c");
        let mut cache = FileCache::new(2);
        cache.open(&a).unwrap();
        cache.open(&b).unwrap();
        cache.write_at(&a, 0, b"data").unwrap();
        // touching b keeps it hot, a becomes the LRU victim when c is opened
        cache.open(&b).unwrap();
        cache.open(&c).unwrap();
        assert_eq!(cache.entries.len(), 2);
        // reopening a must succeed (reopen-if-closed path) and see prior bytes
        let back = cache.read_at(&a, 0, 4).unwrap();
        assert_eq!(back, b"data");
    }
}
