//! Buffer pool: a pinned LRU cache of pages keyed by `(relation, page#)`.
//!
//! Frames live in a safe `HashMap`-backed slab rather than an intrusive
//! linked list — eviction walks all unpinned frames for the oldest
//! `touched` tick instead of following pointers.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::common::{Oid, Pgno, RelationKind, PAGE_SIZE};
use crate::error::{Error, ErrorKind, Result};
use crate::storage::file::FileCache;

/// First page of a BTREE relation file is reserved for the tree header.
pub const BTREE_HEADER_PAGES: u64 = 1;

fn page_offset(kind: RelationKind, pno: Pgno) -> u64 {
    let base = match kind {
        RelationKind::Btree => BTREE_HEADER_PAGES * PAGE_SIZE as u64,
        _ => 0,
    };
    base + pno as u64 * PAGE_SIZE as u64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct FrameKey {
    relation: Oid,
    pno: Pgno,
}

struct Frame {
    data: Vec<u8>,
    dirty: bool,
    pins: u32,
    touched: u64,
    kind: RelationKind,
    /// The relation's owning database, kept per-frame so eviction can
    /// rebuild this frame's own file path rather than the path of whatever
    /// page triggered the eviction.
    database_oid: Oid,
}

/// A pinned handle to a buffered page. Callers must `unpin` through the
/// owning pool when done; the pool does not auto-unpin on drop.
pub struct PageHandle {
    pub relation: Oid,
    pub pno: Pgno,
}

pub struct BufferPool {
    capacity: usize,
    frames: HashMap<FrameKey, Frame>,
    clock: u64,
    base_dir: PathBuf,
    files: FileCache,
}

impl BufferPool {
    pub fn new(base_dir: impl Into<PathBuf>, capacity: usize, max_open_files: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            frames: HashMap::new(),
            clock: 0,
            base_dir: base_dir.into(),
            files: FileCache::new(max_open_files),
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn relation_path(&self, database_oid: Oid, relation_oid: Oid) -> PathBuf {
        self.base_dir
            .join(database_oid.to_string())
            .join(relation_oid.to_string())
    }

    /// Create an empty relation file (and its database directory) on disk.
    pub fn create_relation_file(&mut self, database_oid: Oid, relation_oid: Oid, kind: RelationKind) -> Result<()> {
        let dir = self.base_dir.join(database_oid.to_string());
        std::fs::create_dir_all(&dir)?;
        let path = self.relation_path(database_oid, relation_oid);
        self.files.open(&path)?;
        if kind == RelationKind::Btree {
            self.files.extend(&path, PAGE_SIZE as u64)?;
        }
        Ok(())
    }

    /// Number of whole data pages currently in the relation file (excludes
    /// the reserved header page for BTREE relations).
    pub fn relation_page_count(&mut self, database_oid: Oid, relation_oid: Oid, kind: RelationKind) -> Result<Pgno> {
        let path = self.relation_path(database_oid, relation_oid);
        self.files.open(&path)?;
        let size = self.files.size(&path)?;
        let header = match kind {
            RelationKind::Btree => PAGE_SIZE as u64,
            _ => 0,
        };
        Ok(((size.saturating_sub(header)) / PAGE_SIZE as u64) as Pgno)
    }

    /// Evicts the least-recently-touched unpinned frame, flushing it to its
    /// *own* relation file first if dirty — never to whatever file the
    /// caller that triggered eviction happens to be loading.
    fn evict_one(&mut self) -> Result<()> {
        let victim = self
            .frames
            .iter()
            .filter(|(_, f)| f.pins == 0)
            .min_by_key(|(_, f)| f.touched)
            .map(|(k, _)| *k);
        let Some(key) = victim else {
            return Err(Error::new(ErrorKind::Full));
        };
        let frame = self.frames.remove(&key).expect("victim key just found");
        if frame.dirty {
            let path = self.relation_path(frame.database_oid, key.relation);
            self.files.open(&path)?;
            self.files.write_at(&path, page_offset(frame.kind, key.pno), &frame.data)?;
            self.files.flush(&path)?;
        }
        Ok(())
    }

    /// Fetch the page at `(relation, pno)`, loading it (zero-filled, if past
    /// end of file) and pinning it. `kind` decides the on-disk offset.
    pub fn get_page(
        &mut self,
        database_oid: Oid,
        relation_oid: Oid,
        kind: RelationKind,
        pno: Pgno,
    ) -> Result<PageHandle> {
        let key = FrameKey {
            relation: relation_oid,
            pno,
        };
        if !self.frames.contains_key(&key) {
            let path = self.relation_path(database_oid, relation_oid);
            self.files.open(&path)?;
            while self.frames.len() >= self.capacity && !self.frames.contains_key(&key) {
                self.evict_one()?;
            }
            let offset = page_offset(kind, pno);
            let size = self.files.size(&path)?;
            let data = if offset + PAGE_SIZE as u64 <= size {
                self.files.read_at(&path, offset, PAGE_SIZE)?
            } else {
                vec![0u8; PAGE_SIZE]
            };
            let touched = self.tick();
            self.frames.insert(
                key,
                Frame {
                    data,
                    dirty: false,
                    pins: 0,
                    touched,
                    kind,
                    database_oid,
                },
            );
        }
        let touched = self.tick();
        let frame = self.frames.get_mut(&key).expect("just inserted or present");
        frame.pins += 1;
        frame.touched = touched;
        Ok(PageHandle {
            relation: relation_oid,
            pno,
        })
    }

    pub fn page_bytes(&self, relation_oid: Oid, pno: Pgno) -> &[u8] {
        &self
            .frames
            .get(&FrameKey {
                relation: relation_oid,
                pno,
            })
            .expect("page_bytes called on an unpinned/absent page")
            .data
    }

    pub fn write_page(&mut self, relation_oid: Oid, pno: Pgno, data: &[u8]) {
        let frame = self
            .frames
            .get_mut(&FrameKey {
                relation: relation_oid,
                pno,
            })
            .expect("write_page called on an unpinned/absent page");
        frame.data.copy_from_slice(data);
        frame.dirty = true;
    }

    pub fn mark_dirty(&mut self, relation_oid: Oid, pno: Pgno) {
        if let Some(frame) = self.frames.get_mut(&FrameKey {
            relation: relation_oid,
            pno,
        }) {
            frame.dirty = true;
        }
    }

    pub fn pin(&mut self, relation_oid: Oid, pno: Pgno) {
        if let Some(frame) = self.frames.get_mut(&FrameKey {
            relation: relation_oid,
            pno,
        }) {
            frame.pins += 1;
        }
    }

    pub fn unpin(&mut self, relation_oid: Oid, pno: Pgno) {
        if let Some(frame) = self.frames.get_mut(&FrameKey {
            relation: relation_oid,
            pno,
        }) {
            frame.pins = frame.pins.saturating_sub(1);
        }
    }

    /// Flush every dirty entry under one pass, as at checkpoint.
    pub fn sync(&mut self, database_oid: Oid, kind_of: impl Fn(Oid) -> RelationKind) -> Result<()> {
        let dirty_keys: Vec<FrameKey> = self
            .frames
            .iter()
            .filter(|(_, f)| f.dirty)
            .map(|(k, _)| *k)
            .collect();
        for key in dirty_keys {
            let path = self.relation_path(database_oid, key.relation);
            let kind = kind_of(key.relation);
            let offset = page_offset(kind, key.pno);
            let data = self.frames.get(&key).unwrap().data.clone();
            self.files.write_at(&path, offset, &data)?;
            self.files.flush(&path)?;
            self.frames.get_mut(&key).unwrap().dirty = false;
        }
        Ok(())
    }

    /// Drop every cached entry for `relation_oid` without flushing. Used on DROP.
    pub fn evict_relation(&mut self, relation_oid: Oid) {
        self.frames.retain(|k, _| k.relation != relation_oid);
    }

    pub fn close_relation_file(&mut self, database_oid: Oid, relation_oid: Oid) -> Result<()> {
        let path = self.relation_path(database_oid, relation_oid);
        self.files.close(&path)
    }

    pub fn remove_relation_file(&mut self, database_oid: Oid, relation_oid: Oid) -> Result<()> {
        let path = self.relation_path(database_oid, relation_oid);
        self.files.remove(&path)
    }

    /// Read the reserved first page of a BTREE relation file (root page#,
    /// next-page allocator, version). Bypasses the page frame cache: the
    /// header is consulted far more often than it's mutated and is tiny.
    pub fn read_btree_header_page(&mut self, database_oid: Oid, relation_oid: Oid) -> Result<Vec<u8>> {
        let path = self.relation_path(database_oid, relation_oid);
        self.files.open(&path)?;
        self.files.read_at(&path, 0, PAGE_SIZE)
    }

    pub fn write_btree_header_page(&mut self, database_oid: Oid, relation_oid: Oid, data: &[u8]) -> Result<()> {
        let path = self.relation_path(database_oid, relation_oid);
        self.files.write_at(&path, 0, data)?;
        self.files.flush(&path)
    }
}
