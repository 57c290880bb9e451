//! Write-ahead log: physical/logical redo records tiled across fixed-size
//! pages, which in turn tile fixed-size segment files named by LSN.
//!
//! Records are buffered a page at a time and only forced to disk on
//! COMMIT/ABORT or when the buffer fills, rather than flushing on every
//! append.

use std::collections::VecDeque;
use std::path::PathBuf;

use crate::codec::{self, define_struct, Endian};
use crate::common::{Lsn, Oid, Pgno, SlotId, Xid, WAL_PAGE_SIZE, WAL_SEGMENT_SIZE};
use crate::error::{Error, ErrorKind, Result};
use crate::storage::file::FileCache;

/// Exhaustive WAL action set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum WalAction {
    ToBeContinued = 0,
    Checkpoint = 1,
    Begin = 2,
    Commit = 3,
    Abort = 4,
    HeapInsert = 5,
    HeapDelete = 6,
    HeapBatchDelete = 7,
    HeapUpdate = 8,
    BtreeInsert = 9,
    BtreeDelete = 10,
    BtreeUpdate = 11,
    /// Compensation action for undoing a `HEAP_DELETE`: flips an item-id
    /// back `DEAD -> NORMAL`. Logged so a crash mid-abort still recovers
    /// correctly instead of leaving the compensating change unrecorded.
    HeapUndelete = 12,
}

impl WalAction {
    pub fn from_u32(v: u32) -> Option<Self> {
        use WalAction::*;
        match v {
            0 => Some(ToBeContinued),
            1 => Some(Checkpoint),
            2 => Some(Begin),
            3 => Some(Commit),
            4 => Some(Abort),
            5 => Some(HeapInsert),
            6 => Some(HeapDelete),
            7 => Some(HeapBatchDelete),
            8 => Some(HeapUpdate),
            9 => Some(BtreeInsert),
            10 => Some(BtreeDelete),
            11 => Some(BtreeUpdate),
            12 => Some(HeapUndelete),
            _ => None,
        }
    }

    /// Actions that change on-disk state and must be replayed; BEGIN/COMMIT/
    /// ABORT/CHECKPOINT only bound transaction lifetimes.
    pub fn is_redoable(self) -> bool {
        !matches!(self, WalAction::ToBeContinued | WalAction::Checkpoint | WalAction::Begin | WalAction::Commit | WalAction::Abort)
    }
}

define_struct! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct WalRecordHeader {
        total_size: u32,
        padding_size: u32,
        xid: u64,
        oid: u64,
        page: u32,
        slot: u32,
        action: u32,
    }
}

define_struct! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct WalPageHeader {
        lsn: u64,
        last_page_written_size: u32,
    }
}

/// A decoded record as yielded by [`WalManager::replay`], with
/// `TO_BE_CONTINUED` prefixes already stitched onto their successor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedWalRecord {
    pub lsn: Lsn,
    pub xid: Xid,
    pub oid: Oid,
    pub page: Pgno,
    pub slot: SlotId,
    pub action: WalAction,
    pub payload: Vec<u8>,
}

struct WalPage {
    lsn: Lsn,
    /// Always `WAL_PAGE_SIZE` bytes, zero-initialized past `used`.
    bytes: Vec<u8>,
    used: usize,
    closed: bool,
    flushed_upto: usize,
    last_record_offset: Option<usize>,
}

pub struct WalManager {
    wal_dir: PathBuf,
    files: FileCache,
    buffer: VecDeque<WalPage>,
    write_lsn: Lsn,
    flush_lsn: Lsn,
    wal_buffer_pages: usize,
}

impl WalManager {
    /// Opens (creating if absent) the `wal/` directory and derives
    /// `write_lsn`/`flush_lsn` from the highest segment file's logical end.
    pub fn open(wal_dir: impl Into<PathBuf>, wal_buffer_pages: usize, max_open_files: usize) -> Result<Self> {
        let wal_dir = wal_dir.into();
        std::fs::create_dir_all(&wal_dir)?;

        let mut highest_lsn: Lsn = 0;
        for entry in std::fs::read_dir(&wal_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name == "CHECKPOINT" {
                continue;
            }
            if let Ok(segment_idx) = u64::from_str_radix(&name, 16) {
                let size = entry.metadata()?.len();
                highest_lsn = highest_lsn.max(segment_idx * WAL_SEGMENT_SIZE + size);
            }
        }

        Ok(Self {
            wal_dir,
            files: FileCache::new(max_open_files),
            buffer: VecDeque::new(),
            write_lsn: highest_lsn,
            flush_lsn: highest_lsn,
            wal_buffer_pages,
        })
    }

    pub fn write_lsn(&self) -> Lsn {
        self.write_lsn
    }

    pub fn flush_lsn(&self) -> Lsn {
        self.flush_lsn
    }

    fn segment_path(&self, lsn: Lsn) -> PathBuf {
        self.wal_dir.join(format!("{:016X}", lsn / WAL_SEGMENT_SIZE))
    }

    fn open_new_page(&mut self) {
        let lsn = self.write_lsn;
        let mut bytes = vec![0u8; WAL_PAGE_SIZE];
        let header = WalPageHeader { lsn, last_page_written_size: 0 };
        bytes[..WalPageHeader::SIZE].copy_from_slice(&header.pack());
        self.buffer.push_back(WalPage {
            lsn,
            bytes,
            used: WalPageHeader::SIZE,
            closed: false,
            flushed_upto: 0,
            last_record_offset: None,
        });
        self.write_lsn += WalPageHeader::SIZE as u64;
    }

    fn current_free(&self) -> usize {
        self.buffer.back().map(|p| WAL_PAGE_SIZE - p.used).unwrap_or(0)
    }

    fn set_last_record_padding(&mut self, padding: u32) {
        if let Some(page) = self.buffer.back_mut() {
            if let Some(off) = page.last_record_offset {
                page.bytes[off + 4..off + 8].copy_from_slice(&padding.to_le_bytes());
            }
        }
    }

    fn close_current_page(&mut self) {
        if let Some(page) = self.buffer.back_mut() {
            page.closed = true;
            let header = WalPageHeader { lsn: page.lsn, last_page_written_size: page.used as u32 };
            page.bytes[..WalPageHeader::SIZE].copy_from_slice(&header.pack());
        }
    }

    fn write_record_into_current(&mut self, xid: Xid, oid: Oid, pno: Pgno, slot: SlotId, action: WalAction, payload: &[u8]) {
        let page = self.buffer.back_mut().expect("caller ensures an open page exists");
        let offset = page.used;
        let header = WalRecordHeader {
            total_size: (WalRecordHeader::SIZE + payload.len()) as u32,
            padding_size: 0,
            xid,
            oid,
            page: pno,
            slot,
            action: action as u32,
        };
        let hbytes = header.pack();
        page.bytes[offset..offset + hbytes.len()].copy_from_slice(&hbytes);
        page.bytes[offset + hbytes.len()..offset + hbytes.len() + payload.len()].copy_from_slice(payload);
        page.used += hbytes.len() + payload.len();
        page.last_record_offset = Some(offset);
    }

    /// Appends a record, splitting it across a page boundary with a
    /// `ToBeContinued` prefix if it doesn't fit in the space left on the
    /// current page. Returns the LSN the record starts at.
    pub fn append(&mut self, xid: Xid, oid: Oid, pno: Pgno, slot: SlotId, action: WalAction, payload: &[u8]) -> Result<Lsn> {
        if self.buffer.is_empty() {
            self.open_new_page();
        }
        let header_len = WalRecordHeader::SIZE;
        let total_len = header_len + payload.len();
        let free = self.current_free();

        if free < header_len {
            self.set_last_record_padding(free as u32);
            self.close_current_page();
            self.open_new_page();
            return self.append(xid, oid, pno, slot, action, payload);
        }

        let record_lsn = self.write_lsn;
        if total_len <= free {
            self.write_record_into_current(xid, oid, pno, slot, action, payload);
            self.write_lsn += total_len as u64;
        } else {
            let overflow = total_len - free;
            let bound = WAL_PAGE_SIZE - WalPageHeader::SIZE - header_len;
            if overflow >= bound {
                return Err(Error::with_message(ErrorKind::TooBig, "WAL record too large to split across pages"));
            }
            let prefix_payload_len = free - header_len;
            let (prefix_payload, suffix_payload) = payload.split_at(prefix_payload_len);
            self.write_record_into_current(xid, oid, pno, slot, WalAction::ToBeContinued, prefix_payload);
            self.write_lsn += free as u64;
            self.close_current_page();
            self.open_new_page();
            self.write_record_into_current(xid, oid, pno, slot, action, suffix_payload);
            self.write_lsn += (header_len + suffix_payload.len()) as u64;
        }

        if matches!(action, WalAction::Commit | WalAction::Abort) || self.buffer.len() > self.wal_buffer_pages {
            self.flush()?;
        }
        Ok(record_lsn)
    }

    /// Walks the buffered pages in FIFO order, writing each to its segment
    /// file and fsyncing before advancing `flush_lsn`.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            let write_end = match self.buffer.front() {
                Some(page) => if page.closed { WAL_PAGE_SIZE } else { page.used },
                None => break,
            };
            let (path, seg_offset, flushed_upto) = {
                let page = self.buffer.front().expect("checked above");
                (self.segment_path(page.lsn), page.lsn % WAL_SEGMENT_SIZE, page.flushed_upto)
            };
            self.files.open(&path)?;
            if self.files.size(&path)? == 0 {
                self.files.extend(&path, WAL_SEGMENT_SIZE)?;
            }
            if flushed_upto < write_end {
                let data = self.buffer.front().unwrap().bytes[flushed_upto..write_end].to_vec();
                self.files.write_at(&path, seg_offset + flushed_upto as u64, &data)?;
                self.files.flush(&path)?;
                self.flush_lsn = self.buffer.front().unwrap().lsn + write_end as u64;
                self.buffer.front_mut().unwrap().flushed_upto = write_end;
            }
            let fully_flushed_and_closed = {
                let page = self.buffer.front().unwrap();
                page.closed && page.flushed_upto >= WAL_PAGE_SIZE
            };
            if fully_flushed_and_closed {
                self.buffer.pop_front();
            } else {
                break;
            }
        }
        Ok(())
    }

    /// `replay(from_lsn)` — walks segments in order from `from_lsn`,
    /// page-aligning the first read, stitching `TO_BE_CONTINUED` prefixes.
    pub fn replay(&mut self, from_lsn: Lsn) -> Result<Vec<DecodedWalRecord>> {
        let mut out = Vec::new();
        let mut lsn = (from_lsn / WAL_PAGE_SIZE as u64) * WAL_PAGE_SIZE as u64;
        let mut pending: Option<(Xid, Oid, Pgno, SlotId, Vec<u8>)> = None;

        loop {
            let path = self.segment_path(lsn);
            if !path.exists() {
                break;
            }
            self.files.open(&path)?;
            let seg_offset = lsn % WAL_SEGMENT_SIZE;
            let size = self.files.size(&path)?;
            if seg_offset + WAL_PAGE_SIZE as u64 > size {
                break;
            }
            let page_bytes = self.files.read_at(&path, seg_offset, WAL_PAGE_SIZE)?;
            let page_header = WalPageHeader::unpack(&page_bytes[..WalPageHeader::SIZE])?;
            let written = if page_header.last_page_written_size > 0 {
                page_header.last_page_written_size as usize
            } else {
                WAL_PAGE_SIZE
            };

            let mut offset = WalPageHeader::SIZE;
            while offset + WalRecordHeader::SIZE <= written {
                let header = WalRecordHeader::unpack(&page_bytes[offset..offset + WalRecordHeader::SIZE])?;
                if header.total_size == 0 {
                    break;
                }
                let payload_len = header.total_size as usize - WalRecordHeader::SIZE;
                let payload = page_bytes[offset + WalRecordHeader::SIZE..offset + WalRecordHeader::SIZE + payload_len].to_vec();
                let record_lsn = lsn + offset as u64;
                let action = WalAction::from_u32(header.action)
                    .ok_or_else(|| Error::with_message(ErrorKind::Corrupt, format!("unknown WAL action {}", header.action)))?;

                if action == WalAction::ToBeContinued {
                    pending = Some((header.xid, header.oid, header.page, header.slot, payload));
                } else if let Some((pxid, poid, ppage, pslot, mut pbuf)) = pending.take() {
                    pbuf.extend_from_slice(&payload);
                    out.push(DecodedWalRecord {
                        lsn: record_lsn,
                        xid: pxid,
                        oid: poid,
                        page: ppage,
                        slot: pslot,
                        action,
                        payload: pbuf,
                    });
                } else {
                    out.push(DecodedWalRecord {
                        lsn: record_lsn,
                        xid: header.xid,
                        oid: header.oid,
                        page: header.page,
                        slot: header.slot,
                        action,
                        payload,
                    });
                }

                let had_padding = header.padding_size > 0;
                offset += header.total_size as usize;
                if had_padding {
                    break;
                }
            }
            lsn += WAL_PAGE_SIZE as u64;
        }
        Ok(out)
    }

    pub fn read_checkpoint_lsn(&self) -> Result<Lsn> {
        let path = self.wal_dir.join("CHECKPOINT");
        match std::fs::read(&path) {
            Ok(bytes) if bytes.len() == 8 => Ok(codec::read_u64(&bytes, Endian::Big)),
            Ok(_) | Err(_) => Ok(0),
        }
    }

    /// Must only be called after the buffer pool and WAL are already
    /// durable — the checkpoint file records a prefix the caller
    /// guarantees is safe to discard on the next recovery.
    pub fn write_checkpoint_lsn(&self, lsn: Lsn) -> Result<()> {
        let path = self.wal_dir.join("CHECKPOINT");
        let mut bytes = Vec::new();
        codec::write_u64(lsn, Endian::Big, &mut bytes);
        std::fs::write(&path, &bytes)?;
        std::fs::File::open(&path)?.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn append_then_replay_round_trips_small_records() {
        let dir = tempdir().unwrap();
        let mut wal = WalManager::open(dir.path(), 4, 4).unwrap();
        wal.append(2, 10_000, 0, 0, WalAction::Begin, b"").unwrap();
        wal.append(2, 10_000, 3, 1, WalAction::HeapInsert, b"hello").unwrap();
        wal.append(2, 10_000, 0, 0, WalAction::Commit, b"").unwrap();

        let records = wal.replay(0).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[1].action, WalAction::HeapInsert);
        assert_eq!(records[1].payload, b"hello");
        assert_eq!(records[2].action, WalAction::Commit);
    }

    #[test]
    fn commit_forces_an_immediate_flush() {
        let dir = tempdir().unwrap();
        let mut wal = WalManager::open(dir.path(), 100, 4).unwrap();
        wal.append(2, 10_000, 0, 0, WalAction::Begin, b"").unwrap();
        wal.append(2, 10_000, 0, 0, WalAction::Commit, b"").unwrap();
        assert_eq!(wal.flush_lsn(), wal.write_lsn());
    }

    #[test]
    fn large_record_splits_across_pages_and_replays_whole() {
        let dir = tempdir().unwrap();
        let mut wal = WalManager::open(dir.path(), 4, 4).unwrap();
        let payload = vec![7u8; WAL_PAGE_SIZE]; // larger than one page minus headers
        wal.append(2, 10_000, 5, 2, WalAction::HeapUpdate, &payload).unwrap();
        wal.flush().unwrap();

        let records = wal.replay(0).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].action, WalAction::HeapUpdate);
        assert_eq!(records[0].payload, payload);
    }

    #[test]
    fn checkpoint_lsn_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let wal = WalManager::open(dir.path(), 4, 4).unwrap();
        wal.write_checkpoint_lsn(4096).unwrap();
        assert_eq!(wal.read_checkpoint_lsn().unwrap(), 4096);
    }
}
