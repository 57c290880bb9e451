//! Per-transaction undo log: one append-only file per `xid`, read back
//! newest-first during abort/crash recovery.
//!
//! Each record is a self-describing `<xid, operation, relation, location,
//! data>` tuple; the wire format below is this crate's own, not pinned by
//! anything upstream.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::codec::{self, Endian};
use crate::common::{Oid, TuplePointer, Xid, INVALID_OID};
use crate::error::{Error, ErrorKind, Result};

/// Operation tags — a distinct enumeration from [`crate::wal::WalAction`],
/// which logs a different thing (redo of the forward mutation, not its
/// inverse).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum UndoOp {
    Begin = 0,
    HeapInsert = 1,
    HeapDelete = 2,
    HeapBatchDelete = 3,
    HeapUpdate = 4,
    Commit = 5,
    Abort = 6,
    BtreeInsert = 7,
    BtreeDelete = 8,
    BtreeUpdate = 9,
}

impl UndoOp {
    fn from_u8(v: u8) -> Result<Self> {
        use UndoOp::*;
        match v {
            0 => Ok(Begin),
            1 => Ok(HeapInsert),
            2 => Ok(HeapDelete),
            3 => Ok(HeapBatchDelete),
            4 => Ok(HeapUpdate),
            5 => Ok(Commit),
            6 => Ok(Abort),
            7 => Ok(BtreeInsert),
            8 => Ok(BtreeDelete),
            9 => Ok(BtreeUpdate),
            other => Err(Error::with_message(ErrorKind::Corrupt, format!("unknown undo operation {}", other))),
        }
    }
}

/// The database element that was changed. Heap ops name a page/slot; btree
/// ops name the key (the pointer travels in `data`, since a key's pointer
/// list isn't fixed width).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoLocation {
    None,
    Heap(TuplePointer),
    BtreeKey(Vec<u8>),
}

impl UndoLocation {
    fn tag(&self) -> u8 {
        match self {
            UndoLocation::None => 0,
            UndoLocation::Heap(_) => 1,
            UndoLocation::BtreeKey(_) => 2,
        }
    }

    fn pack(&self, out: &mut Vec<u8>) {
        out.push(self.tag());
        match self {
            UndoLocation::None => {}
            UndoLocation::Heap(ptr) => out.extend_from_slice(&ptr.to_bytes()),
            UndoLocation::BtreeKey(key) => {
                codec::write_u32_le(key.len() as u32, out);
                out.extend_from_slice(key);
            }
        }
    }

    fn unpack(buf: &[u8], offset: &mut usize) -> Result<Self> {
        let tag = codec::take(buf, *offset, 1)?[0];
        *offset += 1;
        match tag {
            0 => Ok(UndoLocation::None),
            1 => {
                let bytes = codec::take(buf, *offset, 8)?;
                *offset += 8;
                Ok(UndoLocation::Heap(TuplePointer::from_bytes(bytes)))
            }
            2 => {
                let len = codec::read_u32_le(codec::take(buf, *offset, 4)?) as usize;
                *offset += 4;
                let key = codec::take(buf, *offset, len)?.to_vec();
                *offset += len;
                Ok(UndoLocation::BtreeKey(key))
            }
            other => Err(Error::with_message(ErrorKind::Corrupt, format!("unknown undo location tag {}", other))),
        }
    }
}

/// The `<T, X, v>` tuple: transaction, changed element, previous value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoRecord {
    pub xid: Xid,
    pub operation: UndoOp,
    /// `INVALID_OID` for the bookkeeping BEGIN/COMMIT/ABORT records.
    pub relation: Oid,
    pub location: UndoLocation,
    pub data: Vec<u8>,
}

impl UndoRecord {
    /// Construct a BEGIN/COMMIT/ABORT marker record: no relation, no
    /// location, no payload — just a position in the undo chain.
    pub fn bookkeeping(xid: Xid, operation: UndoOp) -> Self {
        Self {
            xid,
            operation,
            relation: INVALID_OID,
            location: UndoLocation::None,
            data: Vec::new(),
        }
    }

    /// Self-describing tuple body, without the outer `content_size` prefix.
    fn pack_tuple(&self) -> Vec<u8> {
        let mut out = Vec::new();
        codec::write_u64_le(self.xid, &mut out);
        out.push(self.operation as u8);
        codec::write_u64_le(self.relation, &mut out);
        self.location.pack(&mut out);
        codec::write_u32_le(self.data.len() as u32, &mut out);
        out.extend_from_slice(&self.data);
        out
    }

    /// `content_size:u64 LE | tuple`.
    fn to_bytes(&self) -> Vec<u8> {
        let tuple = self.pack_tuple();
        let mut out = Vec::new();
        codec::write_u64(tuple.len() as u64, Endian::Little, &mut out);
        out.extend_from_slice(&tuple);
        out
    }

    fn from_tuple(buf: &[u8]) -> Result<Self> {
        let mut offset = 0usize;
        let xid = codec::read_u64_le(codec::take(buf, offset, 8)?);
        offset += 8;
        let operation = UndoOp::from_u8(codec::take(buf, offset, 1)?[0])?;
        offset += 1;
        let relation = codec::read_u64_le(codec::take(buf, offset, 8)?);
        offset += 8;
        let location = UndoLocation::unpack(buf, &mut offset)?;
        let data_len = codec::read_u32_le(codec::take(buf, offset, 4)?) as usize;
        offset += 4;
        let data = codec::take(buf, offset, data_len)?.to_vec();
        Ok(Self { xid, operation, relation, location, data })
    }
}

/// Buffers each active transaction's undo records in memory; `flush`
/// appends the buffer to the transaction's file and fsyncs.
pub struct UndoManager {
    dir: PathBuf,
    active: HashMap<Xid, Vec<UndoRecord>>,
}

impl UndoManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), active: HashMap::new() }
    }

    fn file_path(&self, xid: Xid) -> PathBuf {
        self.dir.join(xid.to_string())
    }

    pub fn begin_transaction(&mut self, xid: Xid) {
        self.active.insert(xid, Vec::new());
        self.push(UndoRecord::bookkeeping(xid, UndoOp::Begin));
    }

    /// Append a record to `xid`'s in-memory buffer. Panics if `xid` has no
    /// active transaction — a programmer error, not a recoverable one.
    pub fn push(&mut self, record: UndoRecord) {
        self.active
            .get_mut(&record.xid)
            .expect("push called for an xid with no active transaction")
            .push(record);
    }

    pub fn flush(&mut self, xid: Xid) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let records = self.active.get_mut(&xid).expect("flush called for an xid with no active transaction");
        if records.is_empty() {
            return Ok(());
        }
        let mut bytes = Vec::new();
        for record in records.iter() {
            bytes.extend_from_slice(&record.to_bytes());
        }
        let path = self.file_path(xid);
        use std::io::Write;
        let mut file = std::fs::OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(&bytes)?;
        file.flush()?;
        file.sync_all()?;
        records.clear();
        Ok(())
    }

    pub fn commit_transaction(&mut self, xid: Xid) -> Result<()> {
        self.push(UndoRecord::bookkeeping(xid, UndoOp::Commit));
        self.flush(xid)?;
        self.active.remove(&xid);
        Ok(())
    }

    pub fn abort_transaction(&mut self, xid: Xid) -> Result<()> {
        self.push(UndoRecord::bookkeeping(xid, UndoOp::Abort));
        self.flush(xid)?;
        self.active.remove(&xid);
        Ok(())
    }

    /// Drop `xid`'s in-memory bookkeeping entry without pushing or flushing
    /// anything further. Used once a caller has already applied and logged
    /// the physical undo itself and just needs the active-transaction slot
    /// released — see `Engine::abort_transaction`.
    pub fn forget(&mut self, xid: Xid) {
        self.active.remove(&xid);
    }

    /// Read `xid`'s file back (empty if it was never flushed) and reverse
    /// it, so undo is applied newest-first.
    pub fn parse_record(&self, xid: Xid) -> Result<Vec<UndoRecord>> {
        let path = self.file_path(xid);
        let bytes = match std::fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::from(e)),
        };
        let mut records = Vec::new();
        let mut offset = 0usize;
        while offset < bytes.len() {
            let content_size = codec::read_u64(codec::take(&bytes, offset, 8)?, Endian::Little) as usize;
            offset += 8;
            let tuple = codec::take(&bytes, offset, content_size)?;
            records.push(UndoRecord::from_tuple(tuple)?);
            offset += content_size;
        }
        records.reverse();
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn record_tuple_round_trips() {
        let record = UndoRecord {
            xid: 7,
            operation: UndoOp::HeapDelete,
            relation: 10_005,
            location: UndoLocation::Heap(TuplePointer::new(3, 1)),
            data: b"old-row-bytes".to_vec(),
        };
        let back = UndoRecord::from_tuple(&record.pack_tuple()).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn btree_key_location_round_trips() {
        let record = UndoRecord {
            xid: 7,
            operation: UndoOp::BtreeInsert,
            relation: 10_006,
            location: UndoLocation::BtreeKey(vec![0, 0, 0, 9]),
            data: TuplePointer::new(2, 4).to_bytes().to_vec(),
        };
        let back = UndoRecord::from_tuple(&record.pack_tuple()).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn commit_flushes_and_parse_reverses_oldest_last() {
        let dir = tempdir().unwrap();
        let mut mgr = UndoManager::new(dir.path());
        mgr.begin_transaction(5);
        mgr.push(UndoRecord {
            xid: 5,
            operation: UndoOp::HeapInsert,
            relation: 10_005,
            location: UndoLocation::Heap(TuplePointer::new(0, 0)),
            data: Vec::new(),
        });
        mgr.push(UndoRecord {
            xid: 5,
            operation: UndoOp::HeapInsert,
            relation: 10_005,
            location: UndoLocation::Heap(TuplePointer::new(0, 1)),
            data: Vec::new(),
        });
        mgr.commit_transaction(5).unwrap();

        let records = mgr.parse_record(5).unwrap();
        assert_eq!(records.len(), 4); // begin, insert, insert, commit
        assert_eq!(records[0].operation, UndoOp::Commit);
        assert_eq!(records[3].operation, UndoOp::Begin);
    }

    #[test]
    fn parse_record_of_unknown_xid_is_empty() {
        let dir = tempdir().unwrap();
        let mgr = UndoManager::new(dir.path());
        assert!(mgr.parse_record(999).unwrap().is_empty());
    }
}
