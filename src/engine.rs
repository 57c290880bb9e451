//! The storage core's single entry point: one `Engine` value owns the
//! catalog, buffer pool, WAL, undo log, and lock table, and exposes the
//! `hot_*`/`bt_*` row operations plus transaction lifecycle and ARIES-style
//! crash recovery.
//!
//! Every piece of mutable state lives as a field of this one struct — no
//! module-level globals anywhere. `abort_transaction` doesn't just log an
//! ABORT record; it walks the transaction's undo chain and applies it
//! before returning, so a transaction's effects are actually gone once
//! abort returns rather than only on the next crash recovery. See
//! `DESIGN.md` for the rationale.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::catalog::Catalog;
use crate::common::{oid_range, Oid, RelationKind, TuplePointer, Value, Xid, INVALID_OID};
use crate::codec;
use crate::error::{Error, ErrorKind, Result};
use crate::lock::{LockOutcome, LockTable};
use crate::storage::buffer::BufferPool;
use crate::storage::{btree, heap, tuple};
use crate::undo::{UndoLocation, UndoManager, UndoOp, UndoRecord};
use crate::wal::{DecodedWalRecord, WalAction, WalManager};
use crate::xact::{self, TxnState, TxnStatus};

pub struct EngineConfig {
    pub data_dir: PathBuf,
    pub buffer_pool_capacity: usize,
    pub max_open_files: usize,
    pub wal_buffer_pages: usize,
}

impl EngineConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            buffer_pool_capacity: 256,
            max_open_files: 64,
            wal_buffer_pages: 8,
        }
    }
}

pub struct Engine {
    pub catalog: Catalog,
    pub pool: BufferPool,
    pub wal: WalManager,
    pub undo: UndoManager,
    pub locks: LockTable,
    database_oid: Oid,
    active: HashMap<Xid, TxnState>,
    next_xid: Xid,
}

fn encode_btree_payload(key: &[u8], pointer: TuplePointer) -> Vec<u8> {
    let mut out = Vec::new();
    codec::write_u32_le(key.len() as u32, &mut out);
    out.extend_from_slice(key);
    out.extend_from_slice(&pointer.to_bytes());
    out
}

fn decode_btree_payload(bytes: &[u8]) -> Result<(Vec<u8>, TuplePointer)> {
    let key_len = codec::read_u32_le(codec::take(bytes, 0, 4)?) as usize;
    let key = codec::take(bytes, 4, key_len)?.to_vec();
    let ptr_bytes = codec::take(bytes, 4 + key_len, 8)?;
    Ok((key, TuplePointer::from_bytes(ptr_bytes)))
}

impl Engine {
    /// Opens (creating if absent) every on-disk component under
    /// `config.data_dir`, then runs crash recovery before returning —
    /// callers never see a half-recovered engine.
    pub fn open(config: EngineConfig) -> Result<Self> {
        let catalog = Catalog::open(config.data_dir.join("catalog"))?;
        let pool = BufferPool::new(config.data_dir.join("base"), config.buffer_pool_capacity, config.max_open_files);
        let wal = WalManager::open(config.data_dir.join("wal"), config.wal_buffer_pages, config.max_open_files)?;
        let undo = UndoManager::new(config.data_dir.join("undo"));

        let mut engine = Self {
            catalog,
            pool,
            wal,
            undo,
            locks: LockTable::new(),
            database_oid: oid_range::DATABASE_ANDB,
            active: HashMap::new(),
            next_xid: xact::first_xid(),
        };
        engine.recover()?;
        Ok(engine)
    }

    pub fn allocate_xid(&mut self) -> Xid {
        self.next_xid += 1;
        self.next_xid
    }

    pub fn begin_transaction(&mut self) -> Result<Xid> {
        let xid = self.allocate_xid();
        let lsn = self.wal.append(xid, INVALID_OID, 0, 0, WalAction::Begin, &[])?;
        self.active.insert(xid, TxnState::new(xid, lsn));
        self.undo.begin_transaction(xid);
        // Every undo record must be durable before the physical change it
        // undoes can be, or a crash between the two would redo the change on
        // recovery with no undo record left to reverse it. Flushing here and
        // after every push below keeps the undo file continuously caught up
        // instead of batching it to commit/abort.
        self.undo.flush(xid)?;
        Ok(xid)
    }

    fn active_txn(&self, xid: Xid) -> Result<&TxnState> {
        self.active
            .get(&xid)
            .ok_or_else(|| Error::with_message(ErrorKind::Misuse, format!("xid {} has no active transaction", xid)))
    }

    /// Flushes the WAL commit record (forcing a durability barrier) and
    /// closes out the undo log without running it.
    pub fn commit_transaction(&mut self, xid: Xid) -> Result<()> {
        self.active_txn(xid)?;
        self.wal.append(xid, INVALID_OID, 0, 0, WalAction::Commit, &[])?;
        self.undo.commit_transaction(xid)?;
        self.active.remove(&xid);
        Ok(())
    }

    /// Runs the transaction's undo records newest-first before closing it
    /// out, so its effects are actually reversed rather than merely logged.
    pub fn abort_transaction(&mut self, xid: Xid) -> Result<()> {
        self.active_txn(xid)?;
        self.wal.append(xid, INVALID_OID, 0, 0, WalAction::Abort, &[])?;
        self.undo.flush(xid)?;
        let records = self.undo.parse_record(xid)?;
        for record in &records {
            if matches!(record.operation, UndoOp::Begin | UndoOp::Commit | UndoOp::Abort) {
                continue;
            }
            self.apply_undo(record)?;
        }
        self.undo.push(UndoRecord {
            xid,
            operation: UndoOp::Abort,
            relation: INVALID_OID,
            location: UndoLocation::None,
            data: Vec::new(),
        });
        self.undo.flush(xid)?;
        self.undo.forget(xid);
        self.active.remove(&xid);
        Ok(())
    }

    /// Flush every dirty page and the WAL, then record the flushed LSN as
    /// the new recovery starting point. Must run with no other transaction
    /// concurrently mutating pages.
    pub fn checkpoint(&mut self) -> Result<()> {
        let catalog = &self.catalog;
        self.pool.sync(self.database_oid, |oid| {
            if catalog.indexes.iter().any(|i| i.index_oid == oid) {
                RelationKind::Btree
            } else {
                RelationKind::Heap
            }
        })?;
        self.wal.flush()?;
        self.wal.write_checkpoint_lsn(self.wal.flush_lsn())
    }

    // ---- relation-level locking -------------------------------------------

    /// Acquires a relation lock in the mode mass model (§4.K): one retry
    /// after a short sleep, then `Locked` if the mass still won't fit.
    /// Serializes DDL (`ACCESS_EXCLUSIVE_LOCK`) against any concurrent DML.
    pub fn open_relation(&mut self, oid: Oid, lock_mode: u8) -> Result<()> {
        match self.locks.acquire(oid, lock_mode, false, std::time::Duration::from_millis(50)) {
            LockOutcome::Ok => Ok(()),
            LockOutcome::NotAvailable => Err(Error::with_message(ErrorKind::Locked, format!("relation {} not available in mode {}", oid, lock_mode))),
        }
    }

    pub fn close_relation(&mut self, oid: Oid, lock_mode: u8) {
        self.locks.release(oid, lock_mode);
    }

    // ---- heap row operations -------------------------------------------------

    pub fn create_table(&mut self, name: &str, columns: &[(String, Oid, u32, bool)]) -> Result<Oid> {
        heap::hot_create_table(&mut self.catalog, &mut self.pool, self.database_oid, name, columns)
    }

    pub fn drop_table(&mut self, name: &str) -> Result<()> {
        heap::hot_drop_table(&mut self.catalog, &mut self.pool, self.database_oid, name)
    }

    pub fn hot_insert(&mut self, xid: Xid, table_oid: Oid, values: &[Value]) -> Result<TuplePointer> {
        let attrs = self.catalog.attributes_of(table_oid);
        let bytes = tuple::encode(&attrs, values)?;
        let reserved = self.wal.write_lsn();
        let ptr = heap::hot_insert_bytes(&mut self.pool, reserved, self.database_oid, table_oid, &bytes)?;
        let lsn = self.wal.append(xid, table_oid, ptr.page, ptr.slot, WalAction::HeapInsert, &bytes)?;
        debug_assert_eq!(lsn, reserved, "single-writer engine: no interleaving append between reservation and commit");
        self.undo.push(UndoRecord {
            xid,
            operation: UndoOp::HeapInsert,
            relation: table_oid,
            location: UndoLocation::Heap(ptr),
            data: Vec::new(),
        });
        self.undo.flush(xid)?;
        Ok(ptr)
    }

    pub fn hot_select(&mut self, table_oid: Oid, ptr: TuplePointer) -> Result<Option<Vec<Value>>> {
        heap::hot_simple_select(&self.catalog, &mut self.pool, self.database_oid, table_oid, ptr)
    }

    pub fn hot_select_all(&mut self, table_oid: Oid) -> Result<Vec<(TuplePointer, Vec<Value>)>> {
        heap::hot_simple_select_all(&self.catalog, &mut self.pool, self.database_oid, table_oid)
    }

    pub fn hot_delete(&mut self, xid: Xid, table_oid: Oid, ptr: TuplePointer) -> Result<bool> {
        let reserved = self.wal.write_lsn();
        let ok = heap::hot_simple_delete(&mut self.pool, reserved, self.database_oid, table_oid, ptr)?;
        if !ok {
            return Ok(false);
        }
        let lsn = self.wal.append(xid, table_oid, ptr.page, ptr.slot, WalAction::HeapDelete, &[])?;
        debug_assert_eq!(lsn, reserved);
        self.undo.push(UndoRecord {
            xid,
            operation: UndoOp::HeapDelete,
            relation: table_oid,
            location: UndoLocation::Heap(ptr),
            data: Vec::new(),
        });
        self.undo.flush(xid)?;
        Ok(true)
    }

    pub fn hot_update(&mut self, xid: Xid, table_oid: Oid, ptr: TuplePointer, values: &[Value]) -> Result<TuplePointer> {
        let attrs = self.catalog.attributes_of(table_oid);
        let old_bytes = heap::hot_raw_select_bytes(&mut self.pool, self.database_oid, table_oid, ptr)?;
        let new_bytes = tuple::encode(&attrs, values)?;
        let reserved = self.wal.write_lsn();
        let new_ptr = heap::hot_update_bytes(&mut self.pool, reserved, self.database_oid, table_oid, ptr, &new_bytes)?;
        let lsn = self.wal.append(xid, table_oid, new_ptr.page, new_ptr.slot, WalAction::HeapUpdate, &new_bytes)?;
        debug_assert_eq!(lsn, reserved);
        // Recorded at the row's post-update location, applied back in place
        // on undo/redo — a simplification of the page-level "in-place unless
        // length changes" update when the length does change. See DESIGN.md.
        self.undo.push(UndoRecord {
            xid,
            operation: UndoOp::HeapUpdate,
            relation: table_oid,
            location: UndoLocation::Heap(new_ptr),
            data: old_bytes,
        });
        self.undo.flush(xid)?;
        Ok(new_ptr)
    }

    // ---- b+tree index operations ----------------------------------------------

    pub fn create_index(&mut self, name: &str, table_oid: Oid, index_column_index: u32, table_attr_index: u32) -> Result<Oid> {
        btree::bt_create_index(&mut self.catalog, &mut self.pool, self.database_oid, name, table_oid, index_column_index, table_attr_index)
    }

    pub fn drop_index(&mut self, name: &str) -> Result<()> {
        btree::bt_drop_index(&mut self.catalog, &mut self.pool, self.database_oid, name)
    }

    pub fn bt_insert_key(&mut self, xid: Xid, index_oid: Oid, key: &[u8], pointer: TuplePointer) -> Result<()> {
        let reserved = self.wal.write_lsn();
        btree::bt_simple_insert(&mut self.pool, self.database_oid, index_oid, reserved, key, pointer)?;
        let payload = encode_btree_payload(key, pointer);
        let lsn = self.wal.append(xid, index_oid, 0, 0, WalAction::BtreeInsert, &payload)?;
        debug_assert_eq!(lsn, reserved);
        self.undo.push(UndoRecord {
            xid,
            operation: UndoOp::BtreeInsert,
            relation: index_oid,
            location: UndoLocation::BtreeKey(key.to_vec()),
            data: pointer.to_bytes().to_vec(),
        });
        self.undo.flush(xid)?;
        Ok(())
    }

    /// Removes every pointer currently stored under `key`, logging one
    /// `BTREE_DELETE` WAL/undo record per pointer so each can be undone
    /// independently.
    pub fn bt_delete_key(&mut self, xid: Xid, index_oid: Oid, key: &[u8]) -> Result<()> {
        let existing = btree::bt_search(&mut self.pool, self.database_oid, index_oid, key)?;
        for pointer in existing {
            let reserved = self.wal.write_lsn();
            btree::bt_delete_value(&mut self.pool, self.database_oid, index_oid, reserved, key, pointer)?;
            let payload = encode_btree_payload(key, pointer);
            let lsn = self.wal.append(xid, index_oid, 0, 0, WalAction::BtreeDelete, &payload)?;
            debug_assert_eq!(lsn, reserved);
            self.undo.push(UndoRecord {
                xid,
                operation: UndoOp::BtreeDelete,
                relation: index_oid,
                location: UndoLocation::BtreeKey(key.to_vec()),
                data: pointer.to_bytes().to_vec(),
            });
            self.undo.flush(xid)?;
        }
        Ok(())
    }

    /// Moves one pointer from `old_key` to `new_key`, as when an indexed
    /// column's value changes. Decomposed into a delete-then-insert pair
    /// rather than a single `BTREE_UPDATE` record — see `DESIGN.md`.
    pub fn bt_update_key(&mut self, xid: Xid, index_oid: Oid, old_key: &[u8], new_key: &[u8], pointer: TuplePointer) -> Result<()> {
        let reserved = self.wal.write_lsn();
        btree::bt_delete_value(&mut self.pool, self.database_oid, index_oid, reserved, old_key, pointer)?;
        let old_payload = encode_btree_payload(old_key, pointer);
        let lsn = self.wal.append(xid, index_oid, 0, 0, WalAction::BtreeDelete, &old_payload)?;
        debug_assert_eq!(lsn, reserved);
        self.undo.push(UndoRecord {
            xid,
            operation: UndoOp::BtreeDelete,
            relation: index_oid,
            location: UndoLocation::BtreeKey(old_key.to_vec()),
            data: pointer.to_bytes().to_vec(),
        });
        self.undo.flush(xid)?;

        let reserved2 = self.wal.write_lsn();
        btree::bt_simple_insert(&mut self.pool, self.database_oid, index_oid, reserved2, new_key, pointer)?;
        let new_payload = encode_btree_payload(new_key, pointer);
        let lsn2 = self.wal.append(xid, index_oid, 0, 0, WalAction::BtreeInsert, &new_payload)?;
        debug_assert_eq!(lsn2, reserved2);
        self.undo.push(UndoRecord {
            xid,
            operation: UndoOp::BtreeInsert,
            relation: index_oid,
            location: UndoLocation::BtreeKey(new_key.to_vec()),
            data: pointer.to_bytes().to_vec(),
        });
        self.undo.flush(xid)?;
        Ok(())
    }

    pub fn bt_search(&mut self, index_oid: Oid, key: &[u8]) -> Result<Vec<TuplePointer>> {
        btree::bt_search(&mut self.pool, self.database_oid, index_oid, key)
    }

    pub fn bt_search_range(&mut self, index_oid: Oid, start: &[u8], end: &[u8]) -> Result<Vec<(Vec<u8>, Vec<TuplePointer>)>> {
        btree::bt_search_range(&mut self.pool, self.database_oid, index_oid, start, end)
    }

    pub fn bt_scan_all_keys(&mut self, index_oid: Oid) -> Result<Vec<(Vec<u8>, Vec<TuplePointer>)>> {
        btree::bt_scan_all_keys(&mut self.pool, self.database_oid, index_oid)
    }

    // ---- undo / redo dispatch ---------------------------------------------

    /// Applies the physical inverse of one undo record, logging a
    /// compensating, equally-redoable WAL record as it goes — so a second
    /// crash mid-abort/mid-recovery resumes cleanly instead of silently
    /// leaving the undo half-applied.
    fn apply_undo(&mut self, record: &UndoRecord) -> Result<()> {
        match record.operation {
            UndoOp::Begin | UndoOp::Commit | UndoOp::Abort => Ok(()),
            UndoOp::HeapInsert => {
                let ptr = heap_location(record)?;
                let reserved = self.wal.write_lsn();
                heap::hot_simple_delete(&mut self.pool, reserved, self.database_oid, record.relation, ptr)?;
                self.wal.append(record.xid, record.relation, ptr.page, ptr.slot, WalAction::HeapDelete, &[])?;
                Ok(())
            }
            UndoOp::HeapDelete => {
                let ptr = heap_location(record)?;
                let reserved = self.wal.write_lsn();
                heap::hot_raw_undo_delete(&mut self.pool, self.database_oid, record.relation, reserved, ptr)?;
                self.wal.append(record.xid, record.relation, ptr.page, ptr.slot, WalAction::HeapUndelete, &[])?;
                Ok(())
            }
            UndoOp::HeapBatchDelete => Err(Error::with_message(ErrorKind::Internal, "HEAP_BATCH_DELETE undo is never emitted by this engine")),
            UndoOp::HeapUpdate => {
                let ptr = heap_location(record)?;
                let reserved = self.wal.write_lsn();
                let restored = heap::hot_update_bytes(&mut self.pool, reserved, self.database_oid, record.relation, ptr, &record.data)?;
                self.wal.append(record.xid, record.relation, restored.page, restored.slot, WalAction::HeapUpdate, &record.data)?;
                Ok(())
            }
            UndoOp::BtreeInsert => {
                let key = btree_location(record)?;
                let pointer = TuplePointer::from_bytes(&record.data);
                let reserved = self.wal.write_lsn();
                btree::bt_delete_value(&mut self.pool, self.database_oid, record.relation, reserved, &key, pointer)?;
                let payload = encode_btree_payload(&key, pointer);
                self.wal.append(record.xid, record.relation, 0, 0, WalAction::BtreeDelete, &payload)?;
                Ok(())
            }
            UndoOp::BtreeDelete => {
                let key = btree_location(record)?;
                let pointer = TuplePointer::from_bytes(&record.data);
                let reserved = self.wal.write_lsn();
                btree::bt_simple_insert(&mut self.pool, self.database_oid, record.relation, reserved, &key, pointer)?;
                let payload = encode_btree_payload(&key, pointer);
                self.wal.append(record.xid, record.relation, 0, 0, WalAction::BtreeInsert, &payload)?;
                Ok(())
            }
            UndoOp::BtreeUpdate => Err(Error::with_message(ErrorKind::Internal, "BTREE_UPDATE undo is never emitted by this engine")),
        }
    }

    /// Re-applies one redoable WAL record during recovery. LSN-guarded for
    /// heap actions (the page header carries the guard); btree actions are
    /// made idempotent by checking current tree state before mutating,
    /// since btree pages carry no equivalent guard — see `DESIGN.md`.
    fn apply_redo(&mut self, rec: &DecodedWalRecord) -> Result<()> {
        let ptr = TuplePointer::new(rec.page, rec.slot);
        match rec.action {
            WalAction::HeapInsert => {
                heap::hot_raw_insert_into_page(&mut self.pool, self.database_oid, rec.oid, rec.lsn, rec.page, &rec.payload)?;
                Ok(())
            }
            WalAction::HeapDelete => heap::hot_raw_redo_delete(&mut self.pool, self.database_oid, rec.oid, rec.lsn, ptr),
            WalAction::HeapUndelete => heap::hot_raw_redo_undelete(&mut self.pool, self.database_oid, rec.oid, rec.lsn, ptr),
            WalAction::HeapUpdate => heap::hot_raw_redo_update(&mut self.pool, self.database_oid, rec.oid, rec.lsn, ptr, &rec.payload),
            WalAction::HeapBatchDelete => Ok(()),
            WalAction::BtreeInsert => {
                let (key, pointer) = decode_btree_payload(&rec.payload)?;
                let existing = btree::bt_search(&mut self.pool, self.database_oid, rec.oid, &key)?;
                if !existing.contains(&pointer) {
                    btree::bt_simple_insert(&mut self.pool, self.database_oid, rec.oid, rec.lsn, &key, pointer)?;
                }
                Ok(())
            }
            WalAction::BtreeDelete => {
                let (key, pointer) = decode_btree_payload(&rec.payload)?;
                btree::bt_delete_value(&mut self.pool, self.database_oid, rec.oid, rec.lsn, &key, pointer)
            }
            WalAction::BtreeUpdate => Ok(()),
            WalAction::ToBeContinued | WalAction::Checkpoint | WalAction::Begin | WalAction::Commit | WalAction::Abort => {
                unreachable!("caller only passes redoable actions")
            }
        }
    }

    /// Two-pass ARIES-style recovery: redo every redoable record from the
    /// last checkpoint forward (idempotent either way), then undo every
    /// transaction that never reached COMMIT or ABORT.
    fn recover(&mut self) -> Result<()> {
        let checkpoint_lsn = self.wal.read_checkpoint_lsn()?;
        let records = self.wal.replay(checkpoint_lsn)?;

        let mut status: HashMap<Xid, TxnStatus> = HashMap::new();
        let mut max_xid = self.next_xid;
        for rec in &records {
            max_xid = max_xid.max(rec.xid);
            match rec.action {
                WalAction::Begin => {
                    status.entry(rec.xid).or_insert(TxnStatus::Active);
                }
                WalAction::Commit => {
                    status.insert(rec.xid, TxnStatus::Committed);
                }
                WalAction::Abort => {
                    status.insert(rec.xid, TxnStatus::Aborted);
                }
                _ => {}
            }
        }
        self.next_xid = max_xid;

        for rec in &records {
            if rec.action.is_redoable() {
                self.apply_redo(rec)?;
            }
        }

        let losers: Vec<Xid> = status
            .iter()
            .filter(|(_, s)| **s == TxnStatus::Active)
            .map(|(xid, _)| *xid)
            .collect();
        for xid in losers {
            let undo_records = self.undo.parse_record(xid)?;
            for undo_rec in &undo_records {
                if matches!(undo_rec.operation, UndoOp::Begin | UndoOp::Commit | UndoOp::Abort) {
                    continue;
                }
                self.apply_undo(undo_rec)?;
            }
            self.wal.append(xid, INVALID_OID, 0, 0, WalAction::Abort, &[])?;
        }

        if !records.is_empty() {
            self.checkpoint()?;
        }
        Ok(())
    }
}

fn heap_location(record: &UndoRecord) -> Result<TuplePointer> {
    match record.location {
        UndoLocation::Heap(ptr) => Ok(ptr),
        _ => Err(Error::with_message(ErrorKind::Corrupt, "heap undo record missing a heap location")),
    }
}

fn btree_location(record: &UndoRecord) -> Result<Vec<u8>> {
    match &record.location {
        UndoLocation::BtreeKey(key) => Ok(key.clone()),
        _ => Err(Error::with_message(ErrorKind::Corrupt, "btree undo record missing a key location")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{TYPE_INTEGER, TYPE_VARCHAR};
    use tempfile::tempdir;

    fn open(dir: &std::path::Path) -> Engine {
        Engine::open(EngineConfig::new(dir)).unwrap()
    }

    fn widgets(engine: &mut Engine) -> Oid {
        engine
            .create_table(
                "widgets",
                &[
                    ("id".to_string(), TYPE_INTEGER, 4, true),
                    ("name".to_string(), TYPE_VARCHAR, 32, false),
                ],
            )
            .unwrap()
    }

    #[test]
    fn commit_keeps_changes_visible() {
        let dir = tempdir().unwrap();
        let mut engine = open(dir.path());
        let table_oid = widgets(&mut engine);

        let xid = engine.begin_transaction().unwrap();
        let ptr = engine
            .hot_insert(xid, table_oid, &[Value::Integer(1), Value::Varchar("a".to_string())])
            .unwrap();
        engine.commit_transaction(xid).unwrap();

        let row = engine.hot_select(table_oid, ptr).unwrap().unwrap();
        assert_eq!(row[0], Value::Integer(1));
    }

    #[test]
    fn abort_undoes_the_insert() {
        let dir = tempdir().unwrap();
        let mut engine = open(dir.path());
        let table_oid = widgets(&mut engine);

        let xid = engine.begin_transaction().unwrap();
        let ptr = engine
            .hot_insert(xid, table_oid, &[Value::Integer(1), Value::Varchar("a".to_string())])
            .unwrap();
        engine.abort_transaction(xid).unwrap();

        assert!(engine.hot_select(table_oid, ptr).unwrap().is_none());
        assert!(engine.hot_select_all(table_oid).unwrap().is_empty());
    }

    #[test]
    fn abort_undoes_update_back_to_prior_value() {
        let dir = tempdir().unwrap();
        let mut engine = open(dir.path());
        let table_oid = widgets(&mut engine);

        let xid0 = engine.begin_transaction().unwrap();
        let ptr = engine
            .hot_insert(xid0, table_oid, &[Value::Integer(1), Value::Varchar("a".to_string())])
            .unwrap();
        engine.commit_transaction(xid0).unwrap();

        let xid1 = engine.begin_transaction().unwrap();
        let ptr2 = engine
            .hot_update(xid1, table_oid, ptr, &[Value::Integer(1), Value::Varchar("b".to_string())])
            .unwrap();
        engine.abort_transaction(xid1).unwrap();

        let row = engine.hot_select(table_oid, ptr2).unwrap().unwrap();
        assert_eq!(row[1], Value::Varchar("a".to_string()));
    }

    #[test]
    fn abort_undoes_btree_insert() {
        let dir = tempdir().unwrap();
        let mut engine = open(dir.path());
        let table_oid = widgets(&mut engine);
        let index_oid = engine.create_index("widgets_id_idx", table_oid, 0, 0).unwrap();

        let xid = engine.begin_transaction().unwrap();
        let ptr = engine
            .hot_insert(xid, table_oid, &[Value::Integer(1), Value::Varchar("a".to_string())])
            .unwrap();
        engine.bt_insert_key(xid, index_oid, &1i32.to_be_bytes(), ptr).unwrap();
        engine.abort_transaction(xid).unwrap();

        assert!(btree::bt_search(&mut engine.pool, oid_range::DATABASE_ANDB, index_oid, &1i32.to_be_bytes())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn crash_without_commit_is_undone_on_reopen() {
        let dir = tempdir().unwrap();
        let table_oid;
        let ptr;
        {
            let mut engine = open(dir.path());
            table_oid = widgets(&mut engine);
            let xid = engine.begin_transaction().unwrap();
            ptr = engine
                .hot_insert(xid, table_oid, &[Value::Integer(9), Value::Varchar("ghost".to_string())])
                .unwrap();
            // No commit, no explicit abort: simulates a crash right after the
            // insert. The undo record was already flushed by `hot_insert`
            // itself; force the WAL flush too so redo has something to see.
            engine.wal.flush().unwrap();
        }

        let mut engine = open(dir.path());
        assert!(engine.hot_select(table_oid, ptr).unwrap().is_none());
    }

    #[test]
    fn bt_search_wrappers_match_the_underlying_storage_calls() {
        let dir = tempdir().unwrap();
        let mut engine = open(dir.path());
        let table_oid = widgets(&mut engine);
        let index_oid = engine.create_index("widgets_id_idx", table_oid, 0, 0).unwrap();

        let xid = engine.begin_transaction().unwrap();
        let ptr = engine
            .hot_insert(xid, table_oid, &[Value::Integer(1), Value::Varchar("a".to_string())])
            .unwrap();
        engine.bt_insert_key(xid, index_oid, &1i32.to_be_bytes(), ptr).unwrap();
        engine.commit_transaction(xid).unwrap();

        assert_eq!(engine.bt_search(index_oid, &1i32.to_be_bytes()).unwrap(), vec![ptr]);
        let range = engine.bt_search_range(index_oid, &0i32.to_be_bytes(), &2i32.to_be_bytes()).unwrap();
        assert_eq!(range, vec![(1i32.to_be_bytes().to_vec(), vec![ptr])]);
        let all = engine.bt_scan_all_keys(index_oid).unwrap();
        assert_eq!(all, vec![(1i32.to_be_bytes().to_vec(), vec![ptr])]);
    }

    #[test]
    fn open_relation_serializes_access_exclusive_against_any_other_mode() {
        let dir = tempdir().unwrap();
        let mut engine = open(dir.path());
        let table_oid = widgets(&mut engine);

        engine.open_relation(table_oid, crate::lock::ACCESS_EXCLUSIVE_LOCK).unwrap();
        assert!(engine.open_relation(table_oid, crate::lock::ACCESS_SHARE_LOCK).is_err());
        engine.close_relation(table_oid, crate::lock::ACCESS_EXCLUSIVE_LOCK);
        engine.open_relation(table_oid, crate::lock::ACCESS_SHARE_LOCK).unwrap();
    }

    #[test]
    fn committed_insert_survives_reopen_without_explicit_checkpoint() {
        let dir = tempdir().unwrap();
        let table_oid;
        let ptr;
        {
            let mut engine = open(dir.path());
            table_oid = widgets(&mut engine);
            let xid = engine.begin_transaction().unwrap();
            ptr = engine
                .hot_insert(xid, table_oid, &[Value::Integer(2), Value::Varchar("b".to_string())])
                .unwrap();
            engine.commit_transaction(xid).unwrap();
        }

        let mut engine = open(dir.path());
        let row = engine.hot_select(table_oid, ptr).unwrap().unwrap();
        assert_eq!(row[0], Value::Integer(2));
    }
}
