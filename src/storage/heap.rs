//! Heap access method: `hot_*` table operations over slotted pages.
//!
//! Inserts land on the last page of the relation; when that page is full,
//! a fresh page is appended and the insert retried there.

use crate::catalog::{Catalog, OidKind};
use crate::common::{Oid, RelationKind, TuplePointer, Value};
use crate::error::{Error, ErrorKind, Result};
use crate::storage::buffer::BufferPool;
use crate::storage::page::{Page, INVALID_SLOT};
use crate::storage::tuple;

fn load_page(pool: &mut BufferPool, database_oid: Oid, table_oid: Oid, pno: u32) -> Result<Page> {
    pool.get_page(database_oid, table_oid, RelationKind::Heap, pno)?;
    let page = Page::unpack(pool.page_bytes(table_oid, pno))?;
    Ok(page)
}

fn store_page(pool: &mut BufferPool, table_oid: Oid, pno: u32, page: &Page) {
    pool.write_page(table_oid, pno, &page.pack());
    pool.unpin(table_oid, pno);
}

/// `hot_create_table(name, fields, db)` — allocates an OID, records the
/// class/attribute rows, and creates the empty relation file.
pub fn hot_create_table(
    catalog: &mut Catalog,
    pool: &mut BufferPool,
    database_oid: Oid,
    name: &str,
    columns: &[(String, Oid, u32, bool)],
) -> Result<Oid> {
    let oid = catalog.allocate_oid(OidKind::Relation)?;
    catalog.define_table(oid, database_oid, name, RelationKind::Heap, columns)?;
    pool.create_relation_file(database_oid, oid, RelationKind::Heap)?;
    Ok(oid)
}

/// `hot_drop_table(name, db)` — refuses while indexes still reference the
/// table; otherwise purges the buffer pool and removes the file and
/// catalog rows.
pub fn hot_drop_table(catalog: &mut Catalog, pool: &mut BufferPool, database_oid: Oid, name: &str) -> Result<()> {
    let class = catalog
        .find_class_by_name_and_kind(database_oid, name, RelationKind::Heap)
        .ok_or_else(|| Error::with_message(ErrorKind::NotFound, format!("relation \"{}\" not found", name)))?;
    let oid = class.oid;
    if !catalog.indexes_of_table(oid).is_empty() {
        return Err(Error::with_message(
            ErrorKind::Schema,
            format!("cannot drop \"{}\": indexes still reference it", name),
        ));
    }
    pool.evict_relation(oid);
    pool.close_relation_file(database_oid, oid)?;
    pool.remove_relation_file(database_oid, oid)?;
    catalog.undefine_table(oid)
}

/// `hot_simple_insert(rel, values) -> (page#, slot)`. Writes to the last
/// page; advances to a fresh page when full.
pub fn hot_simple_insert(
    catalog: &Catalog,
    pool: &mut BufferPool,
    lsn: u64,
    database_oid: Oid,
    table_oid: Oid,
    values: &[Value],
) -> Result<TuplePointer> {
    let attrs = catalog.attributes_of(table_oid);
    let bytes = tuple::encode(&attrs, values)?;
    hot_insert_bytes(pool, lsn, database_oid, table_oid, &bytes)
}

/// Insert already-encoded tuple bytes, bypassing the catalog/tuple codec.
/// Used directly by the engine, which needs the encoded bytes up front to
/// log them to the WAL before the page mutation happens.
pub fn hot_insert_bytes(
    pool: &mut BufferPool,
    lsn: u64,
    database_oid: Oid,
    table_oid: Oid,
    bytes: &[u8],
) -> Result<TuplePointer> {
    let page_count = pool.relation_page_count(database_oid, table_oid, RelationKind::Heap)?;
    let mut pno = if page_count == 0 { 0 } else { page_count - 1 };
    let mut page = load_page(pool, database_oid, table_oid, pno)?;

    let mut slot = page.insert(lsn, bytes);
    if slot == INVALID_SLOT {
        pool.unpin(table_oid, pno);
        if page_count == 0 {
            return Err(Error::with_message(
                ErrorKind::TooBig,
                "row does not fit even on an empty page",
            ));
        }
        pno += 1;
        page = load_page(pool, database_oid, table_oid, pno)?;
        slot = page.insert(lsn, bytes);
        if slot == INVALID_SLOT {
            pool.unpin(table_oid, pno);
            return Err(Error::with_message(
                ErrorKind::TooBig,
                "row does not fit even on an empty page",
            ));
        }
    }
    store_page(pool, table_oid, pno, &page);
    Ok(TuplePointer::new(pno, slot))
}

/// `hot_simple_select(rel, page#, slot) -> values | empty`.
pub fn hot_simple_select(
    catalog: &Catalog,
    pool: &mut BufferPool,
    database_oid: Oid,
    table_oid: Oid,
    ptr: TuplePointer,
) -> Result<Option<Vec<Value>>> {
    let page = load_page(pool, database_oid, table_oid, ptr.page)?;
    pool.unpin(table_oid, ptr.page);
    let bytes = page.select(ptr.slot);
    if bytes.is_empty() {
        return Ok(None);
    }
    let attrs = catalog.attributes_of(table_oid);
    Ok(Some(tuple::decode(&attrs, &bytes)?))
}

/// `hot_simple_delete(rel, page#, slot) -> bool`.
pub fn hot_simple_delete(
    pool: &mut BufferPool,
    lsn: u64,
    database_oid: Oid,
    table_oid: Oid,
    ptr: TuplePointer,
) -> Result<bool> {
    let mut page = load_page(pool, database_oid, table_oid, ptr.page)?;
    let ok = page.delete(lsn, ptr.slot);
    store_page(pool, table_oid, ptr.page, &page);
    Ok(ok)
}

/// `hot_simple_update(rel, page#, slot, values) -> (page#, slot)`.
/// Delete-then-insert at the page level; the new location may differ.
pub fn hot_simple_update(
    catalog: &Catalog,
    pool: &mut BufferPool,
    lsn: u64,
    database_oid: Oid,
    table_oid: Oid,
    ptr: TuplePointer,
    values: &[Value],
) -> Result<TuplePointer> {
    let attrs = catalog.attributes_of(table_oid);
    let bytes = tuple::encode(&attrs, values)?;
    hot_update_bytes(pool, lsn, database_oid, table_oid, ptr, &bytes)
}

/// Update with already-encoded tuple bytes. Falls back to
/// [`hot_insert_bytes`] at a fresh location when the page-level update
/// can't keep the slot (different-length payload on a full page).
pub fn hot_update_bytes(
    pool: &mut BufferPool,
    lsn: u64,
    database_oid: Oid,
    table_oid: Oid,
    ptr: TuplePointer,
    bytes: &[u8],
) -> Result<TuplePointer> {
    let mut page = load_page(pool, database_oid, table_oid, ptr.page)?;
    let new_slot = page.update(lsn, ptr.slot, bytes);
    if new_slot != INVALID_SLOT {
        store_page(pool, table_oid, ptr.page, &page);
        return Ok(TuplePointer::new(ptr.page, new_slot));
    }
    // The page-level update already rolled back its delete attempt; insert
    // the new value at a fresh location instead.
    store_page(pool, table_oid, ptr.page, &page);
    hot_insert_bytes(pool, lsn, database_oid, table_oid, bytes)
}

/// Read the raw encoded bytes stored at `ptr`, bypassing the tuple codec.
/// Used by the engine to capture a row's prior value before delete/update
/// for the undo log, and to reconstruct WAL payloads.
pub fn hot_raw_select_bytes(pool: &mut BufferPool, database_oid: Oid, table_oid: Oid, ptr: TuplePointer) -> Result<Vec<u8>> {
    let page = load_page(pool, database_oid, table_oid, ptr.page)?;
    pool.unpin(table_oid, ptr.page);
    Ok(page.select(ptr.slot))
}

/// Insert already-encoded bytes into a *specific* page, appending at
/// whatever slot the page-level insert assigns. Used by WAL redo, which
/// names the target page explicitly rather than choosing the last page.
pub fn hot_raw_insert_into_page(
    pool: &mut BufferPool,
    database_oid: Oid,
    table_oid: Oid,
    lsn: u64,
    pno: u32,
    bytes: &[u8],
) -> Result<Option<u32>> {
    let mut page = load_page(pool, database_oid, table_oid, pno)?;
    if page.header.lsn >= lsn {
        pool.unpin(table_oid, pno);
        return Ok(None);
    }
    let slot = page.insert(lsn, bytes);
    store_page(pool, table_oid, pno, &page);
    Ok(Some(slot))
}

/// Re-apply a delete at a specific page/slot during WAL redo, guarded by
/// the page's current LSN so replay is idempotent.
pub fn hot_raw_redo_delete(pool: &mut BufferPool, database_oid: Oid, table_oid: Oid, lsn: u64, ptr: TuplePointer) -> Result<()> {
    let mut page = load_page(pool, database_oid, table_oid, ptr.page)?;
    if page.header.lsn >= lsn {
        pool.unpin(table_oid, ptr.page);
        return Ok(());
    }
    page.delete(lsn, ptr.slot);
    store_page(pool, table_oid, ptr.page, &page);
    Ok(())
}

/// Re-apply an update at a specific page/slot during WAL redo.
pub fn hot_raw_redo_update(pool: &mut BufferPool, database_oid: Oid, table_oid: Oid, lsn: u64, ptr: TuplePointer, bytes: &[u8]) -> Result<()> {
    let mut page = load_page(pool, database_oid, table_oid, ptr.page)?;
    if page.header.lsn >= lsn {
        pool.unpin(table_oid, ptr.page);
        return Ok(());
    }
    page.update(lsn, ptr.slot, bytes);
    store_page(pool, table_oid, ptr.page, &page);
    Ok(())
}

/// Undo of a `HEAP_DELETE`: flip the item-id back `DEAD -> NORMAL`. Valid
/// as long as the page hasn't been vacuumed since — this engine never
/// vacuums automatically, so the original bytes are always still present.
pub fn hot_raw_undo_delete(pool: &mut BufferPool, database_oid: Oid, table_oid: Oid, lsn: u64, ptr: TuplePointer) -> Result<bool> {
    let mut page = load_page(pool, database_oid, table_oid, ptr.page)?;
    let ok = page.rollback_delete(lsn, ptr.slot);
    store_page(pool, table_oid, ptr.page, &page);
    Ok(ok)
}

/// Re-apply a `HEAP_UNDELETE` compensation during WAL redo, guarded by the
/// page's LSN like every other `hot_raw_redo_*` helper.
pub fn hot_raw_redo_undelete(pool: &mut BufferPool, database_oid: Oid, table_oid: Oid, lsn: u64, ptr: TuplePointer) -> Result<()> {
    let mut page = load_page(pool, database_oid, table_oid, ptr.page)?;
    if page.header.lsn >= lsn {
        pool.unpin(table_oid, ptr.page);
        return Ok(());
    }
    page.rollback_delete(lsn, ptr.slot);
    store_page(pool, table_oid, ptr.page, &page);
    Ok(())
}

/// `hot_simple_select_all(iter)` — a full table scan of every NORMAL tuple.
pub fn hot_simple_select_all(
    catalog: &Catalog,
    pool: &mut BufferPool,
    database_oid: Oid,
    table_oid: Oid,
) -> Result<Vec<(TuplePointer, Vec<Value>)>> {
    let attrs = catalog.attributes_of(table_oid);
    let page_count = pool.relation_page_count(database_oid, table_oid, RelationKind::Heap)?;
    let mut rows = Vec::new();
    for pno in 0..page_count {
        let page = load_page(pool, database_oid, table_oid, pno)?;
        pool.unpin(table_oid, pno);
        for slot in 0..page.item_ids.len() as u32 {
            let bytes = page.select(slot);
            if !bytes.is_empty() {
                rows.push((TuplePointer::new(pno, slot), tuple::decode(&attrs, &bytes)?));
            }
        }
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{OidKind, TYPE_INTEGER, TYPE_VARCHAR};
    use crate::common::oid_range;
    use tempfile::tempdir;

    fn setup() -> (tempfile::TempDir, Catalog, BufferPool, Oid) {
        let dir = tempdir().unwrap();
        let mut catalog = Catalog::open(dir.path().join("catalog")).unwrap();
        let mut pool = BufferPool::new(dir.path().join("base"), 16, 16);
        let table_oid = hot_create_table(
            &mut catalog,
            &mut pool,
            oid_range::DATABASE_ANDB,
            "widgets",
            &[
                ("id".to_string(), TYPE_INTEGER, 4, true),
                ("name".to_string(), TYPE_VARCHAR, 32, false),
            ],
        )
        .unwrap();
        (dir, catalog, pool, table_oid)
    }

    #[test]
    fn insert_select_delete_update_lifecycle() {
        let (_dir, catalog, mut pool, table_oid) = setup();
        let ptr = hot_simple_insert(
            &catalog,
            &mut pool,
            1,
            oid_range::DATABASE_ANDB,
            table_oid,
            &[Value::Integer(1), Value::Varchar("alice".to_string())],
        )
        .unwrap();

        let row = hot_simple_select(&catalog, &mut pool, oid_range::DATABASE_ANDB, table_oid, ptr)
            .unwrap()
            .unwrap();
        assert_eq!(row[0], Value::Integer(1));

        let ptr2 = hot_simple_update(
            &catalog,
            &mut pool,
            2,
            oid_range::DATABASE_ANDB,
            table_oid,
            ptr,
            &[Value::Integer(1), Value::Varchar("alice b".to_string())],
        )
        .unwrap();
        let row2 = hot_simple_select(&catalog, &mut pool, oid_range::DATABASE_ANDB, table_oid, ptr2)
            .unwrap()
            .unwrap();
        assert_eq!(row2[1], Value::Varchar("alice b".to_string()));

        assert!(hot_simple_delete(&mut pool, 3, oid_range::DATABASE_ANDB, table_oid, ptr2).unwrap());
        assert!(hot_simple_select(&catalog, &mut pool, oid_range::DATABASE_ANDB, table_oid, ptr2)
            .unwrap()
            .is_none());
    }

    #[test]
    fn insert_spills_to_next_page_when_full() {
        let (_dir, catalog, mut pool, table_oid) = setup();
        let mut last_ptr = None;
        for i in 0..2000 {
            last_ptr = Some(
                hot_simple_insert(
                    &catalog,
                    &mut pool,
                    1,
                    oid_range::DATABASE_ANDB,
                    table_oid,
                    &[Value::Integer(i), Value::Varchar("x".repeat(20))],
                )
                .unwrap(),
            );
        }
        assert!(last_ptr.unwrap().page > 0);
    }

    #[test]
    fn drop_table_refuses_with_dependent_index() {
        let (_dir, mut catalog, mut pool, table_oid) = setup();
        catalog
            .define_index(crate::catalog::IndexRow {
                index_oid: catalog.allocate_oid(OidKind::Relation).unwrap(),
                name: "widgets_id_idx".to_string(),
                table_oid,
                index_column_index: 0,
                table_attr_index: 0,
            })
            .unwrap();
        let err = hot_drop_table(&mut catalog, &mut pool, oid_range::DATABASE_ANDB, "widgets").unwrap_err();
        assert_eq!(err.code, ErrorKind::Schema);
    }
}
