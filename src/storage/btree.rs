//! B+tree secondary index: a pure (key-bytes -> tuple pointers) structure.
//! No overflow pages, no payload-on-table-row special case, no
//! auto-vacuum. Split-only — deleting from a node never merges or
//! rebalances, so underflow after deletes is accepted fragmentation, not a
//! bug.
//!
//! Every node is one page, accessed through the buffer pool like any heap
//! page; `page.header.flags`/`reserved` carry the node's own page number,
//! leaf/internal tag, and (for leaves) the next-leaf pointer.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::catalog::{Catalog, IndexRow, OidKind};
use crate::codec::{self, define_struct};
use crate::common::{Oid, Pgno, RelationKind, TuplePointer, PAGE_SIZE};
use crate::error::{Error, ErrorKind, Result};
use crate::storage::buffer::BufferPool;
use crate::storage::page::{Page, PageHeader};

/// Sentinel: this leaf has no right sibling.
pub const NO_NEXT_LEAF: u32 = u32::MAX;

/// Split a leaf/internal node once its used-byte fraction of the page
/// (excluding the header) crosses this threshold.
pub const MAX_LOAD_FACTOR: f64 = 0.5;

define_struct! {
    /// The reserved header page of a BTREE relation file.
    #[derive(Debug, Clone, Copy)]
    pub struct BtreeFileHeader {
        root_pno: u32,
        next_pno: u32,
        version: u32,
    }
}

fn pack_flags(pno: Pgno, is_leaf: bool) -> u32 {
    (pno << 1) | is_leaf as u32
}

fn is_leaf(flags: u32) -> bool {
    flags & 1 == 1
}

fn encode_leaf_entry(pointers: &[TuplePointer], key: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let value_bytes: Vec<u8> = pointers.iter().flat_map(|p| p.to_bytes()).collect();
    codec::write_u32_le(value_bytes.len() as u32, &mut out);
    out.extend_from_slice(&value_bytes);
    out.extend_from_slice(key);
    out
}

fn decode_leaf_entry(bytes: &[u8]) -> Result<(Vec<TuplePointer>, Vec<u8>)> {
    let value_len = codec::read_u32_le(codec::take(bytes, 0, 4)?) as usize;
    let value_bytes = codec::take(bytes, 4, value_len)?;
    let pointers = value_bytes.chunks_exact(8).map(TuplePointer::from_bytes).collect();
    let key = bytes[4 + value_len..].to_vec();
    Ok((pointers, key))
}

fn encode_internal_entry(child_pno: Pgno, key: Option<&[u8]>) -> Vec<u8> {
    let mut out = Vec::new();
    codec::write_u32_le(child_pno, &mut out);
    if let Some(k) = key {
        out.extend_from_slice(k);
    }
    out
}

fn decode_internal_entry(bytes: &[u8]) -> Result<(Pgno, Vec<u8>)> {
    let child_pno = codec::read_u32_le(codec::take(bytes, 0, 4)?);
    Ok((child_pno, bytes[4..].to_vec()))
}

struct LeafEntry {
    slot: u32,
    key: Vec<u8>,
    pointers: Vec<TuplePointer>,
}

fn leaf_entries(page: &Page) -> Result<Vec<LeafEntry>> {
    let mut out = Vec::new();
    for slot in 0..page.item_ids.len() as u32 {
        let bytes = page.select(slot);
        if bytes.is_empty() {
            continue;
        }
        let (pointers, key) = decode_leaf_entry(&bytes)?;
        out.push(LeafEntry { slot, key, pointers });
    }
    out.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(out)
}

struct InternalEntry {
    slot: u32,
    child_pno: Pgno,
    /// Empty key marks the trailing catch-all entry.
    key: Vec<u8>,
}

fn internal_entries(page: &Page) -> Result<Vec<InternalEntry>> {
    let mut out = Vec::new();
    for slot in 0..page.item_ids.len() as u32 {
        let bytes = page.select(slot);
        if bytes.is_empty() {
            continue;
        }
        let (child_pno, key) = decode_internal_entry(&bytes)?;
        out.push(InternalEntry { slot, child_pno, key });
    }
    out.sort_by(|a, b| match (a.key.is_empty(), b.key.is_empty()) {
        (true, true) => std::cmp::Ordering::Equal,
        (true, false) => std::cmp::Ordering::Greater,
        (false, true) => std::cmp::Ordering::Less,
        (false, false) => a.key.cmp(&b.key),
    });
    Ok(out)
}

fn route(entries: &[InternalEntry], key: &[u8]) -> Pgno {
    for e in entries {
        if e.key.is_empty() || key <= e.key.as_slice() {
            return e.child_pno;
        }
    }
    entries.last().map(|e| e.child_pno).unwrap_or(0)
}

fn load_node(pool: &mut BufferPool, database_oid: Oid, index_oid: Oid, pno: Pgno) -> Result<Page> {
    pool.get_page(database_oid, index_oid, RelationKind::Btree, pno)?;
    Page::unpack(pool.page_bytes(index_oid, pno))
}

fn store_node(pool: &mut BufferPool, index_oid: Oid, pno: Pgno, page: &Page) {
    pool.write_page(index_oid, pno, &page.pack());
    pool.unpin(index_oid, pno);
}

fn read_header(pool: &mut BufferPool, database_oid: Oid, index_oid: Oid) -> Result<BtreeFileHeader> {
    let bytes = pool.read_btree_header_page(database_oid, index_oid)?;
    BtreeFileHeader::unpack(&bytes)
}

fn write_header(pool: &mut BufferPool, database_oid: Oid, index_oid: Oid, header: &BtreeFileHeader) -> Result<()> {
    let mut bytes = header.pack();
    bytes.resize(PAGE_SIZE, 0);
    pool.write_btree_header_page(database_oid, index_oid, &bytes)
}

fn allocate_pno(header: &mut BtreeFileHeader) -> Pgno {
    let pno = header.next_pno;
    header.next_pno += 1;
    pno
}

fn load_factor(page: &Page) -> f64 {
    let used = (page.item_data_size() + page.item_ids_size()) as f64;
    let denom = (PAGE_SIZE - PageHeader::SIZE) as f64;
    used / denom
}

/// `bt_create_index(name, table, fields)` — allocates an OID, records the
/// index row, creates the file, and initializes an empty root leaf.
pub fn bt_create_index(
    catalog: &mut Catalog,
    pool: &mut BufferPool,
    database_oid: Oid,
    name: &str,
    table_oid: Oid,
    index_column_index: u32,
    table_attr_index: u32,
) -> Result<Oid> {
    let oid = catalog.allocate_oid(OidKind::Relation)?;
    catalog.define_index(IndexRow {
        index_oid: oid,
        name: name.to_string(),
        table_oid,
        index_column_index,
        table_attr_index,
    })?;
    pool.create_relation_file(database_oid, oid, RelationKind::Btree)?;

    let header = BtreeFileHeader { root_pno: 0, next_pno: 1, version: 1 };
    write_header(pool, database_oid, oid, &header)?;

    let mut root = Page::allocate(0);
    root.header.flags = pack_flags(0, true);
    root.header.reserved = NO_NEXT_LEAF;
    store_node(pool, oid, 0, &root);
    Ok(oid)
}

/// `bt_drop_index(name)`.
pub fn bt_drop_index(catalog: &mut Catalog, pool: &mut BufferPool, database_oid: Oid, name: &str) -> Result<()> {
    let index_oid = catalog
        .find_index_by_name(name)
        .ok_or_else(|| Error::with_message(ErrorKind::NotFound, format!("index \"{}\" not found", name)))?
        .index_oid;
    pool.evict_relation(index_oid);
    pool.close_relation_file(database_oid, index_oid)?;
    pool.remove_relation_file(database_oid, index_oid)?;
    catalog.undefine_index(index_oid)
}

/// `bt_simple_insert(lsn, key_bytes, tuple_pointer)`.
pub fn bt_simple_insert(
    pool: &mut BufferPool,
    database_oid: Oid,
    index_oid: Oid,
    lsn: u64,
    key: &[u8],
    pointer: TuplePointer,
) -> Result<()> {
    let mut header = read_header(pool, database_oid, index_oid)?;
    let root_pno = header.root_pno;
    if let Some((promoted_key, new_sibling_pno)) =
        insert_into_node(pool, database_oid, index_oid, &mut header, lsn, root_pno, key, pointer)?
    {
        let new_root_pno = allocate_pno(&mut header);
        let mut new_root = Page::allocate(lsn);
        new_root.header.flags = pack_flags(new_root_pno, false);
        new_root.insert(lsn, &encode_internal_entry(root_pno, Some(&promoted_key)));
        new_root.insert(lsn, &encode_internal_entry(new_sibling_pno, None));
        store_node(pool, index_oid, new_root_pno, &new_root);
        header.root_pno = new_root_pno;
    }
    write_header(pool, database_oid, index_oid, &header)
}

fn insert_into_node(
    pool: &mut BufferPool,
    database_oid: Oid,
    index_oid: Oid,
    header: &mut BtreeFileHeader,
    lsn: u64,
    pno: Pgno,
    key: &[u8],
    pointer: TuplePointer,
) -> Result<Option<(Vec<u8>, Pgno)>> {
    let mut page = load_node(pool, database_oid, index_oid, pno)?;
    if is_leaf(page.header.flags) {
        let entries = leaf_entries(&page)?;
        if let Some(existing) = entries.iter().find(|e| e.key == key) {
            let mut pointers = existing.pointers.clone();
            pointers.push(pointer);
            page.delete(lsn, existing.slot);
            page.vacuum(lsn);
            page.insert(lsn, &encode_leaf_entry(&pointers, key));
        } else {
            page.insert(lsn, &encode_leaf_entry(&[pointer], key));
        }
        let split = if load_factor(&page) > MAX_LOAD_FACTOR {
            Some(split_leaf(pool, database_oid, index_oid, header, lsn, pno, &mut page)?)
        } else {
            None
        };
        store_node(pool, index_oid, pno, &page);
        Ok(split)
    } else {
        let entries = internal_entries(&page)?;
        let child_pno = route(&entries, key);
        let result = insert_into_node(pool, database_oid, index_oid, header, lsn, child_pno, key, pointer)?;
        if let Some((promoted_key, new_sibling_pno)) = result {
            // `child_pno` just split into a lower half (still `child_pno`)
            // and an upper half (`new_sibling_pno`). The existing entry for
            // `child_pno` encoded the upper bound of the *whole* former
            // child; that bound now belongs to `new_sibling_pno`, and
            // `child_pno`'s own new upper bound is the promoted key. Same
            // lower-gets-the-separator convention as the root-split path
            // above and `split_internal` below — getting this backwards
            // routes keys in `(promoted_key, old_bound)` to the wrong
            // child, since `bt_search`'s leaf chase only walks forward.
            let existing = entries
                .iter()
                .find(|e| e.child_pno == child_pno)
                .expect("route() only returns a child_pno present in entries");
            let old_key = existing.key.clone();
            let old_slot = existing.slot;
            page.delete(lsn, old_slot);
            page.vacuum(lsn);
            page.insert(lsn, &encode_internal_entry(child_pno, Some(&promoted_key)));
            let old_key_opt = if old_key.is_empty() { None } else { Some(old_key.as_slice()) };
            page.insert(lsn, &encode_internal_entry(new_sibling_pno, old_key_opt));
            let split = if load_factor(&page) > MAX_LOAD_FACTOR {
                Some(split_internal(pool, database_oid, index_oid, header, lsn, pno, &mut page)?)
            } else {
                None
            };
            store_node(pool, index_oid, pno, &page);
            Ok(split)
        } else {
            pool.unpin(index_oid, pno);
            Ok(None)
        }
    }
}

fn split_leaf(
    pool: &mut BufferPool,
    _database_oid: Oid,
    index_oid: Oid,
    header: &mut BtreeFileHeader,
    lsn: u64,
    pno: Pgno,
    page: &mut Page,
) -> Result<(Vec<u8>, Pgno)> {
    let mut entries = leaf_entries(page)?;
    let mid = entries.len() / 2;
    let upper = entries.split_off(mid);

    let new_pno = allocate_pno(header);
    let mut new_leaf = Page::allocate(lsn);
    new_leaf.header.flags = pack_flags(new_pno, true);
    new_leaf.header.reserved = page.header.reserved;
    for e in &upper {
        new_leaf.insert(lsn, &encode_leaf_entry(&e.pointers, &e.key));
    }

    page.reset(lsn);
    for e in &entries {
        page.insert(lsn, &encode_leaf_entry(&e.pointers, &e.key));
    }
    page.header.flags = pack_flags(pno, true);
    page.header.reserved = new_pno;

    store_node(pool, index_oid, new_pno, &new_leaf);
    let promoted_key = upper[0].key.clone();
    Ok((promoted_key, new_pno))
}

fn split_internal(
    pool: &mut BufferPool,
    _database_oid: Oid,
    index_oid: Oid,
    header: &mut BtreeFileHeader,
    lsn: u64,
    pno: Pgno,
    page: &mut Page,
) -> Result<(Vec<u8>, Pgno)> {
    let entries = internal_entries(page)?;
    let mid = (entries.len() / 2).max(1);
    let lower_slice = &entries[..mid];
    let upper_slice = &entries[mid..];

    let promoted_key = lower_slice
        .last()
        .map(|e| e.key.clone())
        .expect("internal split requires at least one lower entry");

    let new_pno = allocate_pno(header);
    let mut new_internal = Page::allocate(lsn);
    new_internal.header.flags = pack_flags(new_pno, false);
    for e in upper_slice {
        let key_opt = if e.key.is_empty() { None } else { Some(e.key.as_slice()) };
        new_internal.insert(lsn, &encode_internal_entry(e.child_pno, key_opt));
    }

    page.reset(lsn);
    for (i, e) in lower_slice.iter().enumerate() {
        let is_last = i == lower_slice.len() - 1;
        let key_opt = if is_last { None } else { Some(e.key.as_slice()) };
        page.insert(lsn, &encode_internal_entry(e.child_pno, key_opt));
    }
    page.header.flags = pack_flags(pno, false);

    store_node(pool, index_oid, new_pno, &new_internal);
    Ok((promoted_key, new_pno))
}

fn descend_to_leaf(pool: &mut BufferPool, database_oid: Oid, index_oid: Oid, root_pno: Pgno, key: &[u8]) -> Result<Pgno> {
    let mut pno = root_pno;
    loop {
        let page = load_node(pool, database_oid, index_oid, pno)?;
        if is_leaf(page.header.flags) {
            pool.unpin(index_oid, pno);
            return Ok(pno);
        }
        let entries = internal_entries(&page)?;
        pool.unpin(index_oid, pno);
        pno = route(&entries, key);
    }
}

fn locate_leaf_with_key(pool: &mut BufferPool, database_oid: Oid, index_oid: Oid, root_pno: Pgno, key: &[u8]) -> Result<(Pgno, Page)> {
    let mut pno = descend_to_leaf(pool, database_oid, index_oid, root_pno, key)?;
    loop {
        let page = load_node(pool, database_oid, index_oid, pno)?;
        let entries = leaf_entries(&page)?;
        let next = page.header.reserved;
        if let Some(last) = entries.last() {
            if last.key.as_slice() < key && next != NO_NEXT_LEAF {
                pool.unpin(index_oid, pno);
                pno = next;
                continue;
            }
        }
        return Ok((pno, page));
    }
}

/// `bt_search(key) -> list(pointer)`.
pub fn bt_search(pool: &mut BufferPool, database_oid: Oid, index_oid: Oid, key: &[u8]) -> Result<Vec<TuplePointer>> {
    let header = read_header(pool, database_oid, index_oid)?;
    let mut pno = descend_to_leaf(pool, database_oid, index_oid, header.root_pno, key)?;
    loop {
        let page = load_node(pool, database_oid, index_oid, pno)?;
        let entries = leaf_entries(&page)?;
        let next = page.header.reserved;
        pool.unpin(index_oid, pno);
        if let Some(last) = entries.last() {
            if last.key.as_slice() < key && next != NO_NEXT_LEAF {
                pno = next;
                continue;
            }
        }
        return Ok(entries.into_iter().find(|e| e.key == key).map(|e| e.pointers).unwrap_or_default());
    }
}

/// `bt_search_range(start, end) -> list(list(pointer))`, returned as
/// `(key, pointers)` pairs over `[start, end)` in key order.
pub fn bt_search_range(
    pool: &mut BufferPool,
    database_oid: Oid,
    index_oid: Oid,
    start: &[u8],
    end: &[u8],
) -> Result<Vec<(Vec<u8>, Vec<TuplePointer>)>> {
    let header = read_header(pool, database_oid, index_oid)?;
    let mut pno = descend_to_leaf(pool, database_oid, index_oid, header.root_pno, start)?;
    let mut out = Vec::new();
    loop {
        let page = load_node(pool, database_oid, index_oid, pno)?;
        let entries = leaf_entries(&page)?;
        let next = page.header.reserved;
        pool.unpin(index_oid, pno);

        let mut exhausted = false;
        for e in entries {
            if e.key.as_slice() >= end {
                exhausted = true;
                break;
            }
            if e.key.as_slice() >= start {
                out.push((e.key, e.pointers));
            }
        }
        if exhausted || next == NO_NEXT_LEAF {
            break;
        }
        pno = next;
    }
    Ok(out)
}

fn leftmost_leaf(pool: &mut BufferPool, database_oid: Oid, index_oid: Oid, root_pno: Pgno) -> Result<Pgno> {
    let mut pno = root_pno;
    loop {
        let page = load_node(pool, database_oid, index_oid, pno)?;
        if is_leaf(page.header.flags) {
            pool.unpin(index_oid, pno);
            return Ok(pno);
        }
        let entries = internal_entries(&page)?;
        pool.unpin(index_oid, pno);
        pno = entries
            .first()
            .map(|e| e.child_pno)
            .ok_or_else(|| Error::with_message(ErrorKind::Corrupt, "internal node has no entries"))?;
    }
}

/// `bt_scan_all_keys()` — a left-most leaf walk over the whole tree.
pub fn bt_scan_all_keys(pool: &mut BufferPool, database_oid: Oid, index_oid: Oid) -> Result<Vec<(Vec<u8>, Vec<TuplePointer>)>> {
    let header = read_header(pool, database_oid, index_oid)?;
    let mut pno = leftmost_leaf(pool, database_oid, index_oid, header.root_pno)?;
    let mut out = Vec::new();
    loop {
        let page = load_node(pool, database_oid, index_oid, pno)?;
        let entries = leaf_entries(&page)?;
        let next = page.header.reserved;
        pool.unpin(index_oid, pno);
        out.extend(entries.into_iter().map(|e| (e.key, e.pointers)));
        if next == NO_NEXT_LEAF {
            break;
        }
        pno = next;
    }
    Ok(out)
}

/// `bt_delete(lsn, key_bytes)` — removes the key and all its pointers.
/// Leaves may underflow; this tree never merges on delete.
pub fn bt_delete(pool: &mut BufferPool, database_oid: Oid, index_oid: Oid, lsn: u64, key: &[u8]) -> Result<bool> {
    let header = read_header(pool, database_oid, index_oid)?;
    let (pno, mut page) = locate_leaf_with_key(pool, database_oid, index_oid, header.root_pno, key)?;
    let entries = leaf_entries(&page)?;
    let found = entries.iter().find(|e| e.key == key).map(|e| e.slot);
    let changed = if let Some(slot) = found {
        page.delete(lsn, slot)
    } else {
        false
    };
    store_node(pool, index_oid, pno, &page);
    Ok(changed)
}

/// Remove a single pointer from a key's value list. Used by undo of
/// inserts. If the list becomes empty the entry itself is removed.
pub fn bt_delete_value(pool: &mut BufferPool, database_oid: Oid, index_oid: Oid, lsn: u64, key: &[u8], pointer: TuplePointer) -> Result<()> {
    let header = read_header(pool, database_oid, index_oid)?;
    let (pno, mut page) = locate_leaf_with_key(pool, database_oid, index_oid, header.root_pno, key)?;
    let entries = leaf_entries(&page)?;
    if let Some(entry) = entries.iter().find(|e| e.key == key) {
        let mut pointers = entry.pointers.clone();
        pointers.retain(|p| *p != pointer);
        page.delete(lsn, entry.slot);
        if !pointers.is_empty() {
            page.insert(lsn, &encode_leaf_entry(&pointers, key));
        }
    }
    store_node(pool, index_oid, pno, &page);
    Ok(())
}

/// `bt_update(lsn, key_bytes, pointer)` — delete then insert a single
/// pointer; used when an index-tracked column changes.
pub fn bt_update(pool: &mut BufferPool, database_oid: Oid, index_oid: Oid, lsn: u64, key: &[u8], pointer: TuplePointer) -> Result<()> {
    bt_delete(pool, database_oid, index_oid, lsn, key)?;
    bt_simple_insert(pool, database_oid, index_oid, lsn, key, pointer)
}

/// Level-order traversal with dense page renumbering, for cold-start
/// builds: `root_pno(4) || page0 || page1 || …`.
pub fn serialize(pool: &mut BufferPool, database_oid: Oid, index_oid: Oid) -> Result<Vec<u8>> {
    let header = read_header(pool, database_oid, index_oid)?;
    let mut order = Vec::new();
    let mut seen = HashSet::new();
    let mut queue = VecDeque::new();
    queue.push_back(header.root_pno);

    while let Some(pno) = queue.pop_front() {
        if !seen.insert(pno) {
            continue;
        }
        order.push(pno);
        let page = load_node(pool, database_oid, index_oid, pno)?;
        if !is_leaf(page.header.flags) {
            for e in internal_entries(&page)? {
                queue.push_back(e.child_pno);
            }
        }
        pool.unpin(index_oid, pno);
    }

    let remap: HashMap<Pgno, Pgno> = order.iter().enumerate().map(|(i, &old)| (old, i as Pgno)).collect();
    let mut out = Vec::new();
    codec::write_u32_le(*remap.get(&header.root_pno).expect("root is always in its own traversal"), &mut out);

    for &old_pno in &order {
        let mut page = load_node(pool, database_oid, index_oid, old_pno)?;
        let leaf = is_leaf(page.header.flags);
        let new_pno = remap[&old_pno];
        if leaf {
            page.header.flags = pack_flags(new_pno, true);
            if page.header.reserved != NO_NEXT_LEAF {
                page.header.reserved = remap.get(&page.header.reserved).copied().unwrap_or(NO_NEXT_LEAF);
            }
        } else {
            let entries = internal_entries(&page)?;
            page.reset(page.header.lsn);
            for e in &entries {
                let key_opt = if e.key.is_empty() { None } else { Some(e.key.as_slice()) };
                page.insert(page.header.lsn, &encode_internal_entry(remap[&e.child_pno], key_opt));
            }
            page.header.flags = pack_flags(new_pno, false);
        }
        pool.unpin(index_oid, old_pno);
        out.extend_from_slice(&page.pack());
    }
    Ok(out)
}

/// Reconstruct a relation file from a [`serialize`] blob. Pages are loaded
/// back through the same buffer pool the tree is normally read through,
/// rather than a separately injected loader closure.
pub fn deserialize(pool: &mut BufferPool, database_oid: Oid, index_oid: Oid, blob: &[u8]) -> Result<()> {
    let root_pno = codec::read_u32_le(codec::take(blob, 0, 4)?);
    let mut offset = 4usize;
    let mut new_pno: Pgno = 0;
    while offset + PAGE_SIZE <= blob.len() {
        pool.get_page(database_oid, index_oid, RelationKind::Btree, new_pno)?;
        pool.write_page(index_oid, new_pno, &blob[offset..offset + PAGE_SIZE]);
        pool.unpin(index_oid, new_pno);
        offset += PAGE_SIZE;
        new_pno += 1;
    }
    let header = BtreeFileHeader { root_pno, next_pno: new_pno, version: 1 };
    write_header(pool, database_oid, index_oid, &header)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, TYPE_INTEGER};
    use crate::common::oid_range;
    use tempfile::tempdir;

    fn setup() -> (tempfile::TempDir, Catalog, BufferPool, Oid) {
        let dir = tempdir().unwrap();
        let mut catalog = Catalog::open(dir.path().join("catalog")).unwrap();
        let mut pool = BufferPool::new(dir.path().join("base"), 32, 32);
        let table_oid = catalog.allocate_oid(OidKind::Relation).unwrap();
        catalog
            .define_table(
                table_oid,
                oid_range::DATABASE_ANDB,
                "t",
                crate::common::RelationKind::Heap,
                &[("id".to_string(), TYPE_INTEGER, 4, true)],
            )
            .unwrap();
        let index_oid = bt_create_index(&mut catalog, &mut pool, oid_range::DATABASE_ANDB, "t_id_idx", table_oid, 0, 0).unwrap();
        (dir, catalog, pool, index_oid)
    }

    fn key(n: u32) -> Vec<u8> {
        n.to_be_bytes().to_vec()
    }

    #[test]
    fn insert_and_search_single_key() {
        let (_dir, _catalog, mut pool, index_oid) = setup();
        let db = oid_range::DATABASE_ANDB;
        bt_simple_insert(&mut pool, db, index_oid, 1, &key(7), TuplePointer::new(0, 3)).unwrap();
        let found = bt_search(&mut pool, db, index_oid, &key(7)).unwrap();
        assert_eq!(found, vec![TuplePointer::new(0, 3)]);
        assert!(bt_search(&mut pool, db, index_oid, &key(8)).unwrap().is_empty());
    }

    #[test]
    fn duplicate_keys_accumulate_pointers() {
        let (_dir, _catalog, mut pool, index_oid) = setup();
        let db = oid_range::DATABASE_ANDB;
        bt_simple_insert(&mut pool, db, index_oid, 1, &key(1), TuplePointer::new(0, 0)).unwrap();
        bt_simple_insert(&mut pool, db, index_oid, 1, &key(1), TuplePointer::new(0, 1)).unwrap();
        let found = bt_search(&mut pool, db, index_oid, &key(1)).unwrap();
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn search_range_and_all_keys_after_many_splits() {
        let (_dir, _catalog, mut pool, index_oid) = setup();
        let db = oid_range::DATABASE_ANDB;
        for i in 0..500u32 {
            bt_simple_insert(&mut pool, db, index_oid, 1, &key(i), TuplePointer::new(i, 0)).unwrap();
        }
        let range = bt_search_range(&mut pool, db, index_oid, &key(10), &key(20)).unwrap();
        assert_eq!(range.len(), 10);
        assert_eq!(range[0].0, key(10));

        let all = bt_scan_all_keys(&mut pool, db, index_oid).unwrap();
        assert_eq!(all.len(), 500);
        assert_eq!(all[0].0, key(0));
        assert_eq!(all[499].0, key(499));
    }

    #[test]
    fn delete_removes_key_and_delete_value_trims_pointer_list() {
        let (_dir, _catalog, mut pool, index_oid) = setup();
        let db = oid_range::DATABASE_ANDB;
        bt_simple_insert(&mut pool, db, index_oid, 1, &key(5), TuplePointer::new(0, 0)).unwrap();
        bt_simple_insert(&mut pool, db, index_oid, 1, &key(5), TuplePointer::new(0, 1)).unwrap();

        bt_delete_value(&mut pool, db, index_oid, 2, &key(5), TuplePointer::new(0, 0)).unwrap();
        assert_eq!(bt_search(&mut pool, db, index_oid, &key(5)).unwrap(), vec![TuplePointer::new(0, 1)]);

        assert!(bt_delete(&mut pool, db, index_oid, 3, &key(5)).unwrap());
        assert!(bt_search(&mut pool, db, index_oid, &key(5)).unwrap().is_empty());
    }

    #[test]
    fn serialize_then_deserialize_preserves_contents() {
        let (_dir, _catalog, mut pool, index_oid) = setup();
        let db = oid_range::DATABASE_ANDB;
        for i in 0..200u32 {
            bt_simple_insert(&mut pool, db, index_oid, 1, &key(i), TuplePointer::new(i, 0)).unwrap();
        }
        let blob = serialize(&mut pool, db, index_oid).unwrap();
        deserialize(&mut pool, db, index_oid, &blob).unwrap();
        let all = bt_scan_all_keys(&mut pool, db, index_oid).unwrap();
        assert_eq!(all.len(), 200);
    }
}
