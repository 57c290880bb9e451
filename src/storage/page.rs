//! Slotted page: item-id directory plus item bodies growing toward each
//! other from opposite ends of a fixed `PAGE_SIZE` buffer.
//!
//! The header tracks `lower`/`upper` boundaries between the directory and
//! the item bodies; every mutation below keeps those two in sync with
//! what's actually stored.

use crate::codec::{self, define_struct, Endian};
use crate::common::{SlotId, PAGE_SIZE};
use crate::error::{Error, ErrorKind, Result};

pub const INVALID_SLOT: SlotId = u32::MAX;
pub const INVALID_BYTES: &[u8] = &[];

define_struct! {
    /// 28-byte page header.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PageHeader {
        lsn: u64,
        checksum: u32,
        flags: u32,
        reserved: u32,
        lower: u32,
        upper: u32,
    }
}

impl Default for PageHeader {
    fn default() -> Self {
        Self {
            lsn: 0,
            checksum: 0,
            flags: 0,
            reserved: 0,
            lower: PageHeader::SIZE as u32,
            upper: PAGE_SIZE as u32,
        }
    }
}

/// One entry in a page's item-id directory: `offset(15) | flag(2) | length(15)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemId {
    pub offset: u32,
    pub flag: ItemFlag,
    pub length: u32,
}

/// Item-id state flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ItemFlag {
    Unused = 0,
    Normal = 1,
    Redirect = 2,
    Dead = 3,
}

impl ItemFlag {
    fn from_bits(v: u32) -> Self {
        match v {
            0 => ItemFlag::Unused,
            1 => ItemFlag::Normal,
            2 => ItemFlag::Redirect,
            _ => ItemFlag::Dead,
        }
    }
}

const OFFSET_BITS: u32 = 15;
const FLAG_BITS: u32 = 2;
const LENGTH_BITS: u32 = 15;
const MASK_15: u32 = (1 << OFFSET_BITS) - 1;
const MASK_2: u32 = (1 << FLAG_BITS) - 1;
const OFFSET_SHIFT: u32 = FLAG_BITS + LENGTH_BITS; // 17
const FLAG_SHIFT: u32 = LENGTH_BITS; // 15

impl ItemId {
    pub const BYTES: usize = 4;

    fn to_u32(self) -> u32 {
        ((self.offset & MASK_15) << OFFSET_SHIFT)
            | ((self.flag as u32 & MASK_2) << FLAG_SHIFT)
            | (self.length & MASK_15)
    }

    fn from_u32(v: u32) -> Self {
        Self {
            offset: (v >> OFFSET_SHIFT) & MASK_15,
            flag: ItemFlag::from_bits((v >> FLAG_SHIFT) & MASK_2),
            length: v & MASK_15,
        }
    }
}

/// An in-memory slotted page. See module docs for the on-disk layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub header: PageHeader,
    pub item_ids: Vec<ItemId>,
    /// Item bodies, stored contiguously such that `items[0]` sits at absolute
    /// page offset `PAGE_SIZE - items.len()` — i.e. already in on-disk order.
    pub items: Vec<u8>,
}

impl Page {
    pub fn allocate(lsn: u64) -> Self {
        let mut header = PageHeader::default();
        header.lsn = lsn;
        Self {
            header,
            item_ids: Vec::new(),
            items: Vec::new(),
        }
    }

    pub fn item_ids_size(&self) -> usize {
        self.item_ids.len() * ItemId::BYTES
    }

    pub fn item_data_size(&self) -> usize {
        self.items.len()
    }

    pub fn free_space(&self) -> usize {
        PAGE_SIZE
            .saturating_sub(PageHeader::SIZE)
            .saturating_sub(self.item_ids_size())
            .saturating_sub(self.item_data_size())
    }

    /// Whether an item of `len` bytes plus a new item-id would still fit.
    pub fn can_put(&self, len: usize) -> bool {
        len + ItemId::BYTES <= self.free_space()
    }

    fn offset_into_items(&self, offset: u32) -> usize {
        self.item_data_size() - (PAGE_SIZE - offset as usize)
    }

    /// Append an item at the top of the free gap and prepend a new item-id.
    /// Returns `INVALID_SLOT` if the page is full or `data` is empty.
    pub fn insert(&mut self, lsn: u64, data: &[u8]) -> SlotId {
        if data.is_empty() || !self.can_put(data.len()) {
            return INVALID_SLOT;
        }
        let length = data.len() as u32;
        let offset = self.header.upper - length;
        self.item_ids.push(ItemId {
            offset,
            flag: ItemFlag::Normal,
            length,
        });
        let mut new_items = Vec::with_capacity(data.len() + self.items.len());
        new_items.extend_from_slice(data);
        new_items.extend_from_slice(&self.items);
        self.items = new_items;

        self.header.lsn = lsn;
        self.header.checksum = 0;
        self.header.lower = (PageHeader::SIZE + self.item_ids_size()) as u32;
        self.header.upper = (PAGE_SIZE - self.item_data_size()) as u32;
        (self.item_ids.len() - 1) as SlotId
    }

    /// Returns the stored bytes for `slot`, or `INVALID_BYTES` if the slot
    /// is out of range or not currently `Normal`.
    pub fn select(&self, slot: SlotId) -> Vec<u8> {
        let Some(item_id) = self.item_ids.get(slot as usize) else {
            return INVALID_BYTES.to_vec();
        };
        if item_id.flag != ItemFlag::Normal {
            return INVALID_BYTES.to_vec();
        }
        let start = self.offset_into_items(item_id.offset);
        let end = start + item_id.length as usize;
        self.items[start..end].to_vec()
    }

    /// Flip `NORMAL -> DEAD`. Idempotent-false on a repeat call.
    pub fn delete(&mut self, lsn: u64, slot: SlotId) -> bool {
        let Some(item_id) = self.item_ids.get_mut(slot as usize) else {
            return false;
        };
        if item_id.flag != ItemFlag::Normal {
            return false;
        }
        item_id.flag = ItemFlag::Dead;
        self.header.lsn = lsn;
        self.header.checksum = 0;
        true
    }

    /// Flip `DEAD -> NORMAL`, restoring the lsn that held before the delete.
    /// Used only to compensate a just-issued delete; undo uses the full undo log.
    pub fn rollback_delete(&mut self, old_lsn: u64, slot: SlotId) -> bool {
        let Some(item_id) = self.item_ids.get_mut(slot as usize) else {
            return false;
        };
        if item_id.flag != ItemFlag::Dead {
            return false;
        }
        item_id.flag = ItemFlag::Normal;
        self.header.lsn = old_lsn;
        self.header.checksum = 0;
        true
    }

    /// In-place overwrite if `data` is the same length as the stored item;
    /// otherwise an atomic delete+insert. Callers MUST treat the returned
    /// slot as possibly different from `slot`.
    pub fn update(&mut self, lsn: u64, slot: SlotId, data: &[u8]) -> SlotId {
        let Some(item_id) = self.item_ids.get(slot as usize).copied() else {
            return INVALID_SLOT;
        };
        if item_id.flag != ItemFlag::Normal {
            return INVALID_SLOT;
        }
        if data.len() as u32 == item_id.length {
            let start = self.offset_into_items(item_id.offset);
            let end = start + item_id.length as usize;
            self.items[start..end].copy_from_slice(data);
            self.header.lsn = lsn;
            self.header.checksum = 0;
            return slot;
        }

        let old_lsn = self.header.lsn;
        if !self.delete(lsn, slot) {
            return INVALID_SLOT;
        }
        let new_slot = self.insert(lsn, data);
        if new_slot == INVALID_SLOT {
            let ok = self.rollback_delete(old_lsn, slot);
            debug_assert!(ok, "rollback of just-issued delete must succeed");
        }
        new_slot
    }

    /// Compact: drop DEAD items, rewrite the item-id directory, repack bodies
    /// toward the high end of the page.
    pub fn vacuum(&mut self, lsn: u64) {
        let mut new_item_ids: Vec<ItemId> = self
            .item_ids
            .iter()
            .copied()
            .filter(|id| id.flag != ItemFlag::Dead)
            .collect();

        let mut new_data: Vec<u8> = Vec::new();
        let mut new_upper = PAGE_SIZE as u32;
        for item_id in new_item_ids.iter_mut() {
            let start = self.offset_into_items(item_id.offset);
            let end = start + item_id.length as usize;
            let mut body = self.items[start..end].to_vec();
            body.extend_from_slice(&new_data);
            new_data = body;
            item_id.offset = new_upper - item_id.length;
            new_upper = item_id.offset;
        }

        self.item_ids = new_item_ids;
        self.items = new_data;
        self.header.lsn = lsn;
        self.header.checksum = 0;
        self.header.upper = new_upper;
        self.header.lower = (PageHeader::SIZE + self.item_ids_size()) as u32;
    }

    /// Empty the page.
    pub fn reset(&mut self, lsn: u64) {
        self.item_ids.clear();
        self.items.clear();
        self.header.lsn = lsn;
        self.header.lower = PageHeader::SIZE as u32;
        self.header.upper = PAGE_SIZE as u32;
        self.header.checksum = 0;
    }

    /// Serialize to exactly `PAGE_SIZE` bytes; the gap between the item-id
    /// directory and the item bodies is zero-padded.
    pub fn pack(&self) -> Vec<u8> {
        let mut out = self.header.pack();
        for item_id in &self.item_ids {
            codec::write_u32_le(item_id.to_u32(), &mut out);
        }
        let padding = PAGE_SIZE - out.len() - self.items.len();
        out.resize(out.len() + padding, 0);
        out.extend_from_slice(&self.items);
        debug_assert_eq!(out.len(), PAGE_SIZE);
        out
    }

    pub fn unpack(data: &[u8]) -> Result<Self> {
        if data.len() != PAGE_SIZE {
            return Err(Error::with_message(
                ErrorKind::Corrupt,
                format!("page must be exactly {} bytes, got {}", PAGE_SIZE, data.len()),
            ));
        }
        let header = PageHeader::unpack(&data[..PageHeader::SIZE])?;
        let item_ids_size = header.lower as usize - PageHeader::SIZE;
        let mut item_ids = Vec::with_capacity(item_ids_size / ItemId::BYTES);
        let mut offset = PageHeader::SIZE;
        while offset < PageHeader::SIZE + item_ids_size {
            let raw = codec::read_u32(&data[offset..offset + 4], Endian::Little);
            item_ids.push(ItemId::from_u32(raw));
            offset += 4;
        }
        let items = data[header.upper as usize..].to_vec();
        Ok(Self {
            header,
            item_ids,
            items,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_unpack_round_trip_is_exact() {
        let mut page = Page::allocate(1);
        let s0 = page.insert(1, b"hello");
        let s1 = page.insert(1, b"world!!");
        assert_ne!(s0, INVALID_SLOT);
        assert_ne!(s1, INVALID_SLOT);

        let packed = page.pack();
        assert_eq!(packed.len(), PAGE_SIZE);
        let back = Page::unpack(&packed).unwrap();
        assert_eq!(back.pack(), packed);
        assert_eq!(back.select(s0), b"hello");
        assert_eq!(back.select(s1), b"world!!");
    }

    #[test]
    fn insert_select_vacuum_scenario() {
        let mut page = Page::allocate(0);
        let mut slots = Vec::new();
        for i in 0..4u8 {
            slots.push(page.insert(0, &[i]));
        }
        for i in 0..100u32 {
            let b = (i % 256) as u8;
            page.insert(0, &[b]);
        }
        for &s in &[0u32, 30, 40, 41, 90, 95, 96] {
            assert!(page.delete(0, s));
        }
        let last = (page.item_ids.len() - 1) as SlotId;
        assert!(page.delete(0, last));

        assert!(page.rollback_delete(0, 1));

        let free_before = page.free_space();
        let removed: usize = [0u32, 30, 40, 41, 90, 95, 96, last]
            .iter()
            .map(|&s| page.select(s).len() == 0)
            .filter(|x| *x)
            .count();
        assert_eq!(removed, 8);

        page.vacuum(0);
        let free_after = page.free_space();
        assert!(free_after >= free_before);

        for &s in &[0u32, 30, 40, 41, 90, 95, 96, last] {
            assert_eq!(page.select(s), INVALID_BYTES);
        }
        assert_eq!(page.select(1), vec![1u8]);
    }

    #[test]
    fn update_inplace_keeps_slot_different_len_moves() {
        let mut page = Page::allocate(0);
        let s = page.insert(0, b"abc");
        let s2 = page.update(1, s, b"xyz");
        assert_eq!(s2, s);
        assert_eq!(page.select(s), b"xyz");

        let s3 = page.update(2, s, b"a longer value");
        assert_ne!(s3, INVALID_SLOT);
        assert_eq!(page.select(s3), b"a longer value");
    }

    #[test]
    fn full_page_insert_fails() {
        let mut page = Page::allocate(0);
        let mut last_ok = INVALID_SLOT;
        loop {
            let s = page.insert(0, &[0u8; 64]);
            if s == INVALID_SLOT {
                break;
            }
            last_ok = s;
        }
        assert_ne!(last_ok, INVALID_SLOT);
        assert!(!page.can_put(64));
    }
}
