//! Transaction identifiers and in-memory transaction state.
//!
//! Grounded on `original_source/andb/storage/xact/mgr.py`: the `XID_SIZE`/
//! `MAX_XID` constants, `xid_to_bytes`/`bytes_to_xid` (kept **big-endian**
//! per `spec.md` §9 — an intentional asymmetry against every little-endian
//! page structure, never to be unified), and the `STATUS_*`/`active_transactions`
//! shape. The transaction manager itself (allocate/begin/commit/abort,
//! composed with the WAL and undo log) lives in [`crate::engine`], per
//! `spec.md` §9 Design Notes' single-`Engine`-value redesign — this module
//! is just the XID vocabulary and per-transaction bookkeeping struct.

use crate::common::{Xid, DUMMY_XID, FIRST_XID, INVALID_XID};
use crate::error::{Error, ErrorKind, Result};

pub const XID_SIZE: usize = 8;
pub const MAX_XID: Xid = u64::MAX;

/// Big-endian XID wire encoding — `spec.md` §9 calls this out explicitly as
/// the one place XIDs diverge from the rest of the on-disk byte order.
pub fn xid_to_bytes(xid: Xid) -> [u8; XID_SIZE] {
    xid.to_be_bytes()
}

pub fn bytes_to_xid(bytes: &[u8]) -> Result<Xid> {
    if bytes.len() != XID_SIZE {
        return Err(Error::with_message(
            ErrorKind::Corrupt,
            format!("xid must be {} bytes, got {}", XID_SIZE, bytes.len()),
        ));
    }
    let mut arr = [0u8; XID_SIZE];
    arr.copy_from_slice(bytes);
    Ok(Xid::from_be_bytes(arr))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnStatus {
    Active,
    Committed,
    Aborted,
}

/// Per-transaction bookkeeping the engine keeps in `active_transactions`.
#[derive(Debug, Clone)]
pub struct TxnState {
    pub xid: Xid,
    pub status: TxnStatus,
    pub last_lsn: u64,
}

impl TxnState {
    pub fn new(xid: Xid, last_lsn: u64) -> Self {
        Self { xid, status: TxnStatus::Active, last_lsn }
    }
}

pub fn is_real_xid(xid: Xid) -> bool {
    xid != INVALID_XID && xid != DUMMY_XID
}

pub const fn first_xid() -> Xid {
    FIRST_XID
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xid_bytes_are_big_endian() {
        let bytes = xid_to_bytes(1);
        assert_eq!(bytes, [0, 0, 0, 0, 0, 0, 0, 1]);
        assert_eq!(bytes_to_xid(&bytes).unwrap(), 1);
    }

    #[test]
    fn bytes_to_xid_rejects_wrong_length() {
        let err = bytes_to_xid(&[0u8; 4]).unwrap_err();
        assert_eq!(err.code, ErrorKind::Corrupt);
    }

    #[test]
    fn dummy_and_invalid_are_not_real_transactions() {
        assert!(!is_real_xid(INVALID_XID));
        assert!(!is_real_xid(DUMMY_XID));
        assert!(is_real_xid(first_xid()));
    }
}
