//! andb-core - single-node relational storage and execution engine core.
//!
//! Pages, a buffer pool, an FD-cached file layer, a catalog, a tuple codec,
//! a heap access method, a B+tree secondary index, write-ahead logging, an
//! undo log, a lock manager and a transaction manager with ARIES-style
//! crash recovery, all owned by one [`engine::Engine`] value.

pub mod catalog;
pub mod codec;
pub mod collab;
pub mod common;
pub mod engine;
pub mod error;
pub mod lock;
pub mod storage;
pub mod undo;
pub mod wal;
pub mod xact;

pub use common::{Oid, Pgno, SlotId, TuplePointer, Value, Xid};
pub use engine::{Engine, EngineConfig};
pub use error::{Error, ErrorKind, Result};
