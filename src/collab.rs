//! Seam for an external SQL parser/planner/executor to drive `Engine`
//! through: a tagged [`PlanNode`] sum type in place of dynamic dispatch, and
//! an iterator contract ([`RowSource`]) an executor would pull rows through.
//! Neither carries any parsing or planning logic — they only give
//! `Engine`'s `hot_*`/`bt_*`/transaction entry points a concrete shape to be
//! called through.

use crate::common::{Oid, Value};
use crate::error::Result;

/// A decoded row of column values, the unit [`RowSource`] yields.
pub type Row = Vec<Value>;

/// Pull-based row iterator, the contract an executor drives a scan or join
/// through: `open` once, `next` until `None`, `close` when done scanning
/// (early or not). Callers must call `close` themselves even on an early
/// return, since the trait has no `Drop` glue to do it for them.
pub trait RowSource {
    fn open(&mut self) -> Result<()>;
    fn next(&mut self) -> Result<Option<Row>>;
    fn close(&mut self) -> Result<()>;
}

/// A physical plan node. Each variant names the fields a real executor would
/// need to drive that operation through `Engine`; there is no interpreter
/// here, only the shape of the seam.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanNode {
    Scan {
        table_oid: Oid,
    },
    IndexScan {
        index_oid: Oid,
        table_oid: Oid,
        key: Vec<u8>,
    },
    Filter {
        input: Box<PlanNode>,
        predicate: String,
    },
    Join {
        left: Box<PlanNode>,
        right: Box<PlanNode>,
        predicate: String,
    },
    HashAgg {
        input: Box<PlanNode>,
        group_by: Vec<u32>,
    },
    Sort {
        input: Box<PlanNode>,
        by: Vec<u32>,
    },
    Insert {
        table_oid: Oid,
        values: Vec<Row>,
    },
    Update {
        table_oid: Oid,
        input: Box<PlanNode>,
    },
    Delete {
        table_oid: Oid,
        input: Box<PlanNode>,
    },
    CreateTable {
        name: String,
    },
    CreateIndex {
        name: String,
        table_oid: Oid,
    },
    Explain {
        input: Box<PlanNode>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Once {
        row: Option<Row>,
        opened: bool,
        closed: bool,
    }

    impl RowSource for Once {
        fn open(&mut self) -> Result<()> {
            self.opened = true;
            Ok(())
        }
        fn next(&mut self) -> Result<Option<Row>> {
            Ok(self.row.take())
        }
        fn close(&mut self) -> Result<()> {
            self.closed = true;
            Ok(())
        }
    }

    #[test]
    fn row_source_yields_once_then_none() {
        let mut src = Once { row: Some(vec![Value::Integer(1)]), opened: false, closed: false };
        src.open().unwrap();
        assert!(src.opened);
        assert_eq!(src.next().unwrap(), Some(vec![Value::Integer(1)]));
        assert_eq!(src.next().unwrap(), None);
        src.close().unwrap();
        assert!(src.closed);
    }

    #[test]
    fn plan_node_nests_by_value() {
        let plan = PlanNode::Filter {
            input: Box::new(PlanNode::Scan { table_oid: 10_010 }),
            predicate: "id > 0".to_string(),
        };
        match plan {
            PlanNode::Filter { input, .. } => assert_eq!(*input, PlanNode::Scan { table_oid: 10_010 }),
            _ => panic!("expected Filter"),
        }
    }
}
