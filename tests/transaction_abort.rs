//! Cross-module transaction abort: an aborted transaction's inserts must
//! be invisible to a full table scan, and a checkpoint taken afterward
//! must not resurrect them.

use andb::catalog::{TYPE_INTEGER, TYPE_TEXT};
use andb::{Engine, EngineConfig, Value};
use tempfile::tempdir;

fn original_rows(engine: &mut Engine, table_oid: andb::Oid) -> Vec<Vec<Value>> {
    let mut rows: Vec<_> = engine.hot_select_all(table_oid).unwrap().into_iter().map(|(_, v)| v).collect();
    rows.sort_by_key(|r| match r[0] {
        Value::Integer(v) => v,
        _ => unreachable!(),
    });
    rows
}

#[test]
fn aborted_inserts_are_invisible_and_checkpoint_does_not_resurrect_them() {
    let dir = tempdir().unwrap();
    let mut engine = Engine::open(EngineConfig::new(dir.path())).unwrap();

    let table_oid = engine
        .create_table("t1", &[("a".to_string(), TYPE_INTEGER, 4, true), ("b".to_string(), TYPE_TEXT, 0, false)])
        .unwrap();

    let setup = engine.begin_transaction().unwrap();
    for (a, b) in [(1, Some("a1")), (2, Some("b2")), (3, None), (4, Some("c4"))] {
        let b_val = b.map(|s| Value::Text(s.to_string())).unwrap_or(Value::Null);
        engine.hot_insert(setup, table_oid, &[Value::Integer(a), b_val]).unwrap();
    }
    engine.commit_transaction(setup).unwrap();

    let before = original_rows(&mut engine, table_oid);
    assert_eq!(before.len(), 4);

    let xid = engine.begin_transaction().unwrap();
    engine.hot_insert(xid, table_oid, &[Value::Integer(1), Value::Text("hello".to_string())]).unwrap();
    engine.hot_insert(xid, table_oid, &[Value::Integer(2), Value::Text("world".to_string())]).unwrap();
    engine.abort_transaction(xid).unwrap();

    let after_abort = original_rows(&mut engine, table_oid);
    assert_eq!(after_abort, before, "full table scan after abort must return exactly the original four rows");

    engine.checkpoint().unwrap();
    let after_checkpoint = original_rows(&mut engine, table_oid);
    assert_eq!(after_checkpoint, before, "checkpoint must not change visible rows");
}
