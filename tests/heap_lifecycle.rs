//! Cross-module heap lifecycle: create table, insert, select, delete,
//! update — through `Engine` rather than the bare `storage::heap` access
//! method, so the catalog, tuple codec, WAL, and undo log are all wired
//! in exactly as a caller would see them.

use andb::catalog::{TYPE_INTEGER, TYPE_TEXT, TYPE_VARCHAR};
use andb::{Engine, EngineConfig, Value};
use tempfile::tempdir;

#[test]
fn insert_select_delete_update_round_trip() {
    let dir = tempdir().unwrap();
    let mut engine = Engine::open(EngineConfig::new(dir.path())).unwrap();

    let table_oid = engine
        .create_table(
            "test_hot",
            &[
                ("id".to_string(), TYPE_INTEGER, 4, true),
                ("name".to_string(), TYPE_TEXT, 0, false),
                ("city".to_string(), TYPE_VARCHAR, 2, false),
            ],
        )
        .unwrap();

    let xid = engine.begin_transaction().unwrap();
    let rows = [
        (1, "xiaoming", "beijing"),
        (2, "xm2", "b2"),
        (3, "xm3", "b3"),
        (4, "xm4", "b4"),
    ];
    let mut ptrs = Vec::new();
    for (id, name, city) in rows {
        let ptr = engine
            .hot_insert(
                xid,
                table_oid,
                &[Value::Integer(id), Value::Text(name.to_string()), Value::Varchar(city.to_string())],
            )
            .unwrap();
        ptrs.push(ptr);
    }
    engine.commit_transaction(xid).unwrap();

    // A varchar(2) column truncates "beijing" down to its first two chars.
    let first = engine.hot_select(table_oid, ptrs[0]).unwrap().unwrap();
    assert_eq!(first[0], Value::Integer(1));
    assert_eq!(first[1], Value::Text("xiaoming".to_string()));
    assert_eq!(first[2], Value::Varchar("be".to_string()));

    let xid2 = engine.begin_transaction().unwrap();
    assert!(engine.hot_delete(xid2, table_oid, ptrs[2]).unwrap());
    assert!(engine.hot_select(table_oid, ptrs[2]).unwrap().is_none());

    let new_ptr = engine
        .hot_update(xid2, table_oid, ptrs[1], &[Value::Integer(1), Value::Null, Value::Null])
        .unwrap();
    assert!(engine.hot_select(table_oid, ptrs[1]).unwrap().is_none());
    let updated = engine.hot_select(table_oid, new_ptr).unwrap().unwrap();
    assert_eq!(updated, vec![Value::Integer(1), Value::Null, Value::Null]);
    engine.commit_transaction(xid2).unwrap();

    let remaining = engine.hot_select_all(table_oid).unwrap();
    assert_eq!(remaining.len(), 3, "row 3 deleted, row 2 moved by update: three of the original four slots are live");
}
