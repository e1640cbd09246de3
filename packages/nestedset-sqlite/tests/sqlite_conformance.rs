use nestedset_core::{Condition, NestedSet, NodeHandle, RowStore, Select, TreeConfig};
use nestedset_sqlite::SqliteRowStore;
use nestedset_test_support::run_all;

#[test]
fn sqlite_store_passes_conformance() {
    run_all(&mut |config: &TreeConfig| SqliteRowStore::new_in_memory(config.clone()).unwrap());
}

#[test]
fn tree_survives_reopening_the_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tree.db");
    let path = path.to_str().unwrap();
    let config = TreeConfig::new("category").with_paths(true);

    let (a_id, b_id) = {
        let store = SqliteRowStore::new(path, config.clone()).unwrap();
        let mut tree = NestedSet::new(store, config.clone());
        let r = NodeHandle::named("R");
        tree.make_root(&r).unwrap();
        let a = NodeHandle::named("A");
        tree.append_to(&a, &r).unwrap();
        let b = NodeHandle::named("B");
        tree.append_to(&b, &a).unwrap();
        (a.id().unwrap(), b.id().unwrap())
    };

    let store = SqliteRowStore::new(path, config.clone()).unwrap();
    let mut tree = NestedSet::new(store, config);
    tree.validate_invariants().unwrap();
    let b = tree.load_tracked(b_id).unwrap().unwrap();
    assert_eq!(b.bounds(), (3, 4, 3));
    assert_eq!(b.borrow().path.as_deref(), Some("/R/A/B"));

    let a = tree.load_tracked(a_id).unwrap().unwrap();
    tree.rename(&a, "Alpha").unwrap();
    assert_eq!(b.borrow().path.as_deref(), Some("/R/Alpha/B"));
    assert!(!tree.store().in_transaction());
}

#[test]
fn engine_joins_a_transaction_opened_by_the_caller() {
    let config = TreeConfig::new("category");
    let mut store = SqliteRowStore::new_in_memory(config.clone()).unwrap();
    store.begin().unwrap();
    let mut tree = NestedSet::new(store, config);
    let r = NodeHandle::named("R");
    tree.make_root(&r).unwrap();
    let a = NodeHandle::named("A");
    tree.append_to(&a, &r).unwrap();
    assert!(tree.store().in_transaction());

    let mut store = tree.into_store();
    store.rollback().unwrap();
    let rows = store.select_rows(&Select::new(Condition::All)).unwrap();
    assert!(rows.is_empty());
}
