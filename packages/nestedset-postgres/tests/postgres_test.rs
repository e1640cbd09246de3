use std::rc::Rc;

use uuid::Uuid;

use nestedset_core::{Error, NestedSet, NodeHandle, RowStore, TreeConfig};
use nestedset_postgres::{drop_table_for_tests, PgConnection, PostgresRowStore};
use nestedset_test_support::run_all;

fn connect() -> Option<Rc<PgConnection>> {
    let url = std::env::var("NESTEDSET_POSTGRES_URL").ok()?;
    PgConnection::connect(&url).ok()
}

/// Same configuration on a table no other test run can see.
fn isolated(config: &TreeConfig) -> TreeConfig {
    let mut config = config.clone();
    config.table = format!("{}_{}", config.table, Uuid::new_v4().simple());
    config
}

#[test]
fn postgres_store_passes_conformance() {
    let Some(client) = connect() else {
        return;
    };
    let mut tables = Vec::new();
    run_all(&mut |config: &TreeConfig| {
        let config = isolated(config);
        tables.push(config.clone());
        PostgresRowStore::new(client.clone(), config).unwrap()
    });
    let mut c = client.client();
    for config in &tables {
        drop_table_for_tests(&mut c, config).unwrap();
    }
}

#[test]
fn two_tables_share_one_connection() {
    let Some(client) = connect() else {
        return;
    };
    let menus = isolated(&TreeConfig::new("menu"));
    let pages = isolated(&TreeConfig::new("page").with_multiple_roots(true));

    let mut menu_tree = NestedSet::new(
        PostgresRowStore::new(client.clone(), menus.clone()).unwrap(),
        menus.clone(),
    );
    let mut page_tree = NestedSet::new(
        PostgresRowStore::new(client.clone(), pages.clone()).unwrap(),
        pages.clone(),
    );

    let m = NodeHandle::named("main");
    menu_tree.make_root(&m).unwrap();
    let p1 = NodeHandle::named("home");
    page_tree.make_root(&p1).unwrap();
    let p2 = NodeHandle::named("about");
    page_tree.make_root(&p2).unwrap();
    let child = NodeHandle::named("team");
    page_tree.append_to(&child, &p2).unwrap();

    assert_eq!(menu_tree.all_rows().unwrap().len(), 1);
    assert_eq!(page_tree.roots().unwrap().len(), 2);
    assert_eq!(child.borrow().root, p2.id());
    assert!(!page_tree.store().in_transaction());
    page_tree.validate_invariants().unwrap();

    let mut c = client.client();
    drop_table_for_tests(&mut c, &menus).unwrap();
    drop_table_for_tests(&mut c, &pages).unwrap();
}

#[test]
fn transaction_spans_every_table_on_the_connection() {
    let Some(client) = connect() else {
        return;
    };
    let menus = isolated(&TreeConfig::new("menu"));
    let pages = isolated(&TreeConfig::new("page"));

    let mut menu_tree = NestedSet::new(
        PostgresRowStore::new(client.clone(), menus.clone()).unwrap(),
        menus.clone(),
    );
    let mut page_tree = NestedSet::new(
        PostgresRowStore::new(client.clone(), pages.clone()).unwrap(),
        pages.clone(),
    );
    let m = NodeHandle::named("main");
    menu_tree.make_root(&m).unwrap();
    let p = NodeHandle::named("home");
    page_tree.make_root(&p).unwrap();
    let menu_rows = menu_tree.all_rows().unwrap();
    let page_rows = page_tree.all_rows().unwrap();

    let err = menu_tree
        .transaction(|tree| {
            tree.append_to(&NodeHandle::named("link"), &m)?;
            page_tree.append_to(&NodeHandle::named("intro"), &p)?;
            assert!(page_tree.store().in_transaction());
            Err::<(), _>(Error::Storage("abort".into()))
        })
        .unwrap_err();
    assert_eq!(err, Error::Storage("abort".into()));

    assert!(!client.in_transaction());
    assert_eq!(menu_tree.all_rows().unwrap(), menu_rows);
    assert_eq!(page_tree.all_rows().unwrap(), page_rows);

    let mut c = client.client();
    drop_table_for_tests(&mut c, &menus).unwrap();
    drop_table_for_tests(&mut c, &pages).unwrap();
}
