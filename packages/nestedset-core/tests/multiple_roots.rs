use nestedset_core::{Error, MemoryRowStore, NestedSet, NodeHandle, TreeConfig};

fn forest() -> NestedSet<MemoryRowStore> {
    NestedSet::new(
        MemoryRowStore::new(),
        TreeConfig::new("menu").with_multiple_roots(true),
    )
}

fn root(tree: &mut NestedSet<MemoryRowStore>, name: &str) -> NodeHandle {
    let h = NodeHandle::named(name);
    assert!(tree.make_root(&h).unwrap());
    h
}

fn child(tree: &mut NestedSet<MemoryRowStore>, name: &str, parent: &NodeHandle) -> NodeHandle {
    let h = NodeHandle::named(name);
    assert!(tree.append_to(&h, parent).unwrap());
    h
}

#[test]
fn every_root_is_its_own_root_marker() {
    let mut tree = forest();
    let t1 = root(&mut tree, "T1");
    let t2 = root(&mut tree, "T2");
    assert_eq!(t1.borrow().root, t1.id());
    assert_eq!(t2.borrow().root, t2.id());
    assert_eq!(t1.bounds(), (1, 2, 1));
    assert_eq!(t2.bounds(), (1, 2, 1));

    let ids: Vec<_> = tree.roots().unwrap().iter().map(|h| h.id()).collect();
    assert_eq!(ids, vec![t1.id(), t2.id()]);
    let siblings = tree.fetch_ids(&tree.siblings(&t2, None).unwrap()).unwrap();
    assert_eq!(siblings.len(), 2);
    tree.validate_invariants().unwrap();
}

#[test]
fn trees_do_not_disturb_each_other() {
    let mut tree = forest();
    let t1 = root(&mut tree, "T1");
    let t2 = root(&mut tree, "T2");
    let x = child(&mut tree, "x", &t2);
    let a = child(&mut tree, "a", &t1);
    let _b = child(&mut tree, "b", &t1);

    assert_eq!(t2.bounds(), (1, 4, 1));
    assert_eq!(x.bounds(), (2, 3, 2));
    assert_eq!(t1.bounds(), (1, 6, 1));
    assert_eq!(a.borrow().root, t1.id());

    let under_t2 = tree.fetch_ids(&tree.descendants(&t2, None, None).unwrap()).unwrap();
    assert_eq!(under_t2, vec![x.id().unwrap()]);
    let above_x = tree.fetch_ids(&tree.ancestors(&x, None, false, false).unwrap()).unwrap();
    assert_eq!(above_x, vec![t2.id().unwrap()]);
    tree.validate_invariants().unwrap();
}

#[test]
fn cross_tree_move_carries_the_subtree() {
    let mut tree = forest();
    let t1 = root(&mut tree, "T1");
    let t2 = root(&mut tree, "T2");
    let a = child(&mut tree, "a", &t1);
    let a1 = child(&mut tree, "a1", &a);
    let b = child(&mut tree, "b", &t1);
    let x = child(&mut tree, "x", &t2);

    assert!(tree.move_as_first(&a, &x).unwrap());
    assert_eq!(t1.bounds(), (1, 4, 1));
    assert_eq!(b.bounds(), (2, 3, 2));
    assert_eq!(t2.bounds(), (1, 8, 1));
    assert_eq!(x.bounds(), (2, 7, 2));
    assert_eq!(a.bounds(), (3, 6, 3));
    assert_eq!(a1.bounds(), (4, 5, 4));
    assert_eq!(a.borrow().root, t2.id());
    assert_eq!(a1.borrow().root, t2.id());
    tree.validate_invariants().unwrap();

    assert!(tree.move_after(&a, &b).unwrap());
    assert_eq!(a.borrow().root, t1.id());
    assert_eq!(a.bounds(), (4, 7, 2));
    assert_eq!(t2.bounds(), (1, 4, 1));
    tree.validate_invariants().unwrap();
}

#[test]
fn move_as_root_detaches_a_subtree() {
    let mut tree = forest();
    let t1 = root(&mut tree, "T1");
    let a = child(&mut tree, "a", &t1);
    let b = child(&mut tree, "b", &t1);
    let a1 = child(&mut tree, "a1", &a);

    assert!(tree.move_as_root(&a).unwrap());
    assert_eq!(a.bounds(), (1, 4, 1));
    assert_eq!(a1.bounds(), (2, 3, 2));
    assert_eq!(a.borrow().root, a.id());
    assert_eq!(a1.borrow().root, a.id());
    assert_eq!(t1.bounds(), (1, 4, 1));
    assert_eq!(b.bounds(), (2, 3, 2));
    assert_eq!(tree.roots().unwrap().len(), 2);
    tree.validate_invariants().unwrap();

    let err = tree.move_as_root(&a).unwrap_err();
    assert!(matches!(err, Error::IllegalTopology(_)), "{err:?}");
}

#[test]
fn move_as_root_needs_multiple_roots_without_paths() {
    let mut single = NestedSet::new(MemoryRowStore::new(), TreeConfig::new("menu"));
    let r = NodeHandle::named("R");
    single.make_root(&r).unwrap();
    let a = NodeHandle::named("a");
    single.append_to(&a, &r).unwrap();
    assert!(matches!(single.move_as_root(&a), Err(Error::IllegalTopology(_))));

    let mut pathed = NestedSet::new(
        MemoryRowStore::new(),
        TreeConfig::new("menu").with_multiple_roots(true).with_paths(true),
    );
    let r = NodeHandle::named("R");
    pathed.make_root(&r).unwrap();
    let a = NodeHandle::named("a");
    pathed.append_to(&a, &r).unwrap();
    let rows_before = pathed.all_rows().unwrap();
    assert!(matches!(pathed.move_as_root(&a), Err(Error::IllegalTopology(_))));
    assert_eq!(pathed.all_rows().unwrap(), rows_before);
}
