//! Backend conformance suite: the same tree scenarios run against any `RowStore`.
//!
//! A backend test supplies a factory that opens an empty store for the given configuration and
//! calls [`run_all`] (or single scenarios). Every scenario panics on the first mismatch.

use nestedset_core::{
    DeleteMode, Error, HookPoint, NestedSet, NodeHandle, RowStore, TreeConfig, TreeHooks,
    TreeNode,
};

/// Opens an empty store for `config`.
pub trait StoreFactory {
    type Store: RowStore;

    fn open(&mut self, config: &TreeConfig) -> Self::Store;
}

impl<S, F> StoreFactory for F
where
    S: RowStore,
    F: FnMut(&TreeConfig) -> S,
{
    type Store = S;

    fn open(&mut self, config: &TreeConfig) -> S {
        self(config)
    }
}

fn engine<F: StoreFactory>(factory: &mut F, config: TreeConfig) -> NestedSet<F::Store> {
    NestedSet::new(factory.open(&config), config)
}

fn add(tree: &mut NestedSet<impl RowStore, impl TreeHooks>, name: &str, parent: &NodeHandle) -> NodeHandle {
    let node = NodeHandle::named(name);
    assert!(tree.append_to(&node, parent).unwrap());
    node
}

fn root(tree: &mut NestedSet<impl RowStore, impl TreeHooks>, name: &str) -> NodeHandle {
    let node = NodeHandle::named(name);
    assert!(tree.make_root(&node).unwrap());
    node
}

pub fn run_all<F: StoreFactory>(factory: &mut F) {
    append_move_delete(factory);
    placements_and_queries(factory);
    materialized_paths(factory);
    multiple_roots(factory);
    hook_rejection_rolls_back(factory);
    individual_delete(factory);
}

/// Root with two children, a sibling move, then deleting the root empties the table.
pub fn append_move_delete<F: StoreFactory>(factory: &mut F) {
    let mut tree = engine(factory, TreeConfig::new("conf_basic"));
    let r = root(&mut tree, "R");
    let a = add(&mut tree, "A", &r);
    let b = add(&mut tree, "B", &r);
    assert_eq!(r.bounds(), (1, 6, 1));
    assert_eq!(b.bounds(), (4, 5, 2));

    assert!(tree.move_before(&b, &a).unwrap());
    assert_eq!(b.bounds(), (2, 3, 2));
    assert_eq!(a.bounds(), (4, 5, 2));
    let stored = tree.load(b.id().unwrap()).unwrap().unwrap();
    assert_eq!(stored.bounds(), (2, 3, 2));
    tree.validate_invariants().unwrap();

    assert!(tree.delete(&r).unwrap());
    assert!(tree.all_rows().unwrap().is_empty());
    assert!(a.borrow().deleted && b.borrow().deleted);
}

pub fn placements_and_queries<F: StoreFactory>(factory: &mut F) {
    let mut tree = engine(factory, TreeConfig::new("conf_queries"));
    let r = root(&mut tree, "R");
    let b = add(&mut tree, "B", &r);
    let a = NodeHandle::named("A");
    tree.prepend_to(&a, &r).unwrap();
    let c = NodeHandle::named("C");
    tree.insert_after(&c, &b).unwrap();
    let a1 = add(&mut tree, "A1", &a);

    let children = tree.fetch_ids(&tree.children(&r, None).unwrap()).unwrap();
    assert_eq!(children, vec![a.id().unwrap(), b.id().unwrap(), c.id().unwrap()]);
    let all = tree.fetch_ids(&tree.descendants(&r, None, None).unwrap()).unwrap();
    assert_eq!(all.len(), 4);
    assert_eq!(all[3], a1.id().unwrap());
    let up = tree.fetch_ids(&tree.ancestors(&a1, None, true, false).unwrap()).unwrap();
    assert_eq!(up, vec![r.id().unwrap(), a.id().unwrap()]);
    assert_eq!(tree.next_sibling(&a).unwrap().unwrap().id(), b.id());
    assert_eq!(tree.prev_sibling(&c).unwrap().unwrap().id(), b.id());
    assert_eq!(tree.parent(&a1).unwrap().unwrap().id(), a.id());
    assert_eq!(tree.roots().unwrap().len(), 1);
    tree.validate_invariants().unwrap();
}

pub fn materialized_paths<F: StoreFactory>(factory: &mut F) {
    let mut tree = engine(factory, TreeConfig::new("conf_paths").with_paths(true));
    let r = root(&mut tree, "R");
    let a = add(&mut tree, "A", &r);
    let b = add(&mut tree, "B", &r);
    let a1 = add(&mut tree, "A1", &a);

    let before = tree.all_rows().unwrap();
    let dup = NodeHandle::named("B");
    assert!(matches!(tree.append_to(&dup, &r), Err(Error::DuplicatePath(_))));
    assert_eq!(tree.all_rows().unwrap(), before);

    tree.move_as_last(&a, &b).unwrap();
    let stored = tree.load(a1.id().unwrap()).unwrap().unwrap();
    assert_eq!(stored.borrow().path.as_deref(), Some("/R/B/A/A1"));
    assert_eq!(a1.borrow().path.as_deref(), Some("/R/B/A/A1"));

    tree.rename(&b, "Beta").unwrap();
    let stored = tree.load(a1.id().unwrap()).unwrap().unwrap();
    assert_eq!(stored.borrow().path.as_deref(), Some("/R/Beta/A/A1"));
    assert_eq!(a.borrow().path.as_deref(), Some("/R/Beta/A"));
    tree.validate_invariants().unwrap();
}

pub fn multiple_roots<F: StoreFactory>(factory: &mut F) {
    let mut tree = engine(factory, TreeConfig::new("conf_forest").with_multiple_roots(true));
    let t1 = root(&mut tree, "T1");
    let t2 = root(&mut tree, "T2");
    let a = add(&mut tree, "a", &t1);
    let a1 = add(&mut tree, "a1", &a);
    let x = add(&mut tree, "x", &t2);
    assert_eq!(t1.borrow().root, t1.id());

    tree.move_as_first(&a, &x).unwrap();
    assert_eq!(a.bounds(), (3, 6, 3));
    assert_eq!(a1.borrow().root, t2.id());
    assert_eq!(t1.bounds(), (1, 2, 1));
    tree.validate_invariants().unwrap();

    tree.move_as_root(&a).unwrap();
    assert_eq!(a.bounds(), (1, 4, 1));
    assert_eq!(a1.bounds(), (2, 3, 2));
    assert_eq!(t2.bounds(), (1, 4, 1));
    let stored = tree.load(a1.id().unwrap()).unwrap().unwrap();
    assert_eq!(stored.borrow().root, a.id());
    assert_eq!(tree.roots().unwrap().len(), 3);
    tree.validate_invariants().unwrap();
}

struct RejectAfterAdd(&'static str);

impl TreeHooks for RejectAfterAdd {
    fn after_add(&mut self, node: &TreeNode) -> bool {
        node.name.as_deref() != Some(self.0)
    }
}

pub fn hook_rejection_rolls_back<F: StoreFactory>(factory: &mut F) {
    let config = TreeConfig::new("conf_hooks");
    let store = factory.open(&config);
    let mut tree = NestedSet::with_hooks(store, config, RejectAfterAdd("late"));
    let r = root(&mut tree, "R");
    let a = add(&mut tree, "A", &r);
    let before = tree.all_rows().unwrap();

    let late = NodeHandle::named("late");
    let err = tree.prepend_to(&late, &r).unwrap_err();
    assert_eq!(err, Error::HookRejected(HookPoint::AfterAdd));
    assert_eq!(tree.all_rows().unwrap(), before);
    assert_eq!(a.bounds(), (2, 3, 2));

    let good = NodeHandle::named("good");
    let err = tree
        .transaction(|t| {
            t.append_to(&good, &r)?;
            t.append_to(&NodeHandle::named("late"), &good)
        })
        .unwrap_err();
    assert_eq!(err, Error::HookRejected(HookPoint::AfterAdd));
    assert_eq!(tree.all_rows().unwrap(), before);
    assert!(good.borrow().is_new());
    assert!(!tree.store().in_transaction());
}

pub fn individual_delete<F: StoreFactory>(factory: &mut F) {
    let mut tree = engine(
        factory,
        TreeConfig::new("conf_delete").with_delete_mode(DeleteMode::Individual),
    );
    let r = root(&mut tree, "R");
    let a = add(&mut tree, "A", &r);
    let a1 = add(&mut tree, "A1", &a);
    let a11 = add(&mut tree, "A11", &a1);
    let b = add(&mut tree, "B", &r);

    assert!(tree.delete(&a).unwrap());
    assert!(a11.borrow().deleted);
    assert_eq!(b.bounds(), (2, 3, 2));
    assert_eq!(r.bounds(), (1, 4, 1));
    assert_eq!(tree.all_rows().unwrap().len(), 2);
    tree.validate_invariants().unwrap();
}
