use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::cache::{Delta, NodeRegistry, Slot};
use crate::config::{DeleteMode, TreeConfig};
use crate::error::{Error, Result};
use crate::expr::{Assignment, Column, Condition, Direction, Select};
use crate::hooks::{HookPoint, NoHooks, TreeHooks};
use crate::ids::NodeId;
use crate::model::{parent_path, validate_rows, NewRow, NodeHandle, NodeRow, TreeNode};
use crate::query::{QueryOutput, TreeQuery};
use crate::traits::RowStore;

/// Change waiting for the outermost commit before it reaches cached handles.
enum Pending {
    Changed(Delta),
    Inserted { handle: NodeHandle, row: NodeRow },
}

/// Where a node lands relative to its target.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Placement {
    FirstChild,
    LastChild,
    Before,
    After,
}

impl Placement {
    /// Insertion key and the level offset from the target.
    fn key(self, target: &TreeNode) -> (i64, i64) {
        match self {
            Placement::FirstChild => (target.left + 1, 1),
            Placement::LastChild => (target.right, 1),
            Placement::Before => (target.left, 0),
            Placement::After => (target.right + 1, 0),
        }
    }
}

/// Nested-set engine over one hierarchy table.
///
/// Every mutation runs in a single store transaction (joining one that is already open),
/// keeps the interval invariants, and afterwards corrects every registered in-memory handle.
pub struct NestedSet<S, H = NoHooks>
where
    S: RowStore,
    H: TreeHooks,
{
    store: S,
    config: TreeConfig,
    hooks: H,
    registry: Rc<RefCell<NodeRegistry>>,
    tx_depth: usize,
    pending: Vec<Pending>,
    replay_extra: Vec<NodeHandle>,
    /// Handle states from before the first correction inside an open composite transaction.
    undo: Vec<(NodeHandle, TreeNode)>,
    undo_seen: HashSet<usize>,
    /// First error raised by a nested operation; the outer transaction can only roll back.
    failed: Option<Error>,
    sanctioned: bool,
}

impl<S: RowStore> NestedSet<S, NoHooks> {
    pub fn new(store: S, config: TreeConfig) -> Self {
        Self::with_hooks(store, config, NoHooks)
    }
}

impl<S, H> NestedSet<S, H>
where
    S: RowStore,
    H: TreeHooks,
{
    pub fn with_hooks(store: S, config: TreeConfig, hooks: H) -> Self {
        Self {
            store,
            config,
            hooks,
            registry: NodeRegistry::shared(),
            tx_depth: 0,
            pending: Vec::new(),
            replay_extra: Vec::new(),
            undo: Vec::new(),
            undo_seen: HashSet::new(),
            failed: None,
            sanctioned: false,
        }
    }

    /// Shares a caller-owned registry, e.g. one per unit of work across several tables.
    pub fn with_registry(mut self, registry: Rc<RefCell<NodeRegistry>>) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn hooks_mut(&mut self) -> &mut H {
        &mut self.hooks
    }

    pub fn registry(&self) -> Rc<RefCell<NodeRegistry>> {
        self.registry.clone()
    }

    /// Registers a handle so later mutations keep its fields current.
    pub fn track(&self, handle: &NodeHandle) -> Slot {
        self.registry
            .borrow_mut()
            .register(&self.config.type_tag, handle)
    }

    pub fn untrack(&self, slot: &Slot) -> bool {
        self.registry.borrow_mut().unregister(slot)
    }

    /// Reads one node; the handle is not tracked until passed to `track`.
    pub fn load(&self, id: NodeId) -> Result<Option<NodeHandle>> {
        Ok(self.fetch_row(id)?.map(NodeHandle::from))
    }

    /// `load` followed by `track`.
    pub fn load_tracked(&self, id: NodeId) -> Result<Option<NodeHandle>> {
        let handle = self.load(id)?;
        if let Some(h) = &handle {
            self.track(h);
        }
        Ok(handle)
    }

    /// Runs `query` against current storage, honouring its `ids_only` flag.
    pub fn execute(&self, query: &TreeQuery) -> Result<QueryOutput> {
        if query.is_ids_only() {
            Ok(QueryOutput::Ids(self.fetch_ids(query)?))
        } else {
            Ok(QueryOutput::Nodes(self.fetch(query)?))
        }
    }

    /// Handles for every matching row, whatever the query's `ids_only` flag says.
    pub fn fetch(&self, query: &TreeQuery) -> Result<Vec<NodeHandle>> {
        Ok(self
            .store
            .select_rows(query.select())?
            .into_iter()
            .map(NodeHandle::from)
            .collect())
    }

    pub fn fetch_ids(&self, query: &TreeQuery) -> Result<Vec<NodeId>> {
        Ok(self
            .store
            .select_rows(query.select())?
            .into_iter()
            .map(|r| r.id)
            .collect())
    }

    pub fn fetch_one(&self, query: &TreeQuery) -> Result<Option<NodeHandle>> {
        Ok(self.fetch(&query.clone().limit(1))?.into_iter().next())
    }

    fn fetch_row(&self, id: NodeId) -> Result<Option<NodeRow>> {
        let select = Select::new(Condition::eq(Column::Id, id)).limit(Some(1));
        Ok(self.store.select_rows(&select)?.into_iter().next())
    }

    fn persisted(&self, handle: &NodeHandle) -> Result<TreeNode> {
        let node = handle.snapshot();
        if node.deleted {
            return Err(Error::IllegalState("node has been deleted".into()));
        }
        node.require_id()?;
        Ok(node)
    }

    pub fn descendants(
        &self,
        node: &NodeHandle,
        depth: Option<i64>,
        limit: Option<usize>,
    ) -> Result<TreeQuery> {
        let n = self.persisted(node)?;
        Ok(TreeQuery::descendants(&n, &self.config, depth).with_limit(limit))
    }

    pub fn children(&self, node: &NodeHandle, limit: Option<usize>) -> Result<TreeQuery> {
        let n = self.persisted(node)?;
        Ok(TreeQuery::children(&n, &self.config).with_limit(limit))
    }

    /// With `ids_only` set, `execute` yields identifiers instead of handles.
    pub fn ancestors(
        &self,
        node: &NodeHandle,
        depth: Option<i64>,
        reverse: bool,
        ids_only: bool,
    ) -> Result<TreeQuery> {
        let n = self.persisted(node)?;
        let query = TreeQuery::ancestors(&n, &self.config, depth, reverse);
        Ok(if ids_only { query.ids_only() } else { query })
    }

    pub fn parent(&self, node: &NodeHandle) -> Result<Option<NodeHandle>> {
        let n = self.persisted(node)?;
        self.fetch_one(&TreeQuery::parent(&n, &self.config))
    }

    /// Children of the node's parent, the node included. For a root: all roots.
    pub fn siblings(&self, node: &NodeHandle, limit: Option<usize>) -> Result<TreeQuery> {
        let n = self.persisted(node)?;
        let query = match self.fetch_one(&TreeQuery::parent(&n, &self.config))? {
            Some(parent) => TreeQuery::children(&parent.snapshot(), &self.config),
            None => TreeQuery::roots(&self.config),
        };
        Ok(query.with_limit(limit))
    }

    pub fn prev_sibling(&self, node: &NodeHandle) -> Result<Option<NodeHandle>> {
        let n = self.persisted(node)?;
        self.fetch_one(&TreeQuery::prev_sibling(&n, &self.config))
    }

    pub fn next_sibling(&self, node: &NodeHandle) -> Result<Option<NodeHandle>> {
        let n = self.persisted(node)?;
        self.fetch_one(&TreeQuery::next_sibling(&n, &self.config))
    }

    pub fn roots(&self) -> Result<Vec<NodeHandle>> {
        self.fetch(&TreeQuery::roots(&self.config))
    }

    pub fn all_rows(&self) -> Result<Vec<NodeRow>> {
        let mut select = Select::new(Condition::All);
        if self.config.multiple_roots {
            select = select.order_by(Column::Root, Direction::Asc);
        }
        self.store
            .select_rows(&select.order_by(Column::Left, Direction::Asc))
    }

    /// Checks every nesting invariant against storage. Intended for tests and debugging.
    pub fn validate_invariants(&self) -> Result<()> {
        validate_rows(&self.all_rows()?, &self.config)
    }

    /// Runs several mutations in one transaction. Handles are corrected after each inner
    /// operation so later steps see current bounds; an error rolls storage back and restores
    /// every corrected handle. A failed inner operation fails the whole transaction even if the
    /// body swallows its error.
    pub fn transaction<T>(&mut self, body: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.atomically(body)
    }

    /// Generic insert path. Tree rows may only be created through tree operations.
    pub fn insert_raw(&mut self, row: &NewRow) -> Result<NodeId> {
        self.ensure_sanctioned("insert")?;
        self.store.insert_row(row)
    }

    /// Generic single-row update path; rejected unless issued by the engine.
    pub fn update_raw(&mut self, id: NodeId, set: Vec<Assignment>) -> Result<u64> {
        self.ensure_sanctioned("update")?;
        self.update(set, Condition::eq(Column::Id, id))
    }

    /// Generic single-row delete path; rejected unless issued by the engine.
    pub fn delete_raw(&mut self, id: NodeId) -> Result<u64> {
        self.ensure_sanctioned("delete")?;
        self.delete_where(Condition::eq(Column::Id, id))
    }

    fn ensure_sanctioned(&self, what: &str) -> Result<()> {
        if self.sanctioned {
            Ok(())
        } else {
            Err(Error::ContractViolation(format!(
                "direct {what} on a tree row; use the tree operations"
            )))
        }
    }

    fn sanctioned<T>(&mut self, body: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let previous = self.sanctioned;
        self.sanctioned = true;
        let res = body(self);
        self.sanctioned = previous;
        res
    }

    fn root_scope(&self, root: Option<NodeId>) -> Option<Condition> {
        if self.config.multiple_roots {
            root.map(|r| Condition::eq(Column::Root, r))
        } else {
            None
        }
    }

    fn interval(&self, left: i64, right: i64, root: Option<NodeId>) -> Condition {
        Condition::ge(Column::Left, left)
            .and(Condition::le(Column::Right, right))
            .and_maybe(self.root_scope(root))
    }

    fn update(&mut self, set: Vec<Assignment>, filter: Condition) -> Result<u64> {
        let affected = self.store.update_rows(&set, &filter)?;
        self.pending.push(Pending::Changed(Delta::Update { set, filter }));
        Ok(affected)
    }

    fn delete_where(&mut self, filter: Condition) -> Result<u64> {
        let affected = self.store.delete_rows(&filter)?;
        self.pending.push(Pending::Changed(Delta::Delete { filter }));
        Ok(affected)
    }

    /// Shifts every boundary at or after `key` by `delta`.
    fn shift_left_right(&mut self, key: i64, delta: i64, root: Option<NodeId>) -> Result<()> {
        for column in [Column::Left, Column::Right] {
            let filter = Condition::ge(column, key).and_maybe(self.root_scope(root));
            self.update(vec![Assignment::shift(column, delta)], filter)?;
        }
        Ok(())
    }

    fn check_unique_path(&self, path: &str, root: Option<NodeId>, exclude: Option<NodeId>) -> Result<()> {
        if !self.config.unique_names() {
            return Ok(());
        }
        let mut filter = Condition::eq(Column::Path, path).and_maybe(self.root_scope(root));
        if let Some(id) = exclude {
            filter = filter.and(Condition::ne(Column::Id, id));
        }
        let clash = self.store.select_rows(&Select::new(filter).limit(Some(1)))?;
        match clash.first() {
            Some(other) => Err(Error::DuplicatePath(format!(
                "{path} is already used by node {}",
                other.id
            ))),
            None => Ok(()),
        }
    }

    fn required_name<'a>(&self, node: &'a TreeNode) -> Result<&'a str> {
        node.name
            .as_deref()
            .ok_or_else(|| Error::IllegalState("node name is required when paths are tracked".into()))
    }

    fn atomically<T>(&mut self, body: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.tx_depth > 0 {
            self.tx_depth += 1;
            let res = body(self);
            self.tx_depth -= 1;
            match &res {
                Ok(_) => self.flush_pending(true),
                Err(e) => {
                    self.discard_pending();
                    self.failed.get_or_insert_with(|| e.clone());
                }
            }
            return res;
        }

        let owns = !self.store.in_transaction();
        if owns {
            self.store.begin()?;
        }
        self.tx_depth = 1;
        let res = body(self);
        self.tx_depth = 0;
        let res = match (res, self.failed.take()) {
            (Ok(_), Some(inner)) => Err(inner),
            (res, _) => res,
        };

        match res {
            Ok(value) => {
                if owns {
                    if let Err(e) = self.store.commit() {
                        warn!(table = %self.config.table, error = %e, "commit failed, rolling back");
                        let _ = self.store.rollback();
                        self.restore_handles();
                        return Err(e);
                    }
                }
                self.flush_pending(false);
                self.undo.clear();
                self.undo_seen.clear();
                Ok(value)
            }
            Err(e) => {
                warn!(table = %self.config.table, error = %e, "tree mutation rolled back");
                if owns {
                    if let Err(rb) = self.store.rollback() {
                        warn!(table = %self.config.table, error = %rb, "rollback failed");
                    }
                }
                self.restore_handles();
                Err(e)
            }
        }
    }

    fn discard_pending(&mut self) {
        self.pending.clear();
        self.replay_extra.clear();
    }

    fn restore_handles(&mut self) {
        self.discard_pending();
        for (handle, before) in self.undo.drain(..) {
            handle.replace(before);
        }
        self.undo_seen.clear();
    }

    fn remember(&mut self, handle: &NodeHandle) {
        if self.undo_seen.insert(handle.addr()) {
            self.undo.push((handle.clone(), handle.snapshot()));
        }
    }

    /// Replays pending deltas on handles. `reversible` keeps the prior state of every touched
    /// handle until the outermost transaction ends.
    fn flush_pending(&mut self, reversible: bool) {
        let pending = std::mem::take(&mut self.pending);
        let extra = std::mem::take(&mut self.replay_extra);
        let tag = self.config.type_tag.clone();
        let mut targets = self.registry.borrow().targets(&tag, &extra);
        if reversible {
            for handle in &targets {
                self.remember(handle);
            }
        }
        let steps = pending.len();
        for step in pending {
            match step {
                Pending::Changed(delta) => NodeRegistry::apply(&targets, &delta),
                Pending::Inserted { handle, row } => {
                    if reversible {
                        self.remember(&handle);
                    }
                    handle.replace(row.into());
                    self.registry.borrow_mut().register(&tag, &handle);
                    if !targets.iter().any(|t| t.ptr_eq(&handle)) {
                        targets.push(handle);
                    }
                }
            }
        }
        debug!(table = %self.config.table, steps, handles = targets.len(), "cache corrected");
    }

    /// Inserts a new node as a tree root.
    ///
    /// In single-root mode the table may hold only one root. In multiple-root mode the row is
    /// persisted first and then marked as its own root.
    pub fn make_root(&mut self, node: &NodeHandle) -> Result<bool> {
        let n = node.snapshot();
        if n.deleted {
            return Err(Error::IllegalState("node has been deleted".into()));
        }
        if !n.is_new() {
            return Err(Error::IllegalState("node should be a new record".into()));
        }
        if !self.hooks.validate(&n) || !self.hooks.before_add(&n, None) {
            return Ok(false);
        }
        if !self.config.multiple_roots && !self.roots()?.is_empty() {
            return Err(Error::IllegalState(
                "a single-root tree already has a root".into(),
            ));
        }
        let path = if self.config.tracks_paths() {
            let path = format!("/{}", self.required_name(&n)?);
            self.check_unique_path(&path, None, None)?;
            Some(path)
        } else {
            None
        };

        let handle = node.clone();
        let multiple_roots = self.config.multiple_roots;
        self.atomically(move |tree| {
            let new_row = NewRow {
                left: 1,
                right: 2,
                level: 1,
                root: None,
                name: n.name.clone(),
                path,
            };
            let id = tree.sanctioned(|t| t.insert_raw(&new_row))?;
            let mut row = new_row.with_id(id);
            if multiple_roots {
                tree.sanctioned(|t| t.update_raw(id, vec![Assignment::set(Column::Root, id)]))?;
                row.root = Some(id);
            }
            debug!(table = %tree.config.table, id = %id, "inserted root");
            let inserted = TreeNode::from(row.clone());
            tree.pending.push(Pending::Inserted { handle, row });
            if !tree.hooks.after_add(&inserted) {
                return Err(Error::HookRejected(HookPoint::AfterAdd));
            }
            Ok(true)
        })
    }

    /// Inserts a new node as the first child of `target`.
    pub fn prepend_to(&mut self, node: &NodeHandle, target: &NodeHandle) -> Result<bool> {
        self.add_node(node, target, Placement::FirstChild)
    }

    /// Inserts a new node as the last child of `target`.
    pub fn append_to(&mut self, node: &NodeHandle, target: &NodeHandle) -> Result<bool> {
        self.add_node(node, target, Placement::LastChild)
    }

    /// Inserts a new node as the sibling immediately before `target`.
    pub fn insert_before(&mut self, node: &NodeHandle, target: &NodeHandle) -> Result<bool> {
        self.add_node(node, target, Placement::Before)
    }

    /// Inserts a new node as the sibling immediately after `target`.
    pub fn insert_after(&mut self, node: &NodeHandle, target: &NodeHandle) -> Result<bool> {
        self.add_node(node, target, Placement::After)
    }

    fn check_target(&self, node: &NodeHandle, target: &NodeHandle) -> Result<(TreeNode, TreeNode)> {
        let n = node.snapshot();
        let t = target.snapshot();
        if n.deleted {
            return Err(Error::IllegalState("node has been deleted".into()));
        }
        if node.ptr_eq(target) || (n.id.is_some() && n.id == t.id) {
            return Err(Error::IllegalTopology("target node should not be self".into()));
        }
        if t.deleted {
            return Err(Error::IllegalState("target node has been deleted".into()));
        }
        if t.is_new() {
            return Err(Error::IllegalState("target node should not be a new record".into()));
        }
        Ok((n, t))
    }

    fn add_node(&mut self, node: &NodeHandle, target: &NodeHandle, placement: Placement) -> Result<bool> {
        let (n, t) = self.check_target(node, target)?;
        if !n.is_new() {
            return Err(Error::IllegalState("node should be a new record".into()));
        }
        let (key, level_up) = placement.key(&t);
        let parent = if level_up == 1 {
            Some(t.clone())
        } else {
            if t.is_root() {
                return Err(Error::IllegalTopology("target node should not be root".into()));
            }
            self.fetch_one(&TreeQuery::parent(&t, &self.config))?
                .map(|p| p.snapshot())
        };
        if !self.hooks.validate(&n) || !self.hooks.before_add(&n, parent.as_ref()) {
            return Ok(false);
        }

        let root = if self.config.multiple_roots { t.root } else { None };
        let path = if self.config.tracks_paths() {
            let prefix = match &parent {
                Some(p) => p.path.clone().unwrap_or_default(),
                None => parent_path(t.path.as_deref().unwrap_or("")).to_string(),
            };
            let path = format!("{prefix}/{}", self.required_name(&n)?);
            self.check_unique_path(&path, root, None)?;
            Some(path)
        } else {
            None
        };

        self.replay_extra.push(target.clone());
        let handle = node.clone();
        self.atomically(move |tree| {
            tree.shift_left_right(key, 2, root)?;
            let new_row = NewRow {
                left: key,
                right: key + 1,
                level: t.level + level_up,
                root,
                name: n.name.clone(),
                path,
            };
            let id = tree.sanctioned(|s| s.insert_raw(&new_row))?;
            let row = new_row.with_id(id);
            debug!(
                table = %tree.config.table,
                id = %id,
                target = ?t.id,
                key,
                ?placement,
                "inserted node"
            );
            let inserted = TreeNode::from(row.clone());
            tree.pending.push(Pending::Inserted { handle, row });
            if !tree.hooks.after_add(&inserted) {
                return Err(Error::HookRejected(HookPoint::AfterAdd));
            }
            Ok(true)
        })
    }

    /// Moves an existing node (with its subtree) to become the sibling before `target`.
    pub fn move_before(&mut self, node: &NodeHandle, target: &NodeHandle) -> Result<bool> {
        self.move_node(node, target, Placement::Before)
    }

    pub fn move_after(&mut self, node: &NodeHandle, target: &NodeHandle) -> Result<bool> {
        self.move_node(node, target, Placement::After)
    }

    pub fn move_as_first(&mut self, node: &NodeHandle, target: &NodeHandle) -> Result<bool> {
        self.move_node(node, target, Placement::FirstChild)
    }

    pub fn move_as_last(&mut self, node: &NodeHandle, target: &NodeHandle) -> Result<bool> {
        self.move_node(node, target, Placement::LastChild)
    }

    fn move_node(&mut self, node: &NodeHandle, target: &NodeHandle, placement: Placement) -> Result<bool> {
        let (n, t) = self.check_target(node, target)?;
        let id = n
            .id
            .ok_or_else(|| Error::IllegalState("node should not be a new record".into()))?;
        let multiple_roots = self.config.multiple_roots;
        if t.is_descendant_of(&n, multiple_roots) {
            return Err(Error::IllegalTopology(
                "target node should not be a descendant".into(),
            ));
        }
        let (key, level_up) = placement.key(&t);
        if level_up == 0 && t.is_root() {
            return Err(Error::IllegalTopology("target node should not be root".into()));
        }
        if !self.hooks.validate(&n) || !self.hooks.before_move(&n, Some(&t)) {
            return Ok(false);
        }

        // Prefix rewrite applied to the whole moved subtree.
        let rewrite = if self.config.tracks_paths() {
            let name = self.required_name(&n)?;
            let old_prefix = parent_path(n.path.as_deref().unwrap_or("")).to_string();
            let new_prefix = if level_up == 1 {
                t.path.clone().unwrap_or_default()
            } else {
                parent_path(t.path.as_deref().unwrap_or("")).to_string()
            };
            if old_prefix != new_prefix {
                let new_path = format!("{new_prefix}/{name}");
                self.check_unique_path(&new_path, t.root, Some(id))?;
                Some(Assignment::ReplacePathPrefix {
                    old_prefix,
                    new_prefix,
                })
            } else {
                None
            }
        } else {
            None
        };

        self.replay_extra.push(node.clone());
        self.replay_extra.push(target.clone());
        let cross_tree = multiple_roots && n.root != t.root;
        self.atomically(move |tree| {
            let mut left = n.left;
            let mut right = n.right;
            let width = right - left + 1;
            let level_delta = t.level - n.level + level_up;

            if cross_tree {
                let dest_root = t.root.ok_or_else(|| {
                    Error::InconsistentState("target node has no root".into())
                })?;
                for column in [Column::Left, Column::Right] {
                    let filter = Condition::ge(column, key).and(Condition::eq(Column::Root, dest_root));
                    tree.update(vec![Assignment::shift(column, width)], filter)?;
                }
                let subtree = tree.interval(left, right, n.root);
                if let Some(rewrite) = rewrite {
                    tree.update(vec![rewrite], subtree.clone())?;
                }
                let delta = key - left;
                tree.update(
                    vec![
                        Assignment::shift(Column::Left, delta),
                        Assignment::shift(Column::Right, delta),
                        Assignment::shift(Column::Level, level_delta),
                        Assignment::set(Column::Root, dest_root),
                    ],
                    subtree,
                )?;
                tree.shift_left_right(right + 1, -width, n.root)?;
            } else {
                let root = n.root;
                tree.shift_left_right(key, width, root)?;
                if left >= key {
                    left += width;
                    right += width;
                }
                let mut set = vec![Assignment::shift(Column::Level, level_delta)];
                set.extend(rewrite);
                let subtree = tree.interval(left, right, root);
                tree.update(set, subtree)?;
                for column in [Column::Left, Column::Right] {
                    let filter = Condition::ge(column, left)
                        .and(Condition::le(column, right))
                        .and_maybe(tree.root_scope(root));
                    tree.update(vec![Assignment::shift(column, key - left)], filter)?;
                }
                tree.shift_left_right(right + 1, -width, root)?;
            }

            debug!(
                table = %tree.config.table,
                id = %id,
                target = ?t.id,
                key,
                width,
                level_delta,
                cross_tree,
                "moved subtree"
            );
            let moved = tree
                .fetch_row(id)?
                .ok_or_else(|| Error::InconsistentState(format!("node {id} vanished during move")))?;
            if !tree.hooks.after_move(&moved.into()) {
                return Err(Error::HookRejected(HookPoint::AfterMove));
            }
            Ok(true)
        })
    }

    /// Detaches the node's subtree into a new independent tree rooted at the node.
    /// Requires multiple-root mode and is not supported together with path tracking.
    pub fn move_as_root(&mut self, node: &NodeHandle) -> Result<bool> {
        if !self.config.multiple_roots {
            return Err(Error::IllegalTopology(
                "moving a node to root requires multiple-root mode".into(),
            ));
        }
        if self.config.tracks_paths() {
            return Err(Error::IllegalTopology(
                "moving a node to root is not supported with path tracking".into(),
            ));
        }
        let n = node.snapshot();
        if n.deleted {
            return Err(Error::IllegalState("node has been deleted".into()));
        }
        let id = n
            .id
            .ok_or_else(|| Error::IllegalState("node should not be a new record".into()))?;
        if n.is_root() {
            return Err(Error::IllegalTopology("node is already a root".into()));
        }
        if !self.hooks.validate(&n) || !self.hooks.before_move(&n, None) {
            return Ok(false);
        }

        self.replay_extra.push(node.clone());
        self.atomically(move |tree| {
            let (left, right) = (n.left, n.right);
            let subtree = tree.interval(left, right, n.root);
            tree.update(
                vec![
                    Assignment::shift(Column::Left, 1 - left),
                    Assignment::shift(Column::Right, 1 - left),
                    Assignment::shift(Column::Level, 1 - n.level),
                    Assignment::set(Column::Root, id),
                ],
                subtree,
            )?;
            tree.shift_left_right(right + 1, left - right - 1, n.root)?;
            debug!(table = %tree.config.table, id = %id, "moved subtree to new root");
            let moved = tree
                .fetch_row(id)?
                .ok_or_else(|| Error::InconsistentState(format!("node {id} vanished during move")))?;
            if !tree.hooks.after_move(&moved.into()) {
                return Err(Error::HookRejected(HookPoint::AfterMove));
            }
            Ok(true)
        })
    }

    /// Removes the node and its whole subtree, then closes the gap.
    pub fn delete(&mut self, node: &NodeHandle) -> Result<bool> {
        let n = node.snapshot();
        if n.deleted {
            return Err(Error::IllegalState("node has been deleted".into()));
        }
        let id = n
            .id
            .ok_or_else(|| Error::IllegalState("node should not be a new record".into()))?;
        if !self.hooks.before_delete(&n) {
            return Ok(false);
        }

        self.replay_extra.push(node.clone());
        let mode = self.config.delete_mode;
        self.atomically(move |tree| {
            let (left, right) = (n.left, n.right);
            let removed = if n.is_leaf() {
                tree.sanctioned(|t| t.delete_raw(id))?
            } else {
                match mode {
                    DeleteMode::Bulk => tree.delete_where(tree.interval(left, right, n.root))?,
                    DeleteMode::Individual => tree.delete_individually(&n, id)?,
                }
            };
            if removed == 0 {
                return Err(Error::InconsistentState(format!(
                    "node {id} was not found in storage"
                )));
            }
            tree.shift_left_right(right + 1, left - right - 1, n.root)?;
            debug!(table = %tree.config.table, id = %id, removed, ?mode, "deleted subtree");
            if !tree.hooks.after_delete(&n) {
                return Err(Error::HookRejected(HookPoint::AfterDelete));
            }
            Ok(true)
        })
    }

    /// Deletes descendants deepest first, each through the delete hooks, then the node itself.
    /// Every refusal is collected before failing so the caller sees all blocked nodes at once.
    fn delete_individually(&mut self, n: &TreeNode, id: NodeId) -> Result<u64> {
        let query = TreeQuery::descendants(n, &self.config, None);
        let mut descendants: Vec<TreeNode> = self
            .store
            .select_rows(query.select())?
            .into_iter()
            .map(TreeNode::from)
            .collect();
        descendants.sort_by(|a, b| b.level.cmp(&a.level).then(a.left.cmp(&b.left)));

        let refused: Vec<NodeId> = descendants
            .iter()
            .filter(|d| !self.hooks.before_delete(d))
            .filter_map(|d| d.id)
            .collect();
        if !refused.is_empty() {
            return Err(Error::DeleteRefused(refused));
        }

        let mut removed = 0;
        let mut failed = Vec::new();
        for child in &descendants {
            let child_id = child.require_id()?;
            removed += self.sanctioned(|t| t.delete_raw(child_id))?;
            if !self.hooks.after_delete(child) {
                failed.push(child_id);
            }
        }
        if !failed.is_empty() {
            return Err(Error::DeleteRefused(failed));
        }
        removed += self.sanctioned(|t| t.delete_raw(id))?;
        Ok(removed)
    }

    /// Renames a node and rewrites the materialized path of its whole subtree.
    pub fn rename(&mut self, node: &NodeHandle, new_name: &str) -> Result<bool> {
        if !self.config.tracks_paths() {
            return Err(Error::IllegalState(
                "renaming requires path tracking".into(),
            ));
        }
        let n = self.persisted(node)?;
        let id = n.require_id()?;
        let mut renamed = n.clone();
        renamed.name = Some(new_name.to_string());
        if !self.hooks.validate(&renamed) || !self.hooks.before_rename(&n, new_name) {
            return Ok(false);
        }
        let old_path = n.path.clone().unwrap_or_default();
        let new_path = format!("{}/{new_name}", parent_path(&old_path));
        if new_path != old_path {
            let scope = if n.is_root() { None } else { n.root };
            self.check_unique_path(&new_path, scope, Some(id))?;
        }

        self.replay_extra.push(node.clone());
        self.atomically(move |tree| {
            tree.sanctioned(|t| t.update_raw(id, vec![Assignment::set(Column::Name, new_name)]))?;
            if new_path != old_path {
                let subtree = tree.interval(n.left, n.right, n.root);
                tree.update(
                    vec![Assignment::ReplacePathPrefix {
                        old_prefix: old_path.clone(),
                        new_prefix: new_path.clone(),
                    }],
                    subtree,
                )?;
            }
            debug!(table = %tree.config.table, id = %id, %old_path, %new_path, "renamed node");
            let fresh = tree
                .fetch_row(id)?
                .ok_or_else(|| Error::InconsistentState(format!("node {id} vanished during rename")))?;
            if !tree.hooks.after_rename(&fresh.into(), n.name.as_deref()) {
                return Err(Error::HookRejected(HookPoint::AfterRename));
            }
            Ok(true)
        })
    }
}
