use std::cell::{Ref, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use crate::config::TreeConfig;
use crate::error::{Error, Result};
use crate::expr::{Column, RowFields, Value};
use crate::ids::NodeId;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Persisted tree row.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NodeRow {
    pub id: NodeId,
    pub left: i64,
    pub right: i64,
    pub level: i64,
    pub root: Option<NodeId>,
    pub name: Option<String>,
    pub path: Option<String>,
}

/// Row about to be inserted; the store assigns the id.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewRow {
    pub left: i64,
    pub right: i64,
    pub level: i64,
    pub root: Option<NodeId>,
    pub name: Option<String>,
    pub path: Option<String>,
}

impl NewRow {
    pub fn with_id(self, id: NodeId) -> NodeRow {
        NodeRow {
            id,
            left: self.left,
            right: self.right,
            level: self.level,
            root: self.root,
            name: self.name,
            path: self.path,
        }
    }
}

/// In-memory node instance. `id == None` marks a record that was never persisted.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TreeNode {
    pub id: Option<NodeId>,
    pub left: i64,
    pub right: i64,
    pub level: i64,
    pub root: Option<NodeId>,
    pub name: Option<String>,
    pub path: Option<String>,
    /// Set once the row was removed through this process; further operations are refused.
    pub deleted: bool,
}

impl TreeNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn is_new(&self) -> bool {
        self.id.is_none()
    }

    pub fn is_leaf(&self) -> bool {
        self.right - self.left == 1
    }

    pub fn is_root(&self) -> bool {
        self.left == 1
    }

    /// Interval containment; in multiple-root mode both nodes must also share a root.
    pub fn is_descendant_of(&self, other: &TreeNode, multiple_roots: bool) -> bool {
        let nested = self.left > other.left && self.right < other.right;
        if multiple_roots {
            nested && self.root == other.root
        } else {
            nested
        }
    }

    pub fn is_child_of(&self, other: &TreeNode, multiple_roots: bool) -> bool {
        self.is_descendant_of(other, multiple_roots) && self.level == other.level + 1
    }

    pub fn descendant_count(&self) -> i64 {
        (self.right - self.left - 1) / 2
    }

    /// Interval width, `right - left + 1`.
    pub fn width(&self) -> i64 {
        self.right - self.left + 1
    }

    pub fn require_id(&self) -> Result<NodeId> {
        self.id
            .ok_or_else(|| Error::IllegalState("node is a new record".into()))
    }
}

impl From<NodeRow> for TreeNode {
    fn from(row: NodeRow) -> Self {
        Self {
            id: Some(row.id),
            left: row.left,
            right: row.right,
            level: row.level,
            root: row.root,
            name: row.name,
            path: row.path,
            deleted: false,
        }
    }
}

fn read_int(v: i64) -> Option<Value> {
    Some(Value::Int(v))
}

impl RowFields for NodeRow {
    fn get(&self, column: Column) -> Option<Value> {
        match column {
            Column::Id => read_int(self.id.0),
            Column::Left => read_int(self.left),
            Column::Right => read_int(self.right),
            Column::Level => read_int(self.level),
            Column::Root => self.root.map(Value::from),
            Column::Name => self.name.clone().map(Value::Text),
            Column::Path => self.path.clone().map(Value::Text),
        }
    }

    fn set(&mut self, column: Column, value: Value) {
        match (column, value) {
            (Column::Id, Value::Int(v)) => self.id = NodeId(v),
            (Column::Left, Value::Int(v)) => self.left = v,
            (Column::Right, Value::Int(v)) => self.right = v,
            (Column::Level, Value::Int(v)) => self.level = v,
            (Column::Root, Value::Int(v)) => self.root = Some(NodeId(v)),
            (Column::Name, Value::Text(v)) => self.name = Some(v),
            (Column::Path, Value::Text(v)) => self.path = Some(v),
            _ => {}
        }
    }
}

impl RowFields for TreeNode {
    fn get(&self, column: Column) -> Option<Value> {
        match column {
            Column::Id => self.id.map(Value::from),
            Column::Left => read_int(self.left),
            Column::Right => read_int(self.right),
            Column::Level => read_int(self.level),
            Column::Root => self.root.map(Value::from),
            Column::Name => self.name.clone().map(Value::Text),
            Column::Path => self.path.clone().map(Value::Text),
        }
    }

    fn set(&mut self, column: Column, value: Value) {
        match (column, value) {
            (Column::Id, Value::Int(v)) => self.id = Some(NodeId(v)),
            (Column::Left, Value::Int(v)) => self.left = v,
            (Column::Right, Value::Int(v)) => self.right = v,
            (Column::Level, Value::Int(v)) => self.level = v,
            (Column::Root, Value::Int(v)) => self.root = Some(NodeId(v)),
            (Column::Name, Value::Text(v)) => self.name = Some(v),
            (Column::Path, Value::Text(v)) => self.path = Some(v),
            _ => {}
        }
    }
}

/// Shared handle to an in-memory node.
///
/// Cloning the handle shares the node; the consistency cache keeps only weak references, so
/// dropping the last handle ends the node's registration.
#[derive(Clone, Debug, Default)]
pub struct NodeHandle(Rc<RefCell<TreeNode>>);

impl NodeHandle {
    pub fn new(node: TreeNode) -> Self {
        Self(Rc::new(RefCell::new(node)))
    }

    /// Fresh, unsaved node carrying only a name.
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(TreeNode::named(name))
    }

    pub fn borrow(&self) -> Ref<'_, TreeNode> {
        self.0.borrow()
    }

    /// Owned copy of the current field values.
    pub fn snapshot(&self) -> TreeNode {
        self.0.borrow().clone()
    }

    pub fn id(&self) -> Option<NodeId> {
        self.0.borrow().id
    }

    /// `(left, right, level)`
    pub fn bounds(&self) -> (i64, i64, i64) {
        let n = self.0.borrow();
        (n.left, n.right, n.level)
    }

    pub fn ptr_eq(&self, other: &NodeHandle) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn cell(&self) -> &Rc<RefCell<TreeNode>> {
        &self.0
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    pub(crate) fn from_cell(cell: Rc<RefCell<TreeNode>>) -> Self {
        Self(cell)
    }

    pub(crate) fn replace(&self, node: TreeNode) {
        *self.0.borrow_mut() = node;
    }

    pub(crate) fn update(&self, f: impl FnOnce(&mut TreeNode)) {
        f(&mut self.0.borrow_mut());
    }
}

impl From<NodeRow> for NodeHandle {
    fn from(row: NodeRow) -> Self {
        NodeHandle::new(row.into())
    }
}

/// Path segment prefix of a node's parent: `/a/b/c` -> `/a/b`, `/a` -> ``.
pub fn parent_path(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// Verifies the nesting invariants over a full row set. Rows may span several trees when
/// `config.multiple_roots` is set; each tree is checked on its own.
pub fn validate_rows(rows: &[NodeRow], config: &TreeConfig) -> Result<()> {
    let mut trees: HashMap<Option<NodeId>, Vec<&NodeRow>> = HashMap::new();
    for row in rows {
        let key = if config.multiple_roots { row.root } else { None };
        if config.multiple_roots && key.is_none() {
            return Err(Error::InconsistentState(format!(
                "node {} has no root in multiple-root mode",
                row.id
            )));
        }
        trees.entry(key).or_default().push(row);
    }

    for (root, mut nodes) in trees {
        nodes.sort_by_key(|r| r.left);
        let Some(first) = nodes.first() else {
            continue;
        };
        if first.left != 1 || first.level != 1 {
            return Err(Error::InconsistentState(format!(
                "tree {root:?} does not start with a root at left=1"
            )));
        }
        if config.multiple_roots && root != Some(first.id) {
            return Err(Error::InconsistentState(format!(
                "root node {} is not its own root marker",
                first.id
            )));
        }
        if first.right != 2 * nodes.len() as i64 {
            return Err(Error::InconsistentState(format!(
                "root node {} right={} does not cover {} nodes",
                first.id,
                first.right,
                nodes.len()
            )));
        }

        let mut stack: Vec<&NodeRow> = Vec::new();
        for node in &nodes {
            if node.left >= node.right || (node.right - node.left) % 2 == 0 {
                return Err(Error::InconsistentState(format!(
                    "node {} has malformed interval ({}, {})",
                    node.id, node.left, node.right
                )));
            }
            while let Some(top) = stack.last() {
                if top.right < node.left {
                    stack.pop();
                } else {
                    break;
                }
            }
            match stack.last() {
                Some(parent) => {
                    if node.right >= parent.right {
                        return Err(Error::InconsistentState(format!(
                            "node {} partially overlaps node {}",
                            node.id, parent.id
                        )));
                    }
                    if node.level != parent.level + 1 {
                        return Err(Error::InconsistentState(format!(
                            "node {} level {} under parent level {}",
                            node.id, node.level, parent.level
                        )));
                    }
                    if config.tracks_paths() {
                        check_path(node, parent.path.as_deref().unwrap_or(""))?;
                    }
                }
                None => {
                    if node.left != 1 {
                        return Err(Error::InconsistentState(format!(
                            "second top-level node {} in one tree",
                            node.id
                        )));
                    }
                    if config.tracks_paths() {
                        check_path(node, "")?;
                    }
                }
            }
            let descendants = nodes
                .iter()
                .filter(|d| d.left > node.left && d.right < node.right)
                .count() as i64;
            if (node.right - node.left - 1) / 2 != descendants {
                return Err(Error::InconsistentState(format!(
                    "node {} width does not match {} descendants",
                    node.id, descendants
                )));
            }
            stack.push(node);
        }
    }

    if config.unique_names() {
        let mut seen = HashMap::new();
        for row in rows {
            if let Some(path) = &row.path {
                // Roots are siblings of each other across every tree.
                let scope = if config.multiple_roots && row.left != 1 {
                    row.root
                } else {
                    None
                };
                if let Some(other) = seen.insert((scope, path.clone()), row.id) {
                    return Err(Error::InconsistentState(format!(
                        "nodes {other} and {} share path {path}",
                        row.id
                    )));
                }
            }
        }
    }
    Ok(())
}

fn check_path(node: &NodeRow, parent: &str) -> Result<()> {
    let name = node.name.as_deref().unwrap_or("");
    let expected = format!("{parent}/{name}");
    if node.path.as_deref() != Some(expected.as_str()) {
        return Err(Error::InconsistentState(format!(
            "node {} path {:?}, expected {expected}",
            node.id, node.path
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: i64, left: i64, right: i64, level: i64) -> NodeRow {
        NodeRow {
            id: NodeId(id),
            left,
            right,
            level,
            root: None,
            name: None,
            path: None,
        }
    }

    #[test]
    fn derived_predicates() {
        let root = TreeNode::from(row(1, 1, 6, 1));
        let child = TreeNode::from(row(2, 2, 3, 2));
        assert!(root.is_root());
        assert!(!root.is_leaf());
        assert!(child.is_leaf());
        assert!(child.is_descendant_of(&root, false));
        assert!(child.is_child_of(&root, false));
        assert!(!root.is_descendant_of(&child, false));
        assert_eq!(root.descendant_count(), 2);
    }

    #[test]
    fn descendant_check_respects_root_in_multi_mode() {
        let mut a = TreeNode::from(row(1, 1, 4, 1));
        a.root = Some(NodeId(1));
        let mut b = TreeNode::from(row(5, 2, 3, 2));
        b.root = Some(NodeId(7));
        assert!(b.is_descendant_of(&a, false));
        assert!(!b.is_descendant_of(&a, true));
    }

    #[test]
    fn parent_path_strips_last_segment() {
        assert_eq!(parent_path("/a/b/c"), "/a/b");
        assert_eq!(parent_path("/a"), "");
        assert_eq!(parent_path(""), "");
    }

    #[test]
    fn validate_accepts_well_formed_tree() {
        let rows = vec![row(1, 1, 6, 1), row(2, 2, 3, 2), row(3, 4, 5, 2)];
        validate_rows(&rows, &TreeConfig::new("t")).unwrap();
    }

    #[test]
    fn validate_rejects_roots_sharing_a_path() {
        let config = TreeConfig::new("t").with_multiple_roots(true).with_paths(true);
        let named = |id: i64, name: &str| NodeRow {
            root: Some(NodeId(id)),
            name: Some(name.to_string()),
            path: Some(format!("/{name}")),
            ..row(id, 1, 2, 1)
        };
        validate_rows(&[named(1, "a"), named(2, "b")], &config).unwrap();
        assert!(validate_rows(&[named(1, "b"), named(2, "b")], &config).is_err());
    }

    #[test]
    fn validate_rejects_partial_overlap() {
        let rows = vec![row(1, 1, 8, 1), row(2, 2, 5, 2), row(3, 4, 7, 2), row(4, 3, 6, 3)];
        assert!(validate_rows(&rows, &TreeConfig::new("t")).is_err());
    }

    #[test]
    fn validate_rejects_wrong_level() {
        let rows = vec![row(1, 1, 4, 1), row(2, 2, 3, 3)];
        assert!(matches!(
            validate_rows(&rows, &TreeConfig::new("t")),
            Err(Error::InconsistentState(_))
        ));
    }
}
