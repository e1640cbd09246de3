use crate::config::TreeConfig;
use crate::expr::{Column, Condition, Direction, Select};
use crate::ids::NodeId;
use crate::model::{NodeHandle, TreeNode};

/// Result of executing a `TreeQuery`: handles, or bare identifiers for `ids_only` queries.
#[derive(Clone, Debug)]
pub enum QueryOutput {
    Nodes(Vec<NodeHandle>),
    Ids(Vec<NodeId>),
}

impl QueryOutput {
    pub fn ids(&self) -> Vec<NodeId> {
        match self {
            QueryOutput::Nodes(nodes) => nodes.iter().filter_map(NodeHandle::id).collect(),
            QueryOutput::Ids(ids) => ids.clone(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            QueryOutput::Nodes(nodes) => nodes.len(),
            QueryOutput::Ids(ids) => ids.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lazy traversal descriptor. Nothing is read until the engine executes it, and executing the
/// same descriptor again reads current data.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TreeQuery {
    select: Select,
    ids_only: bool,
}

fn root_scope(node: &TreeNode, config: &TreeConfig) -> Option<Condition> {
    if !config.multiple_roots {
        return None;
    }
    node.root.map(|r| Condition::eq(Column::Root, r))
}

impl TreeQuery {
    pub fn from_select(select: Select) -> Self {
        Self {
            select,
            ids_only: false,
        }
    }

    /// Rows strictly inside the node's interval, by `(level, left)`.
    /// `depth` bounds how many levels below the node are included.
    pub fn descendants(node: &TreeNode, config: &TreeConfig, depth: Option<i64>) -> Self {
        let mut filter = Condition::gt(Column::Left, node.left).and(Condition::lt(Column::Right, node.right));
        if let Some(depth) = depth {
            filter = filter.and(Condition::le(Column::Level, node.level + depth));
        }
        let filter = filter.and_maybe(root_scope(node, config));
        Self::from_select(
            Select::new(filter)
                .order_by(Column::Level, Direction::Asc)
                .order_by(Column::Left, Direction::Asc),
        )
    }

    /// Direct children, ordered left to right.
    pub fn children(node: &TreeNode, config: &TreeConfig) -> Self {
        Self::descendants(node, config, Some(1))
    }

    /// Rows whose interval strictly contains the node's. Nearest first, or root first when
    /// `reverse` is set.
    pub fn ancestors(node: &TreeNode, config: &TreeConfig, depth: Option<i64>, reverse: bool) -> Self {
        let mut filter = Condition::lt(Column::Left, node.left).and(Condition::gt(Column::Right, node.right));
        if let Some(depth) = depth {
            filter = filter.and(Condition::ge(Column::Level, node.level - depth));
        }
        let filter = filter.and_maybe(root_scope(node, config));
        let level_dir = if reverse {
            Direction::Asc
        } else {
            Direction::Desc
        };
        Self::from_select(
            Select::new(filter)
                .order_by(Column::Level, level_dir)
                .order_by(Column::Left, Direction::Asc),
        )
    }

    pub fn parent(node: &TreeNode, config: &TreeConfig) -> Self {
        Self::ancestors(node, config, Some(1), false).limit(1)
    }

    pub fn prev_sibling(node: &TreeNode, config: &TreeConfig) -> Self {
        let filter = Condition::eq(Column::Right, node.left - 1).and_maybe(root_scope(node, config));
        Self::from_select(Select::new(filter)).limit(1)
    }

    pub fn next_sibling(node: &TreeNode, config: &TreeConfig) -> Self {
        let filter = Condition::eq(Column::Left, node.right + 1).and_maybe(root_scope(node, config));
        Self::from_select(Select::new(filter)).limit(1)
    }

    /// Every tree root in the table.
    pub fn roots(config: &TreeConfig) -> Self {
        let order = if config.multiple_roots {
            Column::Root
        } else {
            Column::Id
        };
        Self::from_select(Select::new(Condition::eq(Column::Left, 1)).order_by(order, Direction::Asc))
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.select.limit = Some(limit);
        self
    }

    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.select.limit = limit;
        self
    }

    /// Only identifiers are wanted; the engine returns ids instead of handles.
    pub fn ids_only(mut self) -> Self {
        self.ids_only = true;
        self
    }

    pub fn is_ids_only(&self) -> bool {
        self.ids_only
    }

    pub fn select(&self) -> &Select {
        &self.select
    }
}
