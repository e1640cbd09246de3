use crate::model::TreeNode;

/// Extension points around tree mutations.
///
/// Every method has a permissive default. A `before_*` hook returning `false` aborts the
/// operation before anything is written; an `after_*` hook returning `false` rolls the whole
/// transaction back and surfaces `Error::HookRejected`.
pub trait TreeHooks {
    /// Attribute validation run before any mutation. `false` makes the operation return
    /// `Ok(false)` instead of raising.
    fn validate(&mut self, _node: &TreeNode) -> bool {
        true
    }

    /// `parent` is `None` when the node becomes a root.
    fn before_add(&mut self, _node: &TreeNode, _parent: Option<&TreeNode>) -> bool {
        true
    }

    fn after_add(&mut self, _node: &TreeNode) -> bool {
        true
    }

    fn before_rename(&mut self, _node: &TreeNode, _new_name: &str) -> bool {
        true
    }

    fn after_rename(&mut self, _node: &TreeNode, _old_name: Option<&str>) -> bool {
        true
    }

    /// `target` is `None` for a move to a new root.
    fn before_move(&mut self, _node: &TreeNode, _target: Option<&TreeNode>) -> bool {
        true
    }

    fn after_move(&mut self, _node: &TreeNode) -> bool {
        true
    }

    fn before_delete(&mut self, _node: &TreeNode) -> bool {
        true
    }

    fn after_delete(&mut self, _node: &TreeNode) -> bool {
        true
    }
}

/// Hook set that accepts everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoHooks;

impl TreeHooks for NoHooks {}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HookPoint {
    AfterAdd,
    AfterRename,
    AfterMove,
    AfterDelete,
}

impl std::fmt::Display for HookPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            HookPoint::AfterAdd => "after_add",
            HookPoint::AfterRename => "after_rename",
            HookPoint::AfterMove => "after_move",
            HookPoint::AfterDelete => "after_delete",
        };
        f.write_str(name)
    }
}
