use thiserror::Error;

use crate::hooks::HookPoint;
use crate::ids::NodeId;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("storage error: {0}")]
    Storage(String),
    /// New node where a persisted one is required (or the reverse), or a deleted node.
    #[error("illegal state: {0}")]
    IllegalState(String),
    /// Placement that would break the tree shape: self-target, cycles, siblings of a root.
    #[error("illegal topology: {0}")]
    IllegalTopology(String),
    #[error("duplicate path: {0}")]
    DuplicatePath(String),
    /// Generic persistence used on a tree row without going through a tree operation.
    #[error("contract violation: {0}")]
    ContractViolation(String),
    #[error("hook {0} rejected the operation")]
    HookRejected(HookPoint),
    #[error("delete refused for nodes {0:?}")]
    DeleteRefused(Vec<NodeId>),
    #[error("inconsistent state: {0}")]
    InconsistentState(String),
}
