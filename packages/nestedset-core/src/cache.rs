//! Consistency cache: keeps loaded node handles in step with committed tree changes.
//!
//! The registry is owned by the caller (typically one per unit of work) and shared with the
//! engine. It holds weak references only; a dropped handle simply stops being corrected.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::expr::{Assignment, Condition};
use crate::ids::TypeTag;
use crate::model::{NodeHandle, TreeNode};

/// Opaque registration returned by `NodeRegistry::register`.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Slot {
    tag: TypeTag,
    index: usize,
}

/// One bulk change as it was sent to storage.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Delta {
    Update {
        set: Vec<Assignment>,
        filter: Condition,
    },
    Delete {
        filter: Condition,
    },
}

#[derive(Default)]
struct Arena {
    slots: Vec<Option<Weak<RefCell<TreeNode>>>>,
    free: Vec<usize>,
}

impl Arena {
    fn find(&self, cell: &Rc<RefCell<TreeNode>>) -> Option<usize> {
        self.slots.iter().position(|s| {
            s.as_ref()
                .map(|w| std::ptr::eq(w.as_ptr(), Rc::as_ptr(cell)))
                .unwrap_or(false)
        })
    }
}

#[derive(Default)]
pub struct NodeRegistry {
    arenas: HashMap<TypeTag, Arena>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared registry ready to hand to one or more engines.
    pub fn shared() -> Rc<RefCell<NodeRegistry>> {
        Rc::new(RefCell::new(Self::new()))
    }

    /// Registers `handle` under `tag`. Registering the same handle twice returns the same slot.
    pub fn register(&mut self, tag: &TypeTag, handle: &NodeHandle) -> Slot {
        let arena = self.arenas.entry(tag.clone()).or_default();
        if let Some(index) = arena.find(handle.cell()) {
            return Slot {
                tag: tag.clone(),
                index,
            };
        }
        let weak = Some(Rc::downgrade(handle.cell()));
        let index = match arena.free.pop() {
            Some(index) => {
                arena.slots[index] = weak;
                index
            }
            None => {
                arena.slots.push(weak);
                arena.slots.len() - 1
            }
        };
        Slot {
            tag: tag.clone(),
            index,
        }
    }

    /// Returns `true` if the slot was occupied.
    pub fn unregister(&mut self, slot: &Slot) -> bool {
        let Some(arena) = self.arenas.get_mut(&slot.tag) else {
            return false;
        };
        match arena.slots.get_mut(slot.index) {
            Some(entry @ Some(_)) => {
                *entry = None;
                arena.free.push(slot.index);
                true
            }
            _ => false,
        }
    }

    pub fn is_registered(&self, tag: &TypeTag, handle: &NodeHandle) -> bool {
        self.arenas
            .get(tag)
            .and_then(|a| a.find(handle.cell()))
            .is_some()
    }

    /// Live handles registered under `tag`.
    pub fn live(&self, tag: &TypeTag) -> Vec<NodeHandle> {
        self.arenas
            .get(tag)
            .map(|a| {
                a.slots
                    .iter()
                    .flatten()
                    .filter_map(Weak::upgrade)
                    .map(NodeHandle::from_cell)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Frees slots whose handles were dropped; returns how many were released.
    pub fn prune(&mut self) -> usize {
        let mut released = 0;
        for arena in self.arenas.values_mut() {
            for (index, slot) in arena.slots.iter_mut().enumerate() {
                if slot.as_ref().map(|w| w.strong_count() == 0).unwrap_or(false) {
                    *slot = None;
                    arena.free.push(index);
                    released += 1;
                }
            }
        }
        released
    }

    pub fn len(&self, tag: &TypeTag) -> usize {
        self.arenas
            .get(tag)
            .map(|a| a.slots.iter().flatten().filter(|w| w.strong_count() > 0).count())
            .unwrap_or(0)
    }

    pub fn clear(&mut self) {
        self.arenas.clear();
    }

    /// Live handles of `tag` plus `extra`, without new or deleted instances.
    pub fn targets(&self, tag: &TypeTag, extra: &[NodeHandle]) -> Vec<NodeHandle> {
        let mut targets = self.live(tag);
        for handle in extra {
            if !targets.iter().any(|t| t.ptr_eq(handle)) {
                targets.push(handle.clone());
            }
        }
        targets.retain(|h| {
            let n = h.borrow();
            !n.is_new() && !n.deleted
        });
        targets
    }

    /// Applies committed deltas, in order, to every live handle of `tag` plus `extra`.
    pub fn replay(&self, tag: &TypeTag, extra: &[NodeHandle], deltas: &[Delta]) {
        let targets = self.targets(tag, extra);
        for delta in deltas {
            Self::apply(&targets, delta);
        }
    }

    /// Applies one delta to each handle whose current fields match its filter.
    pub fn apply(targets: &[NodeHandle], delta: &Delta) {
        for handle in targets {
            handle.update(|node| {
                if node.deleted {
                    return;
                }
                match delta {
                    Delta::Update { set, filter } => {
                        if filter.matches(&*node) {
                            for a in set {
                                a.apply(&mut *node);
                            }
                        }
                    }
                    Delta::Delete { filter } => {
                        if filter.matches(&*node) {
                            node.deleted = true;
                        }
                    }
                }
            });
        }
    }
}
