use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::expr::{Assignment, Condition, Select};
use crate::ids::NodeId;
use crate::model::{NewRow, NodeRow};

/// Transactional access to the rows of one hierarchy table.
///
/// The engine is the only caller that changes structural columns; it expresses every change as
/// a bulk update or delete over a condition so the store never sees per-row application logic.
pub trait RowStore {
    fn begin(&mut self) -> Result<()>;
    fn commit(&mut self) -> Result<()>;
    fn rollback(&mut self) -> Result<()>;
    fn in_transaction(&self) -> bool;

    /// Inserts a row and returns the id assigned by the store.
    fn insert_row(&mut self, row: &NewRow) -> Result<NodeId>;
    /// Applies `set` to every row matching `filter`; returns the affected row count.
    fn update_rows(&mut self, set: &[Assignment], filter: &Condition) -> Result<u64>;
    fn delete_rows(&mut self, filter: &Condition) -> Result<u64>;
    fn select_rows(&self, select: &Select) -> Result<Vec<NodeRow>>;
}

/// In-memory row store for tests and prototyping. Transactions snapshot the whole table.
#[derive(Default)]
pub struct MemoryRowStore {
    rows: BTreeMap<NodeId, NodeRow>,
    next_id: i64,
    snapshot: Option<(BTreeMap<NodeId, NodeRow>, i64)>,
}

impl MemoryRowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> Vec<NodeRow> {
        self.rows.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl RowStore for MemoryRowStore {
    fn begin(&mut self) -> Result<()> {
        if self.snapshot.is_some() {
            return Err(Error::Storage("transaction already open".into()));
        }
        self.snapshot = Some((self.rows.clone(), self.next_id));
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.snapshot
            .take()
            .map(|_| ())
            .ok_or_else(|| Error::Storage("no open transaction".into()))
    }

    fn rollback(&mut self) -> Result<()> {
        let (rows, next_id) = self
            .snapshot
            .take()
            .ok_or_else(|| Error::Storage("no open transaction".into()))?;
        self.rows = rows;
        self.next_id = next_id;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.snapshot.is_some()
    }

    fn insert_row(&mut self, row: &NewRow) -> Result<NodeId> {
        self.next_id += 1;
        let id = NodeId(self.next_id);
        self.rows.insert(id, row.clone().with_id(id));
        Ok(id)
    }

    fn update_rows(&mut self, set: &[Assignment], filter: &Condition) -> Result<u64> {
        let mut affected = 0;
        for row in self.rows.values_mut().filter(|r| filter.matches(&**r)) {
            for a in set {
                a.apply(&mut *row);
            }
            affected += 1;
        }
        Ok(affected)
    }

    fn delete_rows(&mut self, filter: &Condition) -> Result<u64> {
        let before = self.rows.len();
        self.rows.retain(|_, r| !filter.matches(&*r));
        Ok((before - self.rows.len()) as u64)
    }

    fn select_rows(&self, select: &Select) -> Result<Vec<NodeRow>> {
        let mut out: Vec<NodeRow> = self
            .rows
            .values()
            .filter(|r| select.filter.matches(*r))
            .cloned()
            .collect();
        out.sort_by(|a, b| select.compare(a, b));
        if let Some(limit) = select.limit {
            out.truncate(limit);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Column;

    fn new_row(left: i64, right: i64) -> NewRow {
        NewRow {
            left,
            right,
            level: 1,
            root: None,
            name: None,
            path: None,
        }
    }

    #[test]
    fn rollback_restores_rows_and_id_sequence() {
        let mut store = MemoryRowStore::new();
        let first = store.insert_row(&new_row(1, 2)).unwrap();
        store.begin().unwrap();
        store.insert_row(&new_row(3, 4)).unwrap();
        store
            .update_rows(&[Assignment::shift(Column::Right, 10)], &Condition::All)
            .unwrap();
        store.rollback().unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.rows()[0].right, 2);
        let next = store.insert_row(&new_row(3, 4)).unwrap();
        assert_eq!(next, NodeId(first.0 + 1));
    }

    #[test]
    fn nested_begin_is_rejected() {
        let mut store = MemoryRowStore::new();
        store.begin().unwrap();
        assert!(store.begin().is_err());
        store.commit().unwrap();
        assert!(store.commit().is_err());
    }

    #[test]
    fn delete_reports_affected_rows() {
        let mut store = MemoryRowStore::new();
        store.insert_row(&new_row(1, 2)).unwrap();
        store.insert_row(&new_row(3, 4)).unwrap();
        let n = store.delete_rows(&Condition::ge(Column::Left, 3)).unwrap();
        assert_eq!(n, 1);
        assert_eq!(store.len(), 1);
    }
}
