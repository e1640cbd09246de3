//! Column expressions shared by storage, the in-memory store and the consistency cache.
//!
//! Every structural change the engine makes is expressed as a list of `Assignment`s applied to
//! the rows matching a `Condition`. The same values are rendered to SQL by the backends and
//! evaluated in memory by `MemoryRowStore` and `NodeRegistry`, so both sides see one arithmetic.

use std::cmp::Ordering;

use crate::ids::NodeId;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Logical tree column. Physical names come from `ColumnNames`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Column {
    Id,
    Left,
    Right,
    Level,
    Root,
    Name,
    Path,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Value {
    Int(i64),
    Text(String),
}

impl Value {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            Value::Int(_) => None,
        }
    }

    fn partial_cmp_value(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<NodeId> for Value {
    fn from(v: NodeId) -> Self {
        Value::Int(v.0)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

/// Read/write access to the tree columns of a row-like value.
/// Absent columns read as `None`, matching SQL `NULL` semantics in comparisons.
pub trait RowFields {
    fn get(&self, column: Column) -> Option<Value>;
    fn set(&mut self, column: Column, value: Value);
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    pub fn sql(self) -> &'static str {
        match self {
            CmpOp::Eq => "=",
            CmpOp::Ne => "<>",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }

    fn holds(self, ord: Ordering) -> bool {
        match self {
            CmpOp::Eq => ord == Ordering::Equal,
            CmpOp::Ne => ord != Ordering::Equal,
            CmpOp::Lt => ord == Ordering::Less,
            CmpOp::Le => ord != Ordering::Greater,
            CmpOp::Gt => ord == Ordering::Greater,
            CmpOp::Ge => ord != Ordering::Less,
        }
    }
}

/// Row filter. `All` matches every row; `And` with no terms is equivalent to `All`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Condition {
    All,
    Cmp {
        column: Column,
        op: CmpOp,
        value: Value,
    },
    And(Vec<Condition>),
}

impl Condition {
    pub fn cmp(column: Column, op: CmpOp, value: impl Into<Value>) -> Self {
        Condition::Cmp {
            column,
            op,
            value: value.into(),
        }
    }

    pub fn eq(column: Column, value: impl Into<Value>) -> Self {
        Self::cmp(column, CmpOp::Eq, value)
    }

    pub fn ne(column: Column, value: impl Into<Value>) -> Self {
        Self::cmp(column, CmpOp::Ne, value)
    }

    pub fn lt(column: Column, value: impl Into<Value>) -> Self {
        Self::cmp(column, CmpOp::Lt, value)
    }

    pub fn le(column: Column, value: impl Into<Value>) -> Self {
        Self::cmp(column, CmpOp::Le, value)
    }

    pub fn gt(column: Column, value: impl Into<Value>) -> Self {
        Self::cmp(column, CmpOp::Gt, value)
    }

    pub fn ge(column: Column, value: impl Into<Value>) -> Self {
        Self::cmp(column, CmpOp::Ge, value)
    }

    /// Conjunction that flattens nested `And`s and drops `All`.
    pub fn and(self, other: Condition) -> Self {
        let mut terms = Vec::new();
        for c in [self, other] {
            match c {
                Condition::All => {}
                Condition::And(inner) => terms.extend(inner),
                other => terms.push(other),
            }
        }
        match terms.len() {
            0 => Condition::All,
            1 => terms.remove(0),
            _ => Condition::And(terms),
        }
    }

    /// Appends `other` only when present; used for the optional `root` scope.
    pub fn and_maybe(self, other: Option<Condition>) -> Self {
        match other {
            Some(c) => self.and(c),
            None => self,
        }
    }

    pub fn matches<R: RowFields + ?Sized>(&self, row: &R) -> bool {
        match self {
            Condition::All => true,
            Condition::Cmp { column, op, value } => row
                .get(*column)
                .and_then(|actual| actual.partial_cmp_value(value))
                .map(|ord| op.holds(ord))
                .unwrap_or(false),
            Condition::And(terms) => terms.iter().all(|t| t.matches(row)),
        }
    }
}

/// Column update applied to each matching row.
///
/// Assignments within one update must target distinct columns: SQL evaluates every right-hand
/// side against the old row, the in-memory evaluator applies them in order.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Assignment {
    /// `column = column + delta`
    Shift { column: Column, delta: i64 },
    /// `column = value`
    Set { column: Column, value: Value },
    /// `path = new_prefix || substring(path, len(old_prefix) + 1)`
    ReplacePathPrefix {
        old_prefix: String,
        new_prefix: String,
    },
}

impl Assignment {
    pub fn shift(column: Column, delta: i64) -> Self {
        Assignment::Shift { column, delta }
    }

    pub fn set(column: Column, value: impl Into<Value>) -> Self {
        Assignment::Set {
            column,
            value: value.into(),
        }
    }

    pub fn column(&self) -> Column {
        match self {
            Assignment::Shift { column, .. } | Assignment::Set { column, .. } => *column,
            Assignment::ReplacePathPrefix { .. } => Column::Path,
        }
    }

    pub fn apply<R: RowFields + ?Sized>(&self, row: &mut R) {
        match self {
            Assignment::Shift { column, delta } => {
                if let Some(Value::Int(v)) = row.get(*column) {
                    row.set(*column, Value::Int(v + delta));
                }
            }
            Assignment::Set { column, value } => row.set(*column, value.clone()),
            Assignment::ReplacePathPrefix {
                old_prefix,
                new_prefix,
            } => {
                if let Some(Value::Text(path)) = row.get(Column::Path) {
                    let tail: String = path.chars().skip(old_prefix.chars().count()).collect();
                    row.set(Column::Path, Value::Text(format!("{new_prefix}{tail}")));
                }
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Direction {
    Asc,
    Desc,
}

/// Filtered, ordered row-set query.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Select {
    pub filter: Condition,
    pub order: Vec<(Column, Direction)>,
    pub limit: Option<usize>,
}

impl Select {
    pub fn new(filter: Condition) -> Self {
        Self {
            filter,
            order: Vec::new(),
            limit: None,
        }
    }

    pub fn order_by(mut self, column: Column, direction: Direction) -> Self {
        self.order.push((column, direction));
        self
    }

    pub fn limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// Orders two rows by this query's `ORDER BY` list, falling back to id.
    pub fn compare<R: RowFields>(&self, a: &R, b: &R) -> Ordering {
        for (column, direction) in &self.order {
            let ord = match (a.get(*column), b.get(*column)) {
                (Some(x), Some(y)) => x.partial_cmp_value(&y).unwrap_or(Ordering::Equal),
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            let ord = match direction {
                Direction::Asc => ord,
                Direction::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        let ids = (a.get(Column::Id), b.get(Column::Id));
        match ids {
            (Some(x), Some(y)) => x.partial_cmp_value(&y).unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NodeRow;

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
    fn and_flattens_and_drops_all() {
        let c = Condition::All
            .and(Condition::gt(Column::Left, 1))
            .and(Condition::lt(Column::Right, 9).and(Condition::eq(Column::Root, 3)));
        match c {
            Condition::And(terms) => assert_eq!(terms.len(), 3),
            other => panic!("expected conjunction, got {other:?}"),
        }
        assert_eq!(Condition::All.and(Condition::All), Condition::All);
    }

    #[test]
    fn missing_column_never_matches() {
        let r = row(1, 1, 2, 1);
        assert!(!Condition::eq(Column::Root, 1).matches(&r));
        assert!(!Condition::ne(Column::Root, 1).matches(&r));
        assert!(Condition::ge(Column::Left, 1).matches(&r));
    }

    #[test]
    fn shift_and_prefix_rewrite() {
        let mut r = row(1, 4, 7, 2);
        r.path = Some("/a/b/c".into());
        Assignment::shift(Column::Left, -2).apply(&mut r);
        Assignment::ReplacePathPrefix {
            old_prefix: "/a/b".into(),
            new_prefix: "/x".into(),
        }
        .apply(&mut r);
        assert_eq!(r.left, 2);
        assert_eq!(r.path.as_deref(), Some("/x/c"));
    }

    #[test]
    fn prefix_rewrite_counts_characters() {
        let mut r = row(1, 1, 2, 1);
        r.path = Some("/ü/tail".into());
        Assignment::ReplacePathPrefix {
            old_prefix: "/ü".into(),
            new_prefix: "/root".into(),
        }
        .apply(&mut r);
        assert_eq!(r.path.as_deref(), Some("/root/tail"));
    }

    #[test]
    fn select_orders_by_level_then_left() {
        let select = Select::new(Condition::All)
            .order_by(Column::Level, Direction::Asc)
            .order_by(Column::Left, Direction::Asc);
        let mut rows = vec![row(3, 5, 6, 3), row(2, 2, 3, 2), row(4, 7, 8, 2)];
        rows.sort_by(|a, b| select.compare(a, b));
        let ids: Vec<i64> = rows.iter().map(|r| r.id.0).collect();
        assert_eq!(ids, vec![2, 4, 3]);
    }
}
