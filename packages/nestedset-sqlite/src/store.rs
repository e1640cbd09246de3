use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, Row};
use tracing::trace;

use nestedset_core::{
    render_delete, render_insert, render_select, render_update, Assignment, Column, Condition,
    Error, NewRow, NodeId, NodeRow, Rendered, Result, RowStore, Select, SqlDialect, TreeConfig,
    Value,
};

use crate::schema::ensure_schema;

fn storage_err(e: rusqlite::Error) -> Error {
    Error::Storage(e.to_string())
}

fn bind(params: &[Value]) -> impl Iterator<Item = SqlValue> + '_ {
    params.iter().map(|v| match v {
        Value::Int(i) => SqlValue::Integer(*i),
        Value::Text(s) => SqlValue::Text(s.clone()),
    })
}

fn decode_row(row: &Row<'_>, columns: &[Column]) -> rusqlite::Result<NodeRow> {
    let mut out = NodeRow {
        id: NodeId(0),
        left: 0,
        right: 0,
        level: 0,
        root: None,
        name: None,
        path: None,
    };
    for (idx, column) in columns.iter().enumerate() {
        match column {
            Column::Id => out.id = NodeId(row.get(idx)?),
            Column::Left => out.left = row.get(idx)?,
            Column::Right => out.right = row.get(idx)?,
            Column::Level => out.level = row.get(idx)?,
            Column::Root => out.root = row.get::<_, Option<i64>>(idx)?.map(NodeId),
            Column::Name => out.name = row.get(idx)?,
            Column::Path => out.path = row.get(idx)?,
        }
    }
    Ok(out)
}

/// SQLite-backed `RowStore` over one hierarchy table.
pub struct SqliteRowStore {
    conn: Connection,
    config: TreeConfig,
}

impl SqliteRowStore {
    pub fn new_in_memory(config: TreeConfig) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(storage_err)?;
        Self::from_connection(conn, config)
    }

    pub fn new(path: &str, config: TreeConfig) -> Result<Self> {
        let conn = Connection::open(path).map_err(storage_err)?;
        Self::from_connection(conn, config)
    }

    /// Wraps an open connection; the table is created if missing. Statements always use the
    /// SQLite dialect regardless of the dialect in `config`.
    pub fn from_connection(conn: Connection, config: TreeConfig) -> Result<Self> {
        let config = config.with_dialect(SqlDialect::SQLITE);
        ensure_schema(&conn, &config)?;
        Ok(Self { conn, config })
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn execute(&self, rendered: &Rendered) -> Result<u64> {
        trace!(sql = %rendered.sql, params = rendered.params.len(), "sqlite execute");
        let affected = self
            .conn
            .execute(&rendered.sql, params_from_iter(bind(&rendered.params)))
            .map_err(storage_err)?;
        Ok(affected as u64)
    }
}

impl RowStore for SqliteRowStore {
    fn begin(&mut self) -> Result<()> {
        self.conn.execute_batch("BEGIN").map_err(storage_err)
    }

    fn commit(&mut self) -> Result<()> {
        self.conn.execute_batch("COMMIT").map_err(storage_err)
    }

    fn rollback(&mut self) -> Result<()> {
        self.conn.execute_batch("ROLLBACK").map_err(storage_err)
    }

    fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    fn insert_row(&mut self, row: &NewRow) -> Result<NodeId> {
        let rendered = render_insert(&self.config, row);
        self.execute(&rendered)?;
        Ok(NodeId(self.conn.last_insert_rowid()))
    }

    fn update_rows(&mut self, set: &[Assignment], filter: &Condition) -> Result<u64> {
        self.execute(&render_update(&self.config, set, filter))
    }

    fn delete_rows(&mut self, filter: &Condition) -> Result<u64> {
        self.execute(&render_delete(&self.config, filter))
    }

    fn select_rows(&self, select: &Select) -> Result<Vec<NodeRow>> {
        let rendered = render_select(&self.config, select);
        trace!(sql = %rendered.sql, params = rendered.params.len(), "sqlite select");
        let columns = self.config.columns_in_use();
        let mut stmt = self.conn.prepare(&rendered.sql).map_err(storage_err)?;
        let rows = stmt
            .query_map(params_from_iter(bind(&rendered.params)), |row| {
                decode_row(row, &columns)
            })
            .map_err(storage_err)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(storage_err)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nestedset_core::Direction;

    fn row(left: i64, right: i64) -> NewRow {
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
    fn rollback_discards_rows() {
        let mut store = SqliteRowStore::new_in_memory(TreeConfig::new("t")).unwrap();
        store.insert_row(&row(1, 2)).unwrap();
        store.begin().unwrap();
        assert!(store.in_transaction());
        store.insert_row(&row(3, 4)).unwrap();
        store.rollback().unwrap();
        assert!(!store.in_transaction());
        let rows = store.select_rows(&Select::new(Condition::All)).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn shift_updates_report_affected_rows() {
        let mut store = SqliteRowStore::new_in_memory(TreeConfig::new("t")).unwrap();
        store.insert_row(&row(1, 6)).unwrap();
        store.insert_row(&row(2, 3)).unwrap();
        store.insert_row(&row(4, 5)).unwrap();
        let n = store
            .update_rows(
                &[Assignment::shift(Column::Right, 2)],
                &Condition::ge(Column::Right, 5),
            )
            .unwrap();
        assert_eq!(n, 2);
        let rights: Vec<i64> = store
            .select_rows(&Select::new(Condition::All).order_by(Column::Left, Direction::Asc))
            .unwrap()
            .iter()
            .map(|r| r.right)
            .collect();
        assert_eq!(rights, vec![8, 3, 7]);
    }

    #[test]
    fn path_prefix_rewrite_runs_in_sql() {
        let config = TreeConfig::new("folder").with_paths(true);
        let mut store = SqliteRowStore::new_in_memory(config).unwrap();
        let mut r = row(1, 2);
        r.name = Some("child".into());
        r.path = Some("/old/child".into());
        store.insert_row(&r).unwrap();
        store
            .update_rows(
                &[Assignment::ReplacePathPrefix {
                    old_prefix: "/old".into(),
                    new_prefix: "/brand/new".into(),
                }],
                &Condition::All,
            )
            .unwrap();
        let rows = store.select_rows(&Select::new(Condition::All)).unwrap();
        assert_eq!(rows[0].path.as_deref(), Some("/brand/new/child"));
        assert_eq!(rows[0].name.as_deref(), Some("child"));
    }
}
