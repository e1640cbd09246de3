use std::rc::Rc;

use postgres::types::ToSql;
use postgres::Row;
use tracing::trace;

use nestedset_core::{
    render_delete, render_insert, render_select, render_update, Assignment, Column, Condition,
    Error, NewRow, NodeId, NodeRow, Rendered, Result, RowStore, Select, SqlDialect, TreeConfig,
    Value,
};

use crate::connection::PgConnection;
use crate::schema::ensure_schema;

fn storage_debug<E: std::fmt::Debug>(e: E) -> Error {
    Error::Storage(format!("{e:?}"))
}

fn boxed_params(params: &[Value]) -> Vec<Box<dyn ToSql + Sync>> {
    params
        .iter()
        .map(|v| -> Box<dyn ToSql + Sync> {
            match v {
                Value::Int(i) => Box::new(*i),
                Value::Text(s) => Box::new(s.clone()),
            }
        })
        .collect()
}

fn decode_row(row: &Row, columns: &[Column]) -> Result<NodeRow> {
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
            Column::Id => out.id = NodeId(row.try_get(idx).map_err(storage_debug)?),
            Column::Left => out.left = row.try_get(idx).map_err(storage_debug)?,
            Column::Right => out.right = row.try_get(idx).map_err(storage_debug)?,
            Column::Level => out.level = row.try_get(idx).map_err(storage_debug)?,
            Column::Root => {
                out.root = row
                    .try_get::<_, Option<i64>>(idx)
                    .map_err(storage_debug)?
                    .map(NodeId)
            }
            Column::Name => out.name = row.try_get(idx).map_err(storage_debug)?,
            Column::Path => out.path = row.try_get(idx).map_err(storage_debug)?,
        }
    }
    Ok(out)
}

/// PostgreSQL-backed `RowStore` over one hierarchy table. The connection is shared so several
/// tables (and the caller) can work inside the same transaction.
pub struct PostgresRowStore {
    conn: Rc<PgConnection>,
    config: TreeConfig,
}

impl PostgresRowStore {
    /// Statements always use the PostgreSQL dialect regardless of the dialect in `config`.
    pub fn new(conn: Rc<PgConnection>, config: TreeConfig) -> Result<Self> {
        let config = config.with_dialect(SqlDialect::POSTGRES);
        ensure_schema(&mut conn.client(), &config)?;
        Ok(Self { conn, config })
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    pub fn connection(&self) -> Rc<PgConnection> {
        self.conn.clone()
    }

    fn execute(&self, rendered: &Rendered) -> Result<u64> {
        trace!(sql = %rendered.sql, params = rendered.params.len(), "postgres execute");
        let params = boxed_params(&rendered.params);
        let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| p.as_ref()).collect();
        let mut c = self.conn.client();
        c.execute(rendered.sql.as_str(), &refs).map_err(storage_debug)
    }
}

impl RowStore for PostgresRowStore {
    fn begin(&mut self) -> Result<()> {
        self.conn.begin()
    }

    fn commit(&mut self) -> Result<()> {
        self.conn.commit()
    }

    fn rollback(&mut self) -> Result<()> {
        self.conn.rollback()
    }

    fn in_transaction(&self) -> bool {
        self.conn.in_transaction()
    }

    fn insert_row(&mut self, row: &NewRow) -> Result<NodeId> {
        let rendered = render_insert(&self.config, row);
        trace!(sql = %rendered.sql, "postgres insert");
        let params = boxed_params(&rendered.params);
        let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| p.as_ref()).collect();
        let mut c = self.conn.client();
        let returned = c
            .query_one(rendered.sql.as_str(), &refs)
            .map_err(storage_debug)?;
        let id: i64 = returned.try_get(0).map_err(storage_debug)?;
        Ok(NodeId(id))
    }

    fn update_rows(&mut self, set: &[Assignment], filter: &Condition) -> Result<u64> {
        self.execute(&render_update(&self.config, set, filter))
    }

    fn delete_rows(&mut self, filter: &Condition) -> Result<u64> {
        self.execute(&render_delete(&self.config, filter))
    }

    fn select_rows(&self, select: &Select) -> Result<Vec<NodeRow>> {
        let rendered = render_select(&self.config, select);
        trace!(sql = %rendered.sql, params = rendered.params.len(), "postgres select");
        let params = boxed_params(&rendered.params);
        let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| p.as_ref()).collect();
        let rows = {
            let mut c = self.conn.client();
            c.query(rendered.sql.as_str(), &refs).map_err(storage_debug)?
        };
        let columns = self.config.columns_in_use();
        rows.iter().map(|row| decode_row(row, &columns)).collect()
    }
}
