use rusqlite::Connection;

use nestedset_core::{Column, Error, Result, SqlDialect, TreeConfig};

fn column_type(column: Column) -> &'static str {
    match column {
        Column::Id => "INTEGER PRIMARY KEY AUTOINCREMENT",
        Column::Left | Column::Right | Column::Level => "INTEGER NOT NULL",
        Column::Root => "INTEGER",
        Column::Name | Column::Path => "TEXT",
    }
}

fn schema_sql(config: &TreeConfig) -> String {
    let d = SqlDialect::SQLITE;
    let table = d.quote_identifier(&config.table);
    let q = |c: Column| d.quote_identifier(config.column_name(c));

    let columns: Vec<String> = config
        .columns_in_use()
        .into_iter()
        .map(|c| format!("{} {}", q(c), column_type(c)))
        .collect();
    let mut bounds = vec![q(Column::Left), q(Column::Right)];
    if config.multiple_roots {
        bounds.insert(0, q(Column::Root));
    }

    let mut sql = format!(
        "CREATE TABLE IF NOT EXISTS {table} ({});
         CREATE INDEX IF NOT EXISTS {} ON {table} ({});",
        columns.join(", "),
        d.quote_identifier(&format!("idx_{}_bounds", config.table)),
        bounds.join(", "),
    );
    if config.tracks_paths() {
        sql.push_str(&format!(
            "CREATE INDEX IF NOT EXISTS {} ON {table} ({});",
            d.quote_identifier(&format!("idx_{}_path", config.table)),
            q(Column::Path),
        ));
    }
    sql
}

/// Creates the hierarchy table and its indexes if they are missing.
pub fn ensure_schema(conn: &Connection, config: &TreeConfig) -> Result<()> {
    conn.execute_batch(&schema_sql(config))
        .map_err(|e| Error::Storage(e.to_string()))
}
