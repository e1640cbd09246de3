use postgres::Client;

use nestedset_core::{Column, Error, Result, SqlDialect, TreeConfig};

const SCHEMA_LOCK_KEY: i64 = 0x6e65737465647365; // "nestedse"

fn column_type(column: Column) -> &'static str {
    match column {
        Column::Id => "BIGSERIAL PRIMARY KEY",
        Column::Left | Column::Right | Column::Level => "BIGINT NOT NULL",
        Column::Root => "BIGINT",
        Column::Name | Column::Path => "TEXT",
    }
}

fn schema_sql(config: &TreeConfig) -> String {
    let d = SqlDialect::POSTGRES;
    let table = d.quote_identifier(&config.table);
    let q = |c: Column| d.quote_identifier(config.column_name(c));

    let columns: Vec<String> = config
        .columns_in_use()
        .into_iter()
        .map(|c| format!("  {} {}", q(c), column_type(c)))
        .collect();
    let mut bounds = vec![q(Column::Left), q(Column::Right)];
    if config.multiple_roots {
        bounds.insert(0, q(Column::Root));
    }

    let mut sql = format!(
        "CREATE TABLE IF NOT EXISTS {table} (\n{}\n);\n\
         CREATE INDEX IF NOT EXISTS {} ON {table} ({});\n",
        columns.join(",\n"),
        d.quote_identifier(&format!("idx_{}_bounds", config.table)),
        bounds.join(", "),
    );
    if config.tracks_paths() {
        sql.push_str(&format!(
            "CREATE INDEX IF NOT EXISTS {} ON {table} ({});\n",
            d.quote_identifier(&format!("idx_{}_path", config.table)),
            q(Column::Path),
        ));
    }
    sql
}

pub fn ensure_schema(client: &mut Client, config: &TreeConfig) -> Result<()> {
    // Concurrent `CREATE TABLE IF NOT EXISTS` can still collide in the catalog; serialize it.
    client
        .query_one("SELECT pg_advisory_lock($1)", &[&SCHEMA_LOCK_KEY])
        .map_err(|e| Error::Storage(format!("{e:?}")))?;

    let res = client
        .batch_execute(&schema_sql(config))
        .map_err(|e| Error::Storage(format!("{e:?}")));

    let _ = client.query_one("SELECT pg_advisory_unlock($1)", &[&SCHEMA_LOCK_KEY]);

    res
}

pub fn drop_table_for_tests(client: &mut Client, config: &TreeConfig) -> Result<()> {
    let table = SqlDialect::POSTGRES.quote_identifier(&config.table);
    client
        .batch_execute(&format!("DROP TABLE IF EXISTS {table}"))
        .map_err(|e| Error::Storage(format!("{e:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_uses_bigint_columns() {
        let sql = schema_sql(&TreeConfig::new("menu").with_multiple_roots(true).with_paths(true));
        assert!(sql.contains(r#""id" BIGSERIAL PRIMARY KEY"#));
        assert!(sql.contains(r#""root" BIGINT"#));
        assert!(sql.contains(r#""path" TEXT"#));
        assert!(sql.contains(r#"ON "menu" ("root", "lft", "rgt")"#));
    }
}
