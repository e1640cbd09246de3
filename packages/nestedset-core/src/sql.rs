//! Dialect-aware SQL rendering for the expression AST.
//!
//! Backends never build SQL by hand: they render a `Select`, `NewRow`, update or delete through
//! this module and bind the returned parameters in order.

use crate::config::TreeConfig;
use crate::expr::{Assignment, Column, Condition, Direction, Select, Value};
use crate::model::NewRow;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Placeholder {
    /// `?`
    Question,
    /// `$1`, `$2`, ...
    Dollar,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ConcatStyle {
    /// `a || b`
    Pipe,
    /// `CONCAT(a, b)`
    Function,
    /// `a + b`
    Plus,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SubstringStyle {
    /// `SUBSTR(s, n)`
    Substr,
    /// `SUBSTRING(s, n)`
    Substring,
    /// `SUBSTRING(s, n, LEN(s))`
    SubstringLen,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum IdentQuote {
    Double,
    Backtick,
    Bracket,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum LimitStyle {
    /// `LIMIT n`
    Limit,
    /// `OFFSET 0 ROWS FETCH NEXT n ROWS ONLY`
    OffsetFetch,
}

/// SQL flavour knobs. Pick one of the presets or assemble a custom combination.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SqlDialect {
    pub placeholder: Placeholder,
    pub concat: ConcatStyle,
    pub substring: SubstringStyle,
    pub quote: IdentQuote,
    pub limit: LimitStyle,
    /// `INSERT ... RETURNING id` is available.
    pub returning: bool,
}

impl Default for SqlDialect {
    fn default() -> Self {
        Self::SQLITE
    }
}

impl SqlDialect {
    pub const SQLITE: SqlDialect = SqlDialect {
        placeholder: Placeholder::Question,
        concat: ConcatStyle::Pipe,
        substring: SubstringStyle::Substr,
        quote: IdentQuote::Double,
        limit: LimitStyle::Limit,
        returning: false,
    };

    pub const POSTGRES: SqlDialect = SqlDialect {
        placeholder: Placeholder::Dollar,
        concat: ConcatStyle::Pipe,
        substring: SubstringStyle::Substr,
        quote: IdentQuote::Double,
        limit: LimitStyle::Limit,
        returning: true,
    };

    pub const MYSQL: SqlDialect = SqlDialect {
        placeholder: Placeholder::Question,
        concat: ConcatStyle::Function,
        substring: SubstringStyle::Substring,
        quote: IdentQuote::Backtick,
        limit: LimitStyle::Limit,
        returning: false,
    };

    pub const MSSQL: SqlDialect = SqlDialect {
        placeholder: Placeholder::Question,
        concat: ConcatStyle::Plus,
        substring: SubstringStyle::SubstringLen,
        quote: IdentQuote::Bracket,
        limit: LimitStyle::OffsetFetch,
        returning: false,
    };

    pub fn quote_identifier(&self, name: &str) -> String {
        match self.quote {
            IdentQuote::Double => format!("\"{}\"", name.replace('"', "\"\"")),
            IdentQuote::Backtick => format!("`{}`", name.replace('`', "``")),
            IdentQuote::Bracket => format!("[{}]", name.replace(']', "]]")),
        }
    }

    pub fn quote_value(&self, value: &Value) -> String {
        match value {
            Value::Int(v) => v.to_string(),
            Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
        }
    }

    pub fn concat(&self, a: &str, b: &str) -> String {
        match self.concat {
            ConcatStyle::Pipe => format!("{a} || {b}"),
            ConcatStyle::Function => format!("CONCAT({a}, {b})"),
            ConcatStyle::Plus => format!("{a} + {b}"),
        }
    }

    /// Suffix of `expr` starting at the 1-based character position `start`.
    pub fn substring_from(&self, expr: &str, start: usize) -> String {
        match self.substring {
            SubstringStyle::Substr => format!("SUBSTR({expr}, {start})"),
            SubstringStyle::Substring => format!("SUBSTRING({expr}, {start})"),
            SubstringStyle::SubstringLen => format!("SUBSTRING({expr}, {start}, LEN({expr}))"),
        }
    }
}

/// SQL text plus positional parameters in binding order.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Rendered {
    pub sql: String,
    pub params: Vec<Value>,
}

struct Writer<'a> {
    config: &'a TreeConfig,
    params: Vec<Value>,
}

impl<'a> Writer<'a> {
    fn new(config: &'a TreeConfig) -> Self {
        Self {
            config,
            params: Vec::new(),
        }
    }

    fn dialect(&self) -> &SqlDialect {
        &self.config.dialect
    }

    fn bind(&mut self, value: Value) -> String {
        self.params.push(value);
        match self.dialect().placeholder {
            Placeholder::Question => "?".to_string(),
            Placeholder::Dollar => format!("${}", self.params.len()),
        }
    }

    fn col(&self, column: Column) -> String {
        self.dialect().quote_identifier(self.config.column_name(column))
    }

    fn table(&self) -> String {
        self.dialect().quote_identifier(&self.config.table)
    }

    fn condition(&mut self, cond: &Condition) -> Option<String> {
        match cond {
            Condition::All => None,
            Condition::Cmp { column, op, value } => {
                let col = self.col(*column);
                let p = self.bind(value.clone());
                Some(format!("{col} {} {p}", op.sql()))
            }
            Condition::And(terms) => {
                let parts: Vec<String> = terms.iter().filter_map(|t| self.condition(t)).collect();
                if parts.is_empty() {
                    None
                } else {
                    Some(parts.join(" AND "))
                }
            }
        }
    }

    fn where_clause(&mut self, cond: &Condition) -> String {
        match self.condition(cond) {
            Some(c) => format!(" WHERE {c}"),
            None => String::new(),
        }
    }

    fn assignment(&mut self, a: &Assignment) -> String {
        match a {
            Assignment::Shift { column, delta } => {
                let col = self.col(*column);
                let p = self.bind(Value::Int(*delta));
                format!("{col} = {col} + {p}")
            }
            Assignment::Set { column, value } => {
                let col = self.col(*column);
                let p = self.bind(value.clone());
                format!("{col} = {p}")
            }
            Assignment::ReplacePathPrefix {
                old_prefix,
                new_prefix,
            } => {
                let col = self.col(Column::Path);
                let p = self.bind(Value::Text(new_prefix.clone()));
                // Inlined so every dialect sees an integer literal, not a typed parameter.
                let start = old_prefix.chars().count() + 1;
                let tail = self.dialect().substring_from(&col, start);
                format!("{col} = {}", self.dialect().concat(&p, &tail))
            }
        }
    }
}

pub fn render_select(config: &TreeConfig, select: &Select) -> Rendered {
    let mut w = Writer::new(config);
    let cols: Vec<String> = config.columns_in_use().into_iter().map(|c| w.col(c)).collect();
    let mut sql = format!("SELECT {} FROM {}", cols.join(", "), w.table());
    sql.push_str(&w.where_clause(&select.filter));
    if !select.order.is_empty() {
        let order: Vec<String> = select
            .order
            .iter()
            .map(|(c, d)| {
                let dir = match d {
                    Direction::Asc => "ASC",
                    Direction::Desc => "DESC",
                };
                format!("{} {dir}", w.col(*c))
            })
            .collect();
        sql.push_str(&format!(" ORDER BY {}", order.join(", ")));
    }
    if let Some(limit) = select.limit {
        match config.dialect.limit {
            LimitStyle::Limit => sql.push_str(&format!(" LIMIT {limit}")),
            LimitStyle::OffsetFetch => {
                if select.order.is_empty() {
                    sql.push_str(" ORDER BY (SELECT NULL)");
                }
                sql.push_str(&format!(" OFFSET 0 ROWS FETCH NEXT {limit} ROWS ONLY"));
            }
        }
    }
    Rendered {
        sql,
        params: w.params,
    }
}

/// Insert statement for a new row. Absent optional columns, and columns the table does not
/// carry in this configuration, are omitted so no typed `NULL` parameter is ever bound.
pub fn render_insert(config: &TreeConfig, row: &NewRow) -> Rendered {
    let mut w = Writer::new(config);
    let mut cols = Vec::new();
    let mut vals = Vec::new();
    let mut values: Vec<(Column, Value)> = vec![
        (Column::Left, Value::Int(row.left)),
        (Column::Right, Value::Int(row.right)),
        (Column::Level, Value::Int(row.level)),
    ];
    if let Some(root) = row.root {
        values.push((Column::Root, root.into()));
    }
    if let Some(name) = &row.name {
        values.push((Column::Name, name.clone().into()));
    }
    if let Some(path) = &row.path {
        values.push((Column::Path, path.clone().into()));
    }
    let in_use = config.columns_in_use();
    for (column, value) in values.into_iter().filter(|(c, _)| in_use.contains(c)) {
        cols.push(w.col(column));
        vals.push(w.bind(value));
    }
    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        w.table(),
        cols.join(", "),
        vals.join(", ")
    );
    if config.dialect.returning {
        sql.push_str(&format!(" RETURNING {}", w.col(Column::Id)));
    }
    Rendered {
        sql,
        params: w.params,
    }
}

pub fn render_update(config: &TreeConfig, set: &[Assignment], filter: &Condition) -> Rendered {
    let mut w = Writer::new(config);
    let parts: Vec<String> = set.iter().map(|a| w.assignment(a)).collect();
    let mut sql = format!("UPDATE {} SET {}", w.table(), parts.join(", "));
    sql.push_str(&w.where_clause(filter));
    Rendered {
        sql,
        params: w.params,
    }
}

pub fn render_delete(config: &TreeConfig, filter: &Condition) -> Rendered {
    let mut w = Writer::new(config);
    let mut sql = format!("DELETE FROM {}", w.table());
    sql.push_str(&w.where_clause(filter));
    Rendered {
        sql,
        params: w.params,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_uses_dollar_placeholders_in_order() {
        let cfg = TreeConfig::new("nodes")
            .with_multiple_roots(true)
            .with_dialect(SqlDialect::POSTGRES);
        let r = render_update(
            &cfg,
            &[Assignment::shift(Column::Left, 2)],
            &Condition::ge(Column::Left, 5).and(Condition::eq(Column::Root, 1)),
        );
        assert_eq!(
            r.sql,
            r#"UPDATE "nodes" SET "lft" = "lft" + $1 WHERE "lft" >= $2 AND "root" = $3"#
        );
        assert_eq!(r.params, vec![Value::Int(2), Value::Int(5), Value::Int(1)]);
    }

    #[test]
    fn path_rewrite_per_dialect() {
        let rewrite = Assignment::ReplacePathPrefix {
            old_prefix: "/a".into(),
            new_prefix: "/b/c".into(),
        };
        let sqlite = render_update(&TreeConfig::new("t").with_paths(false), &[rewrite.clone()], &Condition::All);
        assert_eq!(sqlite.sql, r#"UPDATE "t" SET "path" = ? || SUBSTR("path", 3)"#);

        let mysql = render_update(
            &TreeConfig::new("t").with_dialect(SqlDialect::MYSQL),
            &[rewrite.clone()],
            &Condition::All,
        );
        assert_eq!(mysql.sql, "UPDATE `t` SET `path` = CONCAT(?, SUBSTRING(`path`, 3))");

        let mssql = render_update(
            &TreeConfig::new("t").with_dialect(SqlDialect::MSSQL),
            &[rewrite],
            &Condition::All,
        );
        assert_eq!(
            mssql.sql,
            "UPDATE [t] SET [path] = ? + SUBSTRING([path], 3, LEN([path]))"
        );
        assert_eq!(mssql.params, vec![Value::Text("/b/c".into())]);
    }

    #[test]
    fn select_renders_scope_order_and_limit() {
        let cfg = TreeConfig::new("t").with_multiple_roots(true);
        let select = Select::new(Condition::gt(Column::Left, 1))
            .order_by(Column::Level, Direction::Desc)
            .order_by(Column::Left, Direction::Asc)
            .limit(Some(3));
        let r = render_select(&cfg, &select);
        assert_eq!(
            r.sql,
            r#"SELECT "id", "lft", "rgt", "level", "root" FROM "t" WHERE "lft" > ? ORDER BY "level" DESC, "lft" ASC LIMIT 3"#
        );
    }

    #[test]
    fn insert_skips_absent_columns_and_returns_id() {
        let cfg = TreeConfig::new("t").with_dialect(SqlDialect::POSTGRES);
        let row = NewRow {
            left: 1,
            right: 2,
            level: 1,
            root: None,
            name: Some("kept in memory only".into()),
            path: None,
        };
        let r = render_insert(&cfg, &row);
        assert_eq!(
            r.sql,
            r#"INSERT INTO "t" ("lft", "rgt", "level") VALUES ($1, $2, $3) RETURNING "id""#
        );
    }

    #[test]
    fn quoting_escapes_delimiters() {
        assert_eq!(SqlDialect::SQLITE.quote_identifier("a\"b"), "\"a\"\"b\"");
        assert_eq!(SqlDialect::MYSQL.quote_identifier("a`b"), "`a``b`");
        assert_eq!(SqlDialect::MSSQL.quote_identifier("a]b"), "[a]]b]");
        assert_eq!(SqlDialect::SQLITE.quote_value(&Value::Text("it's".into())), "'it''s'");
        assert_eq!(SqlDialect::SQLITE.quote_value(&Value::Int(-4)), "-4");
    }

    #[test]
    fn delete_without_filter_has_no_where() {
        let r = render_delete(&TreeConfig::new("t"), &Condition::All);
        assert_eq!(r.sql, r#"DELETE FROM "t""#);
        assert!(r.params.is_empty());
    }
}
