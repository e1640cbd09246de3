use crate::expr::Column;
use crate::ids::TypeTag;
use crate::sql::SqlDialect;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Physical column names of the hierarchy table.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ColumnNames {
    pub id: String,
    pub left: String,
    pub right: String,
    pub level: String,
    pub root: String,
    pub name: String,
    pub path: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            id: "id".into(),
            left: "lft".into(),
            right: "rgt".into(),
            level: "level".into(),
            root: "root".into(),
            name: "name".into(),
            path: "path".into(),
        }
    }
}

impl ColumnNames {
    pub fn name_of(&self, column: Column) -> &str {
        match column {
            Column::Id => &self.id,
            Column::Left => &self.left,
            Column::Right => &self.right,
            Column::Level => &self.level,
            Column::Root => &self.root,
            Column::Name => &self.name,
            Column::Path => &self.path,
        }
    }
}

/// Materialized path tracking.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum PathMode {
    #[default]
    Disabled,
    /// Keep `/parent/.../name` in the path column. With `unique_names`, a computed path that
    /// already exists is rejected with `Error::DuplicatePath`.
    Tracked { unique_names: bool },
}

/// How descendants are removed when a non-leaf node is deleted.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DeleteMode {
    /// One delete-by-condition over the subtree interval.
    #[default]
    Bulk,
    /// Deepest-first, one row at a time, with the delete hooks consulted for every descendant.
    Individual,
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TreeConfig {
    pub table: String,
    pub type_tag: TypeTag,
    pub columns: ColumnNames,
    pub multiple_roots: bool,
    pub path_mode: PathMode,
    pub delete_mode: DeleteMode,
    pub dialect: SqlDialect,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self::new("tree")
    }
}

impl TreeConfig {
    /// Single-root tree without paths stored in `table`; the type tag defaults to the table name.
    pub fn new(table: impl Into<String>) -> Self {
        let table = table.into();
        Self {
            type_tag: TypeTag::new(table.clone()),
            table,
            columns: ColumnNames::default(),
            multiple_roots: false,
            path_mode: PathMode::Disabled,
            delete_mode: DeleteMode::Bulk,
            dialect: SqlDialect::SQLITE,
        }
    }

    pub fn with_type_tag(mut self, tag: TypeTag) -> Self {
        self.type_tag = tag;
        self
    }

    pub fn with_columns(mut self, columns: ColumnNames) -> Self {
        self.columns = columns;
        self
    }

    pub fn with_multiple_roots(mut self, enabled: bool) -> Self {
        self.multiple_roots = enabled;
        self
    }

    pub fn with_paths(mut self, unique_names: bool) -> Self {
        self.path_mode = PathMode::Tracked { unique_names };
        self
    }

    pub fn with_delete_mode(mut self, mode: DeleteMode) -> Self {
        self.delete_mode = mode;
        self
    }

    pub fn with_dialect(mut self, dialect: SqlDialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn tracks_paths(&self) -> bool {
        matches!(self.path_mode, PathMode::Tracked { .. })
    }

    pub fn unique_names(&self) -> bool {
        matches!(self.path_mode, PathMode::Tracked { unique_names: true })
    }

    /// Columns present in the table, in the order backends select them.
    pub fn columns_in_use(&self) -> Vec<Column> {
        let mut cols = vec![Column::Id, Column::Left, Column::Right, Column::Level];
        if self.multiple_roots {
            cols.push(Column::Root);
        }
        if self.tracks_paths() {
            cols.push(Column::Name);
            cols.push(Column::Path);
        }
        cols
    }

    pub fn column_name(&self, column: Column) -> &str {
        self.columns.name_of(column)
    }

    #[cfg(feature = "serde")]
    pub fn from_json(json: &str) -> crate::Result<Self> {
        serde_json::from_str(json).map_err(|e| crate::Error::InconsistentState(e.to_string()))
    }
}

#[cfg(all(test, feature = "serde"))]
mod tests {
    use super::*;

    #[test]
    fn config_loads_from_partial_json() {
        let cfg = TreeConfig::from_json(
            r#"{
                "table": "categories",
                "type_tag": "Category",
                "multiple_roots": true,
                "path_mode": { "tracked": { "unique_names": true } },
                "columns": { "left": "lft_idx" }
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.table, "categories");
        assert_eq!(cfg.type_tag, TypeTag::new("Category"));
        assert!(cfg.multiple_roots);
        assert!(cfg.unique_names());
        assert_eq!(cfg.columns.left, "lft_idx");
        assert_eq!(cfg.columns.right, "rgt");
        assert_eq!(cfg.delete_mode, DeleteMode::Bulk);
    }
}
