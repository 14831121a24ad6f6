//! Path classification.
//!
//! Paths follow a fixed grammar:
//!
//! ```text
//! /                             root
//! /<table>[/]                   table directory
//! /<table>/<rowid>[/]           row directory
//! /<table>/<rowid>/<col>.vfs2db column file (regular or symlink)
//! ```
//!
//! Classification is pure string handling plus schema-cache lookups; it
//! never touches the database. A column file is a symlink exactly when the
//! column is the `from` side of one of its table's foreign keys.

use crate::errors::{FsError, FsResult};
use crate::schema::{ColumnClass, DbSchema};

/// File name suffix marking a column file.
pub const ATTR_SUFFIX: &str = ".vfs2db";

/// Tagged classification of a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathKind<'p> {
    Root,
    TableDir {
        table: &'p str,
    },
    RowDir {
        table: &'p str,
        rowid: &'p str,
    },
    /// A column file; `symlink` is set when the column is a foreign key.
    Attribute {
        table: &'p str,
        rowid: &'p str,
        column: &'p str,
        symlink: bool,
    },
}

impl PathKind<'_> {
    /// Directory classes (root, table, row).
    pub fn is_dir(&self) -> bool {
        !matches!(self, PathKind::Attribute { .. })
    }
}

/// Split a path into at most (table, rowid, column) components. The leading
/// slash and a single trailing slash are dropped.
fn tokenize(path: &str) -> Vec<&str> {
    path.trim_start_matches('/')
        .trim_end_matches('/')
        .split('/')
        .filter(|c| !c.is_empty())
        .collect()
}

/// Classify `path` against the schema cache.
///
/// Unknown tables and columns, empty components, and paths deeper than the
/// grammar are all `BadPath`.
pub fn classify<'p>(path: &'p str, schema: &DbSchema) -> FsResult<PathKind<'p>> {
    let (stripped, is_file) = match path.strip_suffix(ATTR_SUFFIX) {
        Some(rest) => (rest, true),
        None => (path, false),
    };

    let components = tokenize(stripped);
    match (is_file, components.as_slice()) {
        (false, &[]) => Ok(PathKind::Root),
        (false, &[table]) => {
            if schema.table(table).is_none() {
                return Err(FsError::bad_path(path));
            }
            Ok(PathKind::TableDir { table })
        }
        (false, &[table, rowid]) => {
            if schema.table(table).is_none() {
                return Err(FsError::bad_path(path));
            }
            Ok(PathKind::RowDir { table, rowid })
        }
        (true, &[table, rowid, column]) => {
            let table_schema = schema.table(table).ok_or_else(|| FsError::bad_path(path))?;
            match table_schema.column_class(column) {
                Some(class) => Ok(PathKind::Attribute {
                    table,
                    rowid,
                    column,
                    symlink: class == ColumnClass::ForeignKey,
                }),
                None => Err(FsError::bad_path(path)),
            }
        }
        _ => Err(FsError::bad_path(path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ForeignKey, TableSchema};

    fn schema() -> DbSchema {
        let mut customers = TableSchema::new("customers");
        customers.pk.push("id".to_string());
        customers.attr.push("name".to_string());

        let mut orders = TableSchema::new("orders");
        orders.pk.push("id".to_string());
        orders.attr.push("item".to_string());
        orders.fks.push(ForeignKey {
            from: "customer_id".to_string(),
            referenced_table: "customers".to_string(),
            referenced_column: "id".to_string(),
        });

        DbSchema::from_tables(vec![customers, orders])
    }

    #[test]
    fn root_and_directories() {
        let s = schema();
        assert_eq!(classify("/", &s).unwrap(), PathKind::Root);
        assert_eq!(
            classify("/orders", &s).unwrap(),
            PathKind::TableDir { table: "orders" }
        );
        assert_eq!(
            classify("/orders/", &s).unwrap(),
            PathKind::TableDir { table: "orders" }
        );
        assert_eq!(
            classify("/orders/1", &s).unwrap(),
            PathKind::RowDir {
                table: "orders",
                rowid: "1"
            }
        );
    }

    #[test]
    fn regular_file_vs_symlink() {
        let s = schema();
        assert_eq!(
            classify("/orders/1/item.vfs2db", &s).unwrap(),
            PathKind::Attribute {
                table: "orders",
                rowid: "1",
                column: "item",
                symlink: false
            }
        );
        assert_eq!(
            classify("/orders/1/id.vfs2db", &s).unwrap(),
            PathKind::Attribute {
                table: "orders",
                rowid: "1",
                column: "id",
                symlink: false
            }
        );
        assert_eq!(
            classify("/orders/1/customer_id.vfs2db", &s).unwrap(),
            PathKind::Attribute {
                table: "orders",
                rowid: "1",
                column: "customer_id",
                symlink: true
            }
        );
    }

    #[test]
    fn unknown_names_are_bad_paths() {
        let s = schema();
        assert!(matches!(
            classify("/invoices", &s),
            Err(FsError::BadPath(_))
        ));
        assert!(matches!(
            classify("/orders/1/color.vfs2db", &s),
            Err(FsError::BadPath(_))
        ));
        assert!(matches!(
            classify("/invoices/1/id.vfs2db", &s),
            Err(FsError::BadPath(_))
        ));
    }

    #[test]
    fn off_grammar_shapes_are_bad_paths() {
        let s = schema();
        // suffix at the wrong depth
        assert!(classify("/orders.vfs2db", &s).is_err());
        assert!(classify("/orders/1.vfs2db", &s).is_err());
        // too deep, with or without suffix
        assert!(classify("/orders/1/item", &s).is_err());
        assert!(classify("/orders/1/item/extra.vfs2db", &s).is_err());
    }
}
