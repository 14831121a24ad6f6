//! Schema cache for the mounted database.
//!
//! This module provides:
//! - Data models for table schemas, primary keys, and foreign keys
//! - Construction from the database's own metadata at mount time
//! - Foreign-key grouping by referenced table, used for symlink resolution
//!
//! The cache is built once when the filesystem is mounted and is read-only
//! afterwards. It is the single source of truth for deciding whether a
//! column file is a regular file or a symlink.

use std::fmt;

use crate::db::{ColumnInfo, DbGateway};
use crate::errors::FsResult;

/// Foreign key constraint: a column in this table referencing a column in
/// another table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    /// Column name in the owning table.
    pub from: String,
    /// Referenced table name.
    pub referenced_table: String,
    /// Referenced column name.
    pub referenced_column: String,
}

impl fmt::Display for ForeignKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {}({})",
            self.from, self.referenced_table, self.referenced_column
        )
    }
}

/// Which of the three disjoint column sets a column belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnClass {
    PrimaryKey,
    Attribute,
    ForeignKey,
}

/// Ordered FK indices sharing one referenced table.
///
/// A referenced table may have a composite primary key, in which case
/// several FK columns of the owning table must be combined to identify one
/// referenced row. Grouping happens once at construction; `readlink` only
/// reads it.
#[derive(Debug, Clone)]
struct FkGroup {
    referenced_table: String,
    members: Vec<usize>,
}

/// Complete description of one table: its name and its columns partitioned
/// into primary keys, plain attributes, and foreign keys.
///
/// Each vector preserves the order the schema-discovery query returned, so
/// directory listings are stable across calls.
#[derive(Debug, Clone, Default)]
pub struct TableSchema {
    /// Table name.
    pub name: String,
    /// Primary key column names, in discovery order.
    pub pk: Vec<String>,
    /// Plain attribute column names, in discovery order.
    pub attr: Vec<String>,
    /// Foreign key constraints, in discovery order.
    pub fks: Vec<ForeignKey>,
    fk_groups: Vec<FkGroup>,
}

impl TableSchema {
    /// Create an empty schema for `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sort a column into the pk / attr / fk partition.
    fn add_column(&mut self, info: ColumnInfo) {
        if info.is_pk {
            self.pk.push(info.name);
        } else if let Some((referenced_table, referenced_column)) = info.fk {
            self.fks.push(ForeignKey {
                from: info.name,
                referenced_table,
                referenced_column,
            });
        } else {
            self.attr.push(info.name);
        }
    }

    /// Rebuild the FK grouping index. Must be called after `fks` changes;
    /// construction does this once per table.
    pub fn group_foreign_keys(&mut self) {
        self.fk_groups.clear();
        for (idx, fk) in self.fks.iter().enumerate() {
            match self
                .fk_groups
                .iter_mut()
                .find(|g| g.referenced_table == fk.referenced_table)
            {
                Some(group) => group.members.push(idx),
                None => self.fk_groups.push(FkGroup {
                    referenced_table: fk.referenced_table.clone(),
                    members: vec![idx],
                }),
            }
        }
    }

    /// Classify a column name, or `None` if the table has no such column.
    pub fn column_class(&self, column: &str) -> Option<ColumnClass> {
        if self.pk.iter().any(|c| c == column) {
            Some(ColumnClass::PrimaryKey)
        } else if self.attr.iter().any(|c| c == column) {
            Some(ColumnClass::Attribute)
        } else if self.fks.iter().any(|fk| fk.from == column) {
            Some(ColumnClass::ForeignKey)
        } else {
            None
        }
    }

    /// The FK whose `from` column is `column`.
    pub fn foreign_key(&self, column: &str) -> Option<&ForeignKey> {
        self.fks.iter().find(|fk| fk.from == column)
    }

    /// Every FK of this table referencing `table`, in discovery order.
    pub fn fks_referencing(&self, table: &str) -> Vec<&ForeignKey> {
        self.fk_groups
            .iter()
            .find(|g| g.referenced_table == table)
            .map(|g| g.members.iter().map(|&i| &self.fks[i]).collect())
            .unwrap_or_default()
    }

    /// Column names in directory-listing order: primary keys, then plain
    /// attributes, then FK columns.
    pub fn columns_in_listing_order(&self) -> impl Iterator<Item = &str> {
        self.pk
            .iter()
            .map(String::as_str)
            .chain(self.attr.iter().map(String::as_str))
            .chain(self.fks.iter().map(|fk| fk.from.as_str()))
    }
}

/// The in-memory description of the whole database: one `TableSchema` per
/// table, in the order the database listed them.
#[derive(Debug, Clone, Default)]
pub struct DbSchema {
    tables: Vec<TableSchema>,
}

impl DbSchema {
    /// Build the cache by interrogating the database: table names first,
    /// then per-table column information.
    pub fn build(gateway: &DbGateway) -> FsResult<Self> {
        let mut tables = Vec::new();
        for name in gateway.table_names()? {
            let mut table = TableSchema::new(name);
            for info in gateway.table_info(&table.name)? {
                table.add_column(info);
            }
            table.group_foreign_keys();
            log::debug!(
                "schema: table {} ({} pk, {} attr, {} fk)",
                table.name,
                table.pk.len(),
                table.attr.len(),
                table.fks.len()
            );
            tables.push(table);
        }
        Ok(Self { tables })
    }

    /// Construct from prebuilt table schemas. Grouping indices are rebuilt.
    pub fn from_tables(mut tables: Vec<TableSchema>) -> Self {
        for table in &mut tables {
            table.group_foreign_keys();
        }
        Self { tables }
    }

    /// Look up a table by name. Linear scan; the table count is small.
    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// All tables, in discovery order.
    pub fn tables(&self) -> &[TableSchema] {
        &self.tables
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
