//! Database gateway: the only component that touches SQLite.
//!
//! Every operation is a thin typed wrapper over one statement: acquire from
//! the query registry, bind, step, extract. Rowids and written bytes are
//! always bound as parameters. No database error escapes this layer
//! untyped; callers see [`FsError`] kinds only.

pub mod queries;

use std::fmt;
use std::path::Path;

use rusqlite::types::ValueRef;
use rusqlite::{params, params_from_iter, Connection, OpenFlags};

use crate::errors::{FsError, FsResult};
use queries::QueryId;

/// One row of the schema-discovery query: a column and how it is used.
#[derive(Debug, Clone)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,
    /// Part of the table's primary key.
    pub is_pk: bool,
    /// `(referenced_table, referenced_column)` when the column is a
    /// foreign key.
    pub fk: Option<(String, String)>,
}

/// SQLite storage class of a stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCode {
    Text,
    Integer,
    Float,
    Blob,
    Null,
}

impl TypeCode {
    /// The textual label exposed through the `user.type` xattr.
    pub fn label(self) -> &'static str {
        match self {
            TypeCode::Text => "TEXT",
            TypeCode::Integer => "INTEGER",
            TypeCode::Float => "FLOAT",
            TypeCode::Blob => "BLOB",
            TypeCode::Null => "NULL",
        }
    }
}

impl fmt::Display for TypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<rusqlite::types::Type> for TypeCode {
    fn from(t: rusqlite::types::Type) -> Self {
        match t {
            rusqlite::types::Type::Text => TypeCode::Text,
            rusqlite::types::Type::Integer => TypeCode::Integer,
            rusqlite::types::Type::Real => TypeCode::Float,
            rusqlite::types::Type::Blob => TypeCode::Blob,
            rusqlite::types::Type::Null => TypeCode::Null,
        }
    }
}

/// A stored value rendered the way it appears as file content: text and
/// blobs byte for byte, numbers as decimal text, NULL as empty.
fn value_bytes(value: ValueRef<'_>) -> Vec<u8> {
    match value {
        ValueRef::Null => Vec::new(),
        ValueRef::Integer(i) => i.to_string().into_bytes(),
        ValueRef::Real(f) => f.to_string().into_bytes(),
        ValueRef::Text(t) => t.to_vec(),
        ValueRef::Blob(b) => b.to_vec(),
    }
}

/// Handle to the mounted database.
pub struct DbGateway {
    conn: Connection,
}

impl DbGateway {
    /// Open the database file read-write, creating it if absent.
    pub fn open(path: &Path) -> FsResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )?;
        Ok(Self { conn })
    }

    /// Wrap an already-open connection. Used by tests to drive the gateway
    /// against in-memory databases.
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Prepare the static statements. Called once at mount.
    pub fn init(&self) -> FsResult<()> {
        queries::init(&self.conn)
    }

    /// Release every registry-owned statement and close the connection.
    pub fn close(self) {
        queries::cleanup(&self.conn);
        if let Err((_, e)) = self.conn.close() {
            log::warn!("closing database: {e}");
        }
    }

    /// Names of all user tables, in the order the database returns them.
    pub fn table_names(&self) -> FsResult<Vec<String>> {
        let mut stmt = queries::static_statement(&self.conn, QueryId::SelectTablesName)?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    /// Column descriptions for one table, joining the column listing with
    /// the foreign-key listing on column name.
    pub fn table_info(&self, table: &str) -> FsResult<Vec<ColumnInfo>> {
        let mut stmt =
            queries::build_dynamic_statement(&self.conn, QueryId::SelectTableInfo, &[table, table])?;
        let infos = stmt
            .query_map([], |row| {
                let name: String = row.get(0)?;
                let pk_rank: i64 = row.get(1)?;
                let fk_table: Option<String> = row.get(2)?;
                let fk_column: Option<String> = row.get(3)?;
                Ok(ColumnInfo {
                    name,
                    is_pk: pk_rank != 0,
                    fk: fk_table.zip(fk_column),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(infos)
    }

    /// The column value for one row, as a fresh owned buffer.
    pub fn get_attribute_bytes(&self, table: &str, rowid: &str, column: &str) -> FsResult<Vec<u8>> {
        let mut stmt =
            queries::build_dynamic_statement(&self.conn, QueryId::SelectAttribute, &[column, table])?;
        let mut rows = stmt.query(params![rowid])?;
        let row = rows.next()?.ok_or(FsError::RowNotFound)?;
        Ok(value_bytes(row.get_ref(0)?))
    }

    /// Byte length of the column value for one row. Equals the length of
    /// the buffer `get_attribute_bytes` returns for the same cell.
    pub fn get_attribute_size(&self, table: &str, rowid: &str, column: &str) -> FsResult<u64> {
        Ok(self.get_attribute_bytes(table, rowid, column)?.len() as u64)
    }

    /// Storage class of the column value for one row.
    pub fn get_attribute_type(&self, table: &str, rowid: &str, column: &str) -> FsResult<TypeCode> {
        let mut stmt =
            queries::build_dynamic_statement(&self.conn, QueryId::SelectAttribute, &[column, table])?;
        let mut rows = stmt.query(params![rowid])?;
        let row = rows.next()?.ok_or(FsError::RowNotFound)?;
        Ok(TypeCode::from(row.get_ref(0)?.data_type()))
    }

    /// Overwrite (or, with `append`, extend) the column value for one row.
    /// A single statement against the database; no surrounding transaction.
    pub fn update_attribute_value(
        &self,
        table: &str,
        rowid: &str,
        column: &str,
        data: &[u8],
        append: bool,
    ) -> FsResult<()> {
        let id = if append {
            QueryId::UpdateAttributeAppend
        } else {
            QueryId::UpdateAttribute
        };
        let args: &[&str] = if append {
            &[table, column, column]
        } else {
            &[table, column]
        };
        let mut stmt = queries::build_dynamic_statement(&self.conn, id, args)?;

        // UTF-8 payloads are stored as TEXT like any shell-written content;
        // anything else is stored verbatim as a BLOB.
        let changed = match std::str::from_utf8(data) {
            Ok(text) => stmt.execute(params![text, rowid])?,
            Err(_) => stmt.execute(params![data, rowid])?,
        };
        if changed == 0 {
            return Err(FsError::RowNotFound);
        }
        Ok(())
    }

    /// Integer rowids of every row in `table`, in database order.
    pub fn get_table_rowids(&self, table: &str) -> FsResult<Vec<i64>> {
        let mut stmt =
            queries::build_dynamic_statement(&self.conn, QueryId::SelectTableRowids, &[table])?;
        let rowids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(rowids)
    }

    /// The rowid in `table` whose key columns hold the given values.
    pub fn get_rowid_by_fk_values(&self, table: &str, keys: &[(&str, String)]) -> FsResult<i64> {
        let columns: Vec<&str> = keys.iter().map(|(c, _)| *c).collect();
        let mut stmt = queries::build_rowid_lookup(&self.conn, table, &columns)?;
        let mut rows = stmt.query(params_from_iter(keys.iter().map(|(_, v)| v)))?;
        let row = rows.next()?.ok_or(FsError::RowNotFound)?;
        Ok(row.get(0)?)
    }
}
