//! The translator: filesystem operations in, database operations out.
//!
//! Each operation classifies its path, dispatches to the database gateway,
//! and assembles a semantic reply (`FileStat`, directory entries, bytes, a
//! link target). Nothing here knows how the kernel delivers calls; the FUSE
//! adapter owns inode bookkeeping and errno conversion.
//!
//! A `Translator` value is a mounted database: construction runs the mount
//! protocol (prepare static statements, build the schema cache), dropping
//! it via [`Translator::unmount`] releases the statements and closes the
//! database.

use std::time::SystemTime;

use crate::db::DbGateway;
use crate::errors::{FsError, FsResult};
use crate::path::{classify, PathKind, ATTR_SUFFIX};
use crate::schema::{ColumnClass, DbSchema};

/// What kind of filesystem object a path denotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
    Symlink,
}

/// Stat reply for one path.
#[derive(Debug, Clone)]
pub struct FileStat {
    pub kind: EntryKind,
    pub size: u64,
    pub perm: u16,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub mtime: SystemTime,
}

/// One directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
}

impl DirEntry {
    fn new(name: impl Into<String>, kind: EntryKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Reply to the two-phase xattr protocol: the required size when the caller
/// probed with a zero-sized buffer, otherwise the value itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XattrReply {
    Size(u32),
    Value(Vec<u8>),
}

/// The xattr name exposing a column's storage class.
pub const TYPE_XATTR: &str = "user.type";

/// A mounted database.
pub struct Translator {
    gateway: DbGateway,
    schema: DbSchema,
}

impl Translator {
    /// Run the mount protocol: prepare static statements, then build the
    /// schema cache. Any failure fails the mount.
    pub fn mount(gateway: DbGateway) -> FsResult<Self> {
        gateway.init()?;
        let schema = DbSchema::build(&gateway)?;
        log::info!("schema cache built: {} tables", schema.len());
        Ok(Self { gateway, schema })
    }

    /// Release prepared statements and close the database.
    pub fn unmount(self) {
        self.gateway.close();
        log::info!("database closed");
    }

    /// The read-only schema cache.
    pub fn schema(&self) -> &DbSchema {
        &self.schema
    }

    /// Stat a path. Directories report mode 0755 and link count 2; column
    /// files report mode 0644, link count 1, and their value's byte length.
    pub fn getattr(&self, path: &str, uid: u32, gid: u32) -> FsResult<FileStat> {
        log::debug!("getattr: {path}");
        let now = SystemTime::now();
        match classify(path, &self.schema)? {
            PathKind::Attribute {
                table,
                rowid,
                column,
                symlink,
            } => {
                let size = self.gateway.get_attribute_size(table, rowid, column)?;
                Ok(FileStat {
                    kind: if symlink {
                        EntryKind::Symlink
                    } else {
                        EntryKind::File
                    },
                    size,
                    perm: 0o644,
                    nlink: 1,
                    uid,
                    gid,
                    mtime: now,
                })
            }
            _ => Ok(FileStat {
                kind: EntryKind::Directory,
                size: 0,
                perm: 0o755,
                nlink: 2,
                uid,
                gid,
                mtime: now,
            }),
        }
    }

    /// Look up the `user.type` xattr of a column file: the storage class
    /// label of the stored value. `size` is the caller's buffer size; zero
    /// means "tell me how much room I need".
    pub fn getxattr(&self, path: &str, name: &str, size: u32) -> FsResult<XattrReply> {
        log::debug!("getxattr: {path} {name}");
        if name != TYPE_XATTR {
            return Err(FsError::NoData);
        }
        let (table, rowid, column) = match classify(path, &self.schema)? {
            PathKind::Attribute {
                table,
                rowid,
                column,
                ..
            } => (table, rowid, column),
            _ => return Err(FsError::NoData),
        };

        let label = self.gateway.get_attribute_type(table, rowid, column)?.label();
        if size == 0 {
            return Ok(XattrReply::Size(label.len() as u32));
        }
        if (size as usize) < label.len() {
            return Err(FsError::Range);
        }
        Ok(XattrReply::Value(label.as_bytes().to_vec()))
    }

    /// List a directory. Always starts with `.` and `..`; then tables at
    /// the root, rowids inside a table, and suffixed column files inside a
    /// row.
    pub fn readdir(&self, path: &str) -> FsResult<Vec<DirEntry>> {
        log::debug!("readdir: {path}");
        let mut entries = vec![
            DirEntry::new(".", EntryKind::Directory),
            DirEntry::new("..", EntryKind::Directory),
        ];

        match classify(path, &self.schema)? {
            PathKind::Root => {
                for table in self.schema.tables() {
                    entries.push(DirEntry::new(table.name.clone(), EntryKind::Directory));
                }
            }
            PathKind::TableDir { table } => {
                for rowid in self.gateway.get_table_rowids(table)? {
                    entries.push(DirEntry::new(rowid.to_string(), EntryKind::Directory));
                }
            }
            PathKind::RowDir { table, .. } => {
                let table_schema = self
                    .schema
                    .table(table)
                    .ok_or_else(|| FsError::bad_path(path))?;
                for column in table_schema.columns_in_listing_order() {
                    let kind = match table_schema.column_class(column) {
                        Some(ColumnClass::ForeignKey) => EntryKind::Symlink,
                        _ => EntryKind::File,
                    };
                    entries.push(DirEntry::new(format!("{column}{ATTR_SUFFIX}"), kind));
                }
            }
            PathKind::Attribute { .. } => return Err(FsError::bad_path(path)),
        }

        Ok(entries)
    }

    /// Read up to `size` bytes of a column file starting at `offset`.
    /// Reading at or past the end returns an empty buffer.
    pub fn read(&self, path: &str, size: u32, offset: i64) -> FsResult<Vec<u8>> {
        log::debug!("read: {path} size={size} offset={offset}");
        let (table, rowid, column) = self.expect_attribute(path)?;
        let content = self.gateway.get_attribute_bytes(table, rowid, column)?;

        let offset = offset.max(0) as usize;
        if offset >= content.len() {
            return Ok(Vec::new());
        }
        let end = content.len().min(offset.saturating_add(size as usize));
        Ok(content[offset..end].to_vec())
    }

    /// Write `data` to a column file. A write at offset zero overwrites the
    /// stored value; any other offset appends to it, ignoring the offset
    /// value itself. Returns the number of bytes accepted.
    pub fn write(&self, path: &str, data: &[u8], offset: i64) -> FsResult<u32> {
        log::debug!("write: {path} size={} offset={offset}", data.len());
        let (table, rowid, column) = self.expect_attribute(path)?;
        self.gateway
            .update_attribute_value(table, rowid, column, data, offset != 0)?;
        Ok(data.len() as u32)
    }

    /// Row insertion through the filesystem is not supported; creation is
    /// acknowledged and discarded.
    pub fn create(&self, path: &str, _mode: u32) -> FsResult<()> {
        log::debug!("create: {path} (ignored)");
        Ok(())
    }

    /// Resolve a foreign-key column file to the referenced column file.
    ///
    /// The referenced table may have a composite primary key, so every FK
    /// of this table pointing at the same referenced table participates in
    /// the row lookup; the link then lands on the chosen FK's referenced
    /// column.
    pub fn readlink(&self, path: &str) -> FsResult<String> {
        log::debug!("readlink: {path}");
        let (table, rowid, column) = self.expect_attribute(path)?;
        let table_schema = self
            .schema
            .table(table)
            .ok_or_else(|| FsError::bad_path(path))?;
        let chosen = table_schema
            .foreign_key(column)
            .ok_or_else(|| FsError::bad_path(path))?;

        let group = table_schema.fks_referencing(&chosen.referenced_table);
        let mut keys = Vec::with_capacity(group.len());
        for fk in &group {
            let value = self.gateway.get_attribute_bytes(table, rowid, &fk.from)?;
            keys.push((
                fk.referenced_column.as_str(),
                String::from_utf8_lossy(&value).into_owned(),
            ));
        }

        let target_rowid = self
            .gateway
            .get_rowid_by_fk_values(&chosen.referenced_table, &keys)?;

        Ok(format!(
            "../../{}/{}/{}{}",
            chosen.referenced_table, target_rowid, chosen.referenced_column, ATTR_SUFFIX
        ))
    }

    fn expect_attribute<'p>(&self, path: &'p str) -> FsResult<(&'p str, &'p str, &'p str)> {
        match classify(path, &self.schema)? {
            PathKind::Attribute {
                table,
                rowid,
                column,
                ..
            } => Ok((table, rowid, column)),
            _ => Err(FsError::bad_path(path)),
        }
    }
}
