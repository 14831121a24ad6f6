//! Error kinds for filesystem operations.
//!
//! Every failure inside the translator stack is one of these kinds; the FUSE
//! adapter converts them to errno values at the kernel boundary. Database
//! errors are never silently swallowed, they ride along as the source.

use thiserror::Error;

/// A failed filesystem operation.
#[derive(Debug, Error)]
pub enum FsError {
    /// Any failure from the database layer (prepare, bind, step).
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    /// The database returned no row where one was expected.
    #[error("row not found")]
    RowNotFound,

    /// The path does not match the grammar, or names an unknown table or
    /// column.
    #[error("unrecognized path: {0}")]
    BadPath(String),

    /// Extended attribute name other than `user.type`.
    #[error("no such extended attribute")]
    NoData,

    /// Caller-supplied xattr buffer is too small for the value.
    #[error("buffer too small")]
    Range,
}

/// Convenient result alias used throughout the translator stack.
pub type FsResult<T> = Result<T, FsError>;

impl FsError {
    /// The errno this failure maps to at the VFS boundary.
    pub fn errno(&self) -> i32 {
        match self {
            FsError::Db(_) => libc::EIO,
            FsError::RowNotFound => libc::ENOENT,
            FsError::BadPath(_) => libc::ENOENT,
            FsError::NoData => libc::ENODATA,
            FsError::Range => libc::ERANGE,
        }
    }

    /// Shorthand for a `BadPath` carrying the offending path.
    pub fn bad_path(path: &str) -> Self {
        FsError::BadPath(path.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_mapping() {
        assert_eq!(FsError::RowNotFound.errno(), libc::ENOENT);
        assert_eq!(FsError::bad_path("/nope").errno(), libc::ENOENT);
        assert_eq!(FsError::NoData.errno(), libc::ENODATA);
        assert_eq!(FsError::Range.errno(), libc::ERANGE);
        assert_eq!(
            FsError::Db(rusqlite::Error::QueryReturnedNoRows).errno(),
            libc::EIO
        );
    }
}
