//! sqlfs: mount a SQLite database as a POSIX filesystem.
//!
//! Tables appear as top-level directories, rows as subdirectories named by
//! rowid, and columns as `.vfs2db` files containing the stored value.
//! Foreign-key columns appear as symlinks to the referenced row's column
//! file.
//!
//! The crate is organized around the translator: [`translator::Translator`]
//! turns path + operation into database calls, backed by the
//! [`db::DbGateway`] (all SQLite access), the [`schema`] cache (built once
//! at mount), and the [`path`] classifier. [`fs::SqlFs`] adapts the
//! translator to the kernel FUSE interface.

pub mod db;
pub mod errors;
pub mod fs;
pub mod path;
pub mod schema;
pub mod translator;
