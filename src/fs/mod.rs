//! FUSE adapter: delivers kernel upcalls to the translator.
//!
//! The kernel API is inode-based while the translator is path-based, so the
//! adapter keeps a bidirectional inode-to-path table. Inode 1 is the root;
//! new inodes are assigned the first time a path is looked up and are never
//! recycled for the life of the mount.
//!
//! This is also the errno boundary: translator errors become errno values
//! here, and nowhere else. A single lock serializes every operation; the
//! database connection and the statement cache are never used concurrently.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

use fuser::{
    FileAttr, FileType, Filesystem, KernelConfig, MountOption, ReplyAttr, ReplyCreate, ReplyData,
    ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyWrite, ReplyXattr, Request, TimeOrNow,
};

use crate::db::DbGateway;
use crate::translator::{EntryKind, FileStat, Translator, XattrReply};

/// Attr and entry TTL handed to the kernel. Zero: the database can change
/// between any two calls, nothing may be cached.
const TTL: Duration = Duration::ZERO;

const ROOT_INO: u64 = 1;

/// Bidirectional inode-to-path map.
struct InodeTable {
    paths: HashMap<u64, String>,
    inos: HashMap<String, u64>,
    next: u64,
}

impl InodeTable {
    fn new() -> Self {
        let mut table = Self {
            paths: HashMap::new(),
            inos: HashMap::new(),
            next: ROOT_INO + 1,
        };
        table.paths.insert(ROOT_INO, "/".to_string());
        table.inos.insert("/".to_string(), ROOT_INO);
        table
    }

    fn path(&self, ino: u64) -> Option<String> {
        self.paths.get(&ino).cloned()
    }

    fn assign(&mut self, path: &str) -> u64 {
        if let Some(&ino) = self.inos.get(path) {
            return ino;
        }
        let ino = self.next;
        self.next += 1;
        self.paths.insert(ino, path.to_string());
        self.inos.insert(path.to_string(), ino);
        ino
    }

    fn child(parent: &str, name: &str) -> String {
        if parent == "/" {
            format!("/{name}")
        } else {
            format!("{parent}/{name}")
        }
    }

    fn parent(path: &str) -> &str {
        match path.rfind('/') {
            Some(0) | None => "/",
            Some(idx) => &path[..idx],
        }
    }
}

/// Mount lifecycle. All operations except `init` require `Ready`; a failed
/// `init` lands in `Terminated` without ever passing through `Ready`.
enum MountState {
    Unmounted(DbGateway),
    Ready(Translator),
    Terminated,
}

struct Inner {
    state: MountState,
    inodes: InodeTable,
}

/// The fuser-facing filesystem.
pub struct SqlFs {
    inner: Mutex<Inner>,
}

impl SqlFs {
    /// Wrap an opened database, ready to be mounted.
    pub fn new(gateway: DbGateway) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: MountState::Unmounted(gateway),
                inodes: InodeTable::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn file_type(kind: EntryKind) -> FileType {
    match kind {
        EntryKind::Directory => FileType::Directory,
        EntryKind::File => FileType::RegularFile,
        EntryKind::Symlink => FileType::Symlink,
    }
}

fn file_attr(ino: u64, stat: &FileStat) -> FileAttr {
    FileAttr {
        ino,
        size: stat.size,
        blocks: stat.size.div_ceil(512),
        atime: stat.mtime,
        mtime: stat.mtime,
        ctime: stat.mtime,
        crtime: stat.mtime,
        kind: file_type(stat.kind),
        perm: stat.perm,
        nlink: stat.nlink,
        uid: stat.uid,
        gid: stat.gid,
        rdev: 0,
        blksize: 512,
        flags: 0,
    }
}

/// Fetch the translator out of the state, or reply with an errno and bail.
macro_rules! translator {
    ($inner:expr, $reply:expr) => {
        match &$inner.state {
            MountState::Ready(t) => t,
            _ => {
                $reply.error(libc::EIO);
                return;
            }
        }
    };
}

impl Filesystem for SqlFs {
    fn init(&mut self, _req: &Request<'_>, _config: &mut KernelConfig) -> Result<(), libc::c_int> {
        let mut inner = self.lock();
        match std::mem::replace(&mut inner.state, MountState::Terminated) {
            MountState::Unmounted(gateway) => match Translator::mount(gateway) {
                Ok(translator) => {
                    inner.state = MountState::Ready(translator);
                    Ok(())
                }
                Err(e) => {
                    log::error!("mount failed: {e}");
                    Err(e.errno())
                }
            },
            // init twice: the gateway is gone, nothing to revive.
            _ => Err(libc::EIO),
        }
    }

    fn destroy(&mut self) {
        let mut inner = self.lock();
        if let MountState::Ready(translator) =
            std::mem::replace(&mut inner.state, MountState::Terminated)
        {
            translator.unmount();
        }
    }

    fn lookup(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let mut inner = self.lock();
        let Inner { state, inodes } = &mut *inner;
        let translator = match state {
            MountState::Ready(t) => t,
            _ => return reply.error(libc::EIO),
        };
        let (Some(parent_path), Some(name)) = (inodes.path(parent), name.to_str()) else {
            return reply.error(libc::ENOENT);
        };
        let path = InodeTable::child(&parent_path, name);
        match translator.getattr(&path, req.uid(), req.gid()) {
            Ok(stat) => {
                let ino = inodes.assign(&path);
                reply.entry(&TTL, &file_attr(ino, &stat), 0);
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn getattr(&mut self, req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        let inner = self.lock();
        let translator = translator!(inner, reply);
        let Some(path) = inner.inodes.path(ino) else {
            return reply.error(libc::ENOENT);
        };
        match translator.getattr(&path, req.uid(), req.gid()) {
            Ok(stat) => reply.attr(&TTL, &file_attr(ino, &stat)),
            Err(e) => reply.error(e.errno()),
        }
    }

    /// Attribute changes have nowhere to land (sizes are column values,
    /// times are synthesized), so setattr just re-stats. Truncation is
    /// subsumed by the overwrite semantics of a write at offset zero.
    #[allow(clippy::too_many_arguments)]
    fn setattr(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        _size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let inner = self.lock();
        let translator = translator!(inner, reply);
        let Some(path) = inner.inodes.path(ino) else {
            return reply.error(libc::ENOENT);
        };
        match translator.getattr(&path, req.uid(), req.gid()) {
            Ok(stat) => reply.attr(&TTL, &file_attr(ino, &stat)),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn readlink(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyData) {
        let inner = self.lock();
        let translator = translator!(inner, reply);
        let Some(path) = inner.inodes.path(ino) else {
            return reply.error(libc::ENOENT);
        };
        match translator.readlink(&path) {
            Ok(target) => reply.data(target.as_bytes()),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn create(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        let mut inner = self.lock();
        let Inner { state, inodes } = &mut *inner;
        let translator = match state {
            MountState::Ready(t) => t,
            _ => return reply.error(libc::EIO),
        };
        let (Some(parent_path), Some(name)) = (inodes.path(parent), name.to_str()) else {
            return reply.error(libc::ENOENT);
        };
        let path = InodeTable::child(&parent_path, name);
        match translator.create(&path, mode) {
            Ok(()) => {
                // No row was inserted; hand the kernel an empty file so the
                // creating process can proceed.
                let stat = FileStat {
                    kind: EntryKind::File,
                    size: 0,
                    perm: 0o644,
                    nlink: 1,
                    uid: req.uid(),
                    gid: req.gid(),
                    mtime: SystemTime::now(),
                };
                let ino = inodes.assign(&path);
                reply.created(&TTL, &file_attr(ino, &stat), 0, 0, 0);
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let inner = self.lock();
        let translator = translator!(inner, reply);
        let Some(path) = inner.inodes.path(ino) else {
            return reply.error(libc::ENOENT);
        };
        match translator.read(&path, size, offset) {
            Ok(bytes) => reply.data(&bytes),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let inner = self.lock();
        let translator = translator!(inner, reply);
        let Some(path) = inner.inodes.path(ino) else {
            return reply.error(libc::ENOENT);
        };
        match translator.write(&path, data, offset) {
            Ok(written) => reply.written(written),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let mut inner = self.lock();
        let Inner { state, inodes } = &mut *inner;
        let translator = match state {
            MountState::Ready(t) => t,
            _ => return reply.error(libc::EIO),
        };
        let Some(path) = inodes.path(ino) else {
            return reply.error(libc::ENOENT);
        };
        let entries = match translator.readdir(&path) {
            Ok(entries) => entries,
            Err(e) => return reply.error(e.errno()),
        };
        for (i, entry) in entries.iter().enumerate().skip(offset.max(0) as usize) {
            let entry_ino = match entry.name.as_str() {
                "." => ino,
                ".." => inodes.assign(InodeTable::parent(&path)),
                name => inodes.assign(&InodeTable::child(&path, name)),
            };
            if reply.add(entry_ino, (i + 1) as i64, file_type(entry.kind), &entry.name) {
                break;
            }
        }
        reply.ok();
    }

    fn getxattr(&mut self, _req: &Request<'_>, ino: u64, name: &OsStr, size: u32, reply: ReplyXattr) {
        let inner = self.lock();
        let translator = translator!(inner, reply);
        let Some(path) = inner.inodes.path(ino) else {
            return reply.error(libc::ENOENT);
        };
        let Some(name) = name.to_str() else {
            return reply.error(libc::ENODATA);
        };
        match translator.getxattr(&path, name, size) {
            Ok(XattrReply::Size(needed)) => reply.size(needed),
            Ok(XattrReply::Value(value)) => reply.data(&value),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn access(&mut self, _req: &Request<'_>, _ino: u64, _mask: i32, reply: ReplyEmpty) {
        // Whatever the database file's own permissions allowed, allow.
        reply.ok();
    }
}

/// Map one `-o` option string to a typed fuser mount option. Unrecognized
/// options pass through to the kernel unchanged.
pub fn mount_option(opt: &str) -> MountOption {
    match opt {
        "auto_unmount" => MountOption::AutoUnmount,
        "allow_other" => MountOption::AllowOther,
        "allow_root" => MountOption::AllowRoot,
        "default_permissions" => MountOption::DefaultPermissions,
        "dev" => MountOption::Dev,
        "nodev" => MountOption::NoDev,
        "suid" => MountOption::Suid,
        "nosuid" => MountOption::NoSuid,
        "ro" => MountOption::RO,
        "rw" => MountOption::RW,
        "exec" => MountOption::Exec,
        "noexec" => MountOption::NoExec,
        "atime" => MountOption::Atime,
        "noatime" => MountOption::NoAtime,
        "dirsync" => MountOption::DirSync,
        "sync" => MountOption::Sync,
        "async" => MountOption::Async,
        other => MountOption::CUSTOM(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inode_table_roundtrip() {
        let mut table = InodeTable::new();
        assert_eq!(table.path(ROOT_INO).as_deref(), Some("/"));

        let orders = table.assign("/orders");
        assert_ne!(orders, ROOT_INO);
        assert_eq!(table.assign("/orders"), orders);
        assert_eq!(table.path(orders).as_deref(), Some("/orders"));
        assert_eq!(table.path(999), None);
    }

    #[test]
    fn child_and_parent_paths() {
        assert_eq!(InodeTable::child("/", "orders"), "/orders");
        assert_eq!(InodeTable::child("/orders", "1"), "/orders/1");
        assert_eq!(InodeTable::parent("/orders/1"), "/orders");
        assert_eq!(InodeTable::parent("/orders"), "/");
        assert_eq!(InodeTable::parent("/"), "/");
    }

    #[test]
    fn unknown_mount_options_pass_through() {
        assert_eq!(mount_option("ro"), MountOption::RO);
        assert_eq!(mount_option("allow_other"), MountOption::AllowOther);
        assert_eq!(
            mount_option("fsname=whatever"),
            MountOption::CUSTOM("fsname=whatever".to_string())
        );
    }
}
