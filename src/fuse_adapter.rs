//! Thin `fuser::Filesystem` impl translating kernel calls 1:1 onto
//! `core::facade::Facade` methods, mirroring the teacher's
//! `rfs_lib::fuse::Filesystem for RFS<T>` impl. Out of spec scope
//! (spec.md §1: "the kernel-side user-space filesystem adapter... not
//! specified") beyond "call the facade".

use crate::core::error::CoreError;
use crate::core::facade::Facade;
use crate::core::tree::is_dir;
use crate::core::xattr::SetFlags;
use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory, ReplyEmpty,
    ReplyEntry, ReplyWrite, ReplyXattr, Request,
};
use libc::ENOENT;
use log::{debug, warn};
use std::ffi::OsStr;
use std::time::{Duration, SystemTime};
use storage::Backing;

const TTL: Duration = Duration::from_secs(1);

/// Replies with the errno for `err` and returns early. Mirrors the
/// teacher's `rep!` macro, generalized from a single ext2 error path to
/// the full `CoreError` taxonomy via `CoreError::to_errno`.
macro_rules! rep {
    ($reply:expr, $result:expr) => {
        match $result {
            Ok(v) => v,
            Err(e) => {
                warn!("fuse op failed: {e}");
                $reply.error(e.to_errno());
                return;
            }
        }
    };
}

pub struct PfsFuse<B: Backing> {
    facade: Facade<B>,
}

impl<B: Backing> PfsFuse<B> {
    pub fn new(facade: Facade<B>) -> Self {
        Self { facade }
    }

    fn to_attr(&self, ino: u64, attr: crate::core::facade::Attr) -> FileAttr {
        let kind = if attr.is_dir { FileType::Directory } else { FileType::RegularFile };
        let mtime = SystemTime::UNIX_EPOCH + Duration::from_secs(attr.mtime as u64);
        FileAttr {
            ino,
            size: attr.size,
            blocks: (attr.size + self.facade.block_size() as u64 - 1) / self.facade.block_size() as u64,
            atime: mtime,
            mtime,
            ctime: mtime,
            crtime: mtime,
            kind,
            perm: (attr.mode & 0o7777) as u16,
            nlink: 1,
            uid: 0,
            gid: 0,
            rdev: 0,
            blksize: self.facade.block_size(),
            flags: 0,
        }
    }

    fn resolve(&self, ino: u64) -> Result<u32, CoreError> {
        self.facade.index_of_inode(ino as u32)
    }
}

impl<B: Backing> Filesystem for PfsFuse<B> {
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let parent_idx = rep!(reply, self.resolve(parent));
        let name = match name.to_str() {
            Some(n) => n,
            None => return reply.error(libc::EINVAL),
        };
        let (idx, attr) = rep!(reply, self.facade.lookup(parent_idx, name));
        let ino = rep!(reply, self.facade.inode_of(idx));
        reply.entry(&TTL, &self.to_attr(ino as u64, attr), 0);
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        let idx = rep!(reply, self.resolve(ino));
        let attr = rep!(reply, self.facade.getattr(idx));
        reply.attr(&TTL, &self.to_attr(ino, attr));
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<fuser::TimeOrNow>,
        _mtime: Option<fuser::TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let idx = rep!(reply, self.resolve(ino));
        if let Some(sz) = size {
            rep!(reply, self.facade.truncate(idx, sz));
        }
        if let Some(m) = mode {
            rep!(reply, self.facade.chmod(idx, m as u16));
        }
        let attr = rep!(reply, self.facade.getattr(idx));
        reply.attr(&TTL, &self.to_attr(ino, attr));
    }

    fn mkdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, mode: u32, _umask: u32, reply: ReplyEntry) {
        let parent_idx = rep!(reply, self.resolve(parent));
        let name = name.to_str().unwrap_or("");
        let (idx, attr) = rep!(reply, self.facade.mkdir(parent_idx, name, mode as u16));
        let ino = rep!(reply, self.facade.inode_of(idx));
        reply.entry(&TTL, &self.to_attr(ino as u64, attr), 0);
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        let parent_idx = rep!(reply, self.resolve(parent));
        let name = name.to_str().unwrap_or("");
        let (idx, attr) = rep!(reply, self.facade.create(parent_idx, name, mode as u16));
        let ino = rep!(reply, self.facade.inode_of(idx));
        reply.created(&TTL, &self.to_attr(ino as u64, attr), 0, 0, 0);
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let parent_idx = rep!(reply, self.resolve(parent));
        let name = name.to_str().unwrap_or("");
        rep!(reply, self.facade.unlink(parent_idx, name));
        reply.ok();
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let parent_idx = rep!(reply, self.resolve(parent));
        let name = name.to_str().unwrap_or("");
        rep!(reply, self.facade.rmdir(parent_idx, name));
        reply.ok();
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
        let idx = rep!(reply, self.resolve(ino));
        let data = rep!(reply, self.facade.read(idx, offset.max(0) as u64, size));
        reply.data(&data);
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
        let idx = rep!(reply, self.resolve(ino));
        let written = rep!(reply, self.facade.write(idx, offset.max(0) as u64, data));
        reply.written(written);
    }

    fn readdir(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, offset: i64, mut reply: ReplyDirectory) {
        let idx = rep!(reply, self.resolve(ino));
        let entries = rep!(reply, self.facade.readdir(idx));
        for (i, (name, child_idx)) in entries.iter().enumerate().skip(offset as usize) {
            let child_inode = match self.facade.inode_of(*child_idx) {
                Ok(v) => v,
                Err(_) => continue,
            };
            let attr = match self.facade.getattr(*child_idx) {
                Ok(a) => a,
                Err(_) => continue,
            };
            let kind = if is_dir(attr.mode) { FileType::Directory } else { FileType::RegularFile };
            if reply.add(child_inode as u64, (i + 1) as i64, kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn getxattr(&mut self, _req: &Request<'_>, ino: u64, name: &OsStr, size: u32, reply: ReplyXattr) {
        let idx = rep!(reply, self.resolve(ino));
        let name = name.to_str().unwrap_or("");
        let mut buf = vec![0u8; size as usize];
        let len = rep!(reply, self.facade.getxattr(idx, name, &mut buf));
        if size == 0 {
            reply.size(len as u32);
        } else {
            reply.data(&buf[..len]);
        }
    }

    fn setxattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        name: &OsStr,
        value: &[u8],
        _flags: i32,
        _position: u32,
        reply: ReplyEmpty,
    ) {
        let idx = rep!(reply, self.resolve(ino));
        let name = name.to_str().unwrap_or("");
        rep!(reply, self.facade.setxattr(idx, name, value, SetFlags::default()));
        reply.ok();
    }

    fn listxattr(&mut self, _req: &Request<'_>, ino: u64, size: u32, reply: ReplyXattr) {
        let idx = rep!(reply, self.resolve(ino));
        let mut buf = vec![0u8; size as usize];
        let len = rep!(reply, self.facade.listxattr(idx, &mut buf));
        if size == 0 {
            reply.size(len as u32);
        } else {
            reply.data(&buf[..len]);
        }
    }

    fn removexattr(&mut self, _req: &Request<'_>, ino: u64, name: &OsStr, reply: ReplyEmpty) {
        let idx = rep!(reply, self.resolve(ino));
        let name = name.to_str().unwrap_or("");
        rep!(reply, self.facade.removexattr(idx, name));
        reply.ok();
    }

    fn fsync(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _datasync: bool, reply: ReplyEmpty) {
        rep!(reply, self.facade.fsync());
        reply.ok();
    }

    fn fsyncdir(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _datasync: bool, reply: ReplyEmpty) {
        rep!(reply, self.facade.fsync());
        reply.ok();
    }

    fn destroy(&mut self) {
        if let Err(e) = self.facade.fsync_fs() {
            warn!("final fsync on unmount failed: {e}");
        }
        debug!("unmounted");
    }

    fn access(&mut self, _req: &Request<'_>, ino: u64, _mask: i32, reply: ReplyEmpty) {
        match self.resolve(ino) {
            Ok(_) => reply.ok(),
            Err(_) => reply.error(ENOENT),
        }
    }
}
