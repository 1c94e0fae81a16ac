//! C11 — translates POSIX-level calls into calls on C1-C10 under the
//! locking rules of §5, routing WAL logging on every mutating path.

use crate::core::block::{BlockAllocator, HOLE};
use crate::core::config::Config;
use crate::core::error::{CoreError, CoreResult};
use crate::core::extent::ExtentMap;
use crate::core::layout::{self, Header, SectionLayout};
use crate::core::lock::{NodeReadToken, NodeWriteToken, TreeLock};
use crate::core::recovery::{self, DataPlane};
use crate::core::tree::{is_dir, Tree, S_IFDIR, S_IFREG};
use crate::core::wal::Wal;
use crate::core::xattr::{Namespace, SetFlags, XattrPool};
use log::{debug, info};
use std::collections::HashMap;
use std::sync::Arc;
use storage::Backing;

pub const R_OK: u8 = 4;
pub const W_OK: u8 = 2;
pub const X_OK: u8 = 1;

/// Attributes the facade hands back to the kernel adapter, mirroring the
/// fields `rfs_lib`'s `to_attr` helper assembled from an ext2 inode.
#[derive(Debug, Clone, Copy)]
pub struct Attr {
    pub inode: u64,
    pub size: u64,
    pub mtime: u32,
    pub mode: u16,
    pub is_dir: bool,
}

/// Every node is implicitly owned by the uid/gid the filesystem was
/// mounted under; the packed 64 B node (spec.md §3) has no room for
/// per-inode owner fields, so ownership checks collapse to one
/// filesystem-wide owner plus the standard owner/group/other mode bits and
/// a uid-0 superuser bypass. Recorded as an Open Question resolution in
/// DESIGN.md.
pub fn check_permission(mode: u16, owner_uid: u32, owner_gid: u32, req_uid: u32, req_gid: u32, access: u8) -> CoreResult<()> {
    if req_uid == 0 {
        return Ok(());
    }
    let perm_bits = (mode & 0o777) as u32;
    let shift = if req_uid == owner_uid {
        6
    } else if req_gid == owner_gid {
        3
    } else {
        0
    };
    let granted = (perm_bits >> shift) & 0o7;
    if granted & access as u32 == access as u32 {
        Ok(())
    } else {
        Err(CoreError::PermissionDenied)
    }
}

/// RAII wrapper around the opaque per-node lock tokens (spec.md §4.3):
/// holds a read or write token and releases it on drop, so every facade
/// method that takes one always gives it back, including on early returns
/// through `?`. Declared after the topology guard at each call site so
/// Rust's reverse-drop-order releases node, then topology — matching the
/// acquisition order (topology, then parent, then child) in reverse.
enum NodeGuard<'a> {
    Read(&'a TreeLock, Option<NodeReadToken>),
    Write(&'a TreeLock, Option<NodeWriteToken>),
}

impl<'a> NodeGuard<'a> {
    fn read(lock: &'a TreeLock, index: u32) -> CoreResult<Self> {
        Ok(NodeGuard::Read(lock, Some(lock.node_read(index)?)))
    }

    fn write(lock: &'a TreeLock, index: u32) -> CoreResult<Self> {
        Ok(NodeGuard::Write(lock, Some(lock.node_write(index)?)))
    }
}

impl Drop for NodeGuard<'_> {
    fn drop(&mut self) {
        match self {
            NodeGuard::Read(lock, token) => {
                if let Some(t) = token.take() {
                    lock.unlock_read(t);
                }
            }
            NodeGuard::Write(lock, token) => {
                if let Some(t) = token.take() {
                    lock.unlock_write(t);
                }
            }
        }
    }
}

pub struct Facade<B: Backing> {
    config: Config,
    tree: Tree,
    lock: TreeLock,
    block_alloc: BlockAllocator,
    extents: HashMap<u32, ExtentMap>,
    xattrs: XattrPool,
    /// Block-addressed byte arena the extent map indexes into (spec.md
    /// §4.4/§4.5's C4/C5 storage); the flat per-inode `HashMap<u32, Vec<u8>>`
    /// that `layout::persist_all`/`read_all` trade in is only ever a
    /// transient snapshot of this, built by `snapshot_files` and consumed by
    /// `rehydrate`.
    data_store: Vec<u8>,
    wal: Arc<Wal>,
    backing: B,
    header: Header,
    owner_uid: u32,
    owner_gid: u32,
}

impl<B: Backing> Facade<B> {
    /// Attaches an existing persistent image or creates one, per spec.md
    /// §4.9: validate the header if present, otherwise write a fresh one
    /// and emit an empty root, then run recovery before returning.
    pub fn mount(path: &str, config: Config, data_capacity: u64) -> CoreResult<Self> {
        let wal_section_size = layout::wal_section_len(config.wal_size);
        let sections = SectionLayout::compute(4 * 1024 * 1024, 4 * 1024 * 1024, data_capacity, wal_section_size);
        let total_len = sections.total_len();

        let mut backing = match B::open(path, total_len, false) {
            Ok(b) => b,
            Err(_) => B::open(path, total_len, true).map_err(|e| CoreError::IoError(e.to_string()))?,
        };

        let (header, tree, files, xattrs, wal) = match layout::read_header(&mut backing) {
            Ok(h) => {
                info!("attached existing persistent image at {path}");
                let loaded = layout::read_all(&mut backing, &h, &config)?;
                (h, loaded.tree, loaded.files, loaded.xattrs, loaded.wal)
            }
            Err(_) => {
                let mut h = Header::new(&sections);
                layout::write_header(&mut backing, &mut h)?;
                let tree = Tree::init(&config)?;
                let wal = Wal::new(
                    config.wal_size,
                    config.auto_checkpoint,
                    config.checkpoint_entries,
                    config.checkpoint_interval,
                )?;
                layout::persist_all(
                    &mut backing,
                    &h,
                    &tree,
                    &HashMap::new(),
                    &XattrPool::new(),
                    &wal,
                    config.compression_threshold,
                )?;
                info!("created new persistent image at {path}");
                (h, tree, HashMap::new(), XattrPool::new(), wal)
            }
        };

        let capacity_blocks = (data_capacity / config.block_size as u64) as u32;
        let block_alloc = BlockAllocator::new(config.block_size, capacity_blocks);
        let data_store = vec![0u8; capacity_blocks as usize * config.block_size as usize];

        let mut facade = Self {
            lock: TreeLock::new(config.lock_timeout),
            config,
            tree,
            block_alloc,
            extents: HashMap::new(),
            xattrs,
            data_store,
            wal: Arc::new(wal),
            backing,
            header,
            owner_uid: 0,
            owner_gid: 0,
        };
        facade.lock.ensure_capacity(facade.tree.len());
        facade.rehydrate(files)?;
        facade.recover()?;
        Ok(facade)
    }

    /// Runs analysis/redo/undo against the current WAL snapshot. A no-op
    /// on a freshly created image. Exposed so tests can simulate a crash
    /// (begin a transaction, log, and never commit) without tearing down
    /// the process, matching spec.md §8 scenario 5's phrasing literally.
    ///
    /// Redo/undo (`core::recovery`) work over a flat per-inode byte buffer
    /// rather than the block allocator/extent map directly, so recovery
    /// snapshots the current block store into that flat shape, replays the
    /// log against it, then pushes the result back through the real
    /// block-addressed store via `rehydrate`.
    pub fn recover(&mut self) -> CoreResult<()> {
        let (buf, head, tail) = self.wal.snapshot();
        let mut files = self.snapshot_files()?;
        let mut plane = DataPlane {
            tree: &mut self.tree,
            files: &mut files,
            xattrs: &mut self.xattrs,
        };
        recovery::recover(&buf, head, tail, &mut plane)?;
        self.lock.ensure_capacity(self.tree.len());
        self.rehydrate(files)?;
        Ok(())
    }

    /// Assembles a flat per-inode byte buffer for every inode with live
    /// extents, reading its full content back out of the block store. Used
    /// as the interchange shape `core::recovery` and `layout::persist_all`
    /// both expect.
    fn snapshot_files(&self) -> CoreResult<HashMap<u32, Vec<u8>>> {
        let mut out = HashMap::with_capacity(self.extents.len());
        for &inode in self.extents.keys() {
            let idx = self.tree.find_by_inode(inode)?;
            let size = self.tree.node(idx)?.size;
            let bytes = if size > 0 { self.read_bytes(inode, 0, size)? } else { Vec::new() };
            out.insert(inode, bytes);
        }
        Ok(out)
    }

    /// Pushes a flat per-inode byte buffer (from `layout::read_all` at
    /// mount, or from `core::recovery`'s replay) through the block
    /// allocator and extent map, freeing whatever blocks that inode
    /// previously held first so re-hydrating twice (as `recover` does on
    /// every mount) never leaks blocks.
    fn rehydrate(&mut self, files: HashMap<u32, Vec<u8>>) -> CoreResult<()> {
        for (inode, bytes) in files {
            if let Some(mut em) = self.extents.remove(&inode) {
                em.truncate(0, self.config.block_size, &mut self.block_alloc);
            }
            let idx = match self.tree.find_by_inode(inode) {
                Ok(idx) => idx,
                Err(_) => continue,
            };
            if !bytes.is_empty() {
                self.write_bytes(inode, 0, &bytes)?;
            }
            self.tree.set_size_mtime(idx, Some(bytes.len() as u64), false)?;
        }
        Ok(())
    }

    /// Writes `data` at `offset` into the block-addressed arena backing
    /// `inode`, allocating blocks through C4 and registering them in C5's
    /// extent map one block at a time (adjacent allocations merge via
    /// `ExtentMap::add`'s merge rule). The only writer of `self.data_store`.
    fn write_bytes(&mut self, inode: u32, offset: u64, data: &[u8]) -> CoreResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        let block_size = self.config.block_size as u64;
        let mut pos = offset;
        let mut written = 0usize;
        while written < data.len() {
            let block_start = (pos / block_size) * block_size;
            let offset_in_block = (pos - block_start) as usize;
            let chunk_len = (block_size as usize - offset_in_block).min(data.len() - written);

            let mapped = self
                .extents
                .get(&inode)
                .and_then(|em| em.map(block_start, block_size as u32).ok())
                .filter(|&(b, _)| b != HOLE);
            let phys_block = match mapped {
                Some((b, _)) => b,
                None => {
                    let first = self.block_alloc.alloc(1)?;
                    let extent_map = self
                        .extents
                        .entry(inode)
                        .or_insert_with(|| ExtentMap::new(self.config.inline_extents, self.config.spill_extents));
                    extent_map.add(block_start, first, 1, block_size as u32, &mut self.block_alloc)?;
                    first
                }
            };

            let (addr_start, _) = self.block_alloc.get_addr(phys_block)?;
            let dest = addr_start as usize + offset_in_block;
            self.data_store[dest..dest + chunk_len].copy_from_slice(&data[written..written + chunk_len]);

            pos += chunk_len as u64;
            written += chunk_len;
        }
        Ok(())
    }

    /// Reads `len` bytes starting at `offset` out of `inode`'s extents,
    /// the C5 `ExtentMap::map` lookup translating each logical block to its
    /// C4 physical address; logical ranges with no extent (holes, or bytes
    /// past what's ever been written) read back as zero.
    fn read_bytes(&self, inode: u32, offset: u64, len: u64) -> CoreResult<Vec<u8>> {
        if len == 0 {
            return Ok(Vec::new());
        }
        let block_size = self.config.block_size as u64;
        let end = offset + len;
        let mut out = Vec::with_capacity(len as usize);
        let mut pos = offset;
        while pos < end {
            let block_start = (pos / block_size) * block_size;
            let offset_in_block = (pos - block_start) as usize;
            let chunk_len = (block_size as usize - offset_in_block).min((end - pos) as usize);

            let mapped = self.extents.get(&inode).and_then(|em| em.map(block_start, block_size as u32).ok());
            match mapped {
                Some((b, _)) if b != HOLE => {
                    let (addr_start, _) = self.block_alloc.get_addr(b)?;
                    let src = addr_start as usize + offset_in_block;
                    out.extend_from_slice(&self.data_store[src..src + chunk_len]);
                }
                _ => out.extend(std::iter::repeat(0u8).take(chunk_len)),
            }
            pos += chunk_len as u64;
        }
        Ok(out)
    }

    fn attr_of(&self, index: u32) -> CoreResult<Attr> {
        let n = self.tree.node(index)?;
        Ok(Attr {
            inode: n.inode as u64,
            size: n.size,
            mtime: n.mtime,
            mode: n.mode,
            is_dir: is_dir(n.mode),
        })
    }

    pub fn lookup(&self, parent: u32, name: &str) -> CoreResult<(u32, Attr)> {
        let _topo = self.lock.topology_read()?;
        let idx = self.tree.find_child(parent, name)?;
        let _node = NodeGuard::read(&self.lock, idx)?;
        Ok((idx, self.attr_of(idx)?))
    }

    pub fn getattr(&self, inode: u32) -> CoreResult<Attr> {
        let _topo = self.lock.topology_read()?;
        let _node = NodeGuard::read(&self.lock, inode)?;
        self.attr_of(inode)
    }

    pub fn readdir(&self, parent: u32) -> CoreResult<Vec<(String, u32)>> {
        let _topo = self.lock.topology_read()?;
        self.tree.children_of(parent)
    }

    fn log_insert_record(&self, tx: u64, parent_idx: u32, inode: u32, mode: u16, name: &str) -> CoreResult<()> {
        let parent_inode = self.tree.node(parent_idx)?.inode;
        self.wal
            .log_insert(tx, &recovery::payload::encode_insert(parent_inode, inode, mode, name))?;
        Ok(())
    }

    fn create_node(&mut self, parent: u32, name: &str, mode: u16) -> CoreResult<(u32, Attr)> {
        let _topo = self.lock.topology_write()?;
        let _parent_node = NodeGuard::write(&self.lock, parent)?;
        let tx = self.wal.begin_tx();
        let result = (|| -> CoreResult<u32> {
            let idx = self.tree.insert(parent, name, mode)?;
            let inode = self.tree.node(idx)?.inode;
            self.log_insert_record(tx, parent, inode, mode, name)?;
            Ok(idx)
        })();
        match result {
            Ok(idx) => {
                self.wal.commit_tx(tx)?;
                self.lock.ensure_capacity(self.tree.len());
                Ok((idx, self.attr_of(idx)?))
            }
            Err(e) => {
                self.wal.abort_tx(tx)?;
                Err(e)
            }
        }
    }

    pub fn create(&mut self, parent: u32, name: &str, mode: u16) -> CoreResult<(u32, Attr)> {
        self.create_node(parent, name, S_IFREG | (mode & 0o7777))
    }

    pub fn mkdir(&mut self, parent: u32, name: &str, mode: u16) -> CoreResult<(u32, Attr)> {
        self.create_node(parent, name, S_IFDIR | (mode & 0o7777))
    }

    fn remove_node(&mut self, parent: u32, name: &str) -> CoreResult<()> {
        let _topo = self.lock.topology_write()?;
        let _parent_node = NodeGuard::write(&self.lock, parent)?;
        let idx = self.tree.find_child(parent, name)?;
        let _child_node = NodeGuard::write(&self.lock, idx)?;
        let node = *self.tree.node(idx)?;
        let parent_inode = self.tree.node(parent)?.inode;

        let tx = self.wal.begin_tx();
        let result = (|| -> CoreResult<()> {
            self.wal.log_delete(
                tx,
                &recovery::payload::encode_delete(parent_inode, node.inode, node.mode, name),
            )?;
            self.tree.delete(idx)?;
            Ok(())
        })();
        match result {
            Ok(()) => {
                self.wal.commit_tx(tx)?;
                let mut head = node.xattr_head;
                self.xattrs.free_all(&mut head);
                if let Some(mut em) = self.extents.remove(&node.inode) {
                    em.truncate(0, self.config.block_size, &mut self.block_alloc);
                }
                Ok(())
            }
            Err(e) => {
                self.wal.abort_tx(tx)?;
                Err(e)
            }
        }
    }

    pub fn unlink(&mut self, parent: u32, name: &str) -> CoreResult<()> {
        let idx = {
            let _topo = self.lock.topology_read()?;
            self.tree.find_child(parent, name)?
        };
        if is_dir(self.tree.node(idx)?.mode) {
            return Err(CoreError::IsADirectory);
        }
        self.remove_node(parent, name)
    }

    pub fn rmdir(&mut self, parent: u32, name: &str) -> CoreResult<()> {
        let idx = {
            let _topo = self.lock.topology_read()?;
            self.tree.find_child(parent, name)?
        };
        if !is_dir(self.tree.node(idx)?.mode) {
            return Err(CoreError::NotADirectory);
        }
        self.remove_node(parent, name)
    }

    pub fn read(&mut self, inode_idx: u32, offset: u64, len: u32) -> CoreResult<Vec<u8>> {
        let _topo = self.lock.topology_read()?;
        let _node_guard = NodeGuard::read(&self.lock, inode_idx)?;
        let node = *self.tree.node(inode_idx)?;
        if is_dir(node.mode) {
            return Err(CoreError::IsADirectory);
        }
        let start = offset.min(node.size);
        let read_len = (len as u64).min(node.size - start);
        self.read_bytes(node.inode, start, read_len)
    }

    pub fn write(&mut self, inode_idx: u32, offset: u64, data: &[u8]) -> CoreResult<u32> {
        let _topo = self.lock.topology_read()?;
        let _node_guard = NodeGuard::write(&self.lock, inode_idx)?;
        let node = *self.tree.node(inode_idx)?;
        if is_dir(node.mode) {
            return Err(CoreError::IsADirectory);
        }

        let tx = self.wal.begin_tx();
        let result = (|| -> CoreResult<u64> {
            let prev_len = node.size;
            let end = offset + data.len() as u64;
            let prev_slice = if offset < prev_len {
                self.read_bytes(node.inode, offset, prev_len.min(end) - offset)?
            } else {
                Vec::new()
            };
            self.wal
                .log_write(tx, &recovery::payload::encode_write(node.inode, offset, data, &prev_slice))?;
            self.write_bytes(node.inode, offset, data)?;
            Ok(end.max(prev_len))
        })();

        match result {
            Ok(new_size) => {
                self.wal.commit_tx(tx)?;
                self.tree.set_size_mtime(inode_idx, Some(new_size), true)?;
                Ok(data.len() as u32)
            }
            Err(e) => {
                self.wal.abort_tx(tx)?;
                Err(e)
            }
        }
    }

    pub fn truncate(&mut self, inode_idx: u32, new_size: u64) -> CoreResult<()> {
        let _topo = self.lock.topology_read()?;
        let _node_guard = NodeGuard::write(&self.lock, inode_idx)?;
        let node = *self.tree.node(inode_idx)?;
        let tx = self.wal.begin_tx();
        let old_size = node.size;
        self.wal.log_update(
            tx,
            &recovery::payload::encode_update(node.inode, old_size, new_size, node.mode, node.mode),
        )?;
        self.wal.commit_tx(tx)?;

        if let Some(em) = self.extents.get_mut(&node.inode) {
            em.truncate(new_size, self.config.block_size, &mut self.block_alloc);
        }
        self.tree.set_size_mtime(inode_idx, Some(new_size), true)?;
        Ok(())
    }

    pub fn chmod(&mut self, inode_idx: u32, mode: u16) -> CoreResult<()> {
        let _topo = self.lock.topology_read()?;
        let _node_guard = NodeGuard::write(&self.lock, inode_idx)?;
        let node = *self.tree.node(inode_idx)?;
        let new_mode = (node.mode & 0xF000) | (mode & 0o7777);
        let tx = self.wal.begin_tx();
        self.wal
            .log_update(tx, &recovery::payload::encode_update(node.inode, node.size, node.size, node.mode, new_mode))?;
        self.wal.commit_tx(tx)?;
        self.tree.set_mode(inode_idx, new_mode)
    }

    pub fn getxattr(&self, inode_idx: u32, name: &str, buf: &mut [u8]) -> CoreResult<usize> {
        let _topo = self.lock.topology_read()?;
        let _node_guard = NodeGuard::read(&self.lock, inode_idx)?;
        let node = self.tree.node(inode_idx)?;
        self.xattrs.get(node.xattr_head, name, buf)
    }

    pub fn setxattr(&mut self, inode_idx: u32, name: &str, value: &[u8], flags: SetFlags) -> CoreResult<()> {
        let _topo = self.lock.topology_read()?;
        let _node_guard = NodeGuard::write(&self.lock, inode_idx)?;
        let mut head = self.tree.node(inode_idx)?.xattr_head;
        self.xattrs.set(&mut head, name, value, flags)?;
        self.tree.set_xattr_head(inode_idx, head)
    }

    pub fn listxattr(&self, inode_idx: u32, buf: &mut [u8]) -> CoreResult<usize> {
        let _topo = self.lock.topology_read()?;
        let _node_guard = NodeGuard::read(&self.lock, inode_idx)?;
        let node = self.tree.node(inode_idx)?;
        self.xattrs.list(node.xattr_head, buf)
    }

    pub fn removexattr(&mut self, inode_idx: u32, name: &str) -> CoreResult<()> {
        let _topo = self.lock.topology_read()?;
        let _node_guard = NodeGuard::write(&self.lock, inode_idx)?;
        let mut head = self.tree.node(inode_idx)?.xattr_head;
        self.xattrs.remove(&mut head, name)?;
        self.tree.set_xattr_head(inode_idx, head)
    }

    pub fn namespace_of(name: &str) -> CoreResult<Namespace> {
        for ns in [Namespace::Security, Namespace::System, Namespace::User, Namespace::Trusted] {
            if name.starts_with(ns.prefix()) {
                return Ok(ns);
            }
        }
        Err(CoreError::BadNamespace)
    }

    pub fn path_lookup(&self, path: &str) -> CoreResult<u32> {
        let _topo = self.lock.topology_read()?;
        self.tree.path_lookup(path)
    }

    /// Flushes data files, emits a final checkpoint, and `msync`s
    /// everything (spec.md §4.9's unmount contract).
    pub fn fsync(&mut self) -> CoreResult<()> {
        self.wal.flush()?;
        let files = self.snapshot_files()?;
        layout::persist_all(
            &mut self.backing,
            &self.header,
            &self.tree,
            &files,
            &self.xattrs,
            &self.wal,
            self.config.compression_threshold,
        )?;
        debug!("fsync: persisted string/inode/data/WAL sections");
        Ok(())
    }

    /// Unmount path (spec.md §4.9): flush the data files, emit a final
    /// checkpoint, and `msync` everything; the WAL is left holding just
    /// that checkpoint record, representing the clean state.
    pub fn fsync_fs(&mut self) -> CoreResult<()> {
        self.wal.checkpoint()?;
        self.fsync()
    }

    pub fn root(&self) -> u32 {
        self.tree.root()
    }

    /// Resolves a stable inode number to its current node index. Node
    /// indices move on rebalance and must never leak across a restart
    /// boundary (spec.md glossary); callers that need to remember an
    /// object across calls — the kernel adapter's `ino` cache chief among
    /// them — must key off the inode number and re-resolve through here.
    pub fn index_of_inode(&self, inode: u32) -> CoreResult<u32> {
        self.tree.find_by_inode(inode)
    }

    pub fn inode_of(&self, index: u32) -> CoreResult<u32> {
        Ok(self.tree.node(index)?.inode)
    }

    pub fn block_size(&self) -> u32 {
        self.config.block_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::MemBacking;

    fn facade() -> Facade<MemBacking> {
        Facade::mount("mem", Config::for_tests(), 4 * 1024 * 1024).unwrap()
    }

    #[test]
    fn create_write_read_back() {
        let mut f = facade();
        let root = f.root();
        let (a, _) = f.mkdir(root, "a", 0o755).unwrap();
        let (b, _) = f.create(a, "b", 0o644).unwrap();
        f.write(b, 0, b"hello world\n").unwrap();
        f.fsync().unwrap();
        let data = f.read(b, 0, 12).unwrap();
        assert_eq!(&data, b"hello world\n");
        assert_eq!(f.getattr(b).unwrap().size, 12);
    }

    #[test]
    fn name_collision_reports_exists() {
        let mut f = facade();
        let root = f.root();
        f.create(root, "x", 0o644).unwrap();
        assert_eq!(f.mkdir(root, "x", 0o755), Err(CoreError::Exists));
        assert_eq!(f.readdir(root).unwrap().len(), 1);
    }

    #[test]
    fn rmdir_non_empty_then_empty() {
        let mut f = facade();
        let root = f.root();
        let (d, _) = f.mkdir(root, "d", 0o755).unwrap();
        f.create(d, "f", 0o644).unwrap();
        assert_eq!(f.rmdir(root, "d"), Err(CoreError::NotEmpty));
        f.unlink(d, "f").unwrap();
        f.rmdir(root, "d").unwrap();
    }

    #[test]
    fn path_traversal_rejected() {
        let mut f = facade();
        let root = f.root();
        f.mkdir(root, "a", 0o755).unwrap();
        assert!(matches!(f.path_lookup("/a/../etc"), Err(CoreError::BadName(_))));
    }

    #[test]
    fn xattr_round_trip_through_facade() {
        let mut f = facade();
        let root = f.root();
        let (file, _) = f.create(root, "f", 0o644).unwrap();
        f.setxattr(file, "user.tag", b"v1", SetFlags::default()).unwrap();
        let mut buf = [0u8; 2];
        assert_eq!(f.getxattr(file, "user.tag", &mut buf).unwrap(), 2);
        assert_eq!(&buf, b"v1");
    }
}
