//! C10 — the memory-mapped persistence layout and attach/create semantics.
//!
//! One backing image (spec.md §6) holds, in order: the header, the
//! string-table section, the inode-table section, the data section, and
//! the WAL section. `storage::Backing` (this repo's analogue of the
//! teacher's `disk_driver`) is the byte-range abstraction underneath.

use crate::core::error::{CoreError, CoreResult};
use crate::core::utils::{deserialize_row, serialize_row};
use crc32fast::Hasher;
use std::mem::size_of;
use storage::Backing;

pub const MAGIC: [u8; 4] = *b"PFS1";
pub const VERSION_MAJOR: u16 = 1;
pub const VERSION_MINOR: u16 = 0;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub magic: [u8; 4],
    pub version_major: u16,
    pub version_minor: u16,
    pub created_at: u64,
    pub next_inode: u32,
    pub string_table_offset: u64,
    pub string_table_size: u64,
    pub inode_table_offset: u64,
    pub inode_table_size: u64,
    pub data_offset: u64,
    pub data_size: u64,
    pub wal_offset: u64,
    pub wal_size: u64,
    pub crc32: u32,
    pub reserved: u32,
}

pub const HEADER_LEN: usize = size_of::<Header>();

/// Fixed offsets for each section given the sizes a `Config` asks for.
/// The header itself occupies `[0, HEADER_LEN)`.
pub struct SectionLayout {
    pub string_table_offset: u64,
    pub string_table_size: u64,
    pub inode_table_offset: u64,
    pub inode_table_size: u64,
    pub data_offset: u64,
    pub data_size: u64,
    pub wal_offset: u64,
    pub wal_size: u64,
}

impl SectionLayout {
    pub fn compute(string_table_size: u64, inode_table_size: u64, data_size: u64, wal_size: u64) -> Self {
        let string_table_offset = HEADER_LEN as u64;
        let inode_table_offset = string_table_offset + string_table_size;
        let data_offset = inode_table_offset + inode_table_size;
        let wal_offset = data_offset + data_size;
        Self {
            string_table_offset,
            string_table_size,
            inode_table_offset,
            inode_table_size,
            data_offset,
            data_size,
            wal_offset,
            wal_size,
        }
    }

    pub fn total_len(&self) -> u64 {
        self.wal_offset + self.wal_size
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl Header {
    pub fn new(sections: &SectionLayout) -> Self {
        Self {
            magic: MAGIC,
            version_major: VERSION_MAJOR,
            version_minor: VERSION_MINOR,
            created_at: now_secs(),
            next_inode: 2,
            string_table_offset: sections.string_table_offset,
            string_table_size: sections.string_table_size,
            inode_table_offset: sections.inode_table_offset,
            inode_table_size: sections.inode_table_size,
            data_offset: sections.data_offset,
            data_size: sections.data_size,
            wal_offset: sections.wal_offset,
            wal_size: sections.wal_size,
            crc32: 0,
            reserved: 0,
        }
    }

    fn compute_crc(&self) -> u32 {
        let mut zeroed = *self;
        zeroed.crc32 = 0;
        let bytes = unsafe { serialize_row(&zeroed) };
        let mut h = Hasher::new();
        h.update(bytes);
        h.finalize()
    }

    pub fn stamp_crc(&mut self) {
        self.crc32 = self.compute_crc();
    }

    /// Validates magic, version, and CRC. Major version mismatch and CRC
    /// mismatch both fail mount outright (spec.md §4.9); minor version
    /// mismatch is accepted (forward-compatible fields are zero-filled by
    /// construction since `Header` is a fixed-width `repr(C)` struct).
    pub fn validate(&self) -> CoreResult<()> {
        if self.magic != MAGIC {
            return Err(CoreError::Corrupted("bad persistent-file magic".into()));
        }
        if self.version_major != VERSION_MAJOR {
            return Err(CoreError::VersionMismatch);
        }
        if self.crc32 != self.compute_crc() {
            return Err(CoreError::Corrupted("header CRC mismatch".into()));
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        unsafe { serialize_row(self) }.to_vec()
    }

    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(CoreError::Corrupted("truncated header".into()));
        }
        Ok(unsafe { deserialize_row(bytes) })
    }
}

/// Reads the header out of `backing`, if one is present and valid.
pub fn read_header<B: Backing>(backing: &mut B) -> CoreResult<Header> {
    let mut buf = vec![0u8; HEADER_LEN];
    backing
        .read(0, &mut buf)
        .map_err(|e| CoreError::IoError(e.to_string()))?;
    let header = Header::from_bytes(&buf)?;
    header.validate()?;
    Ok(header)
}

/// Writes a freshly initialized header (and stamps its CRC) to `backing`.
pub fn write_header<B: Backing>(backing: &mut B, header: &mut Header) -> CoreResult<()> {
    header.stamp_crc();
    backing
        .write(0, &header.to_bytes())
        .map_err(|e| CoreError::IoError(e.to_string()))?;
    backing
        .flush_range(0, HEADER_LEN as u64)
        .map_err(|e| CoreError::IoError(e.to_string()))?;
    Ok(())
}

/// Writes a length-prefixed blob (`u32` length + bytes) and returns the
/// number of bytes written.
fn put_blob(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(bytes);
}

fn take_blob<'a>(buf: &'a [u8], pos: &mut usize) -> CoreResult<&'a [u8]> {
    let len = u32::from_le_bytes(
        buf.get(*pos..*pos + 4)
            .ok_or_else(|| CoreError::Corrupted("truncated section blob length".into()))?
            .try_into()
            .unwrap(),
    ) as usize;
    *pos += 4;
    let bytes = buf
        .get(*pos..*pos + len)
        .ok_or_else(|| CoreError::Corrupted("truncated section blob body".into()))?;
    *pos += len;
    Ok(bytes)
}

fn put_u32_vec(out: &mut Vec<u8>, v: &[u32]) {
    out.extend_from_slice(&(v.len() as u32).to_le_bytes());
    for x in v {
        out.extend_from_slice(&x.to_le_bytes());
    }
}

fn take_u32_vec(buf: &[u8], pos: &mut usize) -> CoreResult<Vec<u32>> {
    let count = u32::from_le_bytes(
        buf.get(*pos..*pos + 4)
            .ok_or_else(|| CoreError::Corrupted("truncated u32 vec count".into()))?
            .try_into()
            .unwrap(),
    ) as usize;
    *pos += 4;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        let x = u32::from_le_bytes(
            buf.get(*pos..*pos + 4)
                .ok_or_else(|| CoreError::Corrupted("truncated u32 vec element".into()))?
                .try_into()
                .unwrap(),
        );
        out.push(x);
        *pos += 4;
    }
    Ok(out)
}

fn put_pair_vec(out: &mut Vec<u8>, v: &[(u32, u32)]) {
    out.extend_from_slice(&(v.len() as u32).to_le_bytes());
    for (a, b) in v {
        out.extend_from_slice(&a.to_le_bytes());
        out.extend_from_slice(&b.to_le_bytes());
    }
}

fn take_pair_vec(buf: &[u8], pos: &mut usize) -> CoreResult<Vec<(u32, u32)>> {
    let count = u32::from_le_bytes(
        buf.get(*pos..*pos + 4)
            .ok_or_else(|| CoreError::Corrupted("truncated pair vec count".into()))?
            .try_into()
            .unwrap(),
    ) as usize;
    *pos += 4;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        let a = u32::from_le_bytes(buf.get(*pos..*pos + 4).ok_or_else(too_short)?.try_into().unwrap());
        let b = u32::from_le_bytes(buf.get(*pos + 4..*pos + 8).ok_or_else(too_short)?.try_into().unwrap());
        out.push((a, b));
        *pos += 8;
    }
    Ok(out)
}

fn too_short() -> CoreError {
    CoreError::Corrupted("truncated pair vec element".into())
}

fn crc32(bytes: &[u8]) -> u32 {
    let mut h = Hasher::new();
    h.update(bytes);
    h.finalize()
}

/// WAL section header: cursors and monotonic counters that must survive a
/// restart, stored ahead of the ring buffer bytes (spec.md §3's "WAL
/// header (first record of the log buffer)", adapted here to a dedicated
/// fixed-size prefix rather than a record shape, since those counters are
/// metadata about the ring, not an entry in it).
#[repr(C)]
#[derive(Clone, Copy)]
struct WalMeta {
    magic: [u8; 4],
    version: u16,
    _pad: u16,
    next_tx_id: u64,
    next_lsn: u64,
    head: u64,
    tail: u64,
    checkpoint_lsn: u64,
    entry_count: u64,
    checksum: u32,
    reserved: u32,
}

const WAL_META_MAGIC: [u8; 4] = *b"WALH";
pub const WAL_META_LEN: u64 = size_of::<WalMeta>() as u64;

impl WalMeta {
    fn compute_crc(&self) -> u32 {
        let mut zeroed = *self;
        zeroed.checksum = 0;
        crc32(unsafe { serialize_row(&zeroed) })
    }
}

/// WAL section length given the ring buffer's own capacity (the value
/// `Config::wal_size` names): the meta prefix plus the ring itself.
pub fn wal_section_len(ring_capacity: u64) -> u64 {
    WAL_META_LEN + ring_capacity
}

/// Serializes the tree, file payloads, xattr pool, and WAL into their
/// respective sections of `backing`, per the offsets/sizes recorded in
/// `header`. Called on `fsync`/unmount (spec.md §4.9: "flush the data
/// files, emit a final checkpoint, and msync everything").
pub fn persist_all<B: Backing>(
    backing: &mut B,
    header: &Header,
    tree: &crate::core::tree::Tree,
    files: &std::collections::HashMap<u32, Vec<u8>>,
    xattrs: &crate::core::xattr::XattrPool,
    wal: &crate::core::wal::Wal,
    compression_threshold: usize,
) -> CoreResult<()> {
    // String table.
    let strings_blob = tree.strings().raw_buf();
    if strings_blob.len() as u64 + 4 > header.string_table_size {
        return Err(CoreError::NoSpace);
    }
    let mut out = Vec::with_capacity(strings_blob.len() + 4);
    put_blob(&mut out, strings_blob);
    backing
        .write(header.string_table_offset, &out)
        .map_err(io_err)?;

    // Inode table: each live-or-free 64 B node plus a trailing CRC-32,
    // preceded by the node count and the next-inode counter.
    let (nodes, next_inode) = tree.export_raw();
    let node_bytes_len = nodes.len() * size_of::<crate::core::tree::Node>();
    let record_len = size_of::<crate::core::tree::Node>() + 4;
    let total_len = 8 + nodes.len() * record_len;
    if total_len as u64 > header.inode_table_size {
        return Err(CoreError::NoSpace);
    }
    let mut out = Vec::with_capacity(total_len);
    out.extend_from_slice(&(nodes.len() as u32).to_le_bytes());
    out.extend_from_slice(&next_inode.to_le_bytes());
    for n in nodes {
        let bytes = unsafe { serialize_row(n) };
        out.extend_from_slice(bytes);
        out.extend_from_slice(&crc32(bytes).to_le_bytes());
    }
    debug_assert_eq!(out.len(), 8 + node_bytes_len + nodes.len() * 4);
    backing.write(header.inode_table_offset, &out).map_err(io_err)?;

    // Data section: pooled xattrs, then file payloads (compressed above
    // `compression_threshold` per spec.md §4.5's transparent envelope).
    let xraw = xattrs.export_raw();
    let mut xattr_blob = Vec::new();
    put_blob(&mut xattr_blob, &xraw.entries);
    put_u32_vec(&mut xattr_blob, &xraw.free_entries);
    put_blob(&mut xattr_blob, &xraw.names);
    put_blob(&mut xattr_blob, &xraw.values);
    put_pair_vec(&mut xattr_blob, &xraw.value_free);

    let mut files_blob = Vec::new();
    files_blob.extend_from_slice(&(files.len() as u32).to_le_bytes());
    for (&inode, bytes) in files {
        let envelope = crate::core::compress::compress(bytes, compression_threshold);
        let (is_compressed, stored): (u32, &[u8]) = match &envelope {
            Some(e) => (1, e.as_slice()),
            None => (0, bytes.as_slice()),
        };
        files_blob.extend_from_slice(&inode.to_le_bytes());
        files_blob.extend_from_slice(&is_compressed.to_le_bytes());
        files_blob.extend_from_slice(&(bytes.len() as u64).to_le_bytes());
        files_blob.extend_from_slice(&(stored.len() as u64).to_le_bytes());
        put_blob(&mut files_blob, stored);
    }

    let mut data_out = Vec::with_capacity(8 + xattr_blob.len() + files_blob.len());
    put_blob(&mut data_out, &xattr_blob);
    put_blob(&mut data_out, &files_blob);
    if data_out.len() as u64 > header.data_size {
        return Err(CoreError::NoSpace);
    }
    backing.write(header.data_offset, &data_out).map_err(io_err)?;

    // WAL: meta prefix (cursors + monotonic counters) then ring bytes.
    let snap = wal.snapshot_full();
    let mut meta = WalMeta {
        magic: WAL_META_MAGIC,
        version: 1,
        _pad: 0,
        next_tx_id: snap.next_tx_id,
        next_lsn: snap.next_lsn,
        head: snap.head as u64,
        tail: snap.tail as u64,
        checkpoint_lsn: snap.checkpoint_lsn,
        entry_count: snap.entry_count,
        checksum: 0,
        reserved: 0,
    };
    meta.checksum = meta.compute_crc();
    let mut wal_out = Vec::with_capacity(WAL_META_LEN as usize + snap.buf.len());
    wal_out.extend_from_slice(unsafe { serialize_row(&meta) });
    wal_out.extend_from_slice(&snap.buf);
    backing.write(header.wal_offset, &wal_out).map_err(io_err)?;

    backing.flush().map_err(io_err)?;
    Ok(())
}

/// Everything `Facade::mount` needs after reading an existing image back.
pub struct Loaded {
    pub tree: crate::core::tree::Tree,
    pub files: std::collections::HashMap<u32, Vec<u8>>,
    pub xattrs: crate::core::xattr::XattrPool,
    pub wal: crate::core::wal::Wal,
}

/// Reverses `persist_all`, reconstructing every data-plane component
/// bit-identical to what was persisted (spec.md §8's persist-then-attach
/// round-trip law).
pub fn read_all<B: Backing>(
    backing: &mut B,
    header: &Header,
    config: &crate::core::config::Config,
) -> CoreResult<Loaded> {
    // String table.
    let mut raw = vec![0u8; header.string_table_size as usize];
    backing.read(header.string_table_offset, &mut raw).map_err(io_err)?;
    let mut pos = 0usize;
    let strings_bytes = take_blob(&raw, &mut pos)?.to_vec();
    let strings = crate::core::strings::StringTable::from_raw(strings_bytes, 16 * 1024 * 1024)?;

    // Inode table.
    let mut raw = vec![0u8; header.inode_table_size as usize];
    backing.read(header.inode_table_offset, &mut raw).map_err(io_err)?;
    if raw.len() < 8 {
        return Err(CoreError::Corrupted("truncated inode table".into()));
    }
    let count = u32::from_le_bytes(raw[0..4].try_into().unwrap()) as usize;
    let next_inode = u32::from_le_bytes(raw[4..8].try_into().unwrap());
    let node_len = size_of::<crate::core::tree::Node>();
    let record_len = node_len + 4;
    let mut pos = 8usize;
    let mut nodes = Vec::with_capacity(count);
    for _ in 0..count {
        let record = raw
            .get(pos..pos + record_len)
            .ok_or_else(|| CoreError::Corrupted("truncated inode record".into()))?;
        let (node_bytes, crc_bytes) = record.split_at(node_len);
        let stored_crc = u32::from_le_bytes(crc_bytes.try_into().unwrap());
        if crc32(node_bytes) != stored_crc {
            return Err(CoreError::Corrupted("inode record CRC mismatch".into()));
        }
        nodes.push(unsafe { deserialize_row::<crate::core::tree::Node>(node_bytes) });
        pos += record_len;
    }
    let tree = crate::core::tree::Tree::import_raw(nodes, strings, next_inode, config);

    // Data section: pooled xattrs, then file payloads.
    let mut raw = vec![0u8; header.data_size as usize];
    backing.read(header.data_offset, &mut raw).map_err(io_err)?;
    let mut pos = 0usize;
    let xattr_blob = take_blob(&raw, &mut pos)?;
    let files_blob = take_blob(&raw, &mut pos)?;

    let mut xpos = 0usize;
    let entries = take_blob(xattr_blob, &mut xpos)?.to_vec();
    let free_entries = take_u32_vec(xattr_blob, &mut xpos)?;
    let names = take_blob(xattr_blob, &mut xpos)?.to_vec();
    let values = take_blob(xattr_blob, &mut xpos)?.to_vec();
    let value_free = take_pair_vec(xattr_blob, &mut xpos)?;
    let xattrs = crate::core::xattr::XattrPool::import_raw(crate::core::xattr::XattrRaw {
        entries,
        free_entries,
        names,
        values,
        value_free,
    })?;

    let mut fpos = 0usize;
    let file_count = u32::from_le_bytes(
        files_blob
            .get(fpos..fpos + 4)
            .ok_or_else(|| CoreError::Corrupted("truncated file count".into()))?
            .try_into()
            .unwrap(),
    ) as usize;
    fpos += 4;
    let mut files = std::collections::HashMap::with_capacity(file_count);
    for _ in 0..file_count {
        let inode = u32::from_le_bytes(
            files_blob.get(fpos..fpos + 4).ok_or_else(|| CoreError::Corrupted("truncated file record".into()))?.try_into().unwrap(),
        );
        fpos += 4;
        let is_compressed = u32::from_le_bytes(
            files_blob.get(fpos..fpos + 4).ok_or_else(|| CoreError::Corrupted("truncated file record".into()))?.try_into().unwrap(),
        );
        fpos += 4;
        let original_size = u64::from_le_bytes(
            files_blob.get(fpos..fpos + 8).ok_or_else(|| CoreError::Corrupted("truncated file record".into()))?.try_into().unwrap(),
        );
        fpos += 8;
        let _stored_size = u64::from_le_bytes(
            files_blob.get(fpos..fpos + 8).ok_or_else(|| CoreError::Corrupted("truncated file record".into()))?.try_into().unwrap(),
        );
        fpos += 8;
        let stored = take_blob(files_blob, &mut fpos)?;
        let bytes = if is_compressed == 1 {
            crate::core::compress::decompress(stored)?
        } else {
            stored.to_vec()
        };
        debug_assert_eq!(bytes.len() as u64, original_size);
        files.insert(inode, bytes);
    }

    // WAL.
    let mut raw = vec![0u8; header.wal_size as usize];
    backing.read(header.wal_offset, &mut raw).map_err(io_err)?;
    if (raw.len() as u64) < WAL_META_LEN {
        return Err(CoreError::Corrupted("truncated WAL section".into()));
    }
    let meta: WalMeta = unsafe { deserialize_row(&raw[..WAL_META_LEN as usize]) };
    if meta.magic != WAL_META_MAGIC {
        return Err(CoreError::Corrupted("bad WAL meta magic".into()));
    }
    if meta.checksum != meta.compute_crc() {
        return Err(CoreError::Corrupted("WAL meta CRC mismatch".into()));
    }
    let ring_bytes = raw[WAL_META_LEN as usize..].to_vec();
    let wal = crate::core::wal::Wal::from_snapshot(
        crate::core::wal::WalSnapshot {
            buf: ring_bytes,
            head: meta.head as usize,
            tail: meta.tail as usize,
            next_tx_id: meta.next_tx_id,
            next_lsn: meta.next_lsn,
            checkpoint_lsn: meta.checkpoint_lsn,
            entry_count: meta.entry_count,
        },
        config.auto_checkpoint,
        config.checkpoint_entries,
        config.checkpoint_interval,
    )?;

    Ok(Loaded { tree, files, xattrs, wal })
}

fn io_err<E: std::fmt::Display>(e: E) -> CoreError {
    CoreError::IoError(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::MemBacking;

    #[test]
    fn create_then_validate_round_trip() {
        let sections = SectionLayout::compute(64 * 1024, 64 * 1024, 1024 * 1024, 64 * 1024);
        let mut backing = MemBacking::open("mem", sections.total_len(), true).unwrap();
        let mut header = Header::new(&sections);
        write_header(&mut backing, &mut header).unwrap();
        let read_back = read_header(&mut backing).unwrap();
        assert_eq!(read_back.magic, MAGIC);
        assert_eq!(read_back.string_table_offset, sections.string_table_offset);
    }

    #[test]
    fn major_version_mismatch_fails_mount() {
        let sections = SectionLayout::compute(4096, 4096, 4096, 65536);
        let mut backing = MemBacking::open("mem", sections.total_len(), true).unwrap();
        let mut header = Header::new(&sections);
        header.version_major = VERSION_MAJOR + 1;
        write_header(&mut backing, &mut header).unwrap();
        assert_eq!(read_header(&mut backing), Err(CoreError::VersionMismatch));
    }

    #[test]
    fn corrupted_crc_is_rejected() {
        let sections = SectionLayout::compute(4096, 4096, 4096, 65536);
        let mut backing = MemBacking::open("mem", sections.total_len(), true).unwrap();
        let mut header = Header::new(&sections);
        write_header(&mut backing, &mut header).unwrap();
        let mut corrupt = vec![0u8; HEADER_LEN];
        backing.read(0, &mut corrupt).unwrap();
        corrupt[8] ^= 0xFF;
        backing.write(0, &corrupt).unwrap();
        assert!(matches!(read_header(&mut backing), Err(CoreError::Corrupted(_))));
    }

    #[test]
    fn persist_then_read_all_round_trips() {
        use crate::core::config::Config;
        use crate::core::tree::Tree;
        use crate::core::wal::Wal;
        use crate::core::xattr::XattrPool;
        use std::collections::HashMap;

        let config = Config::for_tests();
        let wal_len = wal_section_len(config.wal_size);
        let sections = SectionLayout::compute(64 * 1024, 64 * 1024, 1024 * 1024, wal_len);
        let mut backing = MemBacking::open("mem", sections.total_len(), true).unwrap();
        let mut header = Header::new(&sections);
        write_header(&mut backing, &mut header).unwrap();

        let mut tree = Tree::init(&config).unwrap();
        let root = tree.root();
        let dir = tree.insert(root, "docs", crate::core::tree::S_IFDIR | 0o755).unwrap();
        let file = tree.insert(dir, "readme.txt", crate::core::tree::S_IFREG | 0o644).unwrap();
        let file_inode = tree.node(file).unwrap().inode;

        let mut files = HashMap::new();
        files.insert(file_inode, b"hello, persisted world\n".to_vec());

        let mut xattrs = XattrPool::new();
        let mut head = tree.node(file).unwrap().xattr_head;
        xattrs
            .set(&mut head, "user.tag", b"v1", crate::core::xattr::SetFlags::default())
            .unwrap();
        tree.set_xattr_head(file, head).unwrap();

        let wal = Wal::new(config.wal_size, false, config.checkpoint_entries, config.checkpoint_interval).unwrap();
        let tx = wal.begin_tx();
        wal.log_insert(
            tx,
            &crate::core::recovery::payload::encode_insert(tree.node(root).unwrap().inode, file_inode, 0o644, "readme.txt"),
        )
        .unwrap();
        wal.commit_tx(tx).unwrap();

        persist_all(&mut backing, &header, &tree, &files, &xattrs, &wal, config.compression_threshold).unwrap();

        let loaded = read_all(&mut backing, &header, &config).unwrap();
        assert_eq!(loaded.files.get(&file_inode).unwrap(), b"hello, persisted world\n");
        let reloaded_file = loaded.tree.find_by_inode(file_inode).unwrap();
        assert_eq!(loaded.tree.node(reloaded_file).unwrap().inode, file_inode);
        let mut buf = [0u8; 2];
        let reloaded_head = loaded.tree.node(reloaded_file).unwrap().xattr_head;
        assert_eq!(loaded.xattrs.get(reloaded_head, "user.tag", &mut buf).unwrap(), 2);
        assert_eq!(&buf, b"v1");
    }
}
