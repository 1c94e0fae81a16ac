//! C9 — analysis / redo / undo over the log, idempotent replay into the
//! tree, file content store, and xattr pool.

use crate::core::error::CoreResult;
use crate::core::tree::Tree;
use crate::core::wal::{verify_record_checksum, OpKind, Record, RecordHeader};
use crate::core::xattr::XattrPool;
use log::warn;
use std::collections::HashMap;
use std::mem::size_of;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Active,
    Committed,
    Aborted,
}

#[derive(Debug, Clone)]
pub struct TxInfo {
    pub state: TxState,
    pub first_lsn: u64,
    pub last_lsn: u64,
    pub op_count: u64,
}

/// Everything a WAL record's INSERT/DELETE/UPDATE/WRITE payload needs to
/// replay: a small hand-rolled little-endian encoding per spec.md §3, kept
/// in this module rather than pulled in from a serialization crate since
/// every field is fixed-width except the trailing name/bytes.
pub mod payload {
    pub fn encode_insert(parent_inode: u32, new_inode: u32, mode: u16, name: &str) -> Vec<u8> {
        let mut out = Vec::with_capacity(12 + name.len());
        out.extend_from_slice(&parent_inode.to_le_bytes());
        out.extend_from_slice(&new_inode.to_le_bytes());
        out.extend_from_slice(&mode.to_le_bytes());
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(name.as_bytes());
        out
    }

    pub fn decode_insert(data: &[u8]) -> Option<(u32, u32, u16, String)> {
        if data.len() < 12 {
            return None;
        }
        let parent = u32::from_le_bytes(data[0..4].try_into().ok()?);
        let inode = u32::from_le_bytes(data[4..8].try_into().ok()?);
        let mode = u16::from_le_bytes(data[8..10].try_into().ok()?);
        let name_len = u16::from_le_bytes(data[10..12].try_into().ok()?) as usize;
        let name = std::str::from_utf8(data.get(12..12 + name_len)?).ok()?.to_string();
        Some((parent, inode, mode, name))
    }

    /// DELETE logs the same fields as INSERT: enough to either redo the
    /// removal or, on undo, recreate exactly what was removed.
    pub fn encode_delete(parent_inode: u32, inode: u32, mode: u16, name: &str) -> Vec<u8> {
        encode_insert(parent_inode, inode, mode, name)
    }

    pub fn decode_delete(data: &[u8]) -> Option<(u32, u32, u16, String)> {
        decode_insert(data)
    }

    pub fn encode_update(inode: u32, old_size: u64, new_size: u64, old_mode: u16, new_mode: u16) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + 8 + 8 + 2 + 2);
        out.extend_from_slice(&inode.to_le_bytes());
        out.extend_from_slice(&old_size.to_le_bytes());
        out.extend_from_slice(&new_size.to_le_bytes());
        out.extend_from_slice(&old_mode.to_le_bytes());
        out.extend_from_slice(&new_mode.to_le_bytes());
        out
    }

    pub fn decode_update(data: &[u8]) -> Option<(u32, u64, u64, u16, u16)> {
        if data.len() < 24 {
            return None;
        }
        let inode = u32::from_le_bytes(data[0..4].try_into().ok()?);
        let old_size = u64::from_le_bytes(data[4..12].try_into().ok()?);
        let new_size = u64::from_le_bytes(data[12..20].try_into().ok()?);
        let old_mode = u16::from_le_bytes(data[20..22].try_into().ok()?);
        let new_mode = u16::from_le_bytes(data[22..24].try_into().ok()?);
        Some((inode, old_size, new_size, old_mode, new_mode))
    }

    pub fn encode_write(inode: u32, offset: u64, new_bytes: &[u8], prev_bytes: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + 8 + 4 + new_bytes.len() + 4 + prev_bytes.len());
        out.extend_from_slice(&inode.to_le_bytes());
        out.extend_from_slice(&offset.to_le_bytes());
        out.extend_from_slice(&(new_bytes.len() as u32).to_le_bytes());
        out.extend_from_slice(new_bytes);
        out.extend_from_slice(&(prev_bytes.len() as u32).to_le_bytes());
        out.extend_from_slice(prev_bytes);
        out
    }

    pub fn decode_write(data: &[u8]) -> Option<(u32, u64, &[u8], &[u8])> {
        if data.len() < 16 {
            return None;
        }
        let inode = u32::from_le_bytes(data[0..4].try_into().ok()?);
        let offset = u64::from_le_bytes(data[4..12].try_into().ok()?);
        let new_len = u32::from_le_bytes(data[12..16].try_into().ok()?) as usize;
        let new_start = 16;
        let new_bytes = data.get(new_start..new_start + new_len)?;
        let prev_len_start = new_start + new_len;
        let prev_len =
            u32::from_le_bytes(data.get(prev_len_start..prev_len_start + 4)?.try_into().ok()?) as usize;
        let prev_bytes = data.get(prev_len_start + 4..prev_len_start + 4 + prev_len)?;
        Some((inode, offset, new_bytes, prev_bytes))
    }
}

/// Bundles the data-plane components recovery replays into. File payload
/// bytes are modeled here as a flat per-inode buffer rather than through
/// the block allocator/extent map directly: recovery's job is restoring
/// logically-correct bytes, and the steady-state write path (core::facade)
/// is responsible for re-deriving extents from those bytes on the next
/// write that touches the inode.
pub struct DataPlane<'a> {
    pub tree: &'a mut Tree,
    pub files: &'a mut HashMap<u32, Vec<u8>>,
    pub xattrs: &'a mut XattrPool,
}

/// Parses the recoverable prefix of the ring buffer starting at `head`.
/// Stops (without error) at the first checksum mismatch: that prefix is
/// the recoverable log, per spec.md §4.8 and §7 ("CRC failures during
/// recovery bound analysis but do not abort mount").
pub fn parse_records(buf: &[u8], head: usize, tail: usize) -> Vec<Record> {
    let capacity = buf.len();
    let mut records = Vec::new();
    let mut pos = head;
    let header_len = size_of::<RecordHeader>();

    let available = if tail >= head { tail - head } else { capacity - head + tail };
    let mut consumed = 0usize;

    while consumed < available {
        if available - consumed < header_len {
            break;
        }
        let header_bytes = read_wrapping(buf, pos, header_len);
        let header: RecordHeader = unsafe { crate::core::utils::deserialize_row(&header_bytes) };
        let data_len = header.data_len as usize;
        if header_len + data_len > available - consumed {
            break;
        }
        let data = read_wrapping(buf, (pos + header_len) % capacity, data_len);
        if !verify_record_checksum(&header, &data) {
            warn!("WAL checksum mismatch at lsn {}, truncating recovery prefix", header.lsn);
            break;
        }
        let op_kind = match crate::core::wal::OpKind::from_u8(header.op_kind) {
            Ok(k) => k,
            Err(_) => break,
        };
        records.push(Record {
            tx_id: header.tx_id,
            lsn: header.lsn,
            op_kind,
            timestamp: header.timestamp,
            data,
        });
        pos = (pos + header_len + data_len) % capacity;
        consumed += header_len + data_len;
    }
    records
}

fn read_wrapping(buf: &[u8], start: usize, len: usize) -> Vec<u8> {
    let capacity = buf.len();
    let mut out = Vec::with_capacity(len);
    let until_end = capacity - start;
    if len <= until_end {
        out.extend_from_slice(&buf[start..start + len]);
    } else {
        out.extend_from_slice(&buf[start..capacity]);
        out.extend_from_slice(&buf[0..len - until_end]);
    }
    out
}

/// Builds the per-transaction state table: BEGIN marks Active, COMMIT
/// marks Committed, ABORT marks Aborted.
pub fn analyze(records: &[Record]) -> HashMap<u64, TxInfo> {
    let mut table: HashMap<u64, TxInfo> = HashMap::new();
    for r in records {
        if r.op_kind == OpKind::Checkpoint {
            continue;
        }
        let entry = table.entry(r.tx_id).or_insert(TxInfo {
            state: TxState::Active,
            first_lsn: r.lsn,
            last_lsn: r.lsn,
            op_count: 0,
        });
        entry.last_lsn = r.lsn;
        entry.op_count += 1;
        match r.op_kind {
            OpKind::Begin => entry.state = TxState::Active,
            OpKind::Commit => entry.state = TxState::Committed,
            OpKind::Abort => entry.state = TxState::Aborted,
            _ => {}
        }
    }
    table
}

/// Forward pass: idempotently applies every record belonging to a
/// Committed transaction.
pub fn redo(records: &[Record], table: &HashMap<u64, TxInfo>, plane: &mut DataPlane) -> CoreResult<()> {
    for r in records {
        if !matches!(table.get(&r.tx_id), Some(info) if info.state == TxState::Committed) {
            continue;
        }
        match r.op_kind {
            OpKind::Insert => {
                if let Some((parent_inode, inode, mode, name)) = payload::decode_insert(&r.data) {
                    if plane.tree.find_by_inode(inode).is_ok() {
                        continue;
                    }
                    if let Ok(parent_idx) = plane.tree.find_by_inode(parent_inode) {
                        let _ = plane.tree.insert_with_inode(parent_idx, &name, mode, inode);
                    }
                }
            }
            OpKind::Delete => {
                if let Some((_, inode, _, _)) = payload::decode_delete(&r.data) {
                    if let Ok(idx) = plane.tree.find_by_inode(inode) {
                        let _ = plane.tree.delete(idx);
                    }
                }
            }
            OpKind::Update => {
                if let Some((inode, _old_size, new_size, _old_mode, new_mode)) =
                    payload::decode_update(&r.data)
                {
                    if let Ok(idx) = plane.tree.find_by_inode(inode) {
                        if plane.tree.node(idx)?.size != new_size || plane.tree.node(idx)?.mode != new_mode {
                            plane.tree.set_size_mtime(idx, Some(new_size), true)?;
                            plane.tree.set_mode(idx, new_mode)?;
                        }
                    }
                }
            }
            OpKind::Write => {
                if let Some((inode, offset, new_bytes, _prev)) = payload::decode_write(&r.data) {
                    let buf = plane.files.entry(inode).or_default();
                    let end = offset as usize + new_bytes.len();
                    if buf.len() < end {
                        buf.resize(end, 0);
                    }
                    buf[offset as usize..end].copy_from_slice(new_bytes);
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// Backward pass: applies the inverse operation for every record
/// belonging to a transaction still Active at analysis time (never
/// committed or aborted). Aborted transactions are skipped — compensation
/// was the writer's responsibility when it called `abort_tx`.
pub fn undo(records: &[Record], table: &HashMap<u64, TxInfo>, plane: &mut DataPlane) -> CoreResult<()> {
    for r in records.iter().rev() {
        if !matches!(table.get(&r.tx_id), Some(info) if info.state == TxState::Active) {
            continue;
        }
        match r.op_kind {
            OpKind::Insert => {
                if let Some((_, inode, _, _)) = payload::decode_insert(&r.data) {
                    if let Ok(idx) = plane.tree.find_by_inode(inode) {
                        let _ = plane.tree.delete(idx);
                    }
                }
            }
            OpKind::Delete => {
                if let Some((parent_inode, inode, mode, name)) = payload::decode_delete(&r.data) {
                    if plane.tree.find_by_inode(inode).is_err() {
                        if let Ok(parent_idx) = plane.tree.find_by_inode(parent_inode) {
                            let _ = plane.tree.insert_with_inode(parent_idx, &name, mode, inode);
                        }
                    }
                }
            }
            OpKind::Update => {
                if let Some((inode, old_size, _new_size, old_mode, _new_mode)) =
                    payload::decode_update(&r.data)
                {
                    if let Ok(idx) = plane.tree.find_by_inode(inode) {
                        plane.tree.set_size_mtime(idx, Some(old_size), false)?;
                        plane.tree.set_mode(idx, old_mode)?;
                    }
                }
            }
            OpKind::Write => {
                if let Some((inode, offset, new_bytes, prev_bytes)) = payload::decode_write(&r.data) {
                    if let Some(buf) = plane.files.get_mut(&inode) {
                        let end = offset as usize + new_bytes.len();
                        if prev_bytes.is_empty() {
                            buf.truncate(offset as usize);
                        } else if buf.len() >= end {
                            buf[offset as usize..offset as usize + prev_bytes.len()]
                                .copy_from_slice(prev_bytes);
                        }
                    }
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// Runs analysis, redo, then undo against the recoverable prefix of a WAL
/// snapshot. Must complete before any user-visible operation is permitted,
/// and must be idempotent: running it twice makes no further changes.
pub fn recover(buf: &[u8], head: usize, tail: usize, plane: &mut DataPlane) -> CoreResult<()> {
    let records = parse_records(buf, head, tail);
    let table = analyze(&records);
    redo(&records, &table, plane)?;
    undo(&records, &table, plane)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use crate::core::tree::S_IFREG;
    use crate::core::wal::Wal;

    fn plane<'a>(tree: &'a mut Tree, files: &'a mut HashMap<u32, Vec<u8>>, xattrs: &'a mut XattrPool) -> DataPlane<'a> {
        DataPlane { tree, files, xattrs }
    }

    #[test]
    fn uncommitted_insert_is_undone() {
        let wal = Wal::new(
            crate::core::wal::MIN_WAL_SIZE,
            false,
            1_000_000,
            std::time::Duration::from_secs(3600),
        )
        .unwrap();
        let mut tree = Tree::init(&Config::for_tests()).unwrap();
        let root_inode = tree.node(tree.root()).unwrap().inode;

        let tx = wal.begin_tx();
        wal.log_insert(tx, &payload::encode_insert(root_inode, 999, S_IFREG | 0o644, "c"))
            .unwrap();
        // crash: no commit_tx call.

        let (buf, head, tail) = wal.snapshot();
        let mut files = HashMap::new();
        let mut xattrs = XattrPool::new();
        recover(&buf, head, tail, &mut plane(&mut tree, &mut files, &mut xattrs)).unwrap();

        assert_eq!(tree.find_by_inode(999), Err(crate::core::error::CoreError::NotFound));
    }

    #[test]
    fn committed_insert_is_redone() {
        let wal = Wal::new(
            crate::core::wal::MIN_WAL_SIZE,
            false,
            1_000_000,
            std::time::Duration::from_secs(3600),
        )
        .unwrap();
        let mut tree = Tree::init(&Config::for_tests()).unwrap();
        let root_inode = tree.node(tree.root()).unwrap().inode;

        let tx = wal.begin_tx();
        wal.log_insert(tx, &payload::encode_insert(root_inode, 999, S_IFREG | 0o644, "c"))
            .unwrap();
        wal.commit_tx(tx).unwrap();

        let (buf, head, tail) = wal.snapshot();
        let mut files = HashMap::new();
        let mut xattrs = XattrPool::new();
        recover(&buf, head, tail, &mut plane(&mut tree, &mut files, &mut xattrs)).unwrap();

        assert!(tree.find_by_inode(999).is_ok());
    }

    #[test]
    fn recovery_is_idempotent() {
        let wal = Wal::new(
            crate::core::wal::MIN_WAL_SIZE,
            false,
            1_000_000,
            std::time::Duration::from_secs(3600),
        )
        .unwrap();
        let mut tree = Tree::init(&Config::for_tests()).unwrap();
        let root_inode = tree.node(tree.root()).unwrap().inode;
        let tx = wal.begin_tx();
        wal.log_insert(tx, &payload::encode_insert(root_inode, 999, S_IFREG | 0o644, "c"))
            .unwrap();
        wal.commit_tx(tx).unwrap();

        let (buf, head, tail) = wal.snapshot();
        let mut files = HashMap::new();
        let mut xattrs = XattrPool::new();
        recover(&buf, head, tail, &mut plane(&mut tree, &mut files, &mut xattrs)).unwrap();
        let before = tree.find_by_inode(999).unwrap();
        recover(&buf, head, tail, &mut plane(&mut tree, &mut files, &mut xattrs)).unwrap();
        let after = tree.find_by_inode(999).unwrap();
        assert_eq!(before, after);
    }
}
